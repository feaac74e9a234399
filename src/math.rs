//! Modular arithmetic over an arbitrary modulus

use crate::error::{Error, Result};
use anyhow::{anyhow, bail};
use num_bigint::{BigInt, Sign};
use num_traits::{Num, One, Signed, Zero};
use sha2::{Digest, Sha256};

/// Reduces `a` into `[0, m)`. `m` must be positive.
pub fn reduce(a: &BigInt, m: &BigInt) -> BigInt {
    let r = a % m;
    if r.is_negative() {
        r + m
    } else {
        r
    }
}

/// Computes `a⁻¹ mod m` with the extended Euclidean algorithm.
///
/// `a` may be negative; it is normalized into `[0, m)` first. The result `x`
/// satisfies `(a * x) mod m == 1`. Fails with [`Error::NoInverse`] when
/// `gcd(a, m) != 1`.
pub fn mod_inverse(a: &BigInt, m: &BigInt) -> Result<BigInt> {
    if *m <= BigInt::one() {
        return Err(Error::InvalidModulus(m.clone()));
    }
    let a = reduce(a, m);

    let (mut old_r, mut r) = (a, m.clone());
    let (mut old_s, mut s) = (BigInt::one(), BigInt::zero());
    let (mut old_t, mut t) = (BigInt::zero(), BigInt::one());

    while !r.is_zero() {
        let quotient = &old_r / &r;
        let next_r = &old_r - &quotient * &r;
        old_r = std::mem::replace(&mut r, next_r);
        let next_s = &old_s - &quotient * &s;
        old_s = std::mem::replace(&mut s, next_s);
        let next_t = &old_t - &quotient * &t;
        old_t = std::mem::replace(&mut t, next_t);
    }

    if !old_r.is_one() {
        return Err(Error::NoInverse { gcd: old_r });
    }
    Ok(reduce(&old_s, m))
}

/// `SHA-256(message)` read as a big-endian integer, reduced mod `n`.
pub fn digest_scalar(message: &[u8], n: &BigInt) -> BigInt {
    let digest = Sha256::digest(message);
    reduce(&BigInt::from_bytes_be(Sign::Plus, &digest), n)
}

/// Recovers the shared nonce `k = (z1 - z2) / (s1 - s2) mod n`.
pub fn recover_nonce(
    z1: &BigInt,
    z2: &BigInt,
    s1: &BigInt,
    s2: &BigInt,
    n: &BigInt,
) -> Result<BigInt> {
    let ds = reduce(&(s1 - s2), n);
    let dz = reduce(&(z1 - z2), n);
    let ds_inv = mod_inverse(&ds, n)?;
    Ok(reduce(&(dz * ds_inv), n))
}

/// Recovers the private key `d = (s*k - z) / r mod n` once `k` is known.
pub fn recover_private_key(
    r: &BigInt,
    s: &BigInt,
    z: &BigInt,
    k: &BigInt,
    n: &BigInt,
) -> Result<BigInt> {
    let r_inv = mod_inverse(r, n)?;
    Ok(reduce(&((s * k - z) * r_inv), n))
}

/// Parses a reduced, non-negative decimal scalar (`0 <= value < n`).
///
/// Leading zeros and anything other than ASCII digits are rejected.
pub fn parse_scalar_decimal_strict(s: &str, n: &BigInt) -> anyhow::Result<BigInt> {
    if s.is_empty() {
        bail!("Empty decimal string");
    }
    if !s.chars().all(|c| c.is_ascii_digit()) {
        bail!("Invalid decimal string: only digits 0-9 allowed");
    }
    if s.len() > 1 && s.starts_with('0') {
        bail!("Invalid decimal string: no leading zeros allowed");
    }

    let value =
        BigInt::from_str_radix(s, 10).map_err(|e| anyhow!("Failed to parse decimal: {}", e))?;
    if value >= *n {
        bail!("Value >= curve order n, ensure your data is already reduced");
    }
    Ok(value)
}

pub fn scalar_to_decimal_string(scalar: &BigInt) -> String {
    scalar.to_str_radix(10)
}

/// Zero-padded 32-byte big-endian hex encoding of a non-negative scalar.
pub fn scalar_to_hex_string(scalar: &BigInt) -> String {
    let (_, bytes) = scalar.to_bytes_be();
    let mut padded = vec![0u8; 32usize.saturating_sub(bytes.len())];
    padded.extend_from_slice(&bytes);
    hex::encode(padded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::CurveParams;
    use num_integer::Integer;
    use proptest::prelude::*;

    fn n() -> BigInt {
        CurveParams::secp256k1().n
    }

    fn dec(s: &str) -> BigInt {
        parse_scalar_decimal_strict(s, &n()).unwrap()
    }

    #[test]
    fn test_mod_inverse_small() {
        let inv = mod_inverse(&BigInt::from(3), &BigInt::from(11)).unwrap();
        assert_eq!(inv, BigInt::from(4));
    }

    #[test]
    fn test_mod_inverse_normalizes_negative_input() {
        let inv = mod_inverse(&BigInt::from(-3), &BigInt::from(11)).unwrap();
        assert_eq!(reduce(&(BigInt::from(-3) * &inv), &BigInt::from(11)), BigInt::one());
        assert_eq!(inv, BigInt::from(7));
    }

    #[test]
    fn test_mod_inverse_no_inverse() {
        let err = mod_inverse(&BigInt::from(4), &BigInt::from(8)).unwrap_err();
        assert_eq!(err, Error::NoInverse { gcd: BigInt::from(4) });
    }

    #[test]
    fn test_mod_inverse_zero_has_no_inverse() {
        let err = mod_inverse(&BigInt::zero(), &n()).unwrap_err();
        assert!(matches!(err, Error::NoInverse { .. }));
    }

    #[test]
    fn test_mod_inverse_rejects_trivial_modulus() {
        assert!(matches!(
            mod_inverse(&BigInt::from(5), &BigInt::one()),
            Err(Error::InvalidModulus(_))
        ));
    }

    #[test]
    fn test_mod_inverse_curve_order() {
        let a = BigInt::from(12345);
        let inv = mod_inverse(&a, &n()).unwrap();
        assert_eq!(reduce(&(a * inv), &n()), BigInt::one());
    }

    proptest! {
        #[test]
        fn prop_mod_inverse_round_trip(a in -1_000_000i64..1_000_000, m in 2i64..1_000_000) {
            let a = BigInt::from(a);
            let m = BigInt::from(m);
            let gcd = reduce(&a, &m).gcd(&m);
            match mod_inverse(&a, &m) {
                Ok(inv) => {
                    prop_assert!(gcd.is_one());
                    prop_assert!(inv >= BigInt::zero() && inv < m);
                    prop_assert_eq!(reduce(&(&a * inv), &m), BigInt::one());
                }
                Err(Error::NoInverse { gcd: reported }) => {
                    prop_assert!(!gcd.is_one());
                    prop_assert_eq!(reported, gcd);
                }
                Err(other) => prop_assert!(false, "unexpected error {other}"),
            }
        }
    }

    #[test]
    fn test_digest_scalar_is_reduced() {
        let z = digest_scalar(b"This is the first message", &n());
        assert!(z >= BigInt::zero() && z < n());
        assert_ne!(z, digest_scalar(b"This is the second message", &n()));
    }

    #[test]
    fn test_recover_private_key_real_tx() {
        let r = dec("6819641642398093696120236467967538361543858578256722584730163952555838220871");
        let s1 = dec("5111069398017465712735164463809304352000044522184731945150717785434666956473");
        let z1 = dec("4834837306435966184874350434501389872155834069808640791394730023708942795899");
        let s2 = dec("31133511789966193434473156682648022965280901634950536313584626906865295404159");
        let z2 = dec("108808786585075507407446857551522706228868950080801424952567576192808212665067");

        let k = recover_nonce(&z1, &z2, &s1, &s2, &n()).unwrap();
        let priv_key1 = recover_private_key(&r, &s1, &z1, &k, &n()).unwrap();
        let priv_key2 = recover_private_key(&r, &s2, &z2, &k, &n()).unwrap();

        let expected =
            "62958994860637178871299877498639209302063112480839791435318431648713002718353";
        assert_eq!(scalar_to_decimal_string(&priv_key1), expected);
        assert_eq!(scalar_to_decimal_string(&priv_key2), expected);
    }

    #[test]
    fn test_recover_nonce_equal_s_fails() {
        let s = BigInt::from(7);
        let result = recover_nonce(&BigInt::from(1), &BigInt::from(2), &s, &s, &n());
        assert!(matches!(result, Err(Error::NoInverse { .. })));
    }

    #[test]
    fn test_parse_scalar_rejects_leading_zero_and_junk() {
        assert!(parse_scalar_decimal_strict("012", &n()).is_err());
        assert!(parse_scalar_decimal_strict("12a", &n()).is_err());
        assert!(parse_scalar_decimal_strict("", &n()).is_err());
    }

    #[test]
    fn test_parse_scalar_rejects_ge_n() {
        let n_decimal =
            "115792089237316195423570985008687907852837564279074904382605163141518161494337";
        let result = parse_scalar_decimal_strict(n_decimal, &n());
        assert!(result.unwrap_err().to_string().contains("curve order"));
    }

    #[test]
    fn test_scalar_to_hex_is_padded() {
        let hex = scalar_to_hex_string(&BigInt::from(12345));
        assert_eq!(hex.len(), 64);
        assert!(hex.ends_with("3039"));
    }

    #[test]
    fn test_mod_inverse_matches_k256() {
        use k256::elliptic_curve::ff::PrimeField;
        use k256::Scalar;

        let a = BigInt::from(12345);
        let inv = mod_inverse(&a, &n()).unwrap();

        let expected = Option::<Scalar>::from(Scalar::from(12345u64).invert()).unwrap();
        let expected = BigInt::from_bytes_be(Sign::Plus, &expected.to_repr());
        assert_eq!(inv, expected);
    }
}
