//! Signature data types, curve parameters and grouping logic

use num_bigint::BigInt;
use num_traits::Num;
use serde::Serialize;
use std::collections::HashMap;

const SECP256K1_ORDER_HEX: &str =
    "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEBAAEDCE6AF48A03BBFD25E8CD0364141";
const SECP256K1_PRIME_HEX: &str =
    "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEFFFFFC2F";
const SECP256K1_GENERATOR_X_HEX: &str =
    "79BE667EF9DCBBAC55A06295CE870B07029BFCDB2DCE28D959F2815B16F81798";

/// Parameters of the simplified signing curve.
///
/// Only the order `n` and the generator x-coordinate take part in signing:
/// `r` is computed as `k * g_x mod n` instead of the x-coordinate of `k*G`.
/// That stand-in keeps the nonce-reuse algebra intact while skipping point
/// arithmetic entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurveParams {
    /// Curve order N, the modulus for every signing scalar.
    pub n: BigInt,
    /// Field prime P.
    pub p: BigInt,
    /// Generator x-coordinate G_X.
    pub g_x: BigInt,
}

impl CurveParams {
    pub fn secp256k1() -> Self {
        Self {
            n: hex_constant(SECP256K1_ORDER_HEX),
            p: hex_constant(SECP256K1_PRIME_HEX),
            g_x: hex_constant(SECP256K1_GENERATOR_X_HEX),
        }
    }
}

impl Default for CurveParams {
    fn default() -> Self {
        Self::secp256k1()
    }
}

fn hex_constant(hex: &str) -> BigInt {
    BigInt::from_str_radix(hex, 16).expect("curve constants are valid hex")
}

/// An ECDSA-style signature `(r, s)`, both reduced mod N.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub r: BigInt,
    pub s: BigInt,
}

/// A message together with the signature produced over it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedMessage {
    pub message: String,
    pub signature: Signature,
}

impl SignedMessage {
    pub fn new(message: impl Into<String>, signature: Signature) -> Self {
        Self {
            message: message.into(),
            signature,
        }
    }
}

/// Signed messages that share an `r` value.
#[derive(Debug, Clone)]
pub struct SignatureGroup {
    pub r: BigInt,
    pub signatures: Vec<SignedMessage>,
}

/// Groups signed messages by `r`, preserving first-seen order of both the
/// groups and their members.
pub fn group_by_r(sigs: &[SignedMessage]) -> Vec<SignatureGroup> {
    let mut index: HashMap<&BigInt, usize> = HashMap::new();
    let mut groups: Vec<SignatureGroup> = Vec::new();

    for sig in sigs {
        let r = &sig.signature.r;
        match index.get(r) {
            Some(&i) => groups[i].signatures.push(sig.clone()),
            None => {
                index.insert(r, groups.len());
                groups.push(SignatureGroup {
                    r: r.clone(),
                    signatures: vec![sig.clone()],
                });
            }
        }
    }

    groups
}

/// Decimal rendering of a signature for reports.
#[derive(Debug, Clone, Serialize)]
pub struct SignatureOutput {
    pub message: String,
    pub r: String,
    pub s: String,
}

impl From<&SignedMessage> for SignatureOutput {
    fn from(signed: &SignedMessage) -> Self {
        Self {
            message: signed.message.clone(),
            r: signed.signature.r.to_str_radix(10),
            s: signed.signature.s.to_str_radix(10),
        }
    }
}
