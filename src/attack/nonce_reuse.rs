//! Nonce reuse attack implementation

use super::*;
use crate::error::Error;
use crate::math::{
    digest_scalar, mod_inverse, recover_nonce, recover_private_key, reduce,
    scalar_to_decimal_string, scalar_to_hex_string,
};
use crate::signature::{
    group_by_r, CurveParams, Signature, SignatureGroup, SignatureOutput, SignedMessage,
};
use num_bigint::{BigInt, Sign};
use num_traits::{One, Zero};

/// Nonce used when the caller does not supply one. Reusing it across calls
/// is exactly the flaw being demonstrated.
pub const DEMO_NONCE: u64 = 42;

/// Signs under the simplified curve and recovers keys from reused nonces.
#[derive(Debug, Clone, Default)]
pub struct NonceReuseDemo {
    params: CurveParams,
}

/// A private key recovered together with the nonce that leaked it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveredKey {
    pub private_key: BigInt,
    pub nonce: BigInt,
}

impl NonceReuseDemo {
    pub fn new(params: CurveParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &CurveParams {
        &self.params
    }

    /// Signs `message` with `private_key`.
    ///
    /// `r = k * G_X mod N`, `s = k⁻¹ (z + r d) mod N` where `z` is the
    /// SHA-256 digest of the message. Without an explicit nonce the fixed
    /// [`DEMO_NONCE`] is used.
    pub fn sign(
        &self,
        private_key: &BigInt,
        message: &str,
        nonce: Option<&BigInt>,
    ) -> Result<Signature> {
        let n = &self.params.n;
        if private_key.is_zero() || private_key.sign() == Sign::Minus || private_key >= n {
            return Err(Error::InvalidPrivateKey);
        }

        let k = match nonce {
            Some(k) => reduce(k, n),
            None => BigInt::from(DEMO_NONCE),
        };
        let z = digest_scalar(message.as_bytes(), n);
        let r = reduce(&(&k * &self.params.g_x), n);
        let k_inv = mod_inverse(&k, n)?;
        let s = reduce(&(k_inv * (z + &r * private_key)), n);

        Ok(Signature { r, s })
    }

    /// Recovers the private key behind two signatures that share a nonce.
    ///
    /// Fails with [`Error::DifferentNonce`] when the `r` values differ and
    /// with [`Error::NoInverse`] when `s1 == s2` (identical digests).
    pub fn recover_private_key(
        &self,
        message1: &str,
        sig1: &Signature,
        message2: &str,
        sig2: &Signature,
    ) -> Result<BigInt> {
        self.recover_pair(message1, sig1, message2, sig2)
            .map(|key| key.private_key)
    }

    fn recover_pair(
        &self,
        message1: &str,
        sig1: &Signature,
        message2: &str,
        sig2: &Signature,
    ) -> Result<RecoveredKey> {
        if sig1.r != sig2.r {
            return Err(Error::DifferentNonce);
        }
        let n = &self.params.n;
        let z1 = digest_scalar(message1.as_bytes(), n);
        let z2 = digest_scalar(message2.as_bytes(), n);

        let nonce = recover_nonce(&z1, &z2, &sig1.s, &sig2.s, n)?;
        let private_key = recover_private_key(&sig1.r, &sig1.s, &z1, &nonce, n)?;
        Ok(RecoveredKey { private_key, nonce })
    }

    /// Groups of at least two signatures sharing an `r`.
    pub fn detect(&self, signatures: &[SignedMessage]) -> Vec<SignatureGroup> {
        group_by_r(signatures)
            .into_iter()
            .filter(|g| g.signatures.len() >= 2)
            .collect()
    }

    /// Tries every pair of the group until one yields a key.
    pub fn recover_group(&self, group: &SignatureGroup) -> Option<RecoveredKey> {
        let sigs = &group.signatures;
        for i in 0..sigs.len() {
            for j in (i + 1)..sigs.len() {
                let (a, b) = (&sigs[i], &sigs[j]);
                if let Ok(key) =
                    self.recover_pair(&a.message, &a.signature, &b.message, &b.signature)
                {
                    return Some(key);
                }
            }
        }
        None
    }

    /// Re-signs every message of the group with the recovered key and nonce
    /// and checks that the original signatures come back.
    pub fn verify_recovered(&self, key: &RecoveredKey, group: &SignatureGroup) -> bool {
        group.signatures.iter().all(|signed| {
            self.sign(&key.private_key, &signed.message, Some(&key.nonce))
                .map(|sig| sig == signed.signature)
                .unwrap_or(false)
        })
    }
}

/// Settings for one nonce-reuse run.
#[derive(Debug, Clone)]
pub struct NonceReuseConfig {
    /// Fixed private key; `None` draws one from the run's random source.
    pub private_key: Option<BigInt>,
    /// Shared nonce; `None` falls back to [`DEMO_NONCE`].
    pub nonce: Option<BigInt>,
    pub message1: String,
    pub message2: String,
}

impl Default for NonceReuseConfig {
    fn default() -> Self {
        Self {
            private_key: Some(BigInt::from(12345)),
            nonce: None,
            message1: "This is the first message".to_string(),
            message2: "This is the second message".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecoveredKeyOutput {
    pub private_key_decimal: String,
    pub private_key_hex: String,
    pub nonce_decimal: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NonceReuseFinding {
    pub private_key_decimal: String,
    pub signatures: Vec<SignatureOutput>,
    pub shared_r: bool,
    pub recovered_key: Option<RecoveredKeyOutput>,
    pub key_matches: bool,
    pub verified: bool,
}

#[derive(Debug, Clone, Default)]
pub struct NonceReuseAttack {
    pub demo: NonceReuseDemo,
    pub config: NonceReuseConfig,
}

impl NonceReuseAttack {
    pub fn new(config: NonceReuseConfig) -> Self {
        Self {
            demo: NonceReuseDemo::default(),
            config,
        }
    }
}

/// Draws a private key uniformly enough for a demonstration from `[1, n)`.
fn random_private_key(rng: &mut dyn RngCore, n: &BigInt) -> BigInt {
    let mut bytes = [0u8; 48];
    rng.fill_bytes(&mut bytes);
    let wide = BigInt::from_bytes_be(Sign::Plus, &bytes);
    reduce(&wide, &(n - BigInt::one())) + BigInt::one()
}

impl Attack for NonceReuseAttack {
    fn name(&self) -> &'static str {
        "nonce-reuse"
    }

    fn run(&self, rng: &mut dyn RngCore) -> Result<Finding> {
        let private_key = match &self.config.private_key {
            Some(d) => d.clone(),
            None => random_private_key(rng, &self.demo.params().n),
        };
        let nonce = self.config.nonce.as_ref();

        let signed: Vec<SignedMessage> = [&self.config.message1, &self.config.message2]
            .into_iter()
            .map(|message| -> Result<SignedMessage> {
                let signature = self.demo.sign(&private_key, message, nonce)?;
                Ok(SignedMessage::new(message.as_str(), signature))
            })
            .collect::<Result<_>>()?;

        let groups = self.demo.detect(&signed);
        let recovered = groups.first().and_then(|group| {
            let key = self.demo.recover_group(group)?;
            let verified = self.demo.verify_recovered(&key, group);
            Some((key, verified))
        });

        let key_matches = recovered
            .as_ref()
            .is_some_and(|(key, _)| key.private_key == private_key);

        Ok(Finding::NonceReuse(NonceReuseFinding {
            private_key_decimal: scalar_to_decimal_string(&private_key),
            signatures: signed.iter().map(SignatureOutput::from).collect(),
            shared_r: !groups.is_empty(),
            key_matches,
            verified: recovered.as_ref().is_some_and(|(_, verified)| *verified),
            recovered_key: recovered.map(|(key, _)| RecoveredKeyOutput {
                private_key_decimal: scalar_to_decimal_string(&key.private_key),
                private_key_hex: scalar_to_hex_string(&key.private_key),
                nonce_decimal: scalar_to_decimal_string(&key.nonce),
            }),
        }))
    }
}
