//! Error types shared by the demonstrations

use num_bigint::BigInt;
use thiserror::Error;

/// A result for every fallible demonstration operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported synchronously to the caller of a single operation.
///
/// None of these are retried internally: each one means the demonstration
/// was set up or driven incorrectly.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// `gcd(a, m) != 1`, so `a` has no inverse modulo `m`.
    #[error("the modular inverse does not exist (gcd = {gcd})")]
    NoInverse { gcd: BigInt },

    /// Modular arithmetic was asked to work with a modulus `<= 1`.
    #[error("modulus must be greater than 1, got {0}")]
    InvalidModulus(BigInt),

    /// A private key outside `[1, N)`.
    #[error("private key must lie in [1, n)")]
    InvalidPrivateKey,

    /// Recovery was attempted on two signatures whose `r` values differ.
    #[error("the signatures did not use the same nonce (r values differ)")]
    DifferentNonce,

    /// A protocol operation was invoked from a state that does not allow it.
    #[error("cannot {operation} a session in state {state}")]
    InvalidStateTransition {
        operation: &'static str,
        state: &'static str,
    },
}
