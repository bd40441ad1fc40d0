use thiserror::Error;

use crate::chain::PrimeSet;
use crate::keys::handle::SkHandle;

/// A broken internal invariant of the ciphertext engine.
///
/// These are never silently repaired: the offending operation aborts and
/// the caller sees exactly which rule was broken.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum Violation {
    #[error("malformed prime set {0}")]
    MalformedPrimeSet(PrimeSet),

    #[error("prime sets have an empty intersection")]
    EmptyIntersection,

    #[error("operands belong to different contexts or public keys")]
    ContextMismatch,

    #[error("cannot multiply secret-key handles {0} and {1}")]
    IncompatibleHandles(SkHandle, SkHandle),

    #[error("secret-key handle {0} appears in more than one part")]
    DuplicateHandle(SkHandle),

    #[error("no key-switching matrix from {from} to key {to_key}")]
    MissingSwitchMatrix { from: SkHandle, to_key: usize },

    #[error("plaintext spaces {0} and {1} are coprime")]
    PlaintextSpaceMismatch(u64, u64),

    #[error("key-switching noise ln {noise:.3} exceeds the special-prime budget ln {budget:.3}")]
    KeySwitchNoiseBudget { noise: f64, budget: f64 },

    #[error("{0} is not a unit modulo m")]
    NotInZmStar(u64),

    #[error("automorphism X -> X^{k} is not reachable under key {key_id}")]
    Unreachable { k: u64, key_id: usize },

    #[error("plaintext space {0} does not support this operation")]
    PlaintextSpaceShape(u64),
}

#[derive(Debug, Error)]
pub enum StrataError {
    #[error("invariant violation: {0}")]
    InvariantViolation(#[from] Violation),

    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("modulus mismatch")]
    ModulusMismatch,

    #[error("ring degree must be a power of 2 and at least 16, got {0}")]
    InvalidRingDegree(usize),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("key not available: {0}")]
    MissingKey(String),
}

impl StrataError {
    /// The violated invariant, if this error is one.
    pub fn violation(&self) -> Option<&Violation> {
        match self {
            StrataError::InvariantViolation(v) => Some(v),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, StrataError>;
