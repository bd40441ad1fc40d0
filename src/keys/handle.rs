use std::fmt;

use crate::error::Violation;

/// Names the secret-key expression `s_keyId(X^powerOfX)^powerOfS` that a
/// ciphertext part multiplies during decryption.
///
/// `power_of_s == 0` is the constant handle: the part is added as-is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SkHandle {
    power_of_s: u32,
    power_of_x: u64,
    key_id: usize,
}

impl Default for SkHandle {
    fn default() -> Self {
        Self::one()
    }
}

impl SkHandle {
    pub const fn new(power_of_s: u32, power_of_x: u64, key_id: usize) -> Self {
        Self { power_of_s, power_of_x, key_id }
    }

    /// The constant handle `(0, 1, 0)`.
    pub const fn one() -> Self {
        Self::new(0, 1, 0)
    }

    /// The canonical handle `(1, 1, key_id)`.
    pub const fn base(key_id: usize) -> Self {
        Self::new(1, 1, key_id)
    }

    pub fn power_of_s(&self) -> u32 {
        self.power_of_s
    }

    pub fn power_of_x(&self) -> u64 {
        self.power_of_x
    }

    pub fn key_id(&self) -> usize {
        self.key_id
    }

    pub fn is_one(&self) -> bool {
        self.power_of_s == 0
    }

    /// `(1, 1, key_id)`, for any key when `key_id` is `None`.
    pub fn is_base(&self, key_id: Option<usize>) -> bool {
        self.power_of_s == 1 && self.power_of_x == 1 && key_id.map_or(true, |id| id == self.key_id)
    }

    /// Product of two handles.
    ///
    /// A constant side yields the other handle. Otherwise both must be
    /// powers of the same key under the same automorphism, and the powers
    /// of `s` add.
    pub fn mul(&self, other: &SkHandle) -> Result<SkHandle, Violation> {
        if self.is_one() {
            return Ok(*other);
        }
        if other.is_one() {
            return Ok(*self);
        }
        if self.key_id != other.key_id || self.power_of_x != other.power_of_x {
            return Err(Violation::IncompatibleHandles(*self, *other));
        }
        Ok(Self::new(self.power_of_s + other.power_of_s, self.power_of_x, self.key_id))
    }

    /// Handle after applying `X -> X^k` to the part; constants are fixed.
    pub fn automorphed(&self, k: u64, m: u64) -> SkHandle {
        if self.is_one() {
            return *self;
        }
        let power_of_x = ((self.power_of_x as u128 * k as u128) % m as u128) as u64;
        Self::new(self.power_of_s, power_of_x, self.key_id)
    }
}

impl fmt::Display for SkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} {} {}]", self.power_of_s, self.power_of_x, self.key_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_is_identity() {
        let h = SkHandle::new(2, 5, 1);
        assert_eq!(SkHandle::one().mul(&h).unwrap(), h);
        assert_eq!(h.mul(&SkHandle::one()).unwrap(), h);
        assert_eq!(SkHandle::default(), SkHandle::new(0, 1, 0));
    }

    #[test]
    fn test_powers_add() {
        let s = SkHandle::base(0);
        let s2 = s.mul(&s).unwrap();
        assert_eq!(s2, SkHandle::new(2, 1, 0));
        assert_eq!(s2.mul(&s).unwrap().power_of_s(), 3);
    }

    #[test]
    fn test_incompatible() {
        let a = SkHandle::base(0);
        assert!(matches!(a.mul(&SkHandle::base(1)), Err(Violation::IncompatibleHandles(..))));
        assert!(a.mul(&SkHandle::new(1, 3, 0)).is_err());
    }

    #[test]
    fn test_predicates_and_automorph() {
        let s = SkHandle::base(2);
        assert!(s.is_base(None) && s.is_base(Some(2)) && !s.is_base(Some(0)));
        assert!(SkHandle::one().is_one());
        let moved = s.automorphed(5, 64).automorphed(13, 64);
        assert_eq!(moved, SkHandle::new(1, 65 % 64, 2));
        assert_eq!(SkHandle::one().automorphed(5, 64), SkHandle::one());
        assert_eq!(SkHandle::new(2, 3, 1).to_string(), "[2 3 1]");
    }
}
