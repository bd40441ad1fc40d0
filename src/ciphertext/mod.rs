//! BGV ciphertexts and the operations that keep them decryptable.
//!
//! A ciphertext is a list of parts `(c_i, h_i)` over a shared prime set
//! `S`. Decryption computes the phase `sum_i c_i * eval(h_i)` mod `Q_S`
//! and, for plaintext space `t`, recovers `m` from
//! `phase ≡ f * m (mod t)` with `f = Q_S mod t` (1 when `t = 2`).
//!
//! Every public operation is pure: it returns a new ciphertext and leaves
//! its inputs alone.

mod arith;
mod automorph;
mod keyswitch;
mod level;
mod mult;
mod serialize;

pub use level::ModDownStrategy;
pub use mult::{incremental_product, inner_product, inner_product_plain};

use std::sync::Arc;

use num_integer::Integer;

use crate::chain::PrimeSet;
use crate::error::{Result, Violation};
use crate::keys::handle::SkHandle;
use crate::keys::keygen::PublicKey;
use crate::params::Context;
use crate::ring::ResiduePoly;

/// One summand of a ciphertext.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CtxtPart {
    pub poly: ResiduePoly,
    pub handle: SkHandle,
}

impl CtxtPart {
    pub fn new(poly: ResiduePoly, handle: SkHandle) -> Self {
        Self { poly, handle }
    }
}

#[derive(Clone, Debug)]
pub struct Ciphertext {
    context: Arc<Context>,
    pub_key: Arc<PublicKey>,
    parts: Vec<CtxtPart>,
    prime_set: PrimeSet,
    ptxt_space: u64,
    noise_var: f64,
}

impl Ciphertext {
    /// Empty ciphertext (an encryption of zero with no parts) over the
    /// ciphertext primes. The plaintext space is `gcd(ptxt_space, pk's)`.
    pub fn new(pub_key: &Arc<PublicKey>, ptxt_space: u64) -> Result<Self> {
        let g = ptxt_space.gcd(&pub_key.ptxt_space());
        if g <= 1 {
            return Err(Violation::PlaintextSpaceMismatch(ptxt_space, pub_key.ptxt_space()).into());
        }
        let context = Arc::clone(pub_key.context());
        let prime_set = context.chain.ctxt_primes().clone();
        Ok(Self {
            context,
            pub_key: Arc::clone(pub_key),
            parts: Vec::new(),
            prime_set,
            ptxt_space: g,
            noise_var: 0.0,
        })
    }

    /// Empty ciphertext in the public key's plaintext space.
    pub fn empty(pub_key: &Arc<PublicKey>) -> Self {
        let context = Arc::clone(pub_key.context());
        let prime_set = context.chain.ctxt_primes().clone();
        Self {
            context,
            pub_key: Arc::clone(pub_key),
            parts: Vec::new(),
            prime_set,
            ptxt_space: pub_key.ptxt_space(),
            noise_var: 0.0,
        }
    }

    /// Assemble a ciphertext from its parts. The prime set must be valid,
    /// every part must live on it and no two parts may share a handle.
    pub fn from_parts(
        pub_key: &Arc<PublicKey>,
        parts: Vec<CtxtPart>,
        ptxt_space: u64,
        noise_var: f64,
    ) -> Result<Self> {
        let mut ct = Self::new(pub_key, ptxt_space)?;
        if let Some(first) = parts.first() {
            ct.prime_set = first.poly.prime_set().clone();
        }
        if let Some(bad) = parts.iter().find(|p| p.poly.prime_set() != &ct.prime_set) {
            return Err(Violation::MalformedPrimeSet(bad.poly.prime_set().clone()).into());
        }
        if let Some((_, dup)) = parts
            .iter()
            .enumerate()
            .find(|(i, p)| parts[..*i].iter().any(|q| q.handle == p.handle))
        {
            return Err(Violation::DuplicateHandle(dup.handle).into());
        }
        ct.parts = parts;
        ct.noise_var = noise_var;
        ct.check_prime_set()?;
        Ok(ct)
    }

    /// Same keys and plaintext space, no parts, over `prime_set`.
    pub(crate) fn blank_like(&self, prime_set: PrimeSet) -> Self {
        Self {
            context: Arc::clone(&self.context),
            pub_key: Arc::clone(&self.pub_key),
            parts: Vec::new(),
            prime_set,
            ptxt_space: self.ptxt_space,
            noise_var: 0.0,
        }
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    pub fn public_key(&self) -> &Arc<PublicKey> {
        &self.pub_key
    }

    pub fn parts(&self) -> &[CtxtPart] {
        &self.parts
    }

    pub fn prime_set(&self) -> &PrimeSet {
        &self.prime_set
    }

    pub fn ptxt_space(&self) -> u64 {
        self.ptxt_space
    }

    pub fn noise_var(&self) -> f64 {
        self.noise_var
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn num_parts(&self) -> usize {
        self.parts.len()
    }

    /// Index of the part with handle `handle`.
    pub fn part_index(&self, handle: &SkHandle) -> Option<usize> {
        self.parts.iter().position(|p| p.handle == *handle)
    }

    /// The key of the first non-constant part, if any.
    pub fn key_id(&self) -> Option<usize> {
        self.parts.iter().find(|p| !p.handle.is_one()).map(|p| p.handle.key_id())
    }

    /// At most two parts, each constant or `(1, 1, key_id)`.
    pub fn in_canonical_form(&self, key_id: usize) -> bool {
        self.parts.len() <= 2
            && self
                .parts
                .iter()
                .all(|p| p.handle.is_one() || p.handle.is_base(Some(key_id)))
    }

    pub fn verify_prime_set(&self) -> bool {
        self.context.chain.verify_prime_set(&self.prime_set)
    }

    pub(crate) fn check_prime_set(&self) -> Result<()> {
        if self.verify_prime_set() {
            Ok(())
        } else {
            Err(Violation::MalformedPrimeSet(self.prime_set.clone()).into())
        }
    }

    pub(crate) fn check_same_key(&self, other: &Ciphertext) -> Result<()> {
        if Arc::ptr_eq(&self.context, &other.context) && Arc::ptr_eq(&self.pub_key, &other.pub_key) {
            Ok(())
        } else {
            Err(Violation::ContextMismatch.into())
        }
    }

    /// `ln(sqrt(noise) / Q_S)`, how close the noise is to wrapping.
    pub fn log_of_ratio(&self) -> f64 {
        let log_noise = if self.noise_var <= 0.0 { 0.0 } else { self.noise_var.ln() / 2.0 };
        log_noise - self.context.chain.log_of_product(&self.prime_set)
    }

    /// Same prime set, plaintext space, noise estimate within 10% and
    /// parts up to ordering. Public keys are compared by identity when
    /// `compare_pkeys` is set.
    pub fn equals_to(&self, other: &Ciphertext, compare_pkeys: bool) -> bool {
        if compare_pkeys && !Arc::ptr_eq(&self.pub_key, &other.pub_key) {
            return false;
        }
        if self.prime_set != other.prime_set || self.ptxt_space != other.ptxt_space {
            return false;
        }
        if self.noise_var != other.noise_var {
            let ratio = other.noise_var / self.noise_var;
            if !(0.9..=1.1).contains(&ratio) {
                return false;
            }
        }
        let nonzero = |ct: &Ciphertext| ct.parts.iter().filter(|p| !p.poly.is_zero()).count();
        if nonzero(self) != nonzero(other) {
            return false;
        }
        self.parts.iter().filter(|p| !p.poly.is_zero()).all(|p| {
            other
                .part_index(&p.handle)
                .is_some_and(|j| other.parts[j].poly == p.poly)
        })
    }

    /// Drop every part and reset the noise, keeping keys and plaintext
    /// space. The prime set returns to the ciphertext primes.
    pub fn clear(&mut self) {
        self.parts.clear();
        self.prime_set = self.context.chain.ctxt_primes().clone();
        self.noise_var = 0.0;
    }

    /// Restrict the plaintext space to `gcd(ptxt_space, new_space)`.
    pub fn reduce_ptxt_space(&self, new_space: u64) -> Result<Ciphertext> {
        let g = self.ptxt_space.gcd(&new_space);
        if g <= 1 {
            return Err(Violation::PlaintextSpaceMismatch(self.ptxt_space, new_space).into());
        }
        let mut out = self.clone();
        out.ptxt_space = g;
        Ok(out)
    }

    /// `Q_S mod t` when `t > 2`, else 1.
    pub(crate) fn ptxt_factor(&self) -> u64 {
        if self.ptxt_space > 2 {
            self.context.chain.product_mod(&self.prime_set, self.ptxt_space)
        } else {
            1
        }
    }
}

impl PartialEq for Ciphertext {
    fn eq(&self, other: &Self) -> bool {
        self.equals_to(other, true)
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::sync::Arc;

    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use crate::keys::encrypt::{decrypt, encrypt_sk_with_rng};
    use crate::keys::keygen::{PublicKey, SecretKey};
    use crate::params::presets::toy_context;
    use crate::params::Context;
    use crate::ring::poly::CoeffPoly;

    use super::Ciphertext;

    pub struct Fixture {
        pub ctx: Arc<Context>,
        pub sk: SecretKey,
        pub pk: Arc<PublicKey>,
        pub rng: ChaCha20Rng,
    }

    impl Fixture {
        pub fn toy() -> Self {
            let ctx = toy_context().unwrap();
            let mut sk = SecretKey::new(&ctx);
            let mut rng = ChaCha20Rng::seed_from_u64(2024);
            sk.gen_secret_key_with_rng(16, &mut rng).unwrap();
            let pk = sk.public_key();
            Self { ctx, sk, pk, rng }
        }

        pub fn plaintext(&self, coeffs: &[i64]) -> CoeffPoly {
            let mut full = vec![0i64; self.ctx.ring_degree];
            full[..coeffs.len()].copy_from_slice(coeffs);
            CoeffPoly::from_signed(&full, self.ctx.ptxt_space)
        }

        pub fn encrypt(&mut self, pt: &CoeffPoly) -> Ciphertext {
            encrypt_sk_with_rng(pt, &self.sk, &self.pk, &mut self.rng).unwrap()
        }

        pub fn decrypt(&self, ct: &Ciphertext) -> CoeffPoly {
            decrypt(ct, &self.sk).unwrap()
        }
    }
}
