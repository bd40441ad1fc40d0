use std::sync::Arc;

use num_bigint::BigInt;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tracing::{debug, instrument};
use zeroize::Zeroize;

use crate::error::{Result, StrataError};
use crate::keys::handle::SkHandle;
use crate::keys::switching::{HiddenColumns, KeySwitchMap, KeySwitchMatrix};
use crate::params::Context;
use crate::ring::modular::mod_pow;
use crate::ring::ResiduePoly;
use crate::sampling::{sample_gaussian_coeffs, sample_hwt_coeffs};

/// RLWE encryption of zero under key 0: `b + a*s = p*e` over the
/// ciphertext primes.
#[derive(Clone, Debug)]
pub struct EncryptionKey {
    pub b: ResiduePoly,
    pub a: ResiduePoly,
    pub ptxt_space: u64,
    pub noise_var: f64,
}

/// Public material: the encryption key, the per-key Hamming weights and
/// every key-switching matrix with its reachability maps.
#[derive(Clone, Debug)]
pub struct PublicKey {
    context: Arc<Context>,
    encryption_key: Option<EncryptionKey>,
    key_weights: Vec<usize>,
    matrices: Vec<KeySwitchMatrix>,
    switch_maps: Vec<KeySwitchMap>,
}

impl PublicKey {
    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    pub fn encryption_key(&self) -> Result<&EncryptionKey> {
        self.encryption_key
            .as_ref()
            .ok_or_else(|| StrataError::MissingKey("no secret key generated yet".into()))
    }

    /// Plaintext space of the encryption key, the context's by default.
    pub fn ptxt_space(&self) -> u64 {
        self.encryption_key.as_ref().map_or(self.context.ptxt_space, |k| k.ptxt_space)
    }

    pub fn key_weight(&self, key_id: usize) -> Result<usize> {
        self.key_weights
            .get(key_id)
            .copied()
            .ok_or_else(|| StrataError::MissingKey(format!("secret key {key_id}")))
    }

    pub fn matrices(&self) -> &[KeySwitchMatrix] {
        &self.matrices
    }

    pub fn find_matrix(&self, from: &SkHandle, to_key_id: usize) -> Option<&KeySwitchMatrix> {
        self.matrices.iter().find(|w| w.from == *from && w.to_key_id == to_key_id)
    }

    pub fn have_matrix(&self, from: &SkHandle, to_key_id: usize) -> bool {
        self.find_matrix(from, to_key_id).is_some()
    }

    /// First matrix on the path from `X^k` back to the identity under
    /// `key_id`.
    pub fn next_matrix(&self, k: u64, key_id: usize) -> Option<&KeySwitchMatrix> {
        let map = self.switch_maps.get(key_id)?;
        self.matrices.get(map.next_matrix(k % self.context.m)?)
    }

    pub fn is_reachable(&self, k: u64, key_id: usize) -> bool {
        self.switch_maps
            .get(key_id)
            .is_some_and(|map| map.is_reachable(k % self.context.m))
    }
}

/// The secret keys, together with the public key they keep up to date.
pub struct SecretKey {
    public: PublicKey,
    keys: Vec<ResiduePoly>,
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        for key in &mut self.keys {
            key.zeroize();
        }
    }
}

impl SecretKey {
    pub fn new(context: &Arc<Context>) -> Self {
        Self {
            public: PublicKey {
                context: Arc::clone(context),
                encryption_key: None,
                key_weights: Vec::new(),
                matrices: Vec::new(),
                switch_maps: Vec::new(),
            },
            keys: Vec::new(),
        }
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.public.context
    }

    /// Snapshot of the public key. Ciphertexts compare public keys by
    /// identity, so take one snapshot after key generation and share it.
    pub fn public_key(&self) -> Arc<PublicKey> {
        Arc::new(self.public.clone())
    }

    /// Secret key `key_id` over every chain prime.
    pub fn key(&self, key_id: usize) -> Result<&ResiduePoly> {
        self.keys
            .get(key_id)
            .ok_or_else(|| StrataError::MissingKey(format!("secret key {key_id}")))
    }

    /// Generate a key of Hamming weight `hwt`, seeded from the OS.
    pub fn gen_secret_key(&mut self, hwt: usize) -> Result<usize> {
        let mut rng = ChaCha20Rng::from_os_rng();
        self.gen_secret_key_with_rng(hwt, &mut rng)
    }

    /// Generate a key of Hamming weight `hwt`. The first key also yields the
    /// public encryption key; every key gets its `s^2 -> s` matrix.
    pub fn gen_secret_key_with_rng<R: Rng>(&mut self, hwt: usize, rng: &mut R) -> Result<usize> {
        let n = self.public.context.ring_degree;
        if hwt == 0 || hwt > n {
            return Err(StrataError::InvalidParam(format!("key weight {hwt} out of [1, {n}]")));
        }
        let coeffs = sample_hwt_coeffs(n, hwt, rng);
        let key = ResiduePoly::from_signed(&self.public.context.chain, &self.public.context.chain.all_primes(), &coeffs)?;
        let key_id = self.import_secret_key(key, hwt, rng)?;
        self.add_relin_matrix_with_rng(key_id, rng)?;
        Ok(key_id)
    }

    /// Install `key`, which must be over every chain prime.
    pub fn import_secret_key<R: Rng>(&mut self, key: ResiduePoly, hwt: usize, rng: &mut R) -> Result<usize> {
        let context = Arc::clone(&self.public.context);
        let chain = &context.chain;
        if key.prime_set() != &chain.all_primes() {
            return Err(StrataError::InvalidParam(format!(
                "secret key is over {}, need every chain prime",
                key.prime_set()
            )));
        }
        let key_id = self.keys.len();
        if key_id == 0 {
            let t = context.ptxt_space;
            let ctxt = chain.ctxt_primes();
            let s = key.restrict_to(ctxt)?;
            let a = ResiduePoly::sample_uniform(chain, ctxt, rng)?;
            let e = ResiduePoly::from_signed(chain, ctxt, &sample_gaussian_coeffs(context.ring_degree, context.stdev, rng))?;
            let b = e.scalar_mul(t).sub(&a.mul(&s)?)?;
            let phi = context.phi_m() as f64;
            let noise_var = (t as f64) * (t as f64) * phi * context.stdev * context.stdev;
            self.public.encryption_key = Some(EncryptionKey { b, a, ptxt_space: t, noise_var });
        }
        self.keys.push(key);
        self.public.key_weights.push(hwt);
        self.public.switch_maps.push(KeySwitchMap::default());
        debug!(key_id, hwt, "installed secret key");
        Ok(key_id)
    }

    /// Matrix from `s_from(X^from_x_power)^from_s_power` to `s_to`.
    /// Does nothing when that matrix already exists.
    #[instrument(skip(self, rng))]
    pub fn gen_key_switch_matrix_with_rng<R: Rng>(
        &mut self,
        from: SkHandle,
        to_key_id: usize,
        rng: &mut R,
    ) -> Result<()> {
        if from.is_one() {
            return Err(StrataError::InvalidParam("cannot switch from the constant handle".into()));
        }
        if self.public.have_matrix(&from, to_key_id) {
            return Ok(());
        }
        let context = Arc::clone(&self.public.context);
        let chain = &context.chain;
        if !context.in_zm_star(from.power_of_x()) {
            return Err(StrataError::InvalidParam(format!("{} is not a unit mod {}", from.power_of_x(), context.m)));
        }

        let mut source = self.key(from.key_id())?.clone();
        if from.power_of_x() != 1 {
            source = source.automorph(from.power_of_x())?;
        }
        let source = source.power(from.power_of_s())?;
        let target = self.key(to_key_id)?;

        let specials = chain.special_primes();
        let mut scaled = source.scalar_mul_bigint(&BigInt::from(chain.product_of_primes(specials)));

        let t = context.ptxt_space;
        let prg_seed = rng.random::<u64>();
        let mut hidden = HiddenColumns::new(chain, prg_seed);
        let mut b = Vec::with_capacity(chain.digits().len());
        for digit in chain.digits() {
            let a = hidden.next_column()?;
            let noise = sample_gaussian_coeffs(context.ring_degree, context.stdev, rng);
            let e = ResiduePoly::from_signed(chain, &chain.all_primes(), &noise)?;
            b.push(scaled.add(&e.scalar_mul(t))?.sub(&target.mul(&a)?)?);
            scaled = scaled.scalar_mul_bigint(&BigInt::from(chain.product_of_primes(digit)));
        }

        self.public.matrices.push(KeySwitchMatrix { from, to_key_id, ptxt_space: t, prg_seed, b });
        debug!(%from, to_key_id, "generated key-switching matrix");
        Ok(())
    }

    pub fn gen_key_switch_matrix(&mut self, from: SkHandle, to_key_id: usize) -> Result<()> {
        let mut rng = ChaCha20Rng::from_os_rng();
        self.gen_key_switch_matrix_with_rng(from, to_key_id, &mut rng)
    }

    /// The `s^2 -> s` relinearization matrix.
    pub fn add_relin_matrix_with_rng<R: Rng>(&mut self, key_id: usize, rng: &mut R) -> Result<()> {
        self.gen_key_switch_matrix_with_rng(SkHandle::new(2, 1, key_id), key_id, rng)
    }

    /// One matrix `s(X^k) -> s` per listed exponent.
    pub fn add_automorph_matrices_with_rng<R: Rng>(&mut self, key_id: usize, exponents: &[u64], rng: &mut R) -> Result<()> {
        let m = self.public.context.m;
        for &k in exponents {
            let k = k % m;
            if k != 1 {
                self.gen_key_switch_matrix_with_rng(SkHandle::new(1, k, key_id), key_id, rng)?;
            }
        }
        self.set_key_switch_map(key_id)
    }

    /// A matrix for every automorphism of Z_m^*.
    pub fn add_all_matrices_with_rng<R: Rng>(&mut self, key_id: usize, rng: &mut R) -> Result<()> {
        let m = self.public.context.m;
        let units: Vec<u64> = (3..m).step_by(2).collect();
        self.add_automorph_matrices_with_rng(key_id, &units, rng)
    }

    /// Matrices for the Frobenius powers `p^j`, `0 < j < ord(p)`.
    pub fn add_frobenius_matrices_with_rng<R: Rng>(&mut self, key_id: usize, rng: &mut R) -> Result<()> {
        let context = Arc::clone(&self.public.context);
        let ord_p = context
            .ord_p
            .ok_or_else(|| StrataError::InvalidParam(format!("{} is not a unit mod {}", context.p, context.m)))?;
        let powers: Vec<u64> = (1..ord_p).map(|j| mod_pow(context.p, j, context.m)).collect();
        self.add_automorph_matrices_with_rng(key_id, &powers, rng)
    }

    /// Rebuild the reachability map of `key_id` from the current matrices.
    pub fn set_key_switch_map(&mut self, key_id: usize) -> Result<()> {
        let m = self.public.context.m;
        let map = KeySwitchMap::build(&self.public.matrices, key_id, m);
        let slot = self
            .public
            .switch_maps
            .get_mut(key_id)
            .ok_or_else(|| StrataError::MissingKey(format!("secret key {key_id}")))?;
        *slot = map;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::presets::toy_context;

    fn keyed() -> SecretKey {
        let ctx = toy_context().unwrap();
        let mut sk = SecretKey::new(&ctx);
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        sk.gen_secret_key_with_rng(16, &mut rng).unwrap();
        sk
    }

    #[test]
    fn test_first_key_publishes_encryption_key() {
        let sk = keyed();
        let pk = sk.public_key();
        let ek = pk.encryption_key().unwrap();
        assert_eq!(ek.ptxt_space, 7);
        assert_eq!(pk.key_weight(0).unwrap(), 16);
        assert!(pk.have_matrix(&SkHandle::new(2, 1, 0), 0));
        assert!(pk.key_weight(1).is_err());

        // b + a*s is p times a small error
        let chain = &sk.context().chain;
        let s = sk.key(0).unwrap().restrict_to(chain.ctxt_primes()).unwrap();
        let phase = ek.b.add(&ek.a.mul(&s).unwrap()).unwrap();
        for c in phase.to_centered_bigints() {
            let c = i64::try_from(&c).unwrap();
            assert_eq!(c % 7, 0);
            assert!(c.abs() <= 7 * 20);
        }
    }

    #[test]
    fn test_matrix_columns_satisfy_switching_relation() {
        let mut sk = keyed();
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        sk.add_automorph_matrices_with_rng(0, &[5], &mut rng).unwrap();
        let pk = sk.public_key();
        let w = pk.find_matrix(&SkHandle::new(1, 5, 0), 0).unwrap();
        let chain = &sk.context().chain;
        let s = sk.key(0).unwrap();
        let s_from = s.automorph(5).unwrap();

        let mut factor = BigInt::from(chain.product_of_primes(chain.special_primes()));
        let mut hidden = w.hidden_columns(chain);
        for (i, b) in w.b.iter().enumerate() {
            let a = hidden.next_column().unwrap();
            let lhs = b.add(&s.mul(&a).unwrap()).unwrap();
            let expected = s_from.scalar_mul_bigint(&factor);
            let diff = lhs.sub(&expected).unwrap();
            for c in diff.to_centered_bigints() {
                let c = i64::try_from(&c).unwrap();
                assert_eq!(c % 7, 0);
                assert!(c.abs() <= 7 * 20);
            }
            factor *= BigInt::from(chain.product_of_primes(&chain.digits()[i]));
        }
        assert!(pk.is_reachable(5, 0) && pk.is_reachable(25, 0));
        assert!(!pk.is_reachable(3, 0));
    }

    #[test]
    fn test_duplicate_matrix_is_skipped() {
        let mut sk = keyed();
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let before = sk.public_key().matrices().len();
        sk.add_relin_matrix_with_rng(0, &mut rng).unwrap();
        assert_eq!(sk.public_key().matrices().len(), before);
    }

    #[test]
    fn test_frobenius_matrices() {
        let mut sk = keyed();
        let mut rng = ChaCha20Rng::seed_from_u64(4);
        sk.add_frobenius_matrices_with_rng(0, &mut rng).unwrap();
        let pk = sk.public_key();
        // relin + 7 Frobenius powers
        assert_eq!(pk.matrices().len(), 8);
        assert!(pk.is_reachable(49, 0));
        assert!(pk.next_matrix(7 * 7 * 7 % 64, 0).is_some());
    }
}
