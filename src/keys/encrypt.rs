use std::sync::Arc;

use num_integer::Integer;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::ciphertext::{Ciphertext, CtxtPart};
use crate::error::{Result, Violation};
use crate::keys::handle::SkHandle;
use crate::keys::keygen::{PublicKey, SecretKey};
use crate::ring::modular::mod_inv;
use crate::ring::poly::CoeffPoly;
use crate::ring::residue::reduce_bigint;
use crate::ring::ResiduePoly;
use crate::sampling::{sample_gaussian_coeffs, sample_small_coeffs};

/// Plaintext space the ciphertext will carry, and the plaintext scaled
/// by `f = Q mod t` as the decryption rule expects.
fn prepare_plaintext(pt: &CoeffPoly, pk: &PublicKey) -> Result<(u64, CoeffPoly)> {
    let t = pt.modulus.gcd(&pk.ptxt_space());
    if t <= 1 {
        return Err(Violation::PlaintextSpaceMismatch(pt.modulus, pk.ptxt_space()).into());
    }
    let chain = &pk.context().chain;
    let f = if t > 2 { chain.product_mod(chain.ctxt_primes(), t) } else { 1 };
    let m = CoeffPoly::from_coeffs(pt.coeffs.clone(), t).scalar_mul(f);
    Ok((t, m))
}

/// Public-key encryption over the ciphertext primes.
///
/// ct = (b*r + t*e0 + f*m, a*r + t*e1), r with coefficients in {-1, 0, 1}.
pub fn encrypt_pk(pt: &CoeffPoly, pk: &Arc<PublicKey>) -> Result<Ciphertext> {
    let mut rng = ChaCha20Rng::from_os_rng();
    encrypt_pk_with_rng(pt, pk, &mut rng)
}

pub fn encrypt_pk_with_rng<R: Rng>(pt: &CoeffPoly, pk: &Arc<PublicKey>, rng: &mut R) -> Result<Ciphertext> {
    let ek = pk.encryption_key()?;
    let context = pk.context();
    let chain = &context.chain;
    let n = context.ring_degree;
    let ctxt = chain.ctxt_primes();
    let (t, m) = prepare_plaintext(pt, pk)?;

    let r = ResiduePoly::from_signed(chain, ctxt, &sample_small_coeffs(n, rng))?;
    let e0 = ResiduePoly::from_signed(chain, ctxt, &sample_gaussian_coeffs(n, context.stdev, rng))?;
    let e1 = ResiduePoly::from_signed(chain, ctxt, &sample_gaussian_coeffs(n, context.stdev, rng))?;
    let m = ResiduePoly::from_plaintext(chain, ctxt, &m)?;

    let c0 = ek.b.mul(&r)?.add(&e0.scalar_mul(t))?.add(&m)?;
    let c1 = ek.a.mul(&r)?.add(&e1.scalar_mul(t))?;

    let phi = context.phi_m() as f64;
    let h = pk.key_weight(0)? as f64;
    let tf = t as f64;
    let sigma2 = context.stdev * context.stdev;
    let noise_var = ek.noise_var * phi / 2.0 + tf * tf * sigma2 * phi * (1.0 + h) + phi * tf * tf / 4.0;

    Ciphertext::from_parts(
        pk,
        vec![CtxtPart::new(c0, SkHandle::one()), CtxtPart::new(c1, SkHandle::base(0))],
        t,
        noise_var,
    )
}

/// Symmetric encryption under key 0: ct = (-a*s + t*e + f*m, a).
pub fn encrypt_sk(pt: &CoeffPoly, sk: &SecretKey, pk: &Arc<PublicKey>) -> Result<Ciphertext> {
    let mut rng = ChaCha20Rng::from_os_rng();
    encrypt_sk_with_rng(pt, sk, pk, &mut rng)
}

pub fn encrypt_sk_with_rng<R: Rng>(
    pt: &CoeffPoly,
    sk: &SecretKey,
    pk: &Arc<PublicKey>,
    rng: &mut R,
) -> Result<Ciphertext> {
    if !Arc::ptr_eq(sk.context(), pk.context()) {
        return Err(Violation::ContextMismatch.into());
    }
    let context = pk.context();
    let chain = &context.chain;
    let n = context.ring_degree;
    let ctxt = chain.ctxt_primes();
    let (t, m) = prepare_plaintext(pt, pk)?;

    let s = sk.key(0)?.restrict_to(ctxt)?;
    let a = ResiduePoly::sample_uniform(chain, ctxt, rng)?;
    let e = ResiduePoly::from_signed(chain, ctxt, &sample_gaussian_coeffs(n, context.stdev, rng))?;
    let m = ResiduePoly::from_plaintext(chain, ctxt, &m)?;
    let c0 = e.scalar_mul(t).add(&m)?.sub(&a.mul(&s)?)?;

    let phi = context.phi_m() as f64;
    let tf = t as f64;
    let noise_var = tf * tf * context.stdev * context.stdev * phi + phi * tf * tf / 4.0;

    Ciphertext::from_parts(
        pk,
        vec![CtxtPart::new(c0, SkHandle::one()), CtxtPart::new(a, SkHandle::base(0))],
        t,
        noise_var,
    )
}

/// The phase `sum_i c_i * eval(h_i)` over the ciphertext's prime set.
pub fn decrypt_phase(ct: &Ciphertext, sk: &SecretKey) -> Result<ResiduePoly> {
    if !Arc::ptr_eq(ct.context(), sk.context()) {
        return Err(Violation::ContextMismatch.into());
    }
    let chain = &ct.context().chain;
    let set = ct.prime_set();
    let mut phase = ResiduePoly::zero(chain, set)?;
    for part in ct.parts() {
        let term = if part.handle.is_one() {
            part.poly.clone()
        } else {
            let mut key = sk.key(part.handle.key_id())?.restrict_to(set)?;
            if part.handle.power_of_x() != 1 {
                key = key.automorph(part.handle.power_of_x())?;
            }
            part.poly.mul(&key.power(part.handle.power_of_s())?)?
        };
        phase = phase.add(&term)?;
    }
    Ok(phase)
}

/// Recover the plaintext mod `t` from `phase ≡ f * m (mod t)`.
pub fn decrypt(ct: &Ciphertext, sk: &SecretKey) -> Result<CoeffPoly> {
    let t = ct.ptxt_space();
    let n = ct.context().ring_degree;
    if ct.is_empty() {
        return Ok(CoeffPoly::zero(n, t));
    }
    let phase = decrypt_phase(ct, sk)?;
    let f = ct.ptxt_factor();
    let f_inv = mod_inv(f, t).ok_or(Violation::PlaintextSpaceShape(t))?;
    let coeffs = phase.to_centered_bigints().iter().map(|c| reduce_bigint(c, t)).collect();
    Ok(CoeffPoly { coeffs, modulus: t }.scalar_mul(f_inv))
}
