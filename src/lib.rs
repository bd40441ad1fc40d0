//! # Strata: BGV Ciphertext Maintenance
//!
//! Leveled BGV ciphertexts over `Z[X]/(X^n + 1)` held in residue form over
//! a chain of NTT primes. The crate keeps a ciphertext decryptable across
//! long sequences of additions, multiplications and automorphisms: it
//! tracks which primes each value lives on, estimates the noise, picks
//! when to drop primes, and relinearizes through key-switching matrices.
//!
//! ## Quick Start
//!
//! ```no_run
//! use strata::prelude::*;
//!
//! // n = 32, p = 7, six ciphertext primes
//! let ctx = strata::params::presets::toy_context().unwrap();
//!
//! // One secret key of Hamming weight 16, plus its s^2 -> s matrix
//! let mut sk = SecretKey::new(&ctx);
//! sk.gen_secret_key(16).unwrap();
//! let pk = sk.public_key();
//!
//! let mut coeffs = vec![0i64; ctx.ring_degree];
//! coeffs[..4].copy_from_slice(&[3, 1, 4, 1]);
//! let pt = CoeffPoly::from_signed(&coeffs, ctx.ptxt_space);
//! let ct = encrypt_pk(&pt, &pk).unwrap();
//!
//! // Square and relinearize
//! let sq = ct.square().unwrap();
//! let out = decrypt(&sq, &sk).unwrap();
//! assert_eq!(out, pt.mul_naive(&pt).unwrap());
//! ```

pub mod chain;
pub mod ciphertext;
pub mod error;
pub mod keys;
pub mod params;
pub mod ring;
pub mod sampling;

/// Convenient re-exports for common types and functions.
pub mod prelude {
    pub use crate::chain::{ModulusChain, PrimeSet};
    pub use crate::ciphertext::{
        incremental_product, inner_product, inner_product_plain, Ciphertext, CtxtPart, ModDownStrategy,
    };
    pub use crate::error::{Result, StrataError, Violation};
    pub use crate::keys::{
        decrypt, encrypt_pk, encrypt_sk, KeySwitchMap, KeySwitchMatrix, PublicKey, SecretKey, SkHandle,
    };
    pub use crate::params::{Context, ContextBuilder};
    pub use crate::ring::{CoeffPoly, NttPoly, ResiduePoly};
}
