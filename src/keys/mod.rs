//! Secret keys, the public key, key-switching matrices and encryption.

pub mod encrypt;
pub mod handle;
pub mod keygen;
pub mod switching;

pub use encrypt::{decrypt, decrypt_phase, encrypt_pk, encrypt_pk_with_rng, encrypt_sk, encrypt_sk_with_rng};
pub use handle::SkHandle;
pub use keygen::{EncryptionKey, PublicKey, SecretKey};
pub use switching::{HiddenColumns, KeySwitchMap, KeySwitchMatrix};
