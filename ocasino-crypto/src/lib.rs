pub mod aead;
pub mod hash;

pub use aead::{AmountCipher, CryptoError};
pub use hash::{constant_time_eq, hash_secret, lookup_hash, verify_secret, HashError};
