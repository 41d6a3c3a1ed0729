use aes_gcm::aead::{generic_array::GenericArray, Aead};
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption key missing or malformed: {0}")]
    KeyInvalid(String),
    #[error("decrypt failed")]
    DecryptFailed,
    #[error("ciphertext blob malformed")]
    BlobMalformed,
}

fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Raw key bytes, held only for the span of building the cipher. Wiped on
/// drop so a copy of the key material doesn't linger on the heap after
/// `Aes256Gcm::new` has consumed it into its own expanded round-key form.
#[derive(Zeroize, ZeroizeOnDrop)]
struct KeyMaterial(Vec<u8>);

/// AES-256-GCM wrapper for amount-at-rest encryption.
///
/// Key material is loaded once at startup; if it is absent or the wrong length,
/// construction itself fails — there is no silent "store in plaintext" fallback.
/// The stored blob is `nonce || ciphertext || tag`, URL-safe base64 encoded.
pub struct AmountCipher {
    cipher: Aes256Gcm,
}

impl AmountCipher {
    /// Builds a cipher from a raw 32-byte key. Fails closed on any other length.
    pub fn new(key_bytes: &[u8]) -> Result<Self, CryptoError> {
        if key_bytes.len() != 32 {
            return Err(CryptoError::KeyInvalid(format!(
                "expected 32-byte key, got {} bytes",
                key_bytes.len()
            )));
        }
        let cipher = Aes256Gcm::new(GenericArray::from_slice(key_bytes));
        Ok(Self { cipher })
    }

    /// Builds a cipher from the base64 form the `encryption-key` configuration
    /// option carries it in.
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| CryptoError::KeyInvalid(e.to_string()))?;
        let key = KeyMaterial(bytes);
        Self::new(&key.0)
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, CryptoError> {
        let nonce_bytes = generate_nonce();
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CryptoError::DecryptFailed)?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(blob))
    }

    /// Decrypts a blob produced by `encrypt`. Never reveals which of bad-key,
    /// bad-nonce, or tamper-detection caused the failure — callers only
    /// ever see `DecryptFailed`.
    pub fn decrypt(&self, blob: &str) -> Result<Vec<u8>, CryptoError> {
        let raw = URL_SAFE_NO_PAD.decode(blob).map_err(|_| CryptoError::BlobMalformed)?;
        if raw.len() < NONCE_LEN {
            return Err(CryptoError::BlobMalformed);
        }
        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::DecryptFailed)
    }

    pub fn encrypt_amount(&self, minor_units: i64) -> Result<String, CryptoError> {
        self.encrypt(&minor_units.to_be_bytes())
    }

    pub fn decrypt_amount(&self, blob: &str) -> Result<i64, CryptoError> {
        let bytes = self.decrypt(blob)?;
        let arr: [u8; 8] = bytes.try_into().map_err(|_| CryptoError::BlobMalformed)?;
        Ok(i64::from_be_bytes(arr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cipher() -> AmountCipher {
        AmountCipher::new(&[7u8; 32]).unwrap()
    }

    #[test]
    fn round_trips_an_amount() {
        let cipher = test_cipher();
        let blob = cipher.encrypt_amount(150_00).unwrap();
        assert_eq!(cipher.decrypt_amount(&blob).unwrap(), 150_00);
    }

    #[test]
    fn rejects_short_keys() {
        assert!(AmountCipher::new(&[1u8; 16]).is_err());
    }

    #[test]
    fn tampered_ciphertext_fails_closed() {
        let cipher = test_cipher();
        let mut blob = cipher.encrypt_amount(42).unwrap();
        blob.push('A');
        assert!(matches!(cipher.decrypt(&blob), Err(CryptoError::DecryptFailed) | Err(CryptoError::BlobMalformed)));
    }

    #[test]
    fn nonce_is_fresh_per_encryption() {
        let cipher = test_cipher();
        let a = cipher.encrypt_amount(100).unwrap();
        let b = cipher.encrypt_amount(100).unwrap();
        assert_ne!(a, b, "identical plaintexts must not produce identical blobs");
    }
}
