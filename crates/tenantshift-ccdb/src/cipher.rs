//! AES-128-CBC payload encryption compatible with the cloud controller's encryptor.
//!
//! 8-character salts use the legacy OpenSSL `EVP_BytesToKey` (MD5) derivation for
//! key and IV. 16-character salts use PBKDF2-HMAC-SHA256 for the key and the salt
//! itself as IV. Ciphertext is base64 encoded.

use aes::Aes128;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use md5::{Digest, Md5};
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Result, StoreError};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Key-derivation rounds used by the cloud controller.
pub const ENCRYPTION_ITERATIONS: u32 = 2048;

const LEGACY_SALT_LEN: usize = 8;
const SALT_LEN: usize = 16;
const KEY_LEN: usize = 16;
const IV_LEN: usize = 16;

/// Operator-supplied database encryption key
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey(String);

impl EncryptionKey {
    /// Wraps the raw key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns true if the key is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EncryptionKey([REDACTED])")
    }
}

/// Generates a hex salt of `salt_len` characters from `salt_len / 2` random bytes.
pub fn generate_salt(salt_len: usize) -> String {
    let mut bytes = vec![0u8; salt_len / 2];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Encrypts `plaintext` with the given salt and key; returns base64 ciphertext.
pub fn encrypt(plaintext: &str, salt: &str, key: &EncryptionKey) -> Result<String> {
    let (k, iv) = derive_key_iv(salt, key)?;
    let cipher = Aes128CbcEnc::new_from_slices(&k, &iv)
        .map_err(|e| StoreError::Encryption(e.to_string()))?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
    Ok(STANDARD.encode(ciphertext))
}

/// Decrypts base64 `ciphertext` produced with the given salt and key.
pub fn decrypt(ciphertext: &str, salt: &str, key: &EncryptionKey) -> Result<String> {
    let raw = STANDARD
        .decode(ciphertext.trim())
        .map_err(|e| StoreError::Decryption(e.to_string()))?;
    let (k, iv) = derive_key_iv(salt, key)?;
    let cipher = Aes128CbcDec::new_from_slices(&k, &iv)
        .map_err(|e| StoreError::Decryption(e.to_string()))?;
    let plaintext = cipher
        .decrypt_padded_vec_mut::<Pkcs7>(&raw)
        .map_err(|_| StoreError::Decryption("bad padding (wrong key or salt?)".into()))?;
    String::from_utf8(plaintext).map_err(|e| StoreError::Decryption(e.to_string()))
}

fn derive_key_iv(salt: &str, key: &EncryptionKey) -> Result<([u8; KEY_LEN], [u8; IV_LEN])> {
    let salt = salt.as_bytes();
    match salt.len() {
        LEGACY_SALT_LEN => Ok(evp_bytes_to_key(key.as_bytes(), salt, ENCRYPTION_ITERATIONS)),
        SALT_LEN => {
            let mut k = [0u8; KEY_LEN];
            pbkdf2::pbkdf2_hmac::<Sha256>(key.as_bytes(), salt, ENCRYPTION_ITERATIONS, &mut k);
            let mut iv = [0u8; IV_LEN];
            iv.copy_from_slice(salt);
            Ok((k, iv))
        }
        len => Err(StoreError::InvalidSalt { len }),
    }
}

/// OpenSSL `EVP_BytesToKey` with MD5, as used by Ruby's `pkcs5_keyivgen`.
fn evp_bytes_to_key(password: &[u8], salt: &[u8], rounds: u32) -> ([u8; KEY_LEN], [u8; IV_LEN]) {
    let mut material = Vec::with_capacity(KEY_LEN + IV_LEN);
    let mut prev: Vec<u8> = Vec::new();

    while material.len() < KEY_LEN + IV_LEN {
        let mut hasher = Md5::new();
        hasher.update(&prev);
        hasher.update(password);
        hasher.update(salt);
        let mut digest = hasher.finalize().to_vec();
        for _ in 1..rounds {
            digest = Md5::digest(&digest).to_vec();
        }
        material.extend_from_slice(&digest);
        prev = digest;
    }

    let mut k = [0u8; KEY_LEN];
    let mut iv = [0u8; IV_LEN];
    k.copy_from_slice(&material[..KEY_LEN]);
    iv.copy_from_slice(&material[KEY_LEN..KEY_LEN + IV_LEN]);
    material.zeroize();
    (k, iv)
}
