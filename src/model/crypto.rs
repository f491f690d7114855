//! Signing and ballot encryption.
//!
//! Signatures are Ed25519. The armoured signature carries the signer's
//! verifying key, so a verifier learns which key signed without being told in
//! advance, and compares that key's fingerprint to the one it trusts.
//!
//! Ballot encryption is an integrated encryption scheme over X25519: an
//! ephemeral key agreement with the recipient's public key, HKDF-SHA256 over
//! the ephemeral public key and shared point, then AES-256-GCM.

use std::fmt::{Display, Formatter};

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use data_encoding::{BASE64, HEXUPPER};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use hkdf::Hkdf;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use x25519_dalek::{EphemeralSecret, PublicKey as EncryptionKey, StaticSecret};

const KEY_LENGTH: usize = 32;
const SIGNATURE_LENGTH: usize = 64;
const AES_NONCE_LENGTH: usize = 12;
const AES_TAG_LENGTH: usize = 16;
const HKDF_INFO: &[u8] = b"anonvote ballot encryption v1";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("key material is not valid base64")]
    Encoding,
    #[error("expected {expected} bytes of key material, got {actual}")]
    KeyLength { expected: usize, actual: usize },
    #[error("not a valid Ed25519 verifying key")]
    InvalidVerifyingKey,
    #[error("key agreement produced a non-contributory shared secret")]
    WeakKey,
    #[error("ciphertext is not valid base64")]
    CiphertextEncoding,
    #[error("ciphertext is truncated")]
    Truncated,
    #[error("ciphertext failed authentication")]
    Decryption,
    #[error("encryption failed")]
    Encryption,
}

/// Upper-case hex SHA-256 of a raw public key.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(key: &[u8]) -> Self {
        Self(HEXUPPER.encode(&Sha256::digest(key)))
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of checking an armoured signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub valid: bool,
    /// Fingerprint of the key embedded in the signature, if one could be parsed.
    pub signer: Option<Fingerprint>,
}

impl Verification {
    fn invalid() -> Self {
        Self {
            valid: false,
            signer: None,
        }
    }

    /// True iff the signature is valid and was made by the key with the given fingerprint.
    pub fn signed_by(&self, fingerprint: &Fingerprint) -> bool {
        self.valid && self.signer.as_ref() == Some(fingerprint)
    }
}

/// A voter's signing key pair.
#[derive(Clone)]
pub struct SignerKeys {
    signing: SigningKey,
}

impl SignerKeys {
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    /// The verifying key, base64 encoded, as presented at authentication.
    pub fn public_key(&self) -> String {
        BASE64.encode(self.signing.verifying_key().as_bytes())
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(self.signing.verifying_key().as_bytes())
    }
}

/// The backend's ballot encryption key pair.
#[derive(Clone)]
pub struct TallyKeys {
    secret: StaticSecret,
    public: EncryptionKey,
}

impl TallyKeys {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = EncryptionKey::from(&secret);
        Self { secret, public }
    }

    /// Restore a key pair from its base64 encoded secret.
    pub fn from_secret(secret: &str) -> Result<Self, CryptoError> {
        let secret = StaticSecret::from(decode_key(secret)?);
        let public = EncryptionKey::from(&secret);
        Ok(Self { secret, public })
    }

    /// The public key, base64 encoded, as handed out to voters.
    pub fn public_key(&self) -> String {
        BASE64.encode(self.public.as_bytes())
    }
}

/// Cryptographic operations the protocol depends on.
pub trait CryptoProvider: Send + Sync {
    /// Encrypt `plaintext` to a base64 encoded recipient public key, returning armoured ciphertext.
    fn encrypt(&self, plaintext: &[u8], recipient: &str) -> Result<String, CryptoError>;

    /// Decrypt armoured ciphertext with the recipient's key pair.
    fn decrypt(&self, ciphertext: &str, keys: &TallyKeys) -> Result<Vec<u8>, CryptoError>;

    /// Sign `payload`, returning an armoured signature that embeds the verifying key.
    fn sign(&self, payload: &[u8], keys: &SignerKeys) -> String;

    /// Check an armoured signature over `payload`.
    fn verify(&self, payload: &[u8], signature: &str) -> Verification;

    /// Parse base64 verifying key material and return its fingerprint.
    fn import_key(&self, public_key: &str) -> Result<Fingerprint, CryptoError>;
}

/// [`CryptoProvider`] backed by the dalek curve25519 crates.
#[derive(Debug, Default, Clone, Copy)]
pub struct Dalek;

impl CryptoProvider for Dalek {
    fn encrypt(&self, plaintext: &[u8], recipient: &str) -> Result<String, CryptoError> {
        let recipient = EncryptionKey::from(decode_key(recipient)?);
        let ephemeral = EphemeralSecret::random_from_rng(OsRng);
        let ephemeral_public = EncryptionKey::from(&ephemeral);

        let shared = ephemeral.diffie_hellman(&recipient);
        if !shared.was_contributory() {
            return Err(CryptoError::WeakKey);
        }
        let cipher = derive_cipher(ephemeral_public.as_bytes(), shared.as_bytes());

        let mut nonce = [0u8; AES_NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce);
        let encrypted = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CryptoError::Encryption)?;

        let mut output = Vec::with_capacity(KEY_LENGTH + AES_NONCE_LENGTH + encrypted.len());
        output.extend_from_slice(ephemeral_public.as_bytes());
        output.extend_from_slice(&nonce);
        output.extend(encrypted);
        Ok(BASE64.encode(&output))
    }

    fn decrypt(&self, ciphertext: &str, keys: &TallyKeys) -> Result<Vec<u8>, CryptoError> {
        let bytes = BASE64
            .decode(ciphertext.as_bytes())
            .map_err(|_| CryptoError::CiphertextEncoding)?;
        if bytes.len() < KEY_LENGTH + AES_NONCE_LENGTH + AES_TAG_LENGTH {
            return Err(CryptoError::Truncated);
        }
        let (ephemeral_public, rest) = bytes.split_at(KEY_LENGTH);
        let (nonce, encrypted) = rest.split_at(AES_NONCE_LENGTH);
        let ephemeral_public: [u8; KEY_LENGTH] = ephemeral_public
            .try_into()
            .map_err(|_| CryptoError::Truncated)?;

        let shared = keys
            .secret
            .diffie_hellman(&EncryptionKey::from(ephemeral_public));
        if !shared.was_contributory() {
            return Err(CryptoError::WeakKey);
        }
        derive_cipher(&ephemeral_public, shared.as_bytes())
            .decrypt(Nonce::from_slice(nonce), encrypted)
            .map_err(|_| CryptoError::Decryption)
    }

    fn sign(&self, payload: &[u8], keys: &SignerKeys) -> String {
        let signature = keys.signing.sign(payload);
        let mut output = Vec::with_capacity(KEY_LENGTH + SIGNATURE_LENGTH);
        output.extend_from_slice(keys.signing.verifying_key().as_bytes());
        output.extend_from_slice(&signature.to_bytes());
        BASE64.encode(&output)
    }

    fn verify(&self, payload: &[u8], signature: &str) -> Verification {
        let Ok(bytes) = BASE64.decode(signature.as_bytes()) else {
            return Verification::invalid();
        };
        if bytes.len() != KEY_LENGTH + SIGNATURE_LENGTH {
            return Verification::invalid();
        }
        let (key, signature) = bytes.split_at(KEY_LENGTH);
        let (Ok(key), Ok(signature)) = (
            <[u8; KEY_LENGTH]>::try_from(key),
            <[u8; SIGNATURE_LENGTH]>::try_from(signature),
        ) else {
            return Verification::invalid();
        };
        let Ok(verifying) = VerifyingKey::from_bytes(&key) else {
            return Verification::invalid();
        };

        let signature = Signature::from_bytes(&signature);
        Verification {
            valid: verifying.verify_strict(payload, &signature).is_ok(),
            signer: Some(Fingerprint::of(&key)),
        }
    }

    fn import_key(&self, public_key: &str) -> Result<Fingerprint, CryptoError> {
        let key = decode_key(public_key)?;
        VerifyingKey::from_bytes(&key).map_err(|_| CryptoError::InvalidVerifyingKey)?;
        Ok(Fingerprint::of(&key))
    }
}

fn decode_key(material: &str) -> Result<[u8; KEY_LENGTH], CryptoError> {
    let bytes = BASE64
        .decode(material.trim().as_bytes())
        .map_err(|_| CryptoError::Encoding)?;
    let actual = bytes.len();
    bytes.try_into().map_err(|_| CryptoError::KeyLength {
        expected: KEY_LENGTH,
        actual,
    })
}

fn derive_cipher(ephemeral_public: &[u8], shared: &[u8]) -> Aes256Gcm {
    let mut master = Vec::with_capacity(KEY_LENGTH * 2);
    master.extend_from_slice(ephemeral_public);
    master.extend_from_slice(shared);

    let mut key = [0u8; 32];
    Hkdf::<Sha256>::new(None, &master)
        .expand(HKDF_INFO, &mut key)
        .expect("32 bytes is a valid HKDF-SHA256 output length");
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key))
}
