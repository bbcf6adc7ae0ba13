//! Cryptographic primitives for the banknote ledger
//!
//! Keys are NIST P-256. Public keys travel as base64 SPKI DER, private keys as
//! base64 PKCS#8 DER, and signatures as base64 of the fixed-size `r || s` bytes
//! of an ECDSA/SHA-256 signature over the UTF-8 message.

pub mod executor;
pub mod metrics;
pub mod service;

use crate::error::CryptoError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use p256::ecdsa::{
    signature::{Signer, Verifier},
    Signature, SigningKey, VerifyingKey,
};
use p256::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use p256::{PublicKey, SecretKey};
use rand_core::OsRng;
use sha2::{Digest, Sha256};
use std::fmt;

pub use executor::{Job, SubmitError, TaskExecutor, WorkerPool, WorkerStats};
pub use metrics::{CryptoMetrics, MetricsSnapshot};
pub use service::{
    CryptoService, ExecutionStrategy, HashTask, SignTask, TaskResult, VerifyTask,
    DEFAULT_TASK_TIMEOUT,
};

/// A base64-encoded P-256 key pair.
#[derive(Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPair {
    pub public_key: String,
    pub private_key: String,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

impl KeyPair {
    /// Generates a new random key pair using the OS random number generator.
    pub fn generate() -> Result<Self, CryptoError> {
        let secret = SecretKey::random(&mut OsRng);
        Self::from_secret_key(&secret)
    }

    /// Rebuilds the pair from a base64 PKCS#8 private key.
    pub fn from_private_key(private_key: &str) -> Result<Self, CryptoError> {
        let secret = decode_private_key(private_key)?;
        Self::from_secret_key(&secret)
    }

    fn from_secret_key(secret: &SecretKey) -> Result<Self, CryptoError> {
        let private_der = secret
            .to_pkcs8_der()
            .map_err(|e| CryptoError::KeyGeneration(format!("PKCS#8 export failed: {}", e)))?;
        let public_der = secret
            .public_key()
            .to_public_key_der()
            .map_err(|e| CryptoError::KeyGeneration(format!("SPKI export failed: {}", e)))?;

        Ok(KeyPair {
            public_key: STANDARD.encode(public_der.as_bytes()),
            private_key: STANDARD.encode(private_der.as_bytes()),
        })
    }

    pub fn sign(&self, message: &str) -> Result<String, CryptoError> {
        sign(message, &self.private_key)
    }
}

/// Generates a fresh P-256 key pair.
pub fn generate_key_pair() -> Result<KeyPair, CryptoError> {
    KeyPair::generate()
}

fn decode_private_key(private_key: &str) -> Result<SecretKey, CryptoError> {
    let der = STANDARD
        .decode(private_key.trim())
        .map_err(|e| CryptoError::InvalidPrivateKey(format!("Invalid base64: {}", e)))?;
    SecretKey::from_pkcs8_der(&der)
        .map_err(|e| CryptoError::InvalidPrivateKey(format!("Invalid PKCS#8 key: {}", e)))
}

fn decode_public_key(public_key: &str) -> Result<PublicKey, CryptoError> {
    let der = STANDARD
        .decode(public_key.trim())
        .map_err(|e| CryptoError::InvalidPublicKey(format!("Invalid base64: {}", e)))?;
    PublicKey::from_public_key_der(&der)
        .map_err(|e| CryptoError::InvalidPublicKey(format!("Invalid SPKI key: {}", e)))
}

/// Signs the UTF-8 bytes of `message` with ECDSA over SHA-256.
pub fn sign(message: &str, private_key: &str) -> Result<String, CryptoError> {
    let secret = decode_private_key(private_key)?;
    let signing_key = SigningKey::from(&secret);
    let signature: Signature = signing_key
        .try_sign(message.as_bytes())
        .map_err(|e| CryptoError::Signing(e.to_string()))?;
    Ok(STANDARD.encode(signature.to_bytes()))
}

/// Verifies a base64 signature. Every malformed input answers `false`.
pub fn verify(signature: &str, message: &str, public_key: &str) -> bool {
    let Ok(public) = decode_public_key(public_key) else {
        return false;
    };
    let Ok(signature_bytes) = STANDARD.decode(signature.trim()) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(&signature_bytes) else {
        return false;
    };

    VerifyingKey::from(&public)
        .verify(message.as_bytes(), &signature)
        .is_ok()
}

/// SHA-256 of the UTF-8 message as 64 lowercase hex characters.
pub fn hash(message: &str) -> String {
    hex::encode(Sha256::digest(message.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_generation_produces_der_blobs() {
        let keypair = generate_key_pair().unwrap();
        let public = STANDARD.decode(&keypair.public_key).unwrap();
        let private = STANDARD.decode(&keypair.private_key).unwrap();
        // SPKI for an uncompressed P-256 point is 91 bytes
        assert_eq!(public.len(), 91);
        assert!(private.len() > 32);
    }

    #[test]
    fn test_from_private_key_recovers_public_key() {
        let keypair = generate_key_pair().unwrap();
        let rebuilt = KeyPair::from_private_key(&keypair.private_key).unwrap();
        assert_eq!(rebuilt.public_key, keypair.public_key);
    }

    #[test]
    fn test_signing_and_verification() {
        let keypair = generate_key_pair().unwrap();
        let message = "Hello, ledger!";

        let signature = sign(message, &keypair.private_key).unwrap();
        assert!(verify(&signature, message, &keypair.public_key));
        assert_eq!(STANDARD.decode(&signature).unwrap().len(), 64);
    }

    #[test]
    fn test_tampered_message() {
        let keypair = generate_key_pair().unwrap();
        let signature = keypair.sign("Original message").unwrap();
        assert!(!verify(&signature, "Tampered message", &keypair.public_key));
    }

    #[test]
    fn test_wrong_public_key() {
        let keypair1 = generate_key_pair().unwrap();
        let keypair2 = generate_key_pair().unwrap();
        let signature = keypair1.sign("Test message").unwrap();
        assert!(!verify(&signature, "Test message", &keypair2.public_key));
    }

    #[test]
    fn test_verify_never_errors_on_garbage() {
        let keypair = generate_key_pair().unwrap();
        let signature = keypair.sign("m").unwrap();
        assert!(!verify("not base64!!", "m", &keypair.public_key));
        assert!(!verify(&signature, "m", "AAAA"));
        assert!(!verify("", "m", ""));
        assert!(!verify(&STANDARD.encode([0u8; 64]), "m", &keypair.public_key));
    }

    #[test]
    fn test_sign_with_malformed_key_fails() {
        let result = sign("m", "bm90IGEga2V5");
        assert!(matches!(result, Err(CryptoError::InvalidPrivateKey(_))));
        let result = sign("m", "%%%");
        assert!(matches!(result, Err(CryptoError::InvalidPrivateKey(_))));
    }

    #[test]
    fn test_hash_is_deterministic_hex() {
        assert_eq!(hash("abc"), hash("abc"));
        assert_ne!(hash("abc"), hash("abd"));
        assert_eq!(
            hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert!(hash("x").chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_keypair_debug_redacts_private_key() {
        let keypair = generate_key_pair().unwrap();
        let rendered = format!("{:?}", keypair);
        assert!(!rendered.contains(&keypair.private_key));
        assert!(rendered.contains("<redacted>"));
    }
}
