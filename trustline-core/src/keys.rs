//! Signing keys.
//!
//! Badges and self-issued access tokens are signed with Ed25519 keys owned
//! by the tenant's issuer. The private half lives in an external
//! [`KeyStore`]; services only ever borrow it for the duration of one
//! signature.

use async_trait::async_trait;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::store::StoreError;

/// Key id derived from the public key bytes.
fn thumbprint(key: &VerifyingKey) -> String {
    let digest = Sha256::digest(key.as_bytes());
    hex::encode(&digest[..16])
}

/// An Ed25519 private key with its key id.
#[derive(Clone)]
pub struct PrivateKey {
    key_id: String,
    key: SigningKey,
}

impl PrivateKey {
    /// Generate a fresh key. The key id is the public key thumbprint.
    pub fn generate() -> Self {
        let key = SigningKey::generate(&mut OsRng);
        let key_id = thumbprint(&key.verifying_key());
        Self { key_id, key }
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            key_id: self.key_id.clone(),
            key: self.key.verifying_key(),
        }
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.key.sign(message)
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

/// An Ed25519 public key with its key id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    key_id: String,
    key: VerifyingKey,
}

impl PublicKey {
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        self.key.verify(message, signature).is_ok()
    }
}

/// Tenant-scoped storage for signing keys.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Generate a new key for the tenant and persist it.
    async fn generate_and_save_key(&self, tenant_id: &str) -> Result<PublicKey, StoreError>;

    async fn private_key(&self, tenant_id: &str, key_id: &str)
        -> Result<Option<PrivateKey>, StoreError>;

    async fn public_key(&self, tenant_id: &str, key_id: &str)
        -> Result<Option<PublicKey>, StoreError>;
}
