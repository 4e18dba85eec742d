//! Identity registry collaborator.
//!
//! The registry is the public ledger where badges are published and
//! revoked, and where resolver metadata ids are allocated for new
//! applications.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::badge::VerifiableCredential;
use crate::error::UpstreamError;
use crate::idp::ClientCredentials;

/// The issuer a badge is published or revoked under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issuer {
    pub common_name: String,
    pub key_id: String,
}

impl Issuer {
    pub fn new(common_name: impl Into<String>, key_id: impl Into<String>) -> Self {
        Self {
            common_name: common_name.into(),
            key_id: key_id.into(),
        }
    }
}

/// Remote registry of identities and verifiable credentials.
#[async_trait]
pub trait IdentityRegistry: Send + Sync {
    /// Allocate a resolver metadata id for a new application.
    async fn generate_id(
        &self,
        credentials: &ClientCredentials,
        issuer: &Issuer,
    ) -> Result<String, UpstreamError>;

    /// Publish a signed credential on behalf of the application owning `credentials`.
    async fn publish(
        &self,
        credentials: &ClientCredentials,
        issuer: &Issuer,
        credential: &VerifiableCredential,
    ) -> Result<(), UpstreamError>;

    /// Broadcast the revocation of a credential.
    async fn revoke(
        &self,
        credentials: &ClientCredentials,
        issuer: &Issuer,
        credential: &VerifiableCredential,
    ) -> Result<(), UpstreamError>;
}
