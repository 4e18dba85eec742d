//! Identity provider collaborators.
//!
//! Each application is represented at an identity provider by an OAuth
//! client credentials pair. The pair is created when the application is
//! registered, kept in a tenant-scoped [`CredentialStore`], and exchanged
//! for bearer tokens through [`TokenExchange`] when the tenant does not
//! issue its own tokens.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::UpstreamError;
use crate::store::StoreError;

/// OAuth client credentials of one application.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCredentials {
    pub client_id: String,
    /// Absent for self-issued tenants
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    pub issuer: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl ClientCredentials {
    pub fn new(client_id: impl Into<String>, issuer: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            issuer: issuer.into(),
            scopes: Vec::new(),
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Whether a non-empty client secret is present.
    pub fn has_secret(&self) -> bool {
        self.client_secret.as_deref().is_some_and(|s| !s.is_empty())
    }
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("issuer", &self.issuer)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Tenant-scoped storage for client credentials, keyed by application id.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, tenant_id: &str, app_id: &str)
        -> Result<Option<ClientCredentials>, StoreError>;

    async fn put(
        &self,
        tenant_id: &str,
        app_id: &str,
        credentials: &ClientCredentials,
    ) -> Result<(), StoreError>;

    async fn delete(&self, tenant_id: &str, app_id: &str) -> Result<(), StoreError>;
}

/// Client administration at an external identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create a new client credentials pair.
    async fn create_client_credentials_pair(&self) -> Result<ClientCredentials, UpstreamError>;

    /// Delete a pair previously created.
    async fn delete_client_credentials_pair(
        &self,
        credentials: &ClientCredentials,
    ) -> Result<(), UpstreamError>;
}

/// OAuth client credentials grant against an external identity provider.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    /// Exchange the credentials for a bearer access token.
    async fn token(&self, credentials: &ClientCredentials) -> Result<String, UpstreamError>;
}
