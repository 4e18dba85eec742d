//! Top-level error types for trustline
//!
//! Every operation of the core returns [`Result<T>`]. The [`Error`] enum is
//! flat and categorized by how a caller is expected to react:
//!
//! - [`Error::ValidationFailed`] - fix the request (missing ids, empty tool name)
//! - [`Error::Unauthorized`] - the call is not allowed (no rule, app mismatch, not approved)
//! - [`Error::NotFound`] - an application, session, OTP or badge does not exist
//! - [`Error::Conflict`] - single-use state was already consumed
//! - [`Error::Expired`] - a session or OTP outlived its window
//! - [`Error::Cancelled`] - the request was cancelled while waiting
//! - [`Error::Upstream`] - a collaborator (store, IdP, registry, notifier) failed

use std::fmt;

use thiserror::Error;

/// Boxed source error carried by [`Error::Upstream`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The external collaborator that produced an [`Error::Upstream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collaborator {
    /// Session, policy, app, device, badge or settings repository
    Repository,
    /// Client credentials storage
    CredentialStore,
    /// Signing key storage
    KeyStore,
    /// External IdP token endpoint
    TokenExchange,
    /// External IdP client administration
    IdentityProvider,
    /// Verifiable credential registry
    Registry,
    /// Push notification delivery
    Notifier,
    /// A2A / MCP discovery
    Discovery,
    /// Credential and token signing
    Signer,
}

impl fmt::Display for Collaborator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Collaborator::Repository => "repository",
            Collaborator::CredentialStore => "credential store",
            Collaborator::KeyStore => "key store",
            Collaborator::TokenExchange => "token exchange",
            Collaborator::IdentityProvider => "identity provider",
            Collaborator::Registry => "identity registry",
            Collaborator::Notifier => "notification sender",
            Collaborator::Discovery => "discovery client",
            Collaborator::Signer => "signer",
        };
        f.write_str(name)
    }
}

/// Category of an [`Error`], for callers that branch on the failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ValidationFailed,
    Unauthorized,
    NotFound,
    Conflict,
    Expired,
    Cancelled,
    Upstream,
}

/// Top-level error type for trustline operations
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or missing input
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// The caller is not allowed to perform the call
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The referenced entity does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Single-use state was already consumed
    #[error("conflict: {0}")]
    Conflict(String),

    /// A session or OTP is past its expiry
    #[error("expired: {0}")]
    Expired(String),

    /// The request was cancelled before a decision was reached
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// A collaborator failed
    #[error("{collaborator} failed to {operation} for {entity}: {source}")]
    Upstream {
        collaborator: Collaborator,
        operation: &'static str,
        entity: String,
        #[source]
        source: BoxError,
    },
}

impl Error {
    /// Wrap a collaborator failure with the operation and entity it concerned.
    pub fn upstream(
        collaborator: Collaborator,
        operation: &'static str,
        entity: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Upstream {
            collaborator,
            operation,
            entity: entity.into(),
            source: source.into(),
        }
    }

    /// Shorthand for repository failures, used with `map_err`.
    pub(crate) fn repository<E>(
        operation: &'static str,
        entity: impl Into<String>,
    ) -> impl FnOnce(E) -> Self
    where
        E: Into<BoxError>,
    {
        let entity = entity.into();
        move |err| Self::upstream(Collaborator::Repository, operation, entity, err)
    }

    /// The failure class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ValidationFailed(_) => ErrorKind::ValidationFailed,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Expired(_) => ErrorKind::Expired,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::Upstream { .. } => ErrorKind::Upstream,
        }
    }

    /// The collaborator behind an upstream failure.
    pub fn collaborator(&self) -> Option<Collaborator> {
        match self {
            Self::Upstream { collaborator, .. } => Some(*collaborator),
            _ => None,
        }
    }

    /// Returns true if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::ValidationFailed(_))
    }

    /// Returns true if this is an authorization failure
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    /// Returns true if the referenced entity does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true if single-use state was already consumed
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Returns true if a session or OTP expired
    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Expired(_))
    }

    /// Returns true if the request was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Returns true if a collaborator failed
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Upstream { .. })
    }
}

/// Errors reported by external (non-storage) collaborators: IdPs, the
/// identity registry, push delivery and discovery.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The remote side refused the request
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The remote side could not be reached or is down
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Any other failure
    #[error("{0}")]
    Other(String),
}

/// Errors that can occur when building a service.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A required collaborator was not configured.
    #[error("No {0} configured. Call .with_{0}() before .build()")]
    Missing(&'static str),

    /// A configuration value is out of range.
    #[error("Invalid configuration: {0} must be non-zero")]
    InvalidConfig(&'static str),
}

/// Result type for trustline operations
pub type Result<T> = std::result::Result<T, Error>;
