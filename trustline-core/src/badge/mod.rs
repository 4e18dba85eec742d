//! Badges: verifiable credentials describing applications.
//!
//! [`issue`] builds and signs a credential, [`Revoker`] invalidates every
//! active badge of an application, [`verify_credential`] checks one, and
//! [`BadgeService`] ties them to the repositories and the identity
//! registry.

mod claims;
mod issuer;
mod revoker;
mod service;
pub mod signer;
mod types;
mod verify;

pub use claims::{ClaimSource, DiscoveryClient};
pub use issuer::issue;
pub use revoker::Revoker;
pub use service::BadgeService;
pub use types::{
    Badge, BadgeClaims, BadgeType, CredentialSchema, CredentialStatus, CredentialStatusPurpose,
    ErrorInfo, ErrorReason, Proof, VerifiableCredential, VerificationResult,
};
pub use verify::{verify_credential, MEDIA_TYPE};
