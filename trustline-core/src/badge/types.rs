//! Verifiable credential data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Context of every issued credential.
pub const CREDENTIALS_CONTEXT: &str = "https://www.w3.org/ns/credentials/v2";

/// Base type of every issued credential.
pub const CREDENTIAL_TYPE: &str = "VerifiableCredential";

/// Prefix of revocation status ids.
pub const STATUS_ID_PREFIX: &str =
    "https://spec.identity.agntcy.org/protodocs/agntcy/identity/core/v1alpha1/vc.proto#";

/// Content type of a badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BadgeType {
    #[default]
    Unspecified,
    /// OASF or A2A agent description
    AgentBadge,
    /// MCP server description
    McpBadge,
}

impl BadgeType {
    fn parse(value: &str) -> Self {
        match value {
            "AgentBadge" => BadgeType::AgentBadge,
            "McpBadge" => BadgeType::McpBadge,
            _ => BadgeType::Unspecified,
        }
    }
}

impl std::fmt::Display for BadgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BadgeType::Unspecified => write!(f, "Unspecified"),
            BadgeType::AgentBadge => write!(f, "AgentBadge"),
            BadgeType::McpBadge => write!(f, "McpBadge"),
        }
    }
}

/// Credential subject of a badge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeClaims {
    /// Resolver metadata id of the application
    pub id: String,
    /// Serialized description of the application
    pub badge: String,
}

impl BadgeClaims {
    pub fn new(id: impl Into<String>, badge: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            badge: badge.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CredentialStatusPurpose {
    #[default]
    Unspecified,
    Revocation,
}

/// A status entry attached to a credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialStatus {
    pub id: String,
    #[serde(rename = "type")]
    pub status_type: String,
    pub created_at: DateTime<Utc>,
    pub purpose: CredentialStatusPurpose,
}

impl CredentialStatus {
    /// A revocation entry stamped now.
    pub fn revocation() -> Self {
        Self {
            id: format!("{}{}", STATUS_ID_PREFIX, uuid::Uuid::new_v4()),
            status_type: "CredentialStatus".to_string(),
            created_at: Utc::now(),
            purpose: CredentialStatusPurpose::Revocation,
        }
    }

    pub fn is_revocation(&self) -> bool {
        self.purpose == CredentialStatusPurpose::Revocation
    }
}

/// Proof type of compact JWS proofs.
pub const JOSE_PROOF: &str = "JWT";

/// Signature envelope of a credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proof {
    #[serde(rename = "type")]
    pub proof_type: String,
    pub proof_purpose: String,
    pub proof_value: String,
}

impl Proof {
    /// A JWS proof used for assertion.
    pub fn jose(proof_value: impl Into<String>) -> Self {
        Self {
            proof_type: JOSE_PROOF.to_string(),
            proof_purpose: "assertionMethod".to_string(),
            proof_value: proof_value.into(),
        }
    }

    pub fn is_jose(&self) -> bool {
        self.proof_type.eq_ignore_ascii_case(JOSE_PROOF)
    }
}

/// A W3C verifiable credential carrying badge claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiableCredential {
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    #[serde(rename = "type")]
    pub types: Vec<String>,
    pub issuer: String,
    pub credential_subject: BadgeClaims,
    pub id: String,
    pub issuance_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub credential_schema: Vec<CredentialSchema>,
    #[serde(rename = "credentialStatus", default, skip_serializing_if = "Vec::is_empty")]
    pub status: Vec<CredentialStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<Proof>,
}

impl VerifiableCredential {
    /// An unsigned credential issued now.
    pub fn new(issuer: impl Into<String>, badge_type: BadgeType, claims: BadgeClaims) -> Self {
        Self {
            context: vec![CREDENTIALS_CONTEXT.to_string()],
            types: vec![CREDENTIAL_TYPE.to_string(), badge_type.to_string()],
            issuer: issuer.into(),
            credential_subject: claims,
            id: format!("urn:uuid:{}", uuid::Uuid::new_v4()),
            issuance_date: Utc::now(),
            expiration_date: None,
            credential_schema: Vec::new(),
            status: Vec::new(),
            proof: None,
        }
    }

    /// The badge type named in `type`.
    pub fn badge_type(&self) -> BadgeType {
        self.types
            .iter()
            .map(|t| BadgeType::parse(t))
            .find(|t| *t != BadgeType::Unspecified)
            .unwrap_or_default()
    }

    pub fn is_revoked(&self) -> bool {
        self.status.iter().any(CredentialStatus::is_revocation)
    }

    pub fn has_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date.is_some_and(|expires| expires <= now)
    }

    /// A copy of the credential with the proof removed.
    pub fn without_proof(&self) -> Self {
        Self {
            proof: None,
            ..self.clone()
        }
    }
}

/// A credential bound to the application it describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
    #[serde(rename = "verifiableCredential")]
    pub vc: VerifiableCredential,
    #[serde(rename = "appId")]
    pub app_id: String,
}

impl Badge {
    pub fn new(app_id: impl Into<String>, vc: VerifiableCredential) -> Self {
        Self {
            vc,
            app_id: app_id.into(),
        }
    }

    /// Id of the underlying credential.
    pub fn id(&self) -> &str {
        &self.vc.id
    }

    pub fn is_revoked(&self) -> bool {
        self.vc.is_revoked()
    }
}

/// One finding of a badge verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub reason: ErrorReason,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(reason: ErrorReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorReason {
    /// The credential carries no usable proof
    MissingProof,
    /// The proof does not verify against the issuer key
    InvalidProof,
    /// The proof covers different content
    ContentMismatch,
    /// The issuer key cannot be found
    UnknownIssuerKey,
    /// The credential has been revoked
    Revoked,
    /// The credential is past its expiration date
    Expired,
}

/// Outcome of verifying a badge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    /// True when no error was found
    pub status: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<VerifiableCredential>,
    pub media_type: String,
    /// Issuer of the credential
    pub controller: String,
    /// Key id the proof was made with
    pub controlled_identifier_document: String,
    pub warnings: Vec<ErrorInfo>,
    pub errors: Vec<ErrorInfo>,
}
