//! Registered applications.
//!
//! An application is either side of an inter-application call: the caller
//! that asks for a session, or the callee whose tools are being invoked.

mod service;

pub use service::AppService;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::badge::Badge;

/// Kind of application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppType {
    #[default]
    Unspecified,
    /// Agent described by a Google A2A agent card
    AgentA2a,
    /// Agent described by an OASF record
    AgentOasf,
    /// Model Context Protocol server
    McpServer,
}

impl AppType {
    /// Calls to tool-addressable applications must always name a tool.
    pub fn is_tool_addressable(&self) -> bool {
        matches!(self, AppType::McpServer)
    }
}

impl std::fmt::Display for AppType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppType::Unspecified => write!(f, "Unspecified"),
            AppType::AgentA2a => write!(f, "A2A agent"),
            AppType::AgentOasf => write!(f, "OASF agent"),
            AppType::McpServer => write!(f, "MCP server"),
        }
    }
}

/// Status of an application, derived from its badges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppStatus {
    #[default]
    Unspecified,
    /// At least one badge is active
    Active,
    /// No badge has been issued yet
    Pending,
    /// Every badge has been revoked
    Revoked,
}

impl AppStatus {
    /// Derive the status from all badges ever issued to an application.
    pub fn from_badges(badges: &[Badge]) -> Self {
        if badges.is_empty() {
            AppStatus::Pending
        } else if badges.iter().any(|badge| !badge.is_revoked()) {
            AppStatus::Active
        } else {
            AppStatus::Revoked
        }
    }
}

/// A registered application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct App {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub app_type: AppType,
    /// Public identity document reference
    pub resolver_metadata_id: String,
    pub status: AppStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl App {
    /// Create a pending application of the given type.
    pub fn new(id: impl Into<String>, app_type: AppType) -> Self {
        Self {
            id: id.into(),
            name: None,
            description: None,
            app_type,
            resolver_metadata_id: String::new(),
            status: AppStatus::Pending,
            created_at: Utc::now(),
            updated_at: None,
            deleted_at: None,
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the resolver metadata id.
    pub fn with_resolver_metadata_id(mut self, id: impl Into<String>) -> Self {
        self.resolver_metadata_id = id.into();
        self
    }

    /// Name shown to humans, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Whether the application has been removed.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::badge::{BadgeClaims, BadgeType, CredentialStatus, VerifiableCredential};

    fn badge(revoked: bool) -> Badge {
        let mut vc = VerifiableCredential::new(
            "issuer",
            BadgeType::AgentBadge,
            BadgeClaims::new("did:example:1", "{}"),
        );
        if revoked {
            vc.status.push(CredentialStatus::revocation());
        }
        Badge::new("app-1", vc)
    }

    #[test]
    fn test_only_mcp_servers_are_tool_addressable() {
        assert!(AppType::McpServer.is_tool_addressable());
        assert!(!AppType::AgentA2a.is_tool_addressable());
        assert!(!AppType::AgentOasf.is_tool_addressable());
        assert!(!AppType::Unspecified.is_tool_addressable());
    }

    #[test]
    fn test_status_from_badges() {
        assert_eq!(AppStatus::from_badges(&[]), AppStatus::Pending);
        assert_eq!(
            AppStatus::from_badges(&[badge(true), badge(false)]),
            AppStatus::Active
        );
        assert_eq!(
            AppStatus::from_badges(&[badge(true), badge(true)]),
            AppStatus::Revoked
        );
    }

    #[test]
    fn test_display_name_falls_back_to_id() {
        let app = App::new("app-1", AppType::AgentA2a);
        assert_eq!(app.display_name(), "app-1");
        assert_eq!(app.with_name("Weather").display_name(), "Weather");
    }

    #[test]
    fn test_app_type_serialization() {
        assert_eq!(
            serde_json::to_string(&AppType::McpServer).unwrap(),
            r#""MCP_SERVER""#
        );
        assert_eq!(
            serde_json::to_string(&AppType::AgentA2a).unwrap(),
            r#""AGENT_A2A""#
        );
    }
}
