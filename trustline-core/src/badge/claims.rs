//! Badge claim sources.
//!
//! What a badge says about an application depends on its kind: an A2A
//! agent is described by its published agent card, an OASF agent by its
//! OASF record, and an MCP server by the tools and resources it exposes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::types::{BadgeClaims, BadgeType};
use crate::app::{App, AppType};
use crate::error::{Collaborator, Error, Result, UpstreamError};

/// Fetches application descriptions from where the applications publish them.
#[async_trait]
pub trait DiscoveryClient: Send + Sync {
    /// Fetch the agent card published at `well_known_url`.
    async fn discover_a2a(&self, well_known_url: &str) -> std::result::Result<String, UpstreamError>;

    /// Describe the MCP server `name` listening at `url`. `None` when nothing answers.
    async fn discover_mcp(
        &self,
        name: &str,
        url: &str,
    ) -> std::result::Result<Option<serde_json::Value>, UpstreamError>;
}

/// Where the content of a new badge comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClaimSource {
    /// Agent card discovered at a well-known URL
    A2a { well_known_url: String },
    /// OASF record supplied inline
    Oasf { schema: String },
    /// MCP server discovered by name and URL
    Mcp { name: String, url: String },
}

impl ClaimSource {
    pub fn a2a(well_known_url: impl Into<String>) -> Self {
        ClaimSource::A2a {
            well_known_url: well_known_url.into(),
        }
    }

    pub fn oasf(schema: impl Into<String>) -> Self {
        ClaimSource::Oasf {
            schema: schema.into(),
        }
    }

    pub fn mcp(name: impl Into<String>, url: impl Into<String>) -> Self {
        ClaimSource::Mcp {
            name: name.into(),
            url: url.into(),
        }
    }

    /// The application kind this source describes.
    pub fn app_type(&self) -> AppType {
        match self {
            ClaimSource::A2a { .. } => AppType::AgentA2a,
            ClaimSource::Oasf { .. } => AppType::AgentOasf,
            ClaimSource::Mcp { .. } => AppType::McpServer,
        }
    }

    pub fn badge_type(&self) -> BadgeType {
        match self {
            ClaimSource::A2a { .. } | ClaimSource::Oasf { .. } => BadgeType::AgentBadge,
            ClaimSource::Mcp { .. } => BadgeType::McpBadge,
        }
    }

    /// Check required inputs.
    pub fn validate(&self) -> Result<()> {
        let missing = match self {
            ClaimSource::A2a { well_known_url } if well_known_url.trim().is_empty() => {
                Some("well-known URL")
            }
            ClaimSource::Oasf { schema } if schema.trim().is_empty() => Some("OASF schema"),
            ClaimSource::Mcp { name, .. } if name.trim().is_empty() => Some("MCP server name"),
            ClaimSource::Mcp { url, .. } if url.trim().is_empty() => Some("MCP server URL"),
            _ => None,
        };
        match missing {
            Some(field) => Err(Error::ValidationFailed(format!("the {} is required", field))),
            None => Ok(()),
        }
    }

    /// Produce the badge type and claims for `app`.
    pub async fn build_claims(
        &self,
        app: &App,
        discovery: &dyn DiscoveryClient,
    ) -> Result<(BadgeType, BadgeClaims)> {
        if self.app_type() != app.app_type {
            return Err(Error::ValidationFailed(format!(
                "claims describing an {} cannot be issued to the {} '{}'",
                self.app_type(),
                app.app_type,
                app.id
            )));
        }
        self.validate()?;

        let content = match self {
            ClaimSource::A2a { well_known_url } => discovery
                .discover_a2a(well_known_url)
                .await
                .map_err(|err| {
                    Error::upstream(Collaborator::Discovery, "discover A2A agent card", &app.id, err)
                })?,
            ClaimSource::Oasf { schema } => schema.clone(),
            ClaimSource::Mcp { name, url } => {
                let server = discovery
                    .discover_mcp(name, url)
                    .await
                    .map_err(|err| {
                        Error::upstream(Collaborator::Discovery, "discover MCP server", &app.id, err)
                    })?
                    .ok_or_else(|| Error::NotFound(format!("no MCP server found at {}", url)))?;
                serde_json::to_string(&server).map_err(|err| {
                    Error::upstream(Collaborator::Discovery, "encode MCP server", &app.id, err)
                })?
            }
        };

        Ok((
            self.badge_type(),
            BadgeClaims::new(app.resolver_metadata_id.clone(), content),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Discovery;

    #[async_trait]
    impl DiscoveryClient for Discovery {
        async fn discover_a2a(&self, url: &str) -> std::result::Result<String, UpstreamError> {
            Ok(format!(r#"{{"url":"{}"}}"#, url))
        }

        async fn discover_mcp(
            &self,
            name: &str,
            url: &str,
        ) -> std::result::Result<Option<serde_json::Value>, UpstreamError> {
            if url.contains("missing") {
                return Ok(None);
            }
            Ok(Some(json!({"name": name, "url": url, "tools": []})))
        }
    }

    fn app(app_type: AppType) -> App {
        App::new("app-1", app_type).with_resolver_metadata_id("did:example:1")
    }

    #[tokio::test]
    async fn test_a2a_claims() {
        let (badge_type, claims) = ClaimSource::a2a("https://agent/.well-known/agent.json")
            .build_claims(&app(AppType::AgentA2a), &Discovery)
            .await
            .unwrap();
        assert_eq!(badge_type, BadgeType::AgentBadge);
        assert_eq!(claims.id, "did:example:1");
        assert!(claims.badge.contains("agent.json"));
    }

    #[tokio::test]
    async fn test_oasf_claims_are_inline() {
        let (badge_type, claims) = ClaimSource::oasf(r#"{"name":"planner"}"#)
            .build_claims(&app(AppType::AgentOasf), &Discovery)
            .await
            .unwrap();
        assert_eq!(badge_type, BadgeType::AgentBadge);
        assert_eq!(claims.badge, r#"{"name":"planner"}"#);
    }

    #[tokio::test]
    async fn test_mcp_claims() {
        let (badge_type, claims) = ClaimSource::mcp("weather", "http://mcp")
            .build_claims(&app(AppType::McpServer), &Discovery)
            .await
            .unwrap();
        assert_eq!(badge_type, BadgeType::McpBadge);
        let server: serde_json::Value = serde_json::from_str(&claims.badge).unwrap();
        assert_eq!(server["name"], "weather");
    }

    #[tokio::test]
    async fn test_mcp_server_not_found() {
        let err = ClaimSource::mcp("weather", "http://missing")
            .build_claims(&app(AppType::McpServer), &Discovery)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_source_must_match_app_type() {
        let err = ClaimSource::mcp("weather", "http://mcp")
            .build_claims(&app(AppType::AgentA2a), &Discovery)
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_validate_required_inputs() {
        assert!(ClaimSource::a2a(" ").validate().is_err());
        assert!(ClaimSource::oasf("").validate().is_err());
        assert!(ClaimSource::mcp("", "http://mcp").validate().is_err());
        assert!(ClaimSource::mcp("weather", "").validate().is_err());
        assert!(ClaimSource::mcp("weather", "http://mcp").validate().is_ok());
    }
}
