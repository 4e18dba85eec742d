//! User devices and approval notifications.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::UpstreamError;

/// A device registered by a user to receive approval requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub user_id: String,
    /// Push subscription handle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_token: Option<String>,
    #[serde(default)]
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Device {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            subscription_token: None,
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    Info,
    ApprovalRequest,
}

/// Data a device needs to approve or deny one call.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Display name of the calling application
    pub caller_app: String,
    /// Display name of the called application
    pub callee_app: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    pub otp: String,
    pub device_id: String,
    pub session_id: String,
    pub timeout_in_seconds: u64,
}

impl std::fmt::Debug for ApprovalRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalRequest")
            .field("caller_app", &self.caller_app)
            .field("callee_app", &self.callee_app)
            .field("tool_name", &self.tool_name)
            .field("otp", &"<redacted>")
            .field("device_id", &self.device_id)
            .field("session_id", &self.session_id)
            .field("timeout_in_seconds", &self.timeout_in_seconds)
            .finish()
    }
}

/// A push notification delivered to a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub body: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_request: Option<ApprovalRequest>,
}

impl Notification {
    /// Approval request with a human-readable body describing the call.
    pub fn approval_request(request: ApprovalRequest) -> Self {
        let body = match request.tool_name.as_deref() {
            Some(tool) if !tool.is_empty() => format!(
                "The agent '{}' is trying to invoke the tool '{}' of the MCP server '{}'",
                request.caller_app, tool, request.callee_app
            ),
            _ => format!(
                "The agent '{}' is trying to call the agent '{}'",
                request.caller_app, request.callee_app
            ),
        };
        Self {
            body,
            kind: NotificationKind::ApprovalRequest,
            approval_request: Some(request),
        }
    }
}

/// Delivers notifications to user devices.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, device: &Device, notification: Notification)
        -> Result<(), UpstreamError>;
}
