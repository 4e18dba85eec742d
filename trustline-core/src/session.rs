//! Authorization sessions and device step-up challenges.
//!
//! A [`Session`] moves through three states: created with a single-use
//! authorization code, tokenized once the code is exchanged, and finally
//! consumed when its expiry passes. A [`SessionDeviceOtp`] is one human
//! approval challenge raised while enforcing a session.

use std::time::Duration;

use chrono::Utc;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Length of a generated OTP value.
pub const OTP_VALUE_LENGTH: usize = 32;

/// Current time in unix seconds.
pub fn now_unix() -> i64 {
    Utc::now().timestamp()
}

fn secs(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}

/// Generate a random lowercase hex string of `len` characters.
pub fn generate_code(len: usize) -> String {
    let mut bytes = vec![0u8; len.div_ceil(2)];
    OsRng.fill_bytes(&mut bytes);
    let mut code = hex::encode(bytes);
    code.truncate(len);
    code
}

/// One authorization negotiation between a caller and (optionally) a callee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    /// The caller application
    pub owner_app_id: String,
    /// Callee the session is pinned to, `None` for any callee
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    /// Tool the session is pinned to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// End user on whose behalf the caller acts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub authorization_code: String,
    /// Set once the code has been presented to Token
    #[serde(default)]
    pub code_redeemed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Unix seconds
    pub created_at: i64,
    /// Unix seconds, `None` until assigned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl Session {
    /// Create a session owned by `owner_app_id` with a fresh authorization code.
    pub fn new(owner_app_id: impl Into<String>, authorization_code: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_app_id: owner_app_id.into(),
            app_id: None,
            tool_name: None,
            user_id: None,
            authorization_code: authorization_code.into(),
            code_redeemed: false,
            access_token: None,
            created_at: now_unix(),
            expires_at: None,
        }
    }

    /// Pin the session to a callee.
    pub fn with_app_id(mut self, app_id: Option<String>) -> Self {
        self.app_id = app_id;
        self
    }

    /// Pin the session to a tool. Empty names leave it unpinned.
    pub fn with_tool_name(mut self, tool_name: Option<String>) -> Self {
        self.tool_name = tool_name.filter(|name| !name.is_empty());
        self
    }

    /// Record the end user.
    pub fn with_user_id(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    /// Set the expiry `duration` from now.
    pub fn expire_after(&mut self, duration: Duration) {
        self.expires_at = Some(now_unix().saturating_add(secs(duration)));
    }

    /// Expire the session immediately.
    pub fn expire(&mut self) {
        self.expires_at = Some(now_unix() - 3600);
    }

    /// Whether the session is expired at `now` (unix seconds).
    pub fn has_expired_at(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// Whether the session is expired now.
    pub fn has_expired(&self) -> bool {
        self.has_expired_at(now_unix())
    }

    /// A pinned session only accepts its own callee.
    pub fn validate_app(&self, callee_app_id: &str) -> bool {
        self.app_id
            .as_deref()
            .map_or(true, |pinned| pinned == callee_app_id)
    }

    /// A pinned session only accepts its own tool.
    pub fn validate_tool(&self, tool_name: &str) -> bool {
        match self.tool_name.as_deref() {
            None | Some("") => true,
            Some(pinned) => pinned == tool_name,
        }
    }
}

/// Outcome of attaching an access token to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenClaim {
    /// The token now belongs to this session.
    Attached(Session),
    /// Another session already holds the same token.
    HeldBy(Session),
    /// The session already carries a token.
    AlreadyTokenized,
}

/// Outcome of presenting an authorization code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeRedemption {
    /// First presentation of the code.
    Redeemed(Session),
    /// The code was presented before.
    AlreadyRedeemed,
    /// No session carries this code.
    Unknown,
}

/// State of a device OTP as seen by the approval poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpState {
    Pending,
    Approved,
    Denied,
    Used,
    Expired,
}

/// One step-up challenge sent to a user's device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDeviceOtp {
    pub id: String,
    pub value: String,
    pub session_id: String,
    pub device_id: String,
    /// Unix seconds
    pub created_at: i64,
    /// Unix seconds
    pub expires_at: i64,
    /// `None` while pending
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved: Option<bool>,
    /// Set once the poller has consumed the challenge
    #[serde(default)]
    pub used: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl SessionDeviceOtp {
    /// Create a pending challenge valid for `validity`.
    pub fn new(
        session_id: impl Into<String>,
        device_id: impl Into<String>,
        validity: Duration,
    ) -> Self {
        let now = now_unix();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            value: generate_code(OTP_VALUE_LENGTH),
            session_id: session_id.into(),
            device_id: device_id.into(),
            created_at: now,
            expires_at: now.saturating_add(secs(validity)),
            approved: None,
            used: false,
            updated_at: None,
        }
    }

    /// Expired once `now` is past the expiry plus `tolerance`.
    pub fn has_expired_at(&self, now: i64, tolerance: Duration) -> bool {
        self.expires_at.saturating_add(secs(tolerance)) < now
    }

    pub fn is_approved(&self) -> bool {
        self.approved == Some(true)
    }

    pub fn is_denied(&self) -> bool {
        self.approved == Some(false)
    }

    /// Whether a decision has been recorded.
    pub fn is_decided(&self) -> bool {
        self.approved.is_some()
    }

    /// Classify the challenge. Consumption and expiry take precedence over a decision.
    pub fn state_at(&self, now: i64, tolerance: Duration) -> OtpState {
        if self.used {
            OtpState::Used
        } else if self.has_expired_at(now, tolerance) {
            OtpState::Expired
        } else if self.is_denied() {
            OtpState::Denied
        } else if self.is_approved() {
            OtpState::Approved
        } else {
            OtpState::Pending
        }
    }
}
