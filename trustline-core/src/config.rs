//! Engine configuration.
//!
//! Configuration is a plain value built once at startup and handed to the
//! services that need it. Nothing here is read from process-wide state.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::BuildError;

/// Default length of a generated authorization code.
pub const DEFAULT_CODE_LENGTH: usize = 128;

/// Default lifetime of a freshly authorized session (5 minutes).
pub const DEFAULT_SESSION_DURATION: Duration = Duration::from_secs(300);

/// Default grace window applied on first enforcement (60 seconds).
pub const DEFAULT_GRACE_WINDOW: Duration = Duration::from_secs(60);

/// Default interval between OTP re-reads (500 ms).
pub const DEFAULT_OTP_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default validity of a device OTP (60 seconds).
pub const DEFAULT_OTP_VALIDITY: Duration = Duration::from_secs(60);

/// Default clock tolerance applied when checking OTP expiry (10 seconds).
pub const DEFAULT_OTP_EXPIRY_TOLERANCE: Duration = Duration::from_secs(10);

/// Default lifetime of a self-issued access token (5 minutes).
pub const DEFAULT_ACCESS_TOKEN_TTL: Duration = Duration::from_secs(300);

/// Timing and sizing parameters of the authorization engine.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use trustline_core::AuthConfig;
///
/// let config = AuthConfig::default()
///     .with_otp_poll_interval(Duration::from_millis(100))
///     .with_otp_validity(Duration::from_secs(30));
///
/// assert_eq!(config.code_length, 128);
/// assert_eq!(config.otp_validity, Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Number of characters in an authorization code
    pub code_length: usize,
    /// Lifetime of a session between Authorize and Token
    pub session_duration: Duration,
    /// Expiry assigned to a tokenized session on its first enforced call
    pub grace_window: Duration,
    /// Tick between OTP re-reads while waiting for a human decision
    pub otp_poll_interval: Duration,
    /// How long an OTP stays valid, and how long the poller waits
    pub otp_validity: Duration,
    /// Clock skew tolerated when checking OTP expiry
    pub otp_expiry_tolerance: Duration,
    /// Lifetime of self-issued access tokens
    pub access_token_ttl: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            code_length: DEFAULT_CODE_LENGTH,
            session_duration: DEFAULT_SESSION_DURATION,
            grace_window: DEFAULT_GRACE_WINDOW,
            otp_poll_interval: DEFAULT_OTP_POLL_INTERVAL,
            otp_validity: DEFAULT_OTP_VALIDITY,
            otp_expiry_tolerance: DEFAULT_OTP_EXPIRY_TOLERANCE,
            access_token_ttl: DEFAULT_ACCESS_TOKEN_TTL,
        }
    }
}

impl AuthConfig {
    /// Set the authorization code length.
    pub fn with_code_length(mut self, length: usize) -> Self {
        self.code_length = length;
        self
    }

    /// Set the Authorize-to-Token session lifetime.
    pub fn with_session_duration(mut self, duration: Duration) -> Self {
        self.session_duration = duration;
        self
    }

    /// Set the post-enforcement grace window.
    pub fn with_grace_window(mut self, window: Duration) -> Self {
        self.grace_window = window;
        self
    }

    /// Set the OTP poll interval.
    pub fn with_otp_poll_interval(mut self, interval: Duration) -> Self {
        self.otp_poll_interval = interval;
        self
    }

    /// Set the OTP validity window.
    pub fn with_otp_validity(mut self, validity: Duration) -> Self {
        self.otp_validity = validity;
        self
    }

    /// Set the OTP expiry tolerance.
    pub fn with_otp_expiry_tolerance(mut self, tolerance: Duration) -> Self {
        self.otp_expiry_tolerance = tolerance;
        self
    }

    /// Set the lifetime of self-issued access tokens.
    pub fn with_access_token_ttl(mut self, ttl: Duration) -> Self {
        self.access_token_ttl = ttl;
        self
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.code_length == 0 {
            return Err(BuildError::InvalidConfig("code_length"));
        }
        if self.otp_poll_interval.is_zero() {
            return Err(BuildError::InvalidConfig("otp_poll_interval"));
        }
        if self.otp_validity.is_zero() {
            return Err(BuildError::InvalidConfig("otp_validity"));
        }
        Ok(())
    }
}

/// Which identity provider backs a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdpType {
    #[default]
    Unspecified,
    Duo,
    Okta,
    Ory,
    Keycloak,
    /// The platform signs its own JWTs
    #[serde(rename = "SELF")]
    SelfIssued,
}

impl IdpType {
    /// Whether tokens are minted locally instead of at an external IdP.
    pub fn is_self_issued(&self) -> bool {
        matches!(self, IdpType::SelfIssued)
    }
}

/// Per-tenant issuer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerSettings {
    /// Common name of the issuer, used as the VC issuer
    pub issuer_id: String,
    /// Key id of the issuer's signing key in the key store
    pub key_id: String,
    /// Identity provider backing this tenant
    pub idp_type: IdpType,
}
