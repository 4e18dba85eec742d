//! Persistence traits.
//!
//! The core never talks to a database directly. Each aggregate has a
//! repository trait here, and the operations that guard single-use state
//! (code redemption, token attachment, grace window, OTP decision and
//! consumption) are specified as atomic so concurrent callers cannot both
//! win. [`crate::memory`] provides in-process implementations.

use async_trait::async_trait;

use crate::app::App;
use crate::badge::Badge;
use crate::config::IssuerSettings;
use crate::device::Device;
use crate::policy::Policy;
use crate::session::{CodeRedemption, Session, SessionDeviceOtp, TokenClaim};

/// Errors that can occur in repository operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The record to update does not exist.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A record with the same key already exists.
    #[error("Record already exists: {0}")]
    Conflict(String),

    /// The storage backend failed.
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Result of consuming a device OTP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpConsumption {
    /// The OTP as stored after the call
    pub otp: SessionDeviceOtp,
    /// Whether this call flipped `used` from false to true
    pub consumed: bool,
}

/// Storage for sessions and their device OTPs.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Persist a new session.
    async fn create_session(&self, session: Session) -> Result<Session, StoreError>;

    /// Look up a session by its authorization code.
    async fn session_by_code(&self, code: &str) -> Result<Option<Session>, StoreError>;

    /// Atomically mark the session carrying `code` as redeemed.
    ///
    /// At most one call per code ever returns [`CodeRedemption::Redeemed`].
    async fn redeem_authorization_code(&self, code: &str) -> Result<CodeRedemption, StoreError>;

    /// Look up a session by its access token.
    async fn session_by_access_token(&self, token: &str) -> Result<Option<Session>, StoreError>;

    /// Overwrite a session.
    async fn update_session(&self, session: &Session) -> Result<(), StoreError>;

    /// Atomically attach `token` to the session, unless another session
    /// already holds the same token or this session already has one.
    async fn claim_access_token(
        &self,
        session_id: &str,
        token: &str,
        expires_at: Option<i64>,
    ) -> Result<TokenClaim, StoreError>;

    /// Atomically set the expiry if it is still unset. Returns the session
    /// as stored after the call.
    async fn set_expiry_if_unset(
        &self,
        session_id: &str,
        expires_at: i64,
    ) -> Result<Session, StoreError>;

    /// Persist a new device OTP.
    async fn create_device_otp(&self, otp: SessionDeviceOtp)
        -> Result<SessionDeviceOtp, StoreError>;

    /// Look up a device OTP by id.
    async fn device_otp(&self, id: &str) -> Result<Option<SessionDeviceOtp>, StoreError>;

    /// Look up a device OTP by its value, scoped to a device and session.
    async fn device_otp_by_value(
        &self,
        device_id: &str,
        session_id: &str,
        value: &str,
    ) -> Result<Option<SessionDeviceOtp>, StoreError>;

    /// Atomically record a decision if the OTP is neither used nor decided.
    ///
    /// Returns `true` if the decision was recorded.
    async fn decide_device_otp(&self, id: &str, approved: bool, now: i64)
        -> Result<bool, StoreError>;

    /// Atomically mark the OTP used.
    async fn consume_device_otp(&self, id: &str, now: i64) -> Result<OtpConsumption, StoreError>;
}

/// Read access to access policies.
#[async_trait]
pub trait PolicyRepository: Send + Sync {
    /// All policies assigned to the given calling application, rules included.
    async fn policies_assigned_to(&self, app_id: &str) -> Result<Vec<Policy>, StoreError>;
}

/// Storage for registered applications.
#[async_trait]
pub trait AppRepository: Send + Sync {
    async fn create_app(&self, app: App) -> Result<App, StoreError>;

    /// Look up an application by id. Deleted applications are not returned.
    async fn app(&self, id: &str) -> Result<Option<App>, StoreError>;

    /// Look up an application by its resolver metadata id.
    async fn app_by_resolver_metadata_id(&self, id: &str) -> Result<Option<App>, StoreError>;

    async fn update_app(&self, app: &App) -> Result<(), StoreError>;

    /// Soft-delete an application.
    async fn delete_app(&self, id: &str) -> Result<(), StoreError>;
}

/// Storage for users' registered devices.
#[async_trait]
pub trait DeviceRepository: Send + Sync {
    /// Devices of a user, oldest registration first.
    async fn devices_for_user(&self, user_id: &str) -> Result<Vec<Device>, StoreError>;

    async fn create_device(&self, device: Device) -> Result<Device, StoreError>;
}

/// Storage for issued badges.
#[async_trait]
pub trait BadgeRepository: Send + Sync {
    async fn create_badge(&self, badge: Badge) -> Result<Badge, StoreError>;

    async fn update_badge(&self, badge: &Badge) -> Result<(), StoreError>;

    /// Badges of the application that carry no revocation status.
    async fn active_badges(&self, app_id: &str) -> Result<Vec<Badge>, StoreError>;

    /// Every badge ever issued to the application.
    async fn badges(&self, app_id: &str) -> Result<Vec<Badge>, StoreError>;
}

/// Per-tenant settings.
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn issuer_settings(&self, tenant_id: &str)
        -> Result<Option<IssuerSettings>, StoreError>;
}
