//! In-memory implementations of every storage trait.
//!
//! Data is lost when the process exits. Each store keeps its state behind a
//! single [`RwLock`], so the operations documented as atomic on the traits
//! run entirely under one write lock.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::app::App;
use crate::badge::Badge;
use crate::config::IssuerSettings;
use crate::device::Device;
use crate::idp::{ClientCredentials, CredentialStore};
use crate::keys::{KeyStore, PrivateKey, PublicKey};
use crate::policy::Policy;
use crate::session::{CodeRedemption, Session, SessionDeviceOtp, TokenClaim};
use crate::store::{
    AppRepository, BadgeRepository, DeviceRepository, OtpConsumption, PolicyRepository,
    SessionRepository, SettingsRepository, StoreError,
};

#[derive(Default)]
struct SessionTables {
    sessions: HashMap<String, Session>,
    otps: HashMap<String, SessionDeviceOtp>,
}

/// In-memory sessions and device OTPs.
#[derive(Default)]
pub struct MemorySessionRepository {
    tables: RwLock<SessionTables>,
}

impl MemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions.
    pub fn session_count(&self) -> usize {
        self.tables.read().sessions.len()
    }
}

#[async_trait]
impl SessionRepository for MemorySessionRepository {
    async fn create_session(&self, session: Session) -> Result<Session, StoreError> {
        let mut tables = self.tables.write();
        if tables.sessions.contains_key(&session.id) {
            return Err(StoreError::Conflict(session.id));
        }
        tables.sessions.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn session_by_code(&self, code: &str) -> Result<Option<Session>, StoreError> {
        Ok(self
            .tables
            .read()
            .sessions
            .values()
            .find(|s| s.authorization_code == code)
            .cloned())
    }

    async fn redeem_authorization_code(&self, code: &str) -> Result<CodeRedemption, StoreError> {
        let mut tables = self.tables.write();
        let Some(session) = tables
            .sessions
            .values_mut()
            .find(|s| s.authorization_code == code)
        else {
            return Ok(CodeRedemption::Unknown);
        };
        if session.code_redeemed {
            return Ok(CodeRedemption::AlreadyRedeemed);
        }
        session.code_redeemed = true;
        Ok(CodeRedemption::Redeemed(session.clone()))
    }

    async fn session_by_access_token(&self, token: &str) -> Result<Option<Session>, StoreError> {
        Ok(self
            .tables
            .read()
            .sessions
            .values()
            .find(|s| s.access_token.as_deref() == Some(token))
            .cloned())
    }

    async fn update_session(&self, session: &Session) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        match tables.sessions.get_mut(&session.id) {
            Some(stored) => {
                *stored = session.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(session.id.clone())),
        }
    }

    async fn claim_access_token(
        &self,
        session_id: &str,
        token: &str,
        expires_at: Option<i64>,
    ) -> Result<TokenClaim, StoreError> {
        let mut tables = self.tables.write();
        if let Some(holder) = tables
            .sessions
            .values()
            .find(|s| s.id != session_id && s.access_token.as_deref() == Some(token))
        {
            return Ok(TokenClaim::HeldBy(holder.clone()));
        }

        let session = tables
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))?;
        if session.access_token.is_some() {
            return Ok(TokenClaim::AlreadyTokenized);
        }
        session.access_token = Some(token.to_string());
        session.expires_at = expires_at;
        Ok(TokenClaim::Attached(session.clone()))
    }

    async fn set_expiry_if_unset(
        &self,
        session_id: &str,
        expires_at: i64,
    ) -> Result<Session, StoreError> {
        let mut tables = self.tables.write();
        let session = tables
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))?;
        if session.expires_at.is_none() {
            session.expires_at = Some(expires_at);
        }
        Ok(session.clone())
    }

    async fn create_device_otp(
        &self,
        otp: SessionDeviceOtp,
    ) -> Result<SessionDeviceOtp, StoreError> {
        let mut tables = self.tables.write();
        if tables.otps.contains_key(&otp.id) {
            return Err(StoreError::Conflict(otp.id));
        }
        tables.otps.insert(otp.id.clone(), otp.clone());
        Ok(otp)
    }

    async fn device_otp(&self, id: &str) -> Result<Option<SessionDeviceOtp>, StoreError> {
        Ok(self.tables.read().otps.get(id).cloned())
    }

    async fn device_otp_by_value(
        &self,
        device_id: &str,
        session_id: &str,
        value: &str,
    ) -> Result<Option<SessionDeviceOtp>, StoreError> {
        Ok(self
            .tables
            .read()
            .otps
            .values()
            .find(|otp| {
                otp.device_id == device_id && otp.session_id == session_id && otp.value == value
            })
            .cloned())
    }

    async fn decide_device_otp(
        &self,
        id: &str,
        approved: bool,
        now: i64,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.write();
        let otp = tables
            .otps
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if otp.used || otp.approved.is_some() {
            return Ok(false);
        }
        otp.approved = Some(approved);
        otp.updated_at = Some(now);
        Ok(true)
    }

    async fn consume_device_otp(&self, id: &str, now: i64) -> Result<OtpConsumption, StoreError> {
        let mut tables = self.tables.write();
        let otp = tables
            .otps
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let consumed = !otp.used;
        if consumed {
            otp.used = true;
            otp.updated_at = Some(now);
        }
        Ok(OtpConsumption {
            otp: otp.clone(),
            consumed,
        })
    }
}

/// In-memory policies.
#[derive(Default)]
pub struct MemoryPolicyRepository {
    policies: RwLock<Vec<Policy>>,
}

impl MemoryPolicyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a policy.
    pub fn insert(&self, policy: Policy) {
        let mut policies = self.policies.write();
        policies.retain(|p| p.id != policy.id);
        policies.push(policy);
    }
}

#[async_trait]
impl PolicyRepository for MemoryPolicyRepository {
    async fn policies_assigned_to(&self, app_id: &str) -> Result<Vec<Policy>, StoreError> {
        Ok(self
            .policies
            .read()
            .iter()
            .filter(|p| p.assigned_to == app_id)
            .cloned()
            .collect())
    }
}

/// In-memory applications. Deleted applications are kept but hidden.
#[derive(Default)]
pub struct MemoryAppRepository {
    apps: RwLock<HashMap<String, App>>,
}

impl MemoryAppRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an application.
    pub fn insert(&self, app: App) {
        self.apps.write().insert(app.id.clone(), app);
    }
}

#[async_trait]
impl AppRepository for MemoryAppRepository {
    async fn create_app(&self, app: App) -> Result<App, StoreError> {
        let mut apps = self.apps.write();
        if apps.contains_key(&app.id) {
            return Err(StoreError::Conflict(app.id));
        }
        apps.insert(app.id.clone(), app.clone());
        Ok(app)
    }

    async fn app(&self, id: &str) -> Result<Option<App>, StoreError> {
        Ok(self
            .apps
            .read()
            .get(id)
            .filter(|app| !app.is_deleted())
            .cloned())
    }

    async fn app_by_resolver_metadata_id(&self, id: &str) -> Result<Option<App>, StoreError> {
        Ok(self
            .apps
            .read()
            .values()
            .find(|app| !app.is_deleted() && app.resolver_metadata_id == id)
            .cloned())
    }

    async fn update_app(&self, app: &App) -> Result<(), StoreError> {
        let mut apps = self.apps.write();
        match apps.get_mut(&app.id) {
            Some(stored) if !stored.is_deleted() => {
                *stored = app.clone();
                Ok(())
            }
            _ => Err(StoreError::NotFound(app.id.clone())),
        }
    }

    async fn delete_app(&self, id: &str) -> Result<(), StoreError> {
        let mut apps = self.apps.write();
        match apps.get_mut(id) {
            Some(app) if !app.is_deleted() => {
                app.deleted_at = Some(chrono::Utc::now());
                Ok(())
            }
            _ => Err(StoreError::NotFound(id.to_string())),
        }
    }
}

/// In-memory devices, kept in registration order.
#[derive(Default)]
pub struct MemoryDeviceRepository {
    devices: RwLock<Vec<Device>>,
}

impl MemoryDeviceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeviceRepository for MemoryDeviceRepository {
    async fn devices_for_user(&self, user_id: &str) -> Result<Vec<Device>, StoreError> {
        Ok(self
            .devices
            .read()
            .iter()
            .filter(|d| d.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn create_device(&self, device: Device) -> Result<Device, StoreError> {
        let mut devices = self.devices.write();
        if devices.iter().any(|d| d.id == device.id) {
            return Err(StoreError::Conflict(device.id));
        }
        devices.push(device.clone());
        Ok(device)
    }
}

/// In-memory badges, kept in issuance order.
#[derive(Default)]
pub struct MemoryBadgeRepository {
    badges: RwLock<Vec<Badge>>,
}

impl MemoryBadgeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BadgeRepository for MemoryBadgeRepository {
    async fn create_badge(&self, badge: Badge) -> Result<Badge, StoreError> {
        let mut badges = self.badges.write();
        if badges.iter().any(|b| b.id() == badge.id()) {
            return Err(StoreError::Conflict(badge.id().to_string()));
        }
        badges.push(badge.clone());
        Ok(badge)
    }

    async fn update_badge(&self, badge: &Badge) -> Result<(), StoreError> {
        let mut badges = self.badges.write();
        match badges.iter_mut().find(|b| b.id() == badge.id()) {
            Some(stored) => {
                *stored = badge.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(badge.id().to_string())),
        }
    }

    async fn active_badges(&self, app_id: &str) -> Result<Vec<Badge>, StoreError> {
        Ok(self
            .badges
            .read()
            .iter()
            .filter(|b| b.app_id == app_id && !b.is_revoked())
            .cloned()
            .collect())
    }

    async fn badges(&self, app_id: &str) -> Result<Vec<Badge>, StoreError> {
        Ok(self
            .badges
            .read()
            .iter()
            .filter(|b| b.app_id == app_id)
            .cloned()
            .collect())
    }
}

/// In-memory client credentials keyed by tenant and application.
#[derive(Default)]
pub struct MemoryCredentialStore {
    credentials: RwLock<HashMap<(String, String), ClientCredentials>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(
        &self,
        tenant_id: &str,
        app_id: &str,
    ) -> Result<Option<ClientCredentials>, StoreError> {
        Ok(self
            .credentials
            .read()
            .get(&(tenant_id.to_string(), app_id.to_string()))
            .cloned())
    }

    async fn put(
        &self,
        tenant_id: &str,
        app_id: &str,
        credentials: &ClientCredentials,
    ) -> Result<(), StoreError> {
        self.credentials.write().insert(
            (tenant_id.to_string(), app_id.to_string()),
            credentials.clone(),
        );
        Ok(())
    }

    async fn delete(&self, tenant_id: &str, app_id: &str) -> Result<(), StoreError> {
        self.credentials
            .write()
            .remove(&(tenant_id.to_string(), app_id.to_string()));
        Ok(())
    }
}

/// In-memory signing keys keyed by tenant and key id.
#[derive(Default)]
pub struct MemoryKeyStore {
    keys: RwLock<HashMap<(String, String), PrivateKey>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an existing key for a tenant.
    pub fn insert(&self, tenant_id: &str, key: PrivateKey) {
        self.keys
            .write()
            .insert((tenant_id.to_string(), key.key_id().to_string()), key);
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn generate_and_save_key(&self, tenant_id: &str) -> Result<PublicKey, StoreError> {
        let key = PrivateKey::generate();
        let public = key.public_key();
        self.insert(tenant_id, key);
        Ok(public)
    }

    async fn private_key(
        &self,
        tenant_id: &str,
        key_id: &str,
    ) -> Result<Option<PrivateKey>, StoreError> {
        Ok(self
            .keys
            .read()
            .get(&(tenant_id.to_string(), key_id.to_string()))
            .cloned())
    }

    async fn public_key(
        &self,
        tenant_id: &str,
        key_id: &str,
    ) -> Result<Option<PublicKey>, StoreError> {
        Ok(self
            .keys
            .read()
            .get(&(tenant_id.to_string(), key_id.to_string()))
            .map(PrivateKey::public_key))
    }
}

/// In-memory issuer settings keyed by tenant.
#[derive(Default)]
pub struct MemorySettingsRepository {
    settings: RwLock<HashMap<String, IssuerSettings>>,
}

impl MemorySettingsRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tenant_id: &str, settings: IssuerSettings) {
        self.settings.write().insert(tenant_id.to_string(), settings);
    }
}

#[async_trait]
impl SettingsRepository for MemorySettingsRepository {
    async fn issuer_settings(
        &self,
        tenant_id: &str,
    ) -> Result<Option<IssuerSettings>, StoreError> {
        Ok(self.settings.read().get(tenant_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn tokenized(repo: &MemorySessionRepository, token: &str) -> Session {
        let session = repo
            .create_session(Session::new("a", crate::session::generate_code(16)))
            .await
            .unwrap();
        match repo.claim_access_token(&session.id, token, None).await.unwrap() {
            TokenClaim::Attached(session) => session,
            other => panic!("unexpected claim {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_redeem_code_once() {
        let repo = MemorySessionRepository::new();
        let session = repo.create_session(Session::new("a", "code-1")).await.unwrap();

        match repo.redeem_authorization_code("code-1").await.unwrap() {
            CodeRedemption::Redeemed(redeemed) => assert_eq!(redeemed.id, session.id),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            repo.redeem_authorization_code("code-1").await.unwrap(),
            CodeRedemption::AlreadyRedeemed
        );
        assert_eq!(
            repo.redeem_authorization_code("nope").await.unwrap(),
            CodeRedemption::Unknown
        );
    }

    #[tokio::test]
    async fn test_claim_access_token() {
        let repo = MemorySessionRepository::new();
        let first = tokenized(&repo, "token-1").await;
        assert_eq!(first.access_token.as_deref(), Some("token-1"));

        let second = repo.create_session(Session::new("a", "code-2")).await.unwrap();
        match repo.claim_access_token(&second.id, "token-1", None).await.unwrap() {
            TokenClaim::HeldBy(holder) => assert_eq!(holder.id, first.id),
            other => panic!("unexpected {:?}", other),
        }

        assert_eq!(
            repo.claim_access_token(&first.id, "token-2", None).await.unwrap(),
            TokenClaim::AlreadyTokenized
        );
    }

    #[tokio::test]
    async fn test_set_expiry_only_once() {
        let repo = MemorySessionRepository::new();
        let session = tokenized(&repo, "t").await;

        let first = repo.set_expiry_if_unset(&session.id, 100).await.unwrap();
        assert_eq!(first.expires_at, Some(100));
        let second = repo.set_expiry_if_unset(&session.id, 200).await.unwrap();
        assert_eq!(second.expires_at, Some(100));
    }

    #[tokio::test]
    async fn test_otp_decide_and_consume() {
        let repo = MemorySessionRepository::new();
        let otp = repo
            .create_device_otp(SessionDeviceOtp::new("s", "d", Duration::from_secs(60)))
            .await
            .unwrap();

        assert!(repo.decide_device_otp(&otp.id, true, 1).await.unwrap());
        assert!(!repo.decide_device_otp(&otp.id, false, 2).await.unwrap());

        let first = repo.consume_device_otp(&otp.id, 3).await.unwrap();
        assert!(first.consumed);
        assert!(first.otp.is_approved());
        assert!(!repo.consume_device_otp(&otp.id, 4).await.unwrap().consumed);

        let pending = repo
            .create_device_otp(SessionDeviceOtp::new("s", "d", Duration::from_secs(60)))
            .await
            .unwrap();
        repo.consume_device_otp(&pending.id, 5).await.unwrap();
        assert!(!repo.decide_device_otp(&pending.id, true, 6).await.unwrap());
    }

    #[tokio::test]
    async fn test_otp_lookup_by_value_is_scoped() {
        let repo = MemorySessionRepository::new();
        let otp = repo
            .create_device_otp(SessionDeviceOtp::new("s", "d", Duration::from_secs(60)))
            .await
            .unwrap();

        assert!(repo
            .device_otp_by_value("d", "s", &otp.value)
            .await
            .unwrap()
            .is_some());
        assert!(repo
            .device_otp_by_value("other", "s", &otp.value)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_deleted_apps_are_hidden() {
        let repo = MemoryAppRepository::new();
        let app = repo
            .create_app(
                App::new("app-1", crate::app::AppType::AgentA2a)
                    .with_resolver_metadata_id("did:1"),
            )
            .await
            .unwrap();
        repo.delete_app(&app.id).await.unwrap();

        assert!(repo.app(&app.id).await.unwrap().is_none());
        assert!(repo
            .app_by_resolver_metadata_id("did:1")
            .await
            .unwrap()
            .is_none());
        assert!(matches!(
            repo.delete_app(&app.id).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_key_store_scopes_by_tenant() {
        let keys = MemoryKeyStore::new();
        let public = keys.generate_and_save_key("t1").await.unwrap();

        assert!(keys.private_key("t1", public.key_id()).await.unwrap().is_some());
        assert!(keys.private_key("t2", public.key_id()).await.unwrap().is_none());
        assert_eq!(
            keys.public_key("t1", public.key_id()).await.unwrap(),
            Some(public)
        );
    }
}
