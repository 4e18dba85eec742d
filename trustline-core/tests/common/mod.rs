//! Common test utilities shared across test files.
//!
//! This module wires an [`AuthService`] to the in-memory stores and fake
//! collaborators. Items here may not be used by all test files, hence the
//! module-level allow.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use trustline_core::app::{App, AppService, AppType};
use trustline_core::badge::{BadgeService, DiscoveryClient, VerifiableCredential};
use trustline_core::device::{ApprovalRequest, Device, Notification, NotificationSender};
use trustline_core::idp::{ClientCredentials, CredentialStore, IdentityProvider, TokenExchange};
use trustline_core::jwt::{self, Claims};
use trustline_core::keys::PrivateKey;
use trustline_core::memory::{
    MemoryAppRepository, MemoryBadgeRepository, MemoryCredentialStore, MemoryDeviceRepository,
    MemoryKeyStore, MemoryPolicyRepository, MemorySessionRepository, MemorySettingsRepository,
};
use trustline_core::policy::{Policy, Rule, RuleAction, Task};
use trustline_core::registry::{IdentityRegistry, Issuer};
use trustline_core::session::now_unix;
use trustline_core::store::{AppRepository, DeviceRepository};
use trustline_core::{AuthConfig, AuthService, IdpType, IssuerSettings, RequestContext, Session};
use trustline_core::UpstreamError;

pub const TENANT: &str = "tenant-1";
pub const USER: &str = "user-1";
pub const ISSUER: &str = "did:web:issuer.example";

/// Configuration with short waits so approval tests finish quickly.
pub fn test_config() -> AuthConfig {
    AuthConfig::default()
        .with_otp_poll_interval(Duration::from_millis(10))
        .with_otp_validity(Duration::from_secs(2))
}

// ===== Notification Sender =====

/// Records every notification and wakes tests waiting for one.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(Device, Notification)>>,
    notify: Notify,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following send fail.
    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(Device, Notification)> {
        self.sent.lock().unwrap().clone()
    }

    /// Wait until the `index`-th approval request has been sent.
    pub async fn approval(&self, index: usize) -> ApprovalRequest {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                if let Some(request) = self
                    .sent()
                    .into_iter()
                    .filter_map(|(_, notification)| notification.approval_request)
                    .nth(index)
                {
                    return request;
                }
                notified.await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .expect("no approval request was sent")
    }
}

#[async_trait]
impl NotificationSender for RecordingNotifier {
    async fn send(
        &self,
        device: &Device,
        notification: Notification,
    ) -> Result<(), UpstreamError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(UpstreamError::Unavailable("push service is down".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((device.clone(), notification));
        self.notify.notify_waiters();
        Ok(())
    }
}

// ===== Token Exchange =====

/// Always returns the same token, like an IdP caching a client's token.
pub struct FakeTokenExchange {
    token: String,
}

impl FakeTokenExchange {
    pub fn new(key: &PrivateKey) -> Self {
        let iat = now_unix();
        let claims = Claims {
            iss: "https://idp.example".into(),
            sub: "client".into(),
            aud: None,
            jti: "fixed".into(),
            iat,
            exp: iat + 3600,
            nbf: None,
        };
        Self {
            token: jwt::sign(&claims, key).unwrap(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

#[async_trait]
impl TokenExchange for FakeTokenExchange {
    async fn token(&self, _credentials: &ClientCredentials) -> Result<String, UpstreamError> {
        Ok(self.token.clone())
    }
}

// ===== Identity Registry =====

#[derive(Default)]
pub struct FakeRegistry {
    pub published: Mutex<Vec<String>>,
    pub revoked: Mutex<Vec<String>>,
    fail_generate_id: AtomicBool,
    fail_publish: AtomicBool,
}

impl FakeRegistry {
    pub fn fail_generate_id(&self) {
        self.fail_generate_id.store(true, Ordering::SeqCst);
    }

    pub fn fail_publish(&self) {
        self.fail_publish.store(true, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<String> {
        self.published.lock().unwrap().clone()
    }

    pub fn revoked(&self) -> Vec<String> {
        self.revoked.lock().unwrap().clone()
    }
}

#[async_trait]
impl IdentityRegistry for FakeRegistry {
    async fn generate_id(
        &self,
        credentials: &ClientCredentials,
        _issuer: &Issuer,
    ) -> Result<String, UpstreamError> {
        if self.fail_generate_id.load(Ordering::SeqCst) {
            return Err(UpstreamError::Rejected("registry refused the id".into()));
        }
        Ok(format!("did:registry:{}", credentials.client_id))
    }

    async fn publish(
        &self,
        _credentials: &ClientCredentials,
        _issuer: &Issuer,
        credential: &VerifiableCredential,
    ) -> Result<(), UpstreamError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(UpstreamError::Unavailable("registry is down".into()));
        }
        self.published.lock().unwrap().push(credential.id.clone());
        Ok(())
    }

    async fn revoke(
        &self,
        _credentials: &ClientCredentials,
        _issuer: &Issuer,
        credential: &VerifiableCredential,
    ) -> Result<(), UpstreamError> {
        self.revoked.lock().unwrap().push(credential.id.clone());
        Ok(())
    }
}

// ===== Discovery =====

pub struct FakeDiscovery;

#[async_trait]
impl DiscoveryClient for FakeDiscovery {
    async fn discover_a2a(&self, well_known_url: &str) -> Result<String, UpstreamError> {
        Ok(serde_json::json!({
            "name": "Weather Agent",
            "url": well_known_url,
            "skills": [{"id": "forecast"}],
        })
        .to_string())
    }

    async fn discover_mcp(
        &self,
        name: &str,
        url: &str,
    ) -> Result<Option<serde_json::Value>, UpstreamError> {
        Ok(Some(serde_json::json!({
            "name": name,
            "url": url,
            "tools": [{"name": "forecast"}],
        })))
    }
}

// ===== Identity Provider =====

#[derive(Default)]
pub struct FakeIdp {
    created: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
}

impl FakeIdp {
    pub fn created(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl IdentityProvider for FakeIdp {
    async fn create_client_credentials_pair(&self) -> Result<ClientCredentials, UpstreamError> {
        let client_id = format!("client-{}", uuid::Uuid::new_v4());
        self.created.lock().unwrap().push(client_id.clone());
        Ok(ClientCredentials::new(client_id, "https://idp.example").with_secret("s3cret"))
    }

    async fn delete_client_credentials_pair(
        &self,
        credentials: &ClientCredentials,
    ) -> Result<(), UpstreamError> {
        self.deleted
            .lock()
            .unwrap()
            .push(credentials.client_id.clone());
        Ok(())
    }
}

// ===== Harness =====

/// Every store and collaborator behind an [`AuthService`].
pub struct Harness {
    pub auth: AuthService,
    pub key: PrivateKey,
    pub sessions: Arc<MemorySessionRepository>,
    pub policies: Arc<MemoryPolicyRepository>,
    pub apps: Arc<MemoryAppRepository>,
    pub devices: Arc<MemoryDeviceRepository>,
    pub settings: Arc<MemorySettingsRepository>,
    pub credentials: Arc<MemoryCredentialStore>,
    pub keys: Arc<MemoryKeyStore>,
    pub badges: Arc<MemoryBadgeRepository>,
    pub notifier: Arc<RecordingNotifier>,
    pub exchange: Arc<FakeTokenExchange>,
    pub registry: Arc<FakeRegistry>,
    pub idp: Arc<FakeIdp>,
}

impl Harness {
    /// A tenant that signs its own access tokens.
    pub fn new() -> Self {
        Self::with(IdpType::SelfIssued, test_config())
    }

    pub fn with(idp_type: IdpType, config: AuthConfig) -> Self {
        let key = PrivateKey::generate();
        let keys = Arc::new(MemoryKeyStore::new());
        keys.insert(TENANT, key.clone());

        let settings = Arc::new(MemorySettingsRepository::new());
        settings.insert(
            TENANT,
            IssuerSettings {
                issuer_id: ISSUER.into(),
                key_id: key.key_id().into(),
                idp_type,
            },
        );

        let sessions = Arc::new(MemorySessionRepository::new());
        let policies = Arc::new(MemoryPolicyRepository::new());
        let apps = Arc::new(MemoryAppRepository::new());
        let devices = Arc::new(MemoryDeviceRepository::new());
        let credentials = Arc::new(MemoryCredentialStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let exchange = Arc::new(FakeTokenExchange::new(&PrivateKey::generate()));

        let auth = AuthService::builder()
            .with_config(config)
            .with_session_repository(sessions.clone())
            .with_policy_repository(policies.clone())
            .with_app_repository(apps.clone())
            .with_device_repository(devices.clone())
            .with_settings_repository(settings.clone())
            .with_credential_store(credentials.clone())
            .with_key_store(keys.clone())
            .with_token_exchange(exchange.clone())
            .with_notification_sender(notifier.clone())
            .build()
            .unwrap();

        Self {
            auth,
            key,
            sessions,
            policies,
            apps,
            devices,
            settings,
            credentials,
            keys,
            badges: Arc::new(MemoryBadgeRepository::new()),
            notifier,
            exchange,
            registry: Arc::new(FakeRegistry::default()),
            idp: Arc::new(FakeIdp::default()),
        }
    }

    pub fn badge_service(&self) -> BadgeService {
        BadgeService::new(
            self.settings.clone(),
            self.apps.clone(),
            self.badges.clone(),
            self.keys.clone(),
            self.credentials.clone(),
            self.registry.clone(),
            Arc::new(FakeDiscovery),
        )
    }

    pub fn app_service(&self) -> AppService {
        AppService::new(
            self.settings.clone(),
            self.apps.clone(),
            self.credentials.clone(),
            self.idp.clone(),
            self.registry.clone(),
            self.badge_service(),
        )
    }

    /// Store an application with resolver metadata id `did:<id>` and a
    /// client credentials pair.
    pub async fn register(&self, id: &str, app_type: AppType) -> App {
        let app = self
            .apps
            .create_app(
                App::new(id, app_type)
                    .with_name(id)
                    .with_resolver_metadata_id(format!("did:{}", id)),
            )
            .await
            .unwrap();
        self.credentials
            .put(
                TENANT,
                id,
                &ClientCredentials::new(format!("client-{}", id), "https://idp.example")
                    .with_secret("s3cret"),
            )
            .await
            .unwrap();
        app
    }

    /// Allow `caller` to call `callee`, optionally only one tool.
    pub fn allow(&self, caller: &str, callee: &str, tool: Option<&str>, needs_approval: bool) {
        self.add_rule(caller, callee, tool, RuleAction::Allow, needs_approval);
    }

    pub fn deny(&self, caller: &str, callee: &str, tool: Option<&str>) {
        self.add_rule(caller, callee, tool, RuleAction::Deny, false);
    }

    fn add_rule(
        &self,
        caller: &str,
        callee: &str,
        tool: Option<&str>,
        action: RuleAction,
        needs_approval: bool,
    ) {
        let task = match tool {
            Some(tool) => Task::tool(callee, tool),
            None => Task::app(callee),
        };
        self.policies.insert(
            Policy::new(format!("{} -> {}", caller, callee), caller)
                .with_rule(Rule::new("", action).with_task(task).with_approval(needs_approval)),
        );
    }

    pub async fn add_device(&self, name: &str) -> Device {
        self.devices
            .create_device(Device::new(USER, name))
            .await
            .unwrap()
    }

    /// Context of a request authenticated as `app_id` on behalf of the user.
    pub fn ctx(&self, app_id: &str) -> RequestContext {
        RequestContext::new(TENANT)
            .with_app_id(app_id)
            .with_user_id(USER)
    }

    /// Authorize `caller` and exchange the code for an access token.
    pub async fn tokenized(
        &self,
        caller: &str,
        callee: Option<&App>,
        tool: Option<&str>,
    ) -> Session {
        let resolver = callee.map(|app| app.resolver_metadata_id.as_str());
        let session = self
            .auth
            .authorize(&self.ctx(caller), resolver, tool, None)
            .await
            .unwrap();
        self.auth
            .token(&self.ctx(caller), &session.authorization_code)
            .await
            .unwrap()
    }
}
