//! Authorize, Token and ExtAuthZ.

use std::sync::Arc;

use log::{debug, error, warn};

use crate::app::App;
use crate::config::{AuthConfig, IssuerSettings};
use crate::context::RequestContext;
use crate::device::NotificationSender;
use crate::error::{BuildError, Collaborator, Error, Result};
use crate::idp::{ClientCredentials, CredentialStore, TokenExchange};
use crate::jwt;
use crate::keys::KeyStore;
use crate::policy::PolicyEvaluator;
use crate::session::{generate_code, now_unix, CodeRedemption, Session, TokenClaim};
use crate::store::{
    AppRepository, DeviceRepository, PolicyRepository, SessionRepository, SettingsRepository,
};

/// The authorization engine.
///
/// A caller application first asks for a session with [`authorize`], which
/// returns a single-use authorization code. It exchanges the code for an
/// access token with [`token`], then presents the token on every call to
/// another application, where the gateway enforces it with [`ext_authz`].
/// Calls matched by a rule that needs approval block in [`ext_authz`] until
/// the user decides on their device through [`approve_token`].
///
/// [`authorize`]: AuthService::authorize
/// [`token`]: AuthService::token
/// [`ext_authz`]: AuthService::ext_authz
/// [`approve_token`]: AuthService::approve_token
#[derive(Clone)]
pub struct AuthService {
    pub(super) config: AuthConfig,
    pub(super) sessions: Arc<dyn SessionRepository>,
    pub(super) apps: Arc<dyn AppRepository>,
    pub(super) devices: Arc<dyn DeviceRepository>,
    pub(super) settings: Arc<dyn SettingsRepository>,
    pub(super) credentials: Arc<dyn CredentialStore>,
    pub(super) keys: Arc<dyn KeyStore>,
    pub(super) token_exchange: Arc<dyn TokenExchange>,
    pub(super) notifier: Arc<dyn NotificationSender>,
    pub(super) evaluator: PolicyEvaluator,
}

impl AuthService {
    pub fn builder() -> AuthServiceBuilder {
        AuthServiceBuilder::default()
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Open a session for the calling application.
    ///
    /// When `resolver_metadata_id` names a callee the session is pinned to
    /// it (and to `tool_name`, if given) and the policy is checked right
    /// away so a denied caller learns it before getting a code. Without a
    /// callee the session can be used against any application and the
    /// policy is only checked per call.
    pub async fn authorize(
        &self,
        ctx: &RequestContext,
        resolver_metadata_id: Option<&str>,
        tool_name: Option<&str>,
        _user_token: Option<&str>,
    ) -> Result<Session> {
        let caller_id = ctx.app_id().ok_or_else(|| {
            Error::Unauthorized("the caller application id must be present in the request".into())
        })?;
        let caller = self
            .load_app(caller_id)
            .await?
            .ok_or_else(|| Error::Unauthorized(format!("caller app '{}' not found", caller_id)))?;

        let mut callee_id = None;
        if let Some(resolver_metadata_id) = resolver_metadata_id.filter(|id| !id.is_empty()) {
            let callee = self
                .apps
                .app_by_resolver_metadata_id(resolver_metadata_id)
                .await
                .map_err(Error::repository("load app", resolver_metadata_id))?
                .ok_or_else(|| {
                    Error::NotFound(format!("no app with resolver metadata id '{}'", resolver_metadata_id))
                })?;

            if callee.id == caller.id {
                return Err(Error::Unauthorized(
                    "the caller app and the callee app must not be the same".into(),
                ));
            }

            self.evaluator
                .evaluate(&callee, &caller.id, tool_name.unwrap_or_default())
                .await?;
            callee_id = Some(callee.id);
        }

        let mut session = Session::new(caller.id, generate_code(self.config.code_length))
            .with_app_id(callee_id)
            .with_tool_name(tool_name.map(String::from))
            .with_user_id(ctx.user_id().map(String::from));
        session.expire_after(self.config.session_duration);

        let session = self
            .sessions
            .create_session(session)
            .await
            .map_err(Error::repository("create session", caller_id))?;

        debug!(
            "Created session {} for {} (callee {:?})",
            session.id, session.owner_app_id, session.app_id
        );
        Ok(session)
    }

    /// Exchange an authorization code for an access token.
    ///
    /// A code can be exchanged once. If the minted token is already held by
    /// another session, this session is expired and the other one returned.
    pub async fn token(&self, ctx: &RequestContext, authorization_code: &str) -> Result<Session> {
        if authorization_code.is_empty() {
            return Err(Error::ValidationFailed(
                "the authorization code is required".into(),
            ));
        }

        let mut session = match self
            .sessions
            .redeem_authorization_code(authorization_code)
            .await
            .map_err(Error::repository("redeem authorization code", "session"))?
        {
            CodeRedemption::Redeemed(session) => session,
            CodeRedemption::AlreadyRedeemed => {
                return Err(Error::Conflict(
                    "the authorization code has already been used".into(),
                ))
            }
            CodeRedemption::Unknown => {
                return Err(Error::Unauthorized("session not found".into()));
            }
        };

        if session.has_expired() {
            return Err(Error::Expired(format!("session {} has expired", session.id)));
        }
        if session.access_token.is_some() {
            return Err(Error::Conflict("a token has already been issued".into()));
        }

        let credentials = self.client_credentials(ctx, &session.owner_app_id).await?;
        let settings = self.issuer_settings(ctx).await?;
        let access_token = self
            .issue_access_token(ctx, &settings, &credentials, &session)
            .await?;

        match self
            .sessions
            .claim_access_token(&session.id, &access_token, None)
            .await
            .map_err(Error::repository("attach access token", &session.id))?
        {
            TokenClaim::Attached(session) => {
                debug!("Attached access token to session {}", session.id);
                Ok(session)
            }
            TokenClaim::HeldBy(existing) => {
                session.expire();
                if let Err(err) = self.sessions.update_session(&session).await {
                    error!(
                        "Failed to expire session {} superseded by {}: {}",
                        session.id, existing.id, err
                    );
                }
                debug!(
                    "Access token already held by session {}, expired {}",
                    existing.id, session.id
                );
                Ok(existing)
            }
            TokenClaim::AlreadyTokenized => {
                Err(Error::Conflict("a token has already been issued".into()))
            }
        }
    }

    /// Enforce an access token on one call to the application authenticated
    /// in `ctx`.
    pub async fn ext_authz(
        &self,
        ctx: &RequestContext,
        access_token: &str,
        tool_name: &str,
    ) -> Result<()> {
        if access_token.is_empty() {
            return Err(Error::ValidationFailed("the access token is required".into()));
        }

        let session = self
            .sessions
            .session_by_access_token(access_token)
            .await
            .map_err(Error::repository("load session by access token", "session"))?
            .ok_or_else(|| Error::Unauthorized("no session holds this access token".into()))?;

        if session.has_expired_at(now_unix()) {
            return Err(Error::Expired(format!("session {} has expired", session.id)));
        }

        let callee_id = ctx.app_id().ok_or_else(|| {
            Error::Unauthorized("the callee application id must be present in the request".into())
        })?;
        let callee = self
            .load_app(callee_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("callee app '{}' not found", callee_id)))?;

        if !session.validate_app(&callee.id) {
            return Err(Error::Unauthorized(
                "the access token is not valid for the specified app".into(),
            ));
        }
        if !session.validate_tool(tool_name) {
            return Err(Error::Unauthorized(
                "the access token is not valid for the specified tool".into(),
            ));
        }

        let caller = self.load_app(&session.owner_app_id).await?.ok_or_else(|| {
            Error::NotFound(format!("caller app '{}' not found", session.owner_app_id))
        })?;

        self.verify_access_token(ctx, &session, access_token).await?;

        let rule = self.evaluator.evaluate(&callee, &caller.id, tool_name).await?;
        if rule.needs_approval {
            self.step_up(ctx, &session, &caller, &callee, tool_name).await?;
        }

        if session.expires_at.is_none() {
            let expires_at = now_unix().saturating_add(
                i64::try_from(self.config.grace_window.as_secs()).unwrap_or(i64::MAX),
            );
            let updated = self
                .sessions
                .set_expiry_if_unset(&session.id, expires_at)
                .await
                .map_err(Error::repository("set session expiry", &session.id))?;
            debug!(
                "Session {} expires at {:?}",
                updated.id, updated.expires_at
            );
        }

        Ok(())
    }

    async fn issue_access_token(
        &self,
        ctx: &RequestContext,
        settings: &IssuerSettings,
        credentials: &ClientCredentials,
        session: &Session,
    ) -> Result<String> {
        if settings.idp_type.is_self_issued() {
            let key = self
                .keys
                .private_key(ctx.tenant_id(), &settings.key_id)
                .await
                .map_err(|err| {
                    Error::upstream(Collaborator::KeyStore, "fetch private key", &settings.key_id, err)
                })?
                .ok_or_else(|| Error::NotFound(format!("signing key '{}'", settings.key_id)))?;

            return jwt::self_issue(
                &settings.issuer_id,
                &credentials.client_id,
                &key,
                self.config.access_token_ttl,
            )
            .map_err(|err| {
                Error::upstream(Collaborator::Signer, "self-issue access token", &session.id, err)
            });
        }

        if !credentials.has_secret() {
            return Err(Error::ValidationFailed(
                "the issuer is not self-issued and the client secret is not set".into(),
            ));
        }

        self.token_exchange
            .token(credentials)
            .await
            .map_err(|err| {
                Error::upstream(
                    Collaborator::TokenExchange,
                    "exchange client credentials",
                    &credentials.client_id,
                    err,
                )
            })
    }

    /// Check the token itself, independent of the stored session.
    async fn verify_access_token(
        &self,
        ctx: &RequestContext,
        session: &Session,
        access_token: &str,
    ) -> Result<()> {
        let invalid = || Error::Unauthorized("the access token is invalid".into());

        let settings = self.issuer_settings(ctx).await?;
        let verified = if settings.idp_type.is_self_issued() {
            let key_id = jwt::decode(access_token)
                .ok()
                .and_then(|decoded| decoded.header.kid)
                .unwrap_or_else(|| settings.key_id.clone());
            let Some(key) = self
                .keys
                .public_key(ctx.tenant_id(), &key_id)
                .await
                .map_err(|err| {
                    Error::upstream(Collaborator::KeyStore, "fetch public key", &key_id, err)
                })?
            else {
                warn!("Session {} presented a token signed by unknown key {}", session.id, key_id);
                return Err(invalid());
            };
            jwt::verify_signature(access_token, &key)
        } else {
            jwt::decode(access_token)
        };

        match verified.and_then(|decoded| jwt::validate_time_claims(&decoded, now_unix())) {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!("Failed to verify access token of session {}: {}", session.id, err);
                Err(invalid())
            }
        }
    }

    pub(super) async fn load_app(&self, app_id: &str) -> Result<Option<App>> {
        self.apps
            .app(app_id)
            .await
            .map_err(Error::repository("load app", app_id))
    }

    async fn issuer_settings(&self, ctx: &RequestContext) -> Result<IssuerSettings> {
        self.settings
            .issuer_settings(ctx.tenant_id())
            .await
            .map_err(Error::repository("load issuer settings", ctx.tenant_id()))?
            .ok_or_else(|| {
                Error::NotFound(format!("issuer settings of tenant '{}'", ctx.tenant_id()))
            })
    }

    async fn client_credentials(
        &self,
        ctx: &RequestContext,
        app_id: &str,
    ) -> Result<ClientCredentials> {
        self.credentials
            .get(ctx.tenant_id(), app_id)
            .await
            .map_err(|err| {
                Error::upstream(
                    Collaborator::CredentialStore,
                    "fetch client credentials",
                    app_id,
                    err,
                )
            })?
            .ok_or_else(|| Error::NotFound(format!("client credentials of app '{}'", app_id)))
    }
}

/// Builder for [`AuthService`].
///
/// Every collaborator is required; the configuration defaults to
/// [`AuthConfig::default`].
#[derive(Default)]
pub struct AuthServiceBuilder {
    config: AuthConfig,
    sessions: Option<Arc<dyn SessionRepository>>,
    policies: Option<Arc<dyn PolicyRepository>>,
    apps: Option<Arc<dyn AppRepository>>,
    devices: Option<Arc<dyn DeviceRepository>>,
    settings: Option<Arc<dyn SettingsRepository>>,
    credentials: Option<Arc<dyn CredentialStore>>,
    keys: Option<Arc<dyn KeyStore>>,
    token_exchange: Option<Arc<dyn TokenExchange>>,
    notifier: Option<Arc<dyn NotificationSender>>,
}

impl AuthServiceBuilder {
    pub fn with_config(mut self, config: AuthConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_session_repository(mut self, sessions: Arc<dyn SessionRepository>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn with_policy_repository(mut self, policies: Arc<dyn PolicyRepository>) -> Self {
        self.policies = Some(policies);
        self
    }

    pub fn with_app_repository(mut self, apps: Arc<dyn AppRepository>) -> Self {
        self.apps = Some(apps);
        self
    }

    pub fn with_device_repository(mut self, devices: Arc<dyn DeviceRepository>) -> Self {
        self.devices = Some(devices);
        self
    }

    pub fn with_settings_repository(mut self, settings: Arc<dyn SettingsRepository>) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn with_credential_store(mut self, credentials: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_key_store(mut self, keys: Arc<dyn KeyStore>) -> Self {
        self.keys = Some(keys);
        self
    }

    pub fn with_token_exchange(mut self, token_exchange: Arc<dyn TokenExchange>) -> Self {
        self.token_exchange = Some(token_exchange);
        self
    }

    pub fn with_notification_sender(mut self, notifier: Arc<dyn NotificationSender>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Build the service.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Missing`] naming the first collaborator that
    /// was not configured, or [`BuildError::InvalidConfig`] when a timing or
    /// sizing value is zero.
    pub fn build(self) -> std::result::Result<AuthService, BuildError> {
        self.config.validate()?;
        let policies = self
            .policies
            .ok_or(BuildError::Missing("policy_repository"))?;
        Ok(AuthService {
            config: self.config,
            sessions: self
                .sessions
                .ok_or(BuildError::Missing("session_repository"))?,
            apps: self.apps.ok_or(BuildError::Missing("app_repository"))?,
            devices: self
                .devices
                .ok_or(BuildError::Missing("device_repository"))?,
            settings: self
                .settings
                .ok_or(BuildError::Missing("settings_repository"))?,
            credentials: self
                .credentials
                .ok_or(BuildError::Missing("credential_store"))?,
            keys: self.keys.ok_or(BuildError::Missing("key_store"))?,
            token_exchange: self
                .token_exchange
                .ok_or(BuildError::Missing("token_exchange"))?,
            notifier: self
                .notifier
                .ok_or(BuildError::Missing("notification_sender"))?,
            evaluator: PolicyEvaluator::new(policies),
        })
    }
}
