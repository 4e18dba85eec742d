use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};

use super::claims::{ClaimSource, DiscoveryClient};
use super::revoker::Revoker;
use super::types::{Badge, VerificationResult};
use super::{issue, signer, verify_credential};
use crate::app::{App, AppStatus};
use crate::config::IssuerSettings;
use crate::context::RequestContext;
use crate::error::{Collaborator, Error, Result};
use crate::idp::{ClientCredentials, CredentialStore};
use crate::keys::{KeyStore, PrivateKey};
use crate::registry::{IdentityRegistry, Issuer};
use crate::store::{AppRepository, BadgeRepository, SettingsRepository};

/// Issues, revokes and verifies application badges.
///
/// Issuing a badge revokes every badge the application already holds
/// before the new one is published, so an application has at most one
/// active badge.
#[derive(Clone)]
pub struct BadgeService {
    settings: Arc<dyn SettingsRepository>,
    apps: Arc<dyn AppRepository>,
    badges: Arc<dyn BadgeRepository>,
    keys: Arc<dyn KeyStore>,
    credentials: Arc<dyn CredentialStore>,
    registry: Arc<dyn IdentityRegistry>,
    discovery: Arc<dyn DiscoveryClient>,
    revoker: Revoker,
}

impl BadgeService {
    pub fn new(
        settings: Arc<dyn SettingsRepository>,
        apps: Arc<dyn AppRepository>,
        badges: Arc<dyn BadgeRepository>,
        keys: Arc<dyn KeyStore>,
        credentials: Arc<dyn CredentialStore>,
        registry: Arc<dyn IdentityRegistry>,
        discovery: Arc<dyn DiscoveryClient>,
    ) -> Self {
        let revoker = Revoker::new(badges.clone(), registry.clone());
        Self {
            settings,
            apps,
            badges,
            keys,
            credentials,
            registry,
            discovery,
            revoker,
        }
    }

    /// Issue a new badge for `app_id` from `source`, replacing any active one.
    pub async fn issue_badge(
        &self,
        ctx: &RequestContext,
        app_id: &str,
        source: &ClaimSource,
    ) -> Result<Badge> {
        let settings = self.issuer_settings(ctx).await?;
        let mut app = self.app(app_id).await?;
        let (badge_type, claims) = source.build_claims(&app, self.discovery.as_ref()).await?;
        let key = self.private_key(ctx, &settings).await?;

        let badge = issue(&app.id, &settings.issuer_id, badge_type, claims, &key)?;

        let credentials = self.client_credentials(ctx, &app.id).await?;
        let issuer = Issuer::new(&settings.issuer_id, &settings.key_id);

        let revoked = self
            .revoker
            .revoke_all(&app.id, &credentials, &issuer, &key)
            .await?;
        if revoked > 0 {
            self.sync_status(&mut app).await?;
        }

        self.registry
            .publish(&credentials, &issuer, &badge.vc)
            .await
            .map_err(|err| {
                Error::upstream(Collaborator::Registry, "publish badge", badge.id(), err)
            })?;

        let badge = self
            .badges
            .create_badge(badge)
            .await
            .map_err(Error::repository("store badge", &app.id))?;

        self.sync_status(&mut app).await?;
        info!("Issued badge {} for app {}", badge.id(), app.id);
        Ok(badge)
    }

    /// Revoke every active badge of `app_id`. Returns how many were revoked.
    pub async fn revoke_badges(&self, ctx: &RequestContext, app_id: &str) -> Result<usize> {
        let settings = self.issuer_settings(ctx).await?;
        let mut app = self.app(app_id).await?;
        let key = self.private_key(ctx, &settings).await?;
        let credentials = self.client_credentials(ctx, &app.id).await?;
        let issuer = Issuer::new(&settings.issuer_id, &settings.key_id);

        let revoked = self
            .revoker
            .revoke_all(&app.id, &credentials, &issuer, &key)
            .await?;

        if revoked > 0 {
            self.sync_status(&mut app).await?;
        }
        Ok(revoked)
    }

    /// The most recently issued active badge of `app_id`.
    pub async fn get_badge(&self, app_id: &str) -> Result<Badge> {
        self.badges
            .active_badges(app_id)
            .await
            .map_err(Error::repository("load active badges", app_id))?
            .into_iter()
            .max_by_key(|badge| badge.vc.issuance_date)
            .ok_or_else(|| Error::NotFound(format!("no active badge for app '{}'", app_id)))
    }

    /// Verify a badge against its issuer key.
    ///
    /// An invalid badge is reported in the result, not as an error.
    pub async fn verify_badge(
        &self,
        ctx: &RequestContext,
        badge: &Badge,
    ) -> Result<VerificationResult> {
        let key_id = match signer::proof_key_id(&badge.vc) {
            Ok(key_id) => key_id,
            Err(err) => {
                debug!("Badge {} carries no readable proof: {}", badge.id(), err);
                None
            }
        };

        let key = match key_id {
            Some(key_id) => self
                .keys
                .public_key(ctx.tenant_id(), &key_id)
                .await
                .map_err(|err| {
                    Error::upstream(Collaborator::KeyStore, "fetch public key", key_id, err)
                })?,
            None => None,
        };

        let result = verify_credential(&badge.vc, key.as_ref(), Utc::now());
        if !result.status {
            warn!(
                "Badge {} failed verification with {} errors",
                badge.id(),
                result.errors.len()
            );
        }
        Ok(result)
    }

    async fn issuer_settings(&self, ctx: &RequestContext) -> Result<IssuerSettings> {
        self.settings
            .issuer_settings(ctx.tenant_id())
            .await
            .map_err(Error::repository("load issuer settings", ctx.tenant_id()))?
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "issuer settings of tenant '{}'",
                    ctx.tenant_id()
                ))
            })
    }

    async fn app(&self, app_id: &str) -> Result<App> {
        if app_id.is_empty() {
            return Err(Error::ValidationFailed("the app id is required".into()));
        }
        self.apps
            .app(app_id)
            .await
            .map_err(Error::repository("load app", app_id))?
            .ok_or_else(|| Error::NotFound(format!("app '{}'", app_id)))
    }

    async fn private_key(
        &self,
        ctx: &RequestContext,
        settings: &IssuerSettings,
    ) -> Result<PrivateKey> {
        self.keys
            .private_key(ctx.tenant_id(), &settings.key_id)
            .await
            .map_err(|err| {
                Error::upstream(
                    Collaborator::KeyStore,
                    "fetch private key",
                    &settings.key_id,
                    err,
                )
            })?
            .ok_or_else(|| Error::NotFound(format!("signing key '{}'", settings.key_id)))
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

    /// Store the status derived from every badge the app holds.
    async fn sync_status(&self, app: &mut App) -> Result<()> {
        let badges = self
            .badges
            .badges(&app.id)
            .await
            .map_err(Error::repository("load badges", &app.id))?;
        let status = AppStatus::from_badges(&badges);
        if app.status == status {
            return Ok(());
        }
        app.status = status;
        app.updated_at = Some(Utc::now());
        self.apps
            .update_app(app)
            .await
            .map_err(Error::repository("update app status", &app.id))
    }
}
