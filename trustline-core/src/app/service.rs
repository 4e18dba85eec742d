use std::sync::Arc;

use log::{debug, info, warn};

use super::{App, AppType};
use crate::badge::BadgeService;
use crate::context::RequestContext;
use crate::error::{Collaborator, Error, Result};
use crate::idp::{ClientCredentials, CredentialStore, IdentityProvider};
use crate::registry::{IdentityRegistry, Issuer};
use crate::store::{AppRepository, SettingsRepository};

/// Registers and removes applications.
#[derive(Clone)]
pub struct AppService {
    settings: Arc<dyn SettingsRepository>,
    apps: Arc<dyn AppRepository>,
    credentials: Arc<dyn CredentialStore>,
    idp: Arc<dyn IdentityProvider>,
    registry: Arc<dyn IdentityRegistry>,
    badges: BadgeService,
}

impl AppService {
    pub fn new(
        settings: Arc<dyn SettingsRepository>,
        apps: Arc<dyn AppRepository>,
        credentials: Arc<dyn CredentialStore>,
        idp: Arc<dyn IdentityProvider>,
        registry: Arc<dyn IdentityRegistry>,
        badges: BadgeService,
    ) -> Self {
        Self {
            settings,
            apps,
            credentials,
            idp,
            registry,
            badges,
        }
    }

    /// Register a new application.
    ///
    /// A client credentials pair is created at the identity provider first.
    /// If any later step fails the pair is deleted again before the error
    /// is returned.
    pub async fn create_app(
        &self,
        ctx: &RequestContext,
        name: &str,
        app_type: AppType,
    ) -> Result<App> {
        if app_type == AppType::Unspecified {
            return Err(Error::ValidationFailed("the app type is required".into()));
        }

        let settings = self
            .settings
            .issuer_settings(ctx.tenant_id())
            .await
            .map_err(Error::repository("load issuer settings", ctx.tenant_id()))?
            .ok_or_else(|| {
                Error::NotFound(format!("issuer settings of tenant '{}'", ctx.tenant_id()))
            })?;

        let credentials = self
            .idp
            .create_client_credentials_pair()
            .await
            .map_err(|err| {
                Error::upstream(
                    Collaborator::IdentityProvider,
                    "create client credentials",
                    name,
                    err,
                )
            })?;

        let issuer = Issuer::new(&settings.issuer_id, &settings.key_id);
        match self.register(ctx, name, app_type, &credentials, &issuer).await {
            Ok(app) => {
                info!("Registered {} {} ({})", app.app_type, app.id, app.display_name());
                Ok(app)
            }
            Err(err) => {
                if let Err(cleanup) = self.idp.delete_client_credentials_pair(&credentials).await {
                    warn!(
                        "Failed to delete client {} after registration failure: {}",
                        credentials.client_id, cleanup
                    );
                }
                Err(err)
            }
        }
    }

    async fn register(
        &self,
        ctx: &RequestContext,
        name: &str,
        app_type: AppType,
        credentials: &ClientCredentials,
        issuer: &Issuer,
    ) -> Result<App> {
        let resolver_metadata_id = self
            .registry
            .generate_id(credentials, issuer)
            .await
            .map_err(|err| {
                Error::upstream(Collaborator::Registry, "generate id", &credentials.client_id, err)
            })?;

        let app = App::new(uuid::Uuid::new_v4().to_string(), app_type)
            .with_name(name)
            .with_resolver_metadata_id(resolver_metadata_id);

        self.credentials
            .put(ctx.tenant_id(), &app.id, credentials)
            .await
            .map_err(|err| {
                Error::upstream(
                    Collaborator::CredentialStore,
                    "store client credentials",
                    &app.id,
                    err,
                )
            })?;

        match self.apps.create_app(app.clone()).await {
            Ok(app) => Ok(app),
            Err(err) => {
                if let Err(cleanup) = self.credentials.delete(ctx.tenant_id(), &app.id).await {
                    warn!(
                        "Failed to delete stored credentials of app {}: {}",
                        app.id, cleanup
                    );
                }
                Err(Error::repository("create app", &app.id)(err))
            }
        }
    }

    pub async fn get_app(&self, app_id: &str) -> Result<App> {
        if app_id.is_empty() {
            return Err(Error::ValidationFailed("the app id is required".into()));
        }
        self.apps
            .app(app_id)
            .await
            .map_err(Error::repository("load app", app_id))?
            .ok_or_else(|| Error::NotFound(format!("app '{}'", app_id)))
    }

    /// Remove an application: revoke its badges, drop its credentials at
    /// the store and the identity provider, then soft-delete it.
    pub async fn delete_app(&self, ctx: &RequestContext, app_id: &str) -> Result<()> {
        let app = self.get_app(app_id).await?;

        let revoked = self.badges.revoke_badges(ctx, &app.id).await?;
        debug!("Revoked {} badges while deleting app {}", revoked, app.id);

        let credentials = self
            .credentials
            .get(ctx.tenant_id(), &app.id)
            .await
            .map_err(|err| {
                Error::upstream(
                    Collaborator::CredentialStore,
                    "fetch client credentials",
                    &app.id,
                    err,
                )
            })?;

        if let Some(credentials) = credentials {
            self.idp
                .delete_client_credentials_pair(&credentials)
                .await
                .map_err(|err| {
                    Error::upstream(
                        Collaborator::IdentityProvider,
                        "delete client credentials",
                        &app.id,
                        err,
                    )
                })?;
            self.credentials
                .delete(ctx.tenant_id(), &app.id)
                .await
                .map_err(|err| {
                    Error::upstream(
                        Collaborator::CredentialStore,
                        "delete client credentials",
                        &app.id,
                        err,
                    )
                })?;
        }

        self.apps
            .delete_app(&app.id)
            .await
            .map_err(Error::repository("delete app", &app.id))?;

        info!("Deleted app {}", app.id);
        Ok(())
    }
}
