use std::sync::Arc;

use log::{debug, error};

use super::signer;
use super::types::{Badge, CredentialStatus};
use crate::error::{Collaborator, Error, Result};
use crate::idp::ClientCredentials;
use crate::keys::PrivateKey;
use crate::registry::{IdentityRegistry, Issuer};
use crate::store::BadgeRepository;

/// Revokes every active badge of an application.
#[derive(Clone)]
pub struct Revoker {
    badges: Arc<dyn BadgeRepository>,
    registry: Arc<dyn IdentityRegistry>,
}

impl Revoker {
    pub fn new(badges: Arc<dyn BadgeRepository>, registry: Arc<dyn IdentityRegistry>) -> Self {
        Self { badges, registry }
    }

    /// Revoke all active badges of `app_id` and return how many were revoked.
    ///
    /// Each badge gets a revocation status, is re-signed, revoked at the
    /// registry and then saved. Processing stops at the first failure; badges
    /// handled before it stay revoked.
    pub async fn revoke_all(
        &self,
        app_id: &str,
        credentials: &ClientCredentials,
        issuer: &Issuer,
        key: &PrivateKey,
    ) -> Result<usize> {
        let badges = self
            .badges
            .active_badges(app_id)
            .await
            .map_err(Error::repository("load active badges", app_id))?;

        let total = badges.len();
        for (revoked, badge) in badges.into_iter().enumerate() {
            if let Err(err) = self.revoke(badge, credentials, issuer, key).await {
                error!(
                    "Revocation of app {} stopped after {} of {} badges: {}",
                    app_id, revoked, total, err
                );
                return Err(err);
            }
        }

        if total > 0 {
            debug!("Revoked {} badges of app {}", total, app_id);
        }
        Ok(total)
    }

    async fn revoke(
        &self,
        mut badge: Badge,
        credentials: &ClientCredentials,
        issuer: &Issuer,
        key: &PrivateKey,
    ) -> Result<()> {
        badge.vc.status.push(CredentialStatus::revocation());
        signer::sign(&mut badge.vc, key).map_err(|err| {
            Error::upstream(Collaborator::Signer, "re-sign badge", badge.id(), err)
        })?;

        self.registry
            .revoke(credentials, issuer, &badge.vc)
            .await
            .map_err(|err| Error::upstream(Collaborator::Registry, "revoke badge", badge.id(), err))?;

        self.badges
            .update_badge(&badge)
            .await
            .map_err(Error::repository("save revoked badge", badge.id()))
    }
}
