use log::debug;

use super::signer;
use super::types::{Badge, BadgeClaims, BadgeType, VerifiableCredential};
use crate::error::{Collaborator, Error, Result};
use crate::keys::PrivateKey;

/// Build and sign a new badge for `app_id`. The badge is not persisted.
pub fn issue(
    app_id: &str,
    issuer: &str,
    badge_type: BadgeType,
    claims: BadgeClaims,
    key: &PrivateKey,
) -> Result<Badge> {
    if app_id.is_empty() {
        return Err(Error::ValidationFailed("the app id is required".into()));
    }
    if badge_type == BadgeType::Unspecified {
        return Err(Error::ValidationFailed(
            "the badge type is not specified".into(),
        ));
    }
    if claims.id.is_empty() || claims.badge.is_empty() {
        return Err(Error::ValidationFailed("the badge claims are empty".into()));
    }

    let mut vc = VerifiableCredential::new(issuer, badge_type, claims);
    signer::sign(&mut vc, key)
        .map_err(|err| Error::upstream(Collaborator::Signer, "sign badge", vc.id.clone(), err))?;

    debug!("Issued {} {} for app {}", badge_type, vc.id, app_id);
    Ok(Badge::new(app_id, vc))
}
