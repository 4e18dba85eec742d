use chrono::{DateTime, Utc};

use super::signer::{self, ProofError};
use super::types::{ErrorInfo, ErrorReason, VerifiableCredential, VerificationResult};
use crate::keys::PublicKey;

/// Media type reported for JWS-secured credentials.
pub const MEDIA_TYPE: &str = "application/vc+jwt";

/// Check a credential against the issuer key it claims.
///
/// Every problem found is reported in the result; `status` is true only
/// when there are no errors. `issuer_key` is `None` when the key named by
/// the proof could not be found.
pub fn verify_credential(
    vc: &VerifiableCredential,
    issuer_key: Option<&PublicKey>,
    now: DateTime<Utc>,
) -> VerificationResult {
    let mut errors = Vec::new();

    match issuer_key {
        Some(key) => {
            if let Err(err) = signer::verify_proof(vc, key) {
                errors.push(proof_error(err));
            }
        }
        None if vc.proof.is_none() => {
            errors.push(ErrorInfo::new(
                ErrorReason::MissingProof,
                "the credential has no proof",
            ));
        }
        None => {
            errors.push(ErrorInfo::new(
                ErrorReason::UnknownIssuerKey,
                "the issuer key could not be resolved",
            ));
        }
    }

    if vc.is_revoked() {
        errors.push(ErrorInfo::new(
            ErrorReason::Revoked,
            "the credential has been revoked",
        ));
    }
    if vc.has_expired_at(now) {
        errors.push(ErrorInfo::new(
            ErrorReason::Expired,
            "the credential has expired",
        ));
    }

    VerificationResult {
        status: errors.is_empty(),
        document: Some(vc.clone()),
        media_type: MEDIA_TYPE.to_string(),
        controller: vc.issuer.clone(),
        controlled_identifier_document: issuer_key
            .map(|key| key.key_id().to_string())
            .unwrap_or_default(),
        warnings: Vec::new(),
        errors,
    }
}

fn proof_error(err: ProofError) -> ErrorInfo {
    let reason = match err {
        ProofError::MissingProof => ErrorReason::MissingProof,
        ProofError::ContentMismatch => ErrorReason::ContentMismatch,
        _ => ErrorReason::InvalidProof,
    };
    ErrorInfo::new(reason, err.to_string())
}
