//! Credential signing.
//!
//! A proof is a compact JWS whose payload is the credential serialized
//! without its proof, so re-signing after any change (a new status entry)
//! replaces the previous proof entirely.

use thiserror::Error;

use super::types::{Proof, VerifiableCredential};
use crate::jwt::{self, JwtError};
use crate::keys::{PrivateKey, PublicKey};

/// JOSE `typ` of credential proofs.
pub const PROOF_MEDIA_TYPE: &str = "vc+jwt";

#[derive(Debug, Error)]
pub enum ProofError {
    #[error("the credential has no proof")]
    MissingProof,

    #[error("unsupported proof type '{0}'")]
    UnsupportedProof(String),

    #[error("the proof does not cover the credential content")]
    ContentMismatch,

    #[error(transparent)]
    Jwt(#[from] JwtError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Sign the credential in place, discarding any previous proof.
pub fn sign(vc: &mut VerifiableCredential, key: &PrivateKey) -> Result<(), ProofError> {
    vc.proof = None;
    let payload = serde_json::to_vec(vc)?;
    let value = jwt::sign_payload(&payload, key, Some(PROOF_MEDIA_TYPE))?;
    vc.proof = Some(Proof::jose(value));
    Ok(())
}

/// Key id the proof claims to be signed with.
pub fn proof_key_id(vc: &VerifiableCredential) -> Result<Option<String>, ProofError> {
    let proof = jose_proof(vc)?;
    Ok(jwt::decode(&proof.proof_value)?.header.kid)
}

/// Verify the proof signature and that it covers the current content.
pub fn verify_proof(vc: &VerifiableCredential, key: &PublicKey) -> Result<(), ProofError> {
    let proof = jose_proof(vc)?;
    let decoded = jwt::verify_signature(&proof.proof_value, key)?;

    let signed: serde_json::Value = serde_json::from_slice(&decoded.payload)?;
    if signed != serde_json::to_value(vc.without_proof())? {
        return Err(ProofError::ContentMismatch);
    }
    Ok(())
}

fn jose_proof(vc: &VerifiableCredential) -> Result<&Proof, ProofError> {
    let proof = vc.proof.as_ref().ok_or(ProofError::MissingProof)?;
    if !proof.is_jose() {
        return Err(ProofError::UnsupportedProof(proof.proof_type.clone()));
    }
    Ok(proof)
}
