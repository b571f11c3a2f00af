//! Caller identity extraction.
//!
//! Authentication happens upstream. The gateway forwards the authenticated
//! account as two headers, which are parsed here into an [`Actor`].

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use medproof_core::{Actor, Identity, Role};

use crate::error::ApiError;

/// Ledger identity the caller acts as.
pub const IDENTITY_HEADER: &str = "x-actor-identity";
/// Caller's role: clinician, lab, admin or patient.
pub const ROLE_HEADER: &str = "x-actor-role";

/// Extractor for the actor named by the request headers.
#[derive(Debug, Clone, Copy)]
pub struct RequestActor(pub Actor);

impl<S> FromRequestParts<S> for RequestActor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let identity: Identity = required_header(parts, IDENTITY_HEADER)?.parse()?;
        let role: Role = required_header(parts, ROLE_HEADER)?.parse()?;
        Ok(Self(Actor::new(identity, role)))
    }
}

fn required_header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, ApiError> {
    let value = parts
        .headers
        .get(name)
        .ok_or_else(|| ApiError::unauthorized(format!("Missing {name} header")))?;
    value
        .to_str()
        .map_err(|_| ApiError::bad_request(format!("Header {name} is not valid UTF-8")))
}
