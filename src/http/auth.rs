use actix_web::dev::Payload;
use actix_web::{FromRequest, HttpRequest};
use std::future::{ready, Ready};
use uuid::Uuid;

use super::error::ApiError;
use crate::domain::user::{Actor, Role};

// ============================================================================
// Request Identity
// ============================================================================
//
// The upstream auth service has already verified the caller and forwards
// the result as `x-user-id` / `x-user-role`. Nothing here issues or checks
// credentials.
//
// ============================================================================

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Any authenticated caller.
#[derive(Debug, Clone, Copy)]
pub struct Identity(pub Actor);

/// Authenticated caller with the admin role.
#[derive(Debug, Clone, Copy)]
pub struct AdminIdentity(pub Actor);

/// Authenticated caller or guest.
#[derive(Debug, Clone, Copy)]
pub struct MaybeIdentity(pub Option<Actor>);

fn actor_from_headers(req: &HttpRequest) -> Result<Option<Actor>, ApiError> {
    let Some(raw_id) = req.headers().get(USER_ID_HEADER) else {
        return Ok(None);
    };
    let user_id = raw_id
        .to_str()
        .ok()
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
        .ok_or_else(|| ApiError::unauthorized("Malformed user identity"))?;

    let role = match req.headers().get(USER_ROLE_HEADER) {
        None => Role::Customer,
        Some(raw) => raw
            .to_str()
            .ok()
            .and_then(|v| v.parse::<Role>().ok())
            .ok_or_else(|| ApiError::unauthorized("Malformed user role"))?,
    };

    Ok(Some(Actor { user_id, role }))
}

impl FromRequest for MaybeIdentity {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(actor_from_headers(req).map(MaybeIdentity))
    }
}

impl FromRequest for Identity {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            actor_from_headers(req)
                .and_then(|actor| actor.ok_or_else(|| ApiError::unauthorized("Authentication required")))
                .map(Identity),
        )
    }
}

impl FromRequest for AdminIdentity {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let result = actor_from_headers(req).and_then(|actor| match actor {
            None => Err(ApiError::unauthorized("Authentication required")),
            Some(actor) if actor.is_admin() => Ok(AdminIdentity(actor)),
            Some(actor) => {
                tracing::warn!(user_id = %actor.user_id, path = req.path(), "🚫 Admin route refused");
                Err(ApiError::forbidden())
            }
        });
        ready(result)
    }
}

impl Identity {
    /// Owners and admins pass; everyone else gets 403.
    pub fn require_access(&self, owner_id: Uuid) -> Result<(), ApiError> {
        if self.0.can_access(owner_id) {
            Ok(())
        } else {
            Err(ApiError::forbidden())
        }
    }
}
