use actix_web::dev::Payload;
use actix_web::{FromRequest, HttpRequest};
use std::future::{ready, Ready};
use uuid::Uuid;

use crate::domain::principal::{Principal, Role};
use crate::errors::AppError;

pub const USER_ID_HEADER: &str = "X-User-Id";
pub const USER_ROLE_HEADER: &str = "X-User-Role";

/// Authenticated identity placed on the request by the upstream auth layer.
/// Token verification happens there; this service trusts the headers as
/// given. A missing role header means a regular customer.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Principal);

impl AuthUser {
    pub fn principal(&self) -> Principal {
        self.0
    }
}

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = Ready<Result<Self, AppError>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(extract(req))
    }
}

fn extract(req: &HttpRequest) -> Result<AuthUser, AppError> {
    let id = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or(AppError::Unauthorized)?;

    let role = match req.headers().get(USER_ROLE_HEADER) {
        None => Role::Customer,
        Some(v) => v
            .to_str()
            .ok()
            .and_then(Role::parse)
            .ok_or(AppError::Unauthorized)?,
    };

    Ok(AuthUser(Principal { id, role }))
}
