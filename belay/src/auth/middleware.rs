//! Authorize-before-dispatch gate.
//!
//! The host application resolves the [`Principal`] (session layer plus
//! [`crate::auth::resolver::Auth`]) and inserts it into request
//! extensions; this middleware authorizes the request path against the
//! permission matrix before any handler runs. A missing extension is
//! treated as [`Principal::Anonymous`], so a miswired host fails closed
//! rather than open.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{StatusCode, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::info;

use crate::auth::matrix::{Decision, PermissionMatrix};
use crate::auth::resolver::Principal;
use crate::errors::Rejection;
use crate::types::abbrev_uuid;

/// Shared state for the gate: the immutable matrix plus the denial shape
/// policy.
#[derive(Clone)]
pub struct GateState {
    matrix: Arc<PermissionMatrix>,
    conceal_forbidden: bool,
}

impl GateState {
    pub fn new(matrix: Arc<PermissionMatrix>, conceal_forbidden: bool) -> Self {
        Self {
            matrix,
            conceal_forbidden,
        }
    }

    fn deny_response(&self) -> Response {
        if self.conceal_forbidden {
            (StatusCode::NOT_FOUND, "Not found").into_response()
        } else {
            (StatusCode::FORBIDDEN, Rejection::Unauthorized.user_message()).into_response()
        }
    }
}

/// Gate every request through the permission matrix.
pub async fn authorize_middleware(State(state): State<GateState>, request: Request, next: Next) -> Response {
    let principal = request.extensions().get::<Principal>().cloned().unwrap_or_default();
    let path = request.uri().path().to_string();

    match state.matrix.authorize(&principal, &path) {
        Decision::Allow => next.run(request).await,
        Decision::Deny => {
            info!(
                principal_id = %abbrev_uuid(&principal.id()),
                path,
                concealed = state.conceal_forbidden,
                "authorization denied"
            );
            state.deny_response()
        }
    }
}

/// Extractor for handlers behind the gate. Never fails; an absent
/// extension yields [`Principal::Anonymous`].
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Principal>().cloned().unwrap_or_default())
    }
}
