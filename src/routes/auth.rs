use axum::Json;

use crate::auth::AuthenticatedUser;

/// Echoes the identity carried by the caller's bearer token.
pub async fn me(user: AuthenticatedUser) -> Json<AuthenticatedUser> {
    Json(user)
}
