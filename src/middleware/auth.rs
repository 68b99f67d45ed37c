use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use sea_orm::EntityTrait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::get_config;
use crate::entities::user;
use crate::error::AppError;
use crate::services::AppState;

/// The authenticated user's database row, inserted into request extensions.
/// Handlers read billing fields straight off it, so it is loaded fresh on
/// every request rather than trusted from the token.
#[derive(Debug, Clone)]
pub struct AuthUser(pub user::Model);

#[derive(Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub exp: usize,
}

/// Rejections go through AppError so clients get the same JSON error
/// envelope here as from the handlers.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing authorization header".to_string()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization header".to_string()))?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(get_config().jwt_secret.as_ref()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::debug!("JWT decode error: {}", e);
        AppError::Unauthorized("Invalid or expired token".to_string())
    })?;

    let user_id = Uuid::parse_str(&token_data.claims.sub)
        .map_err(|_| AppError::Unauthorized("Invalid token subject".to_string()))?;

    let user = user::Entity::find_by_id(user_id)
        .one(&state.db)
        .await
        .map_err(AppError::DatabaseError)?
        .ok_or_else(|| AppError::Unauthorized("Unknown user".to_string()))?;

    req.extensions_mut().insert(AuthUser(user));

    Ok(next.run(req).await)
}
