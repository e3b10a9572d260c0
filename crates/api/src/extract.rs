//! Request extractors shared by the participant handlers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::{IDEMPOTENCY_KEY_HEADER, IdempotencyKey};

use crate::error::ApiError;

/// Extracts the mandatory `idempotency-key` header; rejects the request
/// with 400 when it is missing or empty.
pub struct RequireIdempotencyKey(pub IdempotencyKey);

impl<S> FromRequestParts<S> for RequireIdempotencyKey
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(IDEMPOTENCY_KEY_HEADER)
            .ok_or_else(|| {
                ApiError::BadRequest(format!("missing {IDEMPOTENCY_KEY_HEADER} header"))
            })?
            .to_str()
            .map_err(|_| {
                ApiError::BadRequest(format!("{IDEMPOTENCY_KEY_HEADER} header is not valid UTF-8"))
            })?
            .trim();

        if value.is_empty() {
            return Err(ApiError::BadRequest(format!(
                "{IDEMPOTENCY_KEY_HEADER} header must not be empty"
            )));
        }

        Ok(Self(IdempotencyKey::new(value)))
    }
}
