use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, header::AUTHORIZATION, request::Parts};
use std::convert::Infallible;
use tracing::debug;

use super::AppState;
use crate::error::AppError;
use crate::model::ActingProfile;

/// Bearer token from the `Authorization` header, if any
#[derive(Debug, Clone)]
pub struct BearerToken(pub Option<String>);

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(BearerToken(bearer_token(&parts.headers)))
    }
}

/// The acting profile behind the request's session.
///
/// Missing, expired or revoked tokens yield an anonymous actor; the
/// service's gate turns that into `Unauthorized`.
#[derive(Debug, Clone, Copy)]
pub struct Actor(pub Option<ActingProfile>);

impl Actor {
    pub fn profile(&self) -> Option<&ActingProfile> {
        self.0.as_ref()
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Actor {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(&parts.headers) else {
            return Ok(Actor(None));
        };

        let actor = state.auth.acting_profile(&token).await?;
        if actor.is_none() {
            debug!("Bearer token did not resolve to an open session");
        }
        Ok(Actor(actor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc.def"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert_eq!(bearer_token(&headers), None);
    }
}
