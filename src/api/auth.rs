use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::warn;

use super::{AppState, error::ApiError};
use crate::models::{DocId, User};

pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";

/// The authenticated user performing the request.
#[derive(Debug, Clone)]
pub struct Actor(pub User);

impl Actor {
    pub fn id(&self) -> &DocId {
        &self.0.id
    }

    /// `Forbidden` unless the actor is `owner`.
    pub fn ensure_owns(&self, owner: &DocId, message: &'static str) -> Result<(), ApiError> {
        if self.id() == owner {
            Ok(())
        } else {
            Err(ApiError::Forbidden(message))
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn cookie_token(headers: &HeaderMap) -> Option<String> {
    CookieJar::from_headers(headers)
        .get(ACCESS_TOKEN_COOKIE)
        .map(|cookie| cookie.value().trim().to_string())
        .filter(|value| !value.is_empty())
}

impl FromRequestParts<AppState> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .or_else(|| cookie_token(&parts.headers))
            .ok_or_else(|| ApiError::Unauthorized("Unauthorized request".into()))?;

        let claims = state.tokens.verify(&token).map_err(|err| {
            warn!(%err, "rejected access token");
            ApiError::from(err)
        })?;

        let user = state
            .blocking(move |store| Ok(store.get::<User>(&claims.sub)?))
            .await?
            .ok_or_else(|| ApiError::Unauthorized("Invalid access token".into()))?;
        Ok(Actor(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn token_is_read_from_bearer_header_or_cookie() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; accessToken=abc.def"));
        assert_eq!(cookie_token(&headers).as_deref(), Some("abc.def"));

        headers.insert(header::COOKIE, HeaderValue::from_static("accessToken=; theme=dark"));
        assert_eq!(cookie_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer xyz.123"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("xyz.123"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic Zm9vOmJhcg=="));
        assert_eq!(bearer_token(&headers), None);
    }
}
