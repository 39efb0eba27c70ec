//! Guard for the `/harbor` routes.
//!
//! Two independent checks, both optional:
//!
//! - an internal API key in a configurable header, when one is configured
//! - a bearer token, validated by POSTing it to an upstream auth service,
//!   when the request carries one and a validation URL is configured

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{error, warn};

use crate::SharedState;
use crate::error::ApiError;

type HmacSha256 = Hmac<Sha256>;

const KEY_COMPARE_SECRET: &[u8] = b"harbor-gateway-api-key";

pub async fn guard(
    State(state): State<SharedState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let config = &state.config;

    if let Some(expected) = config.internal_api_key.as_deref() {
        let provided = req
            .headers()
            .get(config.api_key_header.as_str())
            .and_then(|v| v.to_str().ok());
        if !provided.is_some_and(|p| keys_match(p, expected)) {
            warn!(path = %req.uri().path(), "Rejected request with missing or wrong API key");
            return Err(ApiError::Unauthorized("Invalid API key".into()));
        }
    }

    let bearer = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if let (Some(token), Some(url)) = (bearer, config.auth_validation_url.as_deref()) {
        if !validate_token(&state.http, url, token).await {
            warn!(path = %req.uri().path(), "Rejected request with invalid bearer token");
            return Err(ApiError::Unauthorized("Invalid token".into()));
        }
    }

    Ok(next.run(req).await)
}

/// Constant-time key comparison: both sides are MACed and the tags are
/// checked with `verify_slice`.
fn keys_match(provided: &str, expected: &str) -> bool {
    let mac = |data: &str| {
        HmacSha256::new_from_slice(KEY_COMPARE_SECRET).map(|mut mac| {
            mac.update(data.as_bytes());
            mac
        })
    };
    match (mac(provided), mac(expected)) {
        (Ok(provided), Ok(expected)) => provided.verify_slice(&expected.finalize().into_bytes()).is_ok(),
        _ => false,
    }
}

/// Any status other than 200, or a transport error, means invalid.
async fn validate_token(http: &reqwest::Client, url: &str, token: &str) -> bool {
    match http.post(url).bearer_auth(token).send().await {
        Ok(response) => response.status() == reqwest::StatusCode::OK,
        Err(e) => {
            error!(error = %e, "Token validation request failed");
            false
        }
    }
}
