// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Authentication middleware for webhook routes.
//!
//! Two methods, checked in order:
//! 1. Bearer token (`Authorization: Bearer <token>`)
//! 2. Body signature (`X-Signature-256: sha256=<hex hmac-sha256 of the body>`)
//!
//! With neither configured the webhook is open, which is only meant for
//! local development.

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Largest webhook body accepted for signature verification.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

pub const SIGNATURE_HEADER: &str = "x-signature-256";

#[derive(Clone, Default)]
pub struct AuthConfig {
    pub bearer_token: Option<String>,
    pub webhook_secret: Option<String>,
}

impl AuthConfig {
    pub fn is_open(&self) -> bool {
        self.bearer_token.is_none() && self.webhook_secret.is_none()
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "[redacted]"))
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

/// Signature of `body` in the `sha256=<hex>` header format.
pub fn sign_body(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Constant-time check of a `sha256=<hex>` header value against `body`.
pub fn verify_signature(secret: &str, header: &str, body: &[u8]) -> bool {
    let Some(provided) = header.trim().strip_prefix("sha256=") else {
        return false;
    };
    let Ok(provided) = hex::decode(provided) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&provided).is_ok()
}

pub async fn auth_middleware(
    State(auth): State<AuthConfig>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if auth.is_open() {
        return Ok(next.run(request).await);
    }

    if let Some(expected) = &auth.bearer_token {
        let token = request
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if token == Some(expected.as_str()) {
            return Ok(next.run(request).await);
        }
    }

    if let Some(secret) = &auth.webhook_secret {
        let signature = request
            .headers()
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if let Some(signature) = signature {
            // The body has to be read to verify it, then handed on intact.
            let (parts, body) = request.into_parts();
            let bytes = to_bytes(body, MAX_BODY_BYTES)
                .await
                .map_err(|_| StatusCode::PAYLOAD_TOO_LARGE)?;
            if verify_signature(secret, &signature, &bytes) {
                let request = Request::from_parts(parts, Body::from(bytes));
                return Ok(next.run(request).await);
            }
            tracing::debug!("webhook signature mismatch");
        }
    }

    Err(StatusCode::UNAUTHORIZED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_round_trip() {
        let body = br#"{"device_id":"d"}"#;
        let header = sign_body("s3cret", body).unwrap();
        assert!(header.starts_with("sha256="));
        assert!(verify_signature("s3cret", &header, body));
        assert!(!verify_signature("other", &header, body));
        assert!(!verify_signature("s3cret", &header, b"tampered"));
    }

    #[test]
    fn malformed_signature_header_is_rejected() {
        assert!(!verify_signature("s", "md5=abcd", b"x"));
        assert!(!verify_signature("s", "sha256=not-hex", b"x"));
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = AuthConfig {
            bearer_token: Some("tok-123".into()),
            webhook_secret: Some("hush".into()),
        };
        let out = format!("{config:?}");
        assert!(!out.contains("tok-123"));
        assert!(!out.contains("hush"));
        assert!(out.contains("[redacted]"));
    }

    #[test]
    fn open_when_unconfigured() {
        assert!(AuthConfig::default().is_open());
    }
}
