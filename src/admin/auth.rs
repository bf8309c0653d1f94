//! Bearer-token authentication for the admin API.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};

/// Expected credential, cloned into the middleware at router build time.
#[derive(Clone)]
pub struct AdminAuth {
    pub api_key: String,
}

pub async fn admin_auth_middleware(
    State(auth): State<AdminAuth>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let header = request
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok());

    match header {
        Some(value) if value == format!("Bearer {}", auth.api_key) => {
            Ok(next.run(request).await)
        }
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}
