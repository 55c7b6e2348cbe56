//! Origin allow-list check, applied ahead of the WebSocket upgrade routes and
//! the two GET endpoints. An explicit per-request check rather than a
//! general-purpose CORS crate — the policy decision belongs here, its
//! transport mechanics don't need a whole middleware framework.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

#[derive(Clone)]
pub struct OriginPolicy {
    allowed: Arc<Vec<String>>,
}

impl OriginPolicy {
    pub fn new(allowed_origins: Vec<String>) -> Self {
        Self { allowed: Arc::new(allowed_origins) }
    }

    fn is_allowed(&self, origin: &str) -> bool {
        self.allowed.iter().any(|a| a == origin)
    }
}

pub async fn enforce_origin(
    State(policy): State<OriginPolicy>,
    request: Request,
    next: Next,
) -> Response {
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    let Some(origin) = origin else {
        // Absent Origin is allowed — non-browser clients (CLI tools, the
        // update-firmware subcommand's own HTTP checks) never send one.
        return next.run(request).await;
    };

    if !policy.is_allowed(&origin) {
        tracing::warn!(origin = %origin, "rejected request from disallowed origin");
        return StatusCode::FORBIDDEN.into_response();
    }

    if request.method() == Method::OPTIONS {
        let mut response = StatusCode::OK.into_response();
        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(&origin) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        }
        headers.insert("Access-Control-Allow-Private-Network", HeaderValue::from_static("true"));
        headers.insert(header::VARY, HeaderValue::from_static("Origin"));
        return response;
    }

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&origin) {
        response.headers_mut().insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }
    response.headers_mut().insert(header::VARY, HeaderValue::from_static("Origin"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn test_app(policy: OriginPolicy) -> Router {
        Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn_with_state(policy.clone(), enforce_origin))
            .with_state(policy)
    }

    #[tokio::test]
    async fn absent_origin_is_allowed() {
        let app = test_app(OriginPolicy::new(vec!["http://allowed.example".to_owned()]));
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn disallowed_origin_is_rejected_with_403() {
        let app = test_app(OriginPolicy::new(vec!["http://allowed.example".to_owned()]));
        let request = Request::builder()
            .uri("/")
            .header(header::ORIGIN, "http://evil.example")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn allowed_origin_gets_cors_headers() {
        let app = test_app(OriginPolicy::new(vec!["http://allowed.example".to_owned()]));
        let request = Request::builder()
            .uri("/")
            .header(header::ORIGIN, "http://allowed.example")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "http://allowed.example"
        );
    }

    #[tokio::test]
    async fn options_preflight_gets_200_with_private_network_header() {
        let app = test_app(OriginPolicy::new(vec!["http://allowed.example".to_owned()]));
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/")
            .header(header::ORIGIN, "http://allowed.example")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("Access-Control-Allow-Private-Network").unwrap(), "true");
        assert_eq!(response.headers().get(header::VARY).unwrap(), "Origin");
    }
}
