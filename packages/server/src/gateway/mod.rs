//! Gateway: path-prefix router in front of the question and search services.
//!
//! `/questions/**` and `/tags/**` forward to the question service,
//! `/search/**` to the search service, anything else is 404. The gateway
//! forwards method, path, query, headers (minus hop-by-hop), and body
//! verbatim; it terminates nothing else, so authentication stays between
//! the client and the question service.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;

use crate::error::ApiError;

/// Request bodies above this size are rejected before forwarding.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Headers that are connection-scoped and must not be forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// The upstream a path prefix resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upstream {
    Questions,
    Search,
}

/// Resolves a request path to its upstream, if any.
#[must_use]
pub fn route_for(path: &str) -> Option<Upstream> {
    let prefix_match =
        |prefix: &str| path == prefix || path.starts_with(&format!("{prefix}/"));

    if prefix_match("/questions") || prefix_match("/tags") {
        Some(Upstream::Questions)
    } else if prefix_match("/search") {
        Some(Upstream::Search)
    } else {
        None
    }
}

/// Strips hop-by-hop headers plus `host` (reqwest sets its own) and
/// `content-length` (recomputed for the forwarded body).
fn strip_connection_headers(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
    headers.remove("host");
    headers.remove("content-length");
}

#[derive(Clone)]
pub struct GatewayState {
    pub client: reqwest::Client,
    pub questions_upstream: String,
    pub search_upstream: String,
}

impl GatewayState {
    fn base_url(&self, upstream: Upstream) -> &str {
        match upstream {
            Upstream::Questions => &self.questions_upstream,
            Upstream::Search => &self.search_upstream,
        }
    }
}

/// Forwards one request to its upstream and relays the response.
pub async fn forward(
    State(state): State<GatewayState>,
    request: Request,
) -> Result<Response, ApiError> {
    let (parts, body) = request.into_parts();

    let Some(upstream) = route_for(parts.uri.path()) else {
        return Ok(StatusCode::NOT_FOUND.into_response());
    };

    let mut url = format!("{}{}", state.base_url(upstream), parts.uri.path());
    if let Some(query) = parts.uri.query() {
        url.push('?');
        url.push_str(query);
    }

    let body_bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| ApiError::PayloadTooLarge)?;

    let mut headers = parts.headers;
    strip_connection_headers(&mut headers);

    let upstream_response = state
        .client
        .request(parts.method, url)
        .headers(headers)
        .body(body_bytes)
        .send()
        .await
        .map_err(|err| ApiError::Upstream(anyhow::Error::from(err)))?;

    let status = upstream_response.status();
    let mut response_headers = upstream_response.headers().clone();
    strip_connection_headers(&mut response_headers);

    let response_body = upstream_response
        .bytes()
        .await
        .map_err(|err| ApiError::Upstream(anyhow::Error::from(err)))?;

    let mut response = Response::new(Body::from(response_body));
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    Ok(response)
}

/// The gateway router: every path goes through [`forward`].
pub fn router(state: GatewayState) -> Router {
    Router::new().fallback(forward).with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::http::header::{HeaderValue, AUTHORIZATION, CONNECTION, HOST, TRANSFER_ENCODING};

    use super::*;

    #[test]
    fn question_and_tag_paths_route_to_questions() {
        assert_eq!(route_for("/questions"), Some(Upstream::Questions));
        assert_eq!(
            route_for("/questions/123/answers"),
            Some(Upstream::Questions)
        );
        assert_eq!(route_for("/tags"), Some(Upstream::Questions));
        assert_eq!(route_for("/tags/rust"), Some(Upstream::Questions));
    }

    #[test]
    fn search_paths_route_to_search() {
        assert_eq!(route_for("/search"), Some(Upstream::Search));
        assert_eq!(route_for("/search/advanced"), Some(Upstream::Search));
    }

    #[test]
    fn unknown_and_lookalike_paths_do_not_route() {
        assert_eq!(route_for("/"), None);
        assert_eq!(route_for("/questionsextra"), None);
        assert_eq!(route_for("/searching"), None);
        assert_eq!(route_for("/admin"), None);
    }

    #[test]
    fn connection_headers_are_stripped_but_auth_survives() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer token"));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(HOST, HeaderValue::from_static("gateway.local"));
        headers.insert("x-request-id", HeaderValue::from_static("abc"));

        strip_connection_headers(&mut headers);

        assert!(headers.contains_key(AUTHORIZATION));
        assert!(headers.contains_key("x-request-id"));
        assert!(!headers.contains_key(CONNECTION));
        assert!(!headers.contains_key(TRANSFER_ENCODING));
        assert!(!headers.contains_key(HOST));
    }

    #[tokio::test]
    async fn unrouted_request_is_404_without_contacting_upstreams() {
        // Unroutable upstream URLs prove no request is attempted.
        let state = GatewayState {
            client: reqwest::Client::new(),
            questions_upstream: "http://127.0.0.1:1".to_string(),
            search_upstream: "http://127.0.0.1:1".to_string(),
        };

        let request = Request::builder()
            .uri("/nowhere")
            .body(Body::empty())
            .unwrap();
        let response = forward(State(state), request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unreachable_upstream_maps_to_bad_gateway() {
        let state = GatewayState {
            client: reqwest::Client::new(),
            // Port 1 is essentially never listening.
            questions_upstream: "http://127.0.0.1:1".to_string(),
            search_upstream: "http://127.0.0.1:1".to_string(),
        };

        let request = Request::builder()
            .uri("/questions")
            .body(Body::empty())
            .unwrap();
        let err = forward(State(state), request).await.unwrap_err();
        assert!(matches!(err, ApiError::Upstream(_)));
    }
}
