//! Request pipeline
//!
//! A single [`dispatch`] middleware wraps every route, including the
//! not-found fallback. It writes the request log entry, runs the stages
//! that the path's [`RouteClass`] calls for in their fixed order, hands the
//! request to the router, and writes exactly one classified response entry
//! once the handler (or a short-circuiting stage) has produced a response.

use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{
        StatusCode, Uri,
        header::{ALLOW, AUTHORIZATION},
        request::Parts,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use auth::{AuthError, RateDecision};
use common::logging::{LogEntry, LogKind, Presence, RequestMeta};
use tracing::{debug, warn};

use crate::{
    error::{ApiError, ErrorContext},
    query::Resource,
    state::AppState,
};

/// Header carrying the calling application's API key
pub const API_KEY_HEADER: &str = "x-api-key";

const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// One gate a request has to pass before reaching its handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    RateLimit,
    ApiKey,
    Bearer,
}

impl Stage {
    /// Let the request through or reject it
    ///
    /// The bearer stage leaves the decoded [`auth::Claims`] in the request
    /// extensions for the handler.
    pub async fn run(&self, state: &AppState, parts: &mut Parts) -> Result<(), ApiError> {
        match self {
            Stage::RateLimit => {
                let client = client_identity(parts);
                match state.rate_limiter.check(&client).await {
                    RateDecision::Allowed { .. } => Ok(()),
                    RateDecision::Throttled { retry_after } => Err(ApiError::TooManyRequests {
                        retry_after: retry_after.as_secs().max(1),
                    }),
                }
            }
            Stage::ApiKey => {
                let key = match parts.headers.get(API_KEY_HEADER).map(|value| value.to_str()) {
                    Some(Err(_)) => {
                        warn!("Rejected request with an unreadable API key header");
                        return Err(AuthError::InvalidApiKey.into());
                    }
                    Some(Ok(key)) => Some(key),
                    None => None,
                };
                state.authenticator.validate_api_key(key).await?;
                Ok(())
            }
            Stage::Bearer => {
                // The scheme word is not checked; whatever follows it is the token
                let token = match parts.headers.get(AUTHORIZATION).map(|value| value.to_str()) {
                    Some(Err(_)) => return Err(AuthError::InvalidToken.into()),
                    Some(Ok(raw)) => raw.split_whitespace().nth(1),
                    None => None,
                };
                let claims = state.authenticator.authenticate(token)?;
                parts.extensions.insert(claims);
                Ok(())
            }
        }
    }
}

/// Which gates apply to a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// Outside `/api`
    Public,
    /// `/api/auth/*`
    Auth,
    /// `/api/protected`
    Protected,
    /// `/api/{movies,tvshows,actors,directors}` and below
    Catalog,
    /// Any other `/api` path
    Api,
}

impl RouteClass {
    pub fn classify(path: &str) -> Self {
        let Some(rest) = under(path, "/api") else {
            return RouteClass::Public;
        };

        let segment = rest
            .trim_start_matches('/')
            .split('/')
            .next()
            .unwrap_or_default();

        match segment {
            "auth" => RouteClass::Auth,
            "protected" => RouteClass::Protected,
            other if Resource::from_segment(other).is_some() => RouteClass::Catalog,
            _ => RouteClass::Api,
        }
    }

    /// Stages in the order they run
    pub fn stages(&self) -> &'static [Stage] {
        match self {
            RouteClass::Public | RouteClass::Auth => &[],
            RouteClass::Protected => &[Stage::RateLimit, Stage::Bearer],
            RouteClass::Catalog => &[Stage::RateLimit, Stage::ApiKey, Stage::Bearer],
            RouteClass::Api => &[Stage::RateLimit, Stage::ApiKey],
        }
    }
}

/// `path` with `prefix` removed, if `path` is `prefix` itself or lies below it
fn under<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = path.strip_prefix(prefix)?;
    (rest.is_empty() || rest.starts_with('/')).then_some(rest)
}

/// Rate limiting key for a request
///
/// The first `x-forwarded-for` hop wins when it is an IP address, then the
/// socket peer address.
pub fn client_identity(parts: &Parts) -> String {
    let forwarded = parts
        .headers
        .get(FORWARDED_FOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|client| client.trim().parse::<IpAddr>().ok());

    if let Some(client) = forwarded {
        return client.to_string();
    }

    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Log stream for a response status
pub fn classify_status(status: StatusCode) -> LogKind {
    match status {
        s if s.is_server_error() => LogKind::Error,
        StatusCode::NOT_FOUND | StatusCode::TOO_MANY_REQUESTS | StatusCode::NOT_MODIFIED => {
            LogKind::Warning
        }
        s if s.is_client_error() => LogKind::Error,
        _ => LogKind::Response,
    }
}

fn url_of(uri: &Uri) -> String {
    uri.path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string())
}

fn response_entry(
    meta: RequestMeta,
    status: StatusCode,
    elapsed: Duration,
    context: Option<ErrorContext>,
) -> LogEntry {
    let duration_ms = elapsed.as_secs_f64() * 1000.0;
    let (message, detail) = match context {
        Some(ErrorContext { message, detail }) => (message, detail),
        None => (
            status.canonical_reason().unwrap_or("Unknown status").to_string(),
            None,
        ),
    };
    let kind = classify_status(status);
    let status = status.as_u16();

    match kind {
        LogKind::Warning => LogEntry::Warning {
            meta,
            status,
            duration_ms,
            message,
        },
        LogKind::Error => LogEntry::Error {
            meta,
            status,
            duration_ms,
            message,
            detail,
        },
        LogKind::Request | LogKind::Response => LogEntry::Response {
            meta,
            status,
            duration_ms,
        },
    }
}

/// Give the router's bodiless 405 the JSON error shape, keeping `allow`
fn method_not_allowed(bare: Response) -> Response {
    let mut response = ApiError::MethodNotAllowed.into_response();
    if let Some(allow) = bare.headers().get(ALLOW) {
        response.headers_mut().insert(ALLOW, allow.clone());
    }
    response
}

/// Run the pipeline around the router
pub async fn dispatch(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let started = Instant::now();
    let (mut parts, body) = request.into_parts();

    let meta = RequestMeta::new(parts.method.as_str(), url_of(&parts.uri));
    state.log_sink.record(LogEntry::Request {
        meta: meta.clone(),
        api_key: Presence::of(parts.headers.contains_key(API_KEY_HEADER)),
        authorization: Presence::of(parts.headers.contains_key(AUTHORIZATION)),
        query: parts.uri.query().map(str::to_string),
    });

    let class = RouteClass::classify(parts.uri.path());
    let mut rejection = None;
    for stage in class.stages() {
        if let Err(err) = stage.run(&state, &mut parts).await {
            debug!("{:?} stage rejected {} {}", stage, meta.method, meta.url);
            rejection = Some(err);
            break;
        }
    }

    let mut response = match rejection {
        Some(err) => err.into_response(),
        None => next.run(Request::from_parts(parts, body)).await,
    };

    if response.status() == StatusCode::METHOD_NOT_ALLOWED
        && response.extensions().get::<ErrorContext>().is_none()
    {
        response = method_not_allowed(response);
    }

    let context = response.extensions_mut().remove::<ErrorContext>();
    state.log_sink.record(response_entry(
        meta.restamp(),
        response.status(),
        started.elapsed(),
        context,
    ));

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request as HttpRequest;

    fn parts(request: HttpRequest<()>) -> Parts {
        request.into_parts().0
    }

    #[test]
    fn test_route_classes() {
        let cases = [
            ("/", RouteClass::Public),
            ("/health", RouteClass::Public),
            ("/apiary", RouteClass::Public),
            ("/api/auth/login", RouteClass::Auth),
            ("/api/auth/register", RouteClass::Auth),
            ("/api/protected", RouteClass::Protected),
            ("/api/movies", RouteClass::Catalog),
            ("/api/movies/42", RouteClass::Catalog),
            ("/api/tvshows", RouteClass::Catalog),
            ("/api/actors", RouteClass::Catalog),
            ("/api/directors", RouteClass::Catalog),
            ("/api", RouteClass::Api),
            ("/api/", RouteClass::Api),
            ("/api/unknown", RouteClass::Api),
            ("/api/moviesx", RouteClass::Api),
        ];

        for (path, expected) in cases {
            assert_eq!(RouteClass::classify(path), expected, "{path}");
        }
    }

    #[test]
    fn test_stage_order() {
        assert!(RouteClass::Public.stages().is_empty());
        assert!(RouteClass::Auth.stages().is_empty());
        assert_eq!(
            RouteClass::Protected.stages(),
            &[Stage::RateLimit, Stage::Bearer]
        );
        assert_eq!(
            RouteClass::Catalog.stages(),
            &[Stage::RateLimit, Stage::ApiKey, Stage::Bearer]
        );
        assert_eq!(
            RouteClass::Api.stages(),
            &[Stage::RateLimit, Stage::ApiKey]
        );
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(classify_status(StatusCode::OK), LogKind::Response);
        assert_eq!(classify_status(StatusCode::CREATED), LogKind::Response);
        assert_eq!(classify_status(StatusCode::NOT_MODIFIED), LogKind::Warning);
        assert_eq!(classify_status(StatusCode::NOT_FOUND), LogKind::Warning);
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            LogKind::Warning
        );
        assert_eq!(classify_status(StatusCode::BAD_REQUEST), LogKind::Error);
        assert_eq!(classify_status(StatusCode::UNAUTHORIZED), LogKind::Error);
        assert_eq!(classify_status(StatusCode::FORBIDDEN), LogKind::Error);
        assert_eq!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR),
            LogKind::Error
        );
    }

    #[test]
    fn test_client_identity_prefers_first_forwarded_hop() {
        let request = HttpRequest::builder()
            .header(FORWARDED_FOR_HEADER, "203.0.113.7, 10.0.0.1")
            .body(())
            .unwrap();
        assert_eq!(client_identity(&parts(request)), "203.0.113.7");
    }

    #[test]
    fn test_client_identity_falls_back_to_peer_address() {
        let mut request = HttpRequest::builder().body(()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 5555))));
        assert_eq!(client_identity(&parts(request)), "192.0.2.1");

        let request = HttpRequest::builder().body(()).unwrap();
        assert_eq!(client_identity(&parts(request)), "unknown");
    }

    #[test]
    fn test_server_error_entry_keeps_detail() {
        let entry = response_entry(
            RequestMeta::new("GET", "/api/movies"),
            StatusCode::INTERNAL_SERVER_ERROR,
            Duration::from_millis(5),
            Some(ErrorContext {
                message: "Internal Server Error".to_string(),
                detail: Some("connection reset".to_string()),
            }),
        );

        match entry {
            LogEntry::Error {
                status,
                message,
                detail,
                duration_ms,
                ..
            } => {
                assert_eq!(status, 500);
                assert_eq!(message, "Internal Server Error");
                assert_eq!(detail.as_deref(), Some("connection reset"));
                assert!((duration_ms - 5.0).abs() < 1e-6);
            }
            other => panic!("expected an error entry, got {other:?}"),
        }
    }

    #[test]
    fn test_status_without_context_uses_reason_phrase() {
        let entry = response_entry(
            RequestMeta::new("POST", "/api/auth/register"),
            StatusCode::PAYLOAD_TOO_LARGE,
            Duration::ZERO,
            None,
        );
        assert!(matches!(
            entry,
            LogEntry::Error { ref message, .. } if message == "Payload Too Large"
        ));
    }

    #[test]
    fn test_client_identity_ignores_forwarded_value_that_is_not_an_address() {
        let mut request = HttpRequest::builder()
            .header(FORWARDED_FOR_HEADER, "rotate-me-1234, 10.0.0.1")
            .body(())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 9], 4000))));
        assert_eq!(client_identity(&parts(request)), "192.0.2.9");

        let request = HttpRequest::builder()
            .header(FORWARDED_FOR_HEADER, "2001:db8::1")
            .body(())
            .unwrap();
        assert_eq!(client_identity(&parts(request)), "2001:db8::1");
    }

    #[test]
    fn test_bare_method_not_allowed_gets_error_body() {
        let bare = axum::http::Response::builder()
            .status(StatusCode::METHOD_NOT_ALLOWED)
            .header(ALLOW, "GET,HEAD")
            .body(axum::body::Body::empty())
            .unwrap();

        let response = method_not_allowed(bare);
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "GET,HEAD");
        assert!(response.extensions().get::<ErrorContext>().is_some());
    }
}
