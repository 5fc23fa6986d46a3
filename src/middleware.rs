use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::{Header, Status};
use rocket::request::{FromRequest, Outcome, Request};
use rocket::{Data, Response};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Identity used for rate limiting when the client address cannot be determined.
pub const UNKNOWN_CLIENT_IP: &str = "unknown";
const UNKNOWN_REQUEST_ID: &str = "unknown";

/// Tracking data cached on every request by [`RequestLogger`].
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub id: String,
    started: Instant,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            started: Instant::now(),
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

pub fn request_id<'r>(request: &'r Request<'_>) -> &'r str {
    request
        .local_cache(|| None::<RequestContext>)
        .as_ref()
        .map(|ctx| ctx.id.as_str())
        .unwrap_or(UNKNOWN_REQUEST_ID)
}

/// Machine-readable reason an OTP request was refused, recorded by the error responder so
/// the completion log line can say why.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejection(pub &'static str);

/// Assigns request ids, sets response hardening headers and writes one completion line per
/// request with the client address, latency and rejection reason.
pub struct RequestLogger;

#[rocket::async_trait]
impl Fairing for RequestLogger {
    fn info(&self) -> Info {
        Info {
            name: "OTP Request Logger",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _: &mut Data<'_>) {
        let ctx = RequestContext::new();
        debug!(request_id = %ctx.id, method = %request.method(), uri = %request.uri(), "incoming request");
        request.local_cache(|| Some(ctx));
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let ctx = request.local_cache(|| None::<RequestContext>).as_ref();
        let request_id = ctx.map(|c| c.id.as_str()).unwrap_or(UNKNOWN_REQUEST_ID);
        let elapsed_ms = ctx.map(|c| u64::try_from(c.started.elapsed().as_millis()).unwrap_or(u64::MAX)).unwrap_or_default();
        let reason = request.local_cache(|| None::<Rejection>).map(|r| r.0).unwrap_or("-");
        let client_ip = request.client_ip().map(|ip| ip.to_string()).unwrap_or_else(|| UNKNOWN_CLIENT_IP.to_string());

        response.set_header(Header::new("X-Request-Id", request_id.to_string()));
        response.set_header(Header::new("X-Content-Type-Options", "nosniff"));
        response.set_header(Header::new("X-Frame-Options", "DENY"));
        // OTP responses must never be replayed from a cache.
        response.set_header(Header::new("Cache-Control", "no-store"));

        let status = response.status();
        if status == Status::TooManyRequests {
            warn!(
                request_id,
                uri = %request.uri(),
                client_ip = %client_ip,
                reason,
                retry_after = response.headers().get_one("Retry-After").unwrap_or("-"),
                elapsed_ms,
                "request throttled"
            );
        } else if status.class().is_server_error() {
            error!(request_id, uri = %request.uri(), client_ip = %client_ip, reason, status = status.code, elapsed_ms, "request failed");
        } else if status.class().is_client_error() {
            info!(request_id, uri = %request.uri(), client_ip = %client_ip, reason, status = status.code, elapsed_ms, "request rejected");
        } else {
            info!(request_id, method = %request.method(), uri = %request.uri(), status = status.code, elapsed_ms, "request completed");
        }
    }
}

// ── ClientIp guard ────────────────────────────────────────────────────────────

/// Client address used as the IP rate-limit identity: the socket address, or the trusted
/// proxy header when `server.ip_header` is configured.
pub struct ClientIp(pub Option<String>);

impl ClientIp {
    pub fn or_unknown(&self) -> &str {
        self.0.as_deref().unwrap_or(UNKNOWN_CLIENT_IP)
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ClientIp {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, ()> {
        let ip = req.client_ip().map(|ip| ip.to_string());
        if ip.is_none() {
            warn!(method = %req.method(), uri = %req.uri(), "client ip unavailable for rate limiting");
        }
        Outcome::Success(ClientIp(ip))
    }
}

impl<'a> OpenApiFromRequest<'a> for ClientIp {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}
