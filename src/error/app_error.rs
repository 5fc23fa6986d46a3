use crate::middleware::{Rejection, request_id};
use crate::models::rate_limit::RateLimitScope;
use crate::service::sms::SmsError;
use rocket::http::{ContentType, Header, Status};
use rocket::response::Responder;
use rocket::{Request, Response};
use rocket_okapi::OpenApiError;
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::Responses;
use rocket_okapi::response::OpenApiResponderInner;
use serde::Serialize;
use std::io::Cursor;
use thiserror::Error;
use tracing::{error, warn};
use validator::ValidationErrors;

/// Display strings are the localized messages returned to the client.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("اطلاعات ارسالی نامعتبر است: {0}")]
    BadPayload(String),
    #[error("اطلاعات ارسالی نامعتبر است.")]
    Validation(#[from] ValidationErrors),
    #[error("{}", .scope.user_message())]
    RateLimited { scope: RateLimitScope, retry_after: Option<u64> },
    #[error("کد منقضی شده یا ارسال نشده است. لطفاً کد جدید دریافت کنید.")]
    NotFoundOrExpired,
    #[error("کد منقضی شده است. لطفاً کد جدید دریافت کنید.")]
    Expired,
    #[error("تعداد تلاش‌های ناموفق بیش از حد مجاز است. لطفاً کد جدید دریافت کنید.")]
    TooManyAttempts,
    #[error("کد وارد شده صحیح نیست.")]
    CodeMismatch,
    #[error("ارسال پیامک با خطا مواجه شد. لطفاً دوباره تلاش کنید.")]
    SmsDispatchFailed {
        #[source]
        source: SmsError,
    },
    #[error("خطای داخلی سرور")]
    Configuration { message: String },
    #[error("سرویس موقتاً در دسترس نیست. لطفاً دوباره تلاش کنید.")]
    Store {
        message: String,
        #[source]
        source: Option<redis::RedisError>,
    },
}

impl AppError {
    pub fn store(message: impl Into<String>, source: redis::RedisError) -> Self {
        Self::Store {
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn rate_limited(scope: RateLimitScope, retry_after: Option<u64>) -> Self {
        Self::RateLimited { scope, retry_after }
    }

    /// Stable label for logs.
    pub fn reason(&self) -> &'static str {
        match self {
            AppError::BadPayload(_) | AppError::Validation(_) => "invalid_payload",
            AppError::RateLimited {
                scope: RateLimitScope::Phone,
                ..
            } => "rate_limited_phone",
            AppError::RateLimited { scope: RateLimitScope::Ip, .. } => "rate_limited_ip",
            AppError::NotFoundOrExpired => "code_not_found",
            AppError::Expired => "code_expired",
            AppError::TooManyAttempts => "attempts_exhausted",
            AppError::CodeMismatch => "code_mismatch",
            AppError::SmsDispatchFailed { .. } => "sms_failed",
            AppError::Configuration { .. } => "misconfigured",
            AppError::Store { .. } => "store_unavailable",
        }
    }
}

impl From<redis::RedisError> for AppError {
    fn from(e: redis::RedisError) -> Self {
        AppError::store("Redis command failed", e)
    }
}

impl From<SmsError> for AppError {
    fn from(e: SmsError) -> Self {
        match e {
            SmsError::NotConfigured => AppError::Configuration {
                message: "SMS provider is not configured".to_string(),
            },
            source => AppError::SmsDispatchFailed { source },
        }
    }
}

impl From<&AppError> for Status {
    fn from(e: &AppError) -> Self {
        match e {
            AppError::BadPayload(_) => Status::BadRequest,
            AppError::Validation(_) => Status::BadRequest,
            AppError::RateLimited { .. } => Status::TooManyRequests,
            AppError::NotFoundOrExpired => Status::BadRequest,
            AppError::Expired => Status::BadRequest,
            AppError::TooManyAttempts => Status::TooManyRequests,
            AppError::CodeMismatch => Status::BadRequest,
            AppError::SmsDispatchFailed { .. } => Status::BadGateway,
            AppError::Configuration { .. } => Status::InternalServerError,
            AppError::Store { .. } => Status::ServiceUnavailable,
        }
    }
}

/// Body of every failed API response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub ok: bool,
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self { ok: false, error: error.into() }
    }
}

impl<'r> Responder<'r, 'static> for AppError {
    fn respond_to(self, req: &Request<'_>) -> rocket::response::Result<'static> {
        let method = req.method();
        let uri = req.uri();

        let request_id = request_id(req);
        req.local_cache(|| Some(Rejection(self.reason())));

        let status = Status::from(&self);
        if status.class().is_server_error() {
            error!(
                error = ?self,
                request_id = %request_id,
                method = %method,
                uri = %uri,
                "request failed"
            );
        } else {
            warn!(
                error = ?self,
                request_id = %request_id,
                method = %method,
                uri = %uri,
                "request rejected"
            );
        }

        let retry_after = match &self {
            AppError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        };

        let body = serde_json::to_string(&ErrorBody::new(self.to_string())).map_err(|_| Status::InternalServerError)?;

        let mut response = Response::build();
        response
            .status(status)
            .header(ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body));
        if let Some(seconds) = retry_after {
            response.header(Header::new("Retry-After", seconds.to_string()));
        }
        response.ok()
    }
}

impl OpenApiResponderInner for AppError {
    fn responses(_gen: &mut OpenApiGenerator) -> Result<Responses, OpenApiError> {
        use rocket_okapi::okapi::openapi3::{RefOr, Response as OpenApiResponse};
        let mut responses = Responses::default();
        for (code, description) in [
            ("400", "Bad Request"),
            ("429", "Too Many Requests"),
            ("500", "Internal Server Error"),
            ("502", "SMS Dispatch Failed"),
            ("503", "Store Unavailable"),
        ] {
            responses.responses.insert(
                code.to_string(),
                RefOr::Object(OpenApiResponse {
                    description: description.to_string(),
                    ..Default::default()
                }),
            );
        }
        Ok(responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn statuses_follow_error_taxonomy() {
        assert_eq!(Status::from(&AppError::BadPayload("x".into())), Status::BadRequest);
        assert_eq!(Status::from(&AppError::rate_limited(RateLimitScope::Phone, None)), Status::TooManyRequests);
        assert_eq!(Status::from(&AppError::NotFoundOrExpired), Status::BadRequest);
        assert_eq!(Status::from(&AppError::Expired), Status::BadRequest);
        assert_eq!(Status::from(&AppError::TooManyAttempts), Status::TooManyRequests);
        assert_eq!(Status::from(&AppError::CodeMismatch), Status::BadRequest);
        assert_eq!(
            Status::from(&AppError::SmsDispatchFailed {
                source: SmsError::Timeout(Duration::from_secs(10))
            }),
            Status::BadGateway
        );
        assert_eq!(
            Status::from(&AppError::Store {
                message: "down".into(),
                source: None
            }),
            Status::ServiceUnavailable
        );
    }

    #[test]
    fn rate_limit_messages_depend_on_scope() {
        let phone = AppError::rate_limited(RateLimitScope::Phone, Some(30)).to_string();
        let ip = AppError::rate_limited(RateLimitScope::Ip, Some(30)).to_string();
        assert_eq!(phone, RateLimitScope::Phone.user_message());
        assert_eq!(ip, RateLimitScope::Ip.user_message());
        assert_ne!(phone, ip);
    }

    #[test]
    fn unconfigured_sms_is_a_configuration_error() {
        assert!(matches!(AppError::from(SmsError::NotConfigured), AppError::Configuration { .. }));
        assert!(matches!(
            AppError::from(SmsError::Timeout(Duration::from_secs(1))),
            AppError::SmsDispatchFailed { .. }
        ));
    }
}
