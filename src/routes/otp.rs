use crate::error::app_error::AppError;
use crate::error::json::JsonBody;
use crate::middleware::ClientIp;
use crate::models::otp::{SendOtpRequest, SendOtpResponse, VerifyOtpRequest, VerifyOtpResponse};
use crate::service::otp::OtpService;
use rocket::serde::json::Json;
use rocket::{State, post};
use rocket_okapi::openapi;
use validator::Validate;

/// Send a verification code by SMS
///
/// Rate limited per phone and per client IP. The response carries the code lifetime
/// in seconds.
#[openapi(tag = "OTP")]
#[post("/send", data = "<payload>")]
pub async fn send_otp(service: &State<OtpService>, client_ip: ClientIp, payload: JsonBody<SendOtpRequest>) -> Result<Json<SendOtpResponse>, AppError> {
    payload.validate()?;

    let issued = service.send(&payload.phone, &payload.full_name, client_ip.or_unknown()).await?;

    Ok(Json(SendOtpResponse {
        ok: true,
        ttl: issued.ttl_seconds,
    }))
}

/// Verify a code sent to a phone
///
/// A correct code can be used once. Too many wrong codes discard it.
#[openapi(tag = "OTP")]
#[post("/verify", data = "<payload>")]
pub async fn verify_otp(service: &State<OtpService>, client_ip: ClientIp, payload: JsonBody<VerifyOtpRequest>) -> Result<Json<VerifyOtpResponse>, AppError> {
    payload.validate()?;

    service.verify(&payload.phone, &payload.code, client_ip.or_unknown()).await?;

    Ok(Json(VerifyOtpResponse { ok: true }))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![send_otp, verify_otp]
}
