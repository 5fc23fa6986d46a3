use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Request an SMS verification code
#[derive(Debug, Deserialize, Validate, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendOtpRequest {
    /// Mobile number, `09xxxxxxxxx` or `9xxxxxxxxx`
    #[validate(custom(function = "crate::validation::validate_mobile"))]
    pub phone: String,
    #[validate(custom(function = "crate::validation::validate_full_name"))]
    pub full_name: String,
}

/// Verify a previously sent code
#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct VerifyOtpRequest {
    #[validate(custom(function = "crate::validation::validate_mobile"))]
    pub phone: String,
    /// Four ASCII digits
    #[validate(custom(function = "crate::validation::validate_code"))]
    pub code: String,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct SendOtpResponse {
    pub ok: bool,
    /// Seconds the code stays valid
    pub ttl: u64,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct VerifyOtpResponse {
    pub ok: bool,
}
