pub mod otp;
pub mod rate_limit;
pub mod sms;
