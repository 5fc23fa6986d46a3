pub mod health;
pub mod otp;
pub mod rate_limit;
