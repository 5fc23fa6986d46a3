//! Key layout shared with existing deployments. Do not change the formats.

pub fn otp_code(phone: &str) -> String {
    format!("otp:{}:code", phone)
}

pub fn otp_expires_at(phone: &str) -> String {
    format!("otp:{}:exp", phone)
}

pub fn otp_attempts(phone: &str) -> String {
    format!("otp:{}:attempts", phone)
}

/// All three keys of an OTP record, in `code`, `exp`, `attempts` order.
pub fn otp_record(phone: &str) -> [String; 3] {
    [otp_code(phone), otp_expires_at(phone), otp_attempts(phone)]
}

pub fn send_by_phone(phone: &str) -> String {
    format!("rl:send:phone:{}", phone)
}

pub fn send_by_ip(ip: &str) -> String {
    format!("rl:send:ip:{}", ip)
}

pub fn verify_by_ip(ip: &str) -> String {
    format!("rl:verify:ip:{}", ip)
}
