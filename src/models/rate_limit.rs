use serde::Serialize;

/// Which identity a rate limit was applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitScope {
    Phone,
    Ip,
}

impl RateLimitScope {
    /// Message shown to the user; phone and IP limits read differently so the UI can
    /// render them as-is.
    pub fn user_message(self) -> &'static str {
        match self {
            RateLimitScope::Phone => "درخواست‌های زیادی برای این شماره ثبت شده است. لطفاً چند دقیقه بعد دوباره تلاش کنید.",
            RateLimitScope::Ip => "تعداد درخواست‌ها بیش از حد مجاز است. لطفاً کمی بعد دوباره تلاش کنید.",
        }
    }
}

/// Purpose of a fixed-window counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitPurpose {
    SendByPhone,
    SendByIp,
    VerifyByIp,
}

impl RateLimitPurpose {
    pub fn scope(self) -> RateLimitScope {
        match self {
            RateLimitPurpose::SendByPhone => RateLimitScope::Phone,
            RateLimitPurpose::SendByIp | RateLimitPurpose::VerifyByIp => RateLimitScope::Ip,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_and_ip_messages_differ() {
        assert_ne!(RateLimitScope::Phone.user_message(), RateLimitScope::Ip.user_message());
    }

    #[test]
    fn purposes_map_to_scopes() {
        assert_eq!(RateLimitPurpose::SendByPhone.scope(), RateLimitScope::Phone);
        assert_eq!(RateLimitPurpose::SendByIp.scope(), RateLimitScope::Ip);
        assert_eq!(RateLimitPurpose::VerifyByIp.scope(), RateLimitScope::Ip);
    }
}
