use crate::clock::Clock;
use crate::config::{OtpConfig, RateLimitConfig};
use crate::error::app_error::AppError;
use crate::models::rate_limit::RateLimitPurpose;
use crate::service::rate_limit::RateLimiter;
use crate::service::sms::{SmsGateway, VerificationSms};
use crate::store::{StoreOp, TtlStore, keys};
use crate::validation::{is_valid_code, is_valid_full_name, is_valid_mobile, mask_mobile, normalize_mobile};
use std::sync::Arc;
use tracing::{info, warn};

/// Bounds of the failed-attempt counter's lifetime, independent of the code TTL.
const ATTEMPTS_TTL_MIN_SECONDS: u64 = 30;
const ATTEMPTS_TTL_MAX_SECONDS: u64 = 300;

/// Uniform in `[1000, 9999]`, so a code never starts with zero.
pub fn generate_code() -> String {
    rand::random_range(1000..=9999u32).to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssuedCode {
    pub ttl_seconds: u64,
}

pub struct OtpService {
    store: Arc<dyn TtlStore>,
    limiter: RateLimiter,
    sms: Arc<dyn SmsGateway>,
    clock: Arc<dyn Clock>,
    otp: OtpConfig,
    limits: RateLimitConfig,
    sms_template: String,
}

impl OtpService {
    pub fn new(
        store: Arc<dyn TtlStore>,
        sms: Arc<dyn SmsGateway>,
        clock: Arc<dyn Clock>,
        otp: OtpConfig,
        limits: RateLimitConfig,
        sms_template: impl Into<String>,
    ) -> Self {
        Self {
            limiter: RateLimiter::new(store.clone()),
            store,
            sms,
            clock,
            otp,
            limits,
            sms_template: sms_template.into(),
        }
    }

    /// Issues a fresh code to `phone` and texts it.
    ///
    /// The phone quota is spent even when the SMS fails; the written record is rolled
    /// back so no undelivered code stays valid.
    pub async fn send(&self, phone: &str, full_name: &str, client_ip: &str) -> Result<IssuedCode, AppError> {
        if !is_valid_mobile(phone) {
            return Err(AppError::BadPayload("phone".to_string()));
        }
        if !is_valid_full_name(full_name) {
            return Err(AppError::BadPayload("fullName".to_string()));
        }

        let phone = normalize_mobile(phone);

        self.enforce(
            RateLimitPurpose::SendByPhone,
            &keys::send_by_phone(&phone),
            self.limits.send_limit_per_phone,
            self.limits.send_window_seconds,
        )
        .await?;
        self.enforce(
            RateLimitPurpose::SendByIp,
            &keys::send_by_ip(client_ip),
            self.limits.send_limit_per_ip,
            self.limits.send_ip_window_seconds,
        )
        .await?;

        let code = generate_code();
        let ttl = self.otp.ttl_seconds;
        let expires_at = self.expires_at(ttl);
        let [code_key, exp_key, attempts_key] = keys::otp_record(&phone);

        self.store
            .write_batch(&[
                StoreOp::SetEx {
                    key: code_key,
                    value: code.clone(),
                    ttl_seconds: ttl,
                },
                StoreOp::SetEx {
                    key: exp_key,
                    value: expires_at.to_string(),
                    ttl_seconds: ttl,
                },
                StoreOp::Del { key: attempts_key },
            ])
            .await?;

        let sms = VerificationSms {
            receptor: &phone,
            token: &code,
            template: &self.sms_template,
        };

        if let Err(e) = self.sms.send(&sms).await {
            warn!(phone = %mask_mobile(&phone), error = %e, "SMS dispatch failed, rolling back issued code");
            self.store.del(&keys::otp_record(&phone)).await?;
            return Err(e.into());
        }

        info!(phone = %mask_mobile(&phone), ttl_seconds = ttl, "verification code sent");
        Ok(IssuedCode { ttl_seconds: ttl })
    }

    /// Checks `code` against the live record for `phone`; a match consumes the record.
    pub async fn verify(&self, phone: &str, code: &str, client_ip: &str) -> Result<(), AppError> {
        if !is_valid_mobile(phone) {
            return Err(AppError::BadPayload("phone".to_string()));
        }
        if !is_valid_code(code) {
            return Err(AppError::BadPayload("code".to_string()));
        }

        let phone = normalize_mobile(phone);

        self.enforce(
            RateLimitPurpose::VerifyByIp,
            &keys::verify_by_ip(client_ip),
            self.limits.verify_limit_per_ip,
            self.limits.verify_ip_window_seconds,
        )
        .await?;

        let record = keys::otp_record(&phone);
        let [code_key, exp_key, attempts_key] = &record;

        let values = self.store.mget(&[code_key.clone(), exp_key.clone()]).await?;
        let (stored_code, expires_at) = match values.as_slice() {
            [Some(stored_code), Some(expires_at)] => match expires_at.parse::<i64>() {
                Ok(expires_at) => (stored_code.clone(), expires_at),
                Err(_) => return Err(AppError::NotFoundOrExpired),
            },
            _ => return Err(AppError::NotFoundOrExpired),
        };

        if self.clock.now_millis() > expires_at {
            self.store.del(&record).await?;
            return Err(AppError::Expired);
        }

        let attempts = self
            .store
            .get(attempts_key)
            .await?
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(0);
        if attempts >= self.otp.max_attempts {
            warn!(phone = %mask_mobile(&phone), attempts, "attempt limit reached, discarding code");
            self.store.del(&record).await?;
            return Err(AppError::TooManyAttempts);
        }

        if code != stored_code {
            let attempts_ttl = self.otp.ttl_seconds.clamp(ATTEMPTS_TTL_MIN_SECONDS, ATTEMPTS_TTL_MAX_SECONDS);
            return match self.store.incr_if_exists(code_key, attempts_key, attempts_ttl).await? {
                Some(failed) if u64::try_from(failed).unwrap_or(0) >= self.otp.max_attempts => {
                    warn!(phone = %mask_mobile(&phone), failed_attempts = failed, "attempt limit reached, discarding code");
                    self.store.del(&record).await?;
                    Err(AppError::TooManyAttempts)
                }
                Some(failed) => {
                    info!(phone = %mask_mobile(&phone), failed_attempts = failed, "verification code mismatch");
                    Err(AppError::CodeMismatch)
                }
                None => Err(AppError::NotFoundOrExpired),
            };
        }

        self.store.del(&record).await?;
        info!(phone = %mask_mobile(&phone), "verification code accepted");
        Ok(())
    }

    async fn enforce(&self, purpose: RateLimitPurpose, key: &str, limit: u64, window_seconds: u64) -> Result<(), AppError> {
        if !self.limiter.hit(key, limit, window_seconds).await? {
            return Ok(());
        }

        let retry_after = self.limiter.retry_after(key).await?;
        warn!(purpose = ?purpose, key = %key, retry_after_secs = retry_after, "rate limit exceeded");
        Err(AppError::rate_limited(purpose.scope(), Some(retry_after)))
    }

    fn expires_at(&self, ttl_seconds: u64) -> i64 {
        let ttl_ms = i64::try_from(ttl_seconds.saturating_mul(1000)).unwrap_or(i64::MAX);
        self.clock.now_millis().saturating_add(ttl_ms)
    }
}
