use crate::config::{SmsConfig, SmsMode};
use crate::validation::mask_mobile;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// A verification message: the provider fills `token` into `template` and texts it to
/// `receptor`.
#[derive(Debug, Clone, Copy)]
pub struct VerificationSms<'a> {
    pub receptor: &'a str,
    pub token: &'a str,
    pub template: &'a str,
}

#[derive(Debug, Error)]
pub enum SmsError {
    #[error("SMS provider is not configured")]
    NotConfigured,
    #[error("SMS provider did not answer within {0:?}")]
    Timeout(Duration),
    #[error("SMS provider request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("SMS provider rejected the message (status {status}): {message}")]
    Rejected { status: i64, message: String },
}

#[async_trait::async_trait]
pub trait SmsGateway: Send + Sync {
    async fn send(&self, sms: &VerificationSms<'_>) -> Result<(), SmsError>;
}

/// The sender chosen once at startup from `sms.mode`.
#[derive(Debug)]
pub enum SmsSender {
    /// Accepts every message without dispatching it.
    Mock,
    /// Accepts every message and logs the code. Never use in production.
    Log,
    Kavenegar(KavenegarClient),
}

impl SmsSender {
    pub fn from_config(config: &SmsConfig) -> Result<Self, SmsError> {
        match config.mode {
            SmsMode::Mock => Ok(SmsSender::Mock),
            SmsMode::Log => Ok(SmsSender::Log),
            SmsMode::Kavenegar => KavenegarClient::new(config).map(SmsSender::Kavenegar),
        }
    }
}

#[async_trait::async_trait]
impl SmsGateway for SmsSender {
    async fn send(&self, sms: &VerificationSms<'_>) -> Result<(), SmsError> {
        match self {
            SmsSender::Mock => {
                debug!(receptor = %mask_mobile(sms.receptor), "mock SMS accepted");
                Ok(())
            }
            SmsSender::Log => {
                info!(receptor = %sms.receptor, token = %sms.token, template = %sms.template, "SMS not dispatched (log mode)");
                Ok(())
            }
            SmsSender::Kavenegar(client) => client.send(sms).await,
        }
    }
}

#[derive(Debug, Deserialize)]
struct KavenegarEnvelope {
    #[serde(rename = "return")]
    result: KavenegarReturn,
}

#[derive(Debug, Deserialize)]
struct KavenegarReturn {
    status: i64,
    message: String,
}

/// Kavenegar "verify lookup" API client.
#[derive(Debug)]
pub struct KavenegarClient {
    http: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl KavenegarClient {
    pub fn new(config: &SmsConfig) -> Result<Self, SmsError> {
        let api_key = config.api_key.trim();
        if api_key.is_empty() {
            return Err(SmsError::NotConfigured);
        }

        let timeout = Duration::from_secs(config.timeout_seconds.max(1));
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(SmsError::Transport)?;

        Ok(Self {
            http,
            endpoint: format!("{}/{}/verify/lookup.json", config.base_url.trim_end_matches('/'), api_key),
            timeout,
        })
    }

    async fn send(&self, sms: &VerificationSms<'_>) -> Result<(), SmsError> {
        let params = [("receptor", sms.receptor), ("token", sms.token), ("template", sms.template)];
        let request = self.http.post(&self.endpoint).form(&params).send();

        let response = match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) if e.is_timeout() => return Err(SmsError::Timeout(self.timeout)),
            Ok(Err(e)) => return Err(SmsError::Transport(e)),
            Err(_) => return Err(SmsError::Timeout(self.timeout)),
        };

        let http_status = response.status();
        let envelope = match response.json::<KavenegarEnvelope>().await {
            Ok(envelope) => envelope,
            Err(e) if e.is_timeout() => return Err(SmsError::Timeout(self.timeout)),
            Err(e) if http_status.is_success() => return Err(SmsError::Transport(e)),
            Err(_) => {
                return Err(SmsError::Rejected {
                    status: i64::from(http_status.as_u16()),
                    message: "unexpected response body".to_string(),
                });
            }
        };

        check_return(envelope.result).inspect_err(|e| {
            warn!(receptor = %mask_mobile(sms.receptor), error = %e, "Kavenegar rejected verification SMS");
        })
    }
}

fn check_return(result: KavenegarReturn) -> Result<(), SmsError> {
    if result.status == 200 {
        Ok(())
    } else {
        Err(SmsError::Rejected {
            status: result.status,
            message: result.message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(mode: SmsMode, api_key: &str) -> SmsConfig {
        SmsConfig {
            mode,
            api_key: api_key.to_string(),
            ..SmsConfig::default()
        }
    }

    fn sms() -> VerificationSms<'static> {
        VerificationSms {
            receptor: "09123456789",
            token: "4821",
            template: "verify",
        }
    }

    #[tokio::test]
    async fn mock_and_log_modes_always_succeed() {
        for mode in [SmsMode::Mock, SmsMode::Log] {
            let sender = SmsSender::from_config(&config(mode, "")).unwrap();
            assert!(sender.send(&sms()).await.is_ok());
        }
    }

    #[test]
    fn live_mode_without_key_is_not_configured() {
        let result = SmsSender::from_config(&config(SmsMode::Kavenegar, "  "));
        assert!(matches!(result, Err(SmsError::NotConfigured)));
    }

    #[test]
    fn live_mode_builds_lookup_endpoint() {
        let mut cfg = config(SmsMode::Kavenegar, "abc123");
        cfg.base_url = "https://sms.example.test/v1/".to_string();
        match SmsSender::from_config(&cfg).unwrap() {
            SmsSender::Kavenegar(client) => {
                assert_eq!(client.endpoint, "https://sms.example.test/v1/abc123/verify/lookup.json");
                assert_eq!(client.timeout, Duration::from_secs(10));
            }
            other => panic!("unexpected sender {other:?}"),
        }
    }

    #[test]
    fn provider_return_status_decides_success() {
        let ok: KavenegarEnvelope = serde_json::from_str(r#"{"return":{"status":200,"message":"تایید شد"},"entries":[]}"#).unwrap();
        assert!(check_return(ok.result).is_ok());

        let rejected: KavenegarEnvelope = serde_json::from_str(r#"{"return":{"status":424,"message":"template not found"},"entries":null}"#).unwrap();
        assert!(matches!(check_return(rejected.result), Err(SmsError::Rejected { status: 424, .. })));
    }

    #[tokio::test]
    async fn unreachable_provider_is_a_dispatch_failure() {
        let mut cfg = config(SmsMode::Kavenegar, "abc123");
        cfg.base_url = "http://127.0.0.1:9".to_string();
        cfg.timeout_seconds = 2;
        let sender = SmsSender::from_config(&cfg).unwrap();

        let result = sender.send(&sms()).await;
        assert!(matches!(result, Err(SmsError::Transport(_)) | Err(SmsError::Timeout(_))));
    }
}
