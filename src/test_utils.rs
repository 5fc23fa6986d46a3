use crate::clock::Clock;
use crate::config::{OtpConfig, RateLimitConfig};
use crate::service::otp::OtpService;
use crate::service::sms::{SmsError, SmsGateway, VerificationSms};
use crate::store::TtlStore;
use crate::store::memory::MemoryStore;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(now_ms),
        }
    }

    pub fn advance_secs(&self, seconds: i64) {
        self.now_ms.fetch_add(seconds * 1000, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy)]
enum SmsBehavior {
    Deliver,
    Fail,
    Unconfigured,
}

/// SMS gateway that records every message and answers as scripted.
#[derive(Debug)]
pub struct ScriptedSms {
    behavior: SmsBehavior,
    sent: Mutex<Vec<(String, String)>>,
}

impl ScriptedSms {
    fn with_behavior(behavior: SmsBehavior) -> Self {
        Self {
            behavior,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn delivering() -> Self {
        Self::with_behavior(SmsBehavior::Deliver)
    }

    pub fn failing() -> Self {
        Self::with_behavior(SmsBehavior::Fail)
    }

    pub fn unconfigured() -> Self {
        Self::with_behavior(SmsBehavior::Unconfigured)
    }

    pub fn last_token(&self) -> Option<String> {
        self.sent.lock().unwrap().last().map(|(_, token)| token.clone())
    }

    pub fn last_receptor(&self) -> Option<String> {
        self.sent.lock().unwrap().last().map(|(receptor, _)| receptor.clone())
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl SmsGateway for ScriptedSms {
    async fn send(&self, sms: &VerificationSms<'_>) -> Result<(), SmsError> {
        self.sent.lock().unwrap().push((sms.receptor.to_string(), sms.token.to_string()));
        match self.behavior {
            SmsBehavior::Deliver => Ok(()),
            SmsBehavior::Fail => Err(SmsError::Timeout(Duration::from_secs(10))),
            SmsBehavior::Unconfigured => Err(SmsError::NotConfigured),
        }
    }
}

/// An `OtpService` over an in-memory store, a manual clock and a scripted SMS gateway.
pub struct Fixture {
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryStore>,
    pub sms: Arc<ScriptedSms>,
    pub service: OtpService,
}

impl Fixture {
    pub fn new() -> Self {
        Self::build(OtpConfig::default(), RateLimitConfig::default(), ScriptedSms::delivering())
    }

    pub fn with_config(otp: OtpConfig, limits: RateLimitConfig) -> Self {
        Self::build(otp, limits, ScriptedSms::delivering())
    }

    pub fn with_sms(sms: ScriptedSms) -> Self {
        Self::build(OtpConfig::default(), RateLimitConfig::default(), sms)
    }

    fn build(otp: OtpConfig, limits: RateLimitConfig, sms: ScriptedSms) -> Self {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let sms = Arc::new(sms);
        let service = OtpService::new(store.clone(), sms.clone(), clock.clone(), otp, limits, "verify");

        Self { clock, store, sms, service }
    }

    pub async fn stored(&self, key: &str) -> Option<String> {
        self.store.get(key).await.unwrap()
    }
}
