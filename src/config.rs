use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Flat environment names accepted for compatibility with existing deployments.
const LEGACY_ENV_KEYS: &[(&str, &str)] = &[
    ("OTP_TTL_SECONDS", "otp.ttl_seconds"),
    ("OTP_MAX_ATTEMPTS", "otp.max_attempts"),
    ("SEND_LIMIT_PER_PHONE", "rate_limit.send_limit_per_phone"),
    ("SEND_WINDOW_SECONDS", "rate_limit.send_window_seconds"),
    ("SEND_LIMIT_PER_IP", "rate_limit.send_limit_per_ip"),
    ("SEND_IP_WINDOW_SECONDS", "rate_limit.send_ip_window_seconds"),
    ("VERIFY_LIMIT_PER_IP", "rate_limit.verify_limit_per_ip"),
    ("VERIFY_IP_WINDOW_SECONDS", "rate_limit.verify_ip_window_seconds"),
    ("REDIS_URL", "store.url"),
    ("TRUSTED_IP_HEADER", "server.ip_header"),
    ("SMS_MODE", "sms.mode"),
    ("KAVENEGAR_API_KEY", "sms.api_key"),
    ("KAVENEGAR_TEMPLATE", "sms.template"),
];

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub api: ApiConfig,
    pub cors: CorsConfig,
    pub store: StoreConfig,
    pub otp: OtpConfig,
    pub rate_limit: RateLimitConfig,
    pub sms: SmsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub address: String,
    /// Header carrying the client address set by a trusted reverse proxy, e.g. `X-Real-IP`.
    /// Unset means only the socket address identifies a client.
    #[serde(default)]
    pub ip_header: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub json_format: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ApiConfig {
    pub enable_swagger: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    Memory,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub url: String,
    /// How often the in-memory backend drops expired keys.
    pub sweep_interval_seconds: u64,
    /// Upper bound on a single Redis connection attempt.
    pub connect_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OtpConfig {
    /// Lifetime of an issued code. Returned to clients by the send endpoint.
    pub ttl_seconds: u64,
    pub max_attempts: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RateLimitConfig {
    pub send_limit_per_phone: u64,
    pub send_window_seconds: u64,
    pub send_limit_per_ip: u64,
    pub send_ip_window_seconds: u64,
    pub verify_limit_per_ip: u64,
    pub verify_ip_window_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SmsMode {
    Mock,
    Log,
    Kavenegar,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SmsConfig {
    pub mode: SmsMode,
    pub api_key: String,
    pub template: String,
    pub base_url: String,
    pub timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            address: "127.0.0.1".to_string(),
            ip_header: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allow_credentials: false,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Redis,
            url: "redis://127.0.0.1:6379".to_string(),
            sweep_interval_seconds: 60,
            connect_timeout_seconds: 2,
        }
    }
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 300,
            max_attempts: 5,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            send_limit_per_phone: 3,
            send_window_seconds: 600,
            send_limit_per_ip: 10,
            send_ip_window_seconds: 600,
            verify_limit_per_ip: 30,
            verify_ip_window_seconds: 600,
        }
    }
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            mode: SmsMode::Log,
            api_key: String::new(),
            template: "verify".to_string(),
            base_url: "https://api.kavenegar.com/v1".to_string(),
            timeout_seconds: 10,
        }
    }
}

fn legacy_env_path(key: &str) -> &'static str {
    LEGACY_ENV_KEYS
        .iter()
        .find(|(env, _)| env.eq_ignore_ascii_case(key))
        .map(|(_, path)| *path)
        .unwrap_or("legacy")
}

impl Config {
    /// Load configuration from multiple sources in priority order:
    /// 1. Built-in defaults
    /// 2. Otp.toml (base configuration file)
    /// 3. Environment variables prefixed with OTPGW_ (e.g. OTPGW_SMS__MODE)
    /// 4. Flat legacy names such as OTP_TTL_SECONDS or REDIS_URL
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    pub fn figment() -> Figment {
        let legacy_keys: Vec<&str> = LEGACY_ENV_KEYS.iter().map(|(env, _)| *env).collect();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file("Otp.toml").nested())
            .merge(Env::prefixed("OTPGW_").split("__"))
            .merge(Env::raw().only(&legacy_keys).map(|key| legacy_env_path(key.as_str()).into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.otp.ttl_seconds, 300);
        assert_eq!(config.otp.max_attempts, 5);
        assert_eq!(config.rate_limit.send_limit_per_phone, 3);
        assert_eq!(config.rate_limit.send_window_seconds, 600);
        assert_eq!(config.rate_limit.send_limit_per_ip, 10);
        assert_eq!(config.rate_limit.send_ip_window_seconds, 600);
        assert_eq!(config.rate_limit.verify_limit_per_ip, 30);
        assert_eq!(config.rate_limit.verify_ip_window_seconds, 600);
        assert_eq!(config.sms.timeout_seconds, 10);
        assert_eq!(config.server.ip_header, None);
    }

    #[test]
    fn forwarded_ip_header_is_opt_in() {
        Jail::expect_with(|jail| {
            let config = Config::load()?;
            assert_eq!(config.server.ip_header, None);

            jail.set_env("OTPGW_SERVER__IP_HEADER", "X-Forwarded-For");
            let config = Config::load()?;
            assert_eq!(config.server.ip_header.as_deref(), Some("X-Forwarded-For"));
            Ok(())
        });
    }

    #[test]
    fn legacy_env_names_override_defaults() {
        Jail::expect_with(|jail| {
            jail.set_env("OTP_TTL_SECONDS", "180");
            jail.set_env("SEND_LIMIT_PER_PHONE", "5");
            jail.set_env("SMS_MODE", "mock");
            jail.set_env("REDIS_URL", "redis://cache:6379/2");

            let config = Config::load()?;
            assert_eq!(config.otp.ttl_seconds, 180);
            assert_eq!(config.rate_limit.send_limit_per_phone, 5);
            assert_eq!(config.sms.mode, SmsMode::Mock);
            assert_eq!(config.store.url, "redis://cache:6379/2");
            Ok(())
        });
    }

    #[test]
    fn prefixed_env_and_toml_file_are_layered() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "Otp.toml",
                r#"
                [default.otp]
                max_attempts = 3

                [default.store]
                backend = "memory"
                "#,
            )?;
            jail.set_env("OTPGW_RATE_LIMIT__VERIFY_LIMIT_PER_IP", "7");

            let config = Config::load()?;
            assert_eq!(config.otp.max_attempts, 3);
            assert_eq!(config.store.backend, StoreBackend::Memory);
            assert_eq!(config.rate_limit.verify_limit_per_ip, 7);
            assert_eq!(config.otp.ttl_seconds, 300);
            Ok(())
        });
    }
}
