mod clock;
mod config;
mod error;
mod middleware;
mod models;
mod routes;
mod service;
mod store;
mod validation;

#[cfg(test)]
pub mod test_utils;

pub use config::Config;

use crate::clock::{Clock, SystemClock};
use crate::middleware::RequestLogger;
use crate::routes as app_routes;
use crate::service::otp::OtpService;
use crate::service::sms::{SmsGateway, SmsSender};
use rocket::fairing::AdHoc;
use rocket::{Build, Rocket, catchers, http::Method};
use rocket_cors::{AllowedOrigins, Cors, CorsOptions};
use rocket_okapi::swagger_ui::{SwaggerUIConfig, make_swagger_ui};
use rocket_okapi::{get_openapi_route, okapi::merge::marge_spec_list};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const API_BASE_PATH: &str = "/api";

fn init_tracing(log_level: &str, json_format: bool) {
    // RUST_LOG overrides the configured level, e.g. RUST_LOG=info,otp_gateway::service=debug
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_line_number(true);

    // A global subscriber may already be installed when several rockets share a process (tests).
    let _ = if json_format { subscriber.json().try_init() } else { subscriber.try_init() };
}

fn build_cors(cors_config: &config::CorsConfig) -> Result<Cors, String> {
    let is_wildcard = cors_config.allowed_origins.len() == 1 && cors_config.allowed_origins[0] == "*";

    if is_wildcard && cors_config.allow_credentials {
        return Err("wildcard origins (*) cannot be combined with credentials".to_string());
    }

    let allowed_origins = if cors_config.allowed_origins.is_empty() {
        AllowedOrigins::some_exact::<&str>(&[])
    } else if is_wildcard {
        AllowedOrigins::all()
    } else {
        AllowedOrigins::some_exact(&cors_config.allowed_origins.iter().map(String::as_str).collect::<Vec<_>>())
    };

    CorsOptions {
        allowed_origins,
        allowed_methods: vec![Method::Get, Method::Post, Method::Options, Method::Head]
            .into_iter()
            .map(From::from)
            .collect(),
        allowed_headers: rocket_cors::AllowedHeaders::some(&["Content-Type", "Accept"]),
        allow_credentials: cors_config.allow_credentials,
        ..Default::default()
    }
    .to_cors()
    .map_err(|e| e.to_string())
}

fn join_base_path(base_path: &str, path: &str) -> String {
    format!("{}/{}", base_path.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn mount_api_routes(mut rocket: Rocket<Build>, enable_swagger: bool) -> Rocket<Build> {
    let (otp_routes, otp_openapi) = app_routes::otp::routes();
    let otp_path = join_base_path(API_BASE_PATH, "otp");
    rocket = rocket.mount(otp_path, otp_routes);

    if !enable_swagger {
        return rocket;
    }

    let openapi_docs = match marge_spec_list(&[("/otp", otp_openapi)]) {
        Ok(docs) => docs,
        Err(err) => {
            error!(error = %err, "could not merge OpenAPI documents, docs are not mounted");
            return rocket;
        }
    };

    let settings = rocket_okapi::settings::OpenApiSettings::default();
    rocket = rocket.mount(API_BASE_PATH, vec![get_openapi_route(openapi_docs, &settings)]);

    let swagger = SwaggerUIConfig {
        url: join_base_path(API_BASE_PATH, "openapi.json"),
        ..Default::default()
    };
    rocket.mount(join_base_path(API_BASE_PATH, "docs"), make_swagger_ui(&swagger))
}

/// Opens the store and SMS provider and puts the OTP service in managed state.
/// Ignition fails when either cannot be set up.
fn stage_otp(config: Config) -> AdHoc {
    AdHoc::try_on_ignite("OTP Service", move |rocket| {
        Box::pin(async move {
            let clock: Arc<dyn Clock> = Arc::new(SystemClock);

            let store = match store::connect(&config.store, clock.clone()).await {
                Ok(store) => store,
                Err(e) => {
                    error!(error = ?e, backend = ?config.store.backend, "failed to open the store");
                    return Err(rocket);
                }
            };

            let sms: Arc<dyn SmsGateway> = match SmsSender::from_config(&config.sms) {
                Ok(sender) => Arc::new(sender),
                Err(e) => {
                    error!(error = %e, mode = ?config.sms.mode, "failed to set up the SMS provider");
                    return Err(rocket);
                }
            };

            info!(
                backend = ?config.store.backend,
                sms_mode = ?config.sms.mode,
                ttl_seconds = config.otp.ttl_seconds,
                "OTP service ready"
            );

            let service = OtpService::new(store.clone(), sms, clock, config.otp, config.rate_limit, config.sms.template);

            Ok(rocket.manage(store).manage(service))
        })
    })
}

pub fn build_rocket(config: Config) -> Rocket<Build> {
    init_tracing(&config.logging.level, config.logging.json_format);

    let figment = rocket::Config::figment()
        .merge(("port", config.server.port))
        .merge(("address", config.server.address.clone()));

    // Rocket trusts X-Real-IP unless told otherwise; only a configured proxy header may
    // stand in for the socket address.
    let figment = match config.server.ip_header.as_deref().map(str::trim).filter(|h| !h.is_empty()) {
        Some(header) => figment.merge(("ip_header", header.to_string())),
        None => figment.merge(("ip_header", false)),
    };

    let mut rocket = rocket::custom(figment);

    rocket = match build_cors(&config.cors) {
        Ok(cors) => rocket.attach(cors),
        Err(message) => rocket.attach(AdHoc::try_on_ignite("CORS", move |rocket| {
            Box::pin(async move {
                error!(%message, "invalid CORS configuration");
                Err(rocket)
            })
        })),
    };

    let enable_swagger = config.api.enable_swagger;

    rocket = rocket.attach(RequestLogger).attach(stage_otp(config));
    rocket = rocket.mount("/", app_routes::health::routes());
    rocket = mount_api_routes(rocket, enable_swagger);

    rocket.register(
        "/",
        catchers![
            app_routes::error::bad_request,
            app_routes::error::not_found,
            app_routes::error::payload_too_large,
            app_routes::error::too_many_requests,
            app_routes::error::internal_error
        ],
    )
}
