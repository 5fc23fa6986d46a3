use crate::models::health::ReadinessResponse;
use crate::store::TtlStore;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{State, get, routes};
use std::sync::Arc;
use tracing::warn;

#[get("/health")]
pub async fn healthcheck() -> &'static str {
    "ok"
}

/// Ready once the store answers a ping.
#[get("/ready")]
pub async fn readiness(store: &State<Arc<dyn TtlStore>>) -> (Status, Json<ReadinessResponse>) {
    match store.ping().await {
        Ok(()) => (Status::Ok, Json(ReadinessResponse { ok: true })),
        Err(e) => {
            warn!(error = ?e, "store is not reachable");
            (Status::ServiceUnavailable, Json(ReadinessResponse { ok: false }))
        }
    }
}

pub fn routes() -> Vec<rocket::Route> {
    routes![healthcheck, readiness]
}
