use axum::response::Response;
use serde::Serialize;

use crate::utils::response::success;

pub mod identity;
pub mod lots;
pub mod tickets;

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "parking-api",
        version: env!("CARGO_PKG_VERSION"),
    };

    success(payload, "Health check successful")
}
