use rocket::serde::json::Json;
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;
use serde::{Deserialize, Serialize};

use crate::rate_limit::{ApiScope, RateLimited};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct HealthResponse {
    pub status: String,
}

/// Liveness probe. Counts against the general API budget like any other route.
#[openapi(tag = "Health")]
#[get("/health")]
pub fn health_check(_rate: RateLimited<ApiScope>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
    })
}
