//! HTTP route handlers outside the auth module.
//!
//! Handlers are annotated with `#[openapi]` so `rocket_okapi` can derive an
//! OpenAPI document automatically.

pub mod admin;
pub mod health;
