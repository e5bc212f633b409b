use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::Header;
use rocket::{Data, Request, Response};
use std::time::Instant;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Per-request identifier, echoed back in `X-Request-Id`.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Fairing to log one line per HTTP request with timing
pub struct RequestLogger;

#[rocket::async_trait]
impl Fairing for RequestLogger {
    fn info(&self) -> Info {
        Info {
            name: "Request Logger",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _: &mut Data<'_>) {
        request.local_cache(Instant::now);
        request.local_cache(|| RequestId(Uuid::new_v4().to_string()));
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let start_time = request.local_cache(Instant::now);
        let duration = start_time.elapsed();
        let request_id = request.local_cache(|| RequestId(Uuid::new_v4().to_string()));

        response.set_header(Header::new(REQUEST_ID_HEADER, request_id.0.clone()));

        log::info!(
            "[{}] {} {} -> {} ({:.2}ms)",
            request_id.0,
            request.method(),
            request.uri().path(),
            response.status().code,
            duration.as_secs_f64() * 1000.0
        );
    }
}
