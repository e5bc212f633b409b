//! JSON request bodies that fail to parse are reported like any other
//! validation failure instead of Rocket's bare 400/422.

use std::io;

use rocket::data::{self, Data, FromData};
use rocket::outcome::Outcome;
use rocket::serde::json::{self, Json};
use rocket::Request;
use rocket_okapi::gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::RequestBody;
use rocket_okapi::request::OpenApiFromData;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::error::Category;

use crate::error::{ApiError, FieldError, stash};

/// Path reported when the failure cannot be pinned to a field.
const BODY_PATH: &str = "body";
const MALFORMED_MESSAGE: &str = "Malformed JSON body";

/// Data guard for JSON payloads. Parse and type errors become
/// [`ApiError::Validation`] and go through the catchers.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

impl<T> JsonBody<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> std::ops::Deref for JsonBody<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

#[rocket::async_trait]
impl<'r, T: Deserialize<'r>> FromData<'r> for JsonBody<T> {
    type Error = ApiError;

    async fn from_data(request: &'r Request<'_>, data: Data<'r>) -> data::Outcome<'r, Self> {
        match <Json<T> as FromData<'r>>::from_data(request, data).await {
            Outcome::Success(Json(value)) => Outcome::Success(JsonBody(value)),
            Outcome::Forward(forward) => Outcome::Forward(forward),
            Outcome::Error((_, err)) => {
                let error = body_error(&err);
                let status = stash(request, &error);
                Outcome::Error((status, error))
            }
        }
    }
}

impl<'r, T: JsonSchema + Deserialize<'r>> OpenApiFromData<'r> for JsonBody<T> {
    fn request_body(gen: &mut OpenApiGenerator) -> rocket_okapi::Result<RequestBody> {
        <Json<T> as OpenApiFromData<'r>>::request_body(gen)
    }
}

fn body_error(err: &json::Error<'_>) -> ApiError {
    match err {
        json::Error::Io(io_err) if io_err.kind() == io::ErrorKind::UnexpectedEof => {
            ApiError::PayloadTooLarge("Request body is too large".to_string())
        }
        json::Error::Io(io_err) => {
            ApiError::BadRequest(format!("Request body could not be read: {io_err}"))
        }
        json::Error::Parse(raw, parse_err) => {
            let error = match parse_err.classify() {
                Category::Data => {
                    let detail = parse_err.to_string();
                    let msg = without_position(&detail);
                    let path = named_field(msg)
                        .or_else(|| field_at(raw, parse_err.line(), parse_err.column()))
                        .unwrap_or_else(|| BODY_PATH.to_string());
                    FieldError::new(path, msg)
                }
                _ => FieldError::new(BODY_PATH, MALFORMED_MESSAGE),
            };
            ApiError::Validation(vec![error])
        }
    }
}

/// serde_json appends " at line L column C" to its messages.
fn without_position(detail: &str) -> &str {
    detail
        .rsplit_once(" at line ")
        .map_or(detail, |(msg, _)| msg)
}

/// Field named by "missing field `x`" or "unknown field `x`" messages.
fn named_field(msg: &str) -> Option<String> {
    let rest = msg
        .strip_prefix("missing field `")
        .or_else(|| msg.strip_prefix("unknown field `"))?;
    let (name, _) = rest.split_once('`')?;
    Some(name.to_string())
}

/// Name of the object key whose value ends at `line`:`column` (1-based, as
/// serde_json reports). Only top-level keys of flat objects are recognised.
fn field_at(raw: &str, line: usize, column: usize) -> Option<String> {
    let offset = raw
        .split_inclusive('\n')
        .take(line.saturating_sub(1))
        .map(str::len)
        .sum::<usize>()
        + column;
    let prefix = raw.get(..offset.min(raw.len()))?;

    let colon = prefix.rfind(':')?;
    let key = prefix[..colon].trim_end().strip_suffix('"')?;
    let start = key.rfind('"')?;
    let name = &key[start + 1..];
    (!name.is_empty()).then(|| name.to_string())
}
