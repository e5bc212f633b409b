//! Fixed-window, per-client request limiting.
//!
//! Counters live behind [`RateLimitStore`] so a shared backend can replace the
//! in-process [`InMemoryRateLimitStore`] when several instances serve the API.
//! Every `/api` request is charged to the shared API budget by the
//! [`ApiRateLimit`] fairing, whether or not it matches a route. Routes with
//! their own budgets add a [`RateLimited`] request guard for that scope.

use std::collections::HashMap;
use std::io::Cursor;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::{ContentType, Status};
use rocket::request::{FromRequest, Outcome};
use rocket::{Data, Request, Response};
use rocket_okapi::gen::OpenApiGenerator;
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};

use crate::config::Environment;
use crate::error::{ApiError, ErrorBody, reject};

const API_PREFIX: &str = "/api";
const FIFTEEN_MINUTES: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitScope {
    Api,
    ForgotPassword,
    ResetPassword,
}

impl RateLimitScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitScope::Api => "api",
            RateLimitScope::ForgotPassword => "forgot-password",
            RateLimitScope::ResetPassword => "reset-password",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

/// Budget for one scope.
#[derive(Debug, Clone)]
pub struct RateLimitRule {
    pub max_requests: u32,
    pub window: Duration,
    /// Disable the rule when running with `APP_ENV=test`.
    pub skip_in_test: bool,
    pub message: String,
}

impl RateLimitRule {
    pub fn new(max_requests: u32, window: Duration, message: impl Into<String>) -> Self {
        Self {
            max_requests,
            window,
            skip_in_test: false,
            message: message.into(),
        }
    }

    pub fn skip_in_test(mut self) -> Self {
        self.skip_in_test = true;
        self
    }
}

/// Counter backend. `hit` records one request for `key` and returns how many
/// requests the key has made in its current window, this one included.
pub trait RateLimitStore: Send + Sync {
    fn hit(&self, key: &str, window: Duration, now: Instant) -> u32;

    /// Drops windows that ended before `now`; returns how many were removed.
    fn purge_expired(&self, now: Instant) -> usize;
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: Instant,
    length: Duration,
    count: u32,
}

impl Window {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started_at) >= self.length
    }
}

#[derive(Debug, Default)]
pub struct InMemoryRateLimitStore {
    windows: DashMap<String, Window>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

impl RateLimitStore for InMemoryRateLimitStore {
    fn hit(&self, key: &str, window: Duration, now: Instant) -> u32 {
        let mut entry = self.windows.entry(key.to_string()).or_insert(Window {
            started_at: now,
            length: window,
            count: 0,
        });

        if entry.is_expired(now) {
            *entry = Window {
                started_at: now,
                length: window,
                count: 0,
            };
        }

        entry.count = entry.count.saturating_add(1);
        entry.count
    }

    fn purge_expired(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, window| !window.is_expired(now));
        before.saturating_sub(self.windows.len())
    }
}

/// Managed Rocket state consulted by [`RateLimited`].
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    rules: HashMap<RateLimitScope, RateLimitRule>,
    environment: Environment,
}

impl RateLimiter {
    /// Limiter with the production budgets: 100 API requests, 5 reset
    /// initiations and 10 reset attempts per client every 15 minutes.
    pub fn new(store: Arc<dyn RateLimitStore>, environment: Environment) -> Self {
        let mut rules = HashMap::new();
        rules.insert(
            RateLimitScope::Api,
            RateLimitRule::new(
                100,
                FIFTEEN_MINUTES,
                "Too many requests from this IP, please try again after 15 minutes",
            ),
        );
        rules.insert(
            RateLimitScope::ForgotPassword,
            RateLimitRule::new(
                5,
                FIFTEEN_MINUTES,
                "Too many password reset requests from this IP, please try again after 15 minutes",
            )
            .skip_in_test(),
        );
        rules.insert(
            RateLimitScope::ResetPassword,
            RateLimitRule::new(
                10,
                FIFTEEN_MINUTES,
                "Too many password reset attempts from this IP, please try again after 15 minutes",
            ),
        );

        Self {
            store,
            rules,
            environment,
        }
    }

    pub fn in_memory(environment: Environment) -> Self {
        Self::new(Arc::new(InMemoryRateLimitStore::new()), environment)
    }

    pub fn with_rule(mut self, scope: RateLimitScope, rule: RateLimitRule) -> Self {
        self.rules.insert(scope, rule);
        self
    }

    pub fn store(&self) -> Arc<dyn RateLimitStore> {
        Arc::clone(&self.store)
    }

    pub fn check(&self, scope: RateLimitScope, client: &str) -> RateLimitDecision {
        self.check_at(scope, client, Instant::now())
    }

    pub fn check_at(&self, scope: RateLimitScope, client: &str, now: Instant) -> RateLimitDecision {
        let Some(rule) = self.rules.get(&scope) else {
            return RateLimitDecision::Allowed;
        };
        if rule.skip_in_test && self.environment == Environment::Test {
            return RateLimitDecision::Allowed;
        }

        let key = format!("{}:{}", scope.as_str(), client);
        if self.store.hit(&key, rule.window, now) > rule.max_requests {
            RateLimitDecision::Limited
        } else {
            RateLimitDecision::Allowed
        }
    }

    pub fn message(&self, scope: RateLimitScope) -> &str {
        self.rules
            .get(&scope)
            .map(|rule| rule.message.as_str())
            .unwrap_or("Too many requests")
    }
}

/// Type-level handle for a [`RateLimitScope`], so each guard names its budget.
pub trait ScopeMarker: Send + Sync + 'static {
    const SCOPE: RateLimitScope;
}

pub struct ApiScope;
pub struct ForgotPasswordScope;
pub struct ResetPasswordScope;

impl ScopeMarker for ApiScope {
    const SCOPE: RateLimitScope = RateLimitScope::Api;
}

impl ScopeMarker for ForgotPasswordScope {
    const SCOPE: RateLimitScope = RateLimitScope::ForgotPassword;
}

impl ScopeMarker for ResetPasswordScope {
    const SCOPE: RateLimitScope = RateLimitScope::ResetPassword;
}

/// Key identifying the caller. `client_ip` only consults a forwarding header
/// when one was configured, otherwise it is the socket peer address.
fn client_key(request: &Request<'_>) -> String {
    request
        .client_ip()
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn is_api_path(request: &Request<'_>) -> bool {
    let path = request.uri().path();
    path.as_str() == API_PREFIX || path.as_str().starts_with("/api/")
}

/// Outcome of the fairing's charge against the API budget for this request.
struct ApiCharge(Option<RateLimitDecision>);

/// Charges every `/api` request, including documentation and unmatched
/// paths, and turns responses over budget into 429s.
pub struct ApiRateLimit;

#[rocket::async_trait]
impl Fairing for ApiRateLimit {
    fn info(&self) -> Info {
        Info {
            name: "API Rate Limit",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _: &mut Data<'_>) {
        if !is_api_path(request) {
            return;
        }
        let Some(limiter) = request.rocket().state::<RateLimiter>() else {
            return;
        };
        let client = client_key(request);
        let decision = limiter.check(RateLimitScope::Api, &client);
        if decision == RateLimitDecision::Limited {
            log::warn!("rate limit 'api' exceeded for {}", client);
        }
        request.local_cache(|| ApiCharge(Some(decision)));
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let ApiCharge(Some(RateLimitDecision::Limited)) = request.local_cache(|| ApiCharge(None))
        else {
            return;
        };
        if response.status() == Status::TooManyRequests {
            return;
        }
        let Some(limiter) = request.rocket().state::<RateLimiter>() else {
            return;
        };
        let body = ErrorBody::message(limiter.message(RateLimitScope::Api));
        let Ok(json) = serde_json::to_string(&body) else {
            return;
        };
        response.set_status(Status::TooManyRequests);
        response.set_header(ContentType::JSON);
        response.set_sized_body(json.len(), Cursor::new(json));
    }
}

/// Request guard that charges one request against scope `S` for the client.
/// The API scope reuses the charge made by [`ApiRateLimit`] when it ran.
pub struct RateLimited<S: ScopeMarker>(PhantomData<S>);

#[rocket::async_trait]
impl<'r, S: ScopeMarker> FromRequest<'r> for RateLimited<S> {
    type Error = ApiError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(limiter) = request.rocket().state::<RateLimiter>() else {
            return reject(
                request,
                ApiError::InternalError("rate limiter not configured".into()),
            );
        };

        let client = client_key(request);
        let charged = match S::SCOPE {
            RateLimitScope::Api => request.local_cache(|| ApiCharge(None)).0,
            _ => None,
        };
        let decision = match charged {
            Some(decision) => decision,
            None => limiter.check(S::SCOPE, &client),
        };

        match decision {
            RateLimitDecision::Allowed => Outcome::Success(RateLimited(PhantomData)),
            RateLimitDecision::Limited => {
                log::warn!(
                    "rate limit '{}' exceeded for {}",
                    S::SCOPE.as_str(),
                    client
                );
                reject(
                    request,
                    ApiError::TooManyRequests(limiter.message(S::SCOPE).to_string()),
                )
            }
        }
    }
}

impl<'r, S: ScopeMarker> OpenApiFromRequest<'r> for RateLimited<S> {
    fn from_request_input(
        _gen: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}
