use crate::api::AnalyticsApi;
use crate::auth::TokenProvider;
use crate::cache::CachePolicy;
use crate::config::{is_valid_profile_id, AppConfig};
use crate::error::{AnalyticsError, AnalyticsResult};
use crate::query::parse_date;
use crate::report::{ReportKind, Reporter};
use crate::session::SessionStore;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use moka::sync::Cache;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

pub const SESSION_COOKIE: &str = "gastat_session";

/// Shared state: the API client, credentials, and one `SessionStore` per browser session.
pub struct AppState<A> {
    pub api: A,
    pub tokens: TokenProvider,
    pub cache_policy: CachePolicy,
    pub default_profile: Option<String>,
    sessions: Cache<String, SessionStore>,
    session_ttl_secs: u64,
}

impl<A: AnalyticsApi + Clone> AppState<A> {
    pub fn new(api: A, config: &AppConfig) -> Self {
        Self {
            api,
            tokens: TokenProvider::new(&config.service_account),
            cache_policy: CachePolicy::from(&config.cache),
            default_profile: config.report.profile_id.clone(),
            sessions: Cache::builder()
                .time_to_idle(Duration::from_secs(config.server.session_ttl_secs))
                .max_capacity(10_000)
                .build(),
            session_ttl_secs: config.server.session_ttl_secs,
        }
    }

    /// Existing session for the request's cookie, or a fresh unregistered one
    /// (`true` when fresh). Fresh sessions are kept only via `register_session`.
    fn session_for(&self, headers: &HeaderMap) -> (String, SessionStore, bool) {
        if let Some(id) = extract_session_cookie(headers) {
            if let Some(store) = self.sessions.get(&id) {
                return (id, store, false);
            }
        }
        (generate_session_id(), SessionStore::new(), true)
    }

    fn register_session(&self, id: &str, store: SessionStore) {
        self.sessions.insert(id.to_string(), store);
        tracing::debug!("created reporting session");
    }

    fn session_count(&self) -> u64 {
        self.sessions.run_pending_tasks();
        self.sessions.entry_count()
    }

    fn session_cookie(&self, id: &str) -> String {
        format!(
            "{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            self.session_ttl_secs
        )
    }
}

/// Extract the session cookie value from the Cookie header.
fn extract_session_cookie(headers: &HeaderMap) -> Option<String> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    let prefix = format!("{SESSION_COOKIE}=");
    cookie_header.split(';').find_map(|part| {
        part.trim()
            .strip_prefix(prefix.as_str())
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string())
    })
}

/// 256-bit random session id, base64url without padding.
pub fn generate_session_id() -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use rand::RngCore;

    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Query parameters for `GET /v1/reports/{kind}`.
#[derive(Debug, Default, Deserialize)]
pub struct ReportParams {
    pub profile_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub month: Option<u32>,
    pub year: Option<i32>,
    pub cache: Option<bool>,
    pub ttl: Option<u64>,
}

impl ReportParams {
    pub fn cache_policy(&self, default: CachePolicy) -> CachePolicy {
        CachePolicy {
            enabled: self.cache.unwrap_or(default.enabled),
            ttl_secs: self.ttl.unwrap_or(default.ttl_secs),
        }
    }

    pub fn apply<A: AnalyticsApi>(
        &self,
        reporter: &mut Reporter<A>,
        default_profile: Option<&str>,
    ) -> AnalyticsResult<()> {
        if let Some(profile) = self.profile_id.as_deref().or(default_profile) {
            if !is_valid_profile_id(profile) {
                return Err(AnalyticsError::Validation(format!(
                    "profile_id must look like ga:<numeric-id>, got {profile:?}"
                )));
            }
            reporter.set_profile(profile);
        }

        match (self.month, self.year, &self.start_date, &self.end_date) {
            (Some(month), Some(year), None, None) => {
                reporter.set_month(month, year)?;
            }
            (None, None, Some(start), Some(end)) => {
                reporter.set_date_range(parse_date(start)?, parse_date(end)?);
            }
            (None, None, None, None) => {}
            _ => {
                return Err(AnalyticsError::Validation(
                    "give either month and year, or start_date and end_date".to_string(),
                ))
            }
        }
        Ok(())
    }
}

pub async fn report_handler<A>(
    State(state): State<Arc<AppState<A>>>,
    Path(kind): Path<String>,
    Query(params): Query<ReportParams>,
    headers: HeaderMap,
) -> Result<Response, AnalyticsError>
where
    A: AnalyticsApi + Clone + 'static,
{
    let kind: ReportKind = kind.parse()?;
    let (session_id, session, created) = state.session_for(&headers);

    let mut reporter = Reporter::connect(
        state.api.clone(),
        state.tokens.clone(),
        session.clone(),
        params.cache_policy(state.cache_policy),
    )
    .await?;
    params.apply(&mut reporter, state.default_profile.as_deref())?;

    let data = reporter.run(kind).await?;
    let config = reporter.query_config();
    let body = serde_json::json!({
        "report": kind,
        "profile_id": config.profile_id,
        "start_date": config.start_date,
        "end_date": config.end_date,
        "data": data,
    });

    let mut response = Json(body).into_response();
    if created {
        state.register_session(&session_id, session);
        if let Ok(value) = HeaderValue::from_str(&state.session_cookie(&session_id)) {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
    }
    Ok(response)
}

pub async fn health<A>(State(state): State<Arc<AppState<A>>>) -> Json<serde_json::Value>
where
    A: AnalyticsApi + Clone + 'static,
{
    Json(serde_json::json!({
        "status": "ok",
        "sessions": state.session_count(),
    }))
}

pub fn router<A>(state: Arc<AppState<A>>) -> Router
where
    A: AnalyticsApi + Clone + 'static,
{
    Router::new()
        .route("/health", get(health::<A>))
        .route("/v1/reports/{kind}", get(report_handler::<A>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
