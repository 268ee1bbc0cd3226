#![allow(dead_code)]

use async_trait::async_trait;
use gastat::api::{AnalyticsApi, RawResult, ReportRequest, TokenGrant};
use gastat::auth::TokenProvider;
use gastat::cache::CachePolicy;
use gastat::config::ServiceAccountConfig;
use gastat::error::ApiError;
use gastat::{Reporter, SessionStore};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn fixture_key_path() -> PathBuf {
    PathBuf::from(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/tests/fixtures/service_account.json"
    ))
}

pub fn token_provider() -> TokenProvider {
    TokenProvider::new(&ServiceAccountConfig {
        key_path: fixture_key_path(),
        ..ServiceAccountConfig::default()
    })
}

#[derive(Default)]
struct FakeState {
    exchanges: AtomicUsize,
    queries: AtomicUsize,
    fail_exchange: AtomicBool,
    fail_query: AtomicBool,
    rows: Mutex<HashMap<String, Vec<Vec<String>>>>,
    requests: Mutex<Vec<(String, String, String)>>,
}

/// In-process reporting API. Serves canned rows per `metrics` name and counts calls.
#[derive(Clone, Default)]
pub struct FakeApi {
    state: Arc<FakeState>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(self, metrics: &str, rows: &[&[&str]]) -> Self {
        let rows = rows
            .iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect();
        self.state
            .rows
            .lock()
            .unwrap()
            .insert(metrics.to_string(), rows);
        self
    }

    pub fn exchanges(&self) -> usize {
        self.state.exchanges.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> usize {
        self.state.queries.load(Ordering::SeqCst)
    }

    pub fn set_fail_exchange(&self, fail: bool) {
        self.state.fail_exchange.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_query(&self, fail: bool) {
        self.state.fail_query.store(fail, Ordering::SeqCst);
    }

    /// (profile id, start date, end date) of every query that reached the API.
    pub fn requests(&self) -> Vec<(String, String, String)> {
        self.state.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnalyticsApi for FakeApi {
    async fn exchange_assertion(
        &self,
        _token_uri: &str,
        assertion: &str,
    ) -> Result<TokenGrant, ApiError> {
        let n = self.state.exchanges.fetch_add(1, Ordering::SeqCst) + 1;
        assert_eq!(assertion.split('.').count(), 3, "assertion should be a JWT");
        if self.state.fail_exchange.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                status: 400,
                body: r#"{"error":"invalid_grant"}"#.to_string(),
            });
        }
        Ok(TokenGrant {
            access_token: format!("fake-token-{n}"),
            expires_in: 3600,
            token_type: Some("Bearer".to_string()),
        })
    }

    async fn query(
        &self,
        access_token: &str,
        request: &ReportRequest<'_>,
    ) -> Result<RawResult, ApiError> {
        self.state.queries.fetch_add(1, Ordering::SeqCst);
        assert!(access_token.starts_with("fake-token-"));
        if self.state.fail_query.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                status: 403,
                body: "quotaExceeded".to_string(),
            });
        }
        self.state.requests.lock().unwrap().push((
            request.profile_id.to_string(),
            request.start_date.to_string(),
            request.end_date.to_string(),
        ));
        let rows = self
            .state
            .rows
            .lock()
            .unwrap()
            .get(&request.query.metrics)
            .cloned()
            .unwrap_or_default();
        Ok(RawResult {
            total_results: rows.len() as u64,
            rows,
            ..RawResult::default()
        })
    }
}

pub async fn connect(api: &FakeApi, session: SessionStore) -> Reporter<FakeApi> {
    Reporter::connect(
        api.clone(),
        token_provider(),
        session,
        CachePolicy::default(),
    )
    .await
    .unwrap()
}
