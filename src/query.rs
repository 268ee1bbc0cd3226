use crate::api::{AnalyticsApi, RawResult, ReportRequest};
use crate::auth::TokenProvider;
use crate::cache::{CacheLookup, CachePolicy, ReportCache};
use crate::error::{AnalyticsError, AnalyticsResult};
use crate::session::SessionStore;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Dimensions, metrics and sort of one reporting query, plus any extra API parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataQuery {
    pub dimensions: String,
    pub metrics: String,
    pub sort: String,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl DataQuery {
    pub fn new(
        dimensions: impl Into<String>,
        metrics: impl Into<String>,
        sort: impl Into<String>,
    ) -> Self {
        Self {
            dimensions: dimensions.into(),
            metrics: metrics.into(),
            sort: sort.into(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }

    /// Stable text form of the query, used to tell cache entries apart.
    pub fn signature(&self) -> String {
        let mut sig = format!("{}|{}|{}", self.dimensions, self.metrics, self.sort);
        for (k, v) in &self.extra {
            sig.push('|');
            sig.push_str(k);
            sig.push('=');
            sig.push_str(v);
        }
        sig
    }
}

/// First and last day of a calendar month.
pub fn month_bounds(month: u32, year: i32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next_month = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((first, next_month.pred_opt()?))
}

/// Parse an ISO `YYYY-MM-DD` date.
pub fn parse_date(raw: &str) -> AnalyticsResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| AnalyticsError::Validation(format!("invalid date {raw:?}: {e}")))
}

/// Profile and date range every query runs against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryConfig {
    pub profile_id: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl QueryConfig {
    pub fn set_profile(&mut self, profile_id: impl Into<String>) {
        self.profile_id = Some(profile_id.into());
    }

    pub fn set_date_range(&mut self, start: NaiveDate, end: NaiveDate) {
        self.start_date = Some(start);
        self.end_date = Some(end);
    }

    pub fn set_month(&mut self, month: u32, year: i32) -> AnalyticsResult<()> {
        let (start, end) = month_bounds(month, year).ok_or_else(|| {
            AnalyticsError::Configuration(format!("invalid month {month} of year {year}"))
        })?;
        self.set_date_range(start, end);
        Ok(())
    }

    /// Profile id and both range endpoints, or a configuration error naming what is missing.
    pub fn resolve(&self) -> AnalyticsResult<(&str, NaiveDate, NaiveDate)> {
        let profile_id = self
            .profile_id
            .as_deref()
            .ok_or_else(|| AnalyticsError::Configuration("profile id not set".to_string()))?;
        let (Some(start), Some(end)) = (self.start_date, self.end_date) else {
            return Err(AnalyticsError::Configuration(
                "date range not set".to_string(),
            ));
        };
        Ok((profile_id, start, end))
    }

    /// `profile_id ⧺ start_date ⧺ end_date`, the base of every cache key.
    pub fn range_key(&self) -> AnalyticsResult<String> {
        let (profile_id, start, end) = self.resolve()?;
        Ok(format!("{profile_id}{start}{end}"))
    }
}

/// Runs queries for the configured profile and range, reading through the report cache.
pub struct QueryClient<A> {
    api: A,
    tokens: TokenProvider,
    cache: ReportCache,
    config: QueryConfig,
}

impl<A: AnalyticsApi> QueryClient<A> {
    pub fn new(api: A, tokens: TokenProvider, session: SessionStore, policy: CachePolicy) -> Self {
        Self {
            api,
            tokens,
            cache: ReportCache::new(session, policy),
            config: QueryConfig::default(),
        }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut QueryConfig {
        &mut self.config
    }

    pub fn set_cache_policy(&mut self, policy: CachePolicy) {
        self.cache.set_policy(policy);
    }

    pub async fn ensure_token(&self) -> AnalyticsResult<String> {
        self.tokens
            .ensure_valid_token(&self.api, self.cache.session())
            .await
    }

    /// Cache key for `query` against the current profile and range.
    pub fn cache_key(&self, query: &DataQuery) -> AnalyticsResult<String> {
        Ok(format!("{}:{}", self.config.range_key()?, query.signature()))
    }

    pub async fn fetch(&self, query: &DataQuery) -> AnalyticsResult<RawResult> {
        let key = self.cache_key(query)?;
        self.fetch_with_key(query, &key).await
    }

    /// Fetch under a caller-chosen cache key (still namespaced by profile id).
    pub async fn fetch_with_key(&self, query: &DataQuery, key: &str) -> AnalyticsResult<RawResult> {
        let (profile_id, start_date, end_date) = self.config.resolve()?;

        if let CacheLookup::Hit(raw) = self.cache.lookup::<RawResult>(profile_id, key) {
            tracing::debug!(profile_id = profile_id, key = key, "report cache hit");
            return Ok(raw);
        }
        tracing::debug!(profile_id = profile_id, key = key, "report cache miss");

        let token = self.ensure_token().await?;
        let request = ReportRequest {
            profile_id,
            start_date,
            end_date,
            query,
        };
        let raw = self
            .api
            .query(&token, &request)
            .await
            .map_err(|e| AnalyticsError::Query(e.to_string()))?;

        tracing::debug!(
            profile_id = profile_id,
            metrics = %query.metrics,
            rows = raw.rows().len(),
            "report fetched"
        );
        self.cache.store(profile_id, key, &raw);
        Ok(raw)
    }
}
