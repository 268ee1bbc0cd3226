use crate::api::{AnalyticsApi, RawResult};
use crate::auth::TokenProvider;
use crate::cache::CachePolicy;
use crate::error::{AnalyticsError, AnalyticsResult};
use crate::query::{DataQuery, QueryClient, QueryConfig};
use crate::reshape::{to_map, to_map_sorted_desc, ReportMap};
use crate::session::SessionStore;
use chrono::NaiveDate;
use serde::Serialize;
use std::str::FromStr;

/// How a report's rows are presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// `dimension -> metric` in API order.
    Map,
    /// `dimension -> metric`, highest metric first.
    Ranked,
    /// The unshaped API result.
    Raw,
}

/// The named reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportKind {
    Visitors,
    Pageviews,
    TimeOnSite,
    VisitsPerHour,
    Browsers,
    OperatingSystems,
    ScreenResolutions,
    Referrers,
    SearchWords,
}

impl ReportKind {
    pub const ALL: [ReportKind; 9] = [
        ReportKind::Visitors,
        ReportKind::Pageviews,
        ReportKind::TimeOnSite,
        ReportKind::VisitsPerHour,
        ReportKind::Browsers,
        ReportKind::OperatingSystems,
        ReportKind::ScreenResolutions,
        ReportKind::Referrers,
        ReportKind::SearchWords,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::Visitors => "visitors",
            ReportKind::Pageviews => "pageviews",
            ReportKind::TimeOnSite => "time-on-site",
            ReportKind::VisitsPerHour => "visits-per-hour",
            ReportKind::Browsers => "browsers",
            ReportKind::OperatingSystems => "operating-systems",
            ReportKind::ScreenResolutions => "screen-resolutions",
            ReportKind::Referrers => "referrers",
            ReportKind::SearchWords => "search-words",
        }
    }

    /// The (dimensions, metric, sort) triple sent to the API.
    pub fn query(&self) -> DataQuery {
        match self {
            ReportKind::Visitors => DataQuery::new("ga:date", "ga:visits", "ga:date"),
            ReportKind::Pageviews => DataQuery::new("ga:date", "ga:pageviews", "ga:date"),
            ReportKind::TimeOnSite => DataQuery::new("ga:date", "ga:timeOnSite", "ga:date"),
            ReportKind::VisitsPerHour => DataQuery::new("ga:hour", "ga:visits", "ga:hour"),
            ReportKind::Browsers => {
                DataQuery::new("ga:browser,ga:browserVersion", "ga:visits", "ga:visits")
            }
            ReportKind::OperatingSystems => {
                DataQuery::new("ga:operatingSystem", "ga:visits", "ga:visits")
            }
            ReportKind::ScreenResolutions => {
                DataQuery::new("ga:screenResolution", "ga:visits", "ga:visits")
            }
            ReportKind::Referrers => DataQuery::new("ga:source", "ga:visits", "ga:source"),
            ReportKind::SearchWords => DataQuery::new("ga:keyword", "ga:visits", "ga:keyword"),
        }
    }

    pub fn shape(&self) -> Shape {
        match self {
            ReportKind::Visitors | ReportKind::Pageviews => Shape::Map,
            ReportKind::TimeOnSite | ReportKind::VisitsPerHour => Shape::Raw,
            ReportKind::Browsers
            | ReportKind::OperatingSystems
            | ReportKind::ScreenResolutions
            | ReportKind::Referrers
            | ReportKind::SearchWords => Shape::Ranked,
        }
    }
}

impl std::fmt::Display for ReportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportKind {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReportKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| AnalyticsError::Validation(format!("unknown report: {s}")))
    }
}

/// A report as handed to presentation code.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReportOutput {
    Map(ReportMap),
    Raw(RawResult),
}

/// Reporting façade over one session: holds the profile, date range and cache
/// policy, and exposes the named reports.
pub struct Reporter<A> {
    client: QueryClient<A>,
}

impl<A: AnalyticsApi> Reporter<A> {
    /// Wire credentials to the session and authenticate. Fails without a usable token.
    pub async fn connect(
        api: A,
        tokens: TokenProvider,
        session: SessionStore,
        policy: CachePolicy,
    ) -> AnalyticsResult<Self> {
        let client = QueryClient::new(api, tokens, session, policy);
        client.ensure_token().await?;
        Ok(Self { client })
    }

    pub fn set_profile(&mut self, profile_id: impl Into<String>) -> &mut Self {
        self.client.config_mut().set_profile(profile_id);
        self
    }

    pub fn set_date_range(&mut self, start: NaiveDate, end: NaiveDate) -> &mut Self {
        self.client.config_mut().set_date_range(start, end);
        self
    }

    pub fn set_month(&mut self, month: u32, year: i32) -> AnalyticsResult<&mut Self> {
        self.client.config_mut().set_month(month, year)?;
        Ok(self)
    }

    pub fn enable_cache(&mut self, enabled: bool, ttl_secs: u64) -> &mut Self {
        self.client.set_cache_policy(CachePolicy { enabled, ttl_secs });
        self
    }

    pub fn query_config(&self) -> &QueryConfig {
        self.client.config()
    }

    /// Run an arbitrary query for the current profile and range.
    pub async fn fetch(&self, query: &DataQuery) -> AnalyticsResult<RawResult> {
        self.client.fetch(query).await
    }

    pub async fn run(&self, kind: ReportKind) -> AnalyticsResult<ReportOutput> {
        match kind.shape() {
            Shape::Map | Shape::Ranked => Ok(ReportOutput::Map(self.map_report(kind).await?)),
            Shape::Raw => Ok(ReportOutput::Raw(self.raw_report(kind).await?)),
        }
    }

    async fn map_report(&self, kind: ReportKind) -> AnalyticsResult<ReportMap> {
        let raw = self.raw_report(kind).await?;
        if kind.shape() == Shape::Ranked {
            Ok(to_map_sorted_desc(raw.rows()))
        } else {
            Ok(to_map(raw.rows()))
        }
    }

    async fn raw_report(&self, kind: ReportKind) -> AnalyticsResult<RawResult> {
        self.client.fetch(&kind.query()).await
    }

    /// Visits per date.
    pub async fn visitors(&self) -> AnalyticsResult<ReportMap> {
        self.map_report(ReportKind::Visitors).await
    }

    /// Pageviews per date.
    pub async fn pageviews(&self) -> AnalyticsResult<ReportMap> {
        self.map_report(ReportKind::Pageviews).await
    }

    pub async fn time_on_site(&self) -> AnalyticsResult<RawResult> {
        self.raw_report(ReportKind::TimeOnSite).await
    }

    pub async fn visits_per_hour(&self) -> AnalyticsResult<RawResult> {
        self.raw_report(ReportKind::VisitsPerHour).await
    }

    /// Visits per browser and version, most visits first.
    pub async fn browsers(&self) -> AnalyticsResult<ReportMap> {
        self.map_report(ReportKind::Browsers).await
    }

    pub async fn operating_systems(&self) -> AnalyticsResult<ReportMap> {
        self.map_report(ReportKind::OperatingSystems).await
    }

    pub async fn screen_resolutions(&self) -> AnalyticsResult<ReportMap> {
        self.map_report(ReportKind::ScreenResolutions).await
    }

    /// Visits per traffic source, most visits first.
    pub async fn referrers(&self) -> AnalyticsResult<ReportMap> {
        self.map_report(ReportKind::Referrers).await
    }

    pub async fn search_words(&self) -> AnalyticsResult<ReportMap> {
        self.map_report(ReportKind::SearchWords).await
    }
}
