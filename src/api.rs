use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::query::DataQuery;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Access token issued in exchange for a signed assertion.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Lifetime in seconds, counted from the moment of issue.
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnHeader {
    pub name: String,
    pub column_type: String,
    #[serde(default)]
    pub data_type: Option<String>,
}

/// Tabular reporting response. Each row holds the dimension cells followed by the metric.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawResult {
    #[serde(default)]
    pub column_headers: Vec<ColumnHeader>,
    /// Omitted by the API when the query matched nothing.
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
    #[serde(default)]
    pub total_results: u64,
    #[serde(default)]
    pub totals_for_all_results: BTreeMap<String, String>,
    #[serde(default)]
    pub contains_sampled_data: bool,
}

impl RawResult {
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }
}

/// One query against one profile and date range.
#[derive(Debug, Clone, Copy)]
pub struct ReportRequest<'a> {
    pub profile_id: &'a str,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub query: &'a DataQuery,
}

impl ReportRequest<'_> {
    /// Query-string pairs in the reporting API's parameter names.
    pub fn params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("ids".to_string(), self.profile_id.to_string()),
            ("start-date".to_string(), self.start_date.to_string()),
            ("end-date".to_string(), self.end_date.to_string()),
            ("metrics".to_string(), self.query.metrics.clone()),
        ];
        if !self.query.dimensions.is_empty() {
            params.push(("dimensions".to_string(), self.query.dimensions.clone()));
        }
        if !self.query.sort.is_empty() {
            params.push(("sort".to_string(), self.query.sort.clone()));
        }
        for (k, v) in &self.query.extra {
            params.push((k.clone(), v.clone()));
        }
        params
    }
}

/// The external reporting API: assertion exchange plus the tabular query.
#[async_trait]
pub trait AnalyticsApi: Send + Sync {
    async fn exchange_assertion(
        &self,
        token_uri: &str,
        assertion: &str,
    ) -> Result<TokenGrant, ApiError>;

    async fn query(
        &self,
        access_token: &str,
        request: &ReportRequest<'_>,
    ) -> Result<RawResult, ApiError>;
}

/// reqwest-backed client for the Core Reporting API.
#[derive(Clone)]
pub struct GoogleAnalyticsClient {
    client: reqwest::Client,
    base_url: String,
}

impl GoogleAnalyticsClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, ApiError> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        return Err(ApiError::Status {
            status: status.as_u16(),
            body,
        });
    }
    serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
}

#[async_trait]
impl AnalyticsApi for GoogleAnalyticsClient {
    async fn exchange_assertion(
        &self,
        token_uri: &str,
        assertion: &str,
    ) -> Result<TokenGrant, ApiError> {
        let resp = self
            .client
            .post(token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion)])
            .send()
            .await?;
        read_json(resp).await
    }

    async fn query(
        &self,
        access_token: &str,
        request: &ReportRequest<'_>,
    ) -> Result<RawResult, ApiError> {
        let resp = self
            .client
            .get(&self.base_url)
            .bearer_auth(access_token)
            .query(&request.params())
            .send()
            .await?;
        read_json(resp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_result_without_rows() {
        let raw: RawResult = serde_json::from_str(
            r#"{"columnHeaders":[{"name":"ga:date","columnType":"DIMENSION","dataType":"STRING"}],"totalResults":0}"#,
        )
        .unwrap();
        assert!(raw.rows().is_empty());
        assert_eq!(raw.column_headers[0].name, "ga:date");
    }

    #[test]
    fn test_raw_result_rows() {
        let raw: RawResult = serde_json::from_str(
            r#"{"rows":[["20240101","5"],["20240102","7"]],"totalResults":2,"totalsForAllResults":{"ga:visits":"12"}}"#,
        )
        .unwrap();
        assert_eq!(raw.rows().len(), 2);
        assert_eq!(raw.rows()[1], vec!["20240102".to_string(), "7".to_string()]);
        assert_eq!(raw.totals_for_all_results["ga:visits"], "12");
    }

    #[test]
    fn test_request_params() {
        let mut query = DataQuery::new("ga:browser", "ga:visits", "-ga:visits");
        query.extra.insert("max-results".to_string(), "50".to_string());
        let request = ReportRequest {
            profile_id: "ga:123",
            start_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            query: &query,
        };
        let params = request.params();
        assert!(params.contains(&("ids".to_string(), "ga:123".to_string())));
        assert!(params.contains(&("start-date".to_string(), "2024-03-01".to_string())));
        assert!(params.contains(&("end-date".to_string(), "2024-03-31".to_string())));
        assert!(params.contains(&("dimensions".to_string(), "ga:browser".to_string())));
        assert!(params.contains(&("max-results".to_string(), "50".to_string())));
    }

    #[test]
    fn test_request_params_skip_empty_dimensions() {
        let query = DataQuery::new("", "ga:visits", "");
        let request = ReportRequest {
            profile_id: "ga:1",
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            query: &query,
        };
        let params = request.params();
        assert!(!params.iter().any(|(k, _)| k == "dimensions" || k == "sort"));
    }
}
