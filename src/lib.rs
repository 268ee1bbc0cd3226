pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod query;
pub mod report;
pub mod reshape;
pub mod server;
pub mod session;

pub use api::{AnalyticsApi, GoogleAnalyticsClient, RawResult};
pub use auth::TokenProvider;
pub use cache::CachePolicy;
pub use error::{AnalyticsError, AnalyticsResult};
pub use report::{ReportKind, ReportOutput, Reporter};
pub use reshape::{MetricValue, ReportMap};
pub use session::SessionStore;
