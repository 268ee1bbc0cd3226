//! Row-to-map transforms for tabular reporting results.
//!
//! A row is the dimension cells followed by one metric cell. Multi-dimension
//! rows are keyed by their dimension cells joined with a single space.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;

/// A parsed metric cell.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Integer(i64),
    Decimal(f64),
    Text(String),
}

impl MetricValue {
    pub fn parse(cell: &str) -> Self {
        if let Ok(n) = cell.parse::<i64>() {
            MetricValue::Integer(n)
        } else if let Some(f) = cell.parse::<f64>().ok().filter(|f| f.is_finite()) {
            MetricValue::Decimal(f)
        } else {
            MetricValue::Text(cell.to_string())
        }
    }

    /// Numeric view used for ranking. Text sorts as zero.
    pub fn as_f64(&self) -> f64 {
        match self {
            MetricValue::Integer(n) => *n as f64,
            MetricValue::Decimal(f) => *f,
            MetricValue::Text(_) => 0.0,
        }
    }
}

impl From<i64> for MetricValue {
    fn from(n: i64) -> Self {
        MetricValue::Integer(n)
    }
}

impl From<f64> for MetricValue {
    fn from(f: f64) -> Self {
        MetricValue::Decimal(f)
    }
}

impl std::fmt::Display for MetricValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricValue::Integer(n) => write!(f, "{n}"),
            MetricValue::Decimal(x) => write!(f, "{x}"),
            MetricValue::Text(s) => f.write_str(s),
        }
    }
}

/// Insertion-ordered dimension -> metric mapping. Serializes as a JSON object
/// in entry order.
#[derive(Debug, Clone, Default)]
pub struct ReportMap {
    entries: Vec<(String, MetricValue)>,
    /// key -> position in `entries`
    index: HashMap<String, usize>,
}

impl PartialEq for ReportMap {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl ReportMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite. An existing key keeps its position and takes the new value.
    pub fn insert(&mut self, key: String, value: MetricValue) {
        if let Some(&pos) = self.index.get(&key) {
            self.entries[pos].1 = value;
        } else {
            self.index.insert(key.clone(), self.entries.len());
            self.entries.push((key, value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&MetricValue> {
        self.index.get(key).map(|&pos| &self.entries[pos].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetricValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Reorder by descending metric. Stable: equal values keep insertion order.
    pub fn sort_desc(&mut self) {
        self.entries
            .sort_by(|(_, a), (_, b)| b.as_f64().total_cmp(&a.as_f64()));
        for (pos, (key, _)) in self.entries.iter().enumerate() {
            if let Some(slot) = self.index.get_mut(key) {
                *slot = pos;
            }
        }
    }
}

impl Serialize for ReportMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<K: Into<String>, V: Into<MetricValue>> FromIterator<(K, V)> for ReportMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = ReportMap::new();
        for (k, v) in iter {
            map.insert(k.into(), v.into());
        }
        map
    }
}

/// Split a row into (dimension key, metric). Rows with fewer than two cells are skipped.
fn split_row<R: AsRef<str>>(row: &[R]) -> Option<(String, MetricValue)> {
    let (metric, dims) = row.split_last()?;
    if dims.is_empty() {
        return None;
    }
    let key = dims
        .iter()
        .map(|c| c.as_ref())
        .collect::<Vec<_>>()
        .join(" ");
    Some((key, MetricValue::parse(metric.as_ref())))
}

/// Map rows to `dimension -> metric` in row order; repeated keys take the later value.
pub fn to_map<R: AsRef<str>>(rows: &[Vec<R>]) -> ReportMap {
    let mut map = ReportMap::new();
    for row in rows {
        match split_row(row) {
            Some((key, value)) => map.insert(key, value),
            None => tracing::debug!(cells = row.len(), "skipping row without a metric"),
        }
    }
    map
}

/// Same as [`to_map`], then ordered by descending metric.
pub fn to_map_sorted_desc<R: AsRef<str>>(rows: &[Vec<R>]) -> ReportMap {
    let mut map = to_map(rows);
    map.sort_desc();
    map
}
