use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WorkerError;

/// Page -> worker control messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlRequest {
    ClearCache,
    CacheStats,
}

impl FromStr for ControlRequest {
    type Err = WorkerError;

    /// Accepts the bare message (`CLEAR_CACHE`) or its JSON string form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        serde_json::from_str(trimmed)
            .or_else(|_| serde_json::from_value(serde_json::Value::String(trimmed.to_string())))
            .map_err(|_| WorkerError::UnknownMessage(trimmed.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearCacheReply {
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStatsReply {
    pub success: bool,
    pub count: usize,
    #[serde(rename = "totalSize")]
    pub total_size: u64,
    /// Megabytes with two decimals, e.g. `"1.50"`.
    #[serde(rename = "totalSizeMB")]
    pub total_size_mb: String,
}

impl CacheStatsReply {
    pub fn from_sizes(count: usize, total_size: u64) -> Self {
        Self {
            success: true,
            count,
            total_size,
            total_size_mb: format!("{:.2}", total_size as f64 / 1024.0 / 1024.0),
        }
    }

    pub fn failed() -> Self {
        Self { success: false, ..Self::from_sizes(0, 0) }
    }
}

/// Worker -> page reply on the paired port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControlResponse {
    Stats(CacheStatsReply),
    Clear(ClearCacheReply),
}

impl ControlResponse {
    pub fn success(&self) -> bool {
        match self {
            ControlResponse::Stats(s) => s.success,
            ControlResponse::Clear(c) => c.success,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_messages() {
        assert_eq!("CLEAR_CACHE".parse::<ControlRequest>().unwrap(), ControlRequest::ClearCache);
        assert_eq!("\"CACHE_STATS\"".parse::<ControlRequest>().unwrap(), ControlRequest::CacheStats);
        assert!(matches!(
            "SKIP_WAITING".parse::<ControlRequest>(),
            Err(WorkerError::UnknownMessage(_))
        ));
    }

    #[test]
    fn test_reply_shapes() {
        let stats = ControlResponse::Stats(CacheStatsReply::from_sizes(3, 1_572_864));
        assert_eq!(
            serde_json::to_value(&stats).unwrap(),
            json!({"success": true, "count": 3, "totalSize": 1572864, "totalSizeMB": "1.50"})
        );
        let clear = ControlResponse::Clear(ClearCacheReply { success: true });
        assert_eq!(serde_json::to_value(&clear).unwrap(), json!({"success": true}));

        let parsed: ControlResponse = serde_json::from_value(json!({"success": false})).unwrap();
        assert_eq!(parsed, ControlResponse::Clear(ClearCacheReply { success: false }));
        assert!(!CacheStatsReply::failed().success);
    }
}
