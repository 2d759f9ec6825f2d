use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Structured stage payload: string keys to arbitrary JSON values.
pub type StageData = Map<String, Value>;

/// Output of one agent invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: String,
    pub produced_at: DateTime<Utc>,
    pub success: bool,
    pub data: StageData,
}

impl StageResult {
    pub fn success(stage: &str, data: StageData) -> Self {
        Self {
            stage: stage.to_string(),
            produced_at: Utc::now(),
            success: true,
            data,
        }
    }

    /// Stand-in for a best-effort stage that failed.
    pub fn placeholder(stage: &str, data: StageData) -> Self {
        Self {
            stage: stage.to_string(),
            produced_at: Utc::now(),
            success: false,
            data,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StagePolicy {
    /// Failure aborts the chain and every chain after it.
    Fatal,
    /// Failure is recorded and a placeholder result is used instead.
    BestEffort,
}

impl fmt::Display for StagePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StagePolicy::Fatal => write!(f, "fatal"),
            StagePolicy::BestEffort => write!(f, "best-effort"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum StageOutcome {
    Fresh,
    Cached,
    Failed { cause: String, fatal: bool },
    Skipped,
}

impl StageOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            StageOutcome::Fresh => "fresh",
            StageOutcome::Cached => "cached",
            StageOutcome::Failed { .. } => "failed",
            StageOutcome::Skipped => "skipped",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, StageOutcome::Failed { .. })
    }

    /// Whether the stage ended with a usable (non-placeholder) result.
    pub fn produced_result(&self) -> bool {
        matches!(self, StageOutcome::Fresh | StageOutcome::Cached)
    }
}

/// One entry of a run's execution history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub chain: String,
    pub stage: String,
    pub policy: StagePolicy,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(flatten)]
    pub outcome: StageOutcome,
    pub attempts: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    InProgress,
    Succeeded,
    PartiallyFailed,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::InProgress => "in-progress",
            RunStatus::Succeeded => "succeeded",
            RunStatus::PartiallyFailed => "partially-failed",
            RunStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stage_result_survives_json_roundtrip_byte_identical() {
        let mut data = StageData::new();
        data.insert("file_count".to_string(), json!(42));
        data.insert("entry_points".to_string(), json!(["app.py"]));
        data.insert("ratio".to_string(), json!(0.1));
        let result = StageResult::success("repo_analyzer", data);

        let first = serde_json::to_string(&result).unwrap();
        let back: StageResult = serde_json::from_str(&first).unwrap();
        assert_eq!(back, result);
        assert_eq!(serde_json::to_string(&back).unwrap(), first);
    }

    #[test]
    fn test_outcome_serialization_is_flat() {
        let record = ExecutionRecord {
            chain: "analysis".to_string(),
            stage: "tech_detector".to_string(),
            policy: StagePolicy::BestEffort,
            started_at: Utc::now(),
            duration_ms: 12,
            outcome: StageOutcome::Failed {
                cause: "timeout".to_string(),
                fatal: false,
            },
            attempts: 2,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["outcome"], "failed");
        assert_eq!(value["cause"], "timeout");
        assert_eq!(value["policy"], "best-effort");
    }

    #[test]
    fn test_outcome_flags() {
        assert!(StageOutcome::Cached.produced_result());
        assert!(!StageOutcome::Skipped.produced_result());
        assert!(StageOutcome::Failed {
            cause: String::new(),
            fatal: true
        }
        .is_failure());
        assert_eq!(RunStatus::PartiallyFailed.to_string(), "partially-failed");
    }
}
