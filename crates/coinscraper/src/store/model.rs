//! Job and task records.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Structured result payload of a task.
pub type Output = Map<String, Value>;

/// Key under which a failure-marked output stores its reason.
pub const FAILURE_KEY: &str = "error";

/// A batch of requested items sharing one identifier.
///
/// Jobs carry no status. Progress is derived from the tasks persisted for
/// them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Creates a job with a fresh v4 id.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
        }
    }
}

impl Default for Job {
    fn default() -> Self {
        Self::new()
    }
}

/// A task about to be persisted, after its unit finished executing.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub job_id: Uuid,
    pub item: String,
    pub output: Output,
}

impl NewTask {
    pub fn success(job_id: Uuid, item: impl Into<String>, output: Output) -> Self {
        Self {
            job_id,
            item: item.into(),
            output,
        }
    }

    /// A task whose output records why the item could not be scraped.
    pub fn failure(job_id: Uuid, item: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            job_id,
            item: item.into(),
            output: failure_marker(reason),
        }
    }
}

/// Durable record of one executed unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub job_id: Uuid,
    pub item: String,
    #[serde(default)]
    pub output: Output,
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Returns true if the output is a failure marker.
    pub fn is_failure(&self) -> bool {
        is_failure_marker(&self.output)
    }

    /// The recorded failure reason, if any.
    pub fn failure_reason(&self) -> Option<&str> {
        self.output.get(FAILURE_KEY).and_then(Value::as_str)
    }
}

/// Builds the output stored for a failed item: `{"error": reason}`.
pub fn failure_marker(reason: impl Into<String>) -> Output {
    let mut output = Output::new();
    output.insert(FAILURE_KEY.to_string(), Value::String(reason.into()));
    output
}

pub fn is_failure_marker(output: &Output) -> bool {
    output.contains_key(FAILURE_KEY)
}

/// Canonical timestamp form used in storage.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}
