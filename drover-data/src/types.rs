use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Execution status of a task on one back-end worker.
///
/// `Finished` is terminal and is only ever reported back by a worker;
/// dispatch itself never produces it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentStatus {
    #[default]
    NotStarted,
    Executing,
    Finished,
    Error,
    Unknown,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::NotStarted => "NOT_STARTED",
            AssignmentStatus::Executing => "EXECUTING",
            AssignmentStatus::Finished => "FINISHED",
            AssignmentStatus::Error => "ERROR",
            AssignmentStatus::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AssignmentStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "NOT_STARTED" => Ok(AssignmentStatus::NotStarted),
            "EXECUTING" => Ok(AssignmentStatus::Executing),
            "FINISHED" => Ok(AssignmentStatus::Finished),
            "ERROR" => Ok(AssignmentStatus::Error),
            "UNKNOWN" => Ok(AssignmentStatus::Unknown),
            _ => Err(StoreError::InvalidStatus(s.to_string())),
        }
    }
}

impl rusqlite::types::ToSql for AssignmentStatus {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl rusqlite::types::FromSql for AssignmentStatus {
    fn column_result(value: rusqlite::types::ValueRef<'_>) -> rusqlite::types::FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| rusqlite::types::FromSqlError::Other(Box::new(e)))
    }
}

/// Who may see a task beyond its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "PUBLIC",
            Visibility::Private => "PRIVATE",
        }
    }
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Visibility {
    type Err = StoreError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "PUBLIC" => Ok(Visibility::Public),
            "PRIVATE" => Ok(Visibility::Private),
            _ => Err(StoreError::InvalidVisibility(s.to_string())),
        }
    }
}

impl rusqlite::types::ToSql for Visibility {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl rusqlite::types::FromSql for Visibility {
    fn column_result(value: rusqlite::types::ValueRef<'_>) -> rusqlite::types::FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| rusqlite::types::FromSqlError::Other(Box::new(e)))
    }
}

/// One task-to-worker pairing with its tracked execution status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskBackend {
    pub backend_id: String,
    #[serde(default)]
    pub status: AssignmentStatus,
    #[serde(default)]
    pub message: String,
}

impl TaskBackend {
    /// A fresh pairing that no dispatch has touched yet.
    pub fn new(backend_id: impl Into<String>) -> Self {
        TaskBackend {
            backend_id: backend_id.into(),
            status: AssignmentStatus::NotStarted,
            message: String::new(),
        }
    }
}

/// A user-submitted unit of work.
///
/// `ids` is empty on creation and holds exactly one id everywhere else.
/// `extension` carries the domain payload that the task's specialization
/// knows how to persist; the core store treats it as opaque.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    #[serde(default)]
    pub ids: Vec<String>,
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub visibility: Visibility,
    #[serde(default)]
    pub state: i64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub backends: Vec<TaskBackend>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub extension: serde_json::Value,
}

impl Task {
    /// The task's persisted id, if it has one.
    pub fn id(&self) -> Option<&str> {
        self.ids.first().map(String::as_str)
    }
}

/// Reduced task shape returned by list queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: String,
    pub owner: String,
    pub name: String,
    pub description: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub backends: Vec<TaskBackend>,
}

/// Optional filters for list queries. All absent means "everything".
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub backend_id: Option<String>,
    pub owner: Option<String>,
    pub state: Option<i64>,
    pub created_since: Option<chrono::DateTime<Utc>>,
}

/// Window applied to list queries and to assignment sub-lists.
#[derive(Debug, Clone, Copy)]
pub struct Paging {
    pub limit: u32,
    pub offset: u32,
}

impl Default for Paging {
    fn default() -> Self {
        Paging { limit: 100, offset: 0 }
    }
}

/// How much of a task a read should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataView {
    /// Base fields only, no per-worker assignment detail.
    Minimal,
    /// Base fields plus the paged assignment list.
    AllDetails,
}

/// Background job types the scheduler can submit for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Dispatch,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Dispatch => "dispatch",
        }
    }
}

/// Current time as an RFC 3339 string with millisecond precision.
///
/// Fixed-width so that textual comparison in SQL matches time order.
pub fn now_ts() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
