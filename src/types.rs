//! Shared type definitions for the communication-to-task pipeline.
//!
//! Timestamps are RFC 3339 strings throughout; they sort lexicographically
//! and round-trip through SQLite TEXT columns without conversion.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Sentinel project code used when no classification rule matches.
pub const UNKNOWN_CODE: &str = "UNKNOWN";

/// Source system a communication came from. Ids are unique per channel
/// (`email-42` vs `chat-42` never collide).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Chat,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Chat => "chat",
        }
    }
}

/// One inbound message from the simulated office. Owned by the external
/// generator; the pipeline never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Communication {
    pub id: String,
    pub channel: Channel,
    pub sender: String,
    pub recipients: Vec<String>,
    pub subject: Option<String>,
    pub body: String,
    /// Wall-clock timestamp assigned by the generating simulation.
    pub sent_at: String,
    /// Simulation tick counter. Absent for legacy data; the calendar
    /// mapper backfills a synthetic tick in that case.
    pub virtual_tick: Option<i64>,
}

impl Communication {
    /// True when the message carries neither a subject nor a body.
    pub fn is_blank(&self) -> bool {
        self.subject.as_deref().unwrap_or("").trim().is_empty() && self.body.trim().is_empty()
    }
}

/// TODO categories, ordered for deduplication by `TypePriority`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoType {
    Deadline,
    Meeting,
    Task,
    Review,
    Documentation,
    Issue,
    Info,
}

impl TodoType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deadline => "deadline",
            Self::Meeting => "meeting",
            Self::Task => "task",
            Self::Review => "review",
            Self::Documentation => "documentation",
            Self::Issue => "issue",
            Self::Info => "info",
        }
    }

    /// Parse a stored type string. Unrecognized values map to `Task`, the
    /// default for untyped extractions.
    pub fn parse(s: &str) -> Self {
        match s {
            "deadline" => Self::Deadline,
            "meeting" => Self::Meeting,
            "review" => Self::Review,
            "documentation" => Self::Documentation,
            "issue" => Self::Issue,
            "info" => Self::Info,
            _ => Self::Task,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Open,
    Done,
}

impl TodoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Done => "done",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "done" => Self::Done,
            _ => Self::Open,
        }
    }
}

/// A proposed task derived from a communication by an extractor.
///
/// Several candidates may share one `source_communication_id` when multiple
/// extraction heuristics fire on the same message; deduplication collapses
/// them to a single canonical `Todo`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoCandidate {
    pub id: String,
    pub todo_type: TodoType,
    pub title: String,
    pub description: Option<String>,
    /// Ordinal priority, 1 = highest.
    pub priority: i32,
    pub deadline: Option<String>,
    pub requester: Option<String>,
    /// Persona the TODO is assigned to.
    pub persona: Option<String>,
    pub source_communication_id: String,
    /// Ordered short justification strings from the extractor.
    pub evidence: Vec<String>,
    pub status: TodoStatus,
    pub created_at: String,
}

impl TodoCandidate {
    /// Build a candidate with a generated id and the current timestamp.
    pub fn new(todo_type: TodoType, title: &str, source_communication_id: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            todo_type,
            title: title.to_string(),
            description: None,
            priority: 3,
            deadline: None,
            requester: None,
            persona: None,
            source_communication_id: source_communication_id.to_string(),
            evidence: Vec::new(),
            status: TodoStatus::Open,
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

/// The canonical task record: the candidate that survived deduplication,
/// augmented with its project classification.
///
/// Created once per distinct source communication; afterwards mutated only
/// to set `status = done` or to backfill `project_full_name` when
/// classification completes later.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: String,
    pub todo_type: TodoType,
    pub title: String,
    pub description: Option<String>,
    pub priority: i32,
    pub deadline: Option<String>,
    pub requester: Option<String>,
    pub persona: Option<String>,
    pub source_communication_id: String,
    pub evidence: Vec<String>,
    pub status: TodoStatus,
    pub created_at: String,
    pub updated_at: String,
    pub project_tag: Option<String>,
    pub project_full_name: Option<String>,
}

impl Todo {
    /// Promote a winning candidate to a canonical record carrying its tag.
    pub fn from_candidate(candidate: &TodoCandidate, tag: &ProjectTag) -> Self {
        Self {
            id: candidate.id.clone(),
            todo_type: candidate.todo_type,
            title: candidate.title.clone(),
            description: candidate.description.clone(),
            priority: candidate.priority,
            deadline: candidate.deadline.clone(),
            requester: candidate.requester.clone(),
            persona: candidate.persona.clone(),
            source_communication_id: candidate.source_communication_id.clone(),
            evidence: candidate.evidence.clone(),
            status: candidate.status,
            created_at: candidate.created_at.clone(),
            updated_at: Utc::now().to_rfc3339(),
            project_tag: Some(tag.code.clone()),
            project_full_name: Some(tag.full_name.clone()),
        }
    }
}

/// Result of classifying one communication into a project context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectTag {
    /// Short identifier (2-6 uppercase letters) or `UNKNOWN`.
    pub code: String,
    pub full_name: String,
    pub reason: Option<String>,
    pub classified_at: String,
}

impl ProjectTag {
    pub fn new(code: &str, full_name: &str, reason: Option<String>) -> Self {
        Self {
            code: code.to_string(),
            full_name: full_name.to_string(),
            reason,
            classified_at: Utc::now().to_rfc3339(),
        }
    }

    /// The sentinel returned when no rule matches. Cached like any other
    /// result so re-runs do not re-pay rule evaluation.
    pub fn unknown() -> Self {
        Self::new(UNKNOWN_CODE, "Unknown", None)
    }

    pub fn is_unknown(&self) -> bool {
        self.code == UNKNOWN_CODE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_todo_type_round_trip() {
        for t in [
            TodoType::Deadline,
            TodoType::Meeting,
            TodoType::Task,
            TodoType::Review,
            TodoType::Documentation,
            TodoType::Issue,
            TodoType::Info,
        ] {
            assert_eq!(TodoType::parse(t.as_str()), t);
        }
        assert_eq!(TodoType::parse("something-else"), TodoType::Task);
    }

    #[test]
    fn test_blank_communication() {
        let comm = Communication {
            id: "email-1".into(),
            channel: Channel::Email,
            sender: "a@example.com".into(),
            recipients: vec!["b@example.com".into()],
            subject: Some("  ".into()),
            body: String::new(),
            sent_at: "2025-10-14T09:00:00+00:00".into(),
            virtual_tick: Some(0),
        };
        assert!(comm.is_blank());
    }

    #[test]
    fn test_candidate_promotion_carries_tag() {
        let candidate = TodoCandidate::new(TodoType::Task, "Ship the report", "email-7");
        let tag = ProjectTag::new("HA", "Health Assist", Some("participant: a@x".into()));
        let todo = Todo::from_candidate(&candidate, &tag);
        assert_eq!(todo.id, candidate.id);
        assert_eq!(todo.project_tag.as_deref(), Some("HA"));
        assert_eq!(todo.project_full_name.as_deref(), Some("Health Assist"));
        assert_eq!(todo.status, TodoStatus::Open);
    }
}
