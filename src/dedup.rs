//! Candidate deduplication: one canonical TODO per source communication.
//!
//! Several extraction heuristics may fire on one message, each proposing a
//! candidate. Selection is pure and deterministic so re-analysis always
//! converges on the same record; any persistence-side delete/keep action is
//! the caller's responsibility.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::types::{TodoCandidate, TodoType};

/// Type ranking used to pick the most important candidate in a group,
/// highest first. The ordering is configuration, not hard-coded business
/// logic; override it to change dedup outcomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypePriority {
    order: Vec<TodoType>,
}

impl Default for TypePriority {
    fn default() -> Self {
        Self {
            order: vec![
                TodoType::Deadline,
                TodoType::Meeting,
                TodoType::Task,
                TodoType::Review,
                TodoType::Documentation,
                TodoType::Issue,
                TodoType::Info,
            ],
        }
    }
}

impl TypePriority {
    pub fn new(order: Vec<TodoType>) -> Self {
        Self { order }
    }

    /// Rank of a type: 0 is most important. Types missing from the
    /// configured order rank below every listed type.
    pub fn rank(&self, todo_type: TodoType) -> usize {
        self.order
            .iter()
            .position(|t| *t == todo_type)
            .unwrap_or(self.order.len())
    }
}

/// Selects exactly one canonical candidate per source communication.
#[derive(Debug, Clone, Default)]
pub struct TodoDeduplicator {
    priority: TypePriority,
}

impl TodoDeduplicator {
    pub fn new(priority: TypePriority) -> Self {
        Self { priority }
    }

    /// Pick the canonical candidate from a non-empty group sharing one
    /// `source_communication_id`.
    ///
    /// Ranking: type priority, then candidates with evidence over those
    /// without, then earliest `created_at`, then smallest id. The final key
    /// is unique, so any permutation of the same group selects the same
    /// record.
    ///
    /// An empty group violates the contract and returns
    /// `PipelineError::EmptyCandidateGroup`.
    pub fn select_canonical<'a>(
        &self,
        group: &'a [TodoCandidate],
    ) -> Result<&'a TodoCandidate, PipelineError> {
        let best = group
            .iter()
            .min_by_key(|c| {
                (
                    self.priority.rank(c.todo_type),
                    c.evidence.is_empty(),
                    c.created_at.clone(),
                    c.id.clone(),
                )
            })
            .ok_or(PipelineError::EmptyCandidateGroup)?;

        if group.len() > 1 {
            log::debug!(
                "Selected {} ({}) among {} candidates for {}",
                best.id,
                best.todo_type.as_str(),
                group.len(),
                best.source_communication_id
            );
        }
        Ok(best)
    }

    /// Pick the canonical record among already-persisted duplicates for one
    /// source. Same ranking as [`select_canonical`](Self::select_canonical),
    /// applied to stored rows during cleanup.
    pub fn select_canonical_persisted<'a>(
        &self,
        group: &'a [crate::types::Todo],
    ) -> Result<&'a crate::types::Todo, PipelineError> {
        group
            .iter()
            .min_by_key(|t| {
                (
                    self.priority.rank(t.todo_type),
                    t.evidence.is_empty(),
                    t.created_at.clone(),
                    t.id.clone(),
                )
            })
            .ok_or(PipelineError::EmptyCandidateGroup)
    }

    /// Partition candidates by `source_communication_id`, preserving the
    /// first-seen order of sources and the input order within each group.
    pub fn group_by_source(candidates: Vec<TodoCandidate>) -> Vec<(String, Vec<TodoCandidate>)> {
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut groups: Vec<(String, Vec<TodoCandidate>)> = Vec::new();
        for candidate in candidates {
            let source = candidate.source_communication_id.clone();
            match index.get(&source) {
                Some(&i) => groups[i].1.push(candidate),
                None => {
                    index.insert(source.clone(), groups.len());
                    groups.push((source, vec![candidate]));
                }
            }
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TodoStatus;

    fn candidate(id: &str, todo_type: TodoType) -> TodoCandidate {
        TodoCandidate {
            id: id.to_string(),
            todo_type,
            title: format!("candidate {id}"),
            description: None,
            priority: 3,
            deadline: None,
            requester: None,
            persona: None,
            source_communication_id: "email-1".to_string(),
            evidence: Vec::new(),
            status: TodoStatus::Open,
            created_at: "2025-10-14T09:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn test_task_beats_review_beats_info() {
        let dedup = TodoDeduplicator::default();
        let group = vec![
            candidate("A", TodoType::Review),
            candidate("B", TodoType::Task),
            candidate("C", TodoType::Info),
        ];
        let best = dedup.select_canonical(&group).unwrap();
        assert_eq!(best.id, "B");
    }

    #[test]
    fn test_deterministic_under_permutation() {
        let dedup = TodoDeduplicator::default();
        let a = candidate("A", TodoType::Review);
        let b = candidate("B", TodoType::Task);
        let c = candidate("C", TodoType::Info);

        let permutations: Vec<Vec<TodoCandidate>> = vec![
            vec![a.clone(), b.clone(), c.clone()],
            vec![a.clone(), c.clone(), b.clone()],
            vec![b.clone(), a.clone(), c.clone()],
            vec![b.clone(), c.clone(), a.clone()],
            vec![c.clone(), a.clone(), b.clone()],
            vec![c.clone(), b.clone(), a.clone()],
        ];
        for group in permutations {
            assert_eq!(dedup.select_canonical(&group).unwrap().id, "B");
        }
    }

    #[test]
    fn test_evidence_breaks_type_tie() {
        let dedup = TodoDeduplicator::default();
        let bare = candidate("A", TodoType::Task);
        let mut backed = candidate("B", TodoType::Task);
        backed.evidence.push("please do this by friday".to_string());
        let candidates = [bare, backed];
        let best = dedup.select_canonical(&candidates).unwrap();
        assert_eq!(best.id, "B");
    }

    #[test]
    fn test_earliest_created_then_smallest_id() {
        let dedup = TodoDeduplicator::default();
        let mut early = candidate("Z", TodoType::Task);
        early.created_at = "2025-10-14T09:00:00+00:00".to_string();
        let mut late = candidate("A", TodoType::Task);
        late.created_at = "2025-10-14T10:00:00+00:00".to_string();
        let candidates = [late.clone(), early.clone()];
        let best = dedup.select_canonical(&candidates).unwrap();
        assert_eq!(best.id, "Z", "earlier created_at beats smaller id");

        let twin_a = candidate("A", TodoType::Task);
        let twin_b = candidate("B", TodoType::Task);
        let candidates = [twin_b, twin_a];
        let best = dedup.select_canonical(&candidates).unwrap();
        assert_eq!(best.id, "A", "id is the final tie-break");
    }

    #[test]
    fn test_exactly_one_survivor() {
        let dedup = TodoDeduplicator::default();
        let group: Vec<TodoCandidate> = (0..10)
            .map(|i| candidate(&format!("c{i}"), TodoType::Task))
            .collect();
        let best = dedup.select_canonical(&group).unwrap();
        // Selection names exactly one record; everything else is a loser.
        assert_eq!(group.iter().filter(|c| c.id == best.id).count(), 1);
    }

    #[test]
    fn test_empty_group_is_contract_violation() {
        let dedup = TodoDeduplicator::default();
        let err = dedup.select_canonical(&[]).unwrap_err();
        assert!(err.is_contract_violation());
    }

    #[test]
    fn test_custom_priority_order() {
        let dedup = TodoDeduplicator::new(TypePriority::new(vec![
            TodoType::Info,
            TodoType::Task,
        ]));
        let group = vec![candidate("A", TodoType::Task), candidate("B", TodoType::Info)];
        assert_eq!(dedup.select_canonical(&group).unwrap().id, "B");
    }

    #[test]
    fn test_group_by_source_preserves_order() {
        let mut c1 = candidate("A", TodoType::Task);
        c1.source_communication_id = "email-1".to_string();
        let mut c2 = candidate("B", TodoType::Review);
        c2.source_communication_id = "email-2".to_string();
        let mut c3 = candidate("C", TodoType::Info);
        c3.source_communication_id = "email-1".to_string();

        let groups = TodoDeduplicator::group_by_source(vec![c1, c2, c3]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "email-1");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0, "email-2");
    }
}
