//! Merge engine: folds one candidate into a summary.
//!
//! Merges are strictly additive or updating, never subtractive: every
//! fact, decision, todo, goal, constraint, and glossary entry present in
//! the input summary is still present in the output.

use chrono::{DateTime, Utc};

use recap_types::{Candidate, Decision, Fact, MergeDelta, ThreadSummary, Todo};

/// Tunables for the merge engine.
#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Ring-buffer capacity for merge deltas; oldest entries are evicted
    /// once the buffer is full.
    pub delta_capacity: usize,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self { delta_capacity: 20 }
    }
}

/// Merge a candidate into a summary with default options.
///
/// See [`merge_with`].
pub fn merge(
    current: &ThreadSummary,
    candidate: &Candidate,
    message_id: &str,
    now: DateTime<Utc>,
) -> ThreadSummary {
    merge_with(current, candidate, message_id, now, &MergeOptions::default())
}

/// Merge a candidate into a summary.
///
/// Pure and deterministic: identical `(current, candidate, message_id,
/// now)` always yields an identical result. The clock is an explicit
/// argument so callers own the only source of nondeterminism.
///
/// Per-field policy:
/// - facts: insert new subjects; overwrite values of existing subjects and
///   append `message_id` to their source history
/// - decisions/todos: append only texts with no case-insensitive match
/// - goals/constraints: set union, case-sensitive
/// - glossary: upsert by term, candidate wins
/// - deltas: one new entry describing this merge, ring-bounded
///
/// `version`, `digest_text`, and `last_processed_message_id` are carried
/// through unchanged; the orchestrator finalizes them after compiling the
/// digest.
pub fn merge_with(
    current: &ThreadSummary,
    candidate: &Candidate,
    message_id: &str,
    now: DateTime<Utc>,
    options: &MergeOptions,
) -> ThreadSummary {
    let mut next = current.clone();
    let mut changes: Vec<String> = Vec::new();

    let mut facts_applied = 0usize;
    for (subject, value) in &candidate.facts {
        match next.facts.get_mut(subject) {
            Some(fact) => {
                fact.value = value.clone();
                fact.source_message_ids.push(message_id.to_string());
            }
            None => {
                next.facts
                    .insert(subject.clone(), Fact::new(value.clone(), message_id));
            }
        }
        facts_applied += 1;
    }
    if facts_applied > 0 {
        changes.push(format!("facts: {}", facts_applied));
    }

    let mut decisions_applied = 0usize;
    for text in &candidate.decisions {
        let lowered = text.to_lowercase();
        let duplicate = next
            .decisions
            .iter()
            .any(|d| d.text.to_lowercase() == lowered);
        if !duplicate {
            next.decisions.push(Decision {
                text: text.clone(),
                source_message_id: message_id.to_string(),
                recorded_at: now,
            });
            decisions_applied += 1;
        }
    }
    if decisions_applied > 0 {
        changes.push(format!("decisions: {}", decisions_applied));
    }

    let mut todos_applied = 0usize;
    for text in &candidate.todos {
        let lowered = text.to_lowercase();
        let duplicate = next.todos.iter().any(|t| t.text.to_lowercase() == lowered);
        if !duplicate {
            next.todos.push(Todo {
                text: text.clone(),
                source_message_id: message_id.to_string(),
            });
            todos_applied += 1;
        }
    }
    if todos_applied > 0 {
        changes.push(format!("todos: {}", todos_applied));
    }

    let mut goals_applied = 0usize;
    for goal in &candidate.goals {
        if !next.goals.contains(goal) {
            next.goals.push(goal.clone());
            goals_applied += 1;
        }
    }
    if goals_applied > 0 {
        changes.push(format!("goals: {}", goals_applied));
    }

    let mut constraints_applied = 0usize;
    for constraint in &candidate.constraints {
        if !next.constraints.contains(constraint) {
            next.constraints.push(constraint.clone());
            constraints_applied += 1;
        }
    }
    if constraints_applied > 0 {
        changes.push(format!("constraints: {}", constraints_applied));
    }

    let mut glossary_applied = 0usize;
    for (term, definition) in &candidate.glossary {
        next.glossary.insert(term.clone(), definition.clone());
        glossary_applied += 1;
    }
    if glossary_applied > 0 {
        changes.push(format!("glossary: {}", glossary_applied));
    }

    let details = if changes.is_empty() {
        "no new information".to_string()
    } else {
        changes.join(", ")
    };

    next.deltas.push_back(MergeDelta {
        action: "merge".to_string(),
        details,
        timestamp: now,
    });
    while next.deltas.len() > options.delta_capacity {
        next.deltas.pop_front();
    }

    next
}
