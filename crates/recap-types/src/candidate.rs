//! Candidate type produced by the extraction client.
//!
//! A candidate is the transient structured output for a single turn. Any
//! subset of its sections may be absent; it is never persisted as-is, only
//! merged into a `ThreadSummary`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::summary::FactValue;

/// Structured facts extracted from one message pair.
///
/// All sections default to empty so partial extraction output deserializes
/// cleanly. Type mismatches (e.g. a string where a list is expected) are a
/// deserialization error, which the extraction client reports as failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Subject -> value pairs to insert or overwrite
    #[serde(default)]
    pub facts: BTreeMap<String, FactValue>,

    /// Decision texts to append (deduplicated case-insensitively on merge)
    #[serde(default)]
    pub decisions: Vec<String>,

    /// Todo texts to append (deduplicated case-insensitively on merge)
    #[serde(default)]
    pub todos: Vec<String>,

    /// Goals to union in (case-sensitive)
    #[serde(default)]
    pub goals: Vec<String>,

    /// Constraints to union in (case-sensitive)
    #[serde(default)]
    pub constraints: Vec<String>,

    /// Term -> definition upserts
    #[serde(default)]
    pub glossary: BTreeMap<String, String>,
}

impl Candidate {
    /// True if no section carries any content.
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
            && self.decisions.is_empty()
            && self.todos.is_empty()
            && self.goals.is_empty()
            && self.constraints.is_empty()
            && self.glossary.is_empty()
    }

    /// Add a fact.
    pub fn with_fact(mut self, subject: impl Into<String>, value: FactValue) -> Self {
        self.facts.insert(subject.into(), value);
        self
    }

    /// Add a decision text.
    pub fn with_decision(mut self, text: impl Into<String>) -> Self {
        self.decisions.push(text.into());
        self
    }

    /// Add a todo text.
    pub fn with_todo(mut self, text: impl Into<String>) -> Self {
        self.todos.push(text.into());
        self
    }

    /// Add a goal.
    pub fn with_goal(mut self, goal: impl Into<String>) -> Self {
        self.goals.push(goal.into());
        self
    }

    /// Add a constraint.
    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraints.push(constraint.into());
        self
    }

    /// Add a glossary entry.
    pub fn with_glossary(mut self, term: impl Into<String>, definition: impl Into<String>) -> Self {
        self.glossary.insert(term.into(), definition.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_candidate() {
        assert!(Candidate::default().is_empty());
        assert!(!Candidate::default().with_goal("ship v1").is_empty());
    }

    #[test]
    fn test_partial_candidate_deserializes() {
        let candidate: Candidate =
            serde_json::from_str(r#"{"goals": ["ship v1"], "facts": {"budget": "$500"}}"#).unwrap();

        assert_eq!(candidate.goals, vec!["ship v1".to_string()]);
        assert_eq!(candidate.facts["budget"], FactValue::text("$500"));
        assert!(candidate.decisions.is_empty());
        assert!(candidate.glossary.is_empty());
    }

    #[test]
    fn test_malformed_candidate_is_an_error() {
        // decisions must be a list of strings, not a string
        let result = serde_json::from_str::<Candidate>(r#"{"decisions": "use rocksdb"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_roundtrip() {
        let candidate = Candidate::default()
            .with_fact("budget", FactValue::text("$500"))
            .with_decision("use rocksdb")
            .with_todo("write docs")
            .with_goal("ship v1")
            .with_constraint("no cloud services")
            .with_glossary("CAS", "compare-and-set");

        let json = serde_json::to_string(&candidate).unwrap();
        let decoded: Candidate = serde_json::from_str(&json).unwrap();
        assert_eq!(candidate, decoded);
    }
}
