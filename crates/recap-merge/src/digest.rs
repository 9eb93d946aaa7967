//! Digest compiler: renders a summary's structured fields as bounded text.
//!
//! The digest is meant for injection into a future conversation turn, so
//! it is short, sectioned, and hard-capped. It is a pure function of the
//! summary passed in and never consults `digest_text` itself.

use recap_types::ThreadSummary;

/// Separator between rendered sections.
const SECTION_SEPARATOR: &str = "\n";

/// Marker appended when the digest had to be cut.
const TRUNCATION_MARKER: char = '…';

const MAX_GOALS: usize = 3;
const MAX_FACTS: usize = 5;
const MAX_DECISIONS: usize = 3;
const MAX_CONSTRAINTS: usize = 2;

/// Tunables for the digest compiler.
#[derive(Debug, Clone)]
pub struct DigestOptions {
    /// Hard cap on the compiled digest, in characters.
    pub max_chars: usize,
}

impl Default for DigestOptions {
    fn default() -> Self {
        Self { max_chars: 1500 }
    }
}

/// Compile a digest with default options. See [`compile_with`].
pub fn compile(summary: &ThreadSummary) -> String {
    compile_with(summary, &DigestOptions::default())
}

/// Compile a bounded text digest from a summary's structured fields.
///
/// Renders, in priority order: up to three goals, up to five facts, the
/// three most recent decisions, the open-todo count, and up to two
/// constraints. Empty sections are skipped. The concatenation is
/// hard-truncated to `max_chars` characters, with a trailing ellipsis
/// when truncation occurs.
pub fn compile_with(summary: &ThreadSummary, options: &DigestOptions) -> String {
    let mut sections: Vec<String> = Vec::new();

    if !summary.goals.is_empty() {
        let goals: Vec<&str> = summary
            .goals
            .iter()
            .take(MAX_GOALS)
            .map(String::as_str)
            .collect();
        sections.push(format!("Goals: {}", goals.join("; ")));
    }

    if !summary.facts.is_empty() {
        let facts: Vec<String> = summary
            .facts
            .iter()
            .take(MAX_FACTS)
            .map(|(subject, fact)| format!("{}: {}", subject, fact.value))
            .collect();
        sections.push(format!("Facts: {}", facts.join("; ")));
    }

    if !summary.decisions.is_empty() {
        let decisions: Vec<&str> = summary
            .decisions
            .iter()
            .rev()
            .take(MAX_DECISIONS)
            .map(|d| d.text.as_str())
            .collect();
        sections.push(format!("Recent decisions: {}", decisions.join("; ")));
    }

    if !summary.todos.is_empty() {
        sections.push(format!("Open todos: {}", summary.todos.len()));
    }

    if !summary.constraints.is_empty() {
        let constraints: Vec<&str> = summary
            .constraints
            .iter()
            .take(MAX_CONSTRAINTS)
            .map(String::as_str)
            .collect();
        sections.push(format!("Constraints: {}", constraints.join("; ")));
    }

    truncate_chars(&sections.join(SECTION_SEPARATOR), options.max_chars)
}

/// Truncate to at most `max_chars` characters, replacing the tail with an
/// ellipsis when anything was cut.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out.push(TRUNCATION_MARKER);
    out
}
