//! Command handlers for the recap binary.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;

use recap_extraction::{ApiExtractor, ApiExtractorConfig, ExtractionTemplate};
use recap_merge::{DigestOptions, MergeOptions};
use recap_pipeline::{InMemoryConversations, Pipeline, ProcessOutcome, ProcessRequest, StaticTemplates};
use recap_storage::SummaryStore;
use recap_types::{RecapConfig, ThreadSummary};

/// Built-in instruction template, used when the config does not override
/// it. The output shape must match `Candidate`.
const DEFAULT_INSTRUCTIONS: &str = r#"You maintain a running memory of a conversation. From the following message pair, extract only durable information as JSON with any of these keys (omit empty ones):
{
  "facts": {"subject": "value"},
  "decisions": ["decision taken"],
  "todos": ["open item"],
  "goals": ["stated goal"],
  "constraints": ["stated constraint"],
  "glossary": {"term": "definition"}
}
Record only information stated in the messages. Respond with JSON only."#;

/// Open the summary store at the configured path.
pub fn open_store(config: &RecapConfig) -> Result<Arc<SummaryStore>> {
    let path = config.expanded_db_path();
    let store = SummaryStore::open(&path)
        .with_context(|| format!("failed to open summary store at {:?}", path))?;
    Ok(Arc::new(store))
}

/// Build the active extraction template from configuration.
fn build_template(config: &RecapConfig) -> ExtractionTemplate {
    let instructions = config
        .extraction
        .instructions
        .clone()
        .unwrap_or_else(|| DEFAULT_INSTRUCTIONS.to_string());

    ExtractionTemplate {
        instructions,
        model: config.extraction.model.clone(),
        temperature: config.extraction.temperature,
        max_output_tokens: config.extraction.max_output_tokens,
    }
}

/// Build the API extractor from configuration.
fn build_extractor(config: &RecapConfig) -> Result<ApiExtractor> {
    let api_key = config
        .extraction
        .api_key
        .clone()
        .context("no extraction API key configured (set RECAP_EXTRACTION__API_KEY)")?;

    let mut extractor_config = match config.extraction.provider.as_str() {
        "openai" => ApiExtractorConfig::openai(api_key),
        "anthropic" => ApiExtractorConfig::anthropic(api_key),
        other => bail!("unknown extraction provider: {}", other),
    };

    if let Some(base_url) = &config.extraction.api_base_url {
        extractor_config = extractor_config.with_base_url(base_url.clone());
    }
    extractor_config.timeout = std::time::Duration::from_secs(config.extraction.timeout_secs);
    extractor_config.max_retries = config.extraction.max_retries;

    ApiExtractor::new(extractor_config).context("failed to build extraction client")
}

fn build_pipeline(
    config: &RecapConfig,
    store: Arc<SummaryStore>,
    conversations: Arc<InMemoryConversations>,
) -> Result<Pipeline> {
    let extractor = build_extractor(config)?;
    Ok(Pipeline::with_options(
        store,
        conversations,
        Arc::new(StaticTemplates::new(build_template(config))),
        Arc::new(extractor),
        MergeOptions {
            delta_capacity: config.merge.delta_capacity,
        },
        DigestOptions {
            max_chars: config.digest.max_chars,
        },
    ))
}

/// Feed one turn's texts through the full pipeline.
pub async fn handle_process(
    config: &RecapConfig,
    thread: &str,
    user_text: &str,
    assistant_text: &str,
    assistant_id: Option<String>,
) -> Result<()> {
    if !config.enabled {
        bail!("summarization is disabled in configuration (enabled = false)");
    }

    let store = open_store(config)?;
    let conversations = Arc::new(InMemoryConversations::new());

    let user_id = ulid::Ulid::new().to_string();
    let assistant_id = assistant_id.unwrap_or_else(|| ulid::Ulid::new().to_string());
    conversations.insert(&user_id, user_text);
    conversations.insert(&assistant_id, assistant_text);

    let pipeline = build_pipeline(config, store, conversations)?;
    let request = ProcessRequest::new(thread, user_id, assistant_id);

    match pipeline.process_turn(&request).await? {
        ProcessOutcome::Updated(summary) => {
            info!(thread_id = %thread, version = summary.version, "Turn processed");
            println!("Updated {} to version {}", thread, summary.version);
            if let Some(digest) = &summary.digest_text {
                println!("\n{}", digest);
            }
        }
        ProcessOutcome::Unchanged(summary) => {
            println!(
                "Turn already processed; {} remains at version {}",
                thread, summary.version
            );
        }
    }

    Ok(())
}

/// Print the current digest for a thread.
pub fn handle_digest(config: &RecapConfig, thread: &str) -> Result<()> {
    let store = open_store(config)?;
    match store.get(thread)?.and_then(|s| s.digest_text) {
        Some(digest) => println!("{}", digest),
        None => println!("(no summary for thread {})", thread),
    }
    Ok(())
}

/// Print the full summary for a thread.
pub fn handle_show(config: &RecapConfig, thread: &str, json: bool) -> Result<()> {
    let store = open_store(config)?;
    let Some(summary) = store.get(thread)? else {
        println!("(no summary for thread {})", thread);
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &ThreadSummary) {
    println!("thread:  {}", summary.thread_id);
    println!("version: {}", summary.version);
    if let Some(id) = &summary.last_processed_message_id {
        println!("last processed message: {}", id);
    }

    if !summary.goals.is_empty() {
        println!("\ngoals:");
        for goal in &summary.goals {
            println!("  - {}", goal);
        }
    }
    if !summary.facts.is_empty() {
        println!("\nfacts:");
        for (subject, fact) in &summary.facts {
            println!(
                "  {}: {} ({} source message{})",
                subject,
                fact.value,
                fact.source_message_ids.len(),
                if fact.source_message_ids.len() == 1 { "" } else { "s" }
            );
        }
    }
    if !summary.decisions.is_empty() {
        println!("\ndecisions:");
        for decision in &summary.decisions {
            println!("  - {}", decision.text);
        }
    }
    if !summary.todos.is_empty() {
        println!("\ntodos:");
        for todo in &summary.todos {
            println!("  - {}", todo.text);
        }
    }
    if !summary.constraints.is_empty() {
        println!("\nconstraints:");
        for constraint in &summary.constraints {
            println!("  - {}", constraint);
        }
    }
    if !summary.glossary.is_empty() {
        println!("\nglossary:");
        for (term, definition) in &summary.glossary {
            println!("  {}: {}", term, definition);
        }
    }
    if let Some(digest) = &summary.digest_text {
        println!("\ndigest:\n{}", digest);
    }
}

/// List the event log for a thread.
pub fn handle_events(config: &RecapConfig, thread: &str) -> Result<()> {
    let store = open_store(config)?;
    let events = store.events_for_thread(thread)?;

    if events.is_empty() {
        println!("(no events for thread {})", thread);
        return Ok(());
    }

    for event in events {
        println!(
            "{} {} v{} -> v{}  {}",
            event.created_at.format("%Y-%m-%d %H:%M:%S"),
            event.event_type,
            event.from_version,
            event.to_version,
            event.details
        );
    }
    Ok(())
}

/// Show store statistics.
pub fn handle_stats(config: &RecapConfig) -> Result<()> {
    let store = open_store(config)?;
    let stats = store.stats()?;

    println!("summaries:  {}", stats.summary_count);
    println!("events:     {}", stats.event_count);
    println!("disk usage: {} bytes", stats.disk_usage_bytes);
    Ok(())
}

/// Recompute and, if needed, rewrite a thread's digest.
pub fn handle_reconcile(config: &RecapConfig, thread: &str) -> Result<()> {
    let store = open_store(config)?;

    // Digest reconciliation never calls the extraction oracle, so a dummy
    // pipeline without API credentials is enough here.
    let pipeline = Pipeline::with_options(
        store,
        Arc::new(InMemoryConversations::new()),
        Arc::new(StaticTemplates::none()),
        Arc::new(recap_extraction::MockExtractor::new()),
        MergeOptions {
            delta_capacity: config.merge.delta_capacity,
        },
        DigestOptions {
            max_chars: config.digest.max_chars,
        },
    );

    match pipeline.reconcile_digest(thread)? {
        Some(summary) => println!(
            "{} is at version {} with a consistent digest",
            thread, summary.version
        ),
        None => println!("(no summary for thread {})", thread),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_store_at_configured_path() {
        let temp = TempDir::new().unwrap();
        let config = RecapConfig {
            db_path: temp.path().join("db").to_string_lossy().to_string(),
            ..RecapConfig::default()
        };

        let store = open_store(&config).unwrap();
        assert!(store.get("thread-1").unwrap().is_none());
    }

    #[test]
    fn test_build_template_uses_builtin_instructions() {
        let config = RecapConfig::default();
        let template = build_template(&config);
        assert!(template.instructions.contains("facts"));
        assert_eq!(template.model, config.extraction.model);
    }

    #[test]
    fn test_build_template_honors_override() {
        let mut config = RecapConfig::default();
        config.extraction.instructions = Some("custom instructions".to_string());
        assert_eq!(build_template(&config).instructions, "custom instructions");
    }

    #[test]
    fn test_build_extractor_requires_api_key() {
        let config = RecapConfig::default();
        let err = build_extractor(&config).unwrap_err();
        assert!(err.to_string().contains("API key"));
    }

    #[test]
    fn test_build_extractor_rejects_unknown_provider() {
        let mut config = RecapConfig::default();
        config.extraction.api_key = Some("test-key".to_string());
        config.extraction.provider = "carrier-pigeon".to_string();
        assert!(build_extractor(&config).is_err());
    }
}
