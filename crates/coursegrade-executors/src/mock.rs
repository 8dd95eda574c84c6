//! Mock executor for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use coursegrade_core::model::Language;
use coursegrade_core::traits::{CodeExecutor, ExecutionOutcome};

/// A mock executor for exercising the grader without execution services.
///
/// Returns configurable outcomes based on source content matching.
pub struct MockExecutor {
    /// Source substring → outcome.
    responses: Vec<(String, ExecutionOutcome)>,
    /// Outcome per language when no substring matches.
    defaults: HashMap<Language, ExecutionOutcome>,
    call_count: AtomicU32,
    last_request: Mutex<Option<(Language, String)>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self {
            responses: Vec::new(),
            defaults: HashMap::new(),
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// An executor that prints `output` for every script.
    pub fn with_fixed_output(output: &str) -> Self {
        Self::new()
            .with_default(Language::JavaScript, ExecutionOutcome::Output(output.into()))
            .with_default(Language::Php, ExecutionOutcome::Output(output.into()))
    }

    /// Answer `outcome` for sources containing `needle`.
    pub fn when_source_contains(mut self, needle: &str, outcome: ExecutionOutcome) -> Self {
        self.responses.push((needle.to_string(), outcome));
        self
    }

    pub fn with_default(mut self, language: Language, outcome: ExecutionOutcome) -> Self {
        self.defaults.insert(language, outcome);
        self
    }

    /// Number of calls made to this executor.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Last `(language, source)` received.
    pub fn last_request(&self) -> Option<(Language, String)> {
        self.last_request.lock().ok().and_then(|r| r.clone())
    }
}

impl Default for MockExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CodeExecutor for MockExecutor {
    async fn execute(&self, language: Language, source: &str) -> ExecutionOutcome {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some((language, source.to_string()));
        }

        self.responses
            .iter()
            .find(|(needle, _)| source.contains(needle.as_str()))
            .map(|(_, outcome)| outcome.clone())
            .or_else(|| self.defaults.get(&language).cloned())
            .unwrap_or_else(|| {
                ExecutionOutcome::RemoteError(format!(
                    "no execution service configured for {language}"
                ))
            })
    }
}
