//! Language → execution service routing.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use coursegrade_core::model::Language;
use coursegrade_core::traits::{CodeExecutor, ExecutionOutcome};

use crate::client::RemoteInterpreter;

/// Routes each script to the service registered for its language.
#[derive(Debug, Clone, Default)]
pub struct ExecutorRegistry {
    interpreters: BTreeMap<Language, RemoteInterpreter>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an interpreter, replacing any previous one for its language.
    pub fn with(mut self, interpreter: RemoteInterpreter) -> Self {
        self.interpreters.insert(interpreter.language(), interpreter);
        self
    }

    /// Apply one wait bound to every registered interpreter.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.interpreters = self
            .interpreters
            .into_iter()
            .map(|(language, i)| (language, i.with_timeout(timeout)))
            .collect();
        self
    }

    pub fn languages(&self) -> impl Iterator<Item = Language> + '_ {
        self.interpreters.keys().copied()
    }

    pub fn get(&self, language: Language) -> Option<&RemoteInterpreter> {
        self.interpreters.get(&language)
    }
}

#[async_trait]
impl CodeExecutor for ExecutorRegistry {
    async fn execute(&self, language: Language, source: &str) -> ExecutionOutcome {
        match self.interpreters.get(&language) {
            Some(interpreter) => interpreter.run(source).await,
            None => {
                tracing::warn!(%language, "no execution service configured");
                ExecutionOutcome::RemoteError(format!(
                    "no execution service configured for {language}"
                ))
            }
        }
    }
}
