//! Test generators — mock `Generator` implementations for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use taleweave_core::generator::{Generation, GenerationError, Generator, Turn};

/// One recorded invocation of a scripted generator.
#[derive(Debug, Clone)]
pub struct GeneratorCall {
    /// The system prompt passed in.
    pub system_prompt: String,
    /// The turn history passed in.
    pub turns: Vec<Turn>,
    /// The decided input passed in.
    pub next_input: String,
}

/// A generator that plays back a fixed script of results, recording
/// every call. Useful for retry scenarios: queue transient errors
/// followed by a success.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<Generation, GenerationError>>>,
    calls: Mutex<Vec<GeneratorCall>>,
}

impl ScriptedGenerator {
    /// Creates a generator that returns the scripted results in order.
    #[must_use]
    pub fn new(script: Vec<Result<Generation, GenerationError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Convenience: a generator that succeeds once per narrative, in order.
    #[must_use]
    pub fn with_narratives(narratives: &[&str]) -> Self {
        Self::new(
            narratives
                .iter()
                .map(|n| {
                    Ok(Generation {
                        narrative: (*n).to_owned(),
                        usage: None,
                        model_name: Some("scripted".to_owned()),
                    })
                })
                .collect(),
        )
    }

    /// Number of calls made so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Snapshot of all recorded calls.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn calls(&self) -> Vec<GeneratorCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(
        &self,
        system_prompt: &str,
        turns: &[Turn],
        next_input: &str,
    ) -> Result<Generation, GenerationError> {
        self.calls.lock().unwrap().push(GeneratorCall {
            system_prompt: system_prompt.to_owned(),
            turns: turns.to_vec(),
            next_input: next_input.to_owned(),
        });
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(GenerationError::Provider("script exhausted".into())))
    }
}

/// A generator that always fails with the configured error, counting
/// attempts. Useful for retry-exhaustion and fatal-error paths.
#[derive(Debug)]
pub struct FailingGenerator {
    error: GenerationError,
    attempts: Mutex<usize>,
}

impl FailingGenerator {
    /// Creates a generator that always returns `error`.
    #[must_use]
    pub fn new(error: GenerationError) -> Self {
        Self {
            error,
            attempts: Mutex::new(0),
        }
    }

    /// Number of attempts made so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

#[async_trait]
impl Generator for FailingGenerator {
    async fn generate(
        &self,
        _system_prompt: &str,
        _turns: &[Turn],
        _next_input: &str,
    ) -> Result<Generation, GenerationError> {
        *self.attempts.lock().unwrap() += 1;
        Err(self.error.clone())
    }
}
