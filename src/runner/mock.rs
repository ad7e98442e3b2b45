//! Mock exec strategy returning preconfigured output

use super::traits::{CommandOutput, ExecError, ExecStrategy};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
enum MockResponse {
    Output(CommandOutput),
    SpawnFailure(String),
}

/// Exec strategy that never spawns a process.
///
/// Responses are matched by substring against the command line, first
/// registration wins. Unmatched commands exit 127. Every call is recorded.
pub struct MockStrategy {
    name: String,
    available: bool,
    responses: Vec<(String, MockResponse)>,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl MockStrategy {
    /// Create a mock strategy that reports as available.
    pub fn available() -> Self {
        Self {
            name: "mock".to_string(),
            available: true,
            responses: Vec::new(),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock strategy that reports as unavailable.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::available()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Register output for commands containing `fragment`.
    pub fn with_response(
        mut self,
        fragment: impl Into<String>,
        output: impl Into<String>,
        status: i32,
    ) -> Self {
        self.responses.push((
            fragment.into(),
            MockResponse::Output(CommandOutput::new(output, status)),
        ));
        self
    }

    /// Make commands containing `fragment` fail to spawn.
    pub fn with_spawn_failure(mut self, fragment: impl Into<String>) -> Self {
        let fragment = fragment.into();
        let message = format!("mock spawn failure for '{}'", fragment);
        self.responses
            .push((fragment, MockResponse::SpawnFailure(message)));
        self
    }

    /// Sleep before answering, to exercise timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Command lines received so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls().len()
    }
}

#[async_trait]
impl ExecStrategy for MockStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        self.available
    }

    async fn execute(&self, command: &str) -> Result<CommandOutput, ExecError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(command.to_string());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let response = self
            .responses
            .iter()
            .find(|(fragment, _)| command.contains(fragment.as_str()))
            .map(|(_, response)| response.clone());

        match response {
            Some(MockResponse::Output(output)) => Ok(output),
            Some(MockResponse::SpawnFailure(message)) => Err(ExecError::spawn(
                &self.name,
                std::io::Error::new(std::io::ErrorKind::Other, message),
            )),
            None => Ok(CommandOutput::new("command not found", 127)),
        }
    }
}
