use std::time::Duration;

use clap::ValueEnum;

use crate::llm_client::{LlmError, ModelBackend, OllamaHttpClient, OllamaProcessClient};

pub const DEFAULT_MODEL: &str = "mistral:7b-instruct";
pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";

/// How the model backend is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Transport {
    /// `POST /api/generate` with a streamed reply.
    Http,
    /// `ollama run <model>` as a child process.
    Process,
}

impl Transport {
    pub fn default_timeout(self) -> Duration {
        match self {
            Transport::Http => Duration::from_secs(120),
            Transport::Process => Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub model: String,
    pub ollama_host: String,
    pub transport: Transport,
    /// Falls back to [`Transport::default_timeout`].
    pub timeout: Option<Duration>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            ollama_host: DEFAULT_OLLAMA_HOST.to_string(),
            transport: Transport::Http,
            timeout: None,
        }
    }
}

impl BackendConfig {
    pub fn effective_timeout(&self) -> Duration {
        self.timeout
            .unwrap_or_else(|| self.transport.default_timeout())
    }

    pub fn build_backend(&self) -> Result<ModelBackend, LlmError> {
        let timeout = self.effective_timeout();
        Ok(match self.transport {
            Transport::Http => ModelBackend::OllamaHttp(OllamaHttpClient::new(
                self.ollama_host.clone(),
                self.model.clone(),
                timeout,
            )?),
            Transport::Process => {
                ModelBackend::OllamaProcess(OllamaProcessClient::new(self.model.clone(), timeout))
            }
        })
    }
}
