use std::collections::VecDeque;
use std::process::Stdio;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("http error: {0}")]
    Http(String),
    #[error("ollama returned {0}")]
    Status(String),
    #[error("ollama error: {0}")]
    Ollama(String),
    #[error("malformed stream line: {0}")]
    Stream(String),
    #[error("failed to run ollama: {0}")]
    Spawn(String),
    #[error("ollama exited with {0}")]
    ProcessStatus(String),
    #[error("no reply within {0:?}")]
    Timeout(Duration),
    #[error("mock responses exhausted")]
    MockExhausted,
}

/// Talks to `ollama serve` over `POST /api/generate`, reading the NDJSON
/// stream and concatenating the `response` fragments in arrival order.
pub struct OllamaHttpClient {
    host: String,
    model: String,
    timeout: Duration,
    client: Client,
}

impl OllamaHttpClient {
    pub fn new(host: String, model: String, timeout: Duration) -> Result<Self, LlmError> {
        let client = Client::builder()
            .build()
            .map_err(|e| LlmError::Http(e.to_string()))?;
        Ok(Self {
            host,
            model,
            timeout,
            client,
        })
    }

    pub async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        tokio::time::timeout(self.timeout, self.stream_generate(prompt))
            .await
            .map_err(|_| LlmError::Timeout(self.timeout))?
    }

    async fn stream_generate(&self, prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/api/generate", self.host.trim_end_matches('/'));
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: true,
        };
        debug!(%url, model = %self.model, prompt_chars = prompt.len(), "ollama generate");
        let mut resp = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(LlmError::Status(format!("{status} {text}")));
        }

        // Bytes, not text: a chunk boundary can split a multi-byte umlaut.
        let mut buffer: Vec<u8> = Vec::new();
        let mut output = String::new();
        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?
        {
            buffer.extend_from_slice(&chunk);
            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                if apply_stream_line(&line, &mut output)? {
                    return Ok(output.trim().to_string());
                }
            }
        }
        apply_stream_line(&buffer, &mut output)?;
        Ok(output.trim().to_string())
    }
}

/// Appends one NDJSON line's fragment to `output`. Returns true on the
/// final (`"done": true`) line.
fn apply_stream_line(line: &[u8], output: &mut String) -> Result<bool, LlmError> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return Ok(false);
    }
    let chunk: GenerateChunk = serde_json::from_slice(line)
        .map_err(|e| LlmError::Stream(format!("{e}: {}", String::from_utf8_lossy(line))))?;
    if let Some(err) = chunk.error {
        return Err(LlmError::Ollama(err));
    }
    if let Some(fragment) = chunk.response {
        output.push_str(&fragment);
    }
    Ok(chunk.done)
}

/// Runs `ollama run <model>` with the prompt on stdin.
pub struct OllamaProcessClient {
    program: String,
    model: String,
    timeout: Duration,
}

impl OllamaProcessClient {
    pub fn new(model: String, timeout: Duration) -> Self {
        Self::with_program("ollama".to_string(), model, timeout)
    }

    pub fn with_program(program: String, model: String, timeout: Duration) -> Self {
        Self {
            program,
            model,
            timeout,
        }
    }

    pub async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        tokio::time::timeout(self.timeout, self.run(prompt))
            .await
            .map_err(|_| LlmError::Timeout(self.timeout))?
    }

    async fn run(&self, prompt: &str) -> Result<String, LlmError> {
        debug!(program = %self.program, model = %self.model, prompt_chars = prompt.len(), "ollama run");
        let mut child = Command::new(&self.program)
            .arg("run")
            .arg(&self.model)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LlmError::Spawn(e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(prompt.as_bytes()).await {
                Ok(()) => {}
                // The exit status below decides whether the run failed.
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Err(e) => return Err(LlmError::Spawn(e.to_string())),
            }
        }

        let out = child
            .wait_with_output()
            .await
            .map_err(|e| LlmError::Spawn(e.to_string()))?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            return Err(LlmError::ProcessStatus(format!(
                "{} {}",
                out.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }
}

/// Scripted backend: answers with the queued responses in order and records
/// every prompt it was given.
pub struct MockLlm {
    responses: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl MockLlm {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        self.prompts.lock().await.push(prompt.to_string());
        let mut guard = self.responses.lock().await;
        guard.pop_front().ok_or(LlmError::MockExhausted)
    }

    pub async fn prompts(&self) -> Vec<String> {
        self.prompts.lock().await.clone()
    }
}

/// The model backend. Every binding takes a prompt and yields the raw reply
/// text; nothing downstream depends on which one is used.
pub enum ModelBackend {
    OllamaHttp(OllamaHttpClient),
    OllamaProcess(OllamaProcessClient),
    Mock(MockLlm),
}

impl ModelBackend {
    pub async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        match self {
            ModelBackend::OllamaHttp(client) => client.generate(prompt).await,
            ModelBackend::OllamaProcess(client) => client.generate(prompt).await,
            ModelBackend::Mock(client) => client.generate(prompt).await,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ModelBackend::OllamaHttp(_) => "ollama-http",
            ModelBackend::OllamaProcess(_) => "ollama-process",
            ModelBackend::Mock(_) => "mock",
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_lines_accumulate_until_done() {
        let mut out = String::new();
        assert!(!apply_stream_line(br#"{"response":"KORREKTUR: Ich ","done":false}"#, &mut out).unwrap());
        assert!(!apply_stream_line(b"  \n", &mut out).unwrap());
        assert!(apply_stream_line(br#"{"response":"gehe.","done":true,"total_duration":1}"#, &mut out).unwrap());
        assert_eq!(out, "KORREKTUR: Ich gehe.");
    }

    #[test]
    fn stream_error_line_is_an_error() {
        let mut out = String::new();
        let err = apply_stream_line(br#"{"error":"model 'x' not found"}"#, &mut out).unwrap_err();
        assert!(matches!(err, LlmError::Ollama(m) if m.contains("not found")));
    }

    #[test]
    fn garbage_line_is_a_stream_error() {
        let mut out = String::new();
        assert!(matches!(
            apply_stream_line(b"<html>", &mut out),
            Err(LlmError::Stream(_))
        ));
    }
}
