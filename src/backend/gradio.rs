//! Minimal Gradio client for StyleTTS-style apps.
//!
//! A call is two requests: `POST /gradio_api/call/{api}` queues the job and
//! returns an event id, then `GET /gradio_api/call/{api}/{event_id}` streams
//! server-sent events until `complete` or `error`.

use crate::backend::{AudioArtifact, EntryPoint};
use crate::config::VoiceConfig;
use crate::error::{AudiobookError, Result};
use futures_util::StreamExt;
use serde_json::{Value, json};
use std::io::Write;
use std::path::PathBuf;

pub struct GradioClient {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
    scratch_dir: PathBuf,
}

impl GradioClient {
    /// `scratch_dir` receives downloaded audio until the caller moves it.
    pub fn new(endpoint: &str, token: Option<String>, scratch_dir: PathBuf) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token,
            scratch_dir,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// True when `url` is served from the endpoint's own origin.
    ///
    /// The token only ever goes to that origin.
    fn shares_origin(&self, url: &str) -> bool {
        match (reqwest::Url::parse(&self.endpoint), reqwest::Url::parse(url)) {
            (Ok(endpoint), Ok(url)) => endpoint.origin() == url.origin(),
            _ => false,
        }
    }

    fn call_url(&self, api: &str) -> String {
        format!(
            "{}/gradio_api/call/{}",
            self.endpoint,
            api.trim_start_matches('/')
        )
    }

    /// Run one prediction and return the `data` array of the result.
    pub async fn predict(&self, api: &str, data: Vec<Value>) -> Result<Vec<Value>> {
        let url = self.call_url(api);
        let response = self
            .authorized(self.client.post(&url))
            .json(&json!({ "data": data }))
            .send()
            .await
            .map_err(|e| request_error(format!("{url}: {e}")))?;

        if !response.status().is_success() {
            return Err(request_error(format!(
                "{url} returned status {}",
                response.status()
            )));
        }

        let queued: Value = response
            .json()
            .await
            .map_err(|e| request_error(format!("{url}: unreadable response: {e}")))?;
        let event_id = queued
            .get("event_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| request_error(format!("{url}: response has no event_id")))?;

        let stream_url = format!("{url}/{event_id}");
        let body = self
            .authorized(self.client.get(&stream_url))
            .send()
            .await
            .map_err(|e| request_error(format!("{stream_url}: {e}")))?
            .text()
            .await
            .map_err(|e| request_error(format!("{stream_url}: {e}")))?;

        parse_sse_result(&body)
    }

    /// Synthesize `text` and download the audio into the scratch directory.
    pub async fn synthesize(&self, text: &str, voice: &VoiceConfig) -> Result<AudioArtifact> {
        let entry = EntryPoint::for_voice(&voice.voice);
        let data = request_data(entry, text, voice);
        let result = self.predict(entry.api_name(), data).await?;

        let file = result
            .first()
            .ok_or_else(|| request_error("prediction returned no output".to_string()))?;
        let url = self
            .file_url(file)
            .ok_or_else(|| request_error(format!("prediction output is not a file: {file}")))?;

        self.download(&url).await.map(AudioArtifact::File)
    }

    /// Resolve a Gradio file object (or bare path string) to a download URL.
    pub fn file_url(&self, file: &Value) -> Option<String> {
        if let Some(url) = file.get("url").and_then(|v| v.as_str()) {
            return Some(url.to_string());
        }
        let path = file
            .get("path")
            .and_then(|v| v.as_str())
            .or_else(|| file.as_str())?;
        if path.starts_with("http://") || path.starts_with("https://") {
            Some(path.to_string())
        } else {
            Some(format!("{}/gradio_api/file={path}", self.endpoint))
        }
    }

    async fn download(&self, url: &str) -> Result<PathBuf> {
        let request = self.client.get(url);
        let request = if self.shares_origin(url) {
            self.authorized(request)
        } else {
            request
        };
        let response = request
            .send()
            .await
            .map_err(|e| request_error(format!("Failed to fetch audio: {e}")))?;

        if !response.status().is_success() {
            return Err(request_error(format!(
                "Audio download failed with status: {}",
                response.status()
            )));
        }

        std::fs::create_dir_all(&self.scratch_dir)?;
        let mut file = tempfile::Builder::new()
            .prefix("audiobooker-")
            .suffix(".wav")
            .tempfile_in(&self.scratch_dir)?;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| request_error(format!("Failed to read audio: {e}")))?;
            file.write_all(&chunk)?;
        }
        file.flush()?;

        let (_, path) = file
            .keep()
            .map_err(|e| AudiobookError::Other(format!("Failed to keep download: {e}")))?;
        Ok(path)
    }
}

fn request_error(message: String) -> AudiobookError {
    AudiobookError::BackendRequest { message }
}

/// Positional inputs for each entry point.
pub fn request_data(entry: EntryPoint, text: &str, voice: &VoiceConfig) -> Vec<Value> {
    match entry {
        EntryPoint::MultiVoice => vec![
            json!(text),
            json!(voice.voice),
            json!(voice.diffusion_steps),
        ],
        EntryPoint::LongForm => vec![json!(text), json!(voice.diffusion_steps)],
    }
}

/// Find the terminal event in a Gradio SSE body.
///
/// `complete` yields its JSON data array; `error` becomes a request error.
pub fn parse_sse_result(body: &str) -> Result<Vec<Value>> {
    let mut event = "";
    for line in body.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(name) = line.strip_prefix("event:") {
            event = name.trim();
            continue;
        }
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();
        match event {
            "complete" => {
                return serde_json::from_str::<Vec<Value>>(data)
                    .map_err(|e| request_error(format!("unreadable result {data}: {e}")));
            }
            "error" => {
                let message = if data.is_empty() || data == "null" {
                    "backend reported an error".to_string()
                } else {
                    format!("backend reported an error: {data}")
                };
                return Err(request_error(message));
            }
            _ => {}
        }
    }
    Err(request_error(
        "event stream ended without a result".to_string(),
    ))
}
