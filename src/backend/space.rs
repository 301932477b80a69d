//! Remote-managed backend: a Gradio app hosted on a HuggingFace Space.
//!
//! Spaces on paid hardware sleep when paused. Before the first chapter the
//! Space is restarted if needed and polled until it reports `RUNNING`;
//! after the last chapter it is paused again unless asked to stay warm.

use crate::backend::gradio::GradioClient;
use crate::backend::{AudioArtifact, Backend, BackendHandle, Released};
use crate::config::VoiceConfig;
use crate::error::{AudiobookError, Result};
use crate::output::{PipelineEvent, Reporter};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Runtime stage reported by the Hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpaceStage {
    Running,
    Paused,
    Stopped,
    /// Building, starting or otherwise moving between stages
    Transitioning(String),
    /// Build/runtime failure; waiting will not help
    Error(String),
}

impl SpaceStage {
    /// Parse a Hub stage tag such as `RUNNING` or `BUILD_ERROR`.
    pub fn parse(tag: &str) -> Self {
        match tag.trim().to_ascii_uppercase().as_str() {
            "RUNNING" => SpaceStage::Running,
            "PAUSED" => SpaceStage::Paused,
            "STOPPED" | "SLEEPING" => SpaceStage::Stopped,
            other if other.ends_with("ERROR") || other == "NO_APP_FILE" => {
                SpaceStage::Error(other.to_string())
            }
            other => SpaceStage::Transitioning(other.to_string()),
        }
    }

    pub fn needs_restart(&self) -> bool {
        matches!(self, SpaceStage::Paused | SpaceStage::Stopped)
    }
}

impl fmt::Display for SpaceStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpaceStage::Running => write!(f, "RUNNING"),
            SpaceStage::Paused => write!(f, "PAUSED"),
            SpaceStage::Stopped => write!(f, "STOPPED"),
            SpaceStage::Transitioning(tag) | SpaceStage::Error(tag) => write!(f, "{tag}"),
        }
    }
}

/// Control plane of a Space: query, restart, pause.
#[async_trait::async_trait]
pub trait SpaceControl: Send + Sync {
    async fn stage(&self) -> Result<SpaceStage>;

    /// Request a restart and return the stage reported right after.
    async fn restart(&self) -> Result<SpaceStage>;

    async fn pause(&self) -> Result<()>;
}

/// Space control through the HuggingFace Hub REST API.
pub struct HubSpaceControl {
    client: reqwest::Client,
    hub_url: String,
    space_id: String,
    token: Option<String>,
}

impl HubSpaceControl {
    pub fn new(hub_url: &str, space_id: &str, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            hub_url: hub_url.trim_end_matches('/').to_string(),
            space_id: space_id.to_string(),
            token,
        }
    }

    fn url(&self, action: &str) -> String {
        format!("{}/api/spaces/{}/{action}", self.hub_url, self.space_id)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send_for_stage(&self, request: reqwest::RequestBuilder) -> Result<SpaceStage> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| AudiobookError::BackendRequest {
                message: format!("Space {}: {e}", self.space_id),
            })?;

        if !response.status().is_success() {
            return Err(AudiobookError::BackendRequest {
                message: format!("Space {} returned status {}", self.space_id, response.status()),
            });
        }

        let body: serde_json::Value =
            response
                .json()
                .await
                .map_err(|e| AudiobookError::BackendRequest {
                    message: format!("Space {}: unreadable runtime info: {e}", self.space_id),
                })?;

        parse_runtime(&body).ok_or_else(|| AudiobookError::BackendRequest {
            message: format!("Space {}: runtime info has no stage", self.space_id),
        })
    }
}

/// Extract the stage from a Hub runtime document (`{"stage": "RUNNING", ...}`).
pub fn parse_runtime(body: &serde_json::Value) -> Option<SpaceStage> {
    body.get("stage")
        .and_then(|v| v.as_str())
        .map(SpaceStage::parse)
}

#[async_trait::async_trait]
impl SpaceControl for HubSpaceControl {
    async fn stage(&self) -> Result<SpaceStage> {
        self.send_for_stage(self.client.get(self.url("runtime"))).await
    }

    async fn restart(&self) -> Result<SpaceStage> {
        self.send_for_stage(self.client.post(self.url("restart"))).await
    }

    async fn pause(&self) -> Result<()> {
        self.send_for_stage(self.client.post(self.url("pause")))
            .await
            .map(|_| ())
    }
}

/// Bring a Space to `RUNNING`, restarting it if it sleeps.
///
/// Polls every `interval` until `budget` is used up. Error stages fail at
/// once; nothing is retried. Returns the time spent waiting.
pub async fn wait_until_running(
    control: &dyn SpaceControl,
    interval: Duration,
    budget: Duration,
    reporter: &dyn Reporter,
) -> Result<Duration> {
    let start = Instant::now();
    let mut stage = control.stage().await?;

    if stage.needs_restart() {
        reporter.report(&PipelineEvent::BackendRestarting {
            stage: stage.to_string(),
        });
        stage = control.restart().await?;
    }

    loop {
        match stage {
            SpaceStage::Running => return Ok(start.elapsed()),
            SpaceStage::Error(tag) => return Err(AudiobookError::BackendFailed { stage: tag }),
            _ => {}
        }

        let waited = start.elapsed();
        if waited >= budget {
            return Err(AudiobookError::BackendTimeout {
                waited,
                last_stage: stage.to_string(),
            });
        }

        reporter.report(&PipelineEvent::BackendWaiting {
            stage: stage.to_string(),
            waited,
        });
        tokio::time::sleep(interval).await;
        stage = control.stage().await?;
    }
}

/// Gradio TTS app, optionally with Space lifecycle control.
///
/// Without a control plane the app is assumed to be always on.
pub struct SpaceBackend {
    gradio: GradioClient,
    control: Option<Box<dyn SpaceControl>>,
    poll_interval: Duration,
    ready_timeout: Duration,
    handle: Option<BackendHandle>,
}

impl SpaceBackend {
    pub fn new(
        gradio: GradioClient,
        control: Option<Box<dyn SpaceControl>>,
        poll_interval: Duration,
        ready_timeout: Duration,
    ) -> Self {
        Self {
            gradio,
            control,
            poll_interval,
            ready_timeout,
            handle: None,
        }
    }
}

#[async_trait::async_trait]
impl Backend for SpaceBackend {
    fn name(&self) -> &str {
        if self.control.is_some() {
            "huggingface-space"
        } else {
            "gradio"
        }
    }

    async fn ensure_ready(&mut self, reporter: &dyn Reporter) -> Result<BackendHandle> {
        if let Some(handle) = &self.handle {
            return Ok(handle.clone());
        }

        let waited = match &self.control {
            Some(control) => {
                wait_until_running(
                    control.as_ref(),
                    self.poll_interval,
                    self.ready_timeout,
                    reporter,
                )
                .await?
            }
            None => Duration::ZERO,
        };

        let handle = BackendHandle {
            endpoint: self.gradio.endpoint().to_string(),
            voice_reference_url: None,
        };
        reporter.report(&PipelineEvent::BackendReady {
            endpoint: handle.endpoint.clone(),
            waited,
        });
        self.handle = Some(handle.clone());
        Ok(handle)
    }

    async fn synthesize(
        &self,
        _handle: &BackendHandle,
        text: &str,
        voice: &VoiceConfig,
    ) -> Result<AudioArtifact> {
        self.gradio.synthesize(text, voice).await
    }

    async fn release(&mut self, keep_alive: bool) -> Result<Released> {
        if self.handle.take().is_none() {
            return Ok(Released::Nothing);
        }
        match &self.control {
            Some(_) if keep_alive => Ok(Released::KeptWarm),
            Some(control) => control.pause().await.map(|_| Released::Paused),
            None => Ok(Released::Nothing),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{CollectingReporter, SilentReporter};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays a fixed stage sequence; the last stage repeats forever.
    struct ScriptedControl {
        stages: Mutex<VecDeque<SpaceStage>>,
        restart_stage: SpaceStage,
        restarts: AtomicUsize,
        pauses: AtomicUsize,
        pause_fails: bool,
    }

    impl ScriptedControl {
        fn new(stages: &[&str]) -> Self {
            Self {
                stages: Mutex::new(stages.iter().map(|s| SpaceStage::parse(s)).collect()),
                restart_stage: SpaceStage::parse("APP_STARTING"),
                restarts: AtomicUsize::new(0),
                pauses: AtomicUsize::new(0),
                pause_fails: false,
            }
        }
    }

    #[async_trait::async_trait]
    impl SpaceControl for ScriptedControl {
        async fn stage(&self) -> Result<SpaceStage> {
            let mut stages = self.stages.lock().unwrap();
            if stages.len() > 1 {
                Ok(stages.pop_front().unwrap())
            } else {
                Ok(stages.front().cloned().unwrap())
            }
        }

        async fn restart(&self) -> Result<SpaceStage> {
            self.restarts.fetch_add(1, Ordering::SeqCst);
            Ok(self.restart_stage.clone())
        }

        async fn pause(&self) -> Result<()> {
            self.pauses.fetch_add(1, Ordering::SeqCst);
            if self.pause_fails {
                Err(AudiobookError::BackendRequest {
                    message: "pause refused".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    const INTERVAL: Duration = Duration::from_secs(15);
    const BUDGET: Duration = Duration::from_secs(600);

    #[test]
    fn parse_known_stages() {
        assert_eq!(SpaceStage::parse("RUNNING"), SpaceStage::Running);
        assert_eq!(SpaceStage::parse("paused"), SpaceStage::Paused);
        assert_eq!(SpaceStage::parse("STOPPED"), SpaceStage::Stopped);
        assert_eq!(
            SpaceStage::parse("BUILDING"),
            SpaceStage::Transitioning("BUILDING".to_string())
        );
        assert_eq!(
            SpaceStage::parse("RUNTIME_ERROR"),
            SpaceStage::Error("RUNTIME_ERROR".to_string())
        );
        assert_eq!(
            SpaceStage::parse("NO_APP_FILE"),
            SpaceStage::Error("NO_APP_FILE".to_string())
        );
    }

    #[test]
    fn parse_runtime_document() {
        let body = serde_json::json!({"stage": "RUNNING", "hardware": {"current": "t4-small"}});
        assert_eq!(parse_runtime(&body), Some(SpaceStage::Running));
        assert_eq!(parse_runtime(&serde_json::json!({})), None);
    }

    #[test]
    fn hub_urls() {
        let control = HubSpaceControl::new("https://huggingface.co/", "someone/tts", None);
        assert_eq!(
            control.url("runtime"),
            "https://huggingface.co/api/spaces/someone/tts/runtime"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn running_returns_immediately() {
        let control = ScriptedControl::new(&["RUNNING"]);
        let waited = wait_until_running(&control, INTERVAL, BUDGET, &SilentReporter)
            .await
            .unwrap();
        assert_eq!(waited, Duration::ZERO);
        assert_eq!(control.restarts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn building_twice_then_running_takes_two_intervals() {
        let control = ScriptedControl::new(&["BUILDING", "BUILDING", "RUNNING"]);
        let reporter = CollectingReporter::new();
        let waited = wait_until_running(&control, INTERVAL, BUDGET, &reporter)
            .await
            .unwrap();
        assert_eq!(waited, Duration::from_secs(30));

        let waits = reporter
            .events()
            .into_iter()
            .filter(|e| matches!(e, PipelineEvent::BackendWaiting { .. }))
            .count();
        assert_eq!(waits, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn paused_space_is_restarted() {
        let control = ScriptedControl::new(&["PAUSED", "APP_STARTING", "RUNNING"]);
        let waited = wait_until_running(&control, INTERVAL, BUDGET, &SilentReporter)
            .await
            .unwrap();
        assert_eq!(control.restarts.load(Ordering::SeqCst), 1);
        // restart → APP_STARTING, poll → APP_STARTING, poll → RUNNING
        assert_eq!(waited, Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn never_running_times_out_at_budget() {
        let control = ScriptedControl::new(&["BUILDING"]);
        let start = Instant::now();
        let err = wait_until_running(&control, INTERVAL, BUDGET, &SilentReporter)
            .await
            .unwrap_err();
        let elapsed = start.elapsed();

        assert!(elapsed >= BUDGET, "gave up early after {elapsed:?}");
        assert!(elapsed < BUDGET + INTERVAL, "overshot budget: {elapsed:?}");
        match err {
            AudiobookError::BackendTimeout { last_stage, .. } => {
                assert_eq!(last_stage, "BUILDING")
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn error_stage_fails_without_waiting() {
        let control = ScriptedControl::new(&["BUILDING", "BUILD_ERROR"]);
        let start = Instant::now();
        let err = wait_until_running(&control, INTERVAL, BUDGET, &SilentReporter)
            .await
            .unwrap_err();
        assert!(matches!(err, AudiobookError::BackendFailed { ref stage } if stage == "BUILD_ERROR"));
        assert_eq!(start.elapsed(), INTERVAL);
    }

    fn backend_with(control: ScriptedControl) -> SpaceBackend {
        SpaceBackend::new(
            GradioClient::new("https://someone-tts.hf.space/", None, std::env::temp_dir()),
            Some(Box::new(control)),
            INTERVAL,
            BUDGET,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn ensure_ready_is_idempotent_and_release_pauses_once() {
        let mut backend = backend_with(ScriptedControl::new(&["RUNNING"]));
        let first = backend.ensure_ready(&SilentReporter).await.unwrap();
        let second = backend.ensure_ready(&SilentReporter).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.endpoint, "https://someone-tts.hf.space");

        assert_eq!(backend.release(false).await.unwrap(), Released::Paused);
        assert_eq!(backend.release(false).await.unwrap(), Released::Nothing);
    }

    #[tokio::test(start_paused = true)]
    async fn keep_alive_skips_pause() {
        let mut backend = backend_with(ScriptedControl::new(&["RUNNING"]));
        backend.ensure_ready(&SilentReporter).await.unwrap();
        assert_eq!(backend.release(true).await.unwrap(), Released::KeptWarm);
    }

    #[tokio::test(start_paused = true)]
    async fn release_before_ready_does_nothing() {
        let mut backend = backend_with(ScriptedControl::new(&["RUNTIME_ERROR"]));
        assert!(backend.ensure_ready(&SilentReporter).await.is_err());
        assert_eq!(backend.release(false).await.unwrap(), Released::Nothing);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_failure_is_reported_as_error() {
        let mut control = ScriptedControl::new(&["RUNNING"]);
        control.pause_fails = true;
        let mut backend = backend_with(control);
        backend.ensure_ready(&SilentReporter).await.unwrap();
        assert!(backend.release(false).await.is_err());
    }
}
