//! Local TTS server with a reference voice file.
//!
//! The reference audio is exposed to the TTS server over a throwaway HTTP
//! file server bound to `127.0.0.1:0`. The file server runs on its own
//! thread with its own runtime and lives exactly as long as the backend
//! holds it: `release` stops it, and so does dropping the backend.

use crate::backend::{AudioArtifact, Backend, BackendHandle, Released};
use crate::config::VoiceConfig;
use crate::error::{AudiobookError, Result};
use crate::output::{PipelineEvent, Reporter};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::oneshot;

/// HTTP server for a single file, stopped on drop.
pub struct ReferenceServer {
    url: String,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<std::io::Result<()>>>,
}

impl ReferenceServer {
    /// Serve `file` on an ephemeral loopback port.
    pub fn start(file: &Path) -> Result<Self> {
        let listener = std::net::TcpListener::bind(("127.0.0.1", 0))?;
        listener.set_nonblocking(true)?;
        let addr: SocketAddr = listener.local_addr()?;

        let extension = file
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or(crate::defaults::ARTIFACT_EXTENSION);
        let route = format!("/reference.{extension}");
        let url = format!("http://{addr}{route}");

        let router = axum::Router::new()
            .route_service(&route, tower_http::services::ServeFile::new(file));
        let (shutdown, stopped) = oneshot::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("reference-server".to_string())
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()?;
                runtime.block_on(async move {
                    let listener = tokio::net::TcpListener::from_std(listener)?;
                    axum::serve(listener, router)
                        .with_graceful_shutdown(async move {
                            // A dropped sender also means stop
                            let _ = stopped.await;
                        })
                        .await
                })
            })?;

        Ok(Self {
            url,
            shutdown: Some(shutdown),
            thread: Some(thread),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Stop serving and wait for the server thread. Idempotent.
    pub fn stop(&mut self) -> Result<()> {
        if let Some(shutdown) = self.shutdown.take() {
            // Err only if the server already exited
            let _ = shutdown.send(());
        }
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        match thread.join() {
            Ok(result) => result.map_err(AudiobookError::from),
            Err(_) => Err(AudiobookError::Other(
                "reference server thread panicked".to_string(),
            )),
        }
    }
}

impl Drop for ReferenceServer {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            eprintln!("audiobooker: failed to stop reference server: {e}");
        }
    }
}

#[derive(Debug, Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    voice: &'a str,
    reference_url: Option<&'a str>,
    diffusion_steps: u32,
    embedding_scale: f32,
    alpha: f32,
    beta: f32,
    seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SynthesisResponse {
    audio: String,
}

/// Voice-cloning backend: local TTS server plus reference file server.
pub struct LocalBackend {
    client: reqwest::Client,
    endpoint: String,
    reference_file: PathBuf,
    server: Option<ReferenceServer>,
    handle: Option<BackendHandle>,
}

impl LocalBackend {
    pub fn new(endpoint: &str, reference_file: &Path) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            reference_file: reference_file.to_path_buf(),
            server: None,
            handle: None,
        }
    }

    /// Any HTTP response counts as reachable.
    async fn probe(&self) -> Result<()> {
        self.client
            .get(&self.endpoint)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map(|_| ())
            .map_err(|e| AudiobookError::BackendRequest {
                message: format!("local TTS server {} is not reachable: {e}", self.endpoint),
            })
    }
}

#[async_trait::async_trait]
impl Backend for LocalBackend {
    fn name(&self) -> &str {
        "local"
    }

    async fn ensure_ready(&mut self, reporter: &dyn Reporter) -> Result<BackendHandle> {
        if let Some(handle) = &self.handle {
            return Ok(handle.clone());
        }
        if !self.reference_file.is_file() {
            return Err(AudiobookError::ConfigInvalidValue {
                key: "voice".to_string(),
                message: format!(
                    "reference file {} does not exist",
                    self.reference_file.display()
                ),
            });
        }

        self.probe().await?;
        let server = ReferenceServer::start(&self.reference_file)?;
        let handle = BackendHandle {
            endpoint: self.endpoint.clone(),
            voice_reference_url: Some(server.url().to_string()),
        };
        self.server = Some(server);
        self.handle = Some(handle.clone());

        reporter.report(&PipelineEvent::BackendReady {
            endpoint: handle.endpoint.clone(),
            waited: Duration::ZERO,
        });
        Ok(handle)
    }

    async fn synthesize(
        &self,
        handle: &BackendHandle,
        text: &str,
        voice: &VoiceConfig,
    ) -> Result<AudioArtifact> {
        let url = format!("{}/synthesize", handle.endpoint);
        let request = SynthesisRequest {
            text,
            voice: &voice.voice,
            reference_url: handle.voice_reference_url.as_deref(),
            diffusion_steps: voice.diffusion_steps,
            embedding_scale: voice.embedding_scale,
            alpha: voice.alpha,
            beta: voice.beta,
            seed: voice.seed,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AudiobookError::BackendRequest {
                message: format!("{url}: {e}"),
            })?;

        if !response.status().is_success() {
            return Err(AudiobookError::BackendRequest {
                message: format!("{url} returned status {}", response.status()),
            });
        }

        let body: SynthesisResponse =
            response
                .json()
                .await
                .map_err(|e| AudiobookError::BackendRequest {
                    message: format!("{url}: unreadable response: {e}"),
                })?;
        Ok(AudioArtifact::Encoded(body.audio))
    }

    async fn release(&mut self, _keep_alive: bool) -> Result<Released> {
        let had_handle = self.handle.take().is_some();
        match self.server.take() {
            Some(mut server) => server.stop().map(|_| Released::Shutdown),
            None if had_handle => Ok(Released::Shutdown),
            None => Ok(Released::Nothing),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::SilentReporter;
    use axum::Json;
    use axum::routing::post;
    use base64::Engine;
    use std::io::Write;

    fn reference_file(dir: &Path) -> PathBuf {
        let path = dir.join("narrator.wav");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"RIFF reference voice").unwrap();
        path
    }

    #[tokio::test]
    async fn serves_the_reference_file_until_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let path = reference_file(dir.path());

        let mut server = ReferenceServer::start(&path).unwrap();
        assert!(server.url().starts_with("http://127.0.0.1:"));
        assert!(server.url().ends_with("/reference.wav"));

        let body = reqwest::get(server.url()).await.unwrap().bytes().await.unwrap();
        assert_eq!(&body[..], b"RIFF reference voice");

        let url = server.url().to_string();
        server.stop().unwrap();
        server.stop().unwrap();
        assert!(reqwest::get(&url).await.is_err());
    }

    #[tokio::test]
    async fn drop_stops_the_server() {
        let dir = tempfile::tempdir().unwrap();
        let path = reference_file(dir.path());

        let url = {
            let server = ReferenceServer::start(&path).unwrap();
            server.url().to_string()
        };
        assert!(reqwest::get(&url).await.is_err());
    }

    fn unused_endpoint() -> String {
        let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn unreachable_endpoint_fails_before_serving() {
        let dir = tempfile::tempdir().unwrap();
        let path = reference_file(dir.path());

        let mut backend = LocalBackend::new(&unused_endpoint(), &path);
        let err = backend.ensure_ready(&SilentReporter).await.unwrap_err();
        assert!(matches!(err, AudiobookError::BackendRequest { .. }));
        assert!(backend.server.is_none());
        assert_eq!(backend.release(false).await.unwrap(), Released::Nothing);
    }

    #[tokio::test]
    async fn missing_reference_file_is_a_config_error() {
        let mut backend = LocalBackend::new(&unused_endpoint(), Path::new("/nonexistent/voice.wav"));
        let err = backend.ensure_ready(&SilentReporter).await.unwrap_err();
        assert!(matches!(err, AudiobookError::ConfigInvalidValue { .. }));
    }

    async fn fake_tts_server() -> String {
        async fn synthesize(Json(body): Json<serde_json::Value>) -> Json<serde_json::Value> {
            let reference = body["reference_url"].as_str().unwrap_or_default();
            let audio = base64::engine::general_purpose::STANDARD
                .encode(format!("{}|{}", body["text"].as_str().unwrap_or_default(), reference));
            Json(serde_json::json!({ "audio": audio }))
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = axum::Router::new().route("/synthesize", post(synthesize));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn synthesizes_with_reference_url_and_shuts_down() {
        let dir = tempfile::tempdir().unwrap();
        let path = reference_file(dir.path());
        let endpoint = fake_tts_server().await;

        let mut backend = LocalBackend::new(&endpoint, &path);
        let handle = backend.ensure_ready(&SilentReporter).await.unwrap();
        let again = backend.ensure_ready(&SilentReporter).await.unwrap();
        assert_eq!(handle, again);
        let reference_url = handle.voice_reference_url.clone().unwrap();

        let voice = VoiceConfig {
            voice: path.display().to_string(),
            ..VoiceConfig::default()
        };
        let artifact = backend.synthesize(&handle, "Hello", &voice).await.unwrap();
        let AudioArtifact::Encoded(audio) = artifact else {
            panic!("expected encoded audio");
        };
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(audio)
            .unwrap();
        assert_eq!(
            String::from_utf8(decoded).unwrap(),
            format!("Hello|{reference_url}")
        );

        assert_eq!(backend.release(false).await.unwrap(), Released::Shutdown);
        assert_eq!(backend.release(false).await.unwrap(), Released::Nothing);
        assert!(reqwest::get(&reference_url).await.is_err());
    }
}
