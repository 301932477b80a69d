//! Interrupting a conversion while the local TTS server is working.
#![cfg(feature = "local-server")]

use audiobooker::assemble::Assembler;
use audiobooker::backend::Released;
use audiobooker::backend::local::LocalBackend;
use audiobooker::book::{BookSource, MemoryBook};
use audiobooker::config::VoiceConfig;
use audiobooker::output::{CollectingReporter, PipelineEvent};
use audiobooker::{CommandExecutor, Pipeline, PipelineConfig, Result};
use axum::Json;
use axum::routing::post;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

struct NoMux;

impl CommandExecutor for NoMux {
    fn execute(&self, _command: &str, _args: &[&str]) -> Result<String> {
        panic!("assembly must not run after an interrupt");
    }
}

/// TTS server that accepts a request and never answers it.
///
/// Each request's reference URL is sent on `seen`.
async fn stalled_tts_server(seen: mpsc::UnboundedSender<String>) -> String {
    let app = axum::Router::new().route(
        "/synthesize",
        post(move |Json(body): Json<Value>| {
            let seen = seen.clone();
            async move {
                let reference = body["reference_url"].as_str().unwrap_or_default();
                let _ = seen.send(reference.to_string());
                std::future::pending::<Json<Value>>().await
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn interrupt_mid_chapter_releases_backend_and_stops_reference_server() {
    let dir = tempfile::tempdir().unwrap();
    let reference = dir.path().join("narrator.wav");
    std::fs::write(&reference, b"RIFF narrator").unwrap();

    let (seen, mut requests) = mpsc::unbounded_channel();
    let endpoint = stalled_tts_server(seen).await;

    let reporter = Arc::new(CollectingReporter::new());
    let mut pipeline = Pipeline::new(
        PipelineConfig {
            output_root: dir.path().join("books"),
            voice: VoiceConfig {
                voice: reference.display().to_string(),
                ..VoiceConfig::default()
            },
            keep_warm: false,
        },
        LocalBackend::new(&endpoint, &reference),
        Assembler::new(NoMux, "64k", "2026-10-17"),
        reporter.clone(),
    );

    let book = MemoryBook::new("Stalled", "Author").with_document(
        "<html><head><title>One</title></head><body><p>Never finishes.</p></body></html>",
    );
    let mut sources: Vec<Box<dyn BookSource>> = vec![Box::new(book)];

    // Fires once the first chapter is in flight
    let reference_url = Arc::new(Mutex::new(None));
    let interrupt = {
        let reference_url = Arc::clone(&reference_url);
        async move {
            let url = requests.recv().await;
            *reference_url.lock().unwrap() = url;
        }
    };

    let outcome = pipeline
        .convert_all_until(&mut sources, interrupt)
        .await
        .unwrap();
    assert!(outcome.is_none());

    assert!(reporter.events().iter().any(|e| matches!(
        e,
        PipelineEvent::BackendReleased(Released::Shutdown)
    )));
    let url = reference_url.lock().unwrap().clone().unwrap();
    assert!(url.starts_with("http://127.0.0.1:"));
    assert!(reqwest::get(&url).await.is_err());

    assert!(
        !dir.path()
            .join("books")
            .join("Stalled")
            .join("1 - One.wav")
            .exists()
    );
}
