//! Default configuration constants for audiobooker.
//!
//! Shared by the config layer, the backends and the CLI so that every entry
//! point agrees on the same values.

/// Default voice: a StyleTTS 2 multi-voice preset.
pub const DEFAULT_VOICE: &str = "f-us-2";

/// Voice tags understood by the multi-voice synthesis entry point.
///
/// Any other voice identifier routes to the long-form single-voice entry
/// point and is kept only as a label.
pub const VOICE_PRESETS: &[&str] = &[
    "f-us-1", "f-us-2", "f-us-3", "f-us-4", "m-us-1", "m-us-2", "m-us-3", "m-us-4",
];

/// Gradio API name for the multi-voice entry point.
pub const MULTI_VOICE_API: &str = "/synthesize";

/// Gradio API name for the long-form single-voice entry point.
pub const LONG_FORM_API: &str = "/ljsynthesize";

/// Diffusion steps sent with every request.
///
/// 3 is the cheapest setting the model accepts (range 3..=15) and is plenty
/// for narration.
pub const DIFFUSION_STEPS: u32 = 3;

/// Style mixing weights for reference-voice synthesis.
pub const ALPHA: f32 = 0.3;
pub const BETA: f32 = 0.7;

/// Embedding scale for reference-voice synthesis.
pub const EMBEDDING_SCALE: f32 = 1.0;

/// Interval between Space runtime polls while waiting for RUNNING.
pub const POLL_INTERVAL_SECS: u64 = 15;

/// Total time budget for a Space to reach RUNNING.
pub const READY_TIMEOUT_SECS: u64 = 600;

/// HuggingFace Hub base URL for Space control calls.
pub const HUB_API_URL: &str = "https://huggingface.co";

/// Local TTS server endpoint used with a reference voice file.
pub const LOCAL_ENDPOINT: &str = "http://127.0.0.1:8000";

/// Placeholder title for content units without `<title>` or `<h1>`.
///
/// Already in sanitized form so it survives sanitization unchanged.
pub const UNTITLED: &str = "untitled_temp";

/// Appended to every paragraph as a pause cue for the synthesizer.
pub const PARAGRAPH_PAUSE: &str = " , ";

/// Fallbacks when the book carries no Dublin Core title/creator.
pub const UNKNOWN_TITLE: &str = "Untitled";
pub const UNKNOWN_AUTHOR: &str = "Unknown";

/// Extension of per-chapter artifacts.
pub const ARTIFACT_EXTENSION: &str = "wav";

/// Extension of the assembled audiobook.
pub const AUDIOBOOK_EXTENSION: &str = "m4b";

/// Subdirectory that receives consumed artifacts after assembly.
pub const BACKUP_DIR: &str = "temp_backup";

/// AAC bitrate for the assembled audiobook. Speech needs little.
pub const AUDIOBOOK_BITRATE: &str = "64k";

/// Returns true if `voice` is one of the multi-voice presets.
pub fn is_voice_preset(voice: &str) -> bool {
    VOICE_PRESETS.contains(&voice)
}
