//! Error types for audiobooker.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AudiobookError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Input errors
    #[error("Failed to open book {path}: {message}")]
    BookOpen { path: String, message: String },

    #[error("Book '{title}' has no chapters with text to narrate")]
    NoChapters { title: String },

    // Backend availability errors
    #[error("TTS backend entered stage {stage}; giving up")]
    BackendFailed { stage: String },

    #[error("TTS backend not running after {}s (last stage: {last_stage})", .waited.as_secs())]
    BackendTimeout { waited: Duration, last_stage: String },

    #[error("TTS backend request failed: {message}")]
    BackendRequest { message: String },

    // Synthesis errors
    #[error("Synthesis of chapter {chapter} failed: {message}")]
    Synthesis { chapter: String, message: String },

    // Assembly errors
    #[error("Assembly tool not found: {tool}")]
    AssemblyToolNotFound { tool: String },

    #[error("Audiobook assembly failed: {message}")]
    Assembly { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, AudiobookError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_config_file_not_found_display() {
        let error = AudiobookError::ConfigFileNotFound {
            path: "/path/to/config.toml".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Configuration file not found at /path/to/config.toml"
        );
    }

    #[test]
    fn test_config_invalid_value_display() {
        let error = AudiobookError::ConfigInvalidValue {
            key: "backend.poll_interval_secs".to_string(),
            message: "must be positive".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid configuration value for backend.poll_interval_secs: must be positive"
        );
    }

    #[test]
    fn test_no_chapters_display() {
        let error = AudiobookError::NoChapters {
            title: "Empty_Book".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Book 'Empty_Book' has no chapters with text to narrate"
        );
    }

    #[test]
    fn test_backend_failed_names_stage() {
        let error = AudiobookError::BackendFailed {
            stage: "RUNTIME_ERROR".to_string(),
        };
        assert!(error.to_string().contains("RUNTIME_ERROR"));
    }

    #[test]
    fn test_backend_timeout_display() {
        let error = AudiobookError::BackendTimeout {
            waited: Duration::from_secs(600),
            last_stage: "BUILDING".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "TTS backend not running after 600s (last stage: BUILDING)"
        );
    }

    #[test]
    fn test_synthesis_display() {
        let error = AudiobookError::Synthesis {
            chapter: "3 - Ch3.wav".to_string(),
            message: "empty response".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Synthesis of chapter 3 - Ch3.wav failed: empty response"
        );
    }

    #[test]
    fn test_assembly_tool_not_found_display() {
        let error = AudiobookError::AssemblyToolNotFound {
            tool: "ffmpeg".to_string(),
        };
        assert_eq!(error.to_string(), "Assembly tool not found: ffmpeg");
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: AudiobookError = io_error.into();
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_error = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let error: AudiobookError = toml_error.into();
        assert!(error.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_error_source_chain_io() {
        let io_error = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let error: AudiobookError = io_error.into();

        let error_trait: &dyn std::error::Error = &error;
        assert!(error_trait.source().is_some());
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<AudiobookError>();
        assert_sync::<AudiobookError>();
    }
}
