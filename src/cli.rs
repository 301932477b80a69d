//! Command-line interface for audiobooker
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

/// Turn EPUB books into chaptered M4B audiobooks
#[derive(Parser, Debug)]
#[command(
    name = "audiobooker",
    version,
    about = "Turn EPUB books into chaptered M4B audiobooks",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// EPUB files to convert, in order
    #[arg(value_name = "BOOK")]
    pub books: Vec<PathBuf>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: backend polling, -vv: stage transitions)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Voice preset (f-us-1..4, m-us-1..4), label, or reference audio file
    #[arg(long, value_name = "VOICE")]
    pub voice: Option<String>,

    /// Leave the Space running after the last book
    #[arg(long)]
    pub keep_warm: bool,

    /// Gradio app URL of the TTS backend
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,

    /// HuggingFace Space id (user/space) to restart and pause
    #[arg(long, value_name = "ID")]
    pub space: Option<String>,

    /// Directory that receives the per-book working directories
    #[arg(long, short = 'o', global = true, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Space status poll interval. Examples: 15s, 1m
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub poll_interval: Option<Duration>,

    /// Give up if the Space is not running after this long. Examples: 10m, 1h
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub ready_timeout: Option<Duration>,

    /// Publication date tag (default: today)
    #[arg(long, global = true, value_name = "DATE")]
    pub date: Option<String>,
}

/// Parse a duration string.
///
/// Supports any duration format accepted by `humantime`: bare numbers (seconds),
/// single-unit (`30s`, `5m`, `2h`), and compound (`1h30m`, `2m30s`).
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    // Bare number → seconds
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the chapters a conversion would synthesize, without a backend
    Chapters {
        /// EPUB file
        book: PathBuf,
    },

    /// Bind the chapter audio already in a book's working directory
    Assemble {
        /// EPUB file the working directory belongs to
        book: PathBuf,
    },

    /// View configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_books() {
        let cli = Cli::try_parse_from(["audiobooker", "a.epub", "b.epub"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(
            cli.books,
            vec![PathBuf::from("a.epub"), PathBuf::from("b.epub")]
        );
        assert!(!cli.keep_warm);
        assert!(cli.voice.is_none());
        assert!(!cli.quiet);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_parse_no_arguments() {
        let cli = Cli::try_parse_from(["audiobooker"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.books.is_empty());
    }

    #[test]
    fn test_parse_convert_options() {
        let cli = Cli::try_parse_from([
            "audiobooker",
            "--voice",
            "m-us-3",
            "--keep-warm",
            "--space",
            "someone/tts",
            "--poll-interval",
            "30s",
            "--ready-timeout",
            "20m",
            "-o",
            "/tmp/books",
            "book.epub",
        ])
        .unwrap();

        assert_eq!(cli.voice.as_deref(), Some("m-us-3"));
        assert!(cli.keep_warm);
        assert_eq!(cli.space.as_deref(), Some("someone/tts"));
        assert_eq!(cli.poll_interval, Some(Duration::from_secs(30)));
        assert_eq!(cli.ready_timeout, Some(Duration::from_secs(1200)));
        assert_eq!(cli.output_dir, Some(PathBuf::from("/tmp/books")));
    }

    #[test]
    fn test_parse_verbose_double() {
        let cli = Cli::try_parse_from(["audiobooker", "-vv", "book.epub"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_parse_chapters_command() {
        let cli = Cli::try_parse_from(["audiobooker", "chapters", "book.epub"]).unwrap();
        match cli.command {
            Some(Commands::Chapters { book }) => assert_eq!(book, PathBuf::from("book.epub")),
            other => panic!("Expected Chapters command, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_assemble_with_global_options() {
        let cli = Cli::try_parse_from([
            "audiobooker",
            "assemble",
            "book.epub",
            "--date",
            "2026-01-01",
            "-q",
        ])
        .unwrap();
        assert!(matches!(cli.command, Some(Commands::Assemble { .. })));
        assert_eq!(cli.date.as_deref(), Some("2026-01-01"));
        assert!(cli.quiet);
    }

    #[test]
    fn test_parse_config_show() {
        let cli = Cli::try_parse_from(["audiobooker", "config", "show"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Config {
                action: ConfigAction::Show
            })
        ));
    }

    #[test]
    fn test_parse_completions() {
        let cli = Cli::try_parse_from(["audiobooker", "completions", "bash"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Completions { shell: Shell::Bash })
        ));
    }

    #[test]
    fn test_parse_duration_formats() {
        assert_eq!(parse_duration("15"), Ok(Duration::from_secs(15)));
        assert_eq!(parse_duration("2m30s"), Ok(Duration::from_secs(150)));
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_invalid_duration_rejected() {
        let result = Cli::try_parse_from(["audiobooker", "--poll-interval", "soon", "b.epub"]);
        assert!(result.is_err());
    }
}
