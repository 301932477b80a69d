use anyhow::{Context, Result};
use audiobooker::app::{Overrides, ctrl_c, run_assemble, run_chapters, run_convert};
use audiobooker::cli::{Cli, Commands, ConfigAction};
use audiobooker::config::Config;
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None => {
            if cli.books.is_empty() {
                Cli::command().print_help()?;
                std::process::exit(2);
            }
            if !cli.quiet && cli.verbose >= 1 {
                eprintln!("audiobooker {}", audiobooker::version_string().dimmed());
            }
            let mut config = load_config(cli.config.as_deref())?;
            Overrides {
                voice: cli.voice,
                endpoint: cli.endpoint,
                space_id: cli.space,
                output_dir: cli.output_dir,
                keep_warm: cli.keep_warm,
                poll_interval: cli.poll_interval,
                ready_timeout: cli.ready_timeout,
                publication_date: cli.date,
            }
            .apply(&mut config);

            let reports = run_convert(config, &cli.books, cli.quiet, cli.verbose, ctrl_c())
                .await
                .unwrap_or_else(|e| fail(e));
            for report in reports.unwrap_or_default() {
                println!("{}", report.audiobook.path.display());
            }
        }
        Some(Commands::Chapters { book }) => {
            let config = load_with_output_overrides(&cli.config, cli.output_dir, cli.date)?;
            let plan = run_chapters(&config, &book).unwrap_or_else(|e| fail(e));

            println!("{} by {}", plan.title.bold(), plan.author);
            println!("Working directory: {}", plan.working_dir.display());
            for chapter in &plan.chapters {
                let name = chapter
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                if chapter.done {
                    println!("  {} {name}  {}", "●".green(), "(done)".dimmed());
                } else {
                    println!("  {} {name}", "○".dimmed());
                }
            }
        }
        Some(Commands::Assemble { book }) => {
            let config = load_with_output_overrides(&cli.config, cli.output_dir, cli.date)?;
            let path = run_assemble(&config, &book, cli.quiet, cli.verbose)
                .unwrap_or_else(|e| fail(e));
            println!("{}", path.display());
        }
        Some(Commands::Config { action }) => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "audiobooker",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Print a fatal error in red and exit nonzero.
fn fail(e: audiobooker::AudiobookError) -> ! {
    eprintln!("{}", format!("Error: {e}").red());
    std::process::exit(1);
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/audiobooker/config.toml)
/// 3. Built-in defaults with environment variable overrides
fn load_config(custom_path: Option<&std::path::Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path).with_context(|| format!("loading {}", path.display()))?
    } else {
        let default_path = Config::default_path();
        Config::load_or_default(&default_path)
            .with_context(|| format!("loading {}", default_path.display()))?
    };

    Ok(config.with_env_overrides())
}

fn load_with_output_overrides(
    custom_path: &Option<std::path::PathBuf>,
    output_dir: Option<std::path::PathBuf>,
    date: Option<String>,
) -> Result<Config> {
    let mut config = load_config(custom_path.as_deref())?;
    Overrides {
        output_dir,
        publication_date: date,
        ..Overrides::default()
    }
    .apply(&mut config);
    Ok(config)
}

/// Handle configuration commands.
fn handle_config_command(
    action: ConfigAction,
    custom_path: Option<&std::path::Path>,
) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let mut config = load_config(custom_path)?;
            if config.backend.token.is_some() {
                config.backend.token = Some("<redacted>".to_string());
            }
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Path => {
            let path = custom_path
                .map(std::path::PathBuf::from)
                .unwrap_or_else(Config::default_path);
            println!("{}", path.display());
            if !path.exists() {
                eprintln!("{}", "(not present; built-in defaults apply)".dimmed());
            }
        }
    }
    Ok(())
}
