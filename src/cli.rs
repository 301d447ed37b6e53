//! CLI parsing and orchestration. Resolves settings (flags, then config, then defaults), runs the
//! archive/convert/list/delete/sites commands and maps errors to exit codes.

use crate::archive::{
    archive_work, convert_work, ArchiveError, ArchiveOptions, ConvertOptions, DEFAULT_AUTHOR,
    DEFAULT_CHAPTER_DELAY,
};
use crate::config::{self, Config};
use crate::repository::{Repository, RepositoryError};
use crate::scraper::{HttpClient, ParserRegistry, Site};
use clap::{ArgAction, Parser, Subcommand};
use std::cell::RefCell;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Archive(#[from] ArchiveError),

    #[error("{0}")]
    Repository(#[from] RepositoryError),
}

impl CliRunError {
    /// 1: bad input or config. 2: the source site failed. 3: storage or packaging failed.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) => 1,
            CliRunError::Archive(e) => match e {
                ArchiveError::Resolve { .. } => 1,
                ArchiveError::WorkPage { .. } | ArchiveError::Chapter { .. } => 2,
                ArchiveError::Storage { source, .. } if source.is_input_error() => 1,
                ArchiveError::Storage { .. } | ArchiveError::Package { .. } => 3,
            },
            CliRunError::Repository(e) if e.is_input_error() => 1,
            CliRunError::Repository(_) => 3,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "novel-archiver", version)]
#[command(about = "Archive web novels chapter by chapter and convert them to EPUB")]
#[command(
    after_help = "Config file keys (library_dir, user_agent, chapter_delay_ms, timeout_secs, author, pretty) are read from ./novel-archiver.toml or <config dir>/novel-archiver/config.toml. CLI flags override config."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Library directory holding archived works (overrides config).
    #[arg(long, global = true)]
    pub library: Option<PathBuf>,

    /// HTTP User-Agent (overrides config).
    #[arg(long, global = true)]
    pub user_agent: Option<String>,

    /// Request timeout in seconds (overrides config; default 30).
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Suppress progress output (errors only).
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// More logging; repeat for debug output. Also prints the full error chain.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Archive a work from its index page URL. Prints the work title.
    Archive {
        url: String,

        /// Continue an existing archive, skipping chapters already saved.
        #[arg(long)]
        resume: bool,

        /// Pause after each chapter in milliseconds (overrides config; default 1000).
        #[arg(long)]
        delay_ms: Option<u64>,

        /// Keep chapter markup as extracted instead of indenting it.
        #[arg(long)]
        no_pretty: bool,

        /// Convert to EPUB once archiving finishes.
        #[arg(long)]
        convert: bool,

        /// Author for --convert (overrides config).
        #[arg(long, requires = "convert")]
        author: Option<String>,
    },

    /// Package an archived work as EPUB. Prints the output path.
    Convert {
        title: String,

        /// Author written into the package (overrides config; default "Unknown").
        #[arg(long)]
        author: Option<String>,

        /// Output path. Default: <library>/<title>/<title>.epub
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List archived works.
    List,

    /// Delete an archived work.
    Delete { title: String },

    /// List supported sites and their hosts.
    Sites,
}

/// Install the stderr log subscriber. `RUST_LOG` wins; otherwise the level follows -q/-v.
pub fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn library_dir(args: &Args, config: Option<&Config>) -> PathBuf {
    args.library
        .clone()
        .or_else(|| config.and_then(|c| c.library_dir.clone()))
        .unwrap_or_else(config::default_library_dir)
}

fn convert_options(author: Option<&str>, output: Option<PathBuf>, config: Option<&Config>) -> ConvertOptions {
    let author = author
        .map(str::to_string)
        .or_else(|| config.and_then(|c| c.author.clone()))
        .unwrap_or_else(|| DEFAULT_AUTHOR.to_string());
    ConvertOptions {
        author,
        output,
        ..Default::default()
    }
}

fn http_client(args: &Args, config: Option<&Config>) -> Result<HttpClient, CliRunError> {
    let mut builder = HttpClient::builder();
    if let Some(ua) = args
        .user_agent
        .clone()
        .or_else(|| config.and_then(|c| c.user_agent.clone()))
    {
        builder = builder.user_agent(ua);
    }
    if let Some(secs) = args.timeout.or_else(|| config.and_then(|c| c.timeout_secs)) {
        builder = builder.timeout_secs(secs);
    }
    builder
        .build()
        .map_err(|e| CliRunError::InvalidInput(format!("Failed to create HTTP client: {}", e)))
}

fn progress_bar(total: usize) -> indicatif::ProgressBar {
    let bar = indicatif::ProgressBar::new(total as u64);
    match indicatif::ProgressStyle::default_bar()
        .template("{spinner} {msg} [{bar:40}] {pos}/{len} ({elapsed})")
    {
        Ok(style) => bar.set_style(
            style
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                .progress_chars("█▉▊▋▌▍▎▏ "),
        ),
        Err(e) => debug!(error = %e, "progress template rejected; using default style"),
    }
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

/// Entry point for the CLI. Output meant for scripts (titles, paths) goes to stdout.
pub fn run(args: &Args) -> Result<(), CliRunError> {
    let config = config::load_config().map_err(CliRunError::InvalidInput)?;
    let config = config.as_ref();
    let library = library_dir(args, config);
    debug!(library = %library.display(), "using library");

    match &args.command {
        Command::Archive {
            url,
            resume,
            delay_ms,
            no_pretty,
            convert,
            author,
        } => {
            let repo = Repository::open(&library)?;
            let mut client = http_client(args, config)?;
            let registry = ParserRegistry::default();

            let delay = delay_ms
                .or_else(|| config.and_then(|c| c.chapter_delay_ms))
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_CHAPTER_DELAY);
            let pretty = !no_pretty && config.and_then(|c| c.pretty).unwrap_or(true);

            let progress_state: RefCell<Option<indicatif::ProgressBar>> = RefCell::new(None);
            let progress_cb = |n: usize, total: usize, _chapter: &str| {
                if total == 0 {
                    return;
                }
                let mut state = progress_state.borrow_mut();
                let pb = state.get_or_insert_with(|| progress_bar(total));
                pb.set_position(n as u64);
                pb.set_message(format!("Archiving chapter {}/{}", n, total));
            };
            let progress: Option<&dyn Fn(usize, usize, &str)> =
                if args.quiet { None } else { Some(&progress_cb) };
            let options = ArchiveOptions {
                delay,
                pretty,
                resume: *resume,
                progress,
            };

            let result = archive_work(url, &registry, &mut client, &repo, &options);
            if let Some(pb) = progress_state.borrow_mut().take() {
                pb.disable_steady_tick();
                pb.finish_and_clear();
            }
            let title = result?;
            println!("{}", title);

            if *convert {
                let path = convert_work(&repo, &title, &convert_options(author.as_deref(), None, config))?;
                println!("{}", path.display());
            }
        }
        Command::Convert {
            title,
            author,
            output,
        } => {
            if let Some(parent) = output.as_ref().and_then(|p| p.parent()) {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    return Err(CliRunError::InvalidInput(format!(
                        "Cannot write output: {}: parent directory does not exist.",
                        parent.display()
                    )));
                }
            }
            let repo = Repository::open(&library)?;
            let path = convert_work(&repo, title, &convert_options(author.as_deref(), output.clone(), config))?;
            println!("{}", path.display());
        }
        Command::List => {
            let repo = Repository::open(&library)?;
            for work in repo.list_works()? {
                println!("{}", work);
            }
        }
        Command::Delete { title } => {
            let repo = Repository::open(&library)?;
            repo.delete_work(title)?;
            if !args.quiet {
                eprintln!("Deleted \"{}\"", title);
            }
        }
        Command::Sites => {
            for site in Site::ALL {
                println!("{}\t{}", site.name(), site.hosts().join(", "));
            }
        }
    }
    Ok(())
}
