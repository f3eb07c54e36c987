// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{anyhow, Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use log::{debug, info, warn, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use postlingo::app_config::{self, Config, TranslationProvider};
use postlingo::{JobFilter, JobOrchestrator, JsonContentSource, Repository, RequestOptions, TranslationService};

/// CLI Wrapper for TranslationProvider to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliTranslationProvider {
    OpenAI,
    Anthropic,
    Ollama,
    Mock,
}

impl From<CliTranslationProvider> for TranslationProvider {
    fn from(cli_provider: CliTranslationProvider) -> Self {
        match cli_provider {
            CliTranslationProvider::OpenAI => TranslationProvider::OpenAI,
            CliTranslationProvider::Anthropic => TranslationProvider::Anthropic,
            CliTranslationProvider::Ollama => TranslationProvider::Ollama,
            CliTranslationProvider::Mock => TranslationProvider::Mock,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Translate a post into one or more languages
    Translate(TranslateArgs),

    /// Show the translation jobs of a post
    Status(StatusArgs),

    /// Delete translation jobs
    Delete(DeleteArgs),

    /// Generate shell completions for postlingo
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug)]
struct TranslateArgs {
    /// ID of the post to translate
    #[arg(long = "post")]
    post_id: String,

    /// Target language code, repeatable (e.g., 'fr', 'de')
    #[arg(short, long = "language", required = true)]
    languages: Vec<String>,

    /// Translate again even if a completed translation exists
    #[arg(short, long)]
    regenerate: bool,

    /// Queue the jobs and wait only for the worker to drain
    #[arg(short, long)]
    background: bool,

    /// JSON file with the source posts
    #[arg(long, default_value = "posts.json")]
    posts: PathBuf,
}

#[derive(Args, Debug)]
struct StatusArgs {
    /// ID of the post
    #[arg(long = "post")]
    post_id: String,

    /// Only show this language
    #[arg(short, long)]
    language: Option<String>,

    /// JSON file with the source posts, used to detect stale translations
    #[arg(long, default_value = "posts.json")]
    posts: PathBuf,
}

#[derive(Args, Debug)]
#[command(group(clap::ArgGroup::new("selection").required(true).args(["id", "post_id", "all"])))]
struct DeleteArgs {
    /// Delete one job by ID
    #[arg(long)]
    id: Option<String>,

    /// Delete the jobs of a post
    #[arg(long = "post")]
    post_id: Option<String>,

    /// Restrict a post deletion to one language
    #[arg(short, long, requires = "post_id")]
    language: Option<String>,

    /// Delete every job
    #[arg(long)]
    all: bool,

    /// Only list what would be deleted
    #[arg(long)]
    dry_run: bool,
}

impl DeleteArgs {
    fn filter(&self) -> Result<JobFilter> {
        match (&self.id, &self.post_id, &self.language) {
            (Some(id), _, _) => Ok(JobFilter::id(id)),
            (None, Some(post_id), Some(language)) => Ok(JobFilter::post_language(post_id, language)),
            (None, Some(post_id), None) => Ok(JobFilter::post(post_id)),
            (None, None, _) if self.all => Ok(JobFilter::all()),
            _ => Err(anyhow!("One of --id, --post or --all is required")),
        }
    }
}

/// postlingo - translation pipeline for travel blog posts
///
/// Translates posts into other languages through AI providers and keeps
/// track of every (post, language) translation job.
#[derive(Parser, Debug)]
#[command(name = "postlingo")]
#[command(version = "0.1.0")]
#[command(about = "AI-powered translation pipeline for blog posts")]
#[command(long_about = "postlingo translates blog posts with AI providers and stores the results as jobs.

EXAMPLES:
    postlingo translate --post 42 -l fr -l de          # Translate post 42 into French and German
    postlingo translate --post 42 -l fr --regenerate   # Translate again, replacing the stored result
    postlingo -p mock translate --post 42 -l fr        # Dry run with the offline mock provider
    postlingo status --post 42                         # Show every job of post 42
    postlingo delete --post 42 -l fr --dry-run         # Preview a deletion
    postlingo delete --all                             # Delete every job
    postlingo completions bash > postlingo.bash        # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config. If the config file doesn't exist, a default one
    will be created automatically.

SUPPORTED PROVIDERS:
    openai    - OpenAI API or any compatible endpoint (requires API key)
    anthropic - Anthropic Claude API (requires API key)
    ollama    - Local Ollama server
    mock      - Offline provider that tags its input, for dry runs")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "conf.json")]
    config: String,

    /// Set logging level
    #[arg(long, global = true, value_enum)]
    log_level: Option<CliLogLevel>,

    /// Translation provider to use
    #[arg(short, long, global = true, value_enum)]
    provider: Option<CliTranslationProvider>,

    /// Model name to use for translation
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// API key for the translation provider
    #[arg(long, global = true, env = "POSTLINGO_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Job database file
    #[arg(long, global = true)]
    database: Option<PathBuf>,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI color code for log level
    fn color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "1;31",
            Level::Warn => "1;33",
            Level::Info => "1;32",
            Level::Debug => "1;36",
            Level::Trace => "1;35",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let color = Self::color_for_level(record.level());
            let _ = writeln!(
                std::io::stderr(),
                "\x1B[{}m{} {:<5} {}\x1B[0m",
                color,
                now,
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Trace everything at the logger; the max level does the filtering
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = CommandLineOptions::command();
        generate(*shell, &mut cmd, "postlingo", &mut std::io::stdout());
        return Ok(());
    }

    if let Some(level) = &cli.log_level {
        let level: app_config::LogLevel = level.clone().into();
        log::set_max_level(level.to_level_filter());
    }

    let config = load_config(&cli)?;
    if cli.log_level.is_none() {
        log::set_max_level(config.log_level.to_level_filter());
    }

    match cli.command {
        Commands::Translate(args) => run_translate(&config, args).await,
        Commands::Status(args) => run_status(&config, args).await,
        Commands::Delete(args) => run_delete(&config, args).await,
        Commands::Completions { .. } => Ok(()),
    }
}

/// Load or create the configuration and apply the command line overrides
fn load_config(cli: &CommandLineOptions) -> Result<Config> {
    let config_path = Path::new(&cli.config);
    let mut config = if config_path.exists() {
        Config::from_file(config_path)?
    } else {
        warn!("Config file not found at '{}', creating default config.", cli.config);
        let config = Config::default();
        config.save(config_path)?;
        config
    };

    if let Some(provider) = &cli.provider {
        config.translation.provider = provider.clone().into();
    }
    if let Some(model) = &cli.model {
        config.translation.active_provider_config_mut().model = model.clone();
    }
    if let Some(api_key) = &cli.api_key {
        config.translation.active_provider_config_mut().api_key = api_key.clone();
    }
    if let Some(database) = &cli.database {
        config.database_path = Some(database.clone());
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone().into();
    }

    config.validate().context("Configuration validation failed")?;
    Ok(config)
}

async fn open_repository(config: &Config) -> Result<Repository> {
    let repo = match &config.database_path {
        Some(path) => Repository::open(path)?,
        None => Repository::new_default()?,
    };
    debug!("{}", repo.stats().await?);
    Ok(repo)
}

/// Build an orchestrator over the posts file
async fn build_orchestrator(config: &Config, posts: &Path) -> Result<JobOrchestrator> {
    let repo = open_repository(config).await?;
    let content = JsonContentSource::load(posts)?;
    info!("Loaded {} post(s) from {}", content.len(), posts.display());

    let translator = TranslationService::from_config(config).map_err(|e| anyhow!("{}", e))?;
    Ok(JobOrchestrator::new(repo, Arc::new(content), translator, config)?)
}

async fn run_translate(config: &Config, args: TranslateArgs) -> Result<()> {
    let orchestrator = build_orchestrator(config, &args.posts).await?;

    // Only runs whose owner stopped renewing the lease count as interrupted
    let recovered = orchestrator.recover_interrupted_jobs().await?;
    if recovered > 0 {
        warn!("{} job(s) from an earlier run were interrupted and marked failed", recovered);
    }
    info!(
        "Translating post {} into {} using {}",
        args.post_id,
        args.languages.join(", "),
        config.translation.provider.display_name()
    );

    let options = RequestOptions {
        regenerate: args.regenerate,
        background: args.background,
    };
    let result = orchestrator.request_translation(&args.post_id, &args.languages, options).await;

    // Background jobs finish before the process exits
    orchestrator.shutdown().await;

    let outcomes = result?;
    print_json(&outcomes)?;

    let failed = outcomes.iter().filter(|o| !o.success).count();
    if failed > 0 {
        return Err(anyhow!("{} of {} language(s) failed", failed, outcomes.len()));
    }
    Ok(())
}

async fn run_status(config: &Config, args: StatusArgs) -> Result<()> {
    let orchestrator = build_orchestrator(config, &args.posts).await?;
    let views = match &args.language {
        Some(language) => orchestrator
            .job_status(&args.post_id, language)
            .await?
            .into_iter()
            .collect(),
        None => orchestrator.list_jobs(&args.post_id).await?,
    };
    orchestrator.shutdown().await;
    print_json(&views)
}

async fn run_delete(config: &Config, args: DeleteArgs) -> Result<()> {
    let filter = args.filter()?;
    let repo = open_repository(config).await?;
    let content = postlingo::InMemoryContentSource::new();
    let translator = TranslationService::from_config(config).map_err(|e| anyhow!("{}", e))?;
    let orchestrator = JobOrchestrator::new(repo, Arc::new(content), translator, config)?;

    if args.dry_run {
        let jobs = orchestrator.preview_deletion(&filter).await?;
        info!("{} job(s) would be deleted", jobs.len());
        print_json(&jobs)?;
    } else {
        let report = orchestrator.delete_translation(filter).await?;
        print_json(&report)?;
    }

    orchestrator.shutdown().await;
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}
