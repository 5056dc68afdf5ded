use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use mcpcert_core::{
    client_for, render_report, AnalysisEngine, AnalysisSettings, CertLevel, CriteriaModel,
    EvaluationRequest, Evaluator, FunctionCategory, JsonStore, LocalFetcher, OutputFormat,
    ProfileStore, ReportDoc,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "mcpcert",
    author,
    version,
    about = "Security certification registry for MCP server implementations"
)]
struct Cli {
    /// TOML config file providing [analysis] provider settings
    #[arg(long = "config", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Directory holding the registry collections
    #[arg(
        long = "store-dir",
        value_name = "DIR",
        default_value = "./registry",
        global = true
    )]
    store_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate a local checkout and record the result in the registry
    Evaluate {
        /// Path to the repository checkout
        path: PathBuf,
        /// Canonical repository URL (the registry key)
        #[arg(long)]
        url: String,
        /// Display name; defaults to the last URL segment
        #[arg(long)]
        name: Option<String>,
        /// Primary function; inferred from docs when omitted
        #[arg(long, value_enum)]
        function: Option<FunctionArg>,
        #[arg(long, default_value = "MCP Security Analysis Agent")]
        evaluator: String,
        /// Commit or version identifier being evaluated
        #[arg(long)]
        version: Option<String>,
        #[arg(long, value_enum, default_value_t = Format::Markdown)]
        format: Format,
        /// Write the report here instead of stdout
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
        /// Analysis request timeout, e.g. `90s` or `5m`
        #[arg(long, value_name = "DURATION")]
        timeout: Option<String>,
        /// Skip the model and record a neutral baseline profile
        #[arg(long)]
        offline: bool,
    },
    /// Render the latest stored report for a repository
    Report {
        #[arg(long)]
        url: String,
        #[arg(long, value_enum, default_value_t = Format::Markdown)]
        format: Format,
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Print the certification timeline for a repository
    History {
        #[arg(long)]
        url: String,
        #[arg(long)]
        json: bool,
    },
    /// Show the active evaluation criteria
    Criteria {
        #[arg(long)]
        json: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Format {
    Markdown,
    Json,
    Yaml,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FunctionArg {
    Memory,
    Retrieval,
    Tool,
    General,
}

impl From<FunctionArg> for FunctionCategory {
    fn from(value: FunctionArg) -> Self {
        match value {
            FunctionArg::Memory => FunctionCategory::Memory,
            FunctionArg::Retrieval => FunctionCategory::Retrieval,
            FunctionArg::Tool => FunctionCategory::Tool,
            FunctionArg::General => FunctionCategory::General,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Evaluate {
            ref path,
            ref url,
            ref name,
            function,
            ref evaluator,
            ref version,
            format,
            ref output,
            ref timeout,
            offline,
        } => {
            evaluate(
                &cli,
                path,
                url,
                name.clone(),
                function,
                evaluator,
                version.clone(),
                format,
                output.as_deref(),
                timeout.as_deref(),
                offline,
            )
            .await?
        }
        Commands::Report {
            ref url,
            format,
            ref output,
        } => report(&cli, url, format, output.as_deref()).await?,
        Commands::History { ref url, json } => history(&cli, url, json).await?,
        Commands::Criteria { json } => criteria(json)?,
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn evaluate(
    cli: &Cli,
    path: &Path,
    url: &str,
    name: Option<String>,
    function: Option<FunctionArg>,
    evaluator_name: &str,
    version: Option<String>,
    format: Format,
    output: Option<&Path>,
    timeout: Option<&str>,
    offline: bool,
) -> Result<()> {
    let mut settings = load_settings(cli.config.as_deref(), offline)?;
    let timeout = timeout
        .map(|raw| {
            humantime::parse_duration(raw)
                .with_context(|| format!("invalid --timeout value `{raw}`"))
        })
        .transpose()?;
    if let Some(duration) = timeout {
        settings.timeout_secs = Some(duration.as_secs().max(1));
    }

    let client = client_for(&settings)?;
    let engine = AnalysisEngine::with_retries(client, settings.max_retries);
    let store = JsonStore::new(&cli.store_dir);
    let mut runner = Evaluator::new(LocalFetcher::new(), engine, store);
    if let Some(duration) = timeout {
        runner = runner.with_fetch_timeout(duration);
    }

    let request = EvaluationRequest {
        source: path.display().to_string(),
        url: url.to_string(),
        name,
        primary_function: function.map(FunctionCategory::from),
        evaluator: evaluator_name.to_string(),
        version,
        evaluated_at: None,
    };

    let outcome = runner
        .evaluate(&request)
        .await
        .with_context(|| format!("evaluation failed for {url}"))?;

    eprintln!(
        "Evaluated {} file(s); certification level: {}",
        outcome.files_classified,
        colored_level(outcome.level)
    );

    emit_report(runner.store(), url, format, output).await
}

async fn report(cli: &Cli, url: &str, format: Format, output: Option<&Path>) -> Result<()> {
    let store = JsonStore::new(&cli.store_dir);
    emit_report(&store, url, format, output).await
}

async fn emit_report(
    store: &dyn ProfileStore,
    url: &str,
    format: Format,
    output: Option<&Path>,
) -> Result<()> {
    let repository = store
        .get_repository(url)
        .await?
        .with_context(|| format!("no evaluation found for {url}"))?;
    let profile = store
        .get_latest_profile(repository.id)
        .await?
        .with_context(|| format!("no security profile stored for {url}"))?;
    let history = store.get_history(repository.id).await?;
    let generated_at = Utc::now();

    let rendered = match format {
        Format::Markdown => render_report(
            &profile,
            &repository,
            &history,
            generated_at,
            OutputFormat::Markdown,
        )?,
        Format::Json => render_report(
            &profile,
            &repository,
            &history,
            generated_at,
            OutputFormat::Json,
        )?,
        Format::Yaml => serde_yaml::to_string(&ReportDoc {
            repository: &repository,
            profile: &profile,
            history: &history,
            generated_at,
        })?,
    };

    match output {
        Some(path) => {
            fs::write(path, &rendered)
                .with_context(|| format!("failed to write report to {}", path.display()))?;
            eprintln!("Report written to {}", path.display());
        }
        None => print!("{rendered}"),
    }
    Ok(())
}

async fn history(cli: &Cli, url: &str, json: bool) -> Result<()> {
    let store = JsonStore::new(&cli.store_dir);
    let repository = store
        .get_repository(url)
        .await?
        .with_context(|| format!("no evaluation found for {url}"))?;
    let entries = store.get_history(repository.id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!(
        "{} certification event(s) for {}",
        entries.len(),
        repository.url
    );
    for entry in entries {
        println!(
            "- {date}  {level:<6}  {evaluator} :: {notes}",
            date = entry.date.format("%Y-%m-%d"),
            level = colored_level(entry.level),
            evaluator = entry.evaluator,
            notes = entry.notes
        );
    }
    Ok(())
}

fn criteria(json: bool) -> Result<()> {
    let model = CriteriaModel::v1();
    if json {
        println!("{}", serde_json::to_string_pretty(model)?);
        return Ok(());
    }
    print!("{}", model.rubric_text());
    Ok(())
}

/// Provider settings from environment, optionally overlaid by the config
/// file's `[analysis]` table. `--offline` wins over both.
fn load_settings(config_path: Option<&Path>, offline: bool) -> Result<AnalysisSettings> {
    if offline {
        std::env::set_var("MCPCERT_PROVIDER", "noop");
    }
    let mut settings = AnalysisSettings::from_env()?;

    if let Some(path) = config_path {
        let file = config::Config::builder()
            .add_source(config::File::from(path.to_path_buf()))
            .build()
            .with_context(|| format!("failed to load config file {}", path.display()))?;

        if !offline {
            if let Ok(provider) = file.get_string("analysis.provider") {
                settings.provider = provider;
            }
        }
        if let Ok(model) = file.get_string("analysis.model") {
            settings.model = Some(model);
        }
        if let Ok(endpoint) = file.get_string("analysis.endpoint") {
            settings.endpoint = Some(endpoint);
        }
        if settings.api_key.is_empty() {
            if let Ok(api_key) = file.get_string("analysis.api_key") {
                settings.api_key = api_key;
            }
        }
        if let Ok(timeout) = file.get_int("analysis.timeout_secs") {
            settings.timeout_secs = Some(timeout.max(1) as u64);
        }
        if let Ok(retries) = file.get_int("analysis.max_retries") {
            settings.max_retries = retries.clamp(0, 10) as u32;
        }
    }
    Ok(settings)
}

fn colored_level(level: CertLevel) -> String {
    match level {
        CertLevel::Gold => level.to_string().yellow().bold().to_string(),
        CertLevel::Silver => level.to_string().bright_white().bold().to_string(),
        CertLevel::Bronze => level.to_string().red().to_string(),
        CertLevel::None => level.to_string().dimmed().to_string(),
    }
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tokio=warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}
