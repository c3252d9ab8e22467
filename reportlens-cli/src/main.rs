use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use reportlens::{Config, ReportFormat};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "reportlens")]
#[command(about = "Find the latest report in a storage backend and analyze it")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "REPORTLENS_CONFIG")]
    config: Option<PathBuf>,

    /// Storage backend (overrides the config file)
    #[arg(short, long)]
    backend: Option<String>,

    /// Report directory for the local backend
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Extra backend option, may be repeated
    #[arg(short = 'o', long = "option", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    options: Vec<(String, String)>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze the most recent report
    Analyze {
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,

        /// Report format (auto, json or text)
        #[arg(long)]
        report_format: Option<ReportFormat>,
    },

    /// List reports, newest first
    List {
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' in '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("invalid KEY=VALUE: empty key in '{}'", s));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let json = std::env::var("LOG_FORMAT")
        .map(|f| f.eq_ignore_ascii_case("json"))
        .unwrap_or_else(|_| config.logging.format.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(backend) = &cli.backend {
        config.storage.backend = backend.clone();
    }
    if let Some(dir) = &cli.dir {
        config.set_storage_option("directory_path", dir.to_string_lossy());
    }
    for (key, value) in &cli.options {
        config.set_storage_option(key.clone(), value.clone());
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(&cli)?;
    init_tracing(&config);

    match cli.command {
        Commands::Analyze {
            output,
            report_format,
        } => {
            if let Some(format) = report_format {
                config.report.format = format;
            }
            let analyzer = config.report_analyzer()?;
            let analysis = analyzer.analyze_latest_report().await?;
            match output {
                OutputFormat::Text => println!("{}", analysis),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&analysis)?),
            }
        }
        Commands::List { output } => {
            let analyzer = config.report_analyzer()?;
            let reports = analyzer.list_reports().await?;
            tracing::debug!("Listed {} reports", reports.len());
            match output {
                OutputFormat::Text => {
                    for handle in &reports {
                        let modified = handle
                            .last_modified
                            .map(|t| t.to_rfc3339())
                            .unwrap_or_else(|| "-".to_string());
                        println!("{}\t{}\t{}", handle.key, handle.size, modified);
                    }
                }
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
            }
        }
    }

    Ok(())
}
