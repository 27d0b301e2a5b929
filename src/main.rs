//! fluxlinq CLI
//!
//! Command-line interface for the query translator:
//! - Translate query strings into Flux
//! - Generate a default config file

use anyhow::Context;
use chrono::DateTime;
use clap::{Parser, Subcommand};
use fluxlinq::config::{generate_default_config, Config, LoggingConfig};
use fluxlinq::model::Value;
use fluxlinq::query::{QueryParser, QueryVisitor};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "fluxlinq")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Translate typed queries into Flux")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search the standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Translate a query into Flux
    Translate {
        /// Query text, e.g. "from s in sensor where s.value > 10 select s"
        query: String,
        /// Bucket to read from (default: from config)
        #[arg(short, long)]
        bucket: Option<String>,
        /// Organization (default: from config)
        #[arg(short, long)]
        org: Option<String>,
        /// Named constants in name=value format
        #[arg(short = 'B', long = "bind")]
        bindings: Vec<String>,
        /// Print the JSON request body instead of the Flux text
        #[arg(long)]
        json: bool,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Translate {
            query,
            bucket,
            org,
            bindings,
            json,
        } => {
            // config source is logged after the subscriber is installed
            let (config, loaded_from, skipped) = match cli.config {
                Some(path) => {
                    let config = Config::load_with_env(&path)
                        .with_context(|| format!("loading config {:?}", path))?;
                    (config, Some(path), Vec::new())
                }
                None => Config::discover(),
            };
            init_logging(&config.logging)?;
            for error in &skipped {
                tracing::warn!("Skipped config file: {}", error);
            }
            match &loaded_from {
                Some(path) => tracing::info!("Loaded config from {:?}", path),
                None => tracing::info!("Using default config with environment overrides"),
            }

            let bucket = bucket.unwrap_or_else(|| config.source.bucket.clone());
            let org = org.unwrap_or_else(|| config.source.org.clone());

            let mut parser = QueryParser::new();
            for binding in &bindings {
                let (name, value) = parse_binding(binding)?;
                parser = parser.bind(name, value);
            }

            let model = parser.parse(&query)?;
            let resolver = config.resolver_for(&model.entity);
            let (flux, settings) = QueryVisitor::translate(&model, &bucket, &resolver)?;
            tracing::info!(
                entity = %model.entity,
                org = %org,
                scalar = settings.scalar_aggregated(),
                "translated query"
            );

            if json {
                println!("{}", flux.to_json()?);
            } else {
                println!("{}", flux.to_flux());
            }
        }

        Commands::Config { output } => {
            let config = generate_default_config();

            match output {
                Some(path) => {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &config)?;
                    println!("Config written to {:?}", path);
                }
                None => {
                    print!("{}", config);
                }
            }
        }
    }

    Ok(())
}

/// Logs go to stderr (or the configured file) so stdout carries only the query
fn init_logging(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("fluxlinq={}", logging.level).into());

    let writer = match logging.file.as_deref() {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(writer))
            .init();
    }

    Ok(())
}

/// Parse `name=value`; values are typed as bool, integer, float or RFC 3339
/// timestamp when they look like one, and as strings otherwise
fn parse_binding(binding: &str) -> anyhow::Result<(String, Value)> {
    let (name, raw) = binding
        .split_once('=')
        .with_context(|| format!("invalid binding '{}', expected name=value", binding))?;
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("invalid binding '{}', empty name", binding);
    }
    Ok((name.to_string(), parse_binding_value(raw)))
}

fn parse_binding_value(raw: &str) -> Value {
    if let Some(quoted) = raw
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    {
        return Value::String(quoted.to_string());
    }

    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }

    if let Ok(i) = raw.parse::<i64>() {
        Value::Int(i)
    } else if let Ok(f) = raw.parse::<f64>() {
        Value::Float(f)
    } else if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        Value::DateTime(dt)
    } else {
        Value::String(raw.to_string())
    }
}
