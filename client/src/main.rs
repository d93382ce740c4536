use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use studio_shared::{ForwardError, ProxyRequestDescriptor, ProxyResponseEnvelope};
use tracing::info;

mod api;
mod config;

use api::{Outcome, ProxyClient};
use config::Collection;

const DEFAULT_PROXY: &str = "http://localhost:8080/proxy";

#[derive(Parser)]
#[command(name = "studio")]
#[command(author = "Postman Studio Team")]
#[command(version)]
#[command(about = "Send HTTP requests through the Postman Studio relay", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Relay proxy endpoint
    #[arg(short, long, env = "STUDIO_PROXY", global = true)]
    proxy: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a single request
    Send {
        /// HTTP method
        method: String,

        /// Absolute target URL
        url: String,

        /// Request header, 'Name: value' (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Request body
        #[arg(short, long)]
        data: Option<String>,

        /// Parse the body as JSON instead of sending it as text
        #[arg(long)]
        json: bool,
    },
    /// Run saved requests from a collection file
    Run {
        /// Collection file (default: studio.yml)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Request names to run (default: all)
        names: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .init();
    }

    match cli.command {
        Commands::Send { method, url, headers, data, json } => {
            let proxy = cli.proxy.as_deref().unwrap_or(DEFAULT_PROXY);
            let descriptor = build_descriptor(method, url, &headers, data, json)?;
            run_send(proxy, &descriptor).await?;
        }
        Commands::Run { file, names } => {
            run_collection(cli.proxy.as_deref(), file, &names).await?;
        }
    }

    Ok(())
}

/// Send one request and print the full response
async fn run_send(proxy: &str, descriptor: &ProxyRequestDescriptor) -> Result<()> {
    let client = ProxyClient::new(proxy)?;
    match client.forward(descriptor).await? {
        Ok(envelope) => {
            print_envelope(&envelope);
            Ok(())
        }
        Err(err) => {
            print_failure(&err);
            Err(anyhow::anyhow!(err))
        }
    }
}

/// Forward each saved request in order, one summary line per request
async fn run_collection(proxy: Option<&str>, file: Option<PathBuf>, names: &[String]) -> Result<()> {
    let path = match file {
        Some(p) => p,
        None => Collection::find_config().context("No studio.yml found; pass --file")?,
    };
    let collection = Collection::load(&path)?;
    let proxy = proxy
        .or(collection.proxy.as_deref())
        .unwrap_or(DEFAULT_PROXY);
    let client = ProxyClient::new(proxy)?;

    let selected = collection.select(names)?;
    info!("Running {} request(s) from {} via {}", selected.len(), path.display(), client.endpoint());

    let (mut setup, mut no_response) = (0, 0);
    for req in &selected {
        let outcome: Outcome = client.forward(&req.descriptor()).await?;
        match outcome {
            Ok(env) => println!(
                "{} {:<24} {} {} -> {} {} ({} ms)",
                if env.is_error { "✘" } else { "✔" },
                req.name,
                req.method.to_ascii_uppercase(),
                req.url,
                env.status,
                env.status_text,
                env.duration_ms
            ),
            Err(err) => {
                match &err {
                    ForwardError::Setup(_) => setup += 1,
                    ForwardError::NoResponse(_) => no_response += 1,
                }
                println!("✘ {:<24} {} {} -> {}", req.name, req.method.to_ascii_uppercase(), req.url, err);
            }
        }
    }

    match failure_summary(setup, no_response, selected.len()) {
        Some(summary) => anyhow::bail!(summary),
        None => Ok(()),
    }
}

/// Closing line for `studio run`; `None` when every request got an envelope
fn failure_summary(setup: usize, no_response: usize, total: usize) -> Option<String> {
    let failed = setup + no_response;
    if failed == 0 {
        return None;
    }
    Some(format!(
        "{} of {} request(s) failed at the proxy ({} invalid, {} without a response from their target)",
        failed, total, setup, no_response
    ))
}

fn build_descriptor(
    method: String,
    url: String,
    headers: &[String],
    data: Option<String>,
    json: bool,
) -> Result<ProxyRequestDescriptor> {
    let mut descriptor = ProxyRequestDescriptor::new(method, url);
    for raw in headers {
        let (name, value) = parse_header(raw)?;
        descriptor = descriptor.header(name, value);
    }
    if let Some(data) = data {
        descriptor = descriptor.data(parse_data(&data, json)?);
    }
    Ok(descriptor)
}

/// 'Name: value' → (Name, value)
fn parse_header(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once(':')
        .with_context(|| format!("Header must be 'Name: value', got '{}'", raw))?;
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("Header name cannot be empty in '{}'", raw);
    }
    Ok((name.to_string(), value.trim().to_string()))
}

fn parse_data(raw: &str, json: bool) -> Result<Value> {
    if json {
        serde_json::from_str(raw).context("--json body is not valid JSON")
    } else {
        Ok(Value::String(raw.to_string()))
    }
}

fn print_envelope(env: &ProxyResponseEnvelope) {
    println!("HTTP {} {} ({} ms)", env.status, env.status_text, env.duration_ms);
    for (name, value) in &env.headers {
        println!("{}: {}", name, value);
    }
    println!();
    match &env.data {
        Value::String(text) => println!("{}", text),
        other => println!(
            "{}",
            serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string())
        ),
    }
}

fn print_failure(err: &ForwardError) {
    let hint = match err {
        ForwardError::Setup(_) => "invalid request",
        ForwardError::NoResponse(_) => "could not reach host",
    };
    eprintln!("{} ({})", err.message(), hint);
    eprintln!("  {}", err.detail());
}
