//! Fixture Recorder - CLI Entry Point

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use fixture_recorder::cache_key::default_path;
use fixture_recorder::error::TransportError;
use fixture_recorder::{
    FixtureRecorder, Mode, OutboundRequest, RecorderConfig, RecorderSettings, Response,
    RuleRegistry,
};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "fixture-recorder",
    about = "Inspect fixture rules and recorded responses",
    version
)]
struct Args {
    /// Path to the rule file
    #[arg(short, long, default_value = "fixtures.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print an example rule file and exit
    PrintConfig,
    /// Validate the rule file and exit
    Validate,
    /// Show which endpoint rule and fixture a request maps to
    Explain(RequestArgs),
    /// Print the fixture playback would return for a request
    Show(RequestArgs),
}

#[derive(ClapArgs, Debug)]
struct RequestArgs {
    /// HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,

    /// Absolute request URL
    url: String,

    /// Request body
    #[arg(short, long)]
    body: Option<String>,

    /// Request header as `Name: value`, may be repeated
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Print machine readable JSON
    #[arg(long)]
    json: bool,
}

impl RequestArgs {
    fn to_request(&self) -> Result<OutboundRequest> {
        let mut request = OutboundRequest::new(&self.method, &self.url)?;
        for header in &self.headers {
            let (name, value) = header
                .split_once(':')
                .with_context(|| format!("Invalid header '{}', expected 'Name: value'", header))?;
            request = request.with_header(name.trim(), value.trim());
        }
        if let Some(body) = &self.body {
            request = request.with_body(body.clone());
        }
        Ok(request)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match &args.command {
        Command::PrintConfig => {
            println!("{}", include_str!("../demos/fixtures.yaml"));
        }
        Command::Validate => {
            if !args.config.exists() {
                anyhow::bail!("Configuration file not found: {:?}", args.config);
            }
            let config = RecorderConfig::from_file(&args.config)?;
            let endpoints: usize = config.services.iter().map(|s| s.endpoints.len()).sum();
            println!(
                "Configuration is valid ({} services, {} endpoints)",
                config.services.len(),
                endpoints
            );
        }
        Command::Explain(request_args) => explain(&args.config, request_args)?,
        Command::Show(request_args) => show(&args.config, request_args)?,
    }

    Ok(())
}

fn explain(config: &Path, args: &RequestArgs) -> Result<()> {
    let recorder = FixtureRecorder::new(
        RuleRegistry::from_file(config),
        RecorderSettings::new(true, Mode::Playback),
    );
    let request = args.to_request()?;

    let Some(resolution) = recorder.resolve(&request)? else {
        if args.json {
            println!("{}", serde_json::json!({ "matched": false }));
        } else {
            println!("No endpoint rule matches {} {}", request.method(), args.url);
        }
        return Ok(());
    };

    let rules = recorder.registry().load()?;
    let default = default_path(rules.cache_dir(), resolution.endpoint.file_path());

    if args.json {
        let report = serde_json::json!({
            "matched": true,
            "endpoint": resolution.endpoint.label(),
            "identifier": resolution.identifier,
            "grouping": resolution.grouping,
            "fixture": resolution.key.path(),
            "fallback": resolution.key.fallback(),
            "default": default,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Endpoint:   {}", resolution.endpoint.label());
        if let Some(identifier) = &resolution.identifier {
            println!("Identifier: {}", identifier);
        }
        if !resolution.grouping.is_empty() {
            println!("Grouping:   {}", resolution.grouping);
        }
        println!("Fixture:    {}", resolution.key.path().display());
        if let Some(fallback) = resolution.key.fallback() {
            println!("Fallback:   {}", fallback.display());
        }
        println!("Default:    {}", default.display());
    }
    Ok(())
}

fn show(config: &Path, args: &RequestArgs) -> Result<()> {
    let recorder = FixtureRecorder::new(
        RuleRegistry::from_file(config),
        RecorderSettings::new(true, Mode::Playback),
    );
    let request = args.to_request()?;

    // Playback answers matched requests without calling out
    let offline = |request: &OutboundRequest| -> Result<Response, TransportError> {
        Err(format!("{} {} is not covered by any endpoint rule", request.method(), request.uri()).into())
    };
    let response = recorder.call(&request, &offline)?;
    info!(status = response.status, "Replayed fixture");

    if args.json {
        let report = serde_json::json!({
            "status": response.status,
            "headers": response.headers,
            "body": response.body,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", response.body.to_text_lossy());
    }
    Ok(())
}
