//! CLI entry point for the courier tool.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use clap::Parser;
use courier_core::credential::{Credential, Persistence};
use courier_core::handler::Handler;
use courier_core::http::{BufferedSource, Method, Request, Response};
use courier_core::session::{Session, SessionConfig};
use courier_core::task::{Task, TaskError};
use tokio::io::{AsyncWriteExt, Stdout};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

mod cli;

use cli::Args;

/// Writes response body chunks to stdout as they arrive.
struct StdoutHandler {
    stdout: Mutex<Stdout>,
}

#[async_trait]
impl Handler for StdoutHandler {
    async fn on_body(&self, _task: &Task, chunk: &Bytes) {
        let mut stdout = self.stdout.lock().await;
        if let Err(error) = stdout.write_all(chunk).await {
            warn!(error = %error, "failed to write response body");
        }
    }

    async fn on_complete(&self, _task: &Task, _outcome: &Result<Response, TaskError>) {
        let mut stdout = self.stdout.lock().await;
        if let Err(error) = stdout.flush().await {
            warn!(error = %error, "failed to flush stdout");
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let method = Method::from_bytes(args.method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid request method {:?}", args.method))?;

    let config = SessionConfig {
        connect_timeout_secs: args.connect_timeout,
        read_timeout_secs: args.read_timeout,
        max_challenge_rounds: args.max_challenge_rounds,
        ..SessionConfig::default()
    };
    let session = Session::builder()
        .config(config)
        .shared_handler(Arc::new(StdoutHandler {
            stdout: Mutex::new(tokio::io::stdout()),
        }))
        .build()
        .context("failed to build HTTP session")?;

    let mut request = Request::new(method, args.url.clone());
    for (name, value) in &args.headers {
        request.set_header(name.clone(), value.clone());
    }
    if let Some(data) = args.data {
        request = if args.data_stream {
            request.with_body_source(BufferedSource::new(data))
        } else {
            request.with_body(data)
        };
    }

    let task = session.create_task(request);
    if let Some((user, password)) = args.user {
        task.set_credentials(Credential::password(user, password, Persistence::None));
    }
    task.resume()?;

    let response = task
        .wait()
        .await
        .with_context(|| format!("request to {} failed", args.url))?;

    info!(
        status = response.status(),
        challenges = task.challenge_count(),
        bytes = response.body().len(),
        "request finished"
    );
    eprintln!("HTTP {} {}", response.status(), response.url());

    Ok(if response.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
