//! CLI argument definitions using clap derive macros.

use clap::Parser;

use courier_core::session::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_MAX_CHALLENGE_ROUNDS, DEFAULT_READ_TIMEOUT_SECS,
};

/// Fetch a URL, answering Basic and Digest challenges.
///
/// The response body is written to stdout; the status line goes to stderr.
#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(author, version, about)]
pub struct Args {
    /// URL to fetch
    pub url: String,

    /// Request method
    #[arg(short = 'X', long = "request", default_value = "GET")]
    pub method: String,

    /// Request header as "Name: value" (repeatable)
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Request body
    #[arg(short = 'd', long)]
    pub data: Option<String>,

    /// Send the body as a chunked stream instead of a buffer
    #[arg(long, requires = "data")]
    pub data_stream: bool,

    /// Credentials as "user:password" for Basic/Digest challenges
    #[arg(short = 'u', long, value_parser = parse_user)]
    pub user: Option<(String, String)>,

    /// Connect timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS,
        value_parser = clap::value_parser!(u64).range(1..=3600)
    )]
    pub connect_timeout: u64,

    /// Whole-request timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_READ_TIMEOUT_SECS,
        value_parser = clap::value_parser!(u64).range(1..=86400)
    )]
    pub read_timeout: u64,

    /// Maximum authentication challenge rounds (1-100)
    #[arg(
        long,
        default_value_t = DEFAULT_MAX_CHALLENGE_ROUNDS,
        value_parser = clap::value_parser!(u32).range(1..=100)
    )]
    pub max_challenge_rounds: u32,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("header {raw:?} must look like \"Name: value\""))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("header {raw:?} has an empty name"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

fn parse_user(raw: &str) -> Result<(String, String), String> {
    let (user, password) = raw
        .split_once(':')
        .ok_or_else(|| "credentials must look like \"user:password\"".to_string())?;
    if user.is_empty() {
        return Err("username must not be empty".to_string());
    }
    Ok((user.to_string(), password.to_string()))
}
