use std::path::PathBuf;
use std::time::Duration;

use busprobe_peer::{Credentials, HandshakeConfig};
use busprobe_transport::Address;
use clap::{Args, Subcommand, ValueEnum};

use crate::exit::{transport_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod auth;
pub mod bruteforce;
pub mod corpus;
pub mod decode;
pub mod inject;
pub mod listen;
pub mod replay;
pub mod version;

pub const DEFAULT_URL: &str = "tcp://127.0.0.1:9559";

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one authentication handshake and print the state.
    Auth(AuthArgs),
    /// Try a dictionary of tokens for one user.
    Bruteforce(BruteforceArgs),
    /// Send crafted messages and report how the peer answers.
    Inject(InjectArgs),
    /// Submit files as handshake payloads and check the peer survives.
    Replay(ReplayArgs),
    /// Write a seed corpus of capability maps.
    Corpus(CorpusArgs),
    /// Decode a capability map file and print its entries.
    Decode(DecodeArgs),
    /// Run a test peer that only answers the handshake.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub async fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Auth(args) => auth::run(args, format).await,
        Command::Bruteforce(args) => bruteforce::run(args, format).await,
        Command::Inject(args) => inject::run(args, format).await,
        Command::Replay(args) => replay::run(args, format).await,
        Command::Corpus(args) => corpus::run(args, format).await,
        Command::Decode(args) => decode::run(args, format).await,
        Command::Listen(args) => listen::run(args, format).await,
        Command::Version(args) => version::run(args),
    }
}

/// Where the peer is and how long to wait for it.
#[derive(Args, Debug, Clone)]
pub struct PeerArgs {
    /// Peer address (tcp://host:port or unix:///path).
    #[arg(long, env = "BUSPROBE_URL", default_value = DEFAULT_URL)]
    pub url: String,
    /// Reply timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

impl PeerArgs {
    pub fn address(&self) -> CliResult<Address> {
        parse_address(&self.url)
    }

    pub fn timeout(&self) -> CliResult<Duration> {
        parse_duration(&self.timeout)
    }
}

#[derive(Args, Debug, Clone)]
pub struct CredentialArgs {
    /// User name presented to the peer.
    #[arg(long, env = "BUSPROBE_USER", default_value = "nao")]
    pub user: String,
    /// Token presented to the peer.
    #[arg(long, env = "BUSPROBE_TOKEN", default_value = "nao", hide_env_values = true)]
    pub token: String,
}

impl CredentialArgs {
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.user.as_str(), self.token.as_str())
    }
}

#[derive(Args, Debug)]
pub struct AuthArgs {
    #[command(flatten)]
    pub peer: PeerArgs,
    #[command(flatten)]
    pub credentials: CredentialArgs,
    /// Announce all optional feature flags.
    #[arg(long)]
    pub features: bool,
}

#[derive(Args, Debug)]
pub struct BruteforceArgs {
    #[command(flatten)]
    pub peer: PeerArgs,
    /// Dictionary file, one token per line.
    #[arg(long, value_name = "FILE")]
    pub dict: PathBuf,
    /// Number of concurrent connections.
    #[arg(long, default_value_t = 8)]
    pub width: usize,
    /// User name tried with every token.
    #[arg(long, env = "BUSPROBE_USER", default_value = "nao")]
    pub user: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ScenarioArg {
    Call,
    CallRemote,
    Post,
}

#[derive(Args, Debug)]
pub struct InjectArgs {
    #[command(flatten)]
    pub peer: PeerArgs,
    #[command(flatten)]
    pub credentials: CredentialArgs,
    #[arg(long, value_enum, default_value = "call")]
    pub scenario: ScenarioArg,
    /// Inject on an unauthenticated connection.
    #[arg(long)]
    pub no_auth: bool,
    /// Second peer targeted by the call-remote scenario.
    #[arg(long, value_name = "URL")]
    pub victim: Option<String>,
    /// Tag carried by the forged post.
    #[arg(long, default_value = "busprobe")]
    pub tag: String,
}

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Files whose bytes are sent as handshake payloads.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
    #[command(flatten)]
    pub peer: PeerArgs,
    #[command(flatten)]
    pub credentials: CredentialArgs,
}

#[derive(Args, Debug)]
pub struct CorpusArgs {
    /// Output directory, created if missing.
    #[arg(long, value_name = "DIR")]
    pub dir: PathBuf,
    /// Number of random maps to add to the samples.
    #[arg(long, default_value_t = 16)]
    pub count: usize,
    /// Seed for the random maps.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Encoded capability map.
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Address to bind. Port 0 picks a free port.
    #[arg(long, env = "BUSPROBE_URL", default_value = DEFAULT_URL)]
    pub url: String,
    /// Accepted credentials as user:token. Default: nao:nao.
    #[arg(long = "credential", value_name = "USER:TOKEN")]
    pub credentials: Vec<String>,
    /// Answer with a signed status instead of an unsigned one.
    #[arg(long)]
    pub signed_status: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_address(input: &str) -> CliResult<Address> {
    Address::parse(input).map_err(|err| transport_error("invalid url", err))
}

pub fn parse_credential(input: &str) -> CliResult<Credentials> {
    match input.split_once(':') {
        Some((user, token)) if !user.is_empty() => Ok(Credentials::new(user, token)),
        _ => Err(CliError::new(
            USAGE,
            format!("credential must look like user:token, got '{input}'"),
        )),
    }
}

pub fn handshake_config(timeout: Duration) -> HandshakeConfig {
    HandshakeConfig {
        timeout,
        ..HandshakeConfig::default()
    }
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "timeout must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid timeout value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "timeout must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
