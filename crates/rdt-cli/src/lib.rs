pub mod client;
pub mod command;
pub mod repo;
pub mod server;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rdt_abstract::{LossConfig, ProtocolConfig, ProtocolKind};
use serde::Deserialize;
use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::info;

pub use client::Client;
pub use server::Server;

#[derive(Parser, Debug)]
#[command(author, version, about = "Reliable file transfer over UDP", long_about = None)]
pub struct Cli {
    /// TOML file with `[protocol]` and `[loss]` tables.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub protocol: ProtocolArgs,

    #[command(subcommand)]
    pub mode: Mode,
}

#[derive(Subcommand, Debug)]
pub enum Mode {
    /// Serve a file repository.
    Server {
        #[arg(long, default_value = server::DEFAULT_BIND)]
        bind: SocketAddr,

        #[arg(long, default_value = "server_repo")]
        repo: PathBuf,
    },
    /// Start the interactive shell.
    Client {
        #[arg(long, default_value = client::DEFAULT_BIND)]
        bind: SocketAddr,

        #[arg(long, default_value = client::DEFAULT_SERVER)]
        server: SocketAddr,

        #[arg(long, default_value = "client_repo")]
        repo: PathBuf,
    },
}

/// Command-line overrides applied on top of the config file.
#[derive(Args, Debug, Default)]
pub struct ProtocolArgs {
    #[arg(long, global = true)]
    pub protocol: Option<ProtocolKind>,

    #[arg(long, global = true)]
    pub window: Option<usize>,

    #[arg(long, global = true)]
    pub modulus: Option<usize>,

    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    #[arg(long, global = true)]
    pub poll_interval_ms: Option<u64>,

    #[arg(long, global = true)]
    pub linger_ms: Option<u64>,

    /// Seed for the loss simulator.
    #[arg(long, global = true)]
    pub seed: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub protocol: ProtocolConfig,
    pub loss: LossConfig,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn apply(&mut self, args: &ProtocolArgs) {
        let protocol = &mut self.protocol;
        if let Some(kind) = args.protocol {
            protocol.kind = kind;
        }
        if let Some(window) = args.window {
            protocol.window_size = window;
        }
        if let Some(modulus) = args.modulus {
            protocol.modulus = modulus;
        }
        if let Some(ms) = args.timeout_ms {
            protocol.timeout_ms = ms;
        }
        if let Some(ms) = args.poll_interval_ms {
            protocol.poll_interval_ms = ms;
        }
        if let Some(ms) = args.linger_ms {
            protocol.linger_ms = ms;
        }
        if args.seed.is_some() {
            self.loss.seed = args.seed;
        }
    }
}

pub fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    config.apply(&cli.protocol);
    config.protocol.validate()?;
    config.loss.validate()?;
    info!(protocol = ?config.protocol, loss = ?config.loss, "configuration loaded");

    match cli.mode {
        Mode::Server { bind, repo } => {
            let mut server = Server::bind(bind, repo, config.protocol, config.loss)?;
            server.run()
        }
        Mode::Client { bind, server, repo } => {
            let stdin = io::stdin().lock();
            let stdout = io::stdout();
            let mut client =
                Client::bind(bind, server, repo, config.protocol, config.loss, stdin, stdout)?;
            client.run()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_subcommands_and_overrides() {
        let cli = Cli::try_parse_from([
            "rdt", "client", "--server", "10.0.0.2:4000", "--protocol", "sr", "--window", "3",
        ])
        .unwrap();
        match cli.mode {
            Mode::Client { server, ref repo, .. } => {
                assert_eq!(server, "10.0.0.2:4000".parse().unwrap());
                assert_eq!(repo, Path::new("client_repo"));
            }
            ref other => panic!("unexpected mode {other:?}"),
        }
        let mut config = FileConfig::default();
        config.apply(&cli.protocol);
        assert_eq!(config.protocol.kind, ProtocolKind::SelectiveRepeat);
        assert_eq!(config.protocol.window_size, 3);
        assert!(config.protocol.validate().is_ok());
    }

    #[test]
    fn server_defaults() {
        let cli = Cli::try_parse_from(["rdt", "server"]).unwrap();
        match cli.mode {
            Mode::Server { bind, repo } => {
                assert_eq!(bind, "127.0.0.1:12345".parse().unwrap());
                assert_eq!(repo, PathBuf::from("server_repo"));
            }
            other => panic!("unexpected mode {other:?}"),
        }
    }

    #[test]
    fn config_file_with_overrides() {
        let mut config: FileConfig = toml::from_str(
            r#"
            [protocol]
            kind = "go-back-n"
            window_size = 7
            modulus = 8

            [loss]
            send_data = 0.1
            seed = 1
            "#,
        )
        .unwrap();
        assert_eq!(config.protocol.window_size, 7);
        assert_eq!(config.protocol.timeout_ms, 2000);
        assert_eq!(config.loss.send_data, 0.1);

        config.apply(&ProtocolArgs {
            timeout_ms: Some(500),
            seed: Some(9),
            ..Default::default()
        });
        assert_eq!(config.protocol.timeout_ms, 500);
        assert_eq!(config.loss.seed, Some(9));
        assert_eq!(config.protocol.window_size, 7);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        assert!(FileConfig::load(Path::new("/nonexistent/rdt.toml")).is_err());
    }
}
