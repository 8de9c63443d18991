use anyhow::{Context, Result};
use bytes::Bytes;
use rdt_abstract::{LossConfig, MAX_PAYLOAD, ProtocolConfig, Transport, TransportError};
use rdt_core::{FileBlockReader, FileBlockWriter, RdtError, Transceiver, UdpTransport};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::command::ServerCommand;
use crate::repo::{is_plain_name, list_files};

pub const DEFAULT_BIND: &str = "127.0.0.1:12345";

/// Serves `ls`, `download` and `upload` requests, one at a time.
pub struct Server<T> {
    node: Transceiver<T>,
    repo: PathBuf,
}

impl Server<UdpTransport> {
    pub fn bind(
        addr: SocketAddr,
        repo: PathBuf,
        protocol: ProtocolConfig,
        loss: LossConfig,
    ) -> Result<Self> {
        let transport =
            UdpTransport::bind(addr).with_context(|| format!("Failed to bind {addr}"))?;
        Self::new(transport, repo, protocol, loss)
    }
}

impl<T: Transport> Server<T> {
    pub fn new(transport: T, repo: PathBuf, protocol: ProtocolConfig, loss: LossConfig) -> Result<Self> {
        fs::create_dir_all(&repo)
            .with_context(|| format!("Failed to create repository {}", repo.display()))?;
        let node = Transceiver::new(transport, protocol, loss).context("Invalid server configuration")?;
        let local = node.channel().transport().local_addr()?;
        info!(%local, repo = %repo.display(), protocol = %node.config().kind, "Server initialized");
        Ok(Self { node, repo })
    }

    pub fn repo(&self) -> &Path {
        &self.repo
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.node.channel().transport().local_addr()?)
    }

    /// Serve until the transport closes. A failing request is logged and the
    /// loop moves on.
    pub fn run(&mut self) -> Result<()> {
        loop {
            match self.serve_one() {
                Ok(()) => {}
                Err(e) if is_closed(&e) => {
                    info!("transport closed, server stopping");
                    return Ok(());
                }
                Err(e) => error!("request failed: {e:#}"),
            }
        }
    }

    /// Wait for one command and carry it out.
    pub fn serve_one(&mut self) -> Result<()> {
        let text = self.node.channel_mut().recv_command()?;
        let peer = self.node.channel().peer();
        info!(peer = ?peer, ">>> {text}");

        let Some(command) = ServerCommand::parse(&text) else {
            warn!("Unknown command: \"{text}\"");
            return Ok(());
        };
        match command {
            ServerCommand::List => {
                self.node.channel_mut().send_ack(0)?;
                self.handle_list()
            }
            ServerCommand::Download(name) => self.handle_download(&name),
            ServerCommand::Upload(name) => self.handle_upload(&name),
        }
    }

    fn handle_list(&mut self) -> Result<()> {
        let entries = list_files(&self.repo)?;
        let channel = self.node.channel_mut();
        for entry in &entries {
            let line = entry.to_line();
            if line.len() > MAX_PAYLOAD {
                warn!(name = %entry.name, "file name too long to list");
                continue;
            }
            channel.send_data(0, Bytes::from(line))?;
        }
        channel.send_data(0, Bytes::new())?;
        info!(files = entries.len(), "listing sent");
        Ok(())
    }

    /// An unacknowledged request makes the client give up on its own.
    fn handle_download(&mut self, name: &str) -> Result<()> {
        if !is_plain_name(name) {
            warn!("Refusing download of \"{name}\"");
            return Ok(());
        }
        let path = self.repo.join(name);
        let mut reader = match FileBlockReader::open(&path) {
            Ok(reader) => reader,
            Err(e) => {
                warn!("Cannot open \"{}\": {e}", path.display());
                return Ok(());
            }
        };
        self.node.channel_mut().send_ack(0)?;
        let summary = self.node.send(&mut reader)?;
        info!(
            file = name,
            blocks = summary.blocks,
            retransmissions = summary.retransmissions,
            "download served"
        );
        Ok(())
    }

    fn handle_upload(&mut self, name: &str) -> Result<()> {
        if !is_plain_name(name) {
            warn!("Refusing upload to \"{name}\"");
            return Ok(());
        }
        let path = self.repo.join(name);
        if path.exists() {
            info!("File \"{}\" already exists, overwrite", path.display());
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
        }
        let mut writer = FileBlockWriter::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        self.node.channel_mut().send_ack(0)?;
        let summary = self.node.receive(&mut writer)?;
        writer.finish()?;
        info!(file = name, bytes = summary.bytes, "upload stored");
        Ok(())
    }
}

fn is_closed(e: &anyhow::Error) -> bool {
    matches!(
        e.downcast_ref::<RdtError>(),
        Some(RdtError::Transport(TransportError::Closed))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdt_core::{Channel, LossSimulator};
    use std::thread;
    use std::time::Duration;

    fn temp_repo(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("rdt-server-{}-{name}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn protocol() -> ProtocolConfig {
        ProtocolConfig::go_back_n(4, 8)
            .with_timeout_ms(200)
            .with_poll_interval_ms(10)
    }

    fn spawn(repo: PathBuf, requests: usize) -> (SocketAddr, thread::JoinHandle<()>) {
        let mut server = Server::bind(
            "127.0.0.1:0".parse().unwrap(),
            repo,
            protocol(),
            LossConfig::lossless(),
        )
        .unwrap();
        let addr = server.local_addr().unwrap();
        let handle = thread::spawn(move || {
            for _ in 0..requests {
                server.serve_one().unwrap();
            }
        });
        (addr, handle)
    }

    fn raw_client(server: SocketAddr) -> Channel<UdpTransport> {
        Channel::new(
            UdpTransport::bind("127.0.0.1:0").unwrap(),
            LossSimulator::lossless(),
        )
        .with_peer(server)
    }

    #[test]
    fn creates_repository_and_lists_files() {
        let repo = temp_repo("list");
        let (addr, handle) = spawn(repo.clone(), 1);
        fs::write(repo.join("a.txt"), b"abc").unwrap();
        fs::write(repo.join("b.txt"), b"").unwrap();

        let mut client = raw_client(addr);
        client.send_command("ls").unwrap();
        assert!(client
            .await_command_ack(20, Duration::from_millis(50))
            .unwrap());
        let mut lines = Vec::new();
        loop {
            let (seq, payload) = client
                .poll_data(Duration::from_secs(2))
                .unwrap()
                .expect("listing line");
            assert_eq!(seq, 0);
            if payload.is_empty() {
                break;
            }
            lines.push(String::from_utf8(payload.to_vec()).unwrap());
        }
        handle.join().unwrap();
        assert_eq!(lines, vec!["a.txt 3", "b.txt 0"]);
        fs::remove_dir_all(&repo).ok();
    }

    #[test]
    fn bad_requests_are_not_acknowledged() {
        let repo = temp_repo("refuse");
        let (addr, handle) = spawn(repo.clone(), 3);

        let mut client = raw_client(addr);
        for command in ["download missing.txt", "upload ../escape.txt", "delete x"] {
            client.send_command(command).unwrap();
            assert!(
                !client
                    .await_command_ack(5, Duration::from_millis(20))
                    .unwrap(),
                "{command} was acknowledged"
            );
        }
        handle.join().unwrap();
        assert!(!repo.parent().unwrap().join("escape.txt").exists());
        fs::remove_dir_all(&repo).ok();
    }
}
