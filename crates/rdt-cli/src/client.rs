use anyhow::{Context, Result, bail};
use rdt_abstract::{LossConfig, ProtocolConfig, Transport};
use rdt_core::{FileBlockReader, FileBlockWriter, Transceiver, UdpTransport};
use std::fs;
use std::io::{BufRead, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::command::{ClientCommand, LossField, PeerOverride, ServerCommand};
use crate::repo::{FileEntry, format_listing, is_plain_name, list_files, unique_path};

pub const DEFAULT_BIND: &str = "127.0.0.1:0";
pub const DEFAULT_SERVER: &str = "127.0.0.1:12345";
pub const PROMPT: &str = ">>> ";
/// Polls spent waiting for the server to acknowledge a command.
pub const COMMAND_ACK_ATTEMPTS: usize = 20;

const HELP: &str = "\
upload   [-ip <ip>] [-port <port>]   send a file from the local repository
download [-ip <ip>] [-port <port>]   fetch a file from the server repository
lss      [-ip <ip>] [-port <port>]   list the server repository
ls                                   list the local repository
repo     [-set <dir>]                show or change the local repository
loss     [-set <sa|sd|ra|rd> <rate> ...]
                                     show or change loss probabilities
help                                 show this text
exit                                 leave the shell
";

/// Interactive shell talking to one server at a time.
pub struct Client<T, R, W> {
    node: Transceiver<T>,
    server: SocketAddr,
    repo: PathBuf,
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Client<UdpTransport, R, W> {
    pub fn bind(
        addr: SocketAddr,
        server: SocketAddr,
        repo: PathBuf,
        protocol: ProtocolConfig,
        loss: LossConfig,
        input: R,
        output: W,
    ) -> Result<Self> {
        let transport =
            UdpTransport::bind(addr).with_context(|| format!("Failed to bind {addr}"))?;
        Self::new(transport, server, repo, protocol, loss, input, output)
    }
}

impl<T: Transport, R: BufRead, W: Write> Client<T, R, W> {
    pub fn new(
        transport: T,
        server: SocketAddr,
        repo: PathBuf,
        protocol: ProtocolConfig,
        loss: LossConfig,
        input: R,
        output: W,
    ) -> Result<Self> {
        fs::create_dir_all(&repo)
            .with_context(|| format!("Failed to create repository {}", repo.display()))?;
        let node = Transceiver::new(transport, protocol, loss).context("Invalid client configuration")?;
        info!(%server, repo = %repo.display(), protocol = %node.config().kind, "Client initialized");
        Ok(Self {
            node,
            server,
            repo,
            input,
            output,
        })
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Read and execute commands until `exit` or end of input.
    pub fn run(&mut self) -> Result<()> {
        loop {
            write!(self.output, "{PROMPT}")?;
            self.output.flush()?;
            let Some(line) = self.read_line()? else {
                return Ok(());
            };
            let command = match ClientCommand::parse(&line) {
                Ok(command) => command,
                Err(e) => {
                    writeln!(self.output, "{e}")?;
                    continue;
                }
            };
            if command == ClientCommand::Exit {
                return Ok(());
            }
            if let Err(e) = self.execute(command) {
                warn!("command failed: {e:#}");
                writeln!(self.output, "Error: {e:#}")?;
            }
        }
    }

    pub fn execute(&mut self, command: ClientCommand) -> Result<()> {
        match command {
            ClientCommand::Upload(peer) => self.upload(peer),
            ClientCommand::Download(peer) => self.download(peer),
            ClientCommand::ListRemote(peer) => {
                let entries = self.list_remote(peer)?;
                write!(self.output, "{}", format_listing(&entries))?;
                Ok(())
            }
            ClientCommand::ListLocal => {
                let entries = list_files(&self.repo)?;
                write!(self.output, "{}", format_listing(&entries))?;
                Ok(())
            }
            ClientCommand::Repo { set: None } => {
                writeln!(self.output, "Local repository: {}", self.repo.display())?;
                Ok(())
            }
            ClientCommand::Repo { set: Some(dir) } => {
                fs::create_dir_all(&dir)
                    .with_context(|| format!("Failed to create repository {}", dir.display()))?;
                info!(repo = %dir.display(), "repository changed");
                self.repo = dir;
                writeln!(self.output, "Local repository: {}", self.repo.display())?;
                Ok(())
            }
            ClientCommand::Loss { set } => self.loss(&set),
            ClientCommand::Help => {
                write!(self.output, "{HELP}")?;
                Ok(())
            }
            ClientCommand::Exit | ClientCommand::Empty => Ok(()),
        }
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    fn target(&self, peer: PeerOverride) -> SocketAddr {
        SocketAddr::new(
            peer.ip.unwrap_or(self.server.ip()),
            peer.port.unwrap_or(self.server.port()),
        )
    }

    /// Send `command` to `peer` and wait for its ack.
    fn request(&mut self, peer: PeerOverride, command: &ServerCommand) -> Result<()> {
        let target = self.target(peer);
        let interval = self.node.config().poll_interval();
        let channel = self.node.channel_mut();
        channel.set_peer(target);
        channel.send_command(&command.to_wire())?;
        if !channel.await_command_ack(COMMAND_ACK_ATTEMPTS, interval)? {
            bail!("No response from server {target}");
        }
        Ok(())
    }

    fn list_remote(&mut self, peer: PeerOverride) -> Result<Vec<FileEntry>> {
        self.request(peer, &ServerCommand::List)?;
        let wait = self.node.config().timeout();
        let channel = self.node.channel_mut();
        let mut entries = Vec::new();
        loop {
            let Some((_, payload)) = channel.poll_data(wait)? else {
                bail!("Server listing timed out");
            };
            if payload.is_empty() {
                return Ok(entries);
            }
            let line = String::from_utf8_lossy(&payload);
            match FileEntry::from_line(&line) {
                Some(entry) => entries.push(entry),
                None => warn!("Ignoring listing line \"{line}\""),
            }
        }
    }

    /// Show `entries` and ask for one by number.
    fn pick(&mut self, entries: &[FileEntry]) -> Result<Option<FileEntry>> {
        if entries.is_empty() {
            writeln!(self.output, "No files")?;
            return Ok(None);
        }
        write!(self.output, "{}", format_listing(entries))?;
        write!(self.output, "Select a file number: ")?;
        self.output.flush()?;
        let Some(answer) = self.read_line()? else {
            return Ok(None);
        };
        match answer.parse::<usize>().ok().and_then(|i| entries.get(i)) {
            Some(entry) => Ok(Some(entry.clone())),
            None => {
                writeln!(self.output, "Invalid file number \"{answer}\"")?;
                Ok(None)
            }
        }
    }

    fn upload(&mut self, peer: PeerOverride) -> Result<()> {
        let entries = list_files(&self.repo)?;
        let Some(entry) = self.pick(&entries)? else {
            return Ok(());
        };
        if !is_plain_name(&entry.name) {
            bail!("Cannot upload \"{}\"", entry.name);
        }
        let mut reader = FileBlockReader::open(self.repo.join(&entry.name))?;
        self.request(peer, &ServerCommand::Upload(entry.name.clone()))?;
        let summary = self.node.send(&mut reader)?;
        info!(
            file = %entry.name,
            blocks = summary.blocks,
            retransmissions = summary.retransmissions,
            "upload finished"
        );
        writeln!(self.output, "Uploaded {} ({} bytes)", entry.name, entry.size)?;
        Ok(())
    }

    fn download(&mut self, peer: PeerOverride) -> Result<()> {
        let entries = self.list_remote(peer)?;
        let Some(entry) = self.pick(&entries)? else {
            return Ok(());
        };
        let path = unique_path(&self.repo, &entry.name);
        self.request(peer, &ServerCommand::Download(entry.name.clone()))?;
        let mut writer = FileBlockWriter::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        match self.node.receive(&mut writer) {
            Ok(summary) => {
                writer.finish()?;
                info!(file = %entry.name, bytes = summary.bytes, "download finished");
                writeln!(
                    self.output,
                    "Downloaded {} to {} ({} bytes)",
                    entry.name,
                    path.display(),
                    summary.bytes
                )?;
                Ok(())
            }
            Err(e) => {
                drop(writer);
                if let Err(rm) = fs::remove_file(&path) {
                    warn!("Failed to remove partial file {}: {rm}", path.display());
                }
                Err(e.into())
            }
        }
    }

    fn loss(&mut self, set: &[(LossField, f64)]) -> Result<()> {
        let loss = self.node.channel_mut().loss_mut();
        if !set.is_empty() {
            let mut config = loss.config().clone();
            for &(field, rate) in set {
                match field {
                    LossField::SendAck => config.send_ack = rate,
                    LossField::SendData => config.send_data = rate,
                    LossField::RecvAck => config.recv_ack = rate,
                    LossField::RecvData => config.recv_data = rate,
                }
            }
            loss.set_config(config)?;
            info!(config = ?loss.config(), "loss probabilities changed");
        }
        let config = self.node.channel().loss().config().clone();
        writeln!(self.output, "send ack loss:  {}", config.send_ack)?;
        writeln!(self.output, "send data loss: {}", config.send_data)?;
        writeln!(self.output, "recv ack loss:  {}", config.recv_ack)?;
        writeln!(self.output, "recv data loss: {}", config.recv_data)?;
        Ok(())
    }
}
