use std::net::IpAddr;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("Unknown command \"{0}\". Use \"help\" to get help")]
    UnknownCommand(String),

    #[error("Unknown option \"{0}\". Use \"help\" to get help")]
    UnknownOption(String),

    #[error("Option \"{0}\" needs a value")]
    MissingValue(String),

    #[error("Invalid ip: \"{0}\"")]
    InvalidIp(String),

    #[error("Invalid port: \"{0}\"")]
    InvalidPort(String),

    #[error("Invalid loss rate \"{0}\", should be in [0, 1]")]
    InvalidRate(String),
}

/// Overrides for the server address, from `-ip` and `-port`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeerOverride {
    pub ip: Option<IpAddr>,
    pub port: Option<u16>,
}

/// Which loss probability `loss -set` changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossField {
    SendAck,
    SendData,
    RecvAck,
    RecvData,
}

impl LossField {
    fn from_flag(flag: &str) -> Option<Self> {
        match flag {
            "sa" => Some(LossField::SendAck),
            "sd" => Some(LossField::SendData),
            "ra" => Some(LossField::RecvAck),
            "rd" => Some(LossField::RecvData),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    Upload(PeerOverride),
    Download(PeerOverride),
    /// `lss`: list the server repository
    ListRemote(PeerOverride),
    /// `ls`: list the local repository
    ListLocal,
    Repo { set: Option<PathBuf> },
    Loss { set: Vec<(LossField, f64)> },
    Help,
    Exit,
    Empty,
}

impl ClientCommand {
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let mut tokens = line.split_whitespace();
        let Some(head) = tokens.next() else {
            return Ok(ClientCommand::Empty);
        };
        match head {
            "upload" => Ok(ClientCommand::Upload(parse_peer(tokens)?)),
            "download" => Ok(ClientCommand::Download(parse_peer(tokens)?)),
            "lss" => Ok(ClientCommand::ListRemote(parse_peer(tokens)?)),
            "ls" => Ok(ClientCommand::ListLocal),
            "repo" => {
                let mut set = None;
                while let Some(token) = tokens.next() {
                    match token {
                        "-set" => {
                            let dir = tokens
                                .next()
                                .ok_or_else(|| CommandError::MissingValue(token.to_string()))?;
                            set = Some(PathBuf::from(dir));
                        }
                        other => return Err(CommandError::UnknownOption(other.to_string())),
                    }
                }
                Ok(ClientCommand::Repo { set })
            }
            "loss" => parse_loss(tokens),
            "help" => Ok(ClientCommand::Help),
            "exit" | "quit" => Ok(ClientCommand::Exit),
            other => Err(CommandError::UnknownCommand(other.to_string())),
        }
    }
}

fn parse_peer<'a>(mut tokens: impl Iterator<Item = &'a str>) -> Result<PeerOverride, CommandError> {
    let mut peer = PeerOverride::default();
    while let Some(token) = tokens.next() {
        let value = match token {
            "-ip" | "-port" => tokens
                .next()
                .ok_or_else(|| CommandError::MissingValue(token.to_string()))?,
            other => return Err(CommandError::UnknownOption(other.to_string())),
        };
        if token == "-ip" {
            let ip = value
                .parse()
                .map_err(|_| CommandError::InvalidIp(value.to_string()))?;
            peer.ip = Some(ip);
        } else {
            let port = value
                .parse()
                .map_err(|_| CommandError::InvalidPort(value.to_string()))?;
            peer.port = Some(port);
        }
    }
    Ok(peer)
}

fn parse_loss<'a>(mut tokens: impl Iterator<Item = &'a str>) -> Result<ClientCommand, CommandError> {
    let mut set = Vec::new();
    match tokens.next() {
        None => return Ok(ClientCommand::Loss { set }),
        Some("-set") => {}
        Some(other) => return Err(CommandError::UnknownOption(other.to_string())),
    }
    while let Some(flag) = tokens.next() {
        let field =
            LossField::from_flag(flag).ok_or_else(|| CommandError::UnknownOption(flag.to_string()))?;
        let raw = tokens
            .next()
            .ok_or_else(|| CommandError::MissingValue(flag.to_string()))?;
        let rate: f64 = raw
            .parse()
            .map_err(|_| CommandError::InvalidRate(raw.to_string()))?;
        if !(0.0..=1.0).contains(&rate) {
            return Err(CommandError::InvalidRate(raw.to_string()));
        }
        set.push((field, rate));
    }
    Ok(ClientCommand::Loss { set })
}

/// A request as received by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerCommand {
    List,
    Download(String),
    Upload(String),
}

impl ServerCommand {
    /// `None` for anything the server does not understand.
    pub fn parse(text: &str) -> Option<Self> {
        let (head, rest) = match text.split_once(' ') {
            Some((head, rest)) => (head, rest),
            None => (text, ""),
        };
        match head {
            "ls" => Some(ServerCommand::List),
            "download" if !rest.is_empty() => Some(ServerCommand::Download(rest.to_string())),
            "upload" if !rest.is_empty() => Some(ServerCommand::Upload(rest.to_string())),
            _ => None,
        }
    }

    pub fn to_wire(&self) -> String {
        match self {
            ServerCommand::List => "ls".to_string(),
            ServerCommand::Download(name) => format!("download {name}"),
            ServerCommand::Upload(name) => format!("upload {name}"),
        }
    }
}
