use std::fmt;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::client::IntoClientRequest, tungstenite::Message};
use tracing::debug;

use rampart_core::{
    encoder::{FLAG_GAME_CLOCK, FLAG_RECIPIENT_ACTIVE, FLAG_SESSION_IDLE},
    protocol::TAG_TICK_FRAME,
    SUBPROTOCOL,
};

#[derive(Parser)]
#[command(name = "rampart", about = "Turn-based remote-play gateway")]
pub struct Cli {
    /// Override the listen port from the environment.
    #[arg(long)]
    pub port: Option<u16>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Connect to a running server, request one frame, and print it.
    Probe {
        /// Server base URL.
        #[arg(long, default_value = "ws://localhost:8080")]
        url: String,
        /// Nickname to connect under.
        #[arg(long, default_value = "probe")]
        name: String,
    },
}

pub async fn run_probe(url: &str, name: &str) -> anyhow::Result<()> {
    let endpoint = format!("{}/{}", url.trim_end_matches('/'), name);
    let mut request = endpoint
        .clone()
        .into_client_request()
        .with_context(|| format!("invalid server URL: {endpoint}"))?;
    request.headers_mut().insert(
        "Sec-WebSocket-Protocol",
        SUBPROTOCOL.parse().context("building protocol header")?,
    );

    let (mut socket, response) = tokio::time::timeout(Duration::from_secs(5), connect_async(request))
        .await
        .context("timed out connecting to server")?
        .with_context(|| format!("failed to connect to {endpoint}"))?;
    debug!(status = %response.status(), "connected");

    // a zero tag is not a known command, which requests an immediate frame
    socket
        .send(Message::Binary(vec![0].into()))
        .await
        .context("sending frame request")?;

    let deadline = Duration::from_secs(5);
    let frame = loop {
        let message = tokio::time::timeout(deadline, socket.next())
            .await
            .context("timed out waiting for a frame")?
            .ok_or_else(|| anyhow!("server closed the connection"))??;
        match message {
            Message::Binary(payload) => break payload,
            Message::Close(frame) => bail!("server closed the connection: {frame:?}"),
            _ => continue,
        }
    };

    let summary = ProbeSummary::parse(&frame)?;
    println!("{summary}");

    let _ = socket.send(Message::Close(None)).await;
    Ok(())
}

/// Decoded header of a server frame, for human eyes.
#[derive(Debug, PartialEq, Eq)]
pub struct ProbeSummary {
    pub clients: u8,
    pub recipient_active: bool,
    pub session_idle: bool,
    pub game_clock: bool,
    pub time_left: i32,
    pub width: u8,
    pub height: u8,
    pub active_name: String,
    pub cell_records: usize,
}

impl ProbeSummary {
    pub fn parse(frame: &[u8]) -> anyhow::Result<Self> {
        if frame.first() != Some(&TAG_TICK_FRAME) {
            bail!("unexpected frame tag {:?}", frame.first());
        }
        if frame.len() < 11 {
            bail!("frame header truncated at {} bytes", frame.len());
        }
        let clients = frame[1];
        let flags = frame[2];
        let time_left = i32::from_le_bytes([frame[3], frame[4], frame[5], frame[6]]);
        let width = frame[7];
        let height = frame[8];
        // the name-length byte counts the NUL terminator
        let name_len = frame[9] as usize;
        if name_len == 0 || frame.len() < 10 + name_len {
            bail!("frame name field truncated");
        }
        if frame[10 + name_len - 1] != 0 {
            bail!("unterminated player name");
        }
        let active_name = String::from_utf8_lossy(&frame[10..10 + name_len - 1]).into_owned();
        let body = &frame[10 + name_len..];
        if body.len() % 5 != 0 {
            bail!("ragged cell body of {} bytes", body.len());
        }
        Ok(Self {
            clients,
            recipient_active: flags & FLAG_RECIPIENT_ACTIVE != 0,
            session_idle: flags & FLAG_SESSION_IDLE != 0,
            game_clock: flags & FLAG_GAME_CLOCK != 0,
            time_left,
            width,
            height,
            active_name,
            cell_records: body.len() / 5,
        })
    }
}

impl fmt::Display for ProbeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let player = if self.session_idle {
            "nobody".to_string()
        } else {
            format!("'{}'", self.active_name)
        };
        writeln!(f, "clients:    {}", self.clients)?;
        writeln!(f, "grid:       {}x{}", self.width, self.height)?;
        writeln!(f, "playing:    {player}")?;
        writeln!(f, "time left:  {}", self.time_left)?;
        writeln!(f, "game clock: {}", self.game_clock)?;
        writeln!(f, "you active: {}", self.recipient_active)?;
        write!(f, "cells sent: {}", self.cell_records)
    }
}
