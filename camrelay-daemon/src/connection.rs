//! Inbound camera connection state machine
//!
//! Pure: [`ConnectionMachine::apply`] maps an ingest lifecycle event to the
//! actions the relay task should carry out. Only one camera peer is served at
//! a time; events from any other peer are rejected until it disconnects.

use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

/// Lifecycle notification from the SRT ingest listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestEvent {
    PreConnect(String),
    PostConnect(String),
    DoneConnect(String),
}

impl IngestEvent {
    pub fn peer(&self) -> &str {
        match self {
            IngestEvent::PreConnect(p) | IngestEvent::PostConnect(p) | IngestEvent::DoneConnect(p) => p,
        }
    }
}

impl fmt::Display for IngestEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestEvent::PreConnect(p) => write!(f, "pre_connect({})", p),
            IngestEvent::PostConnect(p) => write!(f, "post_connect({})", p),
            IngestEvent::DoneConnect(p) => write!(f, "done_connect({})", p),
        }
    }
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    SetInputConnected(bool),
    StartRelay(String),
    StopRelay,
}

/// Connection state. A disconnect passes through `PeerDisconnected` straight
/// back to `Idle`, so it is never observed at rest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "peer", rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Idle,
    PeerConnecting(String),
    PeerConnected(String),
}

impl ConnectionState {
    pub fn peer(&self) -> Option<&str> {
        match self {
            ConnectionState::Idle => None,
            ConnectionState::PeerConnecting(p) | ConnectionState::PeerConnected(p) => Some(p),
        }
    }
}

#[derive(Debug, Default)]
pub struct ConnectionMachine {
    state: ConnectionState,
}

impl ConnectionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn apply(&mut self, event: IngestEvent) -> Vec<Action> {
        use ConnectionState::*;

        match (self.state.clone(), event) {
            (Idle, IngestEvent::PreConnect(peer)) => {
                info!("📡 Camera connecting: {}", peer);
                self.state = PeerConnecting(peer);
                vec![Action::SetInputConnected(false)]
            }
            (Idle, IngestEvent::PostConnect(peer)) => {
                warn!("post_connect from {} without pre_connect, ignoring", peer);
                Vec::new()
            }
            (Idle, IngestEvent::DoneConnect(_)) => {
                vec![Action::SetInputConnected(false), Action::StopRelay]
            }

            (PeerConnecting(current), IngestEvent::PostConnect(peer)) if current == peer => {
                info!("✅ Camera connected: {}", peer);
                self.state = PeerConnected(peer.clone());
                vec![Action::SetInputConnected(true), Action::StartRelay(peer)]
            }

            (PeerConnecting(current) | PeerConnected(current), IngestEvent::DoneConnect(peer))
                if current == peer =>
            {
                info!("📴 Camera disconnected: {}", peer);
                self.state = Idle;
                vec![Action::SetInputConnected(false), Action::StopRelay]
            }

            (PeerConnecting(current), IngestEvent::PreConnect(peer))
            | (PeerConnected(current), IngestEvent::PostConnect(peer))
                if current == peer =>
            {
                debug!("Duplicate event from {}, ignoring", peer);
                Vec::new()
            }

            (PeerConnected(current), IngestEvent::PreConnect(peer)) if current == peer => {
                warn!("pre_connect from {} while already connected, ignoring", peer);
                Vec::new()
            }

            (_, IngestEvent::DoneConnect(peer)) => {
                debug!("done_connect from inactive peer {}, ignoring", peer);
                Vec::new()
            }

            (PeerConnecting(current) | PeerConnected(current), event) => {
                warn!(
                    "Rejecting {} while serving {}: only one camera is relayed at a time",
                    event, current
                );
                Vec::new()
            }
        }
    }
}
