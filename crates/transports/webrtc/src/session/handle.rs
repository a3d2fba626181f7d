//! Control surface for a running coordinator

use super::state::SessionState;
use crate::{Error, Result};
use tokio::sync::{mpsc, watch};

/// Commands accepted by a running coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Tear down the current attempt and start a new one
    Reconnect,
    /// Tear down the current attempt and stay disconnected
    Stop,
    /// Tear down and end the coordinator task
    Shutdown,
}

/// Handle held by the presentation layer
///
/// The presentation layer observes state through the handle and requests
/// transitions with commands; it never changes state directly.
#[derive(Debug, Clone)]
pub struct CallHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<SessionState>,
}

impl CallHandle {
    pub(crate) fn new(commands: mpsc::Sender<Command>, state: watch::Receiver<SessionState>) -> Self {
        Self { commands, state }
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| Error::SessionClosed("call coordinator has shut down".to_string()))
    }

    /// Request a reconnect
    pub async fn reconnect(&self) -> Result<()> {
        self.send(Command::Reconnect).await
    }

    /// Request a stop
    pub async fn stop(&self) -> Result<()> {
        self.send(Command::Stop).await
    }

    /// Request teardown and exit of the coordinator task
    pub async fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown).await
    }

    /// Latest state
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Receiver for state changes
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Wait until the session reaches `target`
    pub async fn wait_for(&self, target: SessionState) -> Result<()> {
        let mut state = self.state.clone();
        loop {
            if *state.borrow_and_update() == target {
                return Ok(());
            }
            state
                .changed()
                .await
                .map_err(|_| Error::SessionClosed("call coordinator has shut down".to_string()))?;
        }
    }
}
