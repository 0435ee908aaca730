//! The correlator task: sole owner of registration state, the outbound buffer,
//! and the pending-request table.
//!
//! Everything that reads or changes those three goes through [`Command`]s
//! processed one at a time. "Check state, then write or buffer, then record the
//! pending entry" is therefore a single step that neither an activation nor a
//! response can interleave with.

use std::collections::HashMap;
use std::mem;
use std::sync::Arc;

use protocol::{RequestId, Transport};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::{ModuleError, ModuleState};

/// Outcome delivered to whoever awaits a request.
pub(crate) type Completion = Result<Value, ModuleError>;

type Reply<T> = oneshot::Sender<T>;
type Tracked = Result<oneshot::Receiver<Completion>, ModuleError>;

pub(crate) enum Command {
    /// Send a registration frame immediately, regardless of state.
    Register {
        request_id: RequestId,
        frame: Vec<u8>,
        reply: Reply<Tracked>,
    },
    /// Send (Active) or buffer (otherwise) a request frame.
    Send {
        request_id: RequestId,
        frame: Vec<u8>,
        reply: Reply<Tracked>,
    },
    /// Complete the pending entry for `request_id`, if there is one.
    Resolve {
        request_id: RequestId,
        outcome: Completion,
        reply: Reply<bool>,
    },
    Activate {
        reply: Reply<()>,
    },
    Deactivate {
        reply: Reply<()>,
    },
    /// Drop the pending entry for a request the caller stopped waiting for.
    Forget {
        request_id: RequestId,
    },
    State {
        reply: Reply<ModuleState>,
    },
}

struct BufferedFrame {
    request_id: RequestId,
    frame: Vec<u8>,
}

pub(crate) struct Correlator {
    transport: Arc<dyn Transport>,
    state: ModuleState,
    buffer: Vec<BufferedFrame>,
    pending: HashMap<RequestId, oneshot::Sender<Completion>>,
}

impl Correlator {
    /// Spawns the correlator on the current Tokio runtime.
    ///
    /// The task runs until every [`CorrelatorHandle`] is dropped.
    pub(crate) fn spawn(transport: Arc<dyn Transport>) -> CorrelatorHandle {
        let (commands, inbox) = mpsc::unbounded_channel();
        let correlator = Self {
            transport,
            state: ModuleState::Unregistered,
            buffer: Vec::new(),
            pending: HashMap::new(),
        };
        tokio::spawn(correlator.run(inbox));
        CorrelatorHandle { commands }
    }

    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = inbox.recv().await {
            self.handle(command).await;
        }
        debug!(
            pending = self.pending.len(),
            buffered = self.buffer.len(),
            "correlator stopped"
        );
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Register {
                request_id,
                frame,
                reply,
            } => {
                let result = self.register(request_id, frame).await;
                let _ = reply.send(result);
            }
            Command::Send {
                request_id,
                frame,
                reply,
            } => {
                let result = self.send(request_id, frame).await;
                let _ = reply.send(result);
            }
            Command::Resolve {
                request_id,
                outcome,
                reply,
            } => {
                let _ = reply.send(self.resolve(&request_id, outcome));
            }
            Command::Activate { reply } => {
                self.activate().await;
                let _ = reply.send(());
            }
            Command::Deactivate { reply } => {
                if self.state.is_active() {
                    self.state = ModuleState::Buffering;
                    info!("module deactivated; buffering outbound requests");
                }
                let _ = reply.send(());
            }
            Command::Forget { request_id } => {
                if self.pending.remove(&request_id).is_some() {
                    debug!(%request_id, "abandoned pending request");
                }
            }
            Command::State { reply } => {
                let _ = reply.send(self.state);
            }
        }
    }

    async fn register(&mut self, request_id: RequestId, frame: Vec<u8>) -> Tracked {
        if self.state != ModuleState::Unregistered {
            return Err(ModuleError::AlreadyRegistered);
        }
        self.transport.send(&frame).await?;
        self.state = ModuleState::Buffering;
        info!(%request_id, "registration sent; buffering until activated");
        Ok(self.track(request_id))
    }

    async fn send(&mut self, request_id: RequestId, frame: Vec<u8>) -> Tracked {
        match self.state {
            ModuleState::Unregistered => Err(ModuleError::NotInitialized),
            ModuleState::Active => {
                self.transport.send(&frame).await?;
                debug!(%request_id, "request sent");
                Ok(self.track(request_id))
            }
            ModuleState::Buffering => {
                debug!(%request_id, buffered = self.buffer.len() + 1, "request buffered");
                self.buffer.push(BufferedFrame {
                    request_id: request_id.clone(),
                    frame,
                });
                Ok(self.track(request_id))
            }
        }
    }

    fn track(&mut self, request_id: RequestId) -> oneshot::Receiver<Completion> {
        let (completion, receiver) = oneshot::channel();
        if self.pending.insert(request_id.clone(), completion).is_some() {
            warn!(%request_id, "request id reused; earlier request abandoned");
        }
        receiver
    }

    fn resolve(&mut self, request_id: &RequestId, outcome: Completion) -> bool {
        match self.pending.remove(request_id) {
            Some(completion) => {
                // The caller may have dropped its receiver; that is not our failure.
                let _ = completion.send(outcome);
                true
            }
            None => {
                debug!(%request_id, "no pending request; response dropped");
                false
            }
        }
    }

    async fn activate(&mut self) {
        match self.state {
            ModuleState::Active => {
                debug!("activation received while already active");
                return;
            }
            ModuleState::Unregistered => {
                warn!("activation received before registration; ignored");
                return;
            }
            ModuleState::Buffering => {}
        }

        self.state = ModuleState::Active;
        let frames = mem::take(&mut self.buffer);
        info!(flushed = frames.len(), "module activated");
        if frames.is_empty() {
            return;
        }

        let bytes: Vec<u8> = frames.iter().flat_map(|f| f.frame.iter().copied()).collect();
        if let Err(error) = self.transport.send(&bytes).await {
            warn!(%error, frames = frames.len(), "failed to flush buffered requests");
            let reason = error.to_string();
            for frame in frames {
                self.resolve(
                    &frame.request_id,
                    Err(ModuleError::FlushFailed {
                        reason: reason.clone(),
                    }),
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Sending side of the correlator's command channel.
#[derive(Clone)]
pub(crate) struct CorrelatorHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl CorrelatorHandle {
    pub(crate) async fn register(
        &self,
        request_id: RequestId,
        frame: Vec<u8>,
    ) -> Result<oneshot::Receiver<Completion>, ModuleError> {
        self.ask(|reply| Command::Register {
            request_id,
            frame,
            reply,
        })
        .await?
    }

    pub(crate) async fn send(
        &self,
        request_id: RequestId,
        frame: Vec<u8>,
    ) -> Result<oneshot::Receiver<Completion>, ModuleError> {
        self.ask(|reply| Command::Send {
            request_id,
            frame,
            reply,
        })
        .await?
    }

    /// Returns `true` if a pending request was completed.
    pub(crate) async fn resolve(&self, request_id: RequestId, outcome: Completion) -> bool {
        self.ask(|reply| Command::Resolve {
            request_id,
            outcome,
            reply,
        })
        .await
        .unwrap_or(false)
    }

    pub(crate) async fn activate(&self) -> Result<(), ModuleError> {
        self.ask(|reply| Command::Activate { reply }).await
    }

    pub(crate) async fn deactivate(&self) -> Result<(), ModuleError> {
        self.ask(|reply| Command::Deactivate { reply }).await
    }

    pub(crate) fn forget(&self, request_id: RequestId) {
        let _ = self.commands.send(Command::Forget { request_id });
    }

    pub(crate) async fn state(&self) -> Result<ModuleState, ModuleError> {
        self.ask(|reply| Command::State { reply }).await
    }

    /// Handle that does not keep the correlator alive.
    pub(crate) fn downgrade(&self) -> WeakCorrelatorHandle {
        WeakCorrelatorHandle {
            commands: self.commands.downgrade(),
        }
    }

    async fn ask<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T, ModuleError> {
        let (reply, answer) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| ModuleError::EngineStopped)?;
        answer.await.map_err(|_| ModuleError::EngineStopped)
    }
}

/// Non-owning handle held by the transport's data handler.
///
/// The correlator owns the transport and the transport owns the data handler,
/// so a strong handle there would keep the correlator running after the
/// [`crate::JunoModule`] is dropped.
#[derive(Clone)]
pub(crate) struct WeakCorrelatorHandle {
    commands: mpsc::WeakUnboundedSender<Command>,
}

impl WeakCorrelatorHandle {
    pub(crate) fn upgrade(&self) -> Option<CorrelatorHandle> {
        self.commands
            .upgrade()
            .map(|commands| CorrelatorHandle { commands })
    }
}
