use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard, PoisonError},
};

use tokio::sync::Notify;
use tracing::{debug, info};

use crate::NodeId;

use super::{Command, CommandError, Completion};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("command queue is stopped")]
    Stopped,
}

struct InFlight {
    target: Option<NodeId>,
    completion: Completion,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Box<dyn Command>>,
    in_flight: Option<InFlight>,
    stopped: bool,
}

/// FIFO of commands waiting for the orchestrator. Safe to use from any context.
#[derive(Default)]
pub struct CommandQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a command. Once stopped, the command is finished with
    /// [`CommandError::ShuttingDown`] instead.
    pub fn enqueue(&self, command: Box<dyn Command>) -> Result<(), QueueError> {
        let mut state = self.lock();
        if state.stopped {
            drop(state);
            debug!(command = command.name(), "rejected, queue stopped");
            command.finish(Err(CommandError::ShuttingDown));
            return Err(QueueError::Stopped);
        }
        debug!(
            command = command.name(),
            pending = state.pending.len(),
            "enqueued"
        );
        state.pending.push_back(command);
        drop(state);
        self.notify.notify_one();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    /// Stop accepting commands and wake the orchestrator
    pub fn stop(&self) {
        let mut state = self.lock();
        if state.stopped {
            return;
        }
        state.stopped = true;
        drop(state);
        info!("command queue stopping");
        self.notify.notify_one();
    }

    /// Wait for the next command. Returns `None` once stopped.
    pub(crate) async fn next(&self) -> Option<Box<dyn Command>> {
        loop {
            {
                let mut state = self.lock();
                if state.stopped {
                    return None;
                }
                if let Some(command) = state.pending.pop_front() {
                    return Some(command);
                }
            }
            self.notify.notified().await;
        }
    }

    /// Commands still queued after a stop
    pub(crate) fn drain(&self) -> Vec<Box<dyn Command>> {
        self.lock().pending.drain(..).collect()
    }

    pub(crate) fn set_in_flight(&self, target: Option<NodeId>, completion: Completion) {
        self.lock().in_flight = Some(InFlight { target, completion });
    }

    pub(crate) fn clear_in_flight(&self) {
        self.lock().in_flight = None;
    }

    /// Complete the running command with [`CommandError::TargetGone`] if it targets `node_id`.
    /// Queued commands for the node find it gone when they run.
    pub fn fail_target(&self, node_id: NodeId) -> bool {
        let state = self.lock();
        let Some(in_flight) = state
            .in_flight
            .as_ref()
            .filter(|f| f.target == Some(node_id))
        else {
            return false;
        };
        let completion = in_flight.completion.clone();
        drop(state);
        if completion.complete(Err(CommandError::TargetGone(node_id))) {
            completion.abort_tasks();
            info!(node_id, "failed in-flight command, node removed");
            true
        } else {
            false
        }
    }
}
