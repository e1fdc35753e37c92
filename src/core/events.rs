//! Bounded, lossy progress notifications for observers (UIs, log tails).
//!
//! Delivery is strictly best-effort: when the single consumer falls behind
//! and the channel fills, new events are dropped with a warning rather than
//! blocking expansion. The bus is an owned value wired in at construction,
//! not a process-wide global.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::warn;

/// Progress events emitted while the tree grows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoryEvent {
    /// Expansion moved to this frontier choice.
    ChoiceEntered { choice_id: u64 },
    /// A new scene was attached under the given choice.
    SceneAdded { choice_id: u64, scene_id: u64 },
    /// A full run completed with this many scenes.
    RunCompleted { scene_count: usize },
}

/// Producer half of the bus. Cheap to clone; dropping all sinks closes
/// the channel.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Sender<StoryEvent>,
}

impl EventSink {
    /// Create a bus with the given capacity, returning the sink and the
    /// single consumer's receiver.
    pub fn bus(capacity: usize) -> (EventSink, Receiver<StoryEvent>) {
        let (tx, rx) = bounded(capacity);
        (EventSink { tx }, rx)
    }

    /// Emit without blocking; drops the event if the consumer is behind.
    pub fn emit(&self, event: StoryEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(?event, "event bus full, dropping event");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}
