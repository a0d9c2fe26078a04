//! Stream accumulation: folding transport fragments into one reply.

use futures_util::future::AbortHandle;
use tokio::sync::mpsc;

use bodycode_types::{ApiUsage, StreamEvent};

use crate::conversation::TurnTicket;

/// Capacity of the transport → engine channel.
pub(crate) const STREAM_EVENT_CHANNEL_CAPACITY: usize = 64;

pub(crate) const DISCONNECTED_ERROR: &str = "stream disconnected";

/// Pure left fold step: the reply after `fragment` arrives.
#[must_use]
pub fn append_fragment(current: &str, fragment: &str) -> String {
    let mut next = String::with_capacity(current.len() + fragment.len());
    next.push_str(current);
    next.push_str(fragment);
    next
}

/// Lifecycle of one streamed reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamState {
    /// Request sent, nothing received yet.
    AwaitingStream(TurnTicket),
    Streaming { ticket: TurnTicket, partial: String },
    Completed { ticket: TurnTicket, text: String },
    /// `partial` is whatever arrived before the failure.
    Failed {
        ticket: TurnTicket,
        partial: String,
        error: String,
    },
}

impl StreamState {
    #[must_use]
    pub fn ticket(&self) -> TurnTicket {
        match self {
            Self::AwaitingStream(ticket)
            | Self::Streaming { ticket, .. }
            | Self::Completed { ticket, .. }
            | Self::Failed { ticket, .. } => *ticket,
        }
    }

    #[must_use]
    pub fn partial(&self) -> &str {
        match self {
            Self::AwaitingStream(_) => "",
            Self::Streaming { partial, .. } | Self::Failed { partial, .. } => partial,
            Self::Completed { text, .. } => text,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }

    /// Transition on one event. Terminal states ignore further events.
    #[must_use]
    pub fn apply(self, event: StreamEvent) -> Self {
        if self.is_terminal() {
            return self;
        }
        let ticket = self.ticket();
        match event {
            StreamEvent::TextDelta(fragment) => Self::Streaming {
                ticket,
                partial: append_fragment(self.partial(), &fragment),
            },
            StreamEvent::Usage(_) => self,
            StreamEvent::Done => Self::Completed {
                ticket,
                text: self.into_partial(),
            },
            StreamEvent::Error(error) => Self::Failed {
                ticket,
                partial: self.into_partial(),
                error,
            },
        }
    }

    fn into_partial(self) -> String {
        match self {
            Self::AwaitingStream(_) => String::new(),
            Self::Streaming { partial, .. } | Self::Failed { partial, .. } => partial,
            Self::Completed { text, .. } => text,
        }
    }
}

/// A reply being received from a spawned transport task.
#[derive(Debug)]
pub(crate) struct ActiveStream {
    state: StreamState,
    receiver: mpsc::Receiver<StreamEvent>,
    /// Non-text event read while coalescing deltas.
    pending: Option<StreamEvent>,
    abort_handle: AbortHandle,
    usage: ApiUsage,
}

impl ActiveStream {
    pub(crate) fn new(
        ticket: TurnTicket,
        receiver: mpsc::Receiver<StreamEvent>,
        abort_handle: AbortHandle,
    ) -> Self {
        Self {
            state: StreamState::AwaitingStream(ticket),
            receiver,
            pending: None,
            abort_handle,
            usage: ApiUsage::default(),
        }
    }

    pub(crate) fn ticket(&self) -> TurnTicket {
        self.state.ticket()
    }

    pub(crate) fn state(&self) -> &StreamState {
        &self.state
    }

    pub(crate) fn into_state(self) -> StreamState {
        self.state
    }

    pub(crate) fn usage(&self) -> ApiUsage {
        self.usage
    }

    pub(crate) fn abort(&self) {
        self.abort_handle.abort();
    }

    pub(crate) fn apply(&mut self, event: StreamEvent) {
        if let StreamEvent::Usage(usage) = &event {
            self.usage = *usage;
        }
        let ticket = self.ticket();
        let state = std::mem::replace(&mut self.state, StreamState::AwaitingStream(ticket));
        self.state = state.apply(event);
    }

    /// Next event if one is queued, with consecutive deltas merged.
    pub(crate) fn try_next(&mut self) -> Option<StreamEvent> {
        let first = match self.pending.take() {
            Some(event) => event,
            None => match self.receiver.try_recv() {
                Ok(event) => event,
                Err(mpsc::error::TryRecvError::Empty) => return None,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    StreamEvent::Error(DISCONNECTED_ERROR.to_string())
                }
            },
        };
        Some(self.coalesce(first))
    }

    /// Wait for the next event, with consecutive deltas merged.
    pub(crate) async fn next(&mut self) -> StreamEvent {
        let first = match self.pending.take() {
            Some(event) => event,
            None => self
                .receiver
                .recv()
                .await
                .unwrap_or_else(|| StreamEvent::Error(DISCONNECTED_ERROR.to_string())),
        };
        self.coalesce(first)
    }

    fn coalesce(&mut self, first: StreamEvent) -> StreamEvent {
        let StreamEvent::TextDelta(mut text) = first else {
            return first;
        };
        while let Ok(event) = self.receiver.try_recv() {
            match event {
                StreamEvent::TextDelta(more) => text.push_str(&more),
                other => {
                    self.pending = Some(other);
                    break;
                }
            }
        }
        StreamEvent::TextDelta(text)
    }
}
