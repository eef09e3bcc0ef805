//! Reassembles streamed bot replies from sentinel-delimited frames.

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use crate::frame::Frame;
use crate::observability::{
    FRAME_BYTES, FRAMES_AFTER_CLOSE, FRAMES_IGNORED, FRAMES_RECEIVED, STREAM_DURATION,
    STREAMS_COMPLETED, STREAMS_FORCE_FINALIZED, STREAMS_PREEMPTED, STREAMS_STARTED,
};
use crate::types::{ListChange, MessageId, MessageList, MessageStatus, Sender};

/// How a content frame updates the streaming message.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum ContentUpdateMode {
    /// Each frame carries the full text so far and replaces the content.
    #[default]
    Replace,

    /// Each frame carries only new text and is appended to the content.
    Append,
}

impl fmt::Display for ContentUpdateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentUpdateMode::Replace => write!(f, "replace"),
            ContentUpdateMode::Append => write!(f, "append"),
        }
    }
}

/// Error returned when parsing an invalid update mode string.
#[derive(Debug)]
pub struct ContentUpdateModeParseError {
    /// The invalid string value that could not be parsed.
    pub invalid_value: String,
}

impl fmt::Display for ContentUpdateModeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Unknown update mode: {} (expected 'replace' or 'append')",
            self.invalid_value
        )
    }
}

impl std::error::Error for ContentUpdateModeParseError {}

impl FromStr for ContentUpdateMode {
    type Err = ContentUpdateModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "replace" => Ok(ContentUpdateMode::Replace),
            "append" => Ok(ContentUpdateMode::Append),
            _ => Err(ContentUpdateModeParseError {
                invalid_value: s.to_string(),
            }),
        }
    }
}

/// Phase of the assembler.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum Phase {
    /// No bot reply is in flight.
    #[default]
    Idle,

    /// A bot reply is being streamed into the active message.
    Streaming,
}

/// Snapshot of the assembler's state.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct StreamState {
    /// Current phase.
    pub phase: Phase,

    /// The streaming message, present exactly when `phase` is `Streaming`.
    pub active_message_id: Option<MessageId>,
}

/// State machine that turns inbound frames into message list mutations.
///
/// The assembler does not own the list.  The caller passes the list for each
/// frame and receives the changes that were made, which it forwards to
/// whatever renders the list.  Frames must be fed in arrival order from a
/// single task.
///
/// | state     | frame   | effect                                        |
/// |-----------|---------|-----------------------------------------------|
/// | Idle      | START   | prepend an empty streaming bot message        |
/// | Streaming | content | replace or append the active message content  |
/// | Streaming | END     | finalize the active message                   |
/// | Streaming | START   | finalize the active message, then start anew  |
/// | Idle      | other   | ignored and logged                            |
#[derive(Debug)]
pub struct StreamAssembler {
    mode: ContentUpdateMode,
    state: StreamState,
    started_at: Option<Instant>,
    closed: bool,
}

impl StreamAssembler {
    /// Creates an idle assembler.
    pub fn new(mode: ContentUpdateMode) -> Self {
        Self {
            mode,
            state: StreamState::default(),
            started_at: None,
            closed: false,
        }
    }

    /// Returns the content update mode.
    pub fn mode(&self) -> ContentUpdateMode {
        self.mode
    }

    /// Returns a snapshot of the current state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Returns the current phase.
    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    /// Returns the id of the message being streamed, if any.
    pub fn active_message_id(&self) -> Option<MessageId> {
        self.state.active_message_id
    }

    /// Returns true while a bot reply is in flight.
    pub fn is_streaming(&self) -> bool {
        self.state.phase == Phase::Streaming
    }

    /// Returns true once [`StreamAssembler::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Applies one inbound frame to `list`.
    ///
    /// Returns the changes made, in order.  An empty vector means the frame
    /// was ignored.
    pub fn on_frame(&mut self, list: &mut MessageList, frame: &str) -> Vec<ListChange> {
        if self.closed {
            FRAMES_AFTER_CLOSE.click();
            tracing::warn!(len = frame.len(), "frame received after channel close; dropping");
            return Vec::new();
        }
        FRAMES_RECEIVED.click();
        FRAME_BYTES.count(frame.len() as u64);

        match Frame::classify(frame) {
            Frame::Start => self.start(list),
            Frame::End => self.end(list),
            Frame::Content(chunk) => self.chunk(list, chunk),
        }
    }

    /// Finalizes the active message, if any, and returns to idle.
    ///
    /// Used when a stream stalls.  The message keeps whatever content it was
    /// last assigned.
    pub fn force_finalize(&mut self, list: &mut MessageList) -> Option<ListChange> {
        let change = self.finish(list)?;
        STREAMS_FORCE_FINALIZED.click();
        Some(change)
    }

    /// Handles channel close: finalizes the active message and stops
    /// processing further frames.
    pub fn close(&mut self, list: &mut MessageList) -> Option<ListChange> {
        let change = self.force_finalize(list);
        self.closed = true;
        tracing::debug!(finalized = change.is_some(), "assembler closed");
        change
    }

    fn start(&mut self, list: &mut MessageList) -> Vec<ListChange> {
        let mut changes = Vec::with_capacity(2);
        if self.is_streaming() {
            tracing::warn!(
                active = ?self.state.active_message_id,
                "start marker while streaming; finalizing the in-flight message"
            );
            STREAMS_PREEMPTED.click();
            if let Some(change) = self.finish(list) {
                changes.push(change);
            }
        }
        let id = list.prepend(Sender::Bot, String::new(), MessageStatus::Streaming);
        self.state = StreamState {
            phase: Phase::Streaming,
            active_message_id: Some(id),
        };
        self.started_at = Some(Instant::now());
        STREAMS_STARTED.click();
        tracing::debug!(%id, "bot message started");
        changes.push(ListChange::Inserted(id));
        changes
    }

    fn end(&mut self, list: &mut MessageList) -> Vec<ListChange> {
        if !self.is_streaming() {
            FRAMES_IGNORED.click();
            tracing::warn!("end marker while idle; ignoring");
            return Vec::new();
        }
        match self.finish(list) {
            Some(change) => {
                STREAMS_COMPLETED.click();
                vec![change]
            }
            None => Vec::new(),
        }
    }

    fn chunk(&mut self, list: &mut MessageList, chunk: &str) -> Vec<ListChange> {
        let Some(id) = self.state.active_message_id else {
            FRAMES_IGNORED.click();
            tracing::warn!(len = chunk.len(), "content frame while idle; ignoring");
            return Vec::new();
        };
        let Some(message) = list.get_mut(id) else {
            FRAMES_IGNORED.click();
            tracing::warn!(%id, "streaming message no longer in list; returning to idle");
            self.reset();
            return Vec::new();
        };
        match self.mode {
            ContentUpdateMode::Replace => {
                message.content.clear();
                message.content.push_str(chunk);
            }
            ContentUpdateMode::Append => message.content.push_str(chunk),
        }
        vec![ListChange::ContentUpdated(id)]
    }

    fn finish(&mut self, list: &mut MessageList) -> Option<ListChange> {
        let id = self.state.active_message_id?;
        if let Some(started_at) = self.started_at {
            STREAM_DURATION.add(started_at.elapsed().as_secs_f64());
        }
        self.reset();
        match list.get_mut(id) {
            Some(message) => {
                message.status = MessageStatus::Final;
                tracing::debug!(%id, len = message.content.len(), "bot message finalized");
                Some(ListChange::Finalized(id))
            }
            None => {
                tracing::warn!(%id, "streaming message no longer in list");
                None
            }
        }
    }

    fn reset(&mut self) {
        self.state = StreamState::default();
        self.started_at = None;
    }
}

impl Default for StreamAssembler {
    fn default() -> Self {
        Self::new(ContentUpdateMode::default())
    }
}
