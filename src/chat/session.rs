//! Core chat session management.
//!
//! A [`ChatSession`] owns the channel, the message list, and the stream
//! assembler.  Inbound frames and outbound submissions are both applied on
//! the caller's task, so the list has exactly one writer.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{from_reader, to_writer_pretty};
use tokio::time::Instant;

use crate::assembler::{ContentUpdateMode, StreamAssembler};
use crate::channel::Channel;
use crate::chat::config::ChatConfig;
use crate::error::{Error, Result};
use crate::frame;
use crate::observability::{SUBMISSIONS_REJECTED, SUBMISSIONS_SENT, SUBMISSIONS_UNAVAILABLE};
use crate::types::{
    ListChange, ListObserver, Message, MessageId, MessageList, MessageStatus, Sender,
};

/// Bot message shown locally when a submission cannot be delivered.
pub const UNAVAILABLE_MESSAGE: &str =
    "Sorry, the connection is not available. Please try again later.";

/// What [`ChatSession::submit`] did with the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The text was blank; nothing changed and nothing was sent.
    Empty,
    /// A reply is still streaming; nothing changed and nothing was sent.
    Busy,
    /// The channel is closed; a local bot notice was added instead.
    Unavailable(MessageId),
    /// The user message was added and the text sent.
    Sent(MessageId),
}

/// Aggregated stats for a chat session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStats {
    /// The number of messages in the list.
    pub message_count: usize,
    /// Messages authored by the user.
    pub user_messages: usize,
    /// Messages authored by the bot, including local notices.
    pub bot_messages: usize,
    /// Inbound frames handled.
    pub frames_handled: u64,
    /// Bot replies that reached a final state.
    pub replies_completed: u64,
    /// Texts sent over the channel.
    pub submissions_sent: u64,
    /// True while a reply is streaming.
    pub streaming: bool,
    /// True while the channel accepts sends.
    pub channel_open: bool,
    /// The content update mode in effect.
    pub update_mode: ContentUpdateMode,
}

/// A chat session over one channel.
///
/// # Examples
///
/// ```
/// # use streamchat::chat::{ChatConfig, ChatSession};
/// # use streamchat::{MemoryChannel, START_SENTINEL, END_SENTINEL};
/// # tokio_test::block_on(async {
/// let (client, _server) = MemoryChannel::pair();
/// let mut session = ChatSession::new(client, &ChatConfig::default());
/// session.submit("hi").await.unwrap();
/// for frame in [START_SENTINEL, "Hel", "Hello", END_SENTINEL] {
///     session.handle_frame(frame);
/// }
/// assert_eq!(session.messages().newest().unwrap().content, "Hello");
/// # });
/// ```
pub struct ChatSession<C: Channel> {
    channel: C,
    messages: MessageList,
    assembler: StreamAssembler,
    observers: Vec<Box<dyn ListObserver>>,
    idle_timeout: Option<Duration>,
    last_frame_at: Option<Instant>,
    frames_handled: u64,
    replies_completed: u64,
    submissions_sent: u64,
}

impl<C: Channel> ChatSession<C> {
    /// Creates a session over `channel` using the modes and timeouts in
    /// `config`.
    pub fn new(channel: C, config: &ChatConfig) -> Self {
        Self::with_mode(channel, config.update_mode).with_idle_timeout(config.idle_timeout)
    }

    /// Creates a session with the given update mode and no idle timeout.
    pub fn with_mode(channel: C, mode: ContentUpdateMode) -> Self {
        Self {
            channel,
            messages: MessageList::new(),
            assembler: StreamAssembler::new(mode),
            observers: Vec::new(),
            idle_timeout: None,
            last_frame_at: None,
            frames_handled: 0,
            replies_completed: 0,
            submissions_sent: 0,
        }
    }

    /// Sets how long a streaming reply may stall before it is finalized.
    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Registers an observer notified after every list change.
    pub fn subscribe(&mut self, observer: impl ListObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Returns the message list, newest first.
    pub fn messages(&self) -> &MessageList {
        &self.messages
    }

    /// Returns the stream assembler.
    pub fn assembler(&self) -> &StreamAssembler {
        &self.assembler
    }

    /// Returns the channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Returns true while a bot reply is streaming.
    pub fn is_streaming(&self) -> bool {
        self.assembler.is_streaming()
    }

    /// Returns true once the channel has closed and no more frames will be
    /// processed.
    pub fn is_closed(&self) -> bool {
        self.assembler.is_closed()
    }

    /// Submits user text.
    ///
    /// Blank text and text submitted while a reply streams are rejected
    /// without touching the list.  When the channel is unavailable a local
    /// bot notice is added and nothing is sent.  Otherwise the text becomes
    /// the newest user message and is sent verbatim, once.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the send fails.  The unavailable
    /// notice has already been added in that case.
    pub async fn submit(&mut self, text: &str) -> Result<SubmitOutcome> {
        if text.trim().is_empty() {
            SUBMISSIONS_REJECTED.click();
            return Ok(SubmitOutcome::Empty);
        }
        if self.assembler.is_streaming() {
            SUBMISSIONS_REJECTED.click();
            tracing::debug!("submission while a reply is streaming; rejecting");
            return Ok(SubmitOutcome::Busy);
        }
        if self.assembler.is_closed() || !self.channel.is_open() {
            return Ok(SubmitOutcome::Unavailable(self.notify_unavailable()));
        }

        if frame::is_reserved(text) {
            tracing::warn!("user text equals a stream marker; the backend may misread it");
        }
        let id = self
            .messages
            .prepend(Sender::User, text, MessageStatus::Final);
        self.notify(&[ListChange::Inserted(id)]);

        match self.channel.send(text).await {
            Ok(()) => {
                SUBMISSIONS_SENT.click();
                self.submissions_sent += 1;
                tracing::debug!(id = %id, len = text.len(), "sent user message");
                Ok(SubmitOutcome::Sent(id))
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to send user message");
                self.notify_unavailable();
                Err(err)
            }
        }
    }

    /// Applies one inbound frame and notifies observers of the result.
    ///
    /// Frames arriving after close are dropped and not counted.
    pub fn handle_frame(&mut self, frame: &str) -> Vec<ListChange> {
        if !self.assembler.is_closed() {
            self.frames_handled += 1;
            self.last_frame_at = Some(Instant::now());
        }
        let changes = self.assembler.on_frame(&mut self.messages, frame);
        self.notify(&changes);
        changes
    }

    /// Waits for the next inbound frame and applies it.
    ///
    /// While a reply streams and an idle timeout is set, a stall longer than
    /// the timeout finalizes the reply instead.  The stall is measured from
    /// the last frame handled, so a pump that is dropped and called again
    /// keeps the same deadline.  Returns `Ok(false)` once the channel has
    /// closed; the active reply is finalized at that point.
    ///
    /// # Errors
    ///
    /// Returns frame-level transport errors, such as undecodable binary
    /// frames.  The session stays usable.
    pub async fn pump(&mut self) -> Result<bool> {
        if self.assembler.is_closed() {
            return Ok(false);
        }
        let idle_timeout = self.idle_timeout.filter(|_| self.assembler.is_streaming());
        let next = match idle_timeout {
            Some(limit) => {
                let deadline = self.last_frame_at.unwrap_or_else(Instant::now) + limit;
                match tokio::time::timeout_at(deadline, self.channel.recv()).await {
                    Ok(next) => next,
                    Err(_) => {
                        tracing::warn!(
                            timeout = ?limit,
                            active = ?self.assembler.active_message_id(),
                            "reply stalled; finalizing"
                        );
                        self.interrupt();
                        return Ok(true);
                    }
                }
            }
            None => self.channel.recv().await,
        };
        match next {
            Some(Ok(frame)) => {
                self.handle_frame(&frame);
                Ok(true)
            }
            Some(Err(err)) => {
                tracing::warn!(error = %err, "dropping undeliverable frame");
                Err(err)
            }
            None => {
                tracing::info!("channel closed");
                self.finish_close();
                Ok(false)
            }
        }
    }

    /// Finalizes the streaming reply, if any, without closing the channel.
    ///
    /// Returns true if a reply was finalized.
    pub fn interrupt(&mut self) -> bool {
        match self.assembler.force_finalize(&mut self.messages) {
            Some(change) => {
                self.notify(&[change]);
                true
            }
            None => false,
        }
    }

    /// Closes the channel and finalizes the streaming reply.
    pub async fn close(&mut self) -> Result<()> {
        let result = self.channel.close().await;
        self.finish_close();
        result
    }

    /// Clears the message list.
    ///
    /// A streaming reply is finalized first, so frames still arriving for it
    /// are dropped rather than starting a new message.
    pub fn clear(&mut self) {
        self.interrupt();
        self.messages.clear();
        self.notify(&[ListChange::Cleared]);
    }

    /// Saves the transcript to the specified path.
    pub fn save_transcript_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let transcript = TranscriptFile::new(&self.messages);
        let file = File::create(path.as_ref())
            .map_err(|err| Error::io("failed to create transcript file", err))?;
        let writer = BufWriter::new(file);
        to_writer_pretty(writer, &transcript).map_err(|err| {
            Error::serialization("failed to serialize transcript", Some(Box::new(err)))
        })
    }

    /// Loads a transcript from disk, replacing the current message list.
    ///
    /// Loaded messages are all final.
    ///
    /// # Errors
    ///
    /// Fails without touching the current list if the file cannot be read,
    /// has an unknown version, or holds messages with duplicate or exhausted
    /// ids.
    pub fn load_transcript_from<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let file = File::open(path.as_ref())
            .map_err(|err| Error::io("failed to open transcript file", err))?;
        let reader = BufReader::new(file);
        let transcript: TranscriptFile = from_reader(reader).map_err(|err| {
            Error::serialization("failed to parse transcript", Some(Box::new(err)))
        })?;
        if transcript.version != TRANSCRIPT_VERSION {
            return Err(Error::validation(
                format!("unsupported transcript version {}", transcript.version),
                Some("version".to_string()),
            ));
        }
        let history = MessageList::with_history(transcript.messages)?;
        self.interrupt();
        self.messages = history;
        self.notify(&[ListChange::Replaced]);
        Ok(())
    }

    /// Returns the current session statistics snapshot.
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            message_count: self.messages.len(),
            user_messages: self.messages.count_from(Sender::User),
            bot_messages: self.messages.count_from(Sender::Bot),
            frames_handled: self.frames_handled,
            replies_completed: self.replies_completed,
            submissions_sent: self.submissions_sent,
            streaming: self.assembler.is_streaming(),
            channel_open: !self.assembler.is_closed() && self.channel.is_open(),
            update_mode: self.assembler.mode(),
        }
    }

    fn notify_unavailable(&mut self) -> MessageId {
        SUBMISSIONS_UNAVAILABLE.click();
        let id = self
            .messages
            .prepend(Sender::Bot, UNAVAILABLE_MESSAGE, MessageStatus::Final);
        self.notify(&[ListChange::Inserted(id)]);
        id
    }

    fn finish_close(&mut self) {
        if let Some(change) = self.assembler.close(&mut self.messages) {
            self.notify(&[change]);
        }
    }

    fn notify(&mut self, changes: &[ListChange]) {
        for change in changes {
            if matches!(change, ListChange::Finalized(_)) {
                self.replies_completed += 1;
            }
            for observer in self.observers.iter_mut() {
                observer.list_changed(&self.messages, change);
            }
        }
    }
}

const TRANSCRIPT_VERSION: u8 = 1;

#[derive(Serialize, Deserialize)]
struct TranscriptFile {
    version: u8,
    messages: Vec<Message>,
}

impl TranscriptFile {
    fn new(messages: &MessageList) -> Self {
        Self {
            version: TRANSCRIPT_VERSION,
            messages: messages.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::channel::MemoryChannel;
    use crate::frame::{END_SENTINEL, START_SENTINEL};

    fn session() -> (ChatSession<MemoryChannel>, MemoryChannel) {
        let (client, server) = MemoryChannel::pair();
        (ChatSession::new(client, &ChatConfig::default()), server)
    }

    /// Reports itself open but rejects every send.
    struct RejectingChannel;

    #[async_trait::async_trait]
    impl Channel for RejectingChannel {
        fn is_open(&self) -> bool {
            true
        }

        async fn send(&mut self, _: &str) -> Result<()> {
            Err(Error::channel_closed("connection reset"))
        }

        async fn recv(&mut self) -> Option<Result<String>> {
            None
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn write_transcript(path: &Path, messages: Vec<Message>) {
        let transcript = TranscriptFile {
            version: TRANSCRIPT_VERSION,
            messages,
        };
        std::fs::write(path, serde_json::to_string(&transcript).unwrap()).unwrap();
    }

    #[test]
    fn new_session_empty() {
        let (session, _server) = session();
        assert!(session.messages().is_empty());
        assert!(!session.is_streaming());
        assert!(!session.is_closed());
        assert_eq!(session.stats().update_mode, ContentUpdateMode::Replace);
    }

    #[tokio::test]
    async fn submit_sends_verbatim() {
        let (mut session, mut server) = session();
        let outcome = session.submit("  hi ").await.unwrap();
        let SubmitOutcome::Sent(id) = outcome else {
            panic!("expected Sent, got {outcome:?}");
        };
        let newest = session.messages().newest().unwrap();
        assert_eq!(newest.id, id);
        assert_eq!(newest.content, "  hi ");
        assert_eq!(newest.sender, Sender::User);
        assert_eq!(server.drain(), vec!["  hi ".to_string()]);
    }

    #[tokio::test]
    async fn blank_submit_is_ignored() {
        let (mut session, mut server) = session();
        assert_eq!(session.submit(" \t\n").await.unwrap(), SubmitOutcome::Empty);
        assert!(session.messages().is_empty());
        assert!(server.drain().is_empty());
    }

    #[tokio::test]
    async fn submit_while_streaming_is_busy() {
        let (mut session, mut server) = session();
        session.handle_frame(START_SENTINEL);
        assert_eq!(session.submit("hi").await.unwrap(), SubmitOutcome::Busy);
        assert_eq!(session.messages().len(), 1);
        assert!(server.drain().is_empty());
    }

    #[tokio::test]
    async fn submit_after_peer_close_is_unavailable() {
        let (mut session, server) = session();
        drop(server);
        let outcome = session.submit("hi").await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Unavailable(_)));
        assert_eq!(session.messages().len(), 1);
        let notice = session.messages().newest().unwrap();
        assert_eq!(notice.sender, Sender::Bot);
        assert_eq!(notice.content, UNAVAILABLE_MESSAGE);
        assert_eq!(notice.status, MessageStatus::Final);
    }

    #[tokio::test]
    async fn failed_send_keeps_message_and_adds_notice() {
        let mut session = ChatSession::new(RejectingChannel, &ChatConfig::default());
        let err = session.submit("hi").await.unwrap_err();
        assert!(err.is_channel_closed());
        let messages = session.messages().messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sender, Sender::Bot);
        assert_eq!(messages[0].content, UNAVAILABLE_MESSAGE);
        assert_eq!(messages[1].sender, Sender::User);
        assert_eq!(messages[1].content, "hi");
        assert_eq!(session.stats().submissions_sent, 0);
    }

    #[tokio::test]
    async fn observers_see_every_change() {
        let (mut session, _server) = session();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        session.subscribe(move |_: &MessageList, change: &ListChange| {
            sink.lock().unwrap().push(*change);
        });
        session.handle_frame(START_SENTINEL);
        session.handle_frame("Hel");
        session.handle_frame(END_SENTINEL);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(matches!(seen[0], ListChange::Inserted(_)));
        assert!(matches!(seen[1], ListChange::ContentUpdated(_)));
        assert!(matches!(seen[2], ListChange::Finalized(_)));
    }

    #[tokio::test]
    async fn pump_stops_after_close() {
        let (mut session, mut server) = session();
        server.send(START_SENTINEL).await.unwrap();
        server.send("partial").await.unwrap();
        server.close().await.unwrap();
        assert!(session.pump().await.unwrap());
        assert!(session.pump().await.unwrap());
        assert!(!session.pump().await.unwrap());
        assert!(session.is_closed());
        let reply = session.messages().newest().unwrap();
        assert_eq!(reply.content, "partial");
        assert_eq!(reply.status, MessageStatus::Final);
        assert!(!session.pump().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timeout_finalizes_stalled_reply() {
        let (client, mut server) = MemoryChannel::pair();
        let mut session = ChatSession::with_mode(client, ContentUpdateMode::Replace)
            .with_idle_timeout(Some(Duration::from_secs(5)));
        server.send(START_SENTINEL).await.unwrap();
        server.send("stalled").await.unwrap();
        assert!(session.pump().await.unwrap());
        assert!(session.pump().await.unwrap());
        assert!(session.is_streaming());
        assert!(session.pump().await.unwrap());
        assert!(!session.is_streaming());
        assert!(!session.is_closed());
        assert_eq!(
            session.messages().newest().unwrap().status,
            MessageStatus::Final
        );
    }

    #[tokio::test(start_paused = true)]
    async fn idle_deadline_survives_a_dropped_pump() {
        let (client, mut server) = MemoryChannel::pair();
        let mut session = ChatSession::with_mode(client, ContentUpdateMode::Replace)
            .with_idle_timeout(Some(Duration::from_secs(5)));
        server.send(START_SENTINEL).await.unwrap();
        server.send("stalled").await.unwrap();
        assert!(session.pump().await.unwrap());
        assert!(session.pump().await.unwrap());
        let start = Instant::now();

        // Another event wins the race and the pending pump is dropped.
        assert!(
            tokio::time::timeout(Duration::from_secs(3), session.pump())
                .await
                .is_err()
        );
        assert!(session.is_streaming());

        assert!(session.pump().await.unwrap());
        assert!(!session.is_streaming());
        assert!(start.elapsed() < Duration::from_secs(6));
        assert_eq!(
            session.messages().newest().unwrap().status,
            MessageStatus::Final
        );
    }

    #[tokio::test]
    async fn frames_after_close_are_not_counted() {
        let (mut session, _server) = session();
        session.handle_frame(START_SENTINEL);
        session.close().await.unwrap();
        assert_eq!(session.stats().frames_handled, 1);
        assert!(session.handle_frame("late").is_empty());
        assert!(session.handle_frame(END_SENTINEL).is_empty());
        assert_eq!(session.stats().frames_handled, 1);
    }

    #[tokio::test]
    async fn clear_finalizes_then_empties() {
        let (mut session, _server) = session();
        session.handle_frame(START_SENTINEL);
        session.clear();
        assert!(session.messages().is_empty());
        assert!(!session.is_streaming());
        assert!(session.handle_frame("late").is_empty());
    }

    #[tokio::test]
    async fn transcript_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcript.json");
        let (mut session, _server) = session();
        session.submit("hi").await.unwrap();
        session.handle_frame(START_SENTINEL);
        session.handle_frame("Hello");
        session.save_transcript_to(&path).unwrap();

        let (mut restored, _other) = self::session();
        restored.load_transcript_from(&path).unwrap();
        let messages = restored.messages().messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "Hello");
        assert_eq!(messages[0].status, MessageStatus::Final);
        assert_eq!(messages[1].content, "hi");
    }

    #[test]
    fn load_rejects_unknown_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcript.json");
        std::fs::write(&path, r#"{"version": 9, "messages": []}"#).unwrap();
        let (mut session, _server) = session();
        let err = session.load_transcript_from(&path).unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn load_rejects_duplicate_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcript.json");
        write_transcript(
            &path,
            vec![
                Message::new(MessageId::new(5), Sender::Bot, "b", MessageStatus::Final),
                Message::new(MessageId::new(5), Sender::User, "a", MessageStatus::Final),
            ],
        );
        let (mut session, _server) = session();
        session.submit("kept").await.unwrap();
        let err = session.load_transcript_from(&path).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(session.messages().len(), 1);
        assert_eq!(session.messages().newest().unwrap().content, "kept");
    }

    #[test]
    fn load_rejects_exhausted_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcript.json");
        write_transcript(
            &path,
            vec![Message::new(
                MessageId::new(u64::MAX),
                Sender::User,
                "a",
                MessageStatus::Final,
            )],
        );
        let (mut session, _server) = session();
        let err = session.load_transcript_from(&path).unwrap_err();
        assert!(err.is_validation());
        assert!(session.messages().is_empty());
    }

    #[tokio::test]
    async fn stats_track_activity() {
        let (mut session, _server) = session();
        session.submit("hi").await.unwrap();
        for frame in [START_SENTINEL, "a", "ab", END_SENTINEL] {
            session.handle_frame(frame);
        }
        let stats = session.stats();
        assert_eq!(stats.message_count, 2);
        assert_eq!(stats.user_messages, 1);
        assert_eq!(stats.bot_messages, 1);
        assert_eq!(stats.frames_handled, 4);
        assert_eq!(stats.replies_completed, 1);
        assert_eq!(stats.submissions_sent, 1);
        assert!(stats.channel_open);
        assert!(!stats.streaming);
    }
}
