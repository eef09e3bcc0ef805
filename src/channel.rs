//! The bidirectional text-frame transport between client and chat backend.
//!
//! [`Channel`] is the seam between the session and the network.  The
//! [`WebSocketChannel`](crate::WebSocketChannel) speaks to a real backend;
//! [`MemoryChannel`] connects two in-process endpoints and is what the tests
//! and embedders without a network use.

use std::fmt;

use tokio::sync::mpsc;
use url::Url;

use crate::error::{Error, Result};
use crate::identity::Identity;

/// Base URL of the chat backend used when none is configured.
pub const DEFAULT_BASE_URL: &str = "ws://127.0.0.1:8000/api";

/// A bidirectional channel of UTF-8 text frames.
#[async_trait::async_trait]
pub trait Channel: Send {
    /// Returns true while frames can be sent.
    fn is_open(&self) -> bool;

    /// Sends one text frame verbatim.
    async fn send(&mut self, text: &str) -> Result<()>;

    /// Receives the next text frame.
    ///
    /// Returns `None` once the channel is closed by either side.
    async fn recv(&mut self) -> Option<Result<String>>;

    /// Closes the channel.  Closing an already-closed channel is not an error.
    async fn close(&mut self) -> Result<()>;
}

#[async_trait::async_trait]
impl<C: Channel + ?Sized> Channel for Box<C> {
    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    async fn send(&mut self, text: &str) -> Result<()> {
        (**self).send(text).await
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        (**self).recv().await
    }

    async fn close(&mut self) -> Result<()> {
        (**self).close().await
    }
}

/// Where a channel connects, derived from the user's identity.
///
/// Addresses take the form `{base}/chat/{user_id}` or
/// `{base}/chat/{user_id}/conversation/{conversation_id}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelAddress {
    url: Url,
}

impl ChannelAddress {
    /// Builds the per-user address under `base_url`.
    pub fn new(base_url: &str, identity: &Identity) -> Result<Self> {
        let mut url = Url::parse(base_url)?;
        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(Error::validation(
                    format!("channel URL must use ws or wss, not {other}"),
                    Some("server".to_string()),
                ));
            }
        }
        url.set_query(None);
        url.set_fragment(None);
        url.path_segments_mut()
            .map_err(|_| Error::url(format!("{base_url} cannot be used as a base URL"), None))?
            .pop_if_empty()
            .extend(["chat", identity.user_id()]);
        Ok(Self { url })
    }

    /// Narrows the address to one conversation.
    pub fn with_conversation(mut self, conversation_id: &str) -> Result<Self> {
        if conversation_id.is_empty() {
            return Err(Error::validation(
                "conversation id must not be empty",
                Some("conversation".to_string()),
            ));
        }
        self.url
            .path_segments_mut()
            .map_err(|_| Error::url("channel URL cannot be a base", None))?
            .extend(["conversation", conversation_id]);
        Ok(self)
    }

    /// Returns the full URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the full URL as a string.
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

impl fmt::Display for ChannelAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// One end of an in-process channel.
///
/// Created in connected pairs by [`MemoryChannel::pair`].  Frames sent on one
/// end are received, in order, on the other.
#[derive(Debug)]
pub struct MemoryChannel {
    tx: Option<mpsc::UnboundedSender<String>>,
    rx: mpsc::UnboundedReceiver<String>,
    open: bool,
}

impl MemoryChannel {
    /// Creates two connected endpoints.
    ///
    /// # Examples
    ///
    /// ```
    /// # use streamchat::{Channel, MemoryChannel};
    /// # tokio_test::block_on(async {
    /// let (mut client, mut server) = MemoryChannel::pair();
    /// client.send("hi").await.unwrap();
    /// assert_eq!(server.recv().await.unwrap().unwrap(), "hi");
    /// # });
    /// ```
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Some(a_tx),
                rx: b_rx,
                open: true,
            },
            Self {
                tx: Some(b_tx),
                rx: a_rx,
                open: true,
            },
        )
    }

    /// Creates an endpoint that is already closed.
    ///
    /// Useful when no backend could be reached: sends fail and receives end
    /// immediately.
    pub fn closed() -> Self {
        let (mut channel, _) = Self::pair();
        channel.shut();
        channel
    }

    /// Returns the next frame if one is already queued.
    pub fn try_recv(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }

    /// Returns every frame already queued.
    pub fn drain(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Some(frame) = self.try_recv() {
            frames.push(frame);
        }
        frames
    }

    fn shut(&mut self) {
        self.open = false;
        self.tx.take();
        self.rx.close();
    }
}

#[async_trait::async_trait]
impl Channel for MemoryChannel {
    fn is_open(&self) -> bool {
        self.open && self.tx.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    async fn send(&mut self, text: &str) -> Result<()> {
        if !self.open {
            return Err(Error::channel_closed("memory channel is closed"));
        }
        let Some(tx) = self.tx.as_ref() else {
            return Err(Error::channel_closed("memory channel is closed"));
        };
        if tx.send(text.to_string()).is_err() {
            self.shut();
            return Err(Error::channel_closed("peer has gone away"));
        }
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        if !self.open {
            return None;
        }
        match self.rx.recv().await {
            Some(frame) => Some(Ok(frame)),
            None => {
                self.shut();
                None
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.shut();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity::new("abc123").unwrap()
    }

    #[test]
    fn user_address() {
        let address = ChannelAddress::new(DEFAULT_BASE_URL, &identity()).unwrap();
        assert_eq!(address.as_str(), "ws://127.0.0.1:8000/api/chat/abc123");
    }

    #[test]
    fn trailing_slash_in_base() {
        let address = ChannelAddress::new("wss://chat.example.com/api/", &identity()).unwrap();
        assert_eq!(address.as_str(), "wss://chat.example.com/api/chat/abc123");
    }

    #[test]
    fn conversation_address() {
        let address = ChannelAddress::new(DEFAULT_BASE_URL, &identity())
            .unwrap()
            .with_conversation("abc123-42")
            .unwrap();
        assert_eq!(
            address.to_string(),
            "ws://127.0.0.1:8000/api/chat/abc123/conversation/abc123-42"
        );
    }

    #[test]
    fn conversation_ids_are_escaped() {
        let address = ChannelAddress::new(DEFAULT_BASE_URL, &identity())
            .unwrap()
            .with_conversation("a b")
            .unwrap();
        assert!(address.as_str().ends_with("/conversation/a%20b"));
    }

    #[test]
    fn rejects_http_scheme() {
        let err = ChannelAddress::new("http://127.0.0.1:8000/api", &identity()).unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn memory_pair_round_trip() {
        let (mut client, mut server) = MemoryChannel::pair();
        client.send("hi").await.unwrap();
        assert_eq!(server.recv().await.unwrap().unwrap(), "hi");
        server.send("hello").await.unwrap();
        assert_eq!(client.try_recv(), Some("hello".to_string()));
    }

    #[tokio::test]
    async fn close_is_seen_by_peer() {
        let (mut client, mut server) = MemoryChannel::pair();
        server.close().await.unwrap();
        assert!(!server.is_open());
        assert!(client.recv().await.is_none());
        assert!(!client.is_open());
        assert!(client.send("late").await.unwrap_err().is_channel_closed());
    }

    #[tokio::test]
    async fn closed_endpoint() {
        let mut channel: Box<dyn Channel> = Box::new(MemoryChannel::closed());
        assert!(!channel.is_open());
        assert!(channel.recv().await.is_none());
        assert!(channel.send("x").await.is_err());
    }
}
