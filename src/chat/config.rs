//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg` and configuration
//! structures for controlling chat behavior.

use std::path::PathBuf;
use std::time::Duration;

use arrrg_derive::CommandLine;

use crate::assembler::ContentUpdateMode;
use crate::channel::{ChannelAddress, DEFAULT_BASE_URL};
use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::render::RenderMode;
use crate::websocket::DEFAULT_CONNECT_TIMEOUT;

/// Command-line arguments for the streamchat-chat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Base URL of the chat backend.
    #[arrrg(optional, "Chat server base URL (default: ws://127.0.0.1:8000/api)", "URL")]
    pub server: Option<String>,

    /// Conversation to join.
    #[arrrg(optional, "Conversation id to join", "ID")]
    pub conversation: Option<String>,

    /// Explicit user id, bypassing the identity file.
    #[arrrg(optional, "User id (default: read or create the identity file)", "ID")]
    pub user_id: Option<String>,

    /// Where the generated user id is kept.
    #[arrrg(optional, "Identity file (default: ~/.streamchat/user_id)", "PATH")]
    pub identity_file: Option<String>,

    /// How content frames update a streaming reply.
    #[arrrg(optional, "Content update mode: replace or append (default: replace)", "MODE")]
    pub update_mode: Option<String>,

    /// How bot content is displayed.
    #[arrrg(optional, "Render mode: markdown or trusted-html (default: markdown)", "MODE")]
    pub render_mode: Option<String>,

    /// Force-finalize a reply after this many idle seconds.
    #[arrrg(optional, "Finalize a stalled reply after SECS idle seconds", "SECS")]
    pub idle_timeout_secs: Option<u64>,

    /// WebSocket handshake timeout.
    #[arrrg(optional, "Connect timeout in seconds (default: 10)", "SECS")]
    pub connect_timeout_secs: Option<u64>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Configuration for a chat session.
///
/// This struct holds the resolved configuration values after processing
/// command-line arguments with appropriate defaults.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Base URL of the chat backend.
    pub server_url: String,

    /// Conversation to join, if any.
    pub conversation_id: Option<String>,

    /// Explicit user id; when unset the identity file is used.
    pub user_id: Option<String>,

    /// Identity file location; when unset `~/.streamchat/user_id` is used.
    pub identity_path: Option<PathBuf>,

    /// How content frames update a streaming reply.
    pub update_mode: ContentUpdateMode,

    /// How bot content is displayed.
    pub render_mode: RenderMode,

    /// Finalize a stalled reply after this long without frames.
    pub idle_timeout: Option<Duration>,

    /// WebSocket handshake timeout.
    pub connect_timeout: Duration,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - Server: ws://127.0.0.1:8000/api
    /// - Update mode: replace
    /// - Render mode: markdown
    /// - Idle timeout: none
    /// - Color: enabled
    pub fn new() -> Self {
        Self {
            server_url: DEFAULT_BASE_URL.to_string(),
            conversation_id: None,
            user_id: None,
            identity_path: None,
            update_mode: ContentUpdateMode::default(),
            render_mode: RenderMode::default(),
            idle_timeout: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            use_color: true,
        }
    }

    /// Sets the server base URL.
    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }

    /// Sets the conversation to join.
    pub fn with_conversation(mut self, conversation_id: Option<String>) -> Self {
        self.conversation_id = conversation_id;
        self
    }

    /// Sets an explicit user id.
    pub fn with_user_id(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    /// Sets the identity file location.
    pub fn with_identity_path(mut self, path: Option<PathBuf>) -> Self {
        self.identity_path = path;
        self
    }

    /// Sets the content update mode.
    pub fn with_update_mode(mut self, mode: ContentUpdateMode) -> Self {
        self.update_mode = mode;
        self
    }

    /// Sets the render mode.
    pub fn with_render_mode(mut self, mode: RenderMode) -> Self {
        self.render_mode = mode;
        self
    }

    /// Sets the idle timeout for streaming replies.
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Sets the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// Resolves the identity: the explicit user id if set, otherwise the
    /// identity file, created on first use.
    pub fn identity(&self) -> Result<Identity> {
        if let Some(user_id) = &self.user_id {
            return Identity::new(user_id.clone());
        }
        let path = match &self.identity_path {
            Some(path) => path.clone(),
            None => Identity::default_path().ok_or_else(|| {
                Error::validation(
                    "HOME is not set; pass --identity-file or --user-id",
                    Some("identity_file".to_string()),
                )
            })?,
        };
        Identity::load_or_create(path)
    }

    /// Builds the channel address for `identity`.
    pub fn address(&self, identity: &Identity) -> Result<ChannelAddress> {
        let address = ChannelAddress::new(&self.server_url, identity)?;
        match &self.conversation_id {
            Some(conversation_id) => address.with_conversation(conversation_id),
            None => Ok(address),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<ChatArgs> for ChatConfig {
    type Error = Error;

    fn try_from(args: ChatArgs) -> Result<Self> {
        let update_mode = match args.update_mode {
            Some(mode) => mode.parse::<ContentUpdateMode>().map_err(|err| {
                Error::validation(err.to_string(), Some("update_mode".to_string()))
            })?,
            None => ContentUpdateMode::default(),
        };
        let render_mode = match args.render_mode {
            Some(mode) => mode.parse::<RenderMode>().map_err(|err| {
                Error::validation(err.to_string(), Some("render_mode".to_string()))
            })?,
            None => RenderMode::default(),
        };
        if args.idle_timeout_secs == Some(0) {
            return Err(Error::validation(
                "idle timeout must be at least one second",
                Some("idle_timeout_secs".to_string()),
            ));
        }

        Ok(ChatConfig {
            server_url: args
                .server
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            conversation_id: args.conversation,
            user_id: args.user_id,
            identity_path: args.identity_file.map(PathBuf::from),
            update_mode,
            render_mode,
            idle_timeout: args.idle_timeout_secs.map(Duration::from_secs),
            connect_timeout: args
                .connect_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            use_color: !args.no_color,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ChatConfig::new();
        assert_eq!(config.server_url, "ws://127.0.0.1:8000/api");
        assert!(config.conversation_id.is_none());
        assert!(config.user_id.is_none());
        assert_eq!(config.update_mode, ContentUpdateMode::Replace);
        assert_eq!(config.render_mode, RenderMode::Markdown);
        assert!(config.idle_timeout.is_none());
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert!(config.use_color);
    }

    #[test]
    fn config_from_args_defaults() {
        let config = ChatConfig::try_from(ChatArgs::default()).unwrap();
        assert_eq!(config.server_url, DEFAULT_BASE_URL);
        assert_eq!(config.update_mode, ContentUpdateMode::Replace);
        assert!(config.use_color);
    }

    #[test]
    fn config_from_args_custom() {
        let args = ChatArgs {
            server: Some("wss://chat.example.com/api".to_string()),
            conversation: Some("c-1".to_string()),
            user_id: Some("abc".to_string()),
            identity_file: None,
            update_mode: Some("append".to_string()),
            render_mode: Some("trusted-html".to_string()),
            idle_timeout_secs: Some(30),
            connect_timeout_secs: Some(3),
            no_color: true,
        };
        let config = ChatConfig::try_from(args).unwrap();
        assert_eq!(config.update_mode, ContentUpdateMode::Append);
        assert_eq!(config.render_mode, RenderMode::TrustedHtml);
        assert_eq!(config.idle_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert!(!config.use_color);

        let identity = config.identity().unwrap();
        assert_eq!(identity.user_id(), "abc");
        assert_eq!(
            config.address(&identity).unwrap().as_str(),
            "wss://chat.example.com/api/chat/abc/conversation/c-1"
        );
    }

    #[test]
    fn config_rejects_unknown_mode() {
        let args = ChatArgs {
            update_mode: Some("merge".to_string()),
            ..ChatArgs::default()
        };
        let err = ChatConfig::try_from(args).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn identity_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = ChatConfig::new().with_identity_path(Some(dir.path().join("user_id")));
        let first = config.identity().unwrap();
        let second = config.identity().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn config_builder_pattern() {
        let config = ChatConfig::new()
            .with_server_url("ws://localhost:9000/api")
            .with_conversation(Some("c-2".to_string()))
            .with_user_id(Some("u".to_string()))
            .with_update_mode(ContentUpdateMode::Append)
            .with_render_mode(RenderMode::TrustedHtml)
            .with_idle_timeout(Some(Duration::from_secs(5)))
            .with_connect_timeout(Duration::from_secs(1))
            .without_color();
        assert_eq!(config.server_url, "ws://localhost:9000/api");
        assert_eq!(config.conversation_id.as_deref(), Some("c-2"));
        assert_eq!(config.user_id.as_deref(), Some("u"));
        assert_eq!(config.update_mode, ContentUpdateMode::Append);
        assert_eq!(config.render_mode, RenderMode::TrustedHtml);
        assert_eq!(config.idle_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.connect_timeout, Duration::from_secs(1));
        assert!(!config.use_color);
    }
}
