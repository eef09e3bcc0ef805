//! Client-side chat over a sentinel-framed streaming text channel.
//!
//! Bot replies arrive as a sequence of text frames: a start marker, any number
//! of content frames, and an end marker.  [`StreamAssembler`] turns those
//! frames into a single message in a newest-first [`MessageList`];
//! [`chat::ChatSession`] adds outbound submission on top of a [`Channel`].

pub mod assembler;
pub mod channel;
pub mod chat;
pub mod error;
pub mod frame;
pub mod identity;
mod observability;
pub mod render;
pub mod types;
pub mod utils;
pub mod websocket;

pub use assembler::{ContentUpdateMode, Phase, StreamAssembler, StreamState};
pub use channel::{Channel, ChannelAddress, DEFAULT_BASE_URL, MemoryChannel};
pub use error::{Error, Result};
pub use frame::{END_SENTINEL, Frame, START_SENTINEL};
pub use identity::Identity;
pub use observability::register_biometrics;
pub use render::{PlainTextRenderer, RenderMode, Renderer, SharedRenderer, sanitize_html};
pub use types::*;
pub use websocket::WebSocketChannel;
