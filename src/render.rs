//! Terminal rendering of the message list.
//!
//! Renderers consume [`ListChange`] notifications and redraw only what
//! changed.  Bot content is shown according to an explicit [`RenderMode`];
//! HTML is never trusted implicitly.

use std::borrow::Cow;
use std::fmt;
use std::io::{self, Stdout, Write};
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use crate::types::{ListChange, ListObserver, Message, MessageId, MessageList, Sender};

/// ANSI escape code for dim text (used for the streaming marker).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for the bot label).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for green text (used for the user label).
const ANSI_GREEN: &str = "\x1b[32m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// How bot content is interpreted for display.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum RenderMode {
    /// Content is markdown and shown as written.
    #[default]
    Markdown,

    /// Content is HTML from a trusted producer.  Tags are stripped, and
    /// `<script>` and `<style>` elements are dropped with their bodies.
    TrustedHtml,
}

impl RenderMode {
    /// Returns the text to display for `content`.
    pub fn display_text<'a>(&self, content: &'a str) -> Cow<'a, str> {
        match self {
            RenderMode::Markdown => Cow::Borrowed(content),
            RenderMode::TrustedHtml => Cow::Owned(sanitize_html(content)),
        }
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderMode::Markdown => write!(f, "markdown"),
            RenderMode::TrustedHtml => write!(f, "trusted-html"),
        }
    }
}

/// Error returned when parsing an invalid render mode string.
#[derive(Debug)]
pub struct RenderModeParseError {
    /// The invalid string value that could not be parsed.
    pub invalid_value: String,
}

impl fmt::Display for RenderModeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Unknown render mode: {} (expected 'markdown' or 'trusted-html')",
            self.invalid_value
        )
    }
}

impl std::error::Error for RenderModeParseError {}

impl FromStr for RenderMode {
    type Err = RenderModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "markdown" | "md" => Ok(RenderMode::Markdown),
            "trusted-html" | "html" => Ok(RenderMode::TrustedHtml),
            _ => Err(RenderModeParseError {
                invalid_value: s.to_string(),
            }),
        }
    }
}

/// Strips markup from `html`, dropping `<script>` and `<style>` elements
/// entirely.
///
/// An unterminated tag or element swallows the rest of the input, so a
/// half-streamed tag never leaks onto the screen.
pub fn sanitize_html(html: &str) -> String {
    // ASCII lowercasing keeps byte offsets identical between the two strings.
    let lower = html.to_ascii_lowercase();
    let mut out = String::with_capacity(html.len());
    let mut i = 0;
    while i < html.len() {
        let rest = &lower[i..];
        if rest.starts_with('<') {
            if let Some(name) = ["script", "style"]
                .iter()
                .find(|name| rest[1..].starts_with(*name))
            {
                let Some(close) = rest.find(&format!("</{name}")) else {
                    break;
                };
                let Some(end) = rest[close..].find('>') else {
                    break;
                };
                i += close + end + 1;
                continue;
            }
            let Some(end) = rest.find('>') else {
                break;
            };
            i += end + 1;
            continue;
        }
        let Some(ch) = html[i..].chars().next() else {
            break;
        };
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

/// Trait for rendering the chat.
///
/// This abstraction allows for different rendering strategies:
/// - Plain text with ANSI styling
/// - Plain text without styling (for piping/redirecting)
/// - Full-screen UIs that redraw the whole list
pub trait Renderer: Send {
    /// Redraws whatever `change` touched in `list`.
    fn render(&mut self, list: &MessageList, change: &ListChange);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);
}

/// Plain text renderer with optional ANSI styling.
///
/// Streaming bot replies are drawn incrementally.  When a replace-mode update
/// extends what is already on screen only the new suffix is printed; when it
/// rewrites earlier text the reply is printed again on a fresh line.
pub struct PlainTextRenderer {
    stdout: Stdout,
    use_color: bool,
    mode: RenderMode,
    echo_user: bool,
    active: Option<MessageId>,
    shown: String,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            stdout: io::stdout(),
            use_color,
            mode: RenderMode::default(),
            echo_user: false,
            active: None,
            shown: String::new(),
        }
    }

    /// Sets how bot content is displayed.
    pub fn with_mode(mut self, mode: RenderMode) -> Self {
        self.mode = mode;
        self
    }

    /// Also print user messages as they are added.  Off by default because
    /// the line editor already shows what the user typed.
    pub fn with_user_echo(mut self, echo_user: bool) -> Self {
        self.echo_user = echo_user;
        self
    }

    /// Flushes stdout to ensure immediate display of streamed content.
    fn flush(&mut self) {
        let _ = self.stdout.flush();
    }

    fn label(&self, sender: Sender) -> String {
        let (color, name) = match sender {
            Sender::User => (ANSI_GREEN, "You"),
            Sender::Bot => (ANSI_CYAN, "Bot"),
        };
        if self.use_color {
            format!("{color}{name}:{ANSI_RESET} ")
        } else {
            format!("{name}: ")
        }
    }

    fn print_message(&mut self, message: &Message) {
        let label = self.label(message.sender);
        let text = self.mode.display_text(&message.content);
        println!("{label}{text}");
    }

    fn start_stream(&mut self, message: &Message) {
        self.active = Some(message.id);
        self.shown.clear();
        let label = self.label(message.sender);
        print!("{label}");
        self.update_stream(message);
    }

    fn update_stream(&mut self, message: &Message) {
        let text = self.mode.display_text(&message.content).into_owned();
        if let Some(suffix) = text.strip_prefix(self.shown.as_str()) {
            print!("{suffix}");
        } else {
            let label = self.label(message.sender);
            print!("\n{label}{text}");
        }
        self.shown = text;
        self.flush();
    }

    fn finish_stream(&mut self, message: &Message) {
        if self.active != Some(message.id) {
            self.print_message(message);
            return;
        }
        self.update_stream(message);
        println!();
        self.active = None;
        self.shown.clear();
        self.flush();
    }

    /// Prints every message, oldest first.
    pub fn render_all(&mut self, list: &MessageList) {
        for message in list.iter().rev() {
            self.print_message(message);
        }
        self.flush();
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn render(&mut self, list: &MessageList, change: &ListChange) {
        match change {
            ListChange::Inserted(id) => {
                let Some(message) = list.get(*id) else {
                    return;
                };
                if message.is_streaming() {
                    self.start_stream(message);
                } else if message.is_bot() || self.echo_user {
                    self.print_message(message);
                }
            }
            ListChange::ContentUpdated(id) => {
                let Some(message) = list.get(*id) else {
                    return;
                };
                if self.active == Some(*id) {
                    self.update_stream(message);
                } else {
                    self.start_stream(message);
                }
            }
            ListChange::Finalized(id) => {
                if let Some(message) = list.get(*id) {
                    self.finish_stream(message);
                }
            }
            ListChange::Cleared => {
                self.active = None;
                self.shown.clear();
                self.print_info("Conversation cleared.");
            }
            ListChange::Replaced => {
                self.active = None;
                self.shown.clear();
                self.render_all(list);
            }
        }
        self.flush();
    }

    fn print_error(&mut self, error: &str) {
        if self.use_color {
            eprintln!("{ANSI_RED}Error: {error}{ANSI_RESET}");
        } else {
            eprintln!("Error: {error}");
        }
    }

    fn print_info(&mut self, info: &str) {
        if self.use_color {
            println!("{ANSI_DIM}{info}{ANSI_RESET}");
        } else {
            println!("{info}");
        }
        self.flush();
    }
}

/// A renderer shared between the session, which feeds it list changes, and
/// the front end, which prints its own notices through it.
pub struct SharedRenderer<R: Renderer> {
    inner: Arc<Mutex<R>>,
}

impl<R: Renderer> SharedRenderer<R> {
    /// Wraps a renderer for sharing.
    pub fn new(renderer: R) -> Self {
        Self {
            inner: Arc::new(Mutex::new(renderer)),
        }
    }

    /// Runs `f` with exclusive access to the renderer.
    pub fn with<T>(&self, f: impl FnOnce(&mut R) -> T) -> T {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Print an error message.
    pub fn print_error(&self, error: &str) {
        self.with(|r| r.print_error(error));
    }

    /// Print an informational message.
    pub fn print_info(&self, info: &str) {
        self.with(|r| r.print_info(info));
    }
}

impl<R: Renderer> Clone for SharedRenderer<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Renderer> ListObserver for SharedRenderer<R> {
    fn list_changed(&mut self, list: &MessageList, change: &ListChange) {
        self.with(|r| r.render(list, change));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_is_verbatim() {
        let text = "**bold** <b>tag</b>";
        assert_eq!(RenderMode::Markdown.display_text(text), text);
    }

    #[test]
    fn html_tags_are_stripped() {
        assert_eq!(sanitize_html("<p>Hello <b>world</b></p>"), "Hello world");
        assert_eq!(sanitize_html("1 &lt; 2"), "1 &lt; 2");
    }

    #[test]
    fn script_and_style_bodies_are_dropped() {
        assert_eq!(
            sanitize_html("a<SCRIPT>alert('x')</script>b<style>p{}</style>c"),
            "abc"
        );
    }

    #[test]
    fn unterminated_markup_is_hidden() {
        assert_eq!(sanitize_html("Hi <a href"), "Hi ");
        assert_eq!(sanitize_html("Hi <script>alert("), "Hi ");
    }

    #[test]
    fn non_ascii_survives() {
        assert_eq!(sanitize_html("<i>héllo ✓</i>"), "héllo ✓");
    }

    #[test]
    fn render_mode_parsing() {
        assert_eq!("markdown".parse::<RenderMode>().unwrap(), RenderMode::Markdown);
        assert_eq!("trusted-html".parse::<RenderMode>().unwrap(), RenderMode::TrustedHtml);
        assert!("xml".parse::<RenderMode>().is_err());
        assert_eq!(RenderMode::TrustedHtml.to_string(), "trusted-html");
    }

    struct Recording {
        changes: Vec<ListChange>,
    }

    impl Renderer for Recording {
        fn render(&mut self, _: &MessageList, change: &ListChange) {
            self.changes.push(*change);
        }

        fn print_error(&mut self, _: &str) {}

        fn print_info(&mut self, _: &str) {}
    }

    #[test]
    fn shared_renderer_observes_changes() {
        let shared = SharedRenderer::new(Recording {
            changes: Vec::new(),
        });
        let mut observer = shared.clone();
        observer.list_changed(&MessageList::new(), &ListChange::Cleared);
        assert_eq!(shared.with(|r| r.changes.clone()), vec![ListChange::Cleared]);
    }
}
