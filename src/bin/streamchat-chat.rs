//! Interactive terminal chat over a streaming WebSocket channel.
//!
//! # Usage
//!
//! ```bash
//! # Connect to the default backend at ws://127.0.0.1:8000/api
//! streamchat-chat
//!
//! # Join a conversation and append content frames instead of replacing
//! streamchat-chat --conversation 42 --update-mode append
//!
//! # Finalize replies that stall for 30 seconds
//! streamchat-chat --idle-timeout-secs 30
//! ```
//!
//! Type `/help` while chatting for the list of slash commands.  Logs go to
//! stderr and are controlled with `RUST_LOG`.

use std::sync::mpsc as std_mpsc;
use std::thread;

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use streamchat::chat::{
    ChatArgs, ChatCommand, ChatConfig, ChatSession, SubmitOutcome, help_text, parse_command,
};
use streamchat::{
    Channel, ChannelAddress, ConversationList, MemoryChannel, PlainTextRenderer, SharedRenderer,
    WebSocketChannel,
};

type Session = ChatSession<Box<dyn Channel>>;

/// One event from the line editor thread.
enum Input {
    Line(String),
    Interrupted,
    Eof,
    Failed(String),
}

/// Main entry point for the streamchat-chat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let (args, _) = ChatArgs::from_command_line_relaxed("streamchat-chat [OPTIONS]");
    let config = ChatConfig::try_from(args)?;
    let identity = config.identity()?;
    let address = config.address(&identity)?;

    let renderer = SharedRenderer::new(
        PlainTextRenderer::with_color(config.use_color).with_mode(config.render_mode),
    );
    let channel: Box<dyn Channel> =
        match WebSocketChannel::connect(address.clone(), config.connect_timeout).await {
            Ok(channel) => Box::new(channel),
            Err(err) => {
                tracing::warn!(error = %err, "starting without a connection");
                renderer.print_error(&format!("{err}"));
                if err.is_timeout() {
                    renderer.print_info(&format!("Is the chat backend running at {address}?"));
                }
                Box::new(MemoryChannel::closed())
            }
        };
    let mut session = ChatSession::new(channel, &config);
    session.subscribe(renderer.clone());
    let mut conversations = ConversationList::placeholder();

    let (interrupt_tx, mut interrupt_rx) = mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.send(());
    })?;
    let (input_tx, mut input_rx) = mpsc::unbounded_channel();
    let (ready_tx, ready_rx) = std_mpsc::channel();
    spawn_line_editor(input_tx, ready_rx);

    println!("streamchat (user: {identity})");
    println!("Type /help for commands, /quit to exit\n");

    loop {
        tokio::select! {
            input = input_rx.recv() => {
                match input {
                    Some(Input::Line(line)) => {
                        if !handle_line(&mut session, &renderer, &mut conversations, &config, &address, &line).await {
                            break;
                        }
                    }
                    Some(Input::Interrupted) => {
                        if session.interrupt() {
                            renderer.print_info("Reply stopped.");
                        }
                    }
                    Some(Input::Failed(err)) => {
                        renderer.print_error(&format!("Input error: {err}"));
                        break;
                    }
                    Some(Input::Eof) | None => {
                        println!("\nGoodbye!");
                        break;
                    }
                }
                if ready_tx.send(()).is_err() {
                    break;
                }
            }
            Some(()) = interrupt_rx.recv() => {
                if session.interrupt() {
                    renderer.print_info("Reply stopped.");
                }
            }
            more = session.pump(), if !session.is_closed() => {
                match more {
                    Ok(true) => {}
                    Ok(false) => renderer.print_info("Connection closed."),
                    Err(err) => renderer.print_error(&err.to_string()),
                }
            }
        }
    }

    session.close().await?;
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Reads lines on a dedicated thread so the session stays on one task.
///
/// After each line the thread waits for `ready` before prompting again.
fn spawn_line_editor(input: mpsc::UnboundedSender<Input>, ready: std_mpsc::Receiver<()>) {
    thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(err) => {
                let _ = input.send(Input::Failed(err.to_string()));
                return;
            }
        };
        loop {
            let event = match rl.readline("You: ") {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        let _ = rl.add_history_entry(line.as_str());
                    }
                    Input::Line(line)
                }
                Err(ReadlineError::Interrupted) => Input::Interrupted,
                Err(ReadlineError::Eof) => Input::Eof,
                Err(err) => Input::Failed(err.to_string()),
            };
            let last = matches!(event, Input::Eof | Input::Failed(_));
            if input.send(event).is_err() || last || ready.recv().is_err() {
                break;
            }
        }
    });
}

/// Handles one line of input.  Returns false when the user asked to quit.
async fn handle_line(
    session: &mut Session,
    renderer: &SharedRenderer<PlainTextRenderer>,
    conversations: &mut ConversationList,
    config: &ChatConfig,
    address: &ChannelAddress,
    line: &str,
) -> bool {
    let Some(command) = parse_command(line) else {
        match session.submit(line).await {
            Ok(SubmitOutcome::Busy) => {
                renderer.print_info("A reply is still streaming; wait for it to finish.")
            }
            Ok(_) => {}
            Err(err) => renderer.print_error(&err.to_string()),
        }
        return true;
    };

    match command {
        ChatCommand::Quit => {
            println!("Goodbye!");
            return false;
        }
        ChatCommand::Clear => session.clear(),
        ChatCommand::Help => {
            for line in help_text().lines() {
                println!("    {line}");
            }
        }
        ChatCommand::Conversations => print_conversations(conversations, config),
        ChatCommand::RemoveConversation(id) => {
            if conversations.remove(&id) {
                renderer.print_info(&format!("Removed conversation {id}."));
            } else {
                renderer.print_error(&format!("No conversation with id {id}"));
            }
        }
        ChatCommand::SaveTranscript(path) => match session.save_transcript_to(&path) {
            Ok(()) => renderer.print_info(&format!("Transcript saved to {path}")),
            Err(err) => renderer.print_error(&format!("Failed to save transcript: {err}")),
        },
        ChatCommand::LoadTranscript(path) => {
            if let Err(err) = session.load_transcript_from(&path) {
                renderer.print_error(&format!("Failed to load transcript: {err}"));
            }
        }
        ChatCommand::Stats => print_stats(session),
        ChatCommand::ShowConfig => print_config(config, address),
        ChatCommand::Invalid(message) => renderer.print_error(&message),
    }
    true
}

fn print_conversations(conversations: &ConversationList, config: &ChatConfig) {
    if conversations.is_empty() {
        println!("    Conversations: (none)");
        return;
    }
    println!("    Conversations:");
    for conversation in conversations.conversations() {
        let marker = if config.conversation_id.as_deref() == Some(conversation.id.as_str()) {
            "*"
        } else {
            " "
        };
        println!("    {marker} {:>4}  {}", conversation.id, conversation.title);
    }
}

fn print_stats(session: &Session) {
    let stats = session.stats();
    println!("    Session Statistics:");
    println!(
        "      Messages: {} ({} from you, {} from the bot)",
        stats.message_count, stats.user_messages, stats.bot_messages
    );
    println!("      Sent: {}", stats.submissions_sent);
    println!("      Frames received: {}", stats.frames_handled);
    println!("      Replies completed: {}", stats.replies_completed);
    println!(
        "      Reply: {}",
        if stats.streaming { "streaming" } else { "idle" }
    );
    println!(
        "      Channel: {}",
        if stats.channel_open { "open" } else { "closed" }
    );
}

fn print_config(config: &ChatConfig, address: &ChannelAddress) {
    println!("    Current Configuration:");
    println!("      Channel: {address}");
    println!("      Update mode: {}", config.update_mode);
    println!("      Render mode: {}", config.render_mode);
    match config.idle_timeout {
        Some(timeout) => println!("      Idle timeout: {}s", timeout.as_secs()),
        None => println!("      Idle timeout: (none)"),
    }
    println!("      Connect timeout: {}s", config.connect_timeout.as_secs());
    println!(
        "      Color: {}",
        if config.use_color { "on" } else { "off" }
    );
}
