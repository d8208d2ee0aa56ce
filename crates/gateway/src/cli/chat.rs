//! `relay-adapter chat`: interactive REPL against the real brain.
//!
//! Each line is routed exactly as a chat message from `--user` in
//! `--room`. A leading `!` sends an administrative command, a leading `/`
//! a command, anything else a sentence. Lines starting with `:` control
//! the REPL itself.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use ra_domain::config::Config;
use ra_domain::{InboundMessage, MessageKind, OutgoingAction};
use ra_sessions::BoxError;

use crate::bootstrap;
use crate::events::PlatformSink;
use crate::router::RouteOutcome;

/// How long to wait for the brain before the first prompt.
const CONNECT_GRACE: Duration = Duration::from_secs(5);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Public entry point
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn chat(config: Arc<Config>, mut room: String, mut user: String) -> anyhow::Result<()> {
    // 1. Boot and open the brain link.
    let (state, events) = bootstrap::build_adapter_state(config).await?;
    let cancel = CancellationToken::new();
    let pump = bootstrap::connect(&state, events, Arc::new(TerminalSink), cancel.clone());
    wait_for_brain(&state.brain).await;

    // 2. Initialize rustyline editor with persistent history.
    let history_path = dirs::home_dir()
        .unwrap_or_default()
        .join(".relay-adapter")
        .join("chat_history.txt");
    if let Some(parent) = history_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let mut rl = rustyline::DefaultEditor::new()?;
    let _ = rl.load_history(&history_path);

    eprintln!("relay-adapter chat");
    eprintln!("Room: {room}  User: {user}  |  Type :help for REPL commands, Ctrl+D to exit");
    eprintln!();

    // 3. REPL loop.
    loop {
        match rl.readline(&format!("{user}@{room}> ")) {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                rl.add_history_entry(&line).ok();

                if let Some(control) = trimmed.strip_prefix(':') {
                    if handle_control(control, &mut room, &mut user) {
                        break;
                    }
                    continue;
                }

                let (kind, text) = classify_line(trimmed);
                let msg = InboundMessage::new(kind.as_str(), text, room.clone(), user.clone());
                match state.router.route(msg).await {
                    Ok(RouteOutcome::Reply(action)) => print_action(&action),
                    Ok(RouteOutcome::Dropped(reason)) => {
                        eprintln!("\x1B[2m(dropped: {reason:?})\x1B[0m");
                    }
                    Err(e) => eprintln!("\x1B[31merror: {e}\x1B[0m"),
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                eprintln!("(Use Ctrl+D or :quit to exit)");
                continue;
            }
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("\x1B[31mreadline error: {e}\x1B[0m");
                break;
            }
        }
    }

    // 4. Save history and close the link.
    rl.save_history(&history_path).ok();
    cancel.cancel();
    state.brain.shutdown();
    pump.await.ok();

    eprintln!("Goodbye!");
    Ok(())
}

async fn wait_for_brain(brain: &ra_brain::BrainClient) {
    let deadline = tokio::time::Instant::now() + CONNECT_GRACE;
    while !brain.is_open() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    if !brain.is_open() {
        eprintln!(
            "\x1B[33mwarning: brain at {} is not reachable yet\x1B[0m",
            brain.endpoint().url
        );
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Line handling
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `!` → admin, `/` → command, otherwise sentence. The prefix is stripped.
fn classify_line(line: &str) -> (MessageKind, &str) {
    if let Some(rest) = line.strip_prefix('!') {
        (MessageKind::Admin, rest.trim_start())
    } else if let Some(rest) = line.strip_prefix('/') {
        (MessageKind::Command, rest.trim_start())
    } else {
        (MessageKind::Sentence, line)
    }
}

/// Process a `:` control. Returns `true` if the REPL should exit.
fn handle_control(input: &str, room: &mut String, user: &mut String) -> bool {
    let mut parts = input.splitn(2, ' ');
    let cmd = parts.next().unwrap_or_default();
    let arg = parts.next().map(str::trim).filter(|s| !s.is_empty());

    match (cmd, arg) {
        ("quit" | "exit", _) => return true,
        ("room", Some(name)) => {
            *room = name.to_owned();
            eprintln!("Room switched to: {room}");
        }
        ("room", None) => eprintln!("Current room: {room}"),
        ("user", Some(name)) => {
            *user = name.to_owned();
            eprintln!("User switched to: {user}");
        }
        ("user", None) => eprintln!("Current user: {user}"),
        ("clear", _) => eprint!("\x1B[2J\x1B[1;1H"),
        ("help", _) => {
            eprintln!("Messages:");
            eprintln!("  !<text>        Administrative command (try !help)");
            eprintln!("  /<text>        Command");
            eprintln!("  <text>         Sentence");
            eprintln!("REPL:");
            eprintln!("  :room [name]   Show or switch the room");
            eprintln!("  :user [name]   Show or switch the user");
            eprintln!("  :clear         Clear the screen");
            eprintln!("  :quit          Exit");
        }
        (other, _) => eprintln!("Unknown REPL command: :{other}  (type :help for a list)"),
    }
    false
}

fn print_action(action: &OutgoingAction) {
    match action {
        OutgoingAction::Private { text, recipient } => {
            println!("\x1B[2m(private to {recipient})\x1B[0m {text}");
        }
        other => println!("{}", other.body()),
    }
    println!();
}

/// Prints hook deliveries between prompts.
struct TerminalSink;

#[async_trait::async_trait]
impl PlatformSink for TerminalSink {
    async fn send_message(&self, room: &str, action: OutgoingAction) -> Result<(), BoxError> {
        let at = chrono::Local::now().format("%H:%M:%S");
        println!("\n\x1B[36m[{at} hook → {room}]\x1B[0m {}", action.body());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_pick_the_message_type() {
        assert_eq!(classify_line("!admin list"), (MessageKind::Admin, "admin list"));
        assert_eq!(classify_line("/weather paris"), (MessageKind::Command, "weather paris"));
        assert_eq!(classify_line("hello there"), (MessageKind::Sentence, "hello there"));
    }

    #[test]
    fn controls_switch_room_and_user() {
        let mut room = "cli".to_string();
        let mut user = "me".to_string();
        assert!(!handle_control("room general", &mut room, &mut user));
        assert!(!handle_control("user alice", &mut room, &mut user));
        assert_eq!((room.as_str(), user.as_str()), ("general", "alice"));
        assert!(handle_control("quit", &mut room, &mut user));
    }
}
