//! Slash commands for interactive mode

use std::path::PathBuf;

use capchat_ai::ModelInfo;

/// Result of parsing a slash command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// Clear the conversation (the capture context stays)
    Clear,
    /// Load a capture file as context
    Load(PathBuf),
    /// Show the statistics of the loaded capture
    Stats,
    /// List the models the endpoint offers
    Models,
    /// Show a message to the user (not sent to the model)
    Message(String),
    /// Exit the application
    Exit,
    /// Unknown command
    Unknown(String),
}

/// Parse a slash command. Returns `None` for regular chat input.
pub fn execute_command(input: &str) -> Option<CommandResult> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.splitn(2, ' ');
    let command = parts.next().unwrap_or("").to_lowercase();
    let args = parts.next().map(str::trim).unwrap_or("");

    Some(match command.as_str() {
        "help" | "h" | "?" => CommandResult::Message(help_message()),

        "load" | "l" => {
            if args.is_empty() {
                CommandResult::Message("Usage: /load <file.pcap>".to_string())
            } else {
                CommandResult::Load(PathBuf::from(args))
            }
        }

        "stats" => CommandResult::Stats,

        "models" => CommandResult::Models,

        "clear" | "c" => CommandResult::Clear,

        "quit" | "exit" | "q" => CommandResult::Exit,

        _ => CommandResult::Unknown(command),
    })
}

/// Render a model list, marking the one in use
pub fn list_models_text(current: &str, models: &[ModelInfo]) -> String {
    if models.is_empty() {
        return "No models available".to_string();
    }

    let mut ids: Vec<&str> = models.iter().map(|m| m.id.as_str()).collect();
    ids.sort_unstable();

    let mut output = String::from("Available models:\n");
    for id in ids {
        let marker = if id == current { " *" } else { "" };
        output.push_str(&format!("  {}{}\n", id, marker));
    }
    output
}

fn help_message() -> String {
    r#"Available commands:
  /help, /h, /?        Show this help message
  /load, /l <file>     Load a .pcap capture; its statistics become the chat context
  /stats               Show the statistics of the loaded capture
  /models              List the models the endpoint offers
  /clear, /c           Clear conversation history (the loaded capture stays)
  /quit, /exit, /q     Exit capchat

Things to ask:
  What does the protocol distribution mean?
  Why would one source IP send most of the traffic?
  What is port 5353 used for?"#
        .to_string()
}
