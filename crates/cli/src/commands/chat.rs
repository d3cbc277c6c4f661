use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader};

use askdb_core::config::AppConfig;

use crate::commands::{build_agent, CommandResult};

const HELP: &str = "\
meta commands:\n  \
:new           start a fresh session\n  \
:sessions      list sessions in this process\n  \
:delete <id>   delete a session\n  \
:help          show this help\n  \
:quit          exit";

/// Interactive loop over one in-process conversation store. Questions reuse
/// the current session so follow-ups keep their context.
pub async fn run(config: &AppConfig) -> CommandResult {
    let (runtime, store) = match build_agent(config).await {
        Ok(parts) => parts,
        Err(error) => return CommandResult::failure("chat", "bootstrap", error.to_string(), 1),
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut session_id: Option<String> = None;

    println!("askdb chat - {}", HELP);
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(error) => return CommandResult::failure("chat", "stdin", error.to_string(), 1),
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line {
            ":quit" | ":q" => break,
            ":help" => {
                println!("{HELP}");
                continue;
            }
            ":new" => {
                session_id = None;
                println!("started a new session");
                continue;
            }
            ":sessions" => {
                let summaries = store.list().await;
                if summaries.is_empty() {
                    println!("no sessions yet");
                }
                for summary in summaries {
                    println!(
                        "{}  {}  {} messages  {}",
                        summary.session_id,
                        summary.created_at.to_rfc3339(),
                        summary.message_count,
                        summary.last_message_preview.unwrap_or_default()
                    );
                }
                continue;
            }
            _ => {}
        }

        if let Some(id) = line.strip_prefix(":delete ") {
            let id = id.trim();
            match store.delete(id).await {
                Ok(()) => println!("deleted {id}"),
                Err(error) => println!("{error}"),
            }
            if session_id.as_deref() == Some(id) {
                session_id = None;
            }
            continue;
        }

        match runtime.ask(session_id.as_deref(), line).await {
            Ok(outcome) => {
                session_id = Some(outcome.session_id);
                println!("{}", outcome.answer);
            }
            Err(error) => println!("error: {error}"),
        }
    }

    CommandResult::plain("bye")
}
