use std::sync::Arc;

use ridematch_agent::{render_outcome, AgentRuntime, Session};
use ridematch_core::config::LoadOptions;
use ridematch_core::errors::ApplicationError;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use uuid::Uuid;

use crate::commands::{async_runtime, exit_code_for, load_config, CommandResult};

const COMMAND: &str = "chat";
const EXIT_WORDS: &[&str] = &["exit", "quit", ":q"];
const GREETING: &str =
    "Tell me what kind of motorcycle you are after. Type `exit` or press Ctrl-D to leave.";

/// Interactive session over stdin. Replies go to stdout; the JSON summary is
/// printed once the session ends.
pub fn run(options: LoadOptions) -> CommandResult {
    let config = match load_config(COMMAND, options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match async_runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    match runtime.block_on(chat_loop(config)) {
        Ok(turns) => CommandResult::success(COMMAND, format!("session ended after {turns} turn(s)")),
        Err(error) => {
            CommandResult::failure(COMMAND, error.class(), error.to_string(), exit_code_for(&error))
        }
    }
}

async fn chat_loop(config: ridematch_core::config::AppConfig) -> Result<usize, ApplicationError> {
    let agent = AgentRuntime::from_config(&config).await?;
    let mut session = Session::new(Arc::new(agent));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut turns = 0_usize;

    write_line(&mut stdout, GREETING).await;
    loop {
        write_prompt(&mut stdout).await;
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => {
                info!(event_name = "cli.chat.interrupted", "chat interrupted");
                break;
            }
        };

        let message = match line {
            Ok(Some(line)) => line.trim().to_string(),
            Ok(None) => break,
            Err(error) => {
                warn!(event_name = "cli.chat.stdin_failed", error = %error, "stdin read failed");
                break;
            }
        };
        if message.is_empty() {
            continue;
        }
        if EXIT_WORDS.contains(&message.to_ascii_lowercase().as_str()) {
            break;
        }

        turns += 1;
        match session.send(message).await {
            Ok(report) => write_line(&mut stdout, &render_outcome(&report.outcome)).await,
            Err(error) if error.is_transient() => {
                let interface = error.into_interface(Uuid::new_v4().to_string());
                warn!(
                    event_name = "cli.chat.turn_failed",
                    correlation_id = interface.correlation_id(),
                    error = %interface,
                    "turn failed"
                );
                write_line(&mut stdout, interface.user_message()).await;
            }
            Err(error) => return Err(error),
        }
    }

    Ok(turns)
}

async fn write_prompt(stdout: &mut tokio::io::Stdout) {
    if stdout.write_all(b"> ").await.is_ok() {
        let _ = stdout.flush().await;
    }
}

async fn write_line(stdout: &mut tokio::io::Stdout, text: &str) {
    let rendered = format!("{text}\n\n");
    if let Err(error) = stdout.write_all(rendered.as_bytes()).await {
        warn!(event_name = "cli.chat.stdout_failed", error = %error, "stdout write failed");
    }
    let _ = stdout.flush().await;
}
