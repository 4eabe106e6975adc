use ridematch_agent::{render_outcome, AgentRuntime};
use ridematch_core::config::LoadOptions;
use ridematch_core::domain::conversation::Conversation;
use ridematch_core::errors::ApplicationError;
use uuid::Uuid;

use crate::commands::{
    async_runtime, exit_code_for, load_config, CommandResult, EXIT_TRANSIENT_UPSTREAM,
};

const COMMAND: &str = "ask";

/// Runs one turn for `message` and reports the outcome, the fallback flag and
/// the turn's correlation id as JSON.
pub fn run(message: &str, options: LoadOptions) -> CommandResult {
    let config = match load_config(COMMAND, options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match async_runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let agent = AgentRuntime::from_config(&config).await?;
        agent.handle_turn(&Conversation::from_user_messages([message])).await
    });

    match result {
        Ok(report) => {
            let reply = render_outcome(&report.outcome);
            match serde_json::to_value(&report) {
                Ok(details) => CommandResult::success_with(COMMAND, reply, Some(details)),
                Err(error) => CommandResult::failure(
                    COMMAND,
                    "serialization",
                    format!("turn report could not be serialized: {error}"),
                    1,
                ),
            }
        }
        Err(error) => failure(error),
    }
}

fn failure(error: ApplicationError) -> CommandResult {
    let error_class = error.class();
    let exit_code = exit_code_for(&error);
    tracing::warn!(
        event_name = "cli.ask.failed",
        error_class,
        error = %error,
        "turn failed"
    );

    let detail = error.to_string();
    let interface = error.into_interface(Uuid::new_v4().to_string());
    let message = match exit_code {
        EXIT_TRANSIENT_UPSTREAM => interface.user_message().to_string(),
        _ => format!("{} ({detail})", interface.user_message()),
    };
    CommandResult::failure_with(
        COMMAND,
        error_class,
        message,
        Some(interface.correlation_id().to_string()),
        exit_code,
    )
}
