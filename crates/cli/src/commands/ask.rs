use examdesk_core::config::LoadOptions;
use uuid::Uuid;

use crate::commands::{
    async_runtime, init_logging, load_config, CommandResult, Engine, StartupError,
};

/// One turn against the configured backend. Without `--session` a fresh id is
/// used, so only a sqlite session store carries memory between invocations.
pub fn run(
    options: &LoadOptions,
    message: &str,
    session_id: Option<String>,
    json: bool,
) -> CommandResult {
    let message = message.trim();
    if message.is_empty() {
        return CommandResult::failure("ask", "invalid_input", "message must not be empty", 1);
    }

    let config = match load_config(options) {
        Ok(config) => config,
        Err(error) => return CommandResult::startup_failure("ask", error),
    };
    init_logging(&config);

    let runtime = match async_runtime() {
        Ok(runtime) => runtime,
        Err(error) => return CommandResult::startup_failure("ask", error),
    };
    let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());

    let result = runtime.block_on(async {
        let engine = Engine::start(&config).await?;
        let reply = engine.runtime.handle_turn(&session_id, message).await;
        engine.shutdown().await;
        Ok::<_, StartupError>(reply)
    });

    match result {
        Ok(reply) if json => CommandResult::reply("ask", &session_id, reply),
        Ok(reply) => CommandResult { exit_code: 0, output: reply },
        Err(error) => CommandResult::startup_failure("ask", error),
    }
}
