use examdesk_core::config::{LoadOptions, SessionStoreKind};

use crate::commands::{
    async_runtime, load_config, open_session_database, CommandResult, StartupError,
};

pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match load_config(options) {
        Ok(config) => config,
        Err(error) => return CommandResult::startup_failure("migrate", error),
    };

    if config.database.store == SessionStoreKind::Memory {
        return CommandResult::success(
            "migrate",
            "sessions are kept in memory; set database.store = \"sqlite\" to persist them",
        );
    }

    let runtime = match async_runtime() {
        Ok(runtime) => runtime,
        Err(error) => return CommandResult::startup_failure("migrate", error),
    };

    let result = runtime.block_on(async {
        let pool = open_session_database(&config).await?;
        pool.close().await;
        Ok::<(), StartupError>(())
    });

    match result {
        Ok(()) => CommandResult::success(
            "migrate",
            format!("applied pending migrations to `{}`", config.database.url),
        ),
        Err(error) => CommandResult::startup_failure("migrate", error),
    }
}
