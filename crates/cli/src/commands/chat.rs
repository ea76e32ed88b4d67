use examdesk_agent::AgentRuntime;
use examdesk_core::config::LoadOptions;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use uuid::Uuid;

use crate::commands::{
    async_runtime, init_logging, load_config, CommandResult, Engine, StartupError,
};

const GREETING: &str = "Connected. Type a message, '/reset' to start over, or 'exit' to quit.";
const PROMPT: &str = "you> ";

pub fn run(options: &LoadOptions, session_id: Option<String>) -> CommandResult {
    let config = match load_config(options) {
        Ok(config) => config,
        Err(error) => return CommandResult::startup_failure("chat", error),
    };
    init_logging(&config);

    let runtime = match async_runtime() {
        Ok(runtime) => runtime,
        Err(error) => return CommandResult::startup_failure("chat", error),
    };
    let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());

    let result = runtime.block_on(async {
        let engine = Engine::start(&config).await?;
        let stdin = BufReader::new(tokio::io::stdin());
        let mut stdout = tokio::io::stdout();
        let turns = converse(&engine.runtime, &session_id, stdin, &mut stdout)
            .await
            .map_err(StartupError::Runtime);
        engine.shutdown().await;
        turns
    });

    match result {
        Ok(turns) => CommandResult {
            exit_code: 0,
            output: format!("Session {session_id} closed after {turns} turn(s)."),
        },
        Err(error) => CommandResult::startup_failure("chat", error),
    }
}

/// Reads one utterance per line until EOF or `exit`, returning how many turns
/// reached the assistant.
pub async fn converse<R, W>(
    runtime: &AgentRuntime,
    session_id: &str,
    input: R,
    output: &mut W,
) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut turns = 0;

    output.write_all(format!("{GREETING}\n\n{PROMPT}").as_bytes()).await?;
    output.flush().await?;

    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        match text {
            "" => {}
            "exit" | "quit" => break,
            "/reset" => {
                runtime.reset_session(session_id).await;
                output.write_all(b"Session cleared.\n\n").await?;
            }
            _ => {
                let reply = runtime.handle_turn(session_id, text).await;
                turns += 1;
                output.write_all(format!("{reply}\n\n").as_bytes()).await?;
            }
        }
        output.write_all(PROMPT.as_bytes()).await?;
        output.flush().await?;
    }

    output.write_all(b"\n").await?;
    output.flush().await?;
    Ok(turns)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Arc;

    use examdesk_agent::{AgentRuntime, OperationRegistry};
    use examdesk_core::domain::SlotField;
    use examdesk_exambuilder::{register_backend, InMemoryExamBuilder};

    use super::converse;

    fn demo_runtime() -> AgentRuntime {
        let mut registry = OperationRegistry::default();
        register_backend(&mut registry, Arc::new(InMemoryExamBuilder::seeded()));
        AgentRuntime::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn each_line_is_one_turn_in_the_same_session() {
        let runtime = demo_runtime();
        let input = Cursor::new("I want to create a student account\nDina\n\nexit\nRocha\n");
        let mut output = Vec::new();

        let turns = converse(&runtime, "term", input, &mut output).await.expect("converse");

        assert_eq!(turns, 2);
        let transcript = String::from_utf8(output).expect("utf8");
        assert!(transcript.contains("Hi Dina!"), "{transcript}");
        let session = runtime.snapshot("term").await.expect("session");
        assert_eq!(session.slots.get(SlotField::FirstName), Some("Dina"));
        assert!(!session.slots.has(SlotField::LastName));
    }

    #[tokio::test]
    async fn reset_command_clears_the_session() {
        let runtime = demo_runtime();
        let input = Cursor::new("I want to create a student account\n/reset\n");
        let mut output = Vec::new();

        let turns = converse(&runtime, "term", input, &mut output).await.expect("converse");

        assert_eq!(turns, 1);
        assert!(String::from_utf8(output).expect("utf8").contains("Session cleared."));
        let session = runtime.snapshot("term").await.expect("session");
        assert!(session.awaiting_field.is_none());
    }
}
