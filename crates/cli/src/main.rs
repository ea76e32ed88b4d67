use std::process::ExitCode;

fn main() -> ExitCode {
    examdesk_cli::run()
}
