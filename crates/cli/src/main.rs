use std::process::ExitCode;

fn main() -> ExitCode {
    stagecraft_cli::run()
}
