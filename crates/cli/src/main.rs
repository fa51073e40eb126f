use std::process::ExitCode;

fn main() -> ExitCode {
    emsbot_cli::run()
}
