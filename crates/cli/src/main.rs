use std::process::ExitCode;

fn main() -> ExitCode {
    flowmaster_cli::run()
}
