pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "flowmaster",
    about = "FlowMaster operator CLI",
    long_about = "Apply migrations, provision the demo account, register employees, and inspect configuration.",
    after_help = "Examples:\n  flowmaster migrate\n  flowmaster seed\n  flowmaster employee add --username zhangsan --real-name 张三 --role worker\n  flowmaster config"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Create the read-only demo account `admin` if it does not exist yet")]
    Seed,
    #[command(about = "Manage employee records")]
    Employee {
        #[command(subcommand)]
        action: EmployeeCommand,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
}

#[derive(Debug, Subcommand)]
enum EmployeeCommand {
    #[command(about = "Register a new employee")]
    Add {
        #[arg(long, help = "Unique login name")]
        username: String,
        #[arg(long, help = "Display name used in reports")]
        real_name: String,
        #[arg(long, help = "worker | staff | manager")]
        role: String,
        #[arg(long, help = "Mark the account read-only")]
        demo: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Employee { action: EmployeeCommand::Add { username, real_name, role, demo } } => {
            commands::employee::add(&username, &real_name, &role, demo)
        }
        Command::Config => commands::config::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
