mod commands;
mod context;
mod examples;
mod output;
mod theme;

use std::fmt::Write;
use std::process::ExitCode;

use anyhow::Result;
use clap::builder::Styles;
use clap::builder::styling::AnsiColor;
use clap::{Parser, Subcommand};
use colored::Colorize;

use commands::apply::{ApplyArgs, handle_apply};
use commands::check::{CheckArgs, handle_check};
use commands::plan::{PlanArgs, handle_plan};
use output::{GlobalOptions, OutputFormat, OutputManager};
use theme::THEME;

const ENVIRONMENT_VARIABLES: &[(&str, &str)] = &[
    ("MONGODB_URL", "Connection URL for the target database"),
    ("MONGODB_DB", "Name of the database to reconcile"),
];

#[derive(Parser)]
#[command(name = "schemactl")]
#[command(version = "0.1.0")]
#[command(about = "Declarative collection provisioning for document databases")]
#[command(
    long_about = r#"Declarative collection provisioning for document databases.

Collections are described as JSON definitions (validator schema + indexes);
schemactl inspects the live database, computes the minimal reconciliation
plan, and applies it idempotently.

Commands:
  apply   Reconcile the database to match the definitions
  plan    Show the operations a reconciliation would perform
  check   Validate definition sources without touching a database
"#
)]
#[command(styles = help_styles())]
#[command(after_long_help = render_appendix())]
#[command(subcommand_required = true, arg_required_else_help = true)]
struct Cli {
    /// Output format
    #[arg(long, value_enum, default_value = "table", global = true)]
    output: OutputFormat,

    /// Suppress output (only errors will be shown)
    #[arg(short = 'q', long, global = true)]
    quiet: bool,

    /// Enable verbose output
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile the database to match the definitions
    #[command(after_long_help = examples::render(commands::apply::EXAMPLES))]
    Apply(ApplyArgs),

    /// Show the operations a reconciliation would perform
    #[command(after_long_help = examples::render(commands::plan::EXAMPLES))]
    Plan(PlanArgs),

    /// Validate definition sources without touching a database
    #[command(after_long_help = examples::render(commands::check::EXAMPLES))]
    Check(CheckArgs),
}

fn help_styles() -> Styles {
    Styles::styled()
        .usage(AnsiColor::BrightBlue.on_default().bold())
        .header(AnsiColor::Cyan.on_default().bold())
        .literal(AnsiColor::Magenta.on_default())
        .placeholder(AnsiColor::BrightBlack.on_default())
        .valid(AnsiColor::Green.on_default())
        .invalid(AnsiColor::Yellow.on_default())
        .error(AnsiColor::Red.on_default().bold())
}

fn render_appendix() -> String {
    let mut buffer = String::new();

    let _ = writeln!(buffer, "{}", "Environment Variables:".color(THEME.highlight).bold());
    for (key, description) in ENVIRONMENT_VARIABLES {
        let _ = writeln!(
            buffer,
            "  {}  {}",
            key.color(THEME.key).bold(),
            description.color(THEME.value)
        );
    }

    buffer.push('\n');
    let _ = writeln!(
        buffer,
        "{} {}",
        "Tip:".color(THEME.highlight).bold(),
        "Use 'schemactl <command> --help' to view examples for each command.".color(THEME.muted)
    );

    buffer
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let output = OutputManager::new(GlobalOptions {
        output_format: cli.output,
        quiet: cli.quiet,
        verbose: cli.verbose,
        no_color: cli.no_color,
    });

    match execute(cli.command, &output).await {
        Ok(code) => code,
        Err(err) => {
            output.error(&format!("{err:#}"));
            ExitCode::from(commands::EXIT_FAILED_OPS)
        }
    }
}

async fn execute(command: Commands, output: &OutputManager) -> Result<ExitCode> {
    match command {
        Commands::Apply(args) => handle_apply(args, output).await,
        Commands::Plan(args) => handle_plan(args, output).await,
        Commands::Check(args) => handle_check(args, output).await,
    }
}
