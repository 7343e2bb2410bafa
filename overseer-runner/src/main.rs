//! The overseer-runner executable
//!
//! Compares two state snapshots given as JSON documents, without any
//! resource implementations, and prints what reconciling them would do.

mod interrupt;
mod logging;

use std::{io::IsTerminal as _, path::PathBuf, process::exit};

use anyhow::Result;
use clap::{ColorChoice, CommandFactory as _, Parser, Subcommand};
use overseer_runner::{plan_files, render_plan};
use tracing::debug;

fn main() {
    let args = Args::parse();
    handle_result(run_args(args));
}

fn run_args(args: Args) -> Result<()> {
    match &args.command {
        Commands::Plan { prev, next } => {
            logging::set_up(&logging::Options {
                verbose: args.options.verbose,
                color: use_color(args.options.color),
            })?;
            let token = interrupt::set_up_process_interrupt_handler()?;
            let plan = plan_files(prev.as_deref(), next)?;
            debug!(steps = plan.len(), "planned");
            if plan.is_empty() {
                println!("No changes.");
            } else {
                for line in render_plan(&plan, &token)? {
                    println!("{}", line);
                }
            }
            Ok(())
        }
        Commands::GenerateMan => {
            let cmd = Args::command();
            let man = clap_mangen::Man::new(cmd);
            let mut buffer: Vec<u8> = Default::default();
            man.render(&mut buffer)?;
            println!("{}", String::from_utf8(buffer)?);
            Ok(())
        }
        Commands::GenerateMarkdown => {
            let opts = clap_markdown::MarkdownOptions::new().show_footer(false);
            let markdown: String = clap_markdown::help_markdown_custom::<Args>(&opts);
            println!("{}", markdown);
            Ok(())
        }
        Commands::GenerateCompletion { shell } => {
            let mut cmd = Args::command();
            clap_complete::generate(
                *shell,
                &mut cmd,
                "overseer-runner",
                &mut std::io::stdout(),
            );
            Ok(())
        }
    }
}

fn use_color(choice: ColorChoice) -> bool {
    match choice {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => std::io::stderr().is_terminal(),
    }
}

fn handle_result(r: Result<()>) {
    match r {
        Ok(()) => {}
        Err(e) => {
            eprintln!("overseer-runner error: {:?}", e);
            exit(1);
        }
    }
}

/// Compare state snapshots and print the reconciliation plan
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    options: Options,
}

#[derive(Parser, Debug, Clone)]
struct Options {
    #[arg(short, long, global = true, default_value = "false")]
    verbose: bool,

    #[arg(long, global = true, default_value_t = ColorChoice::Auto)]
    color: ColorChoice,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the steps that take the previous state to the next state
    Plan {
        /// The previous state, as a JSON document. Empty if omitted.
        #[arg(long)]
        prev: Option<PathBuf>,

        /// The desired state, as a JSON document
        #[arg(long)]
        next: PathBuf,
    },

    /// Generate markdown documentation for overseer-runner
    #[command(hide = true)]
    GenerateMarkdown,

    /// Generate a manpage for overseer-runner
    #[command(hide = true)]
    GenerateMan,

    /// Generate shell completion for overseer-runner
    #[command(hide = true)]
    GenerateCompletion {
        /// The shell to generate completion for
        #[arg(long)]
        shell: clap_complete::Shell,
    },
}
