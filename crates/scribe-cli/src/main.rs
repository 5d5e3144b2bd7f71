use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use scribe_core::{init_tracing, InstrumentationConfig};
use scribe_cli::{instrument_file, run_file, ConfigOverrides, Emit};

#[derive(Parser)]
#[command(
    name = "scribe",
    version = scribe_core::VERSION,
    about = "Source-level method instrumentation"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Instrument a JSON compilation unit and print the result
    Instrument {
        /// Compilation unit as JSON
        unit: PathBuf,

        #[arg(long, value_enum, default_value_t = Emit::Source)]
        emit: Emit,

        #[command(flatten)]
        switches: Switches,
    },
    /// Instrument a unit, then call one method with a logging trace sink
    Run {
        unit: PathBuf,

        /// Class name, simple or fully qualified
        #[arg(long)]
        class: String,

        #[arg(long)]
        method: String,

        /// Integer argument, repeat for each parameter
        #[arg(long = "arg", allow_negative_numbers = true)]
        args: Vec<i64>,

        #[command(flatten)]
        switches: Switches,
    },
}

#[derive(Args, Debug, Clone, Copy)]
struct Switches {
    /// Only instrument classes or methods marked for inclusion
    #[arg(long)]
    annotated_only: bool,

    /// Do not report assignments
    #[arg(long)]
    no_value_changes: bool,

    /// Do not report uncaught errors
    #[arg(long)]
    no_errors: bool,

    /// Do not report returned values
    #[arg(long)]
    no_returning: bool,
}

impl Switches {
    fn config(self) -> InstrumentationConfig {
        ConfigOverrides {
            annotated_only: self.annotated_only,
            no_value_changes: self.no_value_changes,
            no_errors: self.no_errors,
            no_returning: self.no_returning,
        }
        .apply(InstrumentationConfig::from_env())
    }
}

fn main() -> Result<()> {
    // Initialize logging
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Commands::Instrument {
            unit,
            emit,
            switches,
        } => {
            let (output, _report) = instrument_file(&unit, switches.config(), emit)?;
            println!("{output}");
        }
        Commands::Run {
            unit,
            class,
            method,
            args,
            switches,
        } => {
            let value = run_file(&unit, switches.config(), &class, &method, &args)?;
            println!("{}", value.snapshot());
        }
    }
    Ok(())
}
