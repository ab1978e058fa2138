use std::hint::black_box;
use std::process;
use std::str::FromStr;

use clap::{Parser, Subcommand, ValueEnum};
use faultline_core::{call_stack, catch_faults, use_colors_on_stack_trace, CallStackAccessScope, Traceable, TraceableException};
use faultline_utils::{debug, init_logging, init_logging_with_level, LogFormat, LogLevel};

mod faults;

/// Print call stack traces and translated hardware faults of this process.
#[derive(Parser, Debug)]
#[command(name = "faultline")]
#[command(version)]
#[command(about = "Print call stack traces and translated hardware faults of this process", long_about = None)]
struct Cli
{
    /// Log level (error, warn, info, debug, trace); overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Print the trace of a recursive call chain
    Trace
    {
        /// Number of nested calls before capturing
        #[arg(short, long, default_value_t = 1)]
        depth: u32,
        /// Color the trace with ANSI escape codes
        #[arg(long, default_value_t = false)]
        color: bool,
    },
    /// Raise a hardware fault and print the exception it is translated into
    Fault
    {
        kind: FaultKind,
        /// Color the output with ANSI escape codes
        #[arg(long, default_value_t = false)]
        color: bool,
    },
    /// Create a traceable exception and print it
    Exception
    {
        /// Message of an inner error to wrap
        #[arg(long)]
        inner: Option<String>,
        /// Color the output with ANSI escape codes
        #[arg(long, default_value_t = false)]
        color: bool,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum FaultKind
{
    DivideByZero,
    NullRead,
    IllegalInstruction,
}

fn main()
{
    let cli = Cli::parse();

    let logging = match cli.log_level.as_deref().map(LogLevel::from_str) {
        Some(Ok(level)) => init_logging_with_level(level, LogFormat::Pretty),
        Some(Err(e)) => Err(e),
        None => init_logging(),
    };
    if let Err(e) = logging {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    if let Err(e) = run_command(cli.command) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run_command(command: Commands) -> Result<(), Box<dyn std::error::Error>>
{
    // Symbols stay loaded for the whole command
    let _symbols = CallStackAccessScope::new();

    match command {
        Commands::Trace { depth, color } => {
            debug!(depth, "capturing trace");
            print!("{}", trace_at_depth(depth.max(1), color));
            Ok(())
        }
        Commands::Fault { kind, color } => {
            use_colors_on_stack_trace(color);
            debug!(?kind, "raising fault");
            let raise = match kind {
                FaultKind::DivideByZero => faults::divide_by_zero,
                FaultKind::NullRead => faults::null_read,
                FaultKind::IllegalInstruction => faults::illegal_instruction,
            };
            match catch_faults(raise) {
                Ok(Ok(())) => Err("the fault was not raised".into()),
                Ok(Err(e)) => Err(e.into()),
                Err(fault) => {
                    println!("{}", fault.serialize());
                    Ok(())
                }
            }
        }
        Commands::Exception { inner, color } => {
            use_colors_on_stack_trace(color);
            let exception = match inner {
                Some(inner) => TraceableException::with_inner("demonstration exception", inner),
                None => TraceableException::new("demonstration exception"),
            };
            println!("{}", exception.serialize());
            Ok(())
        }
    }
}

#[inline(never)]
fn trace_at_depth(depth: u32, color: bool) -> String
{
    let trace = if black_box(depth) <= 1 {
        call_stack::get_trace(color)
    } else {
        trace_at_depth(depth - 1, color)
    };
    black_box(trace)
}
