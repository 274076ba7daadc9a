//! Offload pass driver.
//!
//! Runs the pass over a textual call graph and prints the resulting graph,
//! the summary dump and the diagnostics.

use bumpalo::Bump;
use clap::Parser;
use offload_ipa::text_ir::Module;
use offload_ipa::{OffloadPass, PassOptions, PassSession, SymtabEncoder};
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

/// Interprocedural accelerator offload pass.
#[derive(Parser, Debug)]
#[command(name = "offload-ipa", version, about = "Interprocedural accelerator offload pass", long_about = None)]
struct Cli {
    /// Text IR input. Reads stdin when omitted.
    input: Option<PathBuf>,

    /// Do not run the pass (accelerator code generation not requested).
    #[arg(long, default_value_t = false)]
    no_offload: bool,

    /// Scan every definition for offload candidates.
    #[arg(long, default_value_t = false)]
    par_offload: bool,

    /// Report functions rejected by the candidate scan.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    /// Suppress warnings about functions that cannot be cloned.
    #[arg(long, default_value_t = false)]
    no_warn: bool,

    /// Read summary sections from these object files before running.
    #[arg(long = "summary", value_name = "OBJECT")]
    summaries: Vec<PathBuf>,

    /// Write the summary section object after running.
    #[arg(long, value_name = "PATH")]
    emit_summary: Option<PathBuf>,

    /// Print pass statistics.
    #[arg(long, default_value_t = false)]
    stats: bool,
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let text = match &cli.input {
        Some(path) => fs::read_to_string(path)?,
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };
    let mut module = Module::parse(&text)?;

    let options = PassOptions::new()
        .offload_requested(!cli.no_offload)
        .parallel_offload(cli.par_offload)
        .verbose(cli.verbose)
        .warn_offload(!cli.no_warn);

    let arena = Bump::new();
    let session = PassSession::new(&arena);
    let mut pass = OffloadPass::new(options);

    if !cli.summaries.is_empty() {
        let objects = cli
            .summaries
            .iter()
            .map(fs::read)
            .collect::<Result<Vec<_>, _>>()?;
        let files: Vec<&[u8]> = objects.iter().map(Vec::as_slice).collect();
        let encoder = SymtabEncoder::for_functions(&module);
        match pass.read_summary(&mut module, &encoder, &files) {
            Ok(entries) => {
                log::info!("Read {} summary entries from {} files", entries, files.len())
            }
            Err(e) if !e.is_fatal() => log::warn!("Ignoring malformed summary: {}", e),
            Err(e) => return Err(e.into()),
        }
    }

    if pass.gate() {
        pass.execute(&mut module, &session);
    } else {
        log::info!("Offload not requested; pass skipped");
    }

    if let Some(path) = &cli.emit_summary {
        let encoder = SymtabEncoder::for_functions(&module);
        match pass.write_summary(&module, &encoder)? {
            Some(object) => fs::write(path, object)?,
            None => log::warn!("No summaries to write to {}", path.display()),
        }
    }

    print!("{}", module);
    print!("{}", pass.dump(&module));
    for diag in session.diagnostics() {
        eprintln!("{}", diag);
    }
    if cli.stats {
        println!("{}", session.stats());
    }

    Ok(())
}
