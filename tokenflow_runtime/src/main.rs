//! tokenflow-compile — compile declaration files and report their
//! canonical hashes.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use tokenflow_kernel::hashing::canonical_hash;
use tokenflow_runtime::catalog::Catalog;
use tokenflow_runtime::declaration::Declaration;
use tokenflow_runtime::logging::{init_logger, LogFormat};

#[derive(Parser)]
#[command(name = "tokenflow-compile")]
#[command(about = "Compile token-flow model declarations and print their canonical hashes")]
struct Args {
    /// Enable debug logging for the tokenflow crates
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Write every compiled snapshot to DIR/<schema>.json
    #[arg(long, value_name = "DIR")]
    out: Option<PathBuf>,

    /// Declaration files (.toml or .json)
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let format = if args.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    if let Err(e) = init_logger(args.verbose, format) {
        eprintln!("logger setup failed: {}", e);
    }

    let mut catalog = Catalog::new();
    let mut failed = 0usize;

    for path in &args.files {
        let compiled = Declaration::from_file(path)
            .and_then(|decl| decl.compile())
            .map_err(|e| e.to_string())
            .and_then(|snap| {
                let hash = canonical_hash(&snap).map_err(|e| e.to_string())?;
                Ok((snap, hash))
            });

        match compiled {
            Ok((snap, hash)) => {
                println!("[OK]   {} schema={} hash={}", path.display(), snap.schema, hash);
                if let Err(e) = catalog.publish(snap) {
                    error!(path = %path.display(), error = %e, "publish failed");
                    failed += 1;
                }
            }
            Err(msg) => {
                println!("[FAIL] {}: {}", path.display(), msg);
                failed += 1;
            }
        }
    }

    if let Some(dir) = &args.out {
        if let Err(e) = catalog.save_to_dir(dir) {
            error!(dir = %dir.display(), error = %e, "writing snapshots failed");
            return ExitCode::FAILURE;
        }
    }

    println!("\nCompiled {}/{} declarations.", args.files.len() - failed, args.files.len());
    if failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
