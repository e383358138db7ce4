use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut verbose = 0u8;
    let mut workspace_root = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "-v" | "--verbose" => verbose = verbose.saturating_add(1),
            "-vv" => verbose = verbose.saturating_add(2),
            _ => workspace_root = Some(PathBuf::from(arg)),
        }
    }

    if let Err(error) = dayplanner::init_tracing(verbose) {
        eprintln!("dayplanner: {error}");
        return ExitCode::FAILURE;
    }

    let workspace_root = match workspace_root {
        Some(path) => path,
        None => match std::env::current_dir() {
            Ok(path) => path,
            Err(error) => {
                eprintln!("dayplanner: failed to resolve current directory: {error}");
                return ExitCode::FAILURE;
            }
        },
    };

    match dayplanner::run(workspace_root) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("dayplanner: {error}");
            ExitCode::FAILURE
        }
    }
}
