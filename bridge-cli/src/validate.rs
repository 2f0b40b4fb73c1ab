use crate::cli::Cli;

/// Validates flag combinations that `clap` itself cannot express.
///
/// Hard errors return `Err(message)`; the caller exits with status 2 in
/// that case. Anything else is a warning printed to stderr that does not
/// prevent the bridge from starting.
pub fn validate(cli: &Cli) -> Result<(), String> {
    // Rule 1: at least one proto file is required.
    if cli.protos.is_empty() {
        return Err("The --proto argument is required (no proto files given).".into());
    }

    // Rule 2: --tls-ca only makes sense with --secure.
    if cli.tls_ca.is_some() && !cli.secure {
        return Err("The --tls-ca argument can only be used with --secure.".into());
    }

    // Rule 3: pointing at an https:// target without --secure is almost
    // certainly a mistake, but not fatal.
    if !cli.secure && cli.default_target.starts_with("https://") {
        warn("--default-target looks like an https:// URL but --secure was not given.");
    }

    Ok(())
}

fn warn(msg: &str) {
    eprintln!("Warning: {msg}");
}
