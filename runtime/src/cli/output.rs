//! Global output switches, shared with every command through the environment.

use serde::Serialize;

pub const JSON_ENV: &str = "PQC_JSON";
pub const QUIET_ENV: &str = "PQC_QUIET";
pub const VERBOSE_ENV: &str = "PQC_VERBOSE";

fn flag(name: &str) -> bool {
    std::env::var(name).map(|v| v == "1").unwrap_or(false)
}

/// `--json`: machine-readable output on stdout.
pub fn is_json() -> bool {
    flag(JSON_ENV)
}

/// `--quiet`, or implied by `--json`.
pub fn is_quiet() -> bool {
    flag(QUIET_ENV) || is_json()
}

pub fn is_verbose() -> bool {
    flag(VERBOSE_ENV)
}

/// Pretty-print a JSON document on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("  Error: failed to serialize output: {e}"),
    }
}
