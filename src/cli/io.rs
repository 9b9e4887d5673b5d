//! CLI output helpers.
//!
//! Command results are emitted as pretty-printed JSON on stdout, errors
//! as single-line JSON on stderr.

use serde_json::Value;

/// Print a command result to stdout.
pub fn write_response(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(_) => println!("{}", value),
    }
}

/// Print an error to stderr.
pub fn write_error(code: &str, message: &str) {
    let error = serde_json::json!({
        "status": "error",
        "code": code,
        "message": message,
    });
    eprintln!("{}", error);
}
