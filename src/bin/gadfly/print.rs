use gadfly::cache::{Endpoint, QueryKey, Snapshot};
use serde::Serialize;
use serde_json::{Value, json};

use crate::context::CliError;

pub fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let out = serde_json::to_string_pretty(value).map_err(|e| CliError::Output(e.to_string()))?;
    println!("{out}");
    Ok(())
}

/// One-line JSON rendering used by the session loop.
pub fn json_line<T: Serialize>(value: &T) -> Result<String, CliError> {
    let mut line = serde_json::to_string(value).map_err(|e| CliError::Output(e.to_string()))?;
    line.push('\n');
    Ok(line)
}

pub fn snapshot_view(endpoint: Endpoint, key: &QueryKey, snapshot: &Snapshot) -> Value {
    json!({
        "endpoint": endpoint,
        "key": key.to_string(),
        "status": snapshot.status,
        "version": snapshot.version,
        "error": snapshot.error.as_ref().map(ToString::to_string),
        "items": snapshot.payload(),
    })
}
