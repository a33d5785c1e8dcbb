//! Decoding of the worker result protocol.
//!
//! Workers write free-form progress text to stdout and, as their last output
//! line, one JSON object carrying at least a `status` field. Everything
//! before the trailer is diagnostic only.

use crate::stage::Stage;
use crate::worker::types::{ResultRecord, ResultStatus};

/// Decode a worker's full stdout into a [`ResultRecord`].
///
/// The last non-empty line is decoded as the structured trailer. If there is
/// no decodable trailer (the worker emitted only progress text, or crashed
/// mid-log while still exiting 0), the whole output is wrapped in a
/// synthesized success record with the text under `message`.
///
/// That fallback is intentional leniency, not error masking: it keeps the
/// pipeline progressing for workers that produce only diagnostic output. A
/// stricter sentinel-delimited protocol could be swapped in behind this
/// function without touching callers.
pub fn parse_result(stage: Stage, stdout: &str) -> ResultRecord {
    if let Some(trailer) = last_non_empty_line(stdout) {
        if let Some((status, payload)) = decode_trailer(trailer) {
            return ResultRecord {
                stage,
                status,
                payload,
                raw: stdout.to_string(),
            };
        }
        tracing::debug!(%stage, trailer, "no decodable trailer, using raw output");
    }

    let mut payload = serde_json::Map::new();
    payload.insert(
        "message".to_string(),
        serde_json::Value::String(stdout.to_string()),
    );

    ResultRecord {
        stage,
        status: ResultStatus::Success,
        payload,
        raw: stdout.to_string(),
    }
}

fn last_non_empty_line(text: &str) -> Option<&str> {
    text.lines().rev().map(str::trim).find(|line| !line.is_empty())
}

/// Decode one line as the trailer: a JSON object with a valid `status`.
fn decode_trailer(
    line: &str,
) -> Option<(ResultStatus, serde_json::Map<String, serde_json::Value>)> {
    let serde_json::Value::Object(mut map) = serde_json::from_str(line).ok()? else {
        return None;
    };
    let status_value = map.remove("status")?;
    let status: ResultStatus = serde_json::from_value(status_value).ok()?;
    Some((status, map))
}
