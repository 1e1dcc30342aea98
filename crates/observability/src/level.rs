use serde::Serialize;

/// Severity attached to a structured event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

const ERROR_MARKERS: &[&str] = &["error", "fail"];
const WARN_MARKERS: &[&str] = &["warn", "rate_limit", "short_circuit", "circuit.opened"];

/// Infers the severity of an event from substrings of its name.
///
/// Error markers win over warning markers, so `llm.circuit.opened.failed`
/// is an error.
pub fn infer_level(event: &str) -> Level {
    let event = event.to_ascii_lowercase();

    if ERROR_MARKERS.iter().any(|m| event.contains(m)) {
        Level::Error
    } else if WARN_MARKERS.iter().any(|m| event.contains(m)) {
        Level::Warn
    } else {
        Level::Info
    }
}
