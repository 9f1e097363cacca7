use sv_core::Error;

/// Whether a failure should feed the failover/backoff loop or surface
/// immediately.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Classification {
    Retryable,
    Terminal,
}

/// Classifies a raw I/O or protocol failure. Connection resets, timeouts,
/// and transient auth responses are retryable; a server's hard refusal
/// (bad credentials, posting rejected by policy) is terminal.
pub fn classify_io(err: &std::io::Error) -> Classification {
    use std::io::ErrorKind::*;
    match err.kind() {
        TimedOut | Interrupted | ConnectionReset | ConnectionAborted | BrokenPipe
        | WouldBlock | UnexpectedEof => Classification::Retryable,
        _ => Classification::Terminal,
    }
}

pub fn to_core_error(context: &str, classification: Classification, detail: impl std::fmt::Display) -> Error {
    match classification {
        Classification::Retryable => Error::TransportRetryable(format!("{context}: {detail}")),
        Classification::Terminal => Error::TransportTerminal(format!("{context}: {detail}")),
    }
}
