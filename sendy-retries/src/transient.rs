//! Classification of failures that are worth another attempt.

/// Errors that can tell whether a fresh attempt might succeed.
///
/// Only transport-level failures should answer `true`. A response that was
/// received, whatever its status, is not an error at this layer and is
/// therefore never retried.
pub trait Transient {
    /// Whether the failure is temporary.
    fn is_transient(&self) -> bool;
}

impl Transient for reqwest::Error {
    fn is_transient(&self) -> bool {
        // is_timeout covers the per-attempt deadline firing while awaiting headers.
        self.is_connect() || self.is_timeout() || has_transient_io_source(self)
    }
}

/// Whether any `io::Error` in the source chain of `error` is transient.
///
/// Resets and aborts on an established connection surface as request
/// errors, with the socket error buried a few layers down.
fn has_transient_io_source(error: &(dyn std::error::Error + 'static)) -> bool {
    let mut source = error.source();
    while let Some(cause) = source {
        if cause
            .downcast_ref::<std::io::Error>()
            .is_some_and(Transient::is_transient)
        {
            return true;
        }
        source = cause.source();
    }
    false
}

impl Transient for std::io::Error {
    fn is_transient(&self) -> bool {
        use std::io::ErrorKind;

        matches!(
            self.kind(),
            ErrorKind::ConnectionRefused
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::BrokenPipe
                | ErrorKind::Interrupted
                | ErrorKind::TimedOut
                | ErrorKind::WouldBlock
        )
    }
}
