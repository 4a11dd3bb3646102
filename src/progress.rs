//! Progress reporting for imports.
//!
//! Sinks are called inline on the importing thread; they observe the
//! pipeline and never influence it.

use std::error::Error;
use std::fmt::Write;

pub trait ProgressSink {
    /// `fraction` is in `[0.0, 1.0]` but is not guaranteed to increase:
    /// per-entry diagnostics are reported at `0.0`.
    fn notify(&mut self, fraction: f32, message: &str);
}

impl<F> ProgressSink for F
where
    F: FnMut(f32, &str),
{
    fn notify(&mut self, fraction: f32, message: &str) {
        self(fraction, message)
    }
}

/// Discards every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn notify(&mut self, _fraction: f32, _message: &str) {}
}

/// Describes an error with its full chain of causes, one per line.
pub fn describe_error(err: &dyn Error) -> String {
    let mut out = String::with_capacity(256);
    out.push_str(&err.to_string());

    let mut source = err.source();
    while let Some(inner) = source {
        let _ = write!(out, "\n < {}", inner);
        source = inner.source();
    }

    out
}
