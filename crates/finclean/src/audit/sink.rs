//! Observers for operation log entries.

use super::log::OperationLogEntry;

/// Receives a copy of every entry appended to an
/// [`OperationLog`](super::OperationLog).
///
/// Implementations must be `Send + Sync` so a pipeline holding one can move
/// between threads.
///
/// # Example
///
/// ```rust
/// use finclean::{EntrySink, OperationLogEntry};
///
/// struct Stdout;
///
/// impl EntrySink for Stdout {
///     fn on_entry(&self, entry: &OperationLogEntry) {
///         println!("#{} {}", entry.sequence, entry.operation);
///     }
/// }
/// ```
pub trait EntrySink: Send + Sync {
    /// Called once per appended entry, after it is stored.
    ///
    /// Runs on the caller's thread while the pipeline is mid-operation, so
    /// implementations should return quickly.
    fn on_entry(&self, entry: &OperationLogEntry);
}

/// Wrapper that implements [`EntrySink`] using a closure.
///
/// # Example
///
/// ```rust
/// use finclean::Pipeline;
///
/// let pipeline = Pipeline::builder()
///     .on_entry(|entry| println!("{}", entry.operation))
///     .build()
///     .unwrap();
/// ```
pub struct ClosureEntrySink<F>
where
    F: Fn(&OperationLogEntry) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureEntrySink<F>
where
    F: Fn(&OperationLogEntry) + Send + Sync,
{
    /// Creates a new closure-based sink.
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> EntrySink for ClosureEntrySink<F>
where
    F: Fn(&OperationLogEntry) + Send + Sync,
{
    fn on_entry(&self, entry: &OperationLogEntry) {
        (self.callback)(entry);
    }
}
