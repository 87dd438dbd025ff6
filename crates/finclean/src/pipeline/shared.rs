use std::sync::Arc;

use parking_lot::Mutex;

use super::Pipeline;

/// A [`Pipeline`] that several threads can drive.
///
/// Every call to [`with`](Self::with) runs under one lock, so operations and
/// their log entries never interleave.
#[derive(Clone)]
pub struct SharedPipeline {
    inner: Arc<Mutex<Pipeline>>,
}

impl SharedPipeline {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            inner: Arc::new(Mutex::new(pipeline)),
        }
    }

    /// Run `f` with exclusive access to the pipeline.
    pub fn with<R>(&self, f: impl FnOnce(&mut Pipeline) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }
}

impl From<Pipeline> for SharedPipeline {
    fn from(pipeline: Pipeline) -> Self {
        Self::new(pipeline)
    }
}

static_assertions::assert_impl_all!(SharedPipeline: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::OperationKind;
    use crate::source::ImportSource;
    use crate::types::ColumnSelection;
    use std::thread;

    #[test]
    fn test_operations_from_many_threads() {
        let shared = SharedPipeline::new(Pipeline::new());
        shared
            .with(|p| p.import(ImportSource::csv_text("a,b\n1,2\n3,4\n")).map(|_| ()))
            .unwrap();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let shared = shared.clone();
                thread::spawn(move || {
                    shared.with(|p| {
                        let result = if i % 2 == 0 {
                            p.normalize(ColumnSelection::all())
                        } else {
                            p.standardize(ColumnSelection::all())
                        };
                        result.map(|_| ())
                    })
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        shared.with(|p| {
            assert_eq!(p.log().len(), 5);
            assert_eq!(p.log()[0].operation, OperationKind::ImportData);
            let sequences: Vec<u64> = p.log().iter().map(|e| e.sequence).collect();
            assert_eq!(sequences, vec![0, 1, 2, 3, 4]);
        });
    }
}
