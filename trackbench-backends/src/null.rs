//! Null Backend
//!
//! Generates the full workload and drops it. Rows produced with this backend
//! measure harness and payload-generation overhead only.

use trackbench_core::{Backend, BackendError, BenchmarkConfig, HistoryRecord, RunIndex, Session};

/// Adapter that discards every record
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBackend;

struct NullSession {
    values: usize,
}

impl Backend for NullBackend {
    fn name(&self) -> &str {
        "null"
    }

    fn client_version(&self) -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }

    fn begin_session(
        &self,
        _config: &BenchmarkConfig,
        _run: RunIndex,
    ) -> Result<Box<dyn Session>, BackendError> {
        Ok(Box::new(NullSession { values: 0 }))
    }
}

impl Session for NullSession {
    fn log_record(&mut self, record: &HistoryRecord) -> Result<(), BackendError> {
        self.values += std::hint::black_box(record).value_count();
        Ok(())
    }

    fn end(self: Box<Self>) -> Result<(), BackendError> {
        tracing::trace!(values = self.values, "null session closed");
        Ok(())
    }
}
