#![warn(missing_docs)]
//! Trackbench Backends
//!
//! Reference adapters behind the `Backend`/`Session` capability interface:
//! - `null`: builds every record and discards it (harness overhead baseline)
//! - `file`: a local run store laid out like an offline experiment directory
//!
//! Spawned workers rebuild their adapter from `BenchmarkConfig::backend`, so
//! every adapter must be constructible by name.

mod file;
mod null;

pub use file::FileBackend;
pub use null::NullBackend;

use trackbench_core::{Backend, ConfigError};

/// Names accepted by [`backend_by_name`]
pub const BACKEND_NAMES: [&str; 2] = ["file", "null"];

/// Build an adapter from its name
pub fn backend_by_name(name: &str) -> Result<Box<dyn Backend>, ConfigError> {
    match name {
        "file" => Ok(Box::new(FileBackend)),
        "null" => Ok(Box::new(NullBackend)),
        other => Err(ConfigError::UnknownBackend {
            name: other.to_string(),
            available: BACKEND_NAMES.join(", "),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name() {
        for name in BACKEND_NAMES {
            assert_eq!(backend_by_name(name).unwrap().name(), name);
        }
        assert!(matches!(
            backend_by_name("comet"),
            Err(ConfigError::UnknownBackend { .. })
        ));
    }
}
