//! Process start method
//!
//! Fork or spawn is chosen once per harness process, before the first worker
//! exists, and cannot change afterwards.

use std::fmt;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use trackbench_core::ConfigError;

/// How worker processes are created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartMethod {
    /// Copy the current process image (`fork`)
    #[default]
    Fork,
    /// Start a fresh image of the current executable
    Spawn,
}

impl StartMethod {
    /// `Spawn` when `use_spawn` is set
    pub fn from_use_spawn(use_spawn: bool) -> Self {
        if use_spawn {
            StartMethod::Spawn
        } else {
            StartMethod::Fork
        }
    }
}

impl fmt::Display for StartMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartMethod::Fork => f.write_str("fork"),
            StartMethod::Spawn => f.write_str("spawn"),
        }
    }
}

static START_METHOD: OnceLock<StartMethod> = OnceLock::new();
static SPAWNING_BEGUN: AtomicBool = AtomicBool::new(false);

/// Set the process-wide start method.
///
/// Fails when a method was already chosen or when workers were already
/// started with the default.
pub fn set_start_method(method: StartMethod) -> Result<(), ConfigError> {
    if SPAWNING_BEGUN.load(Ordering::SeqCst) {
        return Err(ConfigError::StartMethodAfterSpawn);
    }
    START_METHOD
        .set(method)
        .map_err(|_| ConfigError::StartMethodAlreadySet)
}

/// Method in effect; fixes the default if none was set
pub fn start_method() -> StartMethod {
    *START_METHOD.get_or_init(StartMethod::default)
}

/// Record that workers are being created and return the method to use
pub(crate) fn begin_spawning() -> StartMethod {
    let method = start_method();
    SPAWNING_BEGUN.store(true, Ordering::SeqCst);
    method
}

#[cfg(test)]
mod tests {
    use super::*;

    // Global state: a single test covers the whole lifecycle.
    #[test]
    fn test_start_method_is_set_once() {
        assert_eq!(StartMethod::from_use_spawn(true), StartMethod::Spawn);
        assert_eq!(StartMethod::from_use_spawn(false).to_string(), "fork");

        assert!(set_start_method(StartMethod::Spawn).is_ok());
        assert_eq!(start_method(), StartMethod::Spawn);
        assert_eq!(
            set_start_method(StartMethod::Fork),
            Err(ConfigError::StartMethodAlreadySet)
        );

        assert_eq!(begin_spawning(), StartMethod::Spawn);
        assert_eq!(
            set_start_method(StartMethod::Spawn),
            Err(ConfigError::StartMethodAfterSpawn)
        );
    }
}
