//! Injected log sink
//!
//! Components never log through a global logger directly. They report to an
//! [`Observer`] handed to them at construction time.

use log::Level;
use std::sync::Arc;

pub trait Observer: Send + Sync {
    fn log(&self, level: Level, message: &str);
}

/// Forwards every event to the `log` facade.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn log(&self, level: Level, message: &str) {
        log::log!(target: "softap_provisioner", level, "{message}");
    }
}

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullObserver;

impl Observer for NullObserver {
    fn log(&self, _level: Level, _message: &str) {}
}

pub fn default_observer() -> Arc<dyn Observer> {
    Arc::new(LogObserver)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Keeps every event for later inspection
    #[derive(Default)]
    pub struct RecordingObserver {
        events: Mutex<Vec<(Level, String)>>,
    }

    impl RecordingObserver {
        pub fn events(&self) -> Vec<(Level, String)> {
            self.events.lock().unwrap().clone()
        }

        pub fn contains(&self, level: Level, needle: &str) -> bool {
            self.events()
                .iter()
                .any(|(l, message)| *l == level && message.contains(needle))
        }
    }

    impl Observer for RecordingObserver {
        fn log(&self, level: Level, message: &str) {
            self.events
                .lock()
                .unwrap()
                .push((level, message.to_string()));
        }
    }
}
