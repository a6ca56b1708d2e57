use serde::{Deserialize, Serialize};

use crate::scheduler::FlushMode;

/// Watcher configuration.
///
/// Deserializes from a partial object; missing fields take their defaults.
///
/// ```rust
/// use ripple_core::{FlushMode, WatchOptions};
///
/// let options = WatchOptions::from_json(r#"{ "flush": "post", "deep": true }"#).unwrap();
/// assert_eq!(options, WatchOptions::default().deep().flush(FlushMode::Post));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    /// Call the callback once at registration.
    pub immediate: bool,
    /// Track every property reachable from the watched value.
    pub deep: bool,
    pub flush: FlushMode,
}

impl WatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    pub fn deep(mut self) -> Self {
        self.deep = true;
        self
    }

    pub fn flush(mut self, mode: FlushMode) -> Self {
        self.flush = mode;
        self
    }

    /// Parse options from JSON. Unknown flush modes are rejected.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
