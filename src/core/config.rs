//! # Registry configuration.
//!
//! Provides [`Config`], centralized settings for a [`Registry`](crate::Registry)
//! and every signal created through it.
//!
//! ## Sentinel values
//! - `bus_capacity = 0` → clamped to 1 by [`Config::bus_capacity_clamped`]
//! - empty name prefixes → names are the bare counter (`"0"`, `"1"`, ...)

/// Configuration for a registry and its signals.
///
/// ## Field semantics
/// - `bus_capacity`: Report bus ring buffer size (min 1; clamped by Bus)
/// - `unnamed_connection_prefix`: Prefix of generated connection names
/// - `unnamed_signal_prefix`: Prefix of generated signal names
///
/// ## Notes
/// All fields are public for flexibility. Prefer using helper accessors to avoid
/// sprinkling sentinel checks across the codebase.
#[derive(Clone, Debug)]
pub struct Config {
    /// Capacity of the report bus broadcast channel ring buffer.
    ///
    /// Receivers that lag behind more than `bus_capacity` messages will
    /// receive `Lagged` and skip older items.
    pub bus_capacity: usize,

    /// Prefix used for connections created without a name.
    ///
    /// Generated names look like `"unnamed connection 3"`; the number counts
    /// unnamed connections of the registry, independently of connection ids.
    pub unnamed_connection_prefix: String,

    /// Prefix used for signals created without a name.
    pub unnamed_signal_prefix: String,
}

impl Config {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Generated name for the `n`-th unnamed connection.
    pub fn connection_name(&self, n: u64) -> String {
        Self::generated(&self.unnamed_connection_prefix, n)
    }

    /// Generated name for the `n`-th unnamed signal.
    pub fn signal_name(&self, n: u64) -> String {
        Self::generated(&self.unnamed_signal_prefix, n)
    }

    fn generated(prefix: &str, n: u64) -> String {
        if prefix.is_empty() {
            n.to_string()
        } else {
            format!("{prefix} {n}")
        }
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `bus_capacity = 1024`
    /// - `unnamed_connection_prefix = "unnamed connection"`
    /// - `unnamed_signal_prefix = "unnamed signal"`
    fn default() -> Self {
        Self {
            bus_capacity: 1024,
            unnamed_connection_prefix: "unnamed connection".to_string(),
            unnamed_signal_prefix: "unnamed signal".to_string(),
        }
    }
}
