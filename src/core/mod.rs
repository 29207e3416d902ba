//! Registry core: context object, configuration and construction.
//!
//! The public API from this module is [`Registry`], [`RegistryBuilder`],
//! [`Config`] and [`LinkKind`].
//!
//! Internal modules:
//! - [`registry`]: connection/signal tables, id allocation, reporting, teardown;
//! - [`builder`]: wires the report bus and optional subscriber workers;
//! - [`config`]: settings shared by every signal of a registry.

mod builder;
mod config;
mod registry;

pub use builder::RegistryBuilder;
pub use config::Config;
pub use registry::{LinkKind, Registry};

pub(crate) use registry::{Link, LinkControl, SignalControl};
