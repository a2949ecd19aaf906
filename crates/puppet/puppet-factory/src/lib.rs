//! Puppet Factory
//!
//! Asynchronous construction of [`puppet_core::InternalModel`]s: runtime startup with
//! memoized retry, manifest detection and path resolution, concurrent payload loading
//! and ownership hand-off of native objects.

pub mod adapter;
pub mod error;
pub mod factory;
pub mod loader;
pub mod runtime;

pub use adapter::RuntimeAdapter;
pub use error::{FactoryError, LoadError, RuntimeStartupError};
pub use factory::{Factory, FactoryOptions, ModelSource};
pub use loader::{FsLoader, MemoryLoader, ResourceLoader};
pub use runtime::{RuntimeStartup, RuntimeStartupOptions};
