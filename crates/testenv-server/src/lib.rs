//! Lifecycle control for the auxiliary servers a test run depends on.
//!
//! A test run describes its databases, caches and mock services as
//! loosely-typed mappings. This crate validates each description into a
//! [`ServerDescriptor`], then drives it through a [`ServerController`]:
//! create a private directory, write the server's config file, spawn the
//! process, discover its real PID, wait until it accepts connections and
//! finally stop and reap it. [`ServerSet`] runs a whole batch in dependency
//! order and tears it down in reverse.
//!
//! ```no_run
//! use serde_json::json;
//! use testenv_config::{RunConfig, RunPaths};
//! use testenv_server::{DescriptorContext, ServerSet};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RunConfig::from_env()?;
//! let paths = RunPaths::create(&config)?;
//! let context = DescriptorContext::from_run_paths(&paths, &config);
//! let mut servers = ServerSet::from_entries(
//!     [("cache", json!({"command": "redis-server --port 6390", "address": "127.0.0.1:6390"}))],
//!     &context,
//! )?;
//! servers.start_all()?;
//! // run tests
//! servers.stop_all();
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod controller;
pub mod descriptor;
pub mod emitter;
mod environment;
pub mod probe;
pub mod telemetry;

pub use batch::{RunError, ServerSet};
pub use controller::{
    HookError, LifecycleError, NoopHooks, ServerController, ServerHooks, ServerState,
};
pub use descriptor::{ConfigError, ConfigSpec, DescriptorContext, ServerDescriptor, ServerKind};
pub use emitter::{ConfigTree, ConfigWriteError, ConfigWriter, EmitterRegistry, RegistrationError};
pub use environment::compose_environment;
pub use probe::{ProcessOwnership, SocketEndpoint, StopOutcome};
