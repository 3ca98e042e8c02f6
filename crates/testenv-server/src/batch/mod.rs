//! Runs a batch of servers in dependency order.
//!
//! [`ServerSet`] validates a whole batch up front (unique names, known
//! dependencies, no cycles), brings servers up one at a time so each
//! server's `after` dependencies are ready before it starts, and tears
//! everything down in reverse start order.

mod order;

use std::collections::BTreeSet;
use std::io::{self, Write};

use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::controller::{LifecycleError, ServerController};
use crate::descriptor::{ConfigError, DescriptorContext, ServerDescriptor};
use crate::probe::StopOutcome;

const BATCH_TARGET: &str = "testenv_server::batch";

/// Errors raised while building or running a batch.
#[derive(Debug, Error)]
pub enum RunError {
    /// A server description failed validation.
    #[error("invalid server description: {source}")]
    Config {
        /// Validation failure.
        #[from]
        source: ConfigError,
    },
    /// Two servers share a name.
    #[error("server {server} is defined more than once")]
    DuplicateServer {
        /// Repeated name.
        server: String,
    },
    /// A server depends on a server that is not in the batch.
    #[error("server {server} depends on unknown server {dependency}")]
    UnknownDependency {
        /// Dependent server.
        server: String,
        /// Missing dependency.
        dependency: String,
    },
    /// The `after` relation contains a cycle.
    #[error("dependency cycle between servers: {}", servers.join(", "))]
    DependencyCycle {
        /// Servers that could not be ordered.
        servers: Vec<String>,
    },
    /// A named server is not part of the batch.
    #[error("no server named {server}")]
    UnknownServer {
        /// Requested name.
        server: String,
    },
    /// A server failed during its lifecycle.
    #[error("server {server} failed: {source}")]
    Server {
        /// Failing server.
        server: String,
        /// Lifecycle failure.
        #[source]
        source: LifecycleError,
    },
}

/// Controllers for a batch, held in start order.
pub struct ServerSet<W: Write = io::Stderr> {
    controllers: Vec<ServerController<W>>,
}

impl ServerSet<io::Stderr> {
    /// Validates `(name, entry)` pairs and orders the resulting servers.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Config`] for the first invalid entry and the
    /// ordering errors of [`ServerSet::new`].
    pub fn from_entries<I, S>(entries: I, context: &DescriptorContext) -> Result<Self, RunError>
    where
        I: IntoIterator<Item = (S, Value)>,
        S: AsRef<str>,
    {
        let descriptors = entries
            .into_iter()
            .map(|(name, raw)| ServerDescriptor::from_value(name.as_ref(), raw, context))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(descriptors)
    }

    /// Orders validated descriptors, reporting diagnostics to standard
    /// error.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::DuplicateServer`],
    /// [`RunError::UnknownDependency`] or [`RunError::DependencyCycle`]
    /// when the batch cannot be ordered.
    pub fn new(descriptors: Vec<ServerDescriptor>) -> Result<Self, RunError> {
        Self::from_controllers(descriptors.into_iter().map(ServerController::new).collect())
    }
}

impl<W: Write> ServerSet<W> {
    /// Orders existing controllers by their dependencies.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::DuplicateServer`],
    /// [`RunError::UnknownDependency`] or [`RunError::DependencyCycle`]
    /// when the batch cannot be ordered.
    pub fn from_controllers(controllers: Vec<ServerController<W>>) -> Result<Self, RunError> {
        let order = {
            let mut seen = BTreeSet::new();
            for controller in &controllers {
                let name = controller.descriptor().name();
                if !seen.insert(name) {
                    return Err(RunError::DuplicateServer {
                        server: name.to_owned(),
                    });
                }
            }
            let nodes: Vec<(&str, &[String])> = controllers
                .iter()
                .map(|controller| {
                    let descriptor = controller.descriptor();
                    (descriptor.name(), descriptor.after())
                })
                .collect();
            order::start_order(&nodes)?
        };

        let mut slots: Vec<Option<ServerController<W>>> =
            controllers.into_iter().map(Some).collect();
        let controllers = order
            .into_iter()
            .filter_map(|position| slots.get_mut(position).and_then(Option::take))
            .collect();
        Ok(Self { controllers })
    }

    /// Brings every server up in order: prepare, start, wait until ready,
    /// then fill.
    ///
    /// # Errors
    ///
    /// On the first failure every server touched so far is stopped in
    /// reverse order and [`RunError::Server`] names the failing server.
    pub fn start_all(&mut self) -> Result<(), RunError> {
        let failure = self.controllers.iter_mut().find_map(|controller| {
            bring_up(controller)
                .err()
                .map(|source| (controller.descriptor().name().to_owned(), source))
        });
        if let Some((server, source)) = failure {
            warn!(
                target: BATCH_TARGET,
                server = %server,
                error = %source,
                "server failed to start; stopping batch"
            );
            self.stop_all();
            return Err(RunError::Server { server, source });
        }
        info!(
            target: BATCH_TARGET,
            servers = self.controllers.len(),
            "all servers ready"
        );
        Ok(())
    }

    /// Stops every server in reverse start order.
    ///
    /// Servers that never started report [`StopOutcome::NotRunning`].
    pub fn stop_all(&mut self) -> Vec<(String, StopOutcome)> {
        self.controllers
            .iter_mut()
            .rev()
            .map(|controller| {
                let outcome = controller.stop();
                (controller.descriptor().name().to_owned(), outcome)
            })
            .collect()
    }

    /// Forwards a runtime control command to one server.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::UnknownServer`] when no server has that name and
    /// [`RunError::Server`] when the command fails.
    pub fn ctrl(&mut self, name: &str, args: &[String]) -> Result<(), RunError> {
        let controller = self
            .get_mut(name)
            .ok_or_else(|| RunError::UnknownServer {
                server: name.to_owned(),
            })?;
        controller.ctrl(args).map_err(|source| RunError::Server {
            server: name.to_owned(),
            source,
        })
    }

    /// Looks up a controller by server name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ServerController<W>> {
        self.controllers
            .iter()
            .find(|controller| controller.descriptor().name() == name)
    }

    /// Looks up a controller by server name for mutation.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut ServerController<W>> {
        self.controllers
            .iter_mut()
            .find(|controller| controller.descriptor().name() == name)
    }

    /// Server names in start order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.controllers
            .iter()
            .map(|controller| controller.descriptor().name())
    }

    /// Controllers in start order.
    pub fn iter(&self) -> impl Iterator<Item = &ServerController<W>> {
        self.controllers.iter()
    }

    /// Number of servers in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    /// Whether the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }
}

fn bring_up<W: Write>(controller: &mut ServerController<W>) -> Result<(), LifecycleError> {
    controller.prepare()?;
    controller.start()?;
    controller.wait_ready()?;
    controller.fill()
}

impl<W: Write> Drop for ServerSet<W> {
    fn drop(&mut self) {
        let _outcomes = self.stop_all();
    }
}

impl<W: Write> std::fmt::Debug for ServerSet<W> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_list()
            .entries(self.controllers.iter())
            .finish()
    }
}

#[cfg(test)]
mod tests;
