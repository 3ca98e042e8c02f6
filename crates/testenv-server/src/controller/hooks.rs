use super::HookError;
use crate::descriptor::ServerDescriptor;

/// Server-specific behaviour run once the process is up.
///
/// `fill` seeds a ready server with fixture data; `ctrl` handles ad hoc
/// runtime commands such as flushing a cache between tests. Both default to
/// doing nothing.
pub trait ServerHooks {
    /// Populates the ready server.
    ///
    /// # Errors
    ///
    /// Returns [`HookError`] when the server could not be populated.
    fn fill(&mut self, descriptor: &ServerDescriptor, pid: Option<u32>) -> Result<(), HookError> {
        let _ = (descriptor, pid);
        Ok(())
    }

    /// Handles a runtime control command.
    ///
    /// # Errors
    ///
    /// Returns [`HookError`] when the command failed.
    fn ctrl(
        &mut self,
        descriptor: &ServerDescriptor,
        pid: Option<u32>,
        args: &[String],
    ) -> Result<(), HookError> {
        let _ = (descriptor, pid, args);
        Ok(())
    }
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl ServerHooks for NoopHooks {}
