//! Init command implementation.

use std::io::Write;

use tracing::info;
use wgfleet_ipam::Ipam;

use crate::context::StateContext;
use crate::error::CliError;
use crate::output::{InitSummary, OutputFormat};

/// Handler for `wgfleet init`.
pub struct InitCommand<'a> {
    ctx: &'a StateContext,
}

impl<'a> InitCommand<'a> {
    /// Creates a new init command handler.
    #[must_use]
    pub const fn new(ctx: &'a StateContext) -> Self {
        Self { ctx }
    }

    /// Writes a fresh snapshot holding the configured pools.
    pub fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        force: bool,
    ) -> Result<(), CliError> {
        let _lock = self.ctx.lock()?;
        let path = self.ctx.snapshot_path();
        if path.exists() && !force {
            return Err(CliError::AlreadyInitialized(path.to_path_buf()));
        }

        let ipam = Ipam::new(self.ctx.config().registry()?);
        self.ctx.replace(&ipam)?;
        info!(path = %path.display(), pools = ipam.registry().len(), "Initialized IPAM state");

        let summary = InitSummary {
            path: path.display().to_string(),
            pools: ipam.registry().len(),
        };
        format.write(out, &summary)
    }
}
