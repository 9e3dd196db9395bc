//! Pool and usage reporting commands.

use std::io::Write;

use crate::context::StateContext;
use crate::error::CliError;
use crate::output::{OutputFormat, PoolList, StatsReport};

/// Handler for `wgfleet pools` and `wgfleet stats`.
pub struct PoolsCommand<'a> {
    ctx: &'a StateContext,
}

impl<'a> PoolsCommand<'a> {
    /// Creates a new pools command handler.
    #[must_use]
    pub const fn new(ctx: &'a StateContext) -> Self {
        Self { ctx }
    }

    /// Lists the pools.
    pub fn pools<W: Write>(&self, out: &mut W, format: &OutputFormat) -> Result<(), CliError> {
        let ipam = self.ctx.load()?;
        let list = PoolList {
            pools: ipam.registry().iter().cloned().collect(),
        };
        format.write(out, &list)
    }

    /// Shows per-pool usage.
    pub fn stats<W: Write>(&self, out: &mut W, format: &OutputFormat) -> Result<(), CliError> {
        let ipam = self.ctx.load()?;
        format.write(out, &StatsReport { pools: ipam.stats() })
    }
}
