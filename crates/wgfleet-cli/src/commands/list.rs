//! List command implementation.

use std::io::Write;

use wgfleet_ipam::{AllocationFilter, PoolId};

use crate::cli::ListArgs;
use crate::context::StateContext;
use crate::error::CliError;
use crate::output::{AllocationList, OutputFormat};

/// Handler for `wgfleet list`.
pub struct ListCommand<'a> {
    ctx: &'a StateContext,
}

impl<'a> ListCommand<'a> {
    /// Creates a new list command handler.
    #[must_use]
    pub const fn new(ctx: &'a StateContext) -> Self {
        Self { ctx }
    }

    /// Lists allocations matching the filters.
    pub fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        args: &ListArgs,
    ) -> Result<(), CliError> {
        let filter = AllocationFilter {
            category: args.category,
            pool_id: args.pool.as_deref().map(PoolId::from),
            requester_type: args.requester_type.clone(),
            search: args.search.clone(),
        };
        let ipam = self.ctx.load()?;
        let allocations = ipam.query(&filter);
        format.write(out, &AllocationList { allocations })
    }
}
