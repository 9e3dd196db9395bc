//! Manual reservation and release commands.

use std::io::Write;

use wgfleet_ipam::PoolId;

use crate::cli::ReserveArgs;
use crate::context::StateContext;
use crate::error::CliError;
use crate::output::{AllocationDetail, AllocationList, OutputFormat};

/// Handler for `reserve`, `release` and `release-requester`.
pub struct ReserveCommand<'a> {
    ctx: &'a StateContext,
}

impl<'a> ReserveCommand<'a> {
    /// Creates a new reserve command handler.
    #[must_use]
    pub const fn new(ctx: &'a StateContext) -> Self {
        Self { ctx }
    }

    /// Records an operator-chosen block.
    pub fn reserve<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        args: &ReserveArgs,
    ) -> Result<(), CliError> {
        // Without an explicit id each manual block is its own requester.
        let requester_id = args
            .requester_id
            .clone()
            .unwrap_or_else(|| args.cidr.normalized().to_string());

        let _lock = self.ctx.lock()?;
        let ipam = self.ctx.load()?;
        let allocation = ipam.reserve(
            &PoolId::new(args.pool_id.as_str()),
            &args.requester_type,
            &requester_id,
            args.cidr,
        )?;
        self.ctx.save(&ipam)?;
        format.write(out, &AllocationDetail { allocation })
    }

    /// Frees one requester's block in one pool.
    pub fn release<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        pool_id: &str,
        requester_type: &str,
        requester_id: &str,
    ) -> Result<(), CliError> {
        let _lock = self.ctx.lock()?;
        let ipam = self.ctx.load()?;
        let allocation = ipam
            .release(&PoolId::new(pool_id), requester_type, requester_id)
            .ok_or_else(|| {
                CliError::NotAllocated(format!("{requester_type} {requester_id} in pool {pool_id}"))
            })?;
        self.ctx.save(&ipam)?;
        format.write(out, &AllocationDetail { allocation })
    }

    /// Frees every block a requester holds.
    pub fn release_requester<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        requester_type: &str,
        requester_id: &str,
    ) -> Result<(), CliError> {
        let _lock = self.ctx.lock()?;
        let ipam = self.ctx.load()?;
        let allocations = ipam.release_requester(requester_type, requester_id);
        if !allocations.is_empty() {
            self.ctx.save(&ipam)?;
        }
        format.write(out, &AllocationList { allocations })
    }
}
