//! Allocate and lookup commands.
//!
//! These stand in for the router, site and engineer-profile creation flows
//! that ask the allocator for an address.

use std::io::Write;

use wgfleet_ipam::{PoolCategory, PoolId, default_prefix_len};

use crate::cli::AllocateArgs;
use crate::context::StateContext;
use crate::error::CliError;
use crate::output::{AllocatedBlock, AllocationDetail, OutputFormat};

/// Handler for `wgfleet allocate` and `wgfleet lookup`.
pub struct AllocateCommand<'a> {
    ctx: &'a StateContext,
}

impl<'a> AllocateCommand<'a> {
    /// Creates a new allocate command handler.
    #[must_use]
    pub const fn new(ctx: &'a StateContext) -> Self {
        Self { ctx }
    }

    /// Allocates a block and saves the state.
    ///
    /// With `--pool`, the pool must serve the requested category.
    pub fn allocate<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        args: &AllocateArgs,
    ) -> Result<(), CliError> {
        let prefix_len = args
            .prefix
            .unwrap_or_else(|| default_prefix_len(args.category, &args.requester_type));

        let _lock = self.ctx.lock()?;
        let ipam = self.ctx.load()?;
        let cidr = match &args.pool {
            Some(pool) => {
                let pool_id = PoolId::new(pool.as_str());
                if let Some(found) = ipam.registry().find_by_id(&pool_id) {
                    if found.category != args.category {
                        return Err(CliError::InvalidArgument(format!(
                            "pool {pool_id} serves {}, not {}",
                            found.category, args.category
                        )));
                    }
                }
                ipam.allocate_in_pool(
                    &pool_id,
                    &args.requester_type,
                    &args.requester_id,
                    prefix_len,
                )?
            }
            None => ipam.allocate(
                args.category,
                &args.requester_type,
                &args.requester_id,
                prefix_len,
            )?,
        };
        self.ctx.save(&ipam)?;

        let block = AllocatedBlock {
            requester_type: args.requester_type.clone(),
            requester_id: args.requester_id.clone(),
            cidr,
        };
        format.write(out, &block)
    }

    /// Shows the block a requester holds.
    pub fn lookup<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        category: PoolCategory,
        requester_type: &str,
        requester_id: &str,
    ) -> Result<(), CliError> {
        let ipam = self.ctx.load()?;
        let allocation = ipam
            .lookup(category, requester_type, requester_id)
            .ok_or_else(|| {
                CliError::NotAllocated(format!("{requester_type} {requester_id} in {category} pool"))
            })?;
        format.write(out, &AllocationDetail { allocation })
    }
}
