//! Output formatting for CLI commands.
//!
//! Supports table (human-readable) and JSON output formats.

use std::io::Write;

use serde::Serialize;
use wgfleet_ipam::{AddressPool, Allocation, Cidr, PoolStats};

use crate::cli::Format;
use crate::error::CliError;

/// Output formatter that handles both table and JSON output.
#[derive(Debug, Clone)]
pub struct OutputFormat {
    format: Format,
}

impl OutputFormat {
    /// Create a new output formatter.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }

    /// Write a serializable value to the output.
    pub fn write<W, T>(&self, writer: &mut W, value: &T) -> Result<(), CliError>
    where
        W: Write,
        T: Serialize + TableDisplay,
    {
        match self.format {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *writer, value)
                    .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
                writeln!(writer)?;
            }
            Format::Table => {
                value.write_table(writer)?;
            }
        }
        Ok(())
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::new(Format::Table)
    }
}

/// Trait for types that can be displayed as a table.
pub trait TableDisplay {
    /// Write the value as a human-readable table.
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError>;
}

/// Result of `init`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitSummary {
    /// Snapshot file written.
    pub path: String,
    /// Number of pools seeded.
    pub pools: usize,
}

impl TableDisplay for InitSummary {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Initialized {} with {} pool(s)", self.path, self.pools)?;
        Ok(())
    }
}

/// Pools for display.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct PoolList {
    /// The pools, in declaration order.
    pub pools: Vec<AddressPool>,
}

impl TableDisplay for PoolList {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.pools.is_empty() {
            writeln!(writer, "No pools configured")?;
            return Ok(());
        }

        writeln!(
            writer,
            "{:<16}  {:<26}  {:<14}  {:<20}  {}",
            "ID", "NAME", "CATEGORY", "PARENT BLOCKS", "RESERVED"
        )?;
        writeln!(writer, "{}", "─".repeat(96))?;

        for pool in &self.pools {
            writeln!(
                writer,
                "{:<16}  {:<26}  {:<14}  {:<20}  {}",
                truncate(pool.id.as_str(), 16),
                truncate(&pool.name, 26),
                pool.category.as_str(),
                join_blocks(&pool.parent_blocks),
                if pool.reserved_blocks.is_empty() {
                    "-".to_string()
                } else {
                    join_blocks(&pool.reserved_blocks)
                }
            )?;
        }
        Ok(())
    }
}

/// A block handed to a requester.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocatedBlock {
    /// Requester type.
    pub requester_type: String,
    /// Requester id.
    pub requester_id: String,
    /// The block.
    pub cidr: Cidr,
}

impl TableDisplay for AllocatedBlock {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(
            writer,
            "{} {} -> {}",
            self.requester_type, self.requester_id, self.cidr
        )?;
        Ok(())
    }
}

/// A single allocation record.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct AllocationDetail {
    /// The record.
    pub allocation: Allocation,
}

impl TableDisplay for AllocationDetail {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        let a = &self.allocation;
        writeln!(writer, "Allocation {}", a.id)?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Pool:            {}", a.pool_id)?;
        writeln!(writer, "CIDR:            {}", a.cidr)?;
        writeln!(writer, "Requester Type:  {}", a.requester_type)?;
        writeln!(writer, "Requester ID:    {}", a.requester_id)?;
        writeln!(writer, "Allocated At:    {}", a.allocated_at.to_rfc3339())?;
        Ok(())
    }
}

/// Allocations for display.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct AllocationList {
    /// The allocations, ordered by pool then address.
    pub allocations: Vec<Allocation>,
}

impl TableDisplay for AllocationList {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.allocations.is_empty() {
            writeln!(writer, "No allocations")?;
            return Ok(());
        }

        writeln!(
            writer,
            "{:<16}  {:<18}  {:<18}  {:<24}  {}",
            "POOL", "CIDR", "TYPE", "REQUESTER", "ALLOCATED"
        )?;
        writeln!(writer, "{}", "─".repeat(100))?;

        for a in &self.allocations {
            writeln!(
                writer,
                "{:<16}  {:<18}  {:<18}  {:<24}  {}",
                truncate(a.pool_id.as_str(), 16),
                a.cidr.to_string(),
                truncate(&a.requester_type, 18),
                truncate(&a.requester_id, 24),
                a.allocated_at.format("%Y-%m-%d %H:%M")
            )?;
        }

        writeln!(writer)?;
        writeln!(writer, "Total: {} allocation(s)", self.allocations.len())?;
        Ok(())
    }
}

/// Pool usage for display.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct StatsReport {
    /// One entry per pool.
    pub pools: Vec<PoolStats>,
}

impl TableDisplay for StatsReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.pools.is_empty() {
            writeln!(writer, "No pools configured")?;
            return Ok(());
        }

        writeln!(
            writer,
            "{:<16}  {:<14}  {:>6}  {:>12}  {:>12}  {:>12}  {:>6}",
            "POOL", "CATEGORY", "ALLOCS", "CAPACITY", "USED", "FREE", "USED%"
        )?;
        writeln!(writer, "{}", "─".repeat(92))?;

        for s in &self.pools {
            let capacity = s.total_addresses.saturating_sub(s.reserved_addresses);
            writeln!(
                writer,
                "{:<16}  {:<14}  {:>6}  {:>12}  {:>12}  {:>12}  {:>5.1}%",
                truncate(s.pool_id.as_str(), 16),
                s.category.as_str(),
                s.allocations,
                capacity,
                s.allocated_addresses,
                s.available_addresses,
                percent(s.allocated_addresses, capacity)
            )?;
        }
        Ok(())
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

fn join_blocks(blocks: &[Cidr]) -> String {
    blocks
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Truncate a string to a maximum length, adding "..." if truncated.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
