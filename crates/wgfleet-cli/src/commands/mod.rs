//! CLI command implementations.
//!
//! Each submodule implements a group of commands:
//! - [`init`] - Fresh snapshot
//! - [`pools`] - Pool listing and usage
//! - [`allocate`] - Automatic allocation and lookup
//! - [`reserve`] - Manual reservation and release
//! - [`list`] - Allocation listing

pub mod allocate;
pub mod init;
pub mod list;
pub mod pools;
pub mod reserve;

pub use allocate::AllocateCommand;
pub use init::InitCommand;
pub use list::ListCommand;
pub use pools::PoolsCommand;
pub use reserve::ReserveCommand;
