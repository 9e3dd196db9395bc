//! Where a command finds its configuration and IPAM state.

use std::path::Path;

use tracing::debug;
use wgfleet_ipam::{Ipam, IpamConfig, IpamStore, StoreLock};

use crate::cli::Cli;
use crate::error::CliError;

/// Resolved configuration plus the snapshot store it points at.
#[derive(Debug, Clone)]
pub struct StateContext {
    config: IpamConfig,
    store: IpamStore,
}

impl StateContext {
    /// Creates a context for `config`.
    #[must_use]
    pub fn new(config: IpamConfig) -> Self {
        let store = IpamStore::new(&config.state_dir);
        Self { config, store }
    }

    /// Resolves the context from command-line flags.
    ///
    /// `--config` replaces the built-in defaults; `--state-dir` overrides
    /// the directory either of them names.
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let mut config = match &cli.config {
            Some(path) => IpamConfig::from_file(path)?,
            None => IpamConfig::default(),
        };
        if let Some(dir) = &cli.state_dir {
            config.state_dir.clone_from(dir);
        }
        debug!(state_dir = %config.state_dir.display(), "Resolved IPAM state directory");
        Ok(Self::new(config))
    }

    /// The resolved configuration.
    #[must_use]
    pub fn config(&self) -> &IpamConfig {
        &self.config
    }

    /// Path of the snapshot file.
    #[must_use]
    pub fn snapshot_path(&self) -> &Path {
        self.store.path()
    }

    /// Loads the allocator.
    pub fn load(&self) -> Result<Ipam, CliError> {
        Ok(Ipam::load(&self.store, &self.config)?)
    }

    /// Saves the allocator's state.
    ///
    /// Refused when another command saved since `ipam` was loaded.
    pub fn save(&self, ipam: &Ipam) -> Result<(), CliError> {
        Ok(ipam.persist(&self.store)?)
    }

    /// Replaces the saved state with `ipam`'s.
    pub fn replace(&self, ipam: &Ipam) -> Result<(), CliError> {
        Ok(ipam.persist_replacing(&self.store)?)
    }

    /// Waits for exclusive use of the state directory.
    ///
    /// Mutating commands hold this from load until save.
    pub fn lock(&self) -> Result<StoreLock, CliError> {
        self.store
            .lock()
            .map_err(|e| CliError::from(wgfleet_ipam::Error::from(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    #[test]
    fn state_dir_flag_overrides_config_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(br#"{ "stateDir": "/from/config" }"#)
            .expect("write");
        let config = file.path().to_string_lossy().into_owned();

        let cli = Cli::parse_from(["wgfleet", "--config", &config, "pools"]);
        let ctx = StateContext::from_cli(&cli).expect("should resolve");
        assert_eq!(ctx.config().state_dir, Path::new("/from/config"));

        let cli = Cli::parse_from(["wgfleet", "--config", &config, "--state-dir", "/override", "pools"]);
        let ctx = StateContext::from_cli(&cli).expect("should resolve");
        assert_eq!(ctx.snapshot_path(), Path::new("/override/ipam.json"));
    }

    #[test]
    fn missing_config_file_is_config_error() {
        let cli = Cli::parse_from(["wgfleet", "--config", "/nonexistent/wgfleet.json", "pools"]);
        assert!(matches!(
            StateContext::from_cli(&cli),
            Err(CliError::Config(_))
        ));
    }

    #[test]
    fn load_save_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = StateContext::new(IpamConfig {
            state_dir: dir.path().to_path_buf(),
            ..IpamConfig::default()
        });

        let ipam = ctx.load().expect("load");
        ipam.allocate(wgfleet_ipam::PoolCategory::Site, "site", "s1", 24)
            .expect("allocate");
        ctx.save(&ipam).expect("save");

        let reloaded = ctx.load().expect("reload");
        assert_eq!(reloaded.list_allocations(None).len(), 1);
    }

    #[test]
    fn interleaved_commands_cannot_lose_an_allocation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = IpamConfig {
            state_dir: dir.path().to_path_buf(),
            ..IpamConfig::default()
        };
        let ctx_a = StateContext::new(config.clone());
        let ctx_b = StateContext::new(config);

        let a = ctx_a.load().expect("load a");
        let b = ctx_b.load().expect("load b");
        a.allocate(wgfleet_ipam::PoolCategory::Site, "site", "site-A", 24)
            .expect("allocate a");
        b.allocate(wgfleet_ipam::PoolCategory::Site, "site", "site-B", 24)
            .expect("allocate b");

        ctx_a.save(&a).expect("save a");
        let err = ctx_b.save(&b).expect_err("stale save should be refused");
        assert!(err.hint().is_some_and(|h| h.contains("again")));

        let owners: Vec<String> = ctx_a
            .load()
            .expect("reload")
            .list_allocations(None)
            .into_iter()
            .map(|allocation| allocation.requester_id)
            .collect();
        assert_eq!(owners, ["site-A"]);
    }

    #[test]
    fn locked_commands_run_one_at_a_time() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = IpamConfig {
            state_dir: dir.path().to_path_buf(),
            ..IpamConfig::default()
        };

        std::thread::scope(|scope| {
            for worker in 0..4 {
                let ctx = StateContext::new(config.clone());
                scope.spawn(move || {
                    for n in 0..5 {
                        let _lock = ctx.lock().expect("should lock");
                        let ipam = ctx.load().expect("load");
                        ipam.allocate(
                            wgfleet_ipam::PoolCategory::Site,
                            "site",
                            &format!("site-{worker}-{n}"),
                            24,
                        )
                        .expect("allocate");
                        ctx.save(&ipam).expect("save under lock");
                    }
                });
            }
        });

        let ctx = StateContext::new(config);
        let allocations = ctx.load().expect("reload").list_allocations(None);
        assert_eq!(allocations.len(), 20);
        let mut blocks: Vec<String> = allocations.iter().map(|a| a.cidr.to_string()).collect();
        blocks.dedup();
        assert_eq!(blocks.len(), 20);
    }
}
