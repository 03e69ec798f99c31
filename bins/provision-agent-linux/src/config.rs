use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use provision_core::ProvisioningConfig;

/// Device provisioning agent - pairing, network join and credential bootstrap
#[derive(Parser, Debug)]
#[command(name = "provision-agent")]
pub struct Args {
    /// Provisioning settings (TOML)
    #[arg(long, env = "PROVISION_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding the durable namespaces
    #[arg(long, env = "PROVISION_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Config service bind address (default 0.0.0.0:<http_port>)
    #[arg(long)]
    pub bind: Option<SocketAddr>,

    /// Force re-provisioning, as if the reset button were held at boot
    #[arg(long)]
    pub reset: bool,

    /// Keep the config service down once an API key is available
    #[arg(long)]
    pub disable_configurator_after_provisioned: bool,
}

impl Args {
    /// `--state-dir`, else `<data dir>/provision-agent` (`$XDG_DATA_HOME` on Linux).
    pub fn state_dir(&self) -> anyhow::Result<PathBuf> {
        if let Some(dir) = &self.state_dir {
            return Ok(dir.clone());
        }
        let data_dir = dirs::data_dir()
            .context("No data directory for this user, pass --state-dir or PROVISION_STATE_DIR")?;
        Ok(data_dir.join("provision-agent"))
    }

    /// Settings from the TOML file, if any, with command-line overrides applied.
    pub fn load_config(&self) -> anyhow::Result<ProvisioningConfig> {
        let mut config = match &self.config {
            Some(path) => load_file(path)?,
            None => ProvisioningConfig::default(),
        };
        if self.disable_configurator_after_provisioned {
            config.disable_configurator_after_provisioned = true;
        }
        Ok(config)
    }

    pub fn bind_addr(&self, config: &ProvisioningConfig) -> SocketAddr {
        self.bind
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], config.http_port)))
    }
}

fn load_file(path: &Path) -> anyhow::Result<ProvisioningConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}
