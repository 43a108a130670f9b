//! Device session capability: open a management session to one device,
//! enter privileged mode, push configuration, run show commands.

mod ssh;
#[cfg(test)]
pub mod mock;

pub use ssh::SshSessionFactory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Credential;

/// Vendor/OS profile every session of a run is opened with
#[derive(Debug, Clone)]
pub struct DeviceProfile {
    pub name: String,
    pub port: u16,
    pub timeout_secs: u64,
    pub enable_secret: Option<String>,
}

impl DeviceProfile {
    pub fn from_config(cfg: &crate::config::Config) -> Self {
        Self {
            name: cfg.device_profile.clone(),
            port: cfg.ssh_port,
            timeout_secs: cfg.ssh_timeout_secs,
            enable_secret: cfg.enable_secret.clone(),
        }
    }
}

/// An open management session. Callers must `close` it on every path.
#[async_trait]
pub trait DeviceSession: Send {
    /// Enter privileged mode
    async fn enable(&mut self) -> Result<()>;

    /// Apply configuration lines in config mode, returning the device echo
    async fn send_config(&mut self, lines: &[String]) -> Result<String>;

    /// Run one exec-mode command and return its output
    async fn send_command(&mut self, command: &str) -> Result<String>;

    /// Release the session
    async fn close(&mut self);
}

/// Opens sessions; one factory is shared by every device task of a run
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(
        &self,
        address: &str,
        credential: &Credential,
        profile: &DeviceProfile,
    ) -> Result<Box<dyn DeviceSession>>;
}
