//! Scripted sessions for exercising deployment and snapshot logic
//! without a network.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{DeviceProfile, DeviceSession, SessionFactory};
use crate::models::Credential;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Opened { address: String, username: String, profile: String },
    Enabled(String),
    Config { address: String, lines: Vec<String> },
    Command { address: String, command: String },
    Closed(String),
}

/// Factory whose behavior per address is scripted up front
#[derive(Default, Clone)]
pub struct ScriptedFactory {
    pub events: Arc<Mutex<Vec<Event>>>,
    pub refuse: HashSet<String>,
    pub reject_config: HashSet<String>,
    pub panic_on: HashSet<String>,
    /// Output per (address, command); unknown commands return ""
    pub outputs: HashMap<(String, String), String>,
    pub delay: Option<Duration>,
    /// Sessions currently open and the most ever open at once
    pub open_now: Arc<AtomicUsize>,
    pub peak_open: Arc<AtomicUsize>,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refusing(mut self, address: &str) -> Self {
        self.refuse.insert(address.to_string());
        self
    }

    pub fn rejecting_config(mut self, address: &str) -> Self {
        self.reject_config.insert(address.to_string());
        self
    }

    pub fn panicking(mut self, address: &str) -> Self {
        self.panic_on.insert(address.to_string());
        self
    }

    pub fn with_output(mut self, address: &str, command: &str, output: &str) -> Self {
        self.outputs
            .insert((address.to_string(), command.to_string()), output.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn opened_addresses(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Opened { address, .. } => Some(address),
                _ => None,
            })
            .collect()
    }

    pub fn peak_open(&self) -> usize {
        self.peak_open.load(Ordering::SeqCst)
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }
}

struct ScriptedSession {
    address: String,
    factory: ScriptedFactory,
}

impl ScriptedSession {
    fn record(&self, event: Event) {
        self.factory.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl DeviceSession for ScriptedSession {
    async fn enable(&mut self) -> Result<()> {
        self.record(Event::Enabled(self.address.clone()));
        Ok(())
    }

    async fn send_config(&mut self, lines: &[String]) -> Result<String> {
        if let Some(delay) = self.factory.delay {
            tokio::time::sleep(delay).await;
        }
        self.record(Event::Config {
            address: self.address.clone(),
            lines: lines.to_vec(),
        });
        if self.factory.panic_on.contains(&self.address) {
            panic!("scripted panic for {}", self.address);
        }
        if self.factory.reject_config.contains(&self.address) {
            bail!("Command rejected: '{}'", lines.first().cloned().unwrap_or_default());
        }
        Ok(format!("applied {} lines", lines.len()))
    }

    async fn send_command(&mut self, command: &str) -> Result<String> {
        self.record(Event::Command {
            address: self.address.clone(),
            command: command.to_string(),
        });
        Ok(self
            .factory
            .outputs
            .get(&(self.address.clone(), command.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn close(&mut self) {
        self.factory.open_now.fetch_sub(1, Ordering::SeqCst);
        self.record(Event::Closed(self.address.clone()));
    }
}

#[async_trait]
impl SessionFactory for ScriptedFactory {
    async fn open(
        &self,
        address: &str,
        credential: &Credential,
        profile: &DeviceProfile,
    ) -> Result<Box<dyn DeviceSession>> {
        if self.refuse.contains(address) {
            bail!("TCP connection failed: Connection refused");
        }
        self.events.lock().unwrap().push(Event::Opened {
            address: address.to_string(),
            username: credential.username.clone(),
            profile: profile.name.clone(),
        });
        let open = self.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_open.fetch_max(open, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            address: address.to_string(),
            factory: self.clone(),
        }))
    }
}

pub fn test_profile() -> DeviceProfile {
    DeviceProfile {
        name: "arista_eos".to_string(),
        port: 22,
        timeout_secs: 5,
        enable_secret: None,
    }
}
