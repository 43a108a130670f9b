//! Candidate configuration rendering.
//!
//! Either the external playbook runner renders every class template
//! (see [`playbook`]), or [`TeraRenderer`] does it in-process from the
//! same `{class}.j2` files.

pub mod playbook;

use anyhow::{anyhow, Context as _, Result};
use std::path::{Path, PathBuf};
use tera::{Context, Tera};

use crate::compiler::{all_devices, DeviceGroups};
use crate::inventory::write_file;
use crate::models::{Device, DeviceClass};
use crate::utils::is_valid_hostname;

/// Turns one compiled device into vendor configuration text
pub trait ConfigRenderer: Send + Sync {
    fn render(&self, device: &Device) -> Result<String>;
}

/// Renders `{templates_dir}/{class}.j2` with the device bound as `item`,
/// the same name the playbook loop gives it.
pub struct TeraRenderer {
    tera: Tera,
}

impl TeraRenderer {
    /// Load every class template present in `templates_dir`.
    /// Classes without a template fail at render time.
    pub fn load(templates_dir: &Path) -> Result<Self> {
        let mut tera = Tera::default();
        for class in DeviceClass::ALL {
            let path = templates_dir.join(format!("{}.j2", class));
            if !path.exists() {
                tracing::debug!("No template for {} at {}", class, path.display());
                continue;
            }
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            tera.add_raw_template(class.as_str(), &content)
                .map_err(|e| anyhow!("Invalid template {}: {}", path.display(), e))?;
        }
        Ok(Self { tera })
    }
}

impl ConfigRenderer for TeraRenderer {
    fn render(&self, device: &Device) -> Result<String> {
        let name = device.device_type.as_str();
        if !self.tera.get_template_names().any(|t| t == name) {
            return Err(anyhow!("No {}.j2 template loaded", name));
        }

        let mut context = Context::new();
        context.insert("item", device);
        self.tera
            .render(name, &context)
            .map_err(|e| anyhow!("Template rendering failed for {}: {}", device.hostname, e))
    }
}

/// Render every device into `{candidate_dir}/{hostname}.txt`.
/// A device that fails to render is logged and left without a candidate,
/// so deployment later skips it.
pub async fn render_candidates(
    renderer: &dyn ConfigRenderer,
    groups: &DeviceGroups,
    candidate_dir: &Path,
) -> Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(candidate_dir)
        .await
        .with_context(|| format!("Failed to create {}", candidate_dir.display()))?;

    let mut written = Vec::new();
    for device in all_devices(groups) {
        if !is_valid_hostname(&device.hostname) {
            tracing::warn!("Skipping render for unsafe hostname '{}'", device.hostname);
            continue;
        }
        let text = match renderer.render(device) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("{:#}", e);
                continue;
            }
        };
        let path = candidate_dir.join(format!("{}.txt", device.hostname));
        write_file(&path, &text).await?;
        written.push(path);
    }

    tracing::info!("Rendered {} candidate configs", written.len());
    Ok(written)
}
