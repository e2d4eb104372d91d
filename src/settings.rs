#![forbid(unsafe_code)]

//! The persisted channel option.

use std::path::{Path, PathBuf};

use anyhow::Result;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::channel::normalize;
use crate::fsutil::{read_json, write_json_atomic};

pub const SETTINGS_FILE: &str = "channel_settings.json";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSettings {
    #[serde(default)]
    pub channel_id: String,
}

pub struct SettingsStore {
    path: PathBuf,
    current: RwLock<ChannelSettings>,
}

impl SettingsStore {
    /// Loads the saved settings from `data_root`. When nothing usable is
    /// saved yet, `default_channel` is written out so later loads see it.
    pub fn load(data_root: &Path, default_channel: &str) -> Result<Self> {
        let path = data_root.join(SETTINGS_FILE);
        let current = match read_json::<ChannelSettings>(&path) {
            Some(saved) if !saved.channel_id.trim().is_empty() => saved,
            _ => {
                let seeded = ChannelSettings {
                    channel_id: default_channel.trim().to_string(),
                };
                write_json_atomic(&path, &seeded)?;
                info!(path = %path.display(), channel = %seeded.channel_id, "seeded channel settings");
                seeded
            }
        };

        Ok(Self {
            path,
            current: RwLock::new(current),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> ChannelSettings {
        self.current.read().clone()
    }

    pub fn channel(&self) -> String {
        self.current.read().channel_id.clone()
    }

    /// Normalizes `raw` and persists it. Input that is neither a handle nor a
    /// channel id is stored in its sanitized form.
    pub fn update(&self, raw: &str) -> Result<ChannelSettings> {
        let settings = ChannelSettings {
            channel_id: normalize(raw).as_str().to_string(),
        };
        write_json_atomic(&self.path, &settings)?;
        *self.current.write() = settings.clone();
        info!(channel = %settings.channel_id, "channel settings updated");
        Ok(settings)
    }
}
