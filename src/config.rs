use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;

pub const DEFAULT_CONFIG_PATH: &str = "mapper.yml";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerKind {
    #[default]
    Mixtrack,
    Z1,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    pub controller: ControllerKind,
    pub mixtrack: MixtrackSettings,
    pub z1: Z1Settings,
}

impl MapperConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Load the config at `path`. A missing default file falls back to built-in values.
    pub fn load(path: Option<&str>) -> Result<Self> {
        match path {
            Some(path) => Self::from_yaml(&fs::read_to_string(path)?),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_yaml(&fs::read_to_string(DEFAULT_CONFIG_PATH)?)
            }
            None => {
                info!("no {DEFAULT_CONFIG_PATH} found, using defaults");
                Ok(Self::default())
            }
        }
    }
}

/// Tuning for the Mixtrack Pro FX mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixtrackSettings {
    pub midi_in_hint: String,
    pub midi_out_hint: String,
    pub enable_blink: bool,
    pub blink_delay_ms: u64,
    /// Steps cycled by shift + pitch bend down.
    pub pitch_ranges: Vec<f64>,
    pub jog_scratch_sensitivity: u32,
    pub jog_scratch_alpha: f64,
    pub jog_scratch_beta: f64,
    pub jog_pitch_sensitivity: f64,
    pub jog_seek_sensitivity: f64,
    /// Mirrors the host's "synchronize zoom level across waveforms" option.
    pub waveforms_synced: bool,
    /// Window a pot must enter before it takes over its control.
    pub soft_takeover_threshold: f64,
}

impl MixtrackSettings {
    pub fn blink_interval(&self) -> Duration {
        Duration::from_millis(self.blink_delay_ms)
    }
}

impl Default for MixtrackSettings {
    fn default() -> Self {
        Self {
            midi_in_hint: "mixtrack".into(),
            midi_out_hint: "mixtrack".into(),
            enable_blink: true,
            blink_delay_ms: 700,
            pitch_ranges: vec![0.08, 0.16, 1.0],
            jog_scratch_sensitivity: 1024,
            jog_scratch_alpha: 1.0,
            jog_scratch_beta: 1.0 / 32.0,
            jog_pitch_sensitivity: 10.0,
            jog_seek_sensitivity: 10_000.0,
            waveforms_synced: true,
            soft_takeover_threshold: 3.0 / 128.0,
        }
    }
}

/// USB and takeover settings for the Kontrol Z1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Z1Settings {
    pub vendor_id: u16,
    pub product_id: u16,
    pub read_endpoint: u8,
    pub write_endpoint: u8,
    pub soft_takeover_threshold: f64,
    pub brightness: u8,
    pub poll_interval_ms: u64,
}

impl Default for Z1Settings {
    fn default() -> Self {
        Self {
            vendor_id: 0x17cc,
            product_id: 0x1210,
            read_endpoint: 0x81,
            write_endpoint: 0x01,
            soft_takeover_threshold: 3.0 / 128.0,
            brightness: 0x7f,
            poll_interval_ms: 2,
        }
    }
}
