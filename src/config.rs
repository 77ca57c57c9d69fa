use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::generator::GeneratorMode;
use crate::pixel_format::PixelFormat;
use crate::protocol::WireProtocol;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub strands: usize,
    pub pixels_per_strand: usize,
    pub mode: GeneratorMode,
    pub server: ServerConfig,
    pub device: DeviceConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound on a single network wait, keeps frames flowing
    pub read_timeout_ms: u64,
    /// Render a frame when a read times out with no client data.
    ///
    /// Off by default, so a connected but silent client gets no frames; turn
    /// this on (or pass `--idle-render`) for continuous animation.
    pub idle_render: bool,
    /// Serve several clients at once, each on its own thread
    pub multi_client: bool,
    /// Pending frame triggers buffered in multi-client mode
    pub trigger_queue: usize,
    pub stats_interval_secs: u64,
    /// Send a black frame before closing the device
    pub blank_on_exit: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    #[default]
    Simulated,
    Serial,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub kind: DeviceKind,
    /// Serial port path, e.g. /dev/ttyUSB0
    pub port: Option<String>,
    pub baud_rate: u32,
    pub protocol: WireProtocol,
    pub pixel_format: PixelFormat,
    pub write_timeout_ms: u64,
    /// Frames kept by the simulated device
    pub history: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            strands: 1,
            pixels_per_strand: 25,
            mode: GeneratorMode::default(),
            server: ServerConfig::default(),
            device: DeviceConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 9000,
            read_timeout_ms: 20,
            idle_render: false,
            multi_client: false,
            trigger_queue: 4,
            stats_interval_secs: 5,
            blank_on_exit: true,
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            kind: DeviceKind::default(),
            port: None,
            baud_rate: 115200,
            protocol: WireProtocol::default(),
            pixel_format: PixelFormat::default(),
            write_timeout_ms: 1000,
            history: 64,
        }
    }
}

impl Config {
    pub fn from_json(data: &str) -> serde_json::Result<Self> {
        serde_json::from_str(data)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.strands.checked_mul(self.pixels_per_strand).unwrap_or(0) == 0 {
            return Err(ConfigError::NoPixels {
                strands: self.strands,
                pixels_per_strand: self.pixels_per_strand,
            });
        }
        if self.server.read_timeout_ms == 0 {
            return Err(ConfigError::ZeroReadTimeout);
        }
        if self.device.kind == DeviceKind::Serial && self.device.port.is_none() {
            return Err(ConfigError::MissingSerialPort);
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn total_pixels(&self) -> usize {
        self.strands.saturating_mul(self.pixels_per_strand)
    }
}

impl ServerConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }
}

impl DeviceConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}
