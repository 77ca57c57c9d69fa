use std::io::Write;
use std::thread;
use std::time::{Duration, Instant};

use serialport::SerialPort;
use tracing::{debug, trace, warn};

use super::DeviceDriver;
use crate::config::DeviceConfig;
use crate::error::{DeviceError, DeviceErrorKind};
use crate::pixel::PixelBuffer;
use crate::stats::Stats;

/// Rates the usual USB serial bridges can hit exactly
const STANDARD_BAUD_RATES: &[u32] = &[
    9600, 19200, 38400, 57600, 115200, 230400, 460800, 500000, 576000, 921600, 1000000, 1500000,
    2000000,
];

/// Serial LED output (Adalight, AWA or P9813 framing)
pub struct SerialDriver {
    config: DeviceConfig,
    port: Option<Box<dyn SerialPort>>,
    expected_pixels: usize,
}

impl SerialDriver {
    pub fn new(config: DeviceConfig) -> Self {
        SerialDriver {
            config,
            port: None,
            expected_pixels: 0,
        }
    }

    fn port_name(&self) -> &str {
        self.config.port.as_deref().unwrap_or("<unset>")
    }

    fn open_port(&self, path: &str) -> Result<Box<dyn SerialPort>, DeviceError> {
        let mut port = serialport::new(path, self.config.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(self.config.write_timeout())
            .open()
            .map_err(|e| {
                let detail = format!("failed to open {}", path);
                DeviceError::with_source(DeviceErrorKind::Open, detail, e)
            })?;

        if let Err(e) = port.write_data_terminal_ready(true) {
            warn!("Failed to set DTR on {}: {}", path, e);
        }

        // Allow device to initialize
        thread::sleep(Duration::from_millis(100));

        Ok(port)
    }
}

impl DeviceDriver for SerialDriver {
    fn open(&mut self, strands: usize, pixels_per_strand: usize) -> Result<(), DeviceError> {
        let path = self
            .config
            .port
            .clone()
            .ok_or_else(|| DeviceError::new(DeviceErrorKind::Open, "no serial port configured"))?;

        let pixels = strands.checked_mul(pixels_per_strand).ok_or_else(|| {
            DeviceError::new(DeviceErrorKind::Allocation, "pixel count overflows")
        })?;

        if let Some(max) = self.config.protocol.max_pixels() {
            if pixels > max {
                return Err(DeviceError::new(
                    DeviceErrorKind::Length,
                    format!(
                        "{} pixels exceed the {:?} limit of {}",
                        pixels, self.config.protocol, max
                    ),
                ));
            }
        }

        self.port = Some(self.open_port(&path)?);
        self.expected_pixels = pixels;

        debug!(
            "Opened {} ({:?} {:?} @ {} baud, {} pixels)",
            path, self.config.protocol, self.config.pixel_format, self.config.baud_rate, pixels
        );

        if !STANDARD_BAUD_RATES.contains(&self.config.baud_rate) {
            return Err(DeviceError::new(
                DeviceErrorKind::BaudRate,
                format!("{} baud on {}", self.config.baud_rate, path),
            ));
        }
        Ok(())
    }

    fn refresh(&mut self, buffer: &PixelBuffer, stats: &mut Stats) -> Result<(), DeviceError> {
        if buffer.len() != self.expected_pixels && self.port.is_some() {
            return Err(DeviceError::new(
                DeviceErrorKind::Length,
                format!("expected {} pixels, got {}", self.expected_pixels, buffer.len()),
            ));
        }
        let protocol = self.config.protocol;
        let format = self.config.pixel_format;
        let path = self.port_name().to_string();
        let Some(port) = self.port.as_mut() else {
            return Err(DeviceError::new(DeviceErrorKind::NotOpen, path));
        };

        let frame = protocol.build_frame(buffer.as_slice(), format);

        if tracing::enabled!(tracing::Level::TRACE) {
            let hex: String = frame
                .iter()
                .take(30)
                .map(|b| format!("{:02x}", b))
                .collect::<Vec<_>>()
                .join(" ");
            trace!("{}: sending {} bytes, first 30: {}", path, frame.len(), hex);
        }

        let started = Instant::now();
        port.write_all(&frame)
            .and_then(|()| port.flush())
            .map_err(|e| DeviceError::with_source(DeviceErrorKind::Write, path.clone(), e))?;
        trace!("{}: write took {:?}", path, started.elapsed());

        stats.record_sent(frame.len());
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            debug!("Closed {}", self.port_name());
        }
    }

    fn name(&self) -> &str {
        self.port_name()
    }
}
