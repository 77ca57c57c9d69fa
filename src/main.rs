use std::fs;
use std::process::ExitCode;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use strand_server::config::{Config, DeviceKind};
use strand_server::device;
use strand_server::generator::GeneratorMode;
use strand_server::pixel_format::PixelFormat;
use strand_server::protocol::WireProtocol;
use strand_server::server::Server;

#[derive(Parser)]
#[command(name = "strand_server")]
#[command(
    about = "Strand server\n\nRenders frames to LED strands, one per message received over TCP.",
    long_about = None
)]
struct Cli {
    /// Path to configuration file (JSON); flags override its values
    config: Option<String>,

    /// Number of strands
    #[arg(short = 's', long)]
    strands: Option<usize>,

    /// Pixels per strand
    #[arg(short = 'c', long = "count")]
    pixels_per_strand: Option<usize>,

    /// TCP port to listen on
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Frame generation mode
    #[arg(long, value_enum)]
    mode: Option<GeneratorMode>,

    /// Output device backend
    #[arg(long, value_enum)]
    device: Option<DeviceKind>,

    /// Serial port path for the serial backend
    #[arg(long)]
    serial_port: Option<String>,

    #[arg(long)]
    baud: Option<u32>,

    #[arg(long, value_enum)]
    protocol: Option<WireProtocol>,

    #[arg(long, value_enum)]
    pixel_format: Option<PixelFormat>,

    /// Render frames while the client is silent
    #[arg(long)]
    idle_render: bool,

    /// Accept several clients at once
    #[arg(long)]
    multi_client: bool,

    /// Enable debug output
    #[arg(long)]
    debug: bool,

    /// Enable detailed debug (hex dumps every frame)
    #[arg(long)]
    ddebug: bool,
}

impl Cli {
    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => {
                let data = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path))?;
                Config::from_json(&data)
                    .with_context(|| format!("Failed to parse config {}", path))?
            }
            None => Config::default(),
        };

        if let Some(strands) = self.strands {
            config.strands = strands;
        }
        if let Some(count) = self.pixels_per_strand {
            config.pixels_per_strand = count;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(kind) = self.device {
            config.device.kind = kind;
        }
        if let Some(path) = &self.serial_port {
            config.device.port = Some(path.clone());
            // a port on the command line implies the serial backend
            if self.device.is_none() {
                config.device.kind = DeviceKind::Serial;
            }
        }
        if let Some(baud) = self.baud {
            config.device.baud_rate = baud;
        }
        if let Some(protocol) = self.protocol {
            config.device.protocol = protocol;
        }
        if let Some(format) = self.pixel_format {
            config.device.pixel_format = format;
        }
        config.server.idle_render |= self.idle_render;
        config.server.multi_client |= self.multi_client;
        Ok(config)
    }
}

fn init_logging(debug: bool, ddebug: bool) {
    let filter = if ddebug {
        EnvFilter::new("trace")
    } else if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    // ddebug implies debug
    init_logging(cli.debug || cli.ddebug, cli.ddebug);

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let driver = device::build_driver(&config.device);
    let mut server = match Server::start(config, driver) {
        Ok(server) => server,
        Err(e) => {
            error!("{:#}", anyhow::Error::from(e));
            return ExitCode::FAILURE;
        }
    };

    let running = server.running_flag();
    if let Err(e) = ctrlc::set_handler(move || {
        running.store(false, Ordering::Relaxed);
    }) {
        warn!("Could not set Ctrl-C handler: {}", e);
    }

    let result = server.run();
    info!("Shutting down...");
    server.shutdown();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
