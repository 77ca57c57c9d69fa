use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::connection::{Connection, ConnectionEvent};
use crate::device::DeviceDriver;
use crate::error::ServerError;
use crate::generator::FrameGenerator;
use crate::pixel::{Pixel, PixelBuffer};
use crate::stats::Stats;

const ACCEPT_POLL: Duration = Duration::from_millis(50);

/// Client input forwarded from a handler thread to the render loop
#[derive(Debug)]
pub struct FrameTrigger {
    pub peer: SocketAddr,
    pub payload: Vec<u8>,
    pub acked: bool,
}

/// Owns the pixel buffer, device and stats; drives one frame per client message
pub struct Server {
    config: Config,
    buffer: PixelBuffer,
    driver: Box<dyn DeviceDriver>,
    stats: Stats,
    generator: FrameGenerator,
    listener: TcpListener,
    running: Arc<AtomicBool>,
    last_report: Instant,
}

impl Server {
    /// Allocate, open the device and bind the listener.
    ///
    /// Non-fatal device errors are logged; everything else returned here
    /// should end the process.
    pub fn start(config: Config, mut driver: Box<dyn DeviceDriver>) -> Result<Self, ServerError> {
        config.validate()?;

        let buffer = PixelBuffer::allocate(config.strands, config.pixels_per_strand)?;

        match driver.open(config.strands, config.pixels_per_strand) {
            Ok(()) => debug!("Device {} ready", driver.name()),
            Err(e) if !e.is_fatal() => {
                warn!("{}: {} (continuing)", driver.describe_error(e.code()), e);
            }
            Err(e) => {
                driver.close();
                return Err(e.into());
            }
        }

        let stats = Stats::init();

        let addr = config.listen_addr();
        let listener = match TcpListener::bind(&addr) {
            Ok(listener) => listener,
            Err(source) => {
                driver.close();
                return Err(ServerError::Bind { addr, source });
            }
        };
        // Non-blocking so accept() can check the running flag
        if let Err(e) = listener.set_nonblocking(true) {
            driver.close();
            return Err(e.into());
        }

        info!(
            "Listening on {} ({} strands x {} pixels, {:?} mode, device {})",
            listener.local_addr().map(|a| a.to_string()).unwrap_or(addr),
            config.strands,
            config.pixels_per_strand,
            config.mode,
            driver.name()
        );

        let generator = FrameGenerator::new(config.mode, config.pixels_per_strand);

        Ok(Server {
            config,
            buffer,
            driver,
            stats,
            generator,
            listener,
            running: Arc::new(AtomicBool::new(true)),
            last_report: Instant::now(),
        })
    }

    /// Clone of the running flag for signal handlers
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Serve clients until the running flag is cleared
    pub fn run(&mut self) -> Result<(), ServerError> {
        if self.config.server.multi_client {
            self.run_multi_client()
        } else {
            self.run_single_client()
        }
    }

    /// Blank the strands (if configured), close the device and report.
    ///
    /// Dropping the server afterwards releases the buffer and sockets.
    pub fn shutdown(mut self) -> Stats {
        if self.config.server.blank_on_exit {
            debug!("Turning off LEDs...");
            self.buffer.fill(Pixel::BLACK);
            if let Err(e) = self.driver.refresh(&self.buffer, &mut self.stats) {
                warn!("Could not blank strands: {}", e);
            }
        }
        self.driver.close();
        info!("Server stopped: {}", self.stats);
        self.stats.clone()
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    fn run_single_client(&mut self) -> Result<(), ServerError> {
        while self.is_running() {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    self.stats.record_connection();
                    info!("Client connected from {}", peer);
                    match Connection::new(stream, peer, self.config.server.read_timeout()) {
                        Ok(conn) => self.serve(conn),
                        Err(e) => warn!("Could not set up connection from {}: {}", peer, e),
                    }
                    info!("Client {} disconnected", peer);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                    thread::sleep(ACCEPT_POLL);
                }
                Err(e) => {
                    warn!("Error accepting connection: {}", e);
                    thread::sleep(ACCEPT_POLL);
                }
            }
            self.maybe_report();
        }
        Ok(())
    }

    /// Handle one client until it goes away or the server stops
    fn serve(&mut self, mut conn: Connection) {
        while self.is_running() {
            match conn.poll() {
                ConnectionEvent::Message { payload, acked } => {
                    self.stats.record_received(payload.len());
                    if acked {
                        self.stats.record_ack();
                    }
                    self.render_frame(&payload);
                }
                ConnectionEvent::Idle => {
                    if self.config.server.idle_render {
                        self.render_frame(&[]);
                    }
                }
                ConnectionEvent::Closed => break,
            }
            self.maybe_report();
        }
    }

    fn run_multi_client(&mut self) -> Result<(), ServerError> {
        let (sender, receiver) =
            mpsc::sync_channel::<FrameTrigger>(self.config.server.trigger_queue.max(1));
        let mut handlers: Vec<thread::JoinHandle<()>> = Vec::new();
        let read_timeout = self.config.server.read_timeout();

        while self.is_running() {
            loop {
                match self.listener.accept() {
                    Ok((stream, peer)) => {
                        self.stats.record_connection();
                        info!("Client connected from {}", peer);
                        match Connection::new(stream, peer, read_timeout) {
                            Ok(conn) => {
                                let sender = sender.clone();
                                let running = Arc::clone(&self.running);
                                handlers.push(thread::spawn(move || {
                                    handler_thread(conn, sender, running)
                                }));
                            }
                            Err(e) => warn!("Could not set up connection from {}: {}", peer, e),
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                    Err(e) => {
                        warn!("Error accepting connection: {}", e);
                        break;
                    }
                }
            }

            match receiver.recv_timeout(read_timeout) {
                Ok(trigger) => {
                    self.stats.record_received(trigger.payload.len());
                    if trigger.acked {
                        self.stats.record_ack();
                    }
                    debug!("Frame trigger from {}", trigger.peer);
                    self.render_frame(&trigger.payload);
                }
                Err(RecvTimeoutError::Timeout) => {
                    if self.config.server.idle_render {
                        self.render_frame(&[]);
                    }
                }
                // unreachable while we hold `sender`
                Err(RecvTimeoutError::Disconnected) => break,
            }

            handlers.retain(|h| !h.is_finished());
            self.maybe_report();
        }

        // handlers blocked on a full queue see the disconnect and exit
        drop(receiver);
        for handle in handlers {
            let _ = handle.join();
        }
        Ok(())
    }

    /// Generate and dispatch one frame. Returns false if the refresh failed.
    fn render_frame(&mut self, input: &[u8]) -> bool {
        let started = Instant::now();
        self.generator.generate(input, &mut self.buffer);

        match self.driver.refresh(&self.buffer, &mut self.stats) {
            Ok(()) => {
                self.buffer.mark_clean();
                self.stats.record_frame(started.elapsed());
                true
            }
            Err(e) => {
                self.stats.record_error(e.code());
                warn!("Refresh failed: {}: {}", self.driver.describe_error(e.code()), e);
                false
            }
        }
    }

    fn maybe_report(&mut self) {
        let interval = self.config.server.stats_interval();
        if interval.is_zero() || self.last_report.elapsed() < interval {
            return;
        }
        info!("[Stats] {}", self.stats);
        self.last_report = Instant::now();
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.driver.close();
    }
}

fn handler_thread(
    mut conn: Connection,
    sender: SyncSender<FrameTrigger>,
    running: Arc<AtomicBool>,
) {
    let peer = conn.peer();
    while running.load(Ordering::Relaxed) {
        match conn.poll() {
            ConnectionEvent::Message { payload, acked } => {
                if sender.send(FrameTrigger { peer, payload, acked }).is_err() {
                    break;
                }
            }
            ConnectionEvent::Idle => continue,
            ConnectionEvent::Closed => break,
        }
    }
    info!("Client {} disconnected", peer);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ACK;
    use crate::device::{SimulatedDriver, SimulatedHandle};
    use crate::error::DeviceErrorKind;
    use crate::generator::GeneratorMode;
    use std::io::{Read, Write};
    use std::net::TcpStream;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;
        config.server.read_timeout_ms = 20;
        config.server.blank_on_exit = false;
        config
    }

    fn start(config: Config) -> (Server, SimulatedHandle) {
        let driver = SimulatedDriver::new(16);
        let handle = driver.handle();
        let server = Server::start(config, Box::new(driver)).unwrap();
        (server, handle)
    }

    struct Running {
        addr: SocketAddr,
        flag: Arc<AtomicBool>,
        thread: thread::JoinHandle<Stats>,
    }

    impl Running {
        fn stop(self) -> Stats {
            self.flag.store(false, Ordering::Relaxed);
            self.thread.join().unwrap()
        }
    }

    fn spawn(mut server: Server) -> Running {
        let addr = server.local_addr().unwrap();
        let flag = server.running_flag();
        let thread = thread::spawn(move || {
            server.run().unwrap();
            server.shutdown()
        });
        Running { addr, flag, thread }
    }

    fn ping(addr: SocketAddr) -> TcpStream {
        let mut client = TcpStream::connect(addr).unwrap();
        client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        client.write_all(b"ping").unwrap();
        let mut reply = [0u8; ACK.len()];
        client.read_exact(&mut reply).unwrap();
        assert_eq!(&reply, ACK);
        client
    }

    fn wait_for(mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() {
            assert!(Instant::now() < deadline, "timed out waiting");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_ping_renders_exactly_one_frame() {
        let (server, handle) = start(test_config());
        let running = spawn(server);

        let mut client = ping(running.addr);
        wait_for(|| handle.refreshes() == 1);

        // no idle rendering: a silent client produces nothing more
        thread::sleep(Duration::from_millis(100));
        assert_eq!(handle.refreshes(), 1);
        client.set_read_timeout(Some(Duration::from_millis(50))).unwrap();
        let mut extra = [0u8; 1];
        assert!(client.read(&mut extra).is_err(), "only one ack expected");

        let frame = handle.last_frame().unwrap();
        assert_eq!(frame.pixels.len(), 25);
        assert_eq!(frame.pixels[0], Pixel::new(127, 174, 12));

        drop(client);
        let stats = running.stop();
        assert_eq!(stats.frames_rendered, 1);
        assert_eq!(stats.acks_sent, 1);
        assert_eq!(stats.bytes_received, 4);
        assert_eq!(stats.refresh_errors, 0);
        assert!(!handle.is_open());
    }

    #[test]
    fn test_reconnect_after_disconnect() {
        let (server, handle) = start(test_config());
        let running = spawn(server);

        drop(ping(running.addr));
        wait_for(|| handle.refreshes() == 1);
        drop(ping(running.addr));
        wait_for(|| handle.refreshes() == 2);

        let stats = running.stop();
        assert_eq!(stats.connections, 2);
        assert_eq!(stats.frames_rendered, 2);
    }

    #[test]
    fn test_refresh_failure_is_skipped() {
        let (server, handle) = start(test_config());
        handle.fail_next_refreshes(1);
        let running = spawn(server);

        let mut client = ping(running.addr);
        client.write_all(b"again").unwrap();
        let mut reply = [0u8; ACK.len()];
        client.read_exact(&mut reply).unwrap();
        wait_for(|| handle.refreshes() == 1);

        drop(client);
        let stats = running.stop();
        assert_eq!(stats.refresh_errors, 1);
        assert_eq!(stats.last_error, Some(DeviceErrorKind::Write.code()));
        assert_eq!(stats.frames_rendered, 1);
    }

    #[test]
    fn test_failed_refresh_keeps_buffer_and_dirty_region() {
        let mut config = test_config();
        config.mode = GeneratorMode::External;
        let (mut server, handle) = start(config);

        handle.fail_next_refreshes(1);
        assert!(!server.render_frame(&[1, 2, 3]));
        assert_eq!(server.buffer.get(0), Some(Pixel::new(1, 2, 3)));
        assert_eq!(server.buffer.dirty(), Some(0..1));

        assert!(server.render_frame(&[]));
        let frame = handle.last_frame().unwrap();
        assert_eq!(frame.pixels[0], Pixel::new(1, 2, 3));
        assert_eq!(frame.dirty, Some(0..1));
        assert_eq!(server.buffer.dirty(), None);
    }

    #[test]
    fn test_idle_render_keeps_frames_flowing() {
        let mut config = test_config();
        config.server.idle_render = true;
        let (server, handle) = start(config);
        let running = spawn(server);

        let _client = TcpStream::connect(running.addr).unwrap();
        wait_for(|| handle.refreshes() >= 3);
        running.stop();
    }

    #[test]
    fn test_multi_client_fan_in() {
        let mut config = test_config();
        config.server.multi_client = true;
        let (server, handle) = start(config);
        let running = spawn(server);

        let a = ping(running.addr);
        let b = ping(running.addr);
        wait_for(|| handle.refreshes() == 2);

        drop(a);
        drop(b);
        let stats = running.stop();
        assert_eq!(stats.connections, 2);
        assert_eq!(stats.acks_sent, 2);
    }

    #[test]
    fn test_blank_on_exit() {
        let mut config = test_config();
        config.server.blank_on_exit = true;
        let (mut server, handle) = start(config);
        assert!(server.render_frame(&[]));

        server.shutdown();
        let frame = handle.last_frame().unwrap();
        assert!(frame.pixels.iter().all(|p| *p == Pixel::BLACK));
        assert_eq!(handle.closes(), 1);
    }

    #[test]
    fn test_fatal_open_aborts_startup() {
        let driver = SimulatedDriver::new(1);
        driver.handle().fail_open(DeviceErrorKind::Open);
        let err = Server::start(test_config(), Box::new(driver)).err().unwrap();
        assert!(matches!(err, ServerError::Device(_)));
    }

    #[test]
    fn test_non_fatal_open_continues() {
        let driver = SimulatedDriver::new(1);
        let handle = driver.handle();
        handle.fail_open(DeviceErrorKind::BaudRate);
        let mut server = Server::start(test_config(), Box::new(driver)).unwrap();
        assert!(server.render_frame(&[]));
        assert_eq!(handle.refreshes(), 1);
    }

    #[test]
    fn test_bind_failure_closes_device() {
        let taken = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut config = test_config();
        config.server.port = taken.local_addr().unwrap().port();

        let driver = SimulatedDriver::new(1);
        let handle = driver.handle();
        let err = Server::start(config, Box::new(driver)).err().unwrap();
        assert!(matches!(err, ServerError::Bind { .. }));
        assert!(!handle.is_open());
    }

    #[test]
    fn test_zero_pixels_rejected() {
        let mut config = test_config();
        config.strands = 0;
        let driver = SimulatedDriver::new(1);
        let handle = driver.handle();
        let err = Server::start(config, Box::new(driver)).err().unwrap();
        assert!(matches!(err, ServerError::Config(_)));
        assert_eq!(handle.opens(), 0);
    }
}
