use std::fmt;
use std::time::{Duration, Instant};

/// Pipeline counters, owned by the render loop
#[derive(Debug, Clone)]
pub struct Stats {
    pub frames_rendered: u64,
    pub refresh_errors: u64,
    /// Bytes read from clients
    pub bytes_received: u64,
    /// Bytes written to the device transport
    pub bytes_sent: u64,
    pub acks_sent: u64,
    pub connections: u64,
    pub last_error: Option<i32>,
    pub last_frame_time: Duration,
    pub total_frame_time: Duration,
    started: Instant,
}

impl Stats {
    pub fn init() -> Self {
        Stats {
            frames_rendered: 0,
            refresh_errors: 0,
            bytes_received: 0,
            bytes_sent: 0,
            acks_sent: 0,
            connections: 0,
            last_error: None,
            last_frame_time: Duration::ZERO,
            total_frame_time: Duration::ZERO,
            started: Instant::now(),
        }
    }

    pub fn record_frame(&mut self, duration: Duration) {
        self.frames_rendered += 1;
        self.last_frame_time = duration;
        self.total_frame_time += duration;
    }

    pub fn record_error(&mut self, code: i32) {
        self.refresh_errors += 1;
        self.last_error = Some(code);
    }

    pub fn record_received(&mut self, bytes: usize) {
        self.bytes_received += bytes as u64;
    }

    pub fn record_sent(&mut self, bytes: usize) {
        self.bytes_sent += bytes as u64;
    }

    pub fn record_ack(&mut self) {
        self.acks_sent += 1;
    }

    pub fn record_connection(&mut self) {
        self.connections += 1;
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Frames per second since startup
    pub fn average_fps(&self) -> f64 {
        let secs = self.uptime().as_secs_f64();
        if secs > 0.0 {
            self.frames_rendered as f64 / secs
        } else {
            0.0
        }
    }

    /// Mean generate+refresh time per rendered frame
    pub fn average_frame_time(&self) -> Duration {
        match u32::try_from(self.frames_rendered) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.total_frame_time / n,
            Err(_) => Duration::from_secs_f64(
                self.total_frame_time.as_secs_f64() / self.frames_rendered as f64,
            ),
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::init()
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frames={} ({:.1} fps avg, {:?}/frame) errors={} rx={}B tx={}B acks={} clients={}",
            self.frames_rendered,
            self.average_fps(),
            self.average_frame_time(),
            self.refresh_errors,
            self.bytes_received,
            self.bytes_sent,
            self.acks_sent,
            self.connections,
        )?;
        if let Some(code) = self.last_error {
            write!(f, " last_error={}", code)?;
        }
        Ok(())
    }
}
