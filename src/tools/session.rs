//! Observable state of a tool provisioning attempt.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Shortest window over which a download speed is computed.
pub const SPEED_SAMPLE_WINDOW: Duration = Duration::from_millis(100);

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Progress of the current provisioning attempt.
///
/// Owned by the caller and passed to [`super::ToolProvisioner::provision`];
/// observers may read it from any task while the attempt runs.
#[derive(Debug, Default)]
pub struct ProvisioningSession {
    downloading: AtomicBool,
    bytes: AtomicU64,
    speed_bits: AtomicU64,
}

impl ProvisioningSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_downloading(&self) -> bool {
        self.downloading.load(Ordering::Acquire)
    }

    pub fn bytes_downloaded(&self) -> u64 {
        self.bytes.load(Ordering::Acquire)
    }

    /// Last sampled speed in MB/s.
    pub fn speed_mbps(&self) -> f64 {
        f64::from_bits(self.speed_bits.load(Ordering::Acquire))
    }

    /// Reset the counters and mark an attempt as running. The returned guard
    /// clears the state when dropped, whatever the outcome.
    pub fn begin(&self) -> SessionGuard<'_> {
        self.clear();
        self.downloading.store(true, Ordering::Release);
        SessionGuard { session: self }
    }

    fn clear(&self) {
        self.downloading.store(false, Ordering::Release);
        self.bytes.store(0, Ordering::Release);
        self.speed_bits.store(0f64.to_bits(), Ordering::Release);
    }
}

pub struct SessionGuard<'a> {
    session: &'a ProvisioningSession,
}

impl SessionGuard<'_> {
    pub fn add_bytes(&self, n: u64) -> u64 {
        self.session.bytes.fetch_add(n, Ordering::AcqRel) + n
    }

    pub fn set_speed(&self, mbps: f64) {
        self.session
            .speed_bits
            .store(mbps.to_bits(), Ordering::Release);
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.session.clear();
    }
}

/// Speed of a single download, sampled at most once per
/// [`SPEED_SAMPLE_WINDOW`]. One meter per download; it only counts the bytes
/// recorded through it.
#[derive(Debug)]
pub struct SpeedMeter {
    last_instant: Instant,
    bytes: u64,
    last_bytes: u64,
}

impl SpeedMeter {
    pub fn new(now: Instant) -> Self {
        Self {
            last_instant: now,
            bytes: 0,
            last_bytes: 0,
        }
    }

    /// Count `n` more bytes. Returns MB/s since the previous sample, or
    /// `None` while the window is still open.
    pub fn record(&mut self, now: Instant, n: u64) -> Option<f64> {
        self.bytes += n;
        let elapsed = now.saturating_duration_since(self.last_instant);
        if elapsed < SPEED_SAMPLE_WINDOW {
            return None;
        }
        let delta = self.bytes - self.last_bytes;
        self.last_instant = now;
        self.last_bytes = self.bytes;
        Some(delta as f64 / BYTES_PER_MB / elapsed.as_secs_f64())
    }
}

/// Maps a download's fractional progress onto a sub-range of 0..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressScale {
    pub start: u32,
    pub end: u32,
}

impl ProgressScale {
    pub const FULL: ProgressScale = ProgressScale { start: 0, end: 100 };
    pub const FIRST_HALF: ProgressScale = ProgressScale { start: 0, end: 50 };
    pub const SECOND_HALF: ProgressScale = ProgressScale { start: 50, end: 100 };

    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn scale(&self, fraction: f64) -> u32 {
        let span = self.end.saturating_sub(self.start) as f64;
        self.start + (fraction.clamp(0.0, 1.0) * span) as u32
    }
}
