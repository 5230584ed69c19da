//! Periodic performance logging, driven from the dispatcher tick so the
//! process stays single-threaded. Appends one line per interval with session
//! and group counts plus CPU usage from `getrusage(2)`.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use log::{info, warn};

const LOG_INTERVAL: Duration = Duration::from_secs(120);

/// Cumulative user+system CPU time of this process, in milliseconds.
fn cpu_time_ms() -> u128 {
    unsafe {
        let mut usage: libc::rusage = std::mem::zeroed();
        if libc::getrusage(libc::RUSAGE_SELF, &mut usage) == 0 {
            let user_sec = usage.ru_utime.tv_sec as u128;
            let user_usec = usage.ru_utime.tv_usec as u128;
            let sys_sec = usage.ru_stime.tv_sec as u128;
            let sys_usec = usage.ru_stime.tv_usec as u128;
            (user_sec * 1000 + user_usec / 1000) + (sys_sec * 1000 + sys_usec / 1000)
        } else {
            0
        }
    }
}

pub struct PerfMonitor {
    log_path: PathBuf,
    last_log: Instant,
    last_cpu_ms: u128,
}

impl PerfMonitor {
    pub fn new(log_path: PathBuf) -> Self {
        Self {
            log_path,
            last_log: Instant::now(),
            last_cpu_ms: cpu_time_ms(),
        }
    }

    /// Called once per dispatcher tick; logs when the interval has elapsed.
    pub fn maybe_log(&mut self, sessions: usize, groups: usize) {
        if self.last_log.elapsed() < LOG_INTERVAL {
            return;
        }
        let now_cpu_ms = cpu_time_ms();
        let delta_cpu_ms = now_cpu_ms.saturating_sub(self.last_cpu_ms);
        let wall_ms = self.last_log.elapsed().as_millis();

        let line = format!(
            "{} | sessions={} groups={} cpu_total_ms={} cpu_delta_ms={} wall_interval_ms={}",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S"),
            sessions,
            groups,
            now_cpu_ms,
            delta_cpu_ms,
            wall_ms
        );
        info!("📊 {}", line);

        match OpenOptions::new().create(true).append(true).open(&self.log_path) {
            Ok(mut f) => {
                if let Err(e) = writeln!(f, "{}", line) {
                    warn!("failed to append performance log: {}", e);
                }
            }
            Err(e) => warn!("failed to open {}: {}", self.log_path.display(), e),
        }

        self.last_cpu_ms = now_cpu_ms;
        self.last_log = Instant::now();
    }
}
