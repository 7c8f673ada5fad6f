//! Fixed-period control cycle: drain bus → tick controller → transmit status.
//!
//! ## RT Setup Sequence
//! 1. `mlockall(MCL_CURRENT | MCL_FUTURE)`: lock all pages.
//! 2. Prefault stack pages.
//! 3. `sched_setaffinity`: pin to a CPU core.
//! 4. `sched_setscheduler(SCHED_FIFO, prio)`: RT priority.
//!
//! Without the `rt` feature every step except the prefault is a no-op and
//! the loop paces itself with `std::thread::sleep`.

use crate::bus::SignalCache;
use crate::gearbox::{CycleOutput, GearboxController};
use egs_common::hal::driver::CanBus;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Upper bound on frames drained from the bus in one cycle.
pub const MAX_RX_PER_CYCLE: usize = 64;

// ─── Cycle Statistics ───────────────────────────────────────────────

/// O(1) per-cycle timing statistics.
#[derive(Debug, Clone)]
pub struct CycleStats {
    /// Total cycles executed.
    pub cycle_count: u64,
    /// Last cycle duration [ns].
    pub last_cycle_ns: i64,
    /// Minimum cycle duration [ns].
    pub min_cycle_ns: i64,
    /// Maximum cycle duration [ns].
    pub max_cycle_ns: i64,
    /// Running sum for average computation.
    pub sum_cycle_ns: i64,
    /// Cycles whose body took longer than the period.
    pub overruns: u64,
    /// Maximum wake-up latency [ns].
    pub max_latency_ns: i64,
}

impl CycleStats {
    pub const fn new() -> Self {
        Self {
            cycle_count: 0,
            last_cycle_ns: 0,
            min_cycle_ns: i64::MAX,
            max_cycle_ns: 0,
            sum_cycle_ns: 0,
            overruns: 0,
            max_latency_ns: 0,
        }
    }

    /// Record a cycle duration. O(1), no allocation.
    #[inline]
    pub fn record(&mut self, duration_ns: i64, latency_ns: i64) {
        self.cycle_count += 1;
        self.last_cycle_ns = duration_ns;
        self.min_cycle_ns = self.min_cycle_ns.min(duration_ns);
        self.max_cycle_ns = self.max_cycle_ns.max(duration_ns);
        self.sum_cycle_ns += duration_ns;
        self.max_latency_ns = self.max_latency_ns.max(latency_ns);
    }

    /// Average cycle time [ns] (0 if no cycles).
    #[inline]
    pub fn avg_cycle_ns(&self) -> i64 {
        if self.cycle_count == 0 {
            0
        } else {
            self.sum_cycle_ns / self.cycle_count as i64
        }
    }
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Loop Clock ─────────────────────────────────────────────────────

/// Monotonic milliseconds since construction, starting at 1 so that no
/// real timestamp collides with the cache's "never seen" marker.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    #[inline]
    pub fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64 + 1
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

// ─── RT Setup ───────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CycleError {
    /// RT system call failed.
    #[error("RT setup error: {0}")]
    RtSetup(String),

    #[error("clock error: {0}")]
    Clock(String),
}

/// Lock all current and future memory pages.
#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), CycleError> {
    use nix::sys::mman::{MlockallFlags, mlockall};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| CycleError::RtSetup(format!("mlockall failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_mlockall() -> Result<(), CycleError> {
    Ok(())
}

/// Touch 256 KiB of stack so the loop does not fault pages in later.
fn prefault_stack() {
    let mut buf = [0u8; 256 * 1024];
    for byte in buf.iter_mut() {
        // SAFETY: `byte` is a valid, exclusive reference into `buf`.
        unsafe { core::ptr::write_volatile(byte, 0xFF) };
    }
    core::hint::black_box(&buf);
}

#[cfg(feature = "rt")]
fn rt_set_affinity(cpu: usize) -> Result<(), CycleError> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| CycleError::RtSetup(format!("CpuSet::set({cpu}) failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| CycleError::RtSetup(format!("sched_setaffinity failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_set_affinity(_cpu: usize) -> Result<(), CycleError> {
    Ok(())
}

#[cfg(feature = "rt")]
fn rt_set_scheduler(priority: i32) -> Result<(), CycleError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    // SAFETY: `param` outlives the call; pid 0 is the calling thread.
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(CycleError::RtSetup(format!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"
        )));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_scheduler(_priority: i32) -> Result<(), CycleError> {
    Ok(())
}

/// Full RT setup. Call from the thread that will run the loop.
pub fn rt_setup(cpu_core: usize, rt_priority: i32) -> Result<(), CycleError> {
    rt_mlockall()?;
    prefault_stack();
    rt_set_affinity(cpu_core)?;
    rt_set_scheduler(rt_priority)?;
    Ok(())
}

// ─── Cycle Runner ───────────────────────────────────────────────────

/// Owns the controller, the bus transport and the loop timing.
pub struct CycleRunner {
    controller: GearboxController,
    cache: Arc<SignalCache>,
    bus: Box<dyn CanBus>,
    clock: MonotonicClock,
    stats: CycleStats,
    cycle_time_ns: i64,
    running: Arc<AtomicBool>,
}

impl CycleRunner {
    pub fn new(
        controller: GearboxController,
        cache: Arc<SignalCache>,
        bus: Box<dyn CanBus>,
        cycle_time_ms: u32,
    ) -> Self {
        Self {
            controller,
            cache,
            bus,
            clock: MonotonicClock::new(),
            stats: CycleStats::new(),
            cycle_time_ns: cycle_time_ms as i64 * 1_000_000,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Clearing this flag ends [`run`](Self::run) after the current cycle.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    pub fn controller(&self) -> &GearboxController {
        &self.controller
    }

    /// Loop time of the runner's clock [ms].
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// One cycle body.
    pub fn step(&mut self) -> CycleOutput {
        let now = self.clock.now_ms();

        for _ in 0..MAX_RX_PER_CYCLE {
            let Some(frame) = self.bus.receive() else {
                break;
            };
            if !self.cache.ingest(frame.id, frame.payload, now) {
                debug!("Ignoring frame 0x{:03X}", frame.id);
            }
        }

        let output = self.controller.tick(now);

        for frame in output.frames {
            if let Err(e) = self.bus.transmit(frame) {
                warn!("Transmit 0x{:03X} failed: {e}", frame.id);
            }
        }
        output
    }

    /// Run until the running flag clears, then shut the controller down.
    pub fn run(&mut self) -> Result<(), CycleError> {
        info!(
            "Entering control loop ({} ms period)",
            self.cycle_time_ns / 1_000_000
        );

        #[cfg(feature = "rt")]
        let result = self.run_rt_loop();
        #[cfg(not(feature = "rt"))]
        let result = self.run_sim_loop();

        self.shutdown();
        result
    }

    fn record(&mut self, duration_ns: i64, latency_ns: i64) {
        self.stats.record(duration_ns, latency_ns);
        if duration_ns > self.cycle_time_ns {
            self.stats.overruns += 1;
            warn!(
                "Cycle overrun: {duration_ns} ns > {} ns budget",
                self.cycle_time_ns
            );
        }
    }

    /// Absolute-time pacing with `clock_nanosleep(TIMER_ABSTIME)`.
    #[cfg(feature = "rt")]
    fn run_rt_loop(&mut self) -> Result<(), CycleError> {
        use nix::time::{ClockId, ClockNanosleepFlags, clock_gettime, clock_nanosleep};

        let clock = ClockId::CLOCK_MONOTONIC;
        let mut next_wake =
            clock_gettime(clock).map_err(|e| CycleError::Clock(format!("clock_gettime: {e}")))?;

        while self.running.load(Ordering::Acquire) {
            next_wake = timespec_add_ns(next_wake, self.cycle_time_ns);

            let cycle_start = clock_gettime(clock)
                .map_err(|e| CycleError::Clock(format!("clock_gettime: {e}")))?;
            self.step();
            let cycle_end = clock_gettime(clock)
                .map_err(|e| CycleError::Clock(format!("clock_gettime: {e}")))?;

            let latency = timespec_diff_ns(&cycle_start, &next_wake).abs();
            self.record(timespec_diff_ns(&cycle_end, &cycle_start), latency);

            let _ = clock_nanosleep(clock, ClockNanosleepFlags::TIMER_ABSTIME, &next_wake);
        }
        Ok(())
    }

    #[cfg(not(feature = "rt"))]
    fn run_sim_loop(&mut self) -> Result<(), CycleError> {
        let period = std::time::Duration::from_nanos(self.cycle_time_ns as u64);

        while self.running.load(Ordering::Acquire) {
            let cycle_start = Instant::now();
            self.step();
            let elapsed = cycle_start.elapsed();
            self.record(elapsed.as_nanos() as i64, 0);

            if let Some(remaining) = period.checked_sub(elapsed) {
                std::thread::sleep(remaining);
            }
        }
        Ok(())
    }

    /// Stop the shift worker and sampler and release every solenoid.
    pub fn shutdown(&mut self) {
        info!(
            "Control loop stopped after {} cycles: avg {} µs, max {} µs, {} overruns",
            self.stats.cycle_count,
            self.stats.avg_cycle_ns() / 1000,
            self.stats.max_cycle_ns / 1000,
            self.stats.overruns
        );
        self.controller.shutdown();
    }
}

// ─── Time Helpers ───────────────────────────────────────────────────

#[cfg(feature = "rt")]
fn timespec_add_ns(ts: nix::sys::time::TimeSpec, ns: i64) -> nix::sys::time::TimeSpec {
    use nix::sys::time::TimeSpec;
    let mut secs = ts.tv_sec();
    let mut nanos = ts.tv_nsec() + ns;
    while nanos >= 1_000_000_000 {
        secs += 1;
        nanos -= 1_000_000_000;
    }
    TimeSpec::new(secs, nanos)
}

/// `a - b` in nanoseconds.
#[cfg(feature = "rt")]
fn timespec_diff_ns(a: &nix::sys::time::TimeSpec, b: &nix::sys::time::TimeSpec) -> i64 {
    (a.tv_sec() - b.tv_sec()) * 1_000_000_000 + (a.tv_nsec() - b.tv_nsec())
}
