//! Supervised shift procedure.
//!
//! A shift runs on its own thread so the control loop keeps sampling while
//! the clutches fill. The loop polls the worker each cycle through a
//! completion channel and enforces a deadline measured in loop time. A
//! worker that misses the deadline is told to cancel and left to finish on
//! its own; no new shift starts until it has exited.

use crate::solenoid::SolenoidBank;
use egs_common::control_unit::config::ShiftConfig;
use egs_common::control_unit::gear::{Gear, ShiftDirection};
use egs_common::control_unit::solenoid::SolenoidId;
use egs_common::hal::driver::{HalError, VoltageSense};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Poll interval of the worker's cancel flag while holding a solenoid.
const CANCEL_POLL: Duration = Duration::from_millis(5);

/// Shift solenoid that moves the gearbox between two adjacent forward gears.
pub fn shift_solenoid(from: Gear, to: Gear) -> Option<SolenoidId> {
    ShiftDirection::between(from, to)?;
    let lower = from.forward_number()?.min(to.forward_number()?);
    match lower {
        1 | 4 => Some(SolenoidId::Y3),
        2 => Some(SolenoidId::Y5),
        3 => Some(SolenoidId::Y4),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShiftError {
    #[error("a shift is already in progress")]
    Busy,

    #[error("{from} -> {to} is not a single forward step")]
    NotSingleStep { from: Gear, to: Gear },

    #[error("failed to spawn shift worker: {0}")]
    Spawn(String),
}

/// How a worker ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShiftOutcome {
    Completed,
    Cancelled,
    Failed(String),
}

/// Result of one supervisor poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShiftPoll {
    /// No worker alive.
    Idle,
    Running,
    Finished {
        from: Gear,
        to: Gear,
        outcome: ShiftOutcome,
    },
    /// Deadline passed on this poll; the worker has been told to cancel.
    TimedOut { from: Gear, to: Gear },
    /// A timed-out worker has not exited yet.
    Draining,
}

#[derive(Debug, Clone, Copy)]
struct ShiftPlan {
    from: Gear,
    to: Gear,
    solenoid: SolenoidId,
    shift_mpc: u16,
    shift_spc: u16,
    idle_mpc: u16,
    hold: Duration,
}

struct ActiveShift {
    from: Gear,
    to: Gear,
    direction: ShiftDirection,
    deadline_ms: u64,
    cancel: Arc<AtomicBool>,
    done: Receiver<ShiftOutcome>,
    handle: JoinHandle<()>,
}

pub struct ShiftSupervisor {
    bank: Arc<SolenoidBank>,
    supply: Arc<dyn VoltageSense>,
    config: ShiftConfig,
    active: Option<ActiveShift>,
    abandoned: Option<JoinHandle<()>>,
}

impl ShiftSupervisor {
    pub fn new(bank: Arc<SolenoidBank>, supply: Arc<dyn VoltageSense>, config: ShiftConfig) -> Self {
        Self {
            bank,
            supply,
            config,
            active: None,
            abandoned: None,
        }
    }

    /// A worker is running inside its deadline.
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// A timed-out worker has not exited yet.
    pub fn is_draining(&self) -> bool {
        self.abandoned.is_some()
    }

    /// Any worker alive; no new shift may start.
    pub fn is_busy(&self) -> bool {
        self.is_active() || self.is_draining()
    }

    pub fn direction(&self) -> Option<ShiftDirection> {
        self.active.as_ref().map(|a| a.direction)
    }

    /// Start a single-step shift at loop time `now_ms`.
    pub fn start(&mut self, from: Gear, to: Gear, now_ms: u64) -> Result<ShiftDirection, ShiftError> {
        if self.is_busy() {
            return Err(ShiftError::Busy);
        }
        let direction =
            ShiftDirection::between(from, to).ok_or(ShiftError::NotSingleStep { from, to })?;
        let solenoid = shift_solenoid(from, to).ok_or(ShiftError::NotSingleStep { from, to })?;

        let plan = ShiftPlan {
            from,
            to,
            solenoid,
            shift_mpc: self.config.shift_mpc_percent,
            shift_spc: self.config.shift_spc_percent,
            idle_mpc: self.config.idle_mpc_percent,
            hold: Duration::from_millis(self.config.solenoid_hold_ms),
        };
        let cancel = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::sync_channel(1);

        let handle = {
            let bank = Arc::clone(&self.bank);
            let supply = Arc::clone(&self.supply);
            let cancel = Arc::clone(&cancel);
            thread::Builder::new()
                .name("egs-shift".into())
                .spawn(move || {
                    let outcome = run_shift(&bank, supply.as_ref(), plan, &cancel);
                    // Receiver gone means the supervisor was dropped.
                    let _ = tx.send(outcome);
                })
                .map_err(|e| ShiftError::Spawn(e.to_string()))?
        };

        info!("Shift {} -> {} via {} started", from, to, solenoid);
        self.active = Some(ActiveShift {
            from,
            to,
            direction,
            deadline_ms: now_ms.saturating_add(self.config.timeout_ms),
            cancel,
            done: rx,
            handle,
        });
        Ok(direction)
    }

    /// Check the worker at loop time `now_ms`.
    pub fn poll(&mut self, now_ms: u64) -> ShiftPoll {
        if self.abandoned.as_ref().is_some_and(|h| h.is_finished()) {
            if let Some(handle) = self.abandoned.take() {
                if handle.join().is_err() {
                    error!("Abandoned shift worker panicked");
                }
            }
            info!("Abandoned shift worker exited");
        }

        let Some(active) = self.active.as_ref() else {
            return if self.is_draining() {
                ShiftPoll::Draining
            } else {
                ShiftPoll::Idle
            };
        };
        let (from, to) = (active.from, active.to);

        let outcome = match active.done.try_recv() {
            Ok(outcome) => outcome,
            Err(TryRecvError::Disconnected) => {
                ShiftOutcome::Failed("worker exited without reporting".into())
            }
            Err(TryRecvError::Empty) => {
                if now_ms < active.deadline_ms {
                    return ShiftPoll::Running;
                }
                active.cancel.store(true, Ordering::Release);
                if let Some(active) = self.active.take() {
                    self.abandoned = Some(active.handle);
                }
                warn!("Shift {} -> {} exceeded {} ms", from, to, self.config.timeout_ms);
                return ShiftPoll::TimedOut { from, to };
            }
        };

        if let Some(active) = self.active.take() {
            if active.handle.join().is_err() {
                error!("Shift worker {} -> {} panicked", from, to);
            }
        }
        ShiftPoll::Finished { from, to, outcome }
    }

    /// Cancel any worker and wait for it.
    pub fn shutdown(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.store(true, Ordering::Release);
            if active.handle.join().is_err() {
                error!("Shift worker panicked during shutdown");
            }
        }
        if let Some(handle) = self.abandoned.take() {
            if handle.join().is_err() {
                error!("Abandoned shift worker panicked during shutdown");
            }
        }
    }
}

impl Drop for ShiftSupervisor {
    fn drop(&mut self) {
        if let Some(active) = &self.active {
            active.cancel.store(true, Ordering::Release);
        }
    }
}

fn run_shift(
    bank: &SolenoidBank,
    supply: &dyn VoltageSense,
    plan: ShiftPlan,
    cancel: &AtomicBool,
) -> ShiftOutcome {
    let engaged = engage(bank, supply, &plan, cancel);
    let released = release(bank, supply, &plan);

    match (engaged, released) {
        (Ok(outcome), Ok(())) => {
            debug!("Shift worker {} -> {}: {:?}", plan.from, plan.to, outcome);
            outcome
        }
        (Err(e), _) | (Ok(_), Err(e)) => ShiftOutcome::Failed(e.to_string()),
    }
}

fn engage(
    bank: &SolenoidBank,
    supply: &dyn VoltageSense,
    plan: &ShiftPlan,
    cancel: &AtomicBool,
) -> Result<ShiftOutcome, HalError> {
    let mv = supply.supply_mv();
    bank.set_duty_percent_compensated(SolenoidId::Mpc, plan.shift_mpc, mv)?;
    bank.set_duty_percent_compensated(SolenoidId::Spc, plan.shift_spc, mv)?;
    bank.set_duty_percent(plan.solenoid, 1000)?;

    let until = Instant::now() + plan.hold;
    loop {
        if cancel.load(Ordering::Acquire) {
            return Ok(ShiftOutcome::Cancelled);
        }
        let now = Instant::now();
        if now >= until {
            return Ok(ShiftOutcome::Completed);
        }
        thread::sleep(CANCEL_POLL.min(until - now));
    }
}

/// Always runs, whatever `engage` did.
fn release(bank: &SolenoidBank, supply: &dyn VoltageSense, plan: &ShiftPlan) -> Result<(), HalError> {
    let shift = bank.set_duty_percent(plan.solenoid, 0);
    let spc = bank.set_duty_percent(SolenoidId::Spc, 0);
    let mpc = bank.set_duty_percent_compensated(SolenoidId::Mpc, plan.idle_mpc, supply.supply_mv());
    shift.and(spc).and(mpc)
}
