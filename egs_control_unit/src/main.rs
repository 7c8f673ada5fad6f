//! # EGS Control Unit
//!
//! Transmission controller binary. Loads `config/tcu.toml`, brings up the
//! selected HAL backend, calibrates the solenoid current sense and enters the
//! fixed-period control loop. Any startup fault ends the process with exit
//! code 1 before a solenoid has been driven.

use clap::{Parser, ValueEnum};
use egs_common::config::LogLevel;
use egs_common::consts::DEFAULT_CONFIG_PATH;
use egs_common::control_unit::config::TcuConfig;
use egs_common::control_unit::error::StartupError;
use egs_common::hal::driver::{HalDriver, HalError};
use egs_control_unit::bus::{GEARBOX_FRAMES, SignalCache};
use egs_control_unit::config::load_config;
use egs_control_unit::cycle::{CycleRunner, rt_setup};
use egs_control_unit::gearbox::{GearboxController, ManualProfile, Profile, RpmLimitProfile};
use egs_control_unit::solenoid::UncalibratedBank;
use egs_hal::DriverRegistry;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProfileKind {
    /// Driver requests only.
    Manual,
    /// Upshift at redline, downshift near stall or on kickdown.
    RpmLimit,
}

impl ProfileKind {
    fn build(self) -> Arc<dyn Profile> {
        match self {
            Self::Manual => Arc::new(ManualProfile),
            Self::RpmLimit => Arc::new(RpmLimitProfile::default()),
        }
    }
}

/// EGS Control Unit: 722.6 transmission control loop
#[derive(Parser, Debug)]
#[command(name = "egs_control_unit")]
#[command(version)]
#[command(about = "Gear classification, shift supervision and solenoid control")]
struct Args {
    /// Path to the controller configuration TOML.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// HAL driver name, overriding `[hal] driver`.
    #[arg(long)]
    driver: Option<String>,

    /// Driving profile active at startup.
    #[arg(long, value_enum, default_value_t = ProfileKind::Manual)]
    profile: ProfileKind,

    /// CPU core to pin the control thread to.
    #[arg(long, default_value_t = 1)]
    cpu_core: usize,

    /// SCHED_FIFO priority.
    #[arg(long, default_value_t = 80)]
    rt_priority: i32,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    let config = load_config(&args.config);
    let log_level = config
        .as_ref()
        .map(|c| c.shared.log_level)
        .unwrap_or_default();
    setup_tracing(&args, log_level);

    info!("EGS Control Unit v{} starting...", env!("CARGO_PKG_VERSION"));

    let result = config
        .map_err(|e| Box::new(StartupError::from(e)) as Box<dyn std::error::Error>)
        .and_then(|config| run(&args, config));
    if let Err(e) = result {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("EGS Control Unit shutdown complete");
}

fn run(args: &Args, mut config: TcuConfig) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(driver) = &args.driver {
        config.hal.driver = driver.clone();
    }
    info!(
        "Config OK: service={}, cycle={} ms, variant={:?}, driver={}",
        config.shared.service_name,
        config.control.cycle_time_ms,
        config.gearbox.variant,
        config.hal.driver
    );

    let (mut driver, mut runner) = start(&config)?;
    runner
        .controller()
        .handle()
        .set_profile(args.profile.build());

    if let Err(e) = rt_setup(args.cpu_core, args.rt_priority) {
        runner.shutdown();
        return Err(e.into());
    }
    info!(
        "RT setup complete (cpu_core={}, priority={})",
        args.cpu_core, args.rt_priority
    );

    let running = runner.running_flag();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        running.store(false, Ordering::SeqCst);
    })?;

    runner.run()?;
    driver.shutdown()?;
    Ok(())
}

/// HAL → calibration → controller. Nothing is actuated before calibration
/// has passed.
fn start(config: &TcuConfig) -> Result<(Box<dyn HalDriver>, CycleRunner), StartupError> {
    let registry = DriverRegistry::with_builtin_drivers();
    info!("Available HAL drivers: {:?}", registry.list_drivers());

    let mut driver = registry.create_driver(&config.hal.driver)?;
    driver.init(&config.hal)?;
    info!("HAL driver '{}' v{} initialized", driver.name(), driver.version());

    let supply = driver.voltage_sense()?;
    let bank = Arc::new(UncalibratedBank::new(driver.as_mut(), &config.solenoids)?.calibrate_all()?);
    bank.start_sampler()?;

    let cache = Arc::new(
        SignalCache::new(&GEARBOX_FRAMES).map_err(|e| HalError::InitFailed(e.to_string()))?,
    );
    let controller = GearboxController::new(config, Arc::clone(&cache), bank, supply)?;
    let bus = driver.take_bus()?;

    Ok((
        driver,
        CycleRunner::new(controller, cache, bus, config.control.cycle_time_ms),
    ))
}

/// Setup tracing subscriber. `RUST_LOG` wins over the configured level;
/// `--verbose` forces DEBUG.
fn setup_tracing(args: &Args, level: LogLevel) {
    let directive = if args.verbose {
        LogLevel::Debug.as_directive()
    } else {
        level.as_directive()
    };
    let filter = if args.verbose {
        EnvFilter::new(directive)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive))
    };

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
