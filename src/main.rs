pub mod config;
pub mod devices;
pub mod events;
pub mod motion;
pub mod remap;
pub mod remapper;

use crate::config::Settings;
use crate::devices::EvdevSink;
use crate::motion::{Bmi160Sampler, MotionPipeline, StillnessFilter};
use crate::remapper::Remapper;
use color_eyre::{eyre::eyre, Result};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    setup()?;

    let settings = Settings::load();
    settings
        .validate()
        .map_err(|e| eyre!("Invalid settings: {}", e))?;

    // Physical devices are grabbed exclusively; their events reach the
    // desktop only through the virtual devices we synthesize.
    let mut gamepad = devices::find_device(&settings.devices.gamepad_name)
        .map_err(|e| eyre!("Gamepad unavailable: {}", e))?;
    let mut fn_keys = devices::find_device(&settings.devices.fn_name)
        .map_err(|e| eyre!("Fn-key device unavailable: {}", e))?;
    devices::grab(&mut gamepad, "gamepad").map_err(|e| eyre!("{}", e))?;
    devices::grab(&mut fn_keys, "fn-key device").map_err(|e| eyre!("{}", e))?;

    let virtual_pad = devices::build_virtual_pad(&settings.devices.virtual_pad_name, &gamepad)
        .map_err(|e| eyre!("Failed to create virtual gamepad: {}", e))?;
    let virtual_mouse = devices::build_virtual_mouse(&settings.devices.virtual_mouse_name)
        .map_err(|e| eyre!("Failed to create virtual mouse: {}", e))?;

    let sampler = Bmi160Sampler::open(&settings.devices.i2c_path, settings.devices.i2c_alt_addr)
        .map_err(|e| eyre!("Failed to open IMU: {}", e))?;
    let pipeline = MotionPipeline::new(
        Box::new(sampler),
        Box::new(StillnessFilter::new()),
        settings.motion.curve.clone(),
        Duration::from_millis(settings.motion.settle_ms),
    );

    let (pad_tx, pad_rx) = mpsc::channel(256);
    let (fn_tx, fn_rx) = mpsc::channel(64);
    let _pad_reader = devices::spawn_pad_reader(gamepad, pad_tx)
        .map_err(|e| eyre!("Failed to start gamepad reader: {}", e))?;
    let _fn_reader = devices::spawn_fn_reader(fn_keys, fn_tx)
        .map_err(|e| eyre!("Failed to start fn-key reader: {}", e))?;

    let mut engine = Remapper::create(
        &settings,
        pipeline,
        pad_rx,
        fn_rx,
        Box::new(EvdevSink::new("virtual gamepad", virtual_pad)),
        Box::new(EvdevSink::new("virtual mouse", virtual_mouse)),
    )
    .initialize();

    info!("gyromap running");
    engine.run().await.map_err(|e| eyre!("Remap loop ended: {}", e))
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
