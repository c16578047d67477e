use coglet_core::config::Config;
use coglet_core::eyelid::{EyelidConfig, EyelidController};
use coglet_core::led::NullLedSink;
use coglet_core::pwm::{PwmBus, SerialPwmTransport};
use coglet_core::servo::{calibration, layout};
use coglet_core::services::tts::SubprocessTtsBackend;
use coglet_core::services::{LlmClient, SttClient};
use coglet_core::vision::{FaceTracker, SerialVisionTransport, VisionClient};
use coglet_core::wake::{EnergyWakeScorer, WakeWordDetector};
use coglet_core::{dialogue, shutdown};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "configuration invalid, aborting");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config) {
        error!(error = %e, "fatal error");
        std::process::exit(1);
    }
}

fn run(config: Config) -> anyhow::Result<()> {
    let overlay = match &config.calibration_path {
        Some(path) => calibration::CalibrationOverlay::load(std::path::Path::new(path))?,
        None => calibration::CalibrationOverlay::default(),
    };

    let pwm_transport = SerialPwmTransport::open(&config.pwm_serial_path, config.pwm_baud)?;
    let bus = PwmBus::new(Box::new(pwm_transport));
    bus.set_freq(50)?;

    let mut registry = layout::build_registry(bus, &overlay)?;

    let eyl = registry.take("EYL").expect("EYL reserved by layout");
    let eyr = registry.take("EYR").expect("EYR reserved by layout");
    let lid = registry.take("LID").expect("LID reserved by layout");
    let npt = registry.take("NPT").expect("NPT reserved by layout");
    let nrl = registry.take("NRL").expect("NRL reserved by layout");
    let mou = registry.take("MOU").expect("MOU reserved by layout");
    let eal = registry.take("EAL").expect("EAL reserved by layout");
    let ear = registry.take("EAR").expect("EAR reserved by layout");
    let lwh = registry.take("LWH").expect("LWH reserved by layout");
    let rwh = registry.take("RWH").expect("RWH reserved by layout");

    let vision_transport = SerialVisionTransport::open(&config.vision_serial_path, config.vision_baud)?;
    let vision = VisionClient::new(Box::new(vision_transport));
    let tracker = FaceTracker::start(eyl, eyr, npt, None, lwh, rwh, vision, config.tracker.clone());
    let tracker_handle = tracker.handle();

    let eyelid = Arc::new(EyelidController::start(lid, EyelidConfig::default()));

    let wake_detector = WakeWordDetector::new(
        config.wake.clone(),
        config.audio.sample_rate,
        Box::new(EnergyWakeScorer::default()),
    );
    let capture = dialogue::capture::CaptureThread::start(&config, wake_detector)?;

    let stt = SttClient::new(&config.stt_base_url, Duration::from_secs(10));
    let llm = LlmClient::new(&config.llm_base_url, &config.llm_model, Duration::from_secs(15));
    let tts: Box<dyn coglet_core::services::TtsBackend> =
        Box::new(SubprocessTtsBackend::new(config.tts_subprocess.clone(), Vec::new()));
    let led = Box::new(NullLedSink);

    let mut dialogue_controller = dialogue::DialogueController::start(
        config.clone(),
        capture,
        stt,
        llm,
        tts,
        led,
        eyelid.clone(),
        tracker_handle,
        nrl,
        mou,
        eal,
        ear,
    );

    info!("coglet-core running, waiting for SIGINT/SIGTERM");
    shutdown::wait_for_signal()?;
    info!("shutting down");

    // Every named servo was taken out of `registry` above and handed to its
    // permanent owner; each owner drives its own servos to a neutral/closed
    // pose and releases their PWM channels as part of its own stop sequence
    // (face tracker, eyelid controller, dialogue controller).
    shutdown::stop_with_timeout("dialogue", move || dialogue_controller.stop());
    shutdown::stop_with_timeout("face-tracker", move || tracker.stop());

    match Arc::try_unwrap(eyelid) {
        Ok(controller) => shutdown::stop_with_timeout("eyelid", move || controller.stop()),
        Err(_) => error!("eyelid controller still shared, skipping clean stop"),
    }

    info!("shutdown complete");
    Ok(())
}
