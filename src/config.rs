//! Single immutable configuration struct assembled from environment
//! variables plus the calibration overlay, at startup. No global
//! mutation after boot (spec.md §9).

use crate::error::ConfigError;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub frame_ms: u32,
    pub vad_aggressiveness: u8,
    pub device: Option<String>,
    pub gain_db: f32,
    pub agc_enabled: bool,
    pub agc_target_dbfs: f32,
    pub agc_max_gain_db: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            frame_ms: 30,
            vad_aggressiveness: 2,
            device: None,
            gain_db: 0.0,
            agc_enabled: false,
            agc_target_dbfs: -26.0,
            agc_max_gain_db: 24.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub start_win: usize,
    pub start_min: usize,
    pub start_consec_min: usize,
    pub end_hang_ms: u64,
    pub end_guard_ms: u64,
    pub preroll_ms: u64,
    pub no_speech_timeout_s: f32,
    pub max_utter_s: f32,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            start_win: 5,
            start_min: 3,
            start_consec_min: 3,
            end_hang_ms: 250,
            end_guard_ms: 1200,
            preroll_ms: 240,
            no_speech_timeout_s: 3.0,
            max_utter_s: 8.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WakeConfig {
    pub threshold: f32,
    pub min_gap_s: f32,
    pub suppress_after_tts_s: f32,
    pub rearm_ratio: f32,
    pub rearm_low_count: u32,
    pub win_ms: u32,
    pub hop_ms: u32,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            min_gap_s: 1.5,
            suppress_after_tts_s: 0.8,
            rearm_ratio: 0.6,
            rearm_low_count: 3,
            win_ms: 80,
            hop_ms: 80,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DialogueConfig {
    pub followup_enable: bool,
    pub followup_arm_s: f32,
    pub followup_max_turns: u32,
    pub followup_cooldown_s: f32,
    pub barge_in: bool,
    pub cooldown_after_tts_s: f32,
    pub deep_sleep_timeout_s: f32,
    pub ctx_turns: usize,
    pub reset_on_wake: bool,
    pub use_chat: bool,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            followup_enable: true,
            followup_arm_s: 3.0,
            followup_max_turns: 0,
            followup_cooldown_s: 0.10,
            barge_in: true,
            cooldown_after_tts_s: 0.5,
            deep_sleep_timeout_s: 300.0,
            ctx_turns: 12,
            reset_on_wake: false,
            use_chat: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub update_interval_s: f32,
    pub invoke_interval_s: f32,
    pub invoke_timeout_s: f32,
    pub coordinates_are_center: bool,
    pub frame_width: f32,
    pub frame_height: f32,
    pub eye_deadzone_px: f32,
    pub eye_gain_deg_per_px: f32,
    pub eye_max_delta_deg: f32,
    pub pitch_deadzone_px: f32,
    pub pitch_gain_deg_per_px: f32,
    pub pitch_max_delta_deg: f32,
    pub yaw_enabled: bool,
    pub yaw_deadzone_px: f32,
    pub yaw_gain_deg_per_px: f32,
    pub yaw_max_delta_deg: f32,
    pub neutral_timeout_s: f32,
    pub wheel_deadzone_deg: f32,
    pub wheel_follow_delay_s: f32,
    pub wheel_input_min: f32,
    pub wheel_input_max: f32,
    pub wheel_power: f32,
    pub wheel_output_min: f32,
    pub wheel_output_max: f32,
    pub vision_timeout_streak_degrade: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            update_interval_s: 0.05,
            invoke_interval_s: 0.1,
            invoke_timeout_s: 0.5,
            coordinates_are_center: true,
            frame_width: 640.0,
            frame_height: 480.0,
            eye_deadzone_px: 15.0,
            eye_gain_deg_per_px: 0.04,
            eye_max_delta_deg: 20.0,
            pitch_deadzone_px: 15.0,
            // Open Question (spec.md §9): sign was flipped empirically by the
            // original author. Left positive; recalibrate against the
            // physical rig's pitch direction at deployment.
            pitch_gain_deg_per_px: 0.03,
            pitch_max_delta_deg: 15.0,
            // Yaw channel is unconfigured by default (spec.md Open Questions).
            yaw_enabled: false,
            yaw_deadzone_px: 15.0,
            yaw_gain_deg_per_px: 0.03,
            yaw_max_delta_deg: 15.0,
            neutral_timeout_s: 2.0,
            wheel_deadzone_deg: 6.0,
            wheel_follow_delay_s: 0.6,
            wheel_input_min: 6.0,
            wheel_input_max: 20.0,
            wheel_power: 1.6,
            wheel_output_min: 0.0,
            wheel_output_max: 35.0,
            vision_timeout_streak_degrade: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub audio: AudioConfig,
    pub endpoint: EndpointConfig,
    pub wake: WakeConfig,
    pub dialogue: DialogueConfig,
    pub tracker: TrackerConfig,
    pub stt_base_url: String,
    pub llm_base_url: String,
    pub llm_model: String,
    pub calibration_path: Option<String>,
    pub pwm_serial_path: String,
    pub pwm_baud: u32,
    pub vision_serial_path: String,
    pub vision_baud: u32,
    pub tts_subprocess: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            endpoint: EndpointConfig::default(),
            wake: WakeConfig::default(),
            dialogue: DialogueConfig::default(),
            tracker: TrackerConfig::default(),
            stt_base_url: "http://localhost:8090".to_string(),
            llm_base_url: "http://localhost:11434".to_string(),
            llm_model: "llama3".to_string(),
            calibration_path: None,
            pwm_serial_path: "/dev/ttyUSB0".to_string(),
            pwm_baud: 115_200,
            vision_serial_path: "/dev/ttyUSB1".to_string(),
            vision_baud: 115_200,
            tts_subprocess: "aplay-say".to_string(),
        }
    }
}

impl Config {
    /// Load defaults, then overlay values present in the process environment.
    /// Unknown/malformed values abort startup with `ConfigError` (spec.md §7).
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("COGLET_SAMPLE_RATE") {
            cfg.audio.sample_rate = parse_env("COGLET_SAMPLE_RATE", &v)?;
        }
        if let Ok(v) = std::env::var("COGLET_FRAME_MS") {
            cfg.audio.frame_ms = parse_env("COGLET_FRAME_MS", &v)?;
        }
        if let Ok(v) = std::env::var("COGLET_VAD_AGGRESSIVENESS") {
            let n: u8 = parse_env("COGLET_VAD_AGGRESSIVENESS", &v)?;
            if n > 3 {
                return Err(ConfigError::InvalidValue {
                    key: "COGLET_VAD_AGGRESSIVENESS".into(),
                    reason: "must be 0..=3".into(),
                });
            }
            cfg.audio.vad_aggressiveness = n;
        }
        if let Ok(v) = std::env::var("COGLET_AUDIO_DEVICE") {
            cfg.audio.device = Some(v);
        }
        if let Ok(v) = std::env::var("COGLET_NO_SPEECH_TIMEOUT_S") {
            cfg.endpoint.no_speech_timeout_s = parse_env("COGLET_NO_SPEECH_TIMEOUT_S", &v)?;
        }
        if let Ok(v) = std::env::var("COGLET_MAX_UTTER_S") {
            cfg.endpoint.max_utter_s = parse_env("COGLET_MAX_UTTER_S", &v)?;
        }
        if let Ok(v) = std::env::var("COGLET_WAKE_THRESHOLD") {
            cfg.wake.threshold = parse_env("COGLET_WAKE_THRESHOLD", &v)?;
        }
        if let Ok(v) = std::env::var("COGLET_STT_BASE_URL") {
            cfg.stt_base_url = v;
        }
        if let Ok(v) = std::env::var("COGLET_LLM_BASE_URL") {
            cfg.llm_base_url = v;
        }
        if let Ok(v) = std::env::var("COGLET_LLM_MODEL") {
            cfg.llm_model = v;
        }
        if let Ok(v) = std::env::var("COGLET_CALIBRATION_PATH") {
            cfg.calibration_path = Some(v);
        }
        if let Ok(v) = std::env::var("COGLET_PWM_SERIAL_PATH") {
            cfg.pwm_serial_path = v;
        }
        if let Ok(v) = std::env::var("COGLET_PWM_BAUD") {
            cfg.pwm_baud = parse_env("COGLET_PWM_BAUD", &v)?;
        }
        if let Ok(v) = std::env::var("COGLET_VISION_SERIAL_PATH") {
            cfg.vision_serial_path = v;
        }
        if let Ok(v) = std::env::var("COGLET_VISION_BAUD") {
            cfg.vision_baud = parse_env("COGLET_VISION_BAUD", &v)?;
        }
        if let Ok(v) = std::env::var("COGLET_TTS_SUBPROCESS") {
            cfg.tts_subprocess = v;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.audio.frame_ms == 0 {
            return Err(ConfigError::Invariant("frame_ms must be > 0".into()));
        }
        if !matches!(self.audio.sample_rate, 8000 | 16000 | 32000 | 48000) {
            return Err(ConfigError::InvalidValue {
                key: "sample_rate".into(),
                reason: "must be one of 8000/16000/32000/48000".into(),
            });
        }
        if self.endpoint.start_min > self.endpoint.start_win {
            return Err(ConfigError::Invariant(
                "start_min must be <= start_win".into(),
            ));
        }
        if self.wake.win_ms % 80 != 0 || self.wake.hop_ms % 80 != 0 {
            return Err(ConfigError::Invariant(
                "wake window/hop must be multiples of 80ms at 16kHz".into(),
            ));
        }
        Ok(())
    }

    pub fn frame_samples(&self) -> usize {
        (self.audio.sample_rate as usize * self.audio.frame_ms as usize) / 1000
    }

    pub fn frame_bytes(&self) -> usize {
        2 * self.frame_samples()
    }

    pub fn hang_frames(&self) -> usize {
        div_ceil_u64(self.endpoint.end_hang_ms, self.audio.frame_ms as u64) as usize
    }

    pub fn preroll_frames(&self) -> usize {
        (self.endpoint.preroll_ms / self.audio.frame_ms as u64) as usize
    }

    pub fn end_guard(&self) -> Duration {
        Duration::from_millis(self.endpoint.end_guard_ms)
    }
}

fn div_ceil_u64(a: u64, b: u64) -> u64 {
    (a + b - 1) / b
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.parse::<T>().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        reason: format!("could not parse '{raw}'"),
    })
}
