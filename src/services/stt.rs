//! Remote STT client — HTTP POST of a WAV container, form field `audio`
//! (spec.md §6). Blocking `reqwest`, consistent with this core's
//! thread-per-component model rather than the teacher's async client.

use crate::error::ExternalServiceFailure;
use reqwest::blocking::{multipart, Client};
use serde::Deserialize;
use std::time::Duration;

#[derive(Deserialize)]
struct SttResponse {
    text: String,
    #[allow(dead_code)]
    lang: Option<String>,
}

#[derive(Deserialize)]
struct HealthResponse {
    ok: bool,
}

#[derive(Clone)]
pub struct SttClient {
    client: Client,
    base_url: String,
}

impl SttClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::builder().timeout(timeout).build().unwrap_or_default(),
            base_url: base_url.into(),
        }
    }

    /// Uploads `pcm16` (mono, 16 kHz little-endian samples) as a WAV
    /// container and returns the transcribed text.
    pub fn transcribe(&self, pcm16: &[u8], lang: Option<&str>) -> Result<String, ExternalServiceFailure> {
        let wav = encode_wav(pcm16, 16_000).map_err(|e| ExternalServiceFailure::Stt(e.to_string()))?;

        let mut form = multipart::Form::new().part(
            "audio",
            multipart::Part::bytes(wav).file_name("utterance.wav").mime_str("audio/wav").unwrap(),
        );
        if let Some(lang) = lang {
            form = form.text("lang", lang.to_string());
        }

        let resp = self
            .client
            .post(format!("{}/transcribe", self.base_url))
            .multipart(form)
            .send()
            .map_err(|e| ExternalServiceFailure::Stt(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ExternalServiceFailure::Stt(format!("status {}", resp.status())));
        }
        let parsed: SttResponse = resp.json().map_err(|e| ExternalServiceFailure::Stt(e.to_string()))?;
        Ok(parsed.text)
    }

    pub fn healthy(&self) -> bool {
        self.client
            .get(format!("{}/healthz", self.base_url))
            .send()
            .ok()
            .and_then(|r| r.json::<HealthResponse>().ok())
            .map(|h| h.ok)
            .unwrap_or(false)
    }
}

fn encode_wav(pcm16: &[u8], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for chunk in pcm16.chunks_exact(2) {
            let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_wav_preserves_sample_count() {
        let pcm: Vec<u8> = (0..100i16).flat_map(|s| s.to_le_bytes()).collect();
        let wav = encode_wav(&pcm, 16_000).unwrap();
        assert!(wav.len() > pcm.len(), "wav container adds header bytes");
    }
}
