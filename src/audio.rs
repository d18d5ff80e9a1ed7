//! Audio playback for session completion tones.

use rodio::source::{SineWave, Source};
use rodio::{OutputStream, OutputStreamHandle, Sink};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Pitch of the completion beep.
const TONE_HZ: f32 = 800.0;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Failed to initialize audio output: {0}")]
    Stream(#[from] rodio::StreamError),
    #[error("Failed to play audio: {0}")]
    Play(#[from] rodio::PlayError),
}

/// Owns the output stream; must stay on the thread that created it.
pub struct AudioPlayer {
    _stream: OutputStream,
    handle: OutputStreamHandle,
}

impl AudioPlayer {
    /// Opens the default output device.
    pub fn new() -> Result<Self, AudioError> {
        let (stream, handle) = OutputStream::try_default()?;
        Ok(Self {
            _stream: stream,
            handle,
        })
    }

    /// Plays the completion tone in the background. Failures are logged only.
    pub fn play_tone(&self) {
        if let Err(e) = self.play_decaying_beep() {
            warn!(error = %e, "failed to play completion tone");
        }
    }

    /// Half a second of sine wave, stepping down in volume.
    fn play_decaying_beep(&self) -> Result<(), AudioError> {
        let sink = Sink::try_new(&self.handle)?;

        for amplitude in [0.3, 0.15, 0.06, 0.02] {
            sink.append(
                SineWave::new(TONE_HZ)
                    .take_duration(Duration::from_millis(125))
                    .amplify(amplitude),
            );
        }
        sink.detach();

        Ok(())
    }
}
