//! ALSA PCM device adapters for audio capture and playback.
//!
//! The capture side of the raw pipeline runs with 32-bit slots (24-bit
//! microphone data in a 32-bit container, as the I2S front end delivers it);
//! the enhanced pipeline and the playback side run plain 16-bit PCM. The
//! period negotiated with the driver is the fixed frame size the rest of the
//! pipeline treats as an opaque constant.

use alsa::pcm::{Access, Format, HwParams, PCM};
use alsa::{Direction, ValueOr};
use anyhow::{Context, Result};

/// Parameters negotiated with the ALSA hardware.
#[derive(Debug, Clone)]
pub struct AlsaParams {
    /// Actual sample rate after negotiation
    pub sample_rate: u32,
    /// Actual number of channels
    pub channels: u32,
    /// Period size in frames (one frame = one sample per channel)
    pub period_size: usize,
}

/// Open a PCM device for capture (recording).
pub fn open_capture(
    device: &str,
    sample_rate: u32,
    channels: u32,
    format: Format,
    period_size: Option<usize>,
) -> Result<(PCM, AlsaParams)> {
    open_pcm(
        device,
        Direction::Capture,
        sample_rate,
        channels,
        format,
        period_size,
        "Capture",
    )
}

/// Open a PCM device for playback. Playback is always 16-bit PCM.
pub fn open_playback(
    device: &str,
    sample_rate: u32,
    channels: u32,
    period_size: Option<usize>,
) -> Result<(PCM, AlsaParams)> {
    open_pcm(
        device,
        Direction::Playback,
        sample_rate,
        channels,
        Format::S16LE,
        period_size,
        "Playback",
    )
}

fn open_pcm(
    device: &str,
    direction: Direction,
    sample_rate: u32,
    channels: u32,
    format: Format,
    period_size: Option<usize>,
    dir_name: &str,
) -> Result<(PCM, AlsaParams)> {
    let pcm = PCM::new(device, direction, false)
        .with_context(|| format!("Failed to open PCM device '{}' for {}", device, dir_name))?;

    // Configure hardware parameters
    {
        let hwp = HwParams::any(&pcm).with_context(|| "Failed to initialize HwParams")?;
        hwp.set_access(Access::RWInterleaved)?;
        hwp.set_format(format)?;
        hwp.set_channels(channels)?;
        hwp.set_rate_near(sample_rate, ValueOr::Nearest)?;
        if let Some(ps) = period_size {
            hwp.set_period_size_near(ps as alsa::pcm::Frames, ValueOr::Nearest)?;
        }
        pcm.hw_params(&hwp)?;
    }

    // Read back actual negotiated parameters
    let (actual_rate, actual_channels, period_size) = {
        let hwp = pcm.hw_params_current()?;
        let rate = hwp.get_rate()?;
        let ch = hwp.get_channels()?;
        let ps = hwp.get_period_size()? as usize;
        (rate, ch, ps)
    };

    let params = AlsaParams {
        sample_rate: actual_rate,
        channels: actual_channels,
        period_size,
    };

    log::info!(
        "ALSA {}: device={}, format={:?}, rate={}, channels={}, period_size={}",
        dir_name,
        device,
        format,
        actual_rate,
        actual_channels,
        period_size,
    );

    Ok((pcm, params))
}

/// One blocking capture read into the caller's buffer.
///
/// Returns the number of frames read. On an XRUN or other stream error the
/// stream is re-prepared and `Ok(0)` is returned — the caller logs, skips
/// this cycle, and the next loop iteration is the retry.
pub fn read_frame_i32(pcm: &PCM, io: &alsa::pcm::IO<i32>, buf: &mut [i32]) -> Result<usize> {
    match io.readi(buf) {
        Ok(frames) => Ok(frames),
        Err(e) => {
            log::warn!("ALSA capture error: {}, recovering...", e);
            pcm.prepare().context("Failed to recover PCM capture")?;
            Ok(0)
        }
    }
}

/// Same contract as [`read_frame_i32`] for the 16-bit capture path.
pub fn read_frame_i16(pcm: &PCM, io: &alsa::pcm::IO<i16>, buf: &mut [i16]) -> Result<usize> {
    match io.readi(buf) {
        Ok(frames) => Ok(frames),
        Err(e) => {
            log::warn!("ALSA capture error: {}, recovering...", e);
            pcm.prepare().context("Failed to recover PCM capture")?;
            Ok(0)
        }
    }
}

/// One blocking playback write.
///
/// A short or zero write is a warning, not an error: the device accepted the
/// call but transferred less than a full buffer. A stream error re-prepares
/// the device and drops the remainder of this frame — stale audio is not
/// worth retrying.
pub fn write_frame(pcm: &PCM, io: &alsa::pcm::IO<i16>, pcm_data: &[i16], channels: usize) {
    let total_frames = pcm_data.len() / channels;

    match io.writei(pcm_data) {
        Ok(0) => {
            log::warn!("Playback wrote 0 of {} frames", total_frames);
        }
        Ok(n) if n < total_frames => {
            log::warn!("Short playback write: {} of {} frames", n, total_frames);
        }
        Ok(_) => {}
        Err(e) => {
            log::warn!("ALSA playback error: {}, recovering...", e);
            if let Err(e2) = pcm.prepare() {
                log::error!("Failed to recover PCM playback: {}", e2);
            }
        }
    }
}
