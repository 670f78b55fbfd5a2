//! The playback task: sole owner of the output device.
//!
//! Everything that wants to make sound — network audio and the local
//! loopback route — goes through the bounded playback queue as a
//! [`PlaybackFrame`]; this thread dequeues, converts, and writes.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::config::Config;

use super::device;
use super::transform;

/// One unit of audio headed for the speaker.
#[derive(Debug)]
pub enum PlaybackFrame {
    /// float32 normalized mono PCM, straight off the wire (owned heap block)
    Remote(Bytes),
    /// Already-interleaved PCM from the local loopback route
    Local(Vec<i16>),
}

pub fn playback_thread(
    config: &Config,
    mut rx: mpsc::Receiver<PlaybackFrame>,
    running: &AtomicBool,
) -> Result<()> {
    // 1. Open ALSA playback device with configurable sample rate, channels, and period size
    let period_size_opt = if config.playback_period_size > 0 {
        Some(config.playback_period_size)
    } else {
        None
    };
    let (pcm, params) = device::open_playback(
        config.playback_device,
        config.sample_rate,
        config.playback_channels,
        period_size_opt,
    )?;

    let channels = params.channels as usize;
    let io = pcm.io_i16()?;

    let soft_limit = if config.soft_limit {
        Some(config.soft_limit_threshold)
    } else {
        None
    };

    log::info!(
        "Playback started: rate={}, ch={}, period={}, output_gain={}",
        params.sample_rate,
        channels,
        params.period_size,
        config.output_gain,
    );

    while running.load(Ordering::Relaxed) {
        // Block until a frame arrives (or every sender is gone)
        let Some(frame) = rx.blocking_recv() else {
            // Channel closed, exit playback
            log::info!("Playback channel closed");
            break;
        };

        let mut pcm_data = match frame {
            PlaybackFrame::Remote(payload) => {
                if payload.len() % 4 != 0 {
                    log::warn!("Ragged audio payload of {} bytes, trailing bytes ignored", payload.len());
                }
                // 将 float32 转换为 int16（限幅在前，防止畸形数据溢出）
                let mono = transform::decode_f32le(&payload);
                if mono.is_empty() {
                    continue;
                }
                if channels == 2 {
                    transform::mono_to_stereo(&mono)
                } else {
                    mono
                }
            }
            PlaybackFrame::Local(interleaved) => interleaved,
        };

        transform::apply_output_stage(&mut pcm_data, config.output_gain, soft_limit);

        // A write failure is logged and the frame dropped; the next queue
        // item proceeds.
        device::write_frame(&pcm, &io, &pcm_data, channels);
    }

    log::info!("Playback stopped");
    Ok(())
}
