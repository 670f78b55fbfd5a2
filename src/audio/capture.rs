//! The raw audio loop: blocking capture reads, in-place processing, and the
//! playback/relay routing split.
//!
//! One iteration = read a period → compress/amplify in place → narrow to
//! 16-bit → route (local loopback and/or relay queue) → cooperative sleep.
//! Nothing in this loop ever blocks on the network; a full relay queue drops
//! the frame.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use alsa::pcm::Format;
use anyhow::Result;
use tokio::sync::mpsc;

use crate::config::Config;

use super::device;
use super::playback::PlaybackFrame;
use super::relay::{RelayFrame, RelaySender};
use super::transform::{self, ProcessorConfig};

pub fn capture_thread(
    config: &Config,
    relay_tx: RelaySender,
    playback_tx: mpsc::Sender<PlaybackFrame>,
    running: &AtomicBool,
) -> Result<()> {
    // 1. Open the ALSA capture device, 32-bit slots (24-bit mic data in a
    //    32-bit container — the container passes through processing as-is).
    //    The period is requested small enough that a whole frame fits one
    //    relay item.
    let (pcm, params) = device::open_capture(
        config.capture_device,
        config.sample_rate,
        config.capture_channels,
        Format::S32LE,
        Some(config.capture_period_size),
    )?;

    let channels = params.channels as usize;
    let period_size = params.period_size;

    let processor = ProcessorConfig {
        gain: config.gain,
        compression_threshold: config.compression_threshold,
        compression_ratio: config.compression_ratio,
        enable_agc: config.enable_agc,
    };

    // Capture buffer, reused in place every cycle
    let mut read_buf = vec![0i32; period_size * channels];

    let io = pcm.io_i32()?;
    let cycle_sleep = Duration::from_millis(config.cycle_sleep_ms);

    log::info!(
        "Capture loop started: rate={}, ch={}, period={}, gain={}, agc={}",
        params.sample_rate,
        channels,
        period_size,
        processor.gain,
        processor.enable_agc,
    );

    while running.load(Ordering::Relaxed) {
        let frames = device::read_frame_i32(&pcm, &io, &mut read_buf)?;
        if frames == 0 {
            // Read failed and was recovered; the next iteration is the retry
            std::thread::sleep(cycle_sleep);
            continue;
        }

        let samples = &mut read_buf[..frames * channels];
        transform::process(samples, &processor);

        let pcm16 = transform::narrow_to_i16(samples);

        // 本地回环：送扬声器
        if config.loopback {
            let interleaved = if channels == 1 {
                transform::mono_to_stereo(&pcm16)
            } else {
                pcm16.clone()
            };
            if playback_tx.try_send(PlaybackFrame::Local(interleaved)).is_err() {
                log::warn!("Playback queue full, dropping loopback frame");
            }
        }

        // 非阻塞入队（队列满则丢弃，不阻塞音频任务）
        match RelayFrame::from_pcm(&pcm16, config.relay_max_frame_bytes) {
            Some(frame) => {
                if !relay_tx.try_enqueue(frame) {
                    log::warn!("WS send queue full, drop data");
                }
            }
            None => {
                log::warn!(
                    "Captured frame of {} bytes exceeds relay cap of {}, dropping",
                    pcm16.len() * 2,
                    config.relay_max_frame_bytes,
                );
            }
        }

        std::thread::sleep(cycle_sleep);
    }

    log::info!("Capture loop stopped");
    Ok(())
}
