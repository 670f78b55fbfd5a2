//! The enhanced capture pipeline: two cooperating threads around the
//! enhancement stage.
//!
//! The feeder blocking-reads fixed chunks sized to the stage's own input
//! chunk (not the raw pipeline's period) and must keep feeding no matter
//! what the fetch side costs; the fetcher pulls processed chunks, applies
//! the VAD send filter, and routes exactly like the raw loop's
//! playback/relay split.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use alsa::pcm::Format;
use anyhow::Result;
use tokio::sync::mpsc;

use crate::config::Config;

use super::device;
use super::enhance::{Enhancer, FetchError};
use super::playback::PlaybackFrame;
use super::relay::{RelayFrame, RelaySender};
use super::transform;

/// Capture thread of the enhanced pipeline: reads whole stage chunks from
/// the device and feeds them in. Bumps `heartbeat` once per chunk so the
/// watchdog can tell a starved feeder from a healthy one.
pub fn feeder_thread(
    config: &Config,
    enhancer: Arc<dyn Enhancer>,
    heartbeat: Arc<AtomicU64>,
    running: &AtomicBool,
) -> Result<()> {
    let chunk_size = enhancer.feed_chunk_size();
    let channels = enhancer.channel_count();

    // Ask ALSA for periods aligned to the stage's own chunk size
    let (pcm, params) = device::open_capture(
        config.capture_device,
        config.sample_rate,
        channels as u32,
        Format::S16LE,
        Some(chunk_size),
    )?;
    let io = pcm.io_i16()?;

    log::info!(
        "Feeder started: chunk={} samples, channels={}, rate={}",
        chunk_size,
        channels,
        params.sample_rate,
    );

    let mut chunk = vec![0i16; chunk_size * channels];
    let mut feed_count: u64 = 0;

    while running.load(Ordering::Relaxed) {
        // The device may return partial periods; the stage wants exact chunks
        let mut filled = 0usize;
        while filled < chunk_size && running.load(Ordering::Relaxed) {
            let frames = device::read_frame_i16(&pcm, &io, &mut chunk[filled * channels..])?;
            filled += frames;
        }
        if filled < chunk_size {
            break; // shutting down mid-chunk
        }

        enhancer.feed(&chunk);
        heartbeat.fetch_add(1, Ordering::Relaxed);

        feed_count += 1;
        if feed_count % 100 == 0 {
            log::debug!(
                "Feeder: {} chunks, head samples {:?}",
                feed_count,
                &chunk[..chunk.len().min(4)],
            );
        }
    }

    log::info!("Feeder stopped after {} chunks", feed_count);
    Ok(())
}

/// Fetch thread of the enhanced pipeline: pulls processed chunks and routes
/// them. A `Terminated` fetch is fatal to this thread only — the process
/// keeps running without enhancement.
pub fn fetcher_thread(
    config: &Config,
    enhancer: Arc<dyn Enhancer>,
    relay_tx: RelaySender,
    playback_tx: mpsc::Sender<PlaybackFrame>,
    running: &AtomicBool,
) {
    log::info!(
        "Fetcher started: vad_filter={}",
        config.enhance_vad_filter,
    );

    let mut fetch_count: u64 = 0;
    let mut voice_count: u64 = 0;
    let mut silence_count: u64 = 0;
    let mut enqueued: u64 = 0;
    let mut dropped: u64 = 0;
    let mut last_volume_db = 0.0f32;

    while running.load(Ordering::Relaxed) {
        let result = match enhancer.fetch() {
            Ok(result) => result,
            Err(FetchError::Terminated) => {
                log::error!("Enhancement stage fetch failed, disabling enhanced pipeline");
                break;
            }
        };

        if result.pcm.is_empty() {
            continue;
        }

        fetch_count += 1;
        last_volume_db = result.volume_db;
        if result.voice_active {
            voice_count += 1;
        } else {
            silence_count += 1;
        }

        // 只发送人声数据（VAD过滤）
        let send_this = !config.enhance_vad_filter || result.voice_active;
        if send_this {
            match RelayFrame::from_pcm(&result.pcm, config.relay_max_frame_bytes) {
                Some(frame) => {
                    if relay_tx.try_enqueue(frame) {
                        enqueued += 1;
                    } else {
                        dropped += 1;
                    }
                }
                None => {
                    dropped += 1;
                    log::warn!(
                        "Enhanced chunk of {} bytes exceeds relay cap of {}, dropping",
                        result.pcm.len() * 2,
                        config.relay_max_frame_bytes,
                    );
                }
            }
        }

        // 本地回环：送扬声器
        if config.loopback {
            let interleaved = transform::mono_to_stereo(&result.pcm);
            if playback_tx.try_send(PlaybackFrame::Local(interleaved)).is_err() {
                log::warn!("Playback queue full, dropping loopback frame");
            }
        }

        if fetch_count % 500 == 0 {
            log::info!(
                "Fetcher: {} chunks, voice {}/silence {}, vol {:.1} dBFS, queued {}, dropped {}",
                fetch_count,
                voice_count,
                silence_count,
                last_volume_db,
                enqueued,
                dropped,
            );
        }
    }

    log::info!(
        "Fetcher stopped: {} chunks, voice {}, silence {}, queued {}, dropped {}",
        fetch_count,
        voice_count,
        silence_count,
        enqueued,
        dropped,
    );
}
