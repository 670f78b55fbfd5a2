//! The AudioPipeline manages the capture and playback threads.
//!
//! Uses std::thread (NOT tokio tasks) for real-time audio I/O to avoid
//! contention with async network tasks. Depending on configuration the
//! capture side is either the raw loop or the enhancement-stage pair
//! (feeder + fetcher), each pinned to its own named thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::Result;
use tokio::sync::mpsc;

use crate::config::Config;

use super::capture;
use super::enhance::Enhancer;
use super::enhanced;
use super::playback::{self, PlaybackFrame};
use super::relay::RelaySender;
use super::speex::SpeexEnhancer;

/// The audio pipeline: playback thread plus either the raw capture thread
/// or the feeder/fetcher pair around the enhancement stage.
pub struct AudioPipeline {
    running: Arc<AtomicBool>,
    capture_handle: Option<JoinHandle<()>>,
    play_handle: Option<JoinHandle<()>>,
    fetch_handle: Option<JoinHandle<()>>,
    heartbeat: Arc<AtomicU64>,
    enhanced: bool,
}

impl AudioPipeline {
    /// Start the pipeline.
    ///
    /// * `relay_tx`    - Producer half of the relay queue toward the sender task
    /// * `playback_tx` - Extra producer for the loopback route
    /// * `playback_rx` - Consumer half of the playback queue
    pub fn start(
        config: Config,
        relay_tx: RelaySender,
        playback_tx: mpsc::Sender<PlaybackFrame>,
        playback_rx: mpsc::Receiver<PlaybackFrame>,
    ) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let heartbeat = Arc::new(AtomicU64::new(0));

        log::info!(
            "AudioPipeline starting — capture: \"{}\", playback: \"{}\", rate: {}Hz, enhanced: {}, loopback: {}",
            config.capture_device,
            config.playback_device,
            config.sample_rate,
            config.enhance_enabled,
            config.loopback,
        );

        let play_handle = {
            let running = running.clone();
            let config = config.clone();
            thread::Builder::new()
                .name("audio-play".into())
                .spawn(move || {
                    if let Err(e) = playback::playback_thread(&config, playback_rx, &running) {
                        log::error!("Playback thread error: {}", e);
                    }
                })?
        };

        // 配置增强管线；初始化失败则降级为原始采集管线
        let enhancer: Option<Arc<dyn Enhancer>> = if config.enhance_enabled {
            match SpeexEnhancer::new(&config) {
                Ok(enhancer) => Some(Arc::new(enhancer)),
                Err(e) => {
                    log::error!("Enhancement stage init failed: {}, falling back to raw capture", e);
                    None
                }
            }
        } else {
            None
        };

        let enhanced = enhancer.is_some();
        let (capture_handle, fetch_handle) = match enhancer {
            Some(enhancer) => {
                let fetch_handle = {
                    let running = running.clone();
                    let config = config.clone();
                    let enhancer = enhancer.clone();
                    let relay_tx = relay_tx.clone();
                    let playback_tx = playback_tx.clone();
                    thread::Builder::new()
                        .name("afe-fetch".into())
                        .spawn(move || {
                            enhanced::fetcher_thread(&config, enhancer, relay_tx, playback_tx, &running);
                        })?
                };

                let feed_handle = {
                    let running = running.clone();
                    let config = config.clone();
                    let heartbeat = heartbeat.clone();
                    thread::Builder::new()
                        .name("afe-feed".into())
                        .spawn(move || {
                            if let Err(e) =
                                enhanced::feeder_thread(&config, enhancer, heartbeat, &running)
                            {
                                log::error!("Feeder thread error: {}", e);
                            }
                        })?
                };

                (feed_handle, Some(fetch_handle))
            }
            None => {
                let capture_handle = {
                    let running = running.clone();
                    let config = config.clone();
                    thread::Builder::new()
                        .name("audio-capture".into())
                        .spawn(move || {
                            if let Err(e) =
                                capture::capture_thread(&config, relay_tx, playback_tx, &running)
                            {
                                log::error!("Capture thread error: {}", e);
                            }
                        })?
                };
                (capture_handle, None)
            }
        };

        Ok(Self {
            running,
            capture_handle: Some(capture_handle),
            play_handle: Some(play_handle),
            fetch_handle,
            heartbeat,
            enhanced,
        })
    }

    /// Feeder heartbeat for the watchdog; monotonically increasing while
    /// the enhanced capture side makes progress.
    pub fn heartbeat(&self) -> Arc<AtomicU64> {
        self.heartbeat.clone()
    }

    /// Whether the enhanced pipeline actually came up.
    pub fn is_enhanced(&self) -> bool {
        self.enhanced
    }

    /// Signal threads to stop and wait for the capture side to finish.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(h) = self.capture_handle.take() {
            let _ = h.join();
        }
        // The fetcher and playback threads block on their queues and exit
        // when the last senders drop. We detach them here to avoid blocking.
        self.fetch_handle.take();
        self.play_handle.take();
    }
}

impl Drop for AudioPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}
