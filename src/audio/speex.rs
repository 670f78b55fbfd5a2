//! Safe wrappers around libspeexdsp, and the [`Enhancer`] implementation
//! built on them.
//!
//! The preprocessor carries denoise, AGC, and VAD; the echo canceller
//! consumes a far-end reference channel interleaved into the feed (mic on
//! channel 0, speaker reference on channel 1, the way the hardware front end
//! loops the speaker signal back into the capture stream).

use std::ffi::{c_int, c_void};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, TrySendError, sync_channel};
use std::sync::Mutex;

use crate::config::Config;

use super::enhance::{Enhancer, FetchError, FetchResult, rms_dbfs};
use super::transform;

// ======================== FFI declarations ========================

/// Opaque type for SpeexPreprocessState
#[repr(C)]
pub struct SpeexPreprocessState {
    _private: [u8; 0],
}

/// Opaque type for SpeexEchoState
#[repr(C)]
pub struct SpeexEchoState {
    _private: [u8; 0],
}

// Preprocessor request constants (speex_preprocess.h)
const SPEEX_PREPROCESS_SET_DENOISE: c_int = 0;
const SPEEX_PREPROCESS_SET_AGC: c_int = 2;
const SPEEX_PREPROCESS_SET_VAD: c_int = 4;
const SPEEX_PREPROCESS_SET_AGC_LEVEL: c_int = 6;
const SPEEX_PREPROCESS_SET_PROB_START: c_int = 14;
const SPEEX_PREPROCESS_SET_PROB_CONTINUE: c_int = 16;
const SPEEX_PREPROCESS_SET_NOISE_SUPPRESS: c_int = 18;
const SPEEX_PREPROCESS_SET_ECHO_STATE: c_int = 24;

// Echo canceller request constants (speex_echo.h)
const SPEEX_ECHO_SET_SAMPLING_RATE: c_int = 24;

unsafe extern "C" {
    fn speex_preprocess_state_init(frame_size: c_int, sampling_rate: c_int)
        -> *mut SpeexPreprocessState;
    fn speex_preprocess_state_destroy(st: *mut SpeexPreprocessState);
    fn speex_preprocess_run(st: *mut SpeexPreprocessState, x: *mut i16) -> c_int;
    fn speex_preprocess_ctl(
        st: *mut SpeexPreprocessState,
        request: c_int,
        ptr: *mut c_void,
    ) -> c_int;

    fn speex_echo_state_init(frame_size: c_int, filter_length: c_int) -> *mut SpeexEchoState;
    fn speex_echo_state_destroy(st: *mut SpeexEchoState);
    fn speex_echo_cancellation(
        st: *mut SpeexEchoState,
        rec: *const i16,
        play: *const i16,
        out: *mut i16,
    );
    fn speex_echo_ctl(st: *mut SpeexEchoState, request: c_int, ptr: *mut c_void) -> c_int;
}

// ======================== Preprocessor (denoise + AGC + VAD) ========================

/// Safe wrapper around SpeexPreprocessState.
pub struct Preprocessor {
    state: *mut SpeexPreprocessState,
}

// SpeexPreprocessState is used from a single thread only
unsafe impl Send for Preprocessor {}

impl Preprocessor {
    /// Create a new preprocessor for a given frame size (in samples) and sample rate.
    pub fn new(frame_size: usize, sample_rate: u32) -> anyhow::Result<Self> {
        let state = unsafe {
            speex_preprocess_state_init(frame_size as c_int, sample_rate as c_int)
        };
        if state.is_null() {
            anyhow::bail!("Failed to initialize speex preprocessor");
        }
        Ok(Self { state })
    }

    fn ctl_int(&mut self, request: c_int, value: i32) {
        let mut val: c_int = value;
        unsafe {
            speex_preprocess_ctl(self.state, request, &mut val as *mut c_int as *mut c_void);
        }
    }

    /// Enable or disable denoising.
    pub fn set_denoise(&mut self, enable: bool) {
        self.ctl_int(SPEEX_PREPROCESS_SET_DENOISE, enable as i32);
    }

    /// Set noise suppress level in dB (negative value, e.g. -25).
    pub fn set_noise_suppress(&mut self, level: i32) {
        self.ctl_int(SPEEX_PREPROCESS_SET_NOISE_SUPPRESS, level);
    }

    /// Enable or disable automatic gain control.
    pub fn set_agc(&mut self, enable: bool) {
        self.ctl_int(SPEEX_PREPROCESS_SET_AGC, enable as i32);
    }

    /// Set AGC level (target signal level).
    pub fn set_agc_level(&mut self, level: f32) {
        let mut val: f32 = level;
        unsafe {
            speex_preprocess_ctl(
                self.state,
                SPEEX_PREPROCESS_SET_AGC_LEVEL,
                &mut val as *mut f32 as *mut c_void,
            );
        }
    }

    /// Enable or disable voice activity detection.
    pub fn set_vad(&mut self, enable: bool) {
        self.ctl_int(SPEEX_PREPROCESS_SET_VAD, enable as i32);
    }

    /// Set the VAD speech probabilities (percent) for starting and
    /// continuing a speech run. Lower values detect speech more eagerly.
    pub fn set_vad_probabilities(&mut self, prob_start: i32, prob_continue: i32) {
        self.ctl_int(SPEEX_PREPROCESS_SET_PROB_START, prob_start);
        self.ctl_int(SPEEX_PREPROCESS_SET_PROB_CONTINUE, prob_continue);
    }

    /// Attach an echo canceller so the preprocessor also performs residual
    /// echo suppression. The echo state must outlive this preprocessor.
    pub fn attach_echo_state(&mut self, echo: &EchoCanceller) {
        unsafe {
            speex_preprocess_ctl(
                self.state,
                SPEEX_PREPROCESS_SET_ECHO_STATE,
                echo.state as *mut c_void,
            );
        }
    }

    /// Run the preprocessor on a frame of 16-bit PCM mono samples, in place.
    /// Returns the VAD verdict (meaningful only with VAD enabled).
    pub fn process(&mut self, samples: &mut [i16]) -> bool {
        let vad = unsafe { speex_preprocess_run(self.state, samples.as_mut_ptr()) };
        vad == 1
    }
}

impl Drop for Preprocessor {
    fn drop(&mut self) {
        unsafe {
            speex_preprocess_state_destroy(self.state);
        }
    }
}

// ======================== Echo canceller ========================

/// Safe wrapper around SpeexEchoState.
pub struct EchoCanceller {
    state: *mut SpeexEchoState,
}

unsafe impl Send for EchoCanceller {}

impl EchoCanceller {
    /// Create a new echo canceller.
    ///
    /// * `frame_size`    - Chunk size in samples
    /// * `filter_length` - Echo tail length in samples (longer = better
    ///   cancellation, more CPU)
    pub fn new(frame_size: usize, filter_length: usize, sample_rate: u32) -> anyhow::Result<Self> {
        let state = unsafe {
            speex_echo_state_init(frame_size as c_int, filter_length as c_int)
        };
        if state.is_null() {
            anyhow::bail!("Failed to initialize speex echo canceller");
        }

        let mut rate: c_int = sample_rate as c_int;
        unsafe {
            speex_echo_ctl(
                state,
                SPEEX_ECHO_SET_SAMPLING_RATE,
                &mut rate as *mut c_int as *mut c_void,
            );
        }

        Ok(Self { state })
    }

    /// Cancel the far-end `play` signal out of the near-end `rec` signal.
    /// All three slices are one chunk long.
    pub fn cancel(&mut self, rec: &[i16], play: &[i16], out: &mut [i16]) {
        unsafe {
            speex_echo_cancellation(self.state, rec.as_ptr(), play.as_ptr(), out.as_mut_ptr());
        }
    }
}

impl Drop for EchoCanceller {
    fn drop(&mut self) {
        unsafe {
            speex_echo_state_destroy(self.state);
        }
    }
}

// ======================== Enhancer implementation ========================

/// How many raw chunks the stage buffers between feed and fetch. A slow
/// fetcher overflows this and loses input rather than stalling the feeder.
const FEED_QUEUE_CHUNKS: usize = 4;

struct DspChain {
    // preprocessor holds a pointer into echo; field order keeps it dropped first
    preprocessor: Preprocessor,
    echo: Option<EchoCanceller>,
    aec_out: Vec<i16>,
}

/// The enhancement stage realized over libspeexdsp.
///
/// `feed` pushes raw interleaved chunks into an internal bounded queue;
/// `fetch` pops one, runs AEC against the reference channel, then the
/// preprocessor chain (NS/AGC/VAD), and reports the VAD verdict and chunk
/// level.
pub struct SpeexEnhancer {
    dsp: Mutex<DspChain>,
    feed_tx: SyncSender<Vec<i16>>,
    feed_rx: Mutex<Receiver<Vec<i16>>>,
    chunk_size: usize,
    channels: usize,
    linear_gain: f32,
    vad_enabled: bool,
    dropped: AtomicU64,
}

impl SpeexEnhancer {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let chunk_size = config.enhance_chunk_size;
        if chunk_size == 0 {
            anyhow::bail!("Enhancement chunk size must be non-zero");
        }

        let mut preprocessor = Preprocessor::new(chunk_size, config.sample_rate)?;

        // SE has no dedicated stage in libspeexdsp; it rides the denoise path
        preprocessor.set_denoise(config.enhance_ns || config.enhance_se);
        if config.enhance_ns {
            preprocessor.set_noise_suppress(config.enhance_noise_suppress_db);
        }

        if config.enhance_agc {
            preprocessor.set_agc(true);
            preprocessor.set_agc_level(config.enhance_agc_target_level);
        }

        if config.enhance_vad {
            preprocessor.set_vad(true);
            let (start, cont) = vad_probabilities(config.enhance_vad_mode);
            preprocessor.set_vad_probabilities(start, cont);
        }

        let echo = if config.enhance_aec {
            let filter_length = chunk_size * config.enhance_aec_filter_length as usize;
            let echo = EchoCanceller::new(chunk_size, filter_length, config.sample_rate)?;
            preprocessor.attach_echo_state(&echo);
            Some(echo)
        } else {
            None
        };

        // AEC 需要回采参考通道（mic + reference 交织）
        let channels = if echo.is_some() { 2 } else { 1 };

        let (feed_tx, feed_rx) = sync_channel(FEED_QUEUE_CHUNKS);

        Ok(Self {
            dsp: Mutex::new(DspChain {
                preprocessor,
                echo,
                aec_out: vec![0i16; chunk_size],
            }),
            feed_tx,
            feed_rx: Mutex::new(feed_rx),
            chunk_size,
            channels,
            linear_gain: config.enhance_linear_gain,
            vad_enabled: config.enhance_vad,
            dropped: AtomicU64::new(0),
        })
    }
}

impl Enhancer for SpeexEnhancer {
    fn feed(&self, chunk: &[i16]) {
        if chunk.len() != self.chunk_size * self.channels {
            log::warn!(
                "Feed chunk of {} samples does not match stage size {}, dropping",
                chunk.len(),
                self.chunk_size * self.channels,
            );
            return;
        }

        match self.feed_tx.try_send(chunk.to_vec()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                // The feeder must never stall behind a slow fetcher
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped % 100 == 1 {
                    log::warn!("Enhancement feed queue full, {} chunks dropped so far", dropped);
                }
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    fn fetch(&self) -> Result<FetchResult, FetchError> {
        let chunk = {
            let rx = self.feed_rx.lock().map_err(|_| FetchError::Terminated)?;
            rx.recv().map_err(|_| FetchError::Terminated)?
        };

        let mut dsp = self.dsp.lock().map_err(|_| FetchError::Terminated)?;
        let DspChain { preprocessor, echo, aec_out } = &mut *dsp;

        let mut pcm = match echo {
            Some(canceller) => {
                // Deinterleave mic (ch 0) and the speaker reference (ch 1)
                let mut mic = Vec::with_capacity(self.chunk_size);
                let mut reference = Vec::with_capacity(self.chunk_size);
                for pair in chunk.chunks_exact(2) {
                    mic.push(pair[0]);
                    reference.push(pair[1]);
                }
                canceller.cancel(&mic, &reference, aec_out);
                aec_out.clone()
            }
            None => chunk,
        };

        let vad_flag = preprocessor.process(&mut pcm);

        if self.linear_gain != 1.0 {
            transform::apply_output_stage(&mut pcm, self.linear_gain, None);
        }

        let volume_db = rms_dbfs(&pcm);
        let voice_active = !self.vad_enabled || vad_flag;

        Ok(FetchResult {
            pcm,
            voice_active,
            volume_db,
        })
    }

    fn feed_chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn channel_count(&self) -> usize {
        self.channels
    }
}

/// Map the ordinal VAD sensitivity mode (0 = least sensitive, 4 = most)
/// onto the preprocessor's start/continue speech probabilities.
fn vad_probabilities(mode: u8) -> (i32, i32) {
    match mode {
        0 => (90, 75),
        1 => (80, 65),
        2 => (65, 50),
        3 => (50, 35),
        _ => (35, 20),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vad_modes_grow_more_sensitive() {
        let mut last_start = 101;
        for mode in 0..=4u8 {
            let (start, cont) = vad_probabilities(mode);
            assert!(start < last_start, "mode {} should lower the start probability", mode);
            assert!(cont < start);
            last_start = start;
        }
    }
}
