//! audio - capture, processing, playback, and the bounded handoff between
//! the real-time loop and the network tasks.
//!
//! Uses ALSA for audio I/O and libspeexdsp for the optional enhancement
//! stage (AEC, noise suppression, VAD, AGC).

mod capture;
mod device;
mod enhanced;
mod pipeline;
mod playback;
mod sender;
mod speex;

pub mod enhance;
pub mod relay;
pub mod transform;

pub use pipeline::AudioPipeline;
pub use playback::PlaybackFrame;
pub use sender::run_sender;
