//! voicelink - bridges a microphone and speaker to a WebSocket audio
//! endpoint.
//!
//! Capture path: ALSA capture → gain/compression (or the speexdsp
//! enhancement stage) → bounded relay queue → sender task → WebSocket.
//! Playback path: WebSocket binary frames → bounded receive queue →
//! float32→int16 conversion → ALSA playback.

pub mod audio;
pub mod config;
pub mod net_link;
pub mod protocol;
