//! End-to-end checks of the sample pipeline and the relay handoff, with the
//! device and network boundaries left out: capture processing → wire
//! encoding → receive decoding → playback conversion.

use voicelink_linux_rs::audio::relay::{self, RelayFrame};
use voicelink_linux_rs::audio::transform::{self, ProcessorConfig};

fn default_processor() -> ProcessorConfig {
    ProcessorConfig {
        gain: 15.0,
        compression_threshold: 10_000_000.0,
        compression_ratio: 1.0,
        enable_agc: true,
    }
}

#[test]
fn silent_frame_stays_silent_through_the_whole_chain() {
    // A 511-sample all-zero capture frame: processing, narrowing, the wire
    // codec, and stereo expansion must all preserve silence.
    let mut frame = vec![0i32; 511];
    transform::process(&mut frame, &default_processor());

    let pcm16 = transform::narrow_to_i16(&frame);
    let payload = transform::encode_f32le(&pcm16);
    let received = transform::decode_f32le(&payload);
    let stereo = transform::mono_to_stereo(&received);

    assert_eq!(stereo.len(), 511 * 2);
    assert!(stereo.iter().all(|&s| s == 0));
}

#[test]
fn hot_sample_is_compressed_then_amplified_then_survives_the_wire() {
    let mut frame = vec![20_000_000i32];
    let processor = ProcessorConfig {
        gain: 15.0,
        compression_threshold: 10_000_000.0,
        compression_ratio: 2.0,
        enable_agc: true,
    };
    transform::process(&mut frame, &processor);

    // threshold + excess/ratio = 15_000_000, then gain 15 → 225_000_000
    assert_eq!(frame, vec![225_000_000]);

    // Narrow to the 16-bit send domain and round-trip the wire format
    let pcm16 = transform::narrow_to_i16(&frame);
    assert_eq!(pcm16, vec![(225_000_000i32 >> 16) as i16]);

    let received = transform::decode_f32le(&transform::encode_f32le(&pcm16));
    assert_eq!(received.len(), 1);
    assert!((received[0] as i32 - pcm16[0] as i32).abs() <= 1);
}

#[test]
fn relay_queue_drops_the_fifth_frame_and_keeps_arrival_order() {
    let (tx, mut rx) = relay::channel(4);

    let frames: Vec<RelayFrame> = (0..5i16)
        .map(|i| RelayFrame::from_pcm(&[i, i + 10, i + 20], 64).unwrap())
        .collect();

    let results: Vec<bool> = frames.into_iter().map(|f| tx.try_enqueue(f)).collect();
    assert_eq!(results, vec![true, true, true, true, false]);

    for i in 0..4i16 {
        let frame = rx.try_recv().expect("first four frames are retained");
        assert_eq!(frame.samples(), vec![i, i + 10, i + 20]);
    }
    assert!(rx.try_recv().is_err(), "queue length stays at capacity");
}

#[test]
fn malformed_inbound_payload_never_overflows_i16() {
    // Out-of-range and non-finite floats straight off the wire
    let bad_floats = [5.0f32, -5.0, f32::NAN, f32::INFINITY, 0.25];
    let mut payload = Vec::new();
    for f in bad_floats {
        payload.extend_from_slice(&f.to_le_bytes());
    }

    let pcm = transform::decode_f32le(&payload);
    assert_eq!(pcm.len(), bad_floats.len());
    assert_eq!(pcm[0], i16::MAX);
    assert_eq!(pcm[1], -32767);
    assert_eq!(pcm[2], 0);
    assert_eq!(pcm[3], i16::MAX);
    assert_eq!(pcm[4], (0.25f32 * 32767.0) as i16);
}

#[test]
fn playback_output_stage_tames_a_hot_remote_frame() {
    // A full-scale remote frame with an aggressive output gain must come out
    // soft-limited, not wrapped.
    let payload = transform::encode_f32le(&[30_000, -30_000]);
    let mut pcm = transform::decode_f32le(&payload);
    transform::apply_output_stage(&mut pcm, 2.0, Some(28_000));

    // Doubled full-scale input lands on the hard rails, not wrapped around
    assert_eq!(pcm, vec![i16::MAX, i16::MIN]);

    let stereo = transform::mono_to_stereo(&pcm);
    assert_eq!(stereo.len(), 4);
    assert_eq!(stereo[0], stereo[1]);
    assert_eq!(stereo[2], stereo[3]);
}
