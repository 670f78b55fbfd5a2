//! Pure sample transforms: gain, dynamic-range compression, limiting, and
//! format conversion between the capture container, playback PCM, and the
//! float32 wire payload.
//!
//! Everything in here is stateless and allocation-light so both the capture
//! thread and the playback thread can call into it on the hot path.

/// Immutable processing parameters for the capture path.
///
/// Built once from [`crate::config::Config`] at startup; the capture thread
/// only ever reads it.
#[derive(Debug, Clone, Copy)]
pub struct ProcessorConfig {
    /// 增益倍数
    pub gain: f32,
    /// 压缩阈值（采样幅度域）
    pub compression_threshold: f32,
    /// 压缩比例
    pub compression_ratio: f32,
    /// 是否启用自动增益
    pub enable_agc: bool,
}

// ======================== Gain / compression (i32 capture domain) ========================

/// Multiply every sample by `gain`, saturating to the i32 range.
///
/// The intermediate product is computed in f64 so a large gain overflows the
/// wide type long before it wraps; out-of-range results clamp to the rails.
pub fn amplify(samples: &mut [i32], gain: f32) {
    for sample in samples.iter_mut() {
        let amplified = *sample as f64 * gain as f64;

        if amplified > i32::MAX as f64 {
            *sample = i32::MAX;
        } else if amplified < i32::MIN as f64 {
            *sample = i32::MIN;
        } else {
            *sample = amplified as i32;
        }
    }
}

/// Threshold-based dynamic-range compression.
///
/// Samples with `|s| <= threshold` pass through untouched; the excess above
/// the threshold is divided by `ratio`, sign preserved. A ratio of exactly 1
/// is a valid degenerate configuration (the excess passes through unchanged).
pub fn compress(samples: &mut [i32], threshold: f32, ratio: f32) {
    for sample in samples.iter_mut() {
        let value = *sample as f32;
        let abs_value = value.abs();

        if abs_value > threshold {
            // 超过阈值的部分按比例压缩
            let excess = abs_value - threshold;
            let compressed = threshold + excess / ratio;
            *sample = compressed.copysign(value) as i32;
        }
    }
}

/// The capture-path processing chain: compression (when AGC is enabled)
/// followed by amplification.
///
/// Compress runs before amplify so a hot input is tamed before the gain
/// stage, otherwise the gain would push everything past the threshold.
pub fn process(samples: &mut [i32], config: &ProcessorConfig) {
    if config.enable_agc {
        compress(samples, config.compression_threshold, config.compression_ratio);
    }

    amplify(samples, config.gain);
}

// ======================== Limiting (i16 output domain) ========================

/// Hard limiter: clamp a wide intermediate straight into the i16 range.
pub fn limit_hard(sample: i32) -> i16 {
    sample.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Soft limiter: the excess above `threshold` is compressed at a fixed 3:1
/// before the final hard clamp, sign preserved.
pub fn limit_soft(sample: i32, threshold: i16) -> i16 {
    let threshold = threshold as i64;
    let abs_value = (sample as i64).abs();

    if abs_value <= threshold {
        return limit_hard(sample);
    }

    let compressed = threshold + (abs_value - threshold) / 3;
    let limited = if sample < 0 { -compressed } else { compressed };
    limited.clamp(i16::MIN as i64, i16::MAX as i64) as i16
}

/// Playback output stage: apply the output gain, then the configured limiter.
///
/// With `soft_limit_threshold` set the soft knee runs first; either way the
/// result is hard-clamped into the i16 range.
pub fn apply_output_stage(samples: &mut [i16], gain: f32, soft_limit_threshold: Option<i16>) {
    for sample in samples.iter_mut() {
        let wide = (*sample as f32 * gain) as i32;
        *sample = match soft_limit_threshold {
            Some(threshold) => limit_soft(wide, threshold),
            None => limit_hard(wide),
        };
    }
}

// ======================== Width / channel conversion ========================

/// Narrow 32-bit-container samples (24-bit data in the high bytes, as the
/// I2S capture path delivers them) down to 16-bit PCM.
pub fn narrow_to_i16(samples: &[i32]) -> Vec<i16> {
    samples.iter().map(|&s| (s >> 16) as i16).collect()
}

/// Duplicate a mono buffer into interleaved stereo (left = right).
pub fn mono_to_stereo(mono: &[i16]) -> Vec<i16> {
    let mut stereo = Vec::with_capacity(mono.len() * 2);
    for &sample in mono {
        stereo.push(sample); // 左声道
        stereo.push(sample); // 右声道
    }
    stereo
}

// ======================== Wire format (normalized float32) ========================

/// Convert one i16 sample to the normalized float wire representation.
pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / 32768.0
}

/// Convert one normalized float back to i16, clamping to [-1.0, 1.0]
/// *before* scaling so a malformed payload can never overflow the target
/// range. NaN maps to silence.
pub fn f32_to_i16(sample: f32) -> i16 {
    let sample = if sample.is_nan() { 0.0 } else { sample };
    (sample.clamp(-1.0, 1.0) * 32767.0) as i16
}

/// Encode i16 PCM as the little-endian float32 payload sent on the wire.
pub fn encode_f32le(pcm: &[i16]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(pcm.len() * 4);
    for &sample in pcm {
        payload.extend_from_slice(&i16_to_f32(sample).to_le_bytes());
    }
    payload
}

/// Decode a little-endian float32 wire payload into i16 PCM.
///
/// Trailing bytes that do not form a whole float are ignored; the caller
/// decides whether a ragged payload is worth a log line.
pub fn decode_f32le(payload: &[u8]) -> Vec<i16> {
    payload
        .chunks_exact(4)
        .map(|chunk| {
            let sample = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            f32_to_i16(sample)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_processor() -> ProcessorConfig {
        ProcessorConfig {
            gain: 15.0,
            compression_threshold: 10_000_000.0,
            compression_ratio: 1.0,
            enable_agc: true,
        }
    }

    #[test]
    fn amplify_is_exact_in_range() {
        let mut samples = vec![100, -250, 0, 1_000_000];
        amplify(&mut samples, 2.0);
        assert_eq!(samples, vec![200, -500, 0, 2_000_000]);
    }

    #[test]
    fn amplify_attenuates() {
        let mut samples = vec![1000, -1000];
        amplify(&mut samples, 0.5);
        assert_eq!(samples, vec![500, -500]);
    }

    #[test]
    fn amplify_saturates_at_both_rails() {
        let mut samples = vec![i32::MAX / 2 + 1, i32::MIN / 2 - 1];
        amplify(&mut samples, 2.0);
        assert_eq!(samples, vec![i32::MAX, i32::MIN]);

        // 极端增益也不能回绕
        let mut samples = vec![1, -1];
        amplify(&mut samples, 1e12);
        assert_eq!(samples, vec![i32::MAX, i32::MIN]);
    }

    #[test]
    fn compress_is_identity_at_or_below_threshold() {
        let mut samples = vec![0, 500, -1000, 1000];
        compress(&mut samples, 1000.0, 2.0);
        assert_eq!(samples, vec![0, 500, -1000, 1000]);
    }

    #[test]
    fn compress_scales_excess_and_keeps_sign() {
        let mut samples = vec![3000, -3000];
        compress(&mut samples, 1000.0, 2.0);
        // 1000 + (3000 - 1000) / 2 = 2000
        assert_eq!(samples, vec![2000, -2000]);
    }

    #[test]
    fn compress_ratio_one_is_a_noop() {
        let mut samples = vec![3000, -7000, 123];
        compress(&mut samples, 1000.0, 1.0);
        assert_eq!(samples, vec![3000, -7000, 123]);
    }

    #[test]
    fn process_silent_frame_stays_silent() {
        // 511-sample all-zero frame, AGC on: 0 is below threshold and 0 * gain = 0
        let mut samples = vec![0i32; 511];
        process(&mut samples, &test_processor());
        assert!(samples.iter().all(|&s| s == 0));
    }

    #[test]
    fn process_compresses_then_amplifies() {
        // 20_000_000 over a 10_000_000 threshold at ratio 2 compresses to
        // 15_000_000, then gain 15 lands at 225_000_000 — inside i32, no clamp.
        let mut samples = vec![20_000_000];
        let config = ProcessorConfig {
            gain: 15.0,
            compression_threshold: 10_000_000.0,
            compression_ratio: 2.0,
            enable_agc: true,
        };
        process(&mut samples, &config);
        assert_eq!(samples, vec![225_000_000]);
    }

    #[test]
    fn process_skips_compression_without_agc() {
        let mut samples = vec![20_000_000];
        let config = ProcessorConfig {
            enable_agc: false,
            gain: 2.0,
            ..test_processor()
        };
        process(&mut samples, &config);
        assert_eq!(samples, vec![40_000_000]);
    }

    #[test]
    fn limit_hard_clamps_at_native_boundary() {
        assert_eq!(limit_hard(40_000), i16::MAX);
        assert_eq!(limit_hard(-40_000), i16::MIN);
        assert_eq!(limit_hard(1234), 1234);
    }

    #[test]
    fn limit_soft_compresses_excess_three_to_one() {
        // 28000 + (31000 - 28000) / 3 = 29000
        assert_eq!(limit_soft(31_000, 28_000), 29_000);
        assert_eq!(limit_soft(-31_000, 28_000), -29_000);
        assert_eq!(limit_soft(27_000, 28_000), 27_000);
        // 巨大的输入最终仍被硬限幅兜底
        assert_eq!(limit_soft(1_000_000, 28_000), i16::MAX);
    }

    #[test]
    fn narrow_keeps_high_word() {
        let samples = vec![0x7FFF_0000, -0x8000_0000i64 as i32, 0x0001_0000];
        assert_eq!(narrow_to_i16(&samples), vec![0x7FFF, -0x8000, 1]);
    }

    #[test]
    fn mono_to_stereo_duplicates_each_sample() {
        assert_eq!(mono_to_stereo(&[1, -2, 3]), vec![1, 1, -2, -2, 3, 3]);
    }

    #[test]
    fn wire_round_trip_is_within_one_lsb() {
        for sample in i16::MIN..=i16::MAX {
            let back = f32_to_i16(i16_to_f32(sample));
            let error = (sample as i32 - back as i32).abs();
            assert!(error <= 1, "sample {} round-tripped to {}", sample, back);
        }
    }

    #[test]
    fn malformed_floats_never_escape_i16_range() {
        for bad in [5.0f32, -5.0, f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            let converted = f32_to_i16(bad);
            assert!((i16::MIN..=i16::MAX).contains(&converted));
        }
        assert_eq!(f32_to_i16(5.0), i16::MAX);
        assert_eq!(f32_to_i16(-5.0), -32767);
        assert_eq!(f32_to_i16(f32::NAN), 0);
    }

    #[test]
    fn payload_decode_ignores_trailing_bytes() {
        let mut payload = encode_f32le(&[1000, -1000]);
        payload.extend_from_slice(&[0xAA, 0xBB]); // ragged tail
        let pcm = decode_f32le(&payload);
        assert_eq!(pcm.len(), 2);
        assert!((pcm[0] - 1000).abs() <= 1);
        assert!((pcm[1] + 1000).abs() <= 1);
    }

    #[test]
    fn output_stage_applies_gain_and_soft_limit() {
        let mut samples = vec![10_000, -10_000, 100];
        apply_output_stage(&mut samples, 3.0, Some(28_000));
        // 28000 + (30000 - 28000) / 3 = 28666
        assert_eq!(samples, vec![28_666, -28_666, 300]);

        let mut samples = vec![30_000];
        apply_output_stage(&mut samples, 2.0, None);
        assert_eq!(samples, vec![i16::MAX]);
    }
}
