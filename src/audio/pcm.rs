//! PCM16 conversion and base64 framing for the live transport.

use crate::error::LiveError;
use crate::types::AudioBlob;
use base64::Engine as _;

/// Converts float samples to signed 16-bit PCM.
///
/// Samples are clamped to [-1, 1] and scaled asymmetrically (32768 on the
/// negative side, 32767 on the positive) so that both full-scale extremes are
/// representable.
pub fn f32_to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| {
            let s = s.clamp(-1.0, 1.0);
            if s < 0.0 {
                (s * 32768.0).round().max(i16::MIN as f32) as i16
            } else {
                (s * 32767.0).round() as i16
            }
        })
        .collect()
}

/// Converts signed 16-bit PCM back to float samples in [-1, 1).
pub fn pcm16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32768.0).collect()
}

/// Packs float samples into a transport blob: PCM16 little-endian bytes,
/// base64-encoded, tagged with the capture rate.
pub fn encode_frame(samples: &[f32], sample_rate: u32) -> AudioBlob {
    let pcm = f32_to_pcm16(samples);
    let mut byte_data = Vec::with_capacity(pcm.len() * 2);
    for sample in pcm {
        byte_data.extend_from_slice(&sample.to_le_bytes());
    }
    AudioBlob {
        mime_type: format!("audio/pcm;rate={}", sample_rate),
        data: base64::engine::general_purpose::STANDARD.encode(&byte_data),
    }
}

/// Unpacks a base64 PCM16 payload into float samples.
///
/// Fails on invalid base64 or an odd byte count; callers treat this as a
/// per-frame error and keep the session alive.
pub fn decode_frame(data: &str) -> Result<Vec<f32>, LiveError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| LiveError::AudioDecode(format!("invalid base64 payload: {}", e)))?;
    if bytes.len() % 2 != 0 {
        return Err(LiveError::AudioDecode(format!(
            "PCM16 payload has odd byte count ({})",
            bytes.len()
        )));
    }
    let samples: Vec<i16> = bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect();
    Ok(pcm16_to_f32(&samples))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_scale_extremes_are_representable() {
        let pcm = f32_to_pcm16(&[-1.0, 0.0, 1.0]);
        assert_eq!(pcm, vec![-32768, 0, 32767]);
    }

    #[test]
    fn out_of_range_samples_are_clamped() {
        let pcm = f32_to_pcm16(&[-3.5, 2.0]);
        assert_eq!(pcm, vec![-32768, 32767]);
    }

    #[test]
    fn round_trip_is_within_quantization_error() {
        let original: Vec<f32> = (0..1000)
            .map(|i| ((i as f32) * 0.013).sin() * 0.9)
            .collect();
        let encoded = encode_frame(&original, 16_000);
        let decoded = decode_frame(&encoded.data).unwrap();
        assert_eq!(decoded.len(), original.len());
        let tolerance = 1.0 / 32768.0 + f32::EPSILON;
        for (a, b) in original.iter().zip(decoded.iter()) {
            assert!(
                (a - b).abs() <= tolerance,
                "sample drifted beyond quantization error: {} vs {}",
                a,
                b
            );
        }
    }

    #[test]
    fn encode_frame_tags_sample_rate() {
        let blob = encode_frame(&[0.0; 4], 16_000);
        assert_eq!(blob.mime_type, "audio/pcm;rate=16000");
        let decoded = decode_frame(&blob.data).unwrap();
        assert_eq!(decoded, vec![0.0; 4]);
    }

    #[test]
    fn decode_rejects_odd_byte_count() {
        let data = base64::engine::general_purpose::STANDARD.encode([1u8, 2, 3]);
        let err = decode_frame(&data).unwrap_err();
        assert!(matches!(err, LiveError::AudioDecode(_)));
    }

    #[test]
    fn decode_rejects_invalid_base64() {
        let err = decode_frame("not base64 !!!").unwrap_err();
        assert!(matches!(err, LiveError::AudioDecode(_)));
    }
}
