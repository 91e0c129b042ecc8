use anyhow::{Context, Result};
use std::io::Cursor;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::waveform::{Waveform, ENGINE_SAMPLE_RATE};
use crate::error::{EngineError, EngineResult};

/// Decode an audio file into a 16 kHz mono waveform.
pub fn decode_file(path: &Path) -> EngineResult<Waveform> {
    let bytes = std::fs::read(path).map_err(|e| {
        EngineError::Decode(format!("Failed to read audio file {}: {}", path.display(), e))
    })?;
    let ext = path.extension().and_then(|e| e.to_str());
    decode_bytes(bytes, ext)
}

/// Decode an in-memory recording (any container symphonia can probe) into a
/// 16 kHz mono waveform. `extension` is only a probing hint.
pub fn decode_bytes(bytes: Vec<u8>, extension: Option<&str>) -> EngineResult<Waveform> {
    if bytes.is_empty() {
        return Err(EngineError::InvalidInput("Empty audio upload".into()));
    }

    let (samples, sample_rate) =
        decode_stream(bytes, extension).map_err(|e| EngineError::Decode(format!("{:#}", e)))?;

    let samples = if sample_rate != ENGINE_SAMPLE_RATE {
        log::debug!("Resampling {}Hz -> {}Hz", sample_rate, ENGINE_SAMPLE_RATE);
        resample_to_engine_rate(&samples, sample_rate)
            .map_err(|e| EngineError::Decode(format!("{:#}", e)))?
    } else {
        samples
    };

    Ok(Waveform::new(samples, ENGINE_SAMPLE_RATE))
}

fn decode_stream(bytes: Vec<u8>, extension: Option<&str>) -> Result<(Vec<f32>, u32)> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .context("Unrecognized audio container")?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .context("No audio tracks found")?;

    let track_id = track.id;
    let channels = track.codec_params.channels.map_or(1, |c| c.count());
    let sample_rate = track.codec_params.sample_rate.context("Unknown sample rate")?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Failed to create audio decoder")?;

    let mut all_samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(_)) => continue,
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        let num_frames = decoded.frames();

        let mut sample_buf = SampleBuffer::<f32>::new(num_frames as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);

        all_samples.extend(downmix(sample_buf.samples(), channels));
    }

    log::info!(
        "Decoded audio: {} samples, {}Hz, {} channel(s), {:.2}s",
        all_samples.len(),
        sample_rate,
        channels,
        all_samples.len() as f32 / sample_rate as f32
    );

    Ok((all_samples, sample_rate))
}

/// Average interleaved channels into mono.
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Resample mono f32 audio from `from_rate` to 16000 Hz using rubato.
pub fn resample_to_engine_rate(samples: &[f32], from_rate: u32) -> Result<Vec<f32>> {
    use rubato::{
        Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
        WindowFunction,
    };

    if samples.is_empty() || from_rate == ENGINE_SAMPLE_RATE {
        return Ok(samples.to_vec());
    }
    anyhow::ensure!(from_rate > 0, "Invalid source sample rate 0");

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = ENGINE_SAMPLE_RATE as f64 / from_rate as f64;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, samples.len(), 1)
        .context("Failed to create resampler")?;

    let input = vec![samples.to_vec()];
    let output = resampler
        .process(&input, None)
        .context("Resampling failed")?;

    Ok(output.into_iter().next().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
        let data_len = (samples.len() * 2) as u32;
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVEfmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&(sample_rate * channels as u32 * 2).to_le_bytes());
        out.extend_from_slice(&(channels * 2).to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for s in samples {
            out.extend_from_slice(&s.to_le_bytes());
        }
        out
    }

    #[test]
    fn downmix_averages_channels() {
        let mono = downmix(&[1.0, 0.0, 0.5, 0.5, -1.0, 1.0], 2);
        assert_eq!(mono, vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn decodes_stereo_wav_to_mono() {
        let frames = 1600;
        let mut interleaved = Vec::with_capacity(frames * 2);
        for _ in 0..frames {
            interleaved.push(16384i16);
            interleaved.push(0i16);
        }
        let wf = decode_bytes(wav_bytes(&interleaved, 16_000, 2), Some("wav")).unwrap();
        assert_eq!(wf.sample_rate(), ENGINE_SAMPLE_RATE);
        assert_eq!(wf.samples().len(), frames);
        assert!((wf.samples()[10] - 0.25).abs() < 1e-3);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = decode_bytes(b"definitely not audio".to_vec(), None).unwrap_err();
        assert!(matches!(err, EngineError::Decode(_)));
        assert!(err.is_bad_input());
    }

    #[test]
    fn empty_upload_is_invalid_input() {
        let err = decode_bytes(Vec::new(), Some("wav")).unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }
}
