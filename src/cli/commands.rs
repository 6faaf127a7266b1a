//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;

use crate::codec::wav::{WavEncoder, WavHeader};
use crate::codec::ExportFormat;
use crate::config::CrushConfig;
use crate::engine::io::{generate_test_tone, write_asset, AudioDecoder, WavDecoder};
use crate::engine::waveform::WaveformPeaks;
use crate::error::{CrushError, Result};
use crate::pipeline::{Session, SessionEvent};

/// Longest the CLI waits for the MP3 worker
const EXPORT_TIMEOUT: Duration = Duration::from_secs(600);

/// Columns in the `inspect` overview
const OVERVIEW_COLUMNS: usize = 16;

/// Bit-crush a WAV file and write the export.
///
/// Returns the path that was written.
pub fn crush(
    input: &Path,
    output: Option<&Path>,
    bits: Option<u32>,
    hold: Option<u32>,
    format: Option<&str>,
    config_path: Option<&Path>,
) -> Result<PathBuf> {
    let mut config = match config_path {
        Some(path) => CrushConfig::load(path)?,
        None => CrushConfig::default(),
    };

    if let Some(bits) = bits {
        config.default_bit_depth = bits;
    }
    if let Some(hold) = hold {
        config.default_hold_factor = hold;
    }
    if let Some(name) = format {
        config.export_format =
            ExportFormat::from_str(name).ok_or_else(|| CrushError::UnsupportedFormat {
                format: name.to_string(),
            })?;
    }

    // Bad flag values surface as INVALID_PARAMS
    config.default_params()?;

    let export_format = config.export_format;
    let output = match output {
        Some(path) => path.to_path_buf(),
        None => input.with_file_name(export_format.file_name_for(input)),
    };

    info!("Crushing {} -> {}", input.display(), output.display());

    let source = WavDecoder.decode(input)?;
    let mut session = Session::new(config)?;

    let mut events = session.load_source(source)?;
    if export_format == ExportFormat::Mp3 {
        events.extend(session.wait_for_export(EXPORT_TIMEOUT)?);
    }

    for event in &events {
        if let SessionEvent::ProcessingFailed { message, .. } = event {
            return Err(CrushError::EncoderFailure {
                reason: message.clone(),
            });
        }
    }

    let asset = session
        .take_asset(export_format)
        .ok_or_else(|| CrushError::EncoderFailure {
            reason: format!("{} export did not finish", export_format),
        })?;
    write_asset(&asset, &output)?;
    session.close();

    println!("Wrote {} ({} bytes)", output.display(), asset.len());
    println!(
        "  {} Hz, {}-bit, sha256 {}",
        asset.sample_rate(),
        asset.bit_depth(),
        asset.checksum()
    );

    Ok(output)
}

/// Print the header fields of a WAV file and a coarse peak overview.
pub fn inspect(path: &Path) -> Result<()> {
    info!("Inspecting {}", path.display());

    let bytes = fs::read(path).map_err(|e| CrushError::FileNotFound {
        path: path.display().to_string(),
        source: Some(e),
    })?;
    let header = WavHeader::parse(&bytes)?;

    println!("File: {}", path.display());
    println!("Channels: {}", header.channels);
    println!("Sample rate: {} Hz", header.sample_rate);
    println!("Bits per sample: {}", header.bits_per_sample);
    println!("Byte rate: {}", header.byte_rate);
    println!("Block align: {}", header.block_align);
    println!("Data size: {} bytes", header.data_len);
    if header.byte_rate > 0 {
        println!(
            "Duration: {:.3} s",
            header.data_len as f64 / header.byte_rate as f64
        );
    }

    let buffer = WavDecoder.decode(path)?;
    let overview = WaveformPeaks::from_buffer(&buffer, OVERVIEW_COLUMNS);
    let line: Vec<String> = overview
        .peaks
        .iter()
        .map(|(min, max)| format!("{:.2}..{:.2}", min, max))
        .collect();
    println!("Peaks: {}", line.join(" "));

    Ok(())
}

/// Write a 16-bit mono sine tone.
pub fn tone(output: &Path, freq: f32, secs: f32, rate: u32) -> Result<()> {
    if rate == 0 || !(secs.is_finite() && secs > 0.0) {
        return Err(CrushError::InvalidParams {
            name: "tone",
            reason: format!("need a positive rate and duration, got {} Hz for {} s", rate, secs),
        });
    }

    info!("Generating {} Hz tone ({} s @ {} Hz)", freq, secs, rate);

    let buffer = generate_test_tone(freq, secs, rate);
    let asset = WavEncoder::new().encode(&buffer, 16, 1.0)?;
    write_asset(&asset, output)?;

    println!("Wrote {} ({} bytes)", output.display(), asset.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_tone_then_crush_default_name() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("beep.wav");
        tone(&source, 440.0, 0.5, 22050).unwrap();

        let written = crush(&source, None, Some(8), Some(4), None, None).unwrap();
        assert_eq!(written, dir.path().join("8bit_beep.wav"));

        let bytes = fs::read(&written).unwrap();
        let header = WavHeader::parse(&bytes).unwrap();
        assert_eq!(header.bits_per_sample, 8);
        assert_eq!(header.sample_rate, 5513);

        inspect(&written).unwrap();
    }

    #[test]
    fn test_crush_with_config_and_mp3() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("in.wav");
        tone(&source, 220.0, 0.3, 44100).unwrap();

        let config = dir.path().join("crush.json");
        fs::write(&config, r#"{ "export_format": "mp3", "mp3_bitrate_kbps": 192 }"#).unwrap();

        let written = crush(&source, None, None, None, None, Some(&config)).unwrap();
        assert_eq!(written, dir.path().join("8bit_in.mp3"));
        assert_eq!(fs::read(&written).unwrap()[0], 0xFF);
    }

    #[test]
    fn test_crush_rejects_bad_inputs() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("in.wav");
        tone(&source, 220.0, 0.1, 8000).unwrap();

        let err = crush(&source, None, None, None, Some("flac"), None).unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_FORMAT");

        let err = crush(&source, None, Some(0), None, None, None).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PARAMS");

        let err = crush(&dir.path().join("missing.wav"), None, None, None, None, None).unwrap_err();
        assert_eq!(err.error_code(), "FILE_NOT_FOUND");
    }

    #[test]
    fn test_inspect_rejects_non_wav() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("junk.wav");
        fs::write(&path, b"definitely not a wav file, just some text padding it").unwrap();
        assert_eq!(inspect(&path).unwrap_err().error_code(), "MALFORMED_HEADER");
    }
}
