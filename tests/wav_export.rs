//! WAV Export Tests
//!
//! Size ceiling, header and decimation behaviour of the WAV encoder.

use crushwave::codec::{WavEncoder, WavHeader, DEFAULT_SIZE_CEILING_BYTES, WAV_HEADER_LEN};
use crushwave::dsp::ProcessingParams;
use crushwave::engine::{generate_stereo_test_tone, generate_test_tone, PcmBuffer};

/// Preview then export, the way a session does it
fn crush_to_wav(buffer: &PcmBuffer, bit_depth: u32, hold: u32) -> Vec<u8> {
    let params = ProcessingParams::new(bit_depth, hold).unwrap();
    let preview = params.apply(buffer);
    WavEncoder::new()
        .encode(&preview, bit_depth, hold as f64)
        .unwrap()
        .into_bytes()
}

/// Count transitions from the lower to the upper half of the 8-bit range
fn rising_edges(samples: &[u8]) -> usize {
    samples
        .windows(2)
        .filter(|pair| pair[0] < 128 && pair[1] >= 128)
        .count()
}

// === Concrete Scenarios ===

#[test]
fn test_two_second_sine_at_8_bits() {
    let buffer = generate_test_tone(440.0, 2.0, 44100);
    let bytes = crush_to_wav(&buffer, 8, 1);
    let header = WavHeader::parse(&bytes).unwrap();

    assert_eq!(header.bits_per_sample, 8);
    assert_eq!(header.channels, 1);
    assert_eq!(header.sample_rate, 44100);
    assert!((header.data_len as i64 - 88200).abs() <= 1);
    assert_eq!(bytes.len(), WAV_HEADER_LEN + header.data_len as usize);
}

#[test]
fn test_hold_ten_lowers_rate_and_period() {
    let buffer = generate_test_tone(440.0, 2.0, 44100);

    let full = crush_to_wav(&buffer, 8, 1);
    let decimated = crush_to_wav(&buffer, 8, 10);
    let header = WavHeader::parse(&decimated).unwrap();

    assert_eq!(header.sample_rate, 4410);
    assert!((header.data_len as i64 - 8820).abs() <= 1);

    let full_edges = rising_edges(&full[WAV_HEADER_LEN..]);
    let decimated_edges = rising_edges(&decimated[WAV_HEADER_LEN..]);
    // 440 Hz for two seconds is 880 cycles either way
    assert!((full_edges as i64 - 880).abs() <= 2, "{} edges", full_edges);
    assert!(
        (decimated_edges as i64 - 880).abs() <= 2,
        "{} edges",
        decimated_edges
    );

    let full_period = (full.len() - WAV_HEADER_LEN) as f64 / full_edges as f64;
    let decimated_period = (decimated.len() - WAV_HEADER_LEN) as f64 / decimated_edges as f64;
    assert!((full_period / decimated_period - 10.0).abs() < 0.1);
}

#[test]
fn test_ten_minute_stereo_plan_fits_ceiling() {
    let plan = WavEncoder::new().plan(2, 48000 * 600, 48000, 16, 1.0).unwrap();

    assert!(plan.auto_downsampled);
    assert_eq!(plan.step, 8);
    assert_eq!(plan.sample_rate, 6000);
    assert_eq!(plan.frames, 3_600_000);
    assert_eq!(plan.total_len(), 14_400_044);
    assert!(plan.total_len() <= DEFAULT_SIZE_CEILING_BYTES);
}

#[test]
fn test_auto_downsample_header_matches_plan() {
    let buffer = generate_stereo_test_tone(440.0, 550.0, 10.0, 48000);
    let encoder = WavEncoder::with_size_ceiling(200_000);

    let plan = encoder.plan(2, buffer.num_frames(), 48000, 16, 1.0).unwrap();
    assert_eq!(plan.step, 10);

    let asset = encoder.encode(&buffer, 16, 1.0).unwrap();
    let header = WavHeader::parse(asset.bytes()).unwrap();

    assert_eq!(header.sample_rate, 4800);
    assert_eq!(asset.sample_rate(), 4800);
    assert_eq!(header.data_len, 192_000);
    assert_eq!(asset.len(), 192_044);
}

// === Properties ===

#[test]
fn test_output_never_exceeds_ceiling() {
    let rate = 22050;
    for ceiling in [1_000usize, 10_000, 77_777] {
        let encoder = WavEncoder::with_size_ceiling(ceiling);
        for secs in [0.01f32, 0.5, 3.0] {
            for channels in 1..=3usize {
                let frames = (secs * rate as f32) as usize;
                let buffer = PcmBuffer::new(
                    (0..channels)
                        .map(|c| (0..frames).map(|i| ((i + c) % 7) as f32 / 7.0 - 0.5).collect())
                        .collect(),
                    rate,
                )
                .unwrap();

                for bit_depth in [4u32, 8, 12, 16] {
                    for hold in [1.0f64, 3.0, 20.0] {
                        let asset = encoder.encode(&buffer, bit_depth, hold).unwrap();
                        let header = WavHeader::parse(asset.bytes()).unwrap();
                        let bytes_per_sample = header.bits_per_sample as u32 / 8;

                        assert!(
                            asset.len() <= ceiling,
                            "{} bytes > {} ({} s, {} ch, {} bits, hold {})",
                            asset.len(),
                            ceiling,
                            secs,
                            channels,
                            bit_depth,
                            hold
                        );
                        assert_eq!(header.channels as usize, channels);
                        assert!(header.sample_rate <= rate);
                        assert_eq!(
                            header.byte_rate,
                            header.sample_rate * channels as u32 * bytes_per_sample
                        );
                        assert_eq!(header.data_len as usize + WAV_HEADER_LEN, asset.len());
                        assert_eq!(header.riff_len as usize, asset.len() - 8);
                    }
                }
            }
        }
    }
}

#[test]
fn test_encoding_is_idempotent() {
    let buffer = generate_stereo_test_tone(300.0, 450.0, 1.0, 44100);
    let encoder = WavEncoder::new();

    let first = encoder.encode(&buffer, 6, 3.0).unwrap();
    let second = encoder.encode(&buffer, 6, 3.0).unwrap();
    assert_eq!(first.checksum(), second.checksum());
    assert_eq!(first, second);
}

#[test]
fn test_hound_reads_export() {
    let buffer = generate_stereo_test_tone(440.0, 880.0, 0.5, 32000);
    let asset = WavEncoder::new().encode(&buffer, 16, 2.0).unwrap();

    let reader = hound::WavReader::new(std::io::Cursor::new(asset.bytes())).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(spec.sample_rate, 16000);
    assert_eq!(reader.duration(), 8000);
}
