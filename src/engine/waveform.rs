//! Waveform peak summary for the rendering collaborator.
//!
//! The renderer paints one vertical min/max line per column. Scanning every
//! sample of a long file per column is wasteful, so each column probes a
//! bounded number of evenly spaced samples instead.

use crate::engine::buffer::PcmBuffer;

/// Upper bound on samples inspected per column
pub const MAX_PROBES_PER_COLUMN: usize = 50;

/// Min/max pairs for a fixed number of display columns (first channel only)
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformPeaks {
    /// One `(min, max)` pair per column.
    pub peaks: Vec<(f32, f32)>,
    /// Frames covered by each column.
    pub frames_per_column: usize,
}

impl WaveformPeaks {
    /// Summarize the first channel of `buffer` into `columns` peak pairs
    ///
    /// Columns past the end of the audio, and columns whose probes saw no
    /// samples, report `(0.0, 0.0)`.
    pub fn from_buffer(buffer: &PcmBuffer, columns: usize) -> Self {
        if columns == 0 {
            return Self {
                peaks: Vec::new(),
                frames_per_column: 0,
            };
        }

        let data = buffer.channel(0);
        let total = data.len();
        let step = total.div_ceil(columns);
        let probes = step.min(MAX_PROBES_PER_COLUMN);
        let skip = if probes == 0 { 0 } else { step.div_ceil(probes) };

        let peaks = (0..columns)
            .map(|column| {
                let start = column * step;
                let mut min = 1.0_f32;
                let mut max = -1.0_f32;

                for probe in 0..probes {
                    let Some(&sample) = data.get(start + probe * skip) else {
                        break;
                    };
                    min = min.min(sample);
                    max = max.max(sample);
                }

                if max < min {
                    (0.0, 0.0)
                } else {
                    (min, max)
                }
            })
            .collect();

        Self {
            peaks,
            frames_per_column: step,
        }
    }
}
