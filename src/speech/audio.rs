//! PCM helpers: MP3 decoding and WAV encoding

use std::io::Cursor;

use crate::{Error, Result};

/// Decoded mono audio
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    /// Samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioClip {
    #[must_use]
    pub const fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Silent clip of the given length
    #[must_use]
    pub fn silence(millis: u32, sample_rate: u32) -> Self {
        let len = u64::from(sample_rate) * u64::from(millis) / 1000;
        Self::new(vec![0.0; usize::try_from(len).unwrap_or(0)], sample_rate)
    }

    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / u64::from(self.sample_rate)
    }
}

/// Decode MP3 bytes to mono f32 samples
///
/// Stereo frames are averaged down to one channel.
///
/// # Errors
///
/// Returns `Audio` if the bytes are not decodable MP3 or contain no frames
pub fn decode_mp3(mp3_data: &[u8]) -> Result<AudioClip> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = 0_u32;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                sample_rate = u32::try_from(frame.sample_rate).unwrap_or(0);
                if frame.channels == 2 {
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            // ID3 tags and other non-frame bytes
            Err(minimp3::Error::SkippedData) => {}
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    if sample_rate == 0 {
        return Err(Error::Audio("no MP3 frames found".to_string()));
    }

    Ok(AudioClip::new(samples, sample_rate))
}

/// Encode mono samples as a 16-bit PCM WAV file
///
/// # Errors
///
/// Returns `Audio` if the WAV writer fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
