use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{Result, SkymapError};
use crate::instrument::{Channel, Instrument};
use crate::scan::{Frame, Scan};

use super::stream::{
    StreamHeader, CHANNEL_RECORD_SIZE, NAME_FIELD_SIZE, STREAM_HEADER_SIZE, STREAM_MAGIC,
};

/// Writes a scan stream file frame by frame.
pub struct ScanStreamWriter {
    writer: BufWriter<File>,
    header: StreamHeader,
    frames_written: u32,
}

impl ScanStreamWriter {
    /// Create the file and write the header and channel table.
    pub fn create(path: &Path, header: &StreamHeader, channels: &[Channel]) -> Result<Self> {
        if channels.len() != header.channel_count as usize {
            return Err(SkymapError::DimensionMismatch {
                expected: header.channel_count as usize,
                actual: channels.len(),
            });
        }
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        write_header(&mut writer, header)?;
        for channel in channels {
            write_channel(&mut writer, channel)?;
        }
        Ok(Self {
            writer,
            header: header.clone(),
            frames_written: 0,
        })
    }

    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let n = self.header.channel_count as usize;
        if frame.data.len() != n || frame.sample_flag.len() != n {
            return Err(SkymapError::DimensionMismatch {
                expected: n,
                actual: frame.data.len(),
            });
        }
        let w = &mut self.writer;
        w.write_all(&frame.equatorial.lon.to_le_bytes())?;
        w.write_all(&frame.equatorial.lat.to_le_bytes())?;
        w.write_all(&frame.rotation.to_le_bytes())?;
        w.write_all(&frame.relative_weight.to_le_bytes())?;
        w.write_all(&frame.transmission.to_le_bytes())?;
        w.write_all(&frame.flag.to_le_bytes())?;
        for &x in &frame.data {
            w.write_all(&x.to_le_bytes())?;
        }
        w.write_all(&frame.sample_flag)?;
        self.frames_written += 1;
        Ok(())
    }

    /// Flush and check that the promised number of frames was written.
    pub fn finalize(mut self) -> Result<()> {
        self.writer.flush()?;
        if self.frames_written != self.header.frame_count {
            return Err(SkymapError::InvalidStream(format!(
                "Header promises {} frames, {} written",
                self.header.frame_count, self.frames_written
            )));
        }
        Ok(())
    }
}

/// Write every frame of `scan` (all integrations, in order) to `path`.
pub fn write_scan(path: &Path, instrument: &Instrument, scan: &Scan) -> Result<()> {
    let header = StreamHeader {
        version: super::stream::STREAM_VERSION,
        channel_count: instrument.channel_count() as u32,
        frame_count: scan.frames() as u32,
        sampling_interval: instrument.sampling_interval,
        beam_fwhm: instrument.resolution,
        reference: scan.equatorial,
        integration_gain: scan.integrations.first().map_or(1.0, |i| i.gain),
        instrument: instrument.name.clone(),
        scan_id: scan.id.clone(),
    };
    let mut writer = ScanStreamWriter::create(path, &header, &instrument.channels)?;
    for integration in &scan.integrations {
        for frame in &integration.frames {
            writer.write_frame(frame)?;
        }
    }
    writer.finalize()
}

fn write_header(w: &mut impl Write, header: &StreamHeader) -> Result<()> {
    w.write_all(STREAM_MAGIC)?;
    w.write_all(&header.version.to_le_bytes())?;
    w.write_all(&header.channel_count.to_le_bytes())?;
    w.write_all(&header.frame_count.to_le_bytes())?;
    w.write_all(&header.sampling_interval.to_le_bytes())?;
    w.write_all(&header.beam_fwhm.to_le_bytes())?;
    w.write_all(&header.reference.lon.to_le_bytes())?;
    w.write_all(&header.reference.lat.to_le_bytes())?;
    w.write_all(&header.integration_gain.to_le_bytes())?;
    write_fixed_string(w, &header.instrument, NAME_FIELD_SIZE)?;
    write_fixed_string(w, &header.scan_id, NAME_FIELD_SIZE)?;

    debug_assert_eq!(
        8 + 4 + 4 + 4 + 8 * 5 + NAME_FIELD_SIZE * 2,
        STREAM_HEADER_SIZE
    );
    Ok(())
}

fn write_channel(w: &mut impl Write, channel: &Channel) -> Result<()> {
    w.write_all(&(channel.pixel as u32).to_le_bytes())?;
    w.write_all(&channel.flag.to_le_bytes())?;
    w.write_all(&channel.position.x.to_le_bytes())?;
    w.write_all(&channel.position.y.to_le_bytes())?;
    w.write_all(&channel.gain.to_le_bytes())?;
    w.write_all(&channel.variance.to_le_bytes())?;
    w.write_all(&channel.frequency.unwrap_or(f64::NAN).to_le_bytes())?;

    debug_assert_eq!(4 + 4 + 8 * 5, CHANNEL_RECORD_SIZE);
    Ok(())
}

fn write_fixed_string(w: &mut impl Write, s: &str, len: usize) -> Result<()> {
    let bytes = s.as_bytes();
    let to_write = bytes.len().min(len);
    w.write_all(&bytes[..to_write])?;
    w.write_all(&vec![0u8; len - to_write])?;
    Ok(())
}
