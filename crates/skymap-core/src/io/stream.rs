use std::fs::File;
use std::io::Cursor;
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use memmap2::Mmap;

use crate::error::{Result, SkymapError};
use crate::grid::{Offset2D, SphericalCoordinates};
use crate::instrument::{Channel, Instrument};
use crate::scan::{Frame, Integration, Scan};

pub(crate) const STREAM_MAGIC: &[u8; 8] = b"SKYSCAN\0";
pub(crate) const STREAM_VERSION: u32 = 1;
pub(crate) const STREAM_HEADER_SIZE: usize = 140;
pub(crate) const CHANNEL_RECORD_SIZE: usize = 48;
pub(crate) const NAME_FIELD_SIZE: usize = 40;

/// Fixed header of a scan stream file. Angles are in radians.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamHeader {
    pub version: u32,
    pub channel_count: u32,
    pub frame_count: u32,
    pub sampling_interval: f64,
    pub beam_fwhm: f64,
    pub reference: SphericalCoordinates,
    pub integration_gain: f64,
    pub instrument: String,
    pub scan_id: String,
}

impl StreamHeader {
    /// Bytes per frame record: five f64 fields, a u32 flag, then one f32
    /// sample and one u8 flag per channel.
    pub fn frame_byte_size(&self) -> usize {
        5 * 8 + 4 + self.channel_count as usize * (4 + 1)
    }

    pub fn frames_offset(&self) -> usize {
        STREAM_HEADER_SIZE + self.channel_count as usize * CHANNEL_RECORD_SIZE
    }
}

/// Memory-mapped reader for little-endian scan stream files.
pub struct ScanStreamReader {
    mmap: Mmap,
    pub header: StreamHeader,
    channels: Vec<Channel>,
}

impl ScanStreamReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        if mmap.len() < STREAM_HEADER_SIZE {
            return Err(SkymapError::InvalidStream(
                "File too small for stream header".into(),
            ));
        }
        if &mmap[0..8] != STREAM_MAGIC {
            return Err(SkymapError::InvalidStream("Missing SKYSCAN magic".into()));
        }

        let header = parse_header(&mmap[..STREAM_HEADER_SIZE])?;
        let expected = header.frames_offset()
            + header.frame_byte_size() * header.frame_count as usize;
        if mmap.len() < expected {
            return Err(SkymapError::InvalidStream(format!(
                "File truncated: expected at least {} bytes, got {}",
                expected,
                mmap.len()
            )));
        }

        let channels = parse_channels(
            &mmap[STREAM_HEADER_SIZE..header.frames_offset()],
            header.channel_count as usize,
        )?;

        Ok(Self {
            mmap,
            header,
            channels,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.header.frame_count as usize
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn instrument(&self) -> Instrument {
        let mut instrument = Instrument::new(
            self.header.instrument.clone(),
            self.header.beam_fwhm,
            self.header.sampling_interval,
        );
        instrument.channels = self.channels.clone();
        instrument
    }

    /// Zero-copy bytes of frame `index`.
    pub fn frame_raw(&self, index: usize) -> Result<&[u8]> {
        if index >= self.frame_count() {
            return Err(SkymapError::InvalidStream(format!(
                "Frame {index} out of range (0..{})",
                self.frame_count()
            )));
        }
        let size = self.header.frame_byte_size();
        let offset = self.header.frames_offset() + index * size;
        Ok(&self.mmap[offset..offset + size])
    }

    pub fn read_frame(&self, index: usize) -> Result<Frame> {
        let raw = self.frame_raw(index)?;
        let n = self.header.channel_count as usize;
        let mut cursor = Cursor::new(raw);

        let lon = cursor.read_f64::<LittleEndian>()?;
        let lat = cursor.read_f64::<LittleEndian>()?;
        let mut frame = Frame::new(SphericalCoordinates::new(lon, lat), n);
        frame.rotation = cursor.read_f64::<LittleEndian>()?;
        frame.relative_weight = cursor.read_f64::<LittleEndian>()?;
        frame.transmission = cursor.read_f64::<LittleEndian>()?;
        frame.flag = cursor.read_u32::<LittleEndian>()?;
        cursor.read_f32_into::<LittleEndian>(&mut frame.data)?;

        let flags_offset = cursor.position() as usize;
        frame
            .sample_flag
            .copy_from_slice(&raw[flags_offset..flags_offset + n]);
        Ok(frame)
    }

    pub fn frames(&self) -> impl Iterator<Item = Result<Frame>> + '_ {
        (0..self.frame_count()).map(move |i| self.read_frame(i))
    }

    /// Read the whole file as a single-integration scan.
    pub fn read_scan(&self) -> Result<Scan> {
        let frames = self.frames().collect::<Result<Vec<_>>>()?;
        let mut integration = Integration::new(frames, self.channels.len());
        integration.gain = self.header.integration_gain;

        let mut scan = Scan::new(self.header.scan_id.clone(), self.header.reference);
        scan.integrations.push(integration);
        Ok(scan)
    }
}

fn parse_header(buf: &[u8]) -> Result<StreamHeader> {
    let mut cursor = Cursor::new(&buf[8..]); // skip magic

    let version = cursor.read_u32::<LittleEndian>()?;
    if version != STREAM_VERSION {
        return Err(SkymapError::InvalidStream(format!(
            "Unsupported stream version {version}"
        )));
    }
    let channel_count = cursor.read_u32::<LittleEndian>()?;
    let frame_count = cursor.read_u32::<LittleEndian>()?;
    let sampling_interval = cursor.read_f64::<LittleEndian>()?;
    let beam_fwhm = cursor.read_f64::<LittleEndian>()?;
    let lon = cursor.read_f64::<LittleEndian>()?;
    let lat = cursor.read_f64::<LittleEndian>()?;
    let integration_gain = cursor.read_f64::<LittleEndian>()?;

    let names = 8 + 3 * 4 + 5 * 8;
    let instrument = read_fixed_string(&buf[names..names + NAME_FIELD_SIZE]);
    let scan_id = read_fixed_string(&buf[names + NAME_FIELD_SIZE..names + 2 * NAME_FIELD_SIZE]);

    if !(sampling_interval > 0.0) {
        return Err(SkymapError::InvalidStream(format!(
            "Invalid sampling interval {sampling_interval}"
        )));
    }

    Ok(StreamHeader {
        version,
        channel_count,
        frame_count,
        sampling_interval,
        beam_fwhm,
        reference: SphericalCoordinates::new(lon, lat),
        integration_gain,
        instrument,
        scan_id,
    })
}

fn parse_channels(buf: &[u8], count: usize) -> Result<Vec<Channel>> {
    let mut cursor = Cursor::new(buf);
    let mut channels = Vec::with_capacity(count);
    for index in 0..count {
        let pixel = cursor.read_u32::<LittleEndian>()? as usize;
        let flag = cursor.read_u32::<LittleEndian>()?;
        let x = cursor.read_f64::<LittleEndian>()?;
        let y = cursor.read_f64::<LittleEndian>()?;
        let mut channel = Channel::new(index, pixel, Offset2D::new(x, y));
        channel.flag = flag;
        channel.gain = cursor.read_f64::<LittleEndian>()?;
        channel.variance = cursor.read_f64::<LittleEndian>()?;
        let frequency = cursor.read_f64::<LittleEndian>()?;
        channel.frequency = (!frequency.is_nan()).then_some(frequency);
        channels.push(channel);
    }
    Ok(channels)
}

fn read_fixed_string(buf: &[u8]) -> String {
    String::from_utf8_lossy(buf)
        .trim_end_matches('\0')
        .trim()
        .to_string()
}
