use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use skymap_core::consts::{ARCSEC, DEGREE};
use skymap_core::io::ScanStreamReader;

#[derive(Args)]
pub struct InfoArgs {
    /// Input scan stream
    pub file: PathBuf,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let reader = ScanStreamReader::open(&args.file)?;
    let header = &reader.header;
    let instrument = reader.instrument();

    println!("File:        {}", args.file.display());
    println!("Scan:        {}", header.scan_id);
    println!("Instrument:  {}", header.instrument);
    println!("Channels:    {}", header.channel_count);
    println!(
        "Mapping:     {} channel(s), {} pixel(s)",
        instrument.mapping_channels().len(),
        instrument.mapping_pixels().len()
    );
    println!("Frames:      {}", header.frame_count);
    println!(
        "Sampling:    {:.3} s ({:.1} s total)",
        header.sampling_interval,
        header.sampling_interval * header.frame_count as f64
    );
    println!("Beam:        {:.2}\"", header.beam_fwhm / ARCSEC);
    println!(
        "Reference:   {:.5}, {:+.5} deg",
        header.reference.lon / DEGREE,
        header.reference.lat / DEGREE
    );
    if header.integration_gain != 1.0 {
        println!("Gain:        {}", header.integration_gain);
    }

    let frequencies = instrument.frequency_range();
    if !frequencies.is_empty() {
        println!(
            "Frequency:   {:.3} - {:.3} GHz",
            frequencies.min / 1e9,
            frequencies.max / 1e9
        );
    }

    let total_mb =
        (header.frame_byte_size() * reader.frame_count()) as f64 / (1024.0 * 1024.0);
    println!("Data size:   {:.1} MB", total_mb);

    Ok(())
}
