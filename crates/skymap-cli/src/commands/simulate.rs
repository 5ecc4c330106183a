use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use skymap_core::consts::{ARCSEC, SIGMAS_IN_FWHM};
use skymap_core::grid::{Gnomonic, Offset2D, SphericalCoordinates};
use skymap_core::instrument::{Channel, Instrument};
use skymap_core::io::write_scan;
use skymap_core::scan::{Frame, Integration, Scan};

#[derive(Args)]
pub struct SimulateArgs {
    /// Output scan stream
    pub output: PathBuf,

    /// Scan identifier stored in the header
    #[arg(long, default_value = "sim-1")]
    pub scan_id: String,

    /// Pointing centre right ascension, degrees
    #[arg(long, default_value = "83.633")]
    pub ra: f64,

    /// Pointing centre declination, degrees
    #[arg(long, default_value = "22.014")]
    pub dec: f64,

    /// Number of detector channels, in a row along x
    #[arg(long, default_value = "4")]
    pub channels: usize,

    /// Channel spacing in arcsec
    #[arg(long, default_value = "8")]
    pub spacing: f64,

    /// Beam FWHM in arcsec
    #[arg(long, default_value = "10")]
    pub beam: f64,

    /// Half-width of the raster in arcsec
    #[arg(long, default_value = "60")]
    pub half_width: f64,

    /// Raster step in arcsec
    #[arg(long, default_value = "2")]
    pub step: f64,

    /// Peak amplitude of the point source
    #[arg(long, default_value = "10")]
    pub amplitude: f64,

    /// Source offset from the centre, "x,y" in arcsec
    #[arg(long, default_value = "0,0")]
    pub source: String,

    /// RMS of the white noise added to every sample
    #[arg(long, default_value = "0.5")]
    pub noise: f64,

    /// Constant offset added to every sample
    #[arg(long, default_value = "0")]
    pub offset: f64,

    /// Spread channel frequencies over "min,max" GHz
    #[arg(long)]
    pub frequencies: Option<String>,

    /// Random seed
    #[arg(long, default_value = "1")]
    pub seed: u64,
}

pub fn run(args: &SimulateArgs) -> Result<()> {
    if args.channels == 0 {
        bail!("At least one channel is required");
    }
    if !(args.step > 0.0 && args.half_width > args.step) {
        bail!("Raster step must be positive and smaller than the half-width");
    }

    let instrument = build_instrument(args)?;
    let (sx, sy) = parse_pair(&args.source).context("Invalid --source")?;
    let source = Offset2D::new(sx * ARCSEC, sy * ARCSEC);
    let sigma = args.beam * ARCSEC / SIGMAS_IN_FWHM;

    let centre = SphericalCoordinates::from_degrees(args.ra, args.dec);
    let projection = Gnomonic::new(centre);
    let mut rng = StdRng::seed_from_u64(args.seed);

    let half_width = args.half_width * ARCSEC;
    let step = args.step * ARCSEC;
    let n = (2.0 * half_width / step).round() as usize;
    let start = -half_width + 0.5 * step;

    let mut frames = Vec::with_capacity(n * n);
    for row in 0..n {
        // Boustrophedon: alternate rows run backwards.
        for k in 0..n {
            let col = if row % 2 == 0 { k } else { n - 1 - k };
            let offset = Offset2D::new(start + col as f64 * step, start + row as f64 * step);
            let mut frame = Frame::new(projection.deproject(&offset), instrument.channel_count());
            for (c, channel) in instrument.channels.iter().enumerate() {
                let sky = frame.sky_offset(&channel.position, &projection);
                let dx = sky.x - source.x;
                let dy = sky.y - source.y;
                let signal = args.amplitude * (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp();
                frame.data[c] =
                    (signal + args.offset + args.noise * gaussian(&mut rng)) as f32;
            }
            frames.push(frame);
        }
    }

    let mut scan = Scan::new(args.scan_id.clone(), centre);
    scan.integrations
        .push(Integration::new(frames, instrument.channel_count()));

    write_scan(&args.output, &instrument, &scan)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    println!(
        "Wrote {} frames x {} channels to {}",
        scan.frames(),
        instrument.channel_count(),
        args.output.display()
    );
    Ok(())
}

fn build_instrument(args: &SimulateArgs) -> Result<Instrument> {
    let mut instrument = Instrument::new("simulated", args.beam * ARCSEC, 0.1);
    let centre = 0.5 * (args.channels as f64 - 1.0);
    instrument.channels = (0..args.channels)
        .map(|c| {
            let x = (c as f64 - centre) * args.spacing * ARCSEC;
            Channel::new(c, c, Offset2D::new(x, 0.0))
        })
        .collect();

    if let Some(ref range) = args.frequencies {
        let (lo, hi) = parse_pair(range).context("Invalid --frequencies")?;
        let span = if args.channels > 1 {
            (hi - lo) / (args.channels - 1) as f64
        } else {
            0.0
        };
        for (c, channel) in instrument.channels.iter_mut().enumerate() {
            channel.frequency = Some((lo + c as f64 * span) * 1e9);
        }
    }
    Ok(instrument)
}

fn parse_pair(s: &str) -> Result<(f64, f64)> {
    let values: Vec<f64> = s
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<f64>, _>>()
        .with_context(|| format!("Expected two comma-separated numbers, got '{s}'"))?;
    match values.as_slice() {
        [a, b] => Ok((*a, *b)),
        _ => bail!("Expected two comma-separated numbers, got '{s}'"),
    }
}

/// Standard normal deviate (Box-Muller).
fn gaussian(rng: &mut impl Rng) -> f64 {
    let u1: f64 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}
