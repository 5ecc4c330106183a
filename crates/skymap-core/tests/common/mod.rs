use skymap_core::consts::ARCSEC;
use skymap_core::grid::{Gnomonic, Offset2D, SphericalCoordinates};
use skymap_core::instrument::{Channel, Instrument};
use skymap_core::scan::{Frame, Integration, Scan};

/// Beam FWHM of the synthetic instrument.
pub const BEAM: f64 = 10.0 * ARCSEC;

pub fn reference() -> SphericalCoordinates {
    SphericalCoordinates::from_degrees(83.6, 22.0)
}

/// An instrument with `channels` detectors in a row along x, `spacing`
/// radians apart and centred on the pointing, one mapping pixel each.
pub fn line_instrument(channels: usize, spacing: f64) -> Instrument {
    let mut instrument = Instrument::new("synthetic", BEAM, 0.1);
    let centre = 0.5 * (channels as f64 - 1.0);
    instrument.channels = (0..channels)
        .map(|c| Channel::new(c, c, Offset2D::new((c as f64 - centre) * spacing, 0.0)))
        .collect();
    instrument
}

/// A single channel at the pointing centre.
pub fn single_channel_instrument() -> Instrument {
    let mut instrument = Instrument::new("single", BEAM, 0.1);
    instrument.channels = vec![Channel::new(0, 0, Offset2D::default())];
    instrument
}

/// Deterministic zero-mean pseudo noise in [-0.5, 0.5).
pub fn hash_noise(k: usize, c: usize) -> f64 {
    let h = (k as u64)
        .wrapping_mul(6_364_136_223_846_793_005)
        .wrapping_add((c as u64).wrapping_mul(1_442_695_040_888_963_407));
    ((h >> 33) % 10_000) as f64 / 10_000.0 - 0.5
}

/// Raster scan over a square of half-width `half_width` (radians) with
/// `step` spacing, centred on `centre`. Rows and columns sit half a step off
/// the centre, so with a step equal to the pixel size samples land on pixel
/// centres. Each sample holds `signal` evaluated at its tangent-plane offset
/// from `centre`.
pub fn raster_scan(
    id: &str,
    instrument: &Instrument,
    centre: SphericalCoordinates,
    half_width: f64,
    step: f64,
    signal: impl Fn(Offset2D) -> f64,
) -> Scan {
    let projection = Gnomonic::new(centre);
    let n = (2.0 * half_width / step).round() as usize;
    let start = -half_width + 0.5 * step;
    let mut frames = Vec::with_capacity(n * n);
    for row in 0..n {
        for col in 0..n {
            let offset = Offset2D::new(start + col as f64 * step, start + row as f64 * step);
            let mut frame = Frame::new(projection.deproject(&offset), instrument.channel_count());
            for (c, channel) in instrument.channels.iter().enumerate() {
                let sky = frame.sky_offset(&channel.position, &projection);
                frame.data[c] = signal(sky) as f32;
            }
            frames.push(frame);
        }
    }
    let mut scan = Scan::new(id, centre);
    scan.integrations
        .push(Integration::new(frames, instrument.channel_count()));
    scan
}

/// Frames all pointing at `centre`, one per `(value, relative_weight)` pair.
pub fn stare_scan(
    id: &str,
    instrument: &Instrument,
    centre: SphericalCoordinates,
    samples: &[(f32, f64)],
) -> Scan {
    let frames = samples
        .iter()
        .map(|&(value, weight)| {
            let mut frame = Frame::new(centre, instrument.channel_count());
            frame.data.fill(value);
            frame.relative_weight = weight;
            frame
        })
        .collect();
    let mut scan = Scan::new(id, centre);
    scan.integrations
        .push(Integration::new(frames, instrument.channel_count()));
    scan
}

/// Circular Gaussian of peak `amplitude` and `fwhm` centred on `at`.
pub fn gaussian_source(amplitude: f64, fwhm: f64, at: Offset2D) -> impl Fn(Offset2D) -> f64 {
    let sigma = fwhm / skymap_core::consts::SIGMAS_IN_FWHM;
    move |o: Offset2D| {
        let dx = o.x - at.x;
        let dy = o.y - at.y;
        amplitude * (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp()
    }
}
