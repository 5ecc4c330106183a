use serde::{Deserialize, Serialize};

use crate::consts::DEGREE;

/// A position on the celestial sphere, in radians.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SphericalCoordinates {
    pub lon: f64,
    pub lat: f64,
}

impl SphericalCoordinates {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    pub fn from_degrees(lon: f64, lat: f64) -> Self {
        Self::new(lon * DEGREE, lat * DEGREE)
    }

    /// Great-circle distance to `other` (haversine form, stable at small separations).
    pub fn distance_to(&self, other: &SphericalCoordinates) -> f64 {
        let dlat = 0.5 * (other.lat - self.lat);
        let dlon = 0.5 * (other.lon - self.lon);
        let a = dlat.sin().powi(2) + self.lat.cos() * other.lat.cos() * dlon.sin().powi(2);
        2.0 * a.sqrt().min(1.0).asin()
    }
}

/// A flat offset on the tangent plane (or in the focal plane), in radians.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Offset2D {
    pub x: f64,
    pub y: f64,
}

impl Offset2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn length(&self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Counter-clockwise rotation by `angle` radians.
    pub fn rotated(&self, angle: f64) -> Self {
        if angle == 0.0 {
            return *self;
        }
        let (s, c) = angle.sin_cos();
        Self {
            x: c * self.x - s * self.y,
            y: s * self.x + c * self.y,
        }
    }
}

/// Gnomonic (tangent-plane) projection about a reference position.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Gnomonic {
    reference: SphericalCoordinates,
    sin_lat0: f64,
    cos_lat0: f64,
}

impl Gnomonic {
    pub fn new(reference: SphericalCoordinates) -> Self {
        let (sin_lat0, cos_lat0) = reference.lat.sin_cos();
        Self {
            reference,
            sin_lat0,
            cos_lat0,
        }
    }

    pub fn reference(&self) -> SphericalCoordinates {
        self.reference
    }

    /// Project onto the tangent plane. Points on the far hemisphere have no
    /// gnomonic image and come back as NaN offsets.
    pub fn project(&self, coords: &SphericalCoordinates) -> Offset2D {
        let (sin_lat, cos_lat) = coords.lat.sin_cos();
        let (sin_dlon, cos_dlon) = (coords.lon - self.reference.lon).sin_cos();

        let cos_c = self.sin_lat0 * sin_lat + self.cos_lat0 * cos_lat * cos_dlon;
        if cos_c <= 0.0 {
            return Offset2D::new(f64::NAN, f64::NAN);
        }

        Offset2D {
            x: cos_lat * sin_dlon / cos_c,
            y: (self.cos_lat0 * sin_lat - self.sin_lat0 * cos_lat * cos_dlon) / cos_c,
        }
    }

    pub fn deproject(&self, offset: &Offset2D) -> SphericalCoordinates {
        let rho = offset.length();
        if rho == 0.0 {
            return self.reference;
        }

        let c = rho.atan();
        let (sin_c, cos_c) = c.sin_cos();

        let lat = (cos_c * self.sin_lat0 + offset.y * sin_c * self.cos_lat0 / rho)
            .clamp(-1.0, 1.0)
            .asin();
        let lon = self.reference.lon
            + (offset.x * sin_c).atan2(rho * self.cos_lat0 * cos_c - offset.y * self.sin_lat0 * sin_c);

        SphericalCoordinates { lon, lat }
    }
}
