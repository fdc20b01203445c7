//! Detector-to-reciprocal-space mapping.
//!
//! The assigners only ever see reciprocal-space points. Converting a spot's
//! pixel position and rotation angle into such a point needs the detector,
//! beam and goniometer models, which live outside this crate; they plug in
//! through [`ReciprocalSpaceMapping`].
//!
//! [`FlatDetectorGeometry`] is a minimal implementation for a single flat
//! panel normal to the beam on a single-axis goniometer.
//!
//! # Conventions
//!
//! - Beam along `-z`: `s0 = (0, 0, -1/λ)`.
//! - Detector plane at `z = -distance`, pixel `x` along lab `+x`, pixel `y`
//!   along lab `+y`.
//! - Diffracted beam `s1 = (lab position normalized) / λ`, scattering vector
//!   `r = s1 − s0`, and the reciprocal lattice point at zero rotation is
//!   `p = R(axis, −φ) · r`.

use nalgebra::{Rotation3, Unit};

use crate::Vector3;

/// One observed spot: panel, pixel centroid and goniometer angle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotObservation {
    pub panel: usize,
    /// Centroid in pixels `[x, y]`.
    pub pixel: [f64; 2],
    /// Goniometer rotation angle at the centroid, radians.
    pub rotation_angle_rad: f64,
}

/// Maps a spot observation to its reciprocal-space point.
pub trait ReciprocalSpaceMapping {
    /// `None` if the observation cannot be placed (unknown panel, ray
    /// parallel to the detector, non-finite input).
    fn pixel_to_reciprocal(&self, obs: &SpotObservation) -> Option<Vector3>;
}

/// Map every observation. Spots the geometry cannot place become the zero
/// vector, which every assigner leaves unindexed.
pub fn map_spots_to_reciprocal_space<M>(observations: &[SpotObservation], mapping: &M) -> Vec<Vector3>
where
    M: ReciprocalSpaceMapping + ?Sized,
{
    observations
        .iter()
        .map(|obs| mapping.pixel_to_reciprocal(obs).unwrap_or_else(Vector3::zeros))
        .collect()
}

/// Single flat panel normal to the beam, single rotation axis.
#[derive(Debug, Clone)]
pub struct FlatDetectorGeometry {
    /// Wavelength, in the same length unit the crystal cells use.
    pub wavelength: f64,
    /// Sample-to-detector distance, mm.
    pub distance_mm: f64,
    /// Pixel pitch, mm.
    pub pixel_size_mm: f64,
    /// Pixel position of the direct beam `[x, y]`.
    pub beam_center_px: [f64; 2],
    /// Goniometer rotation axis (need not be normalized).
    pub rotation_axis: Vector3,
}

impl FlatDetectorGeometry {
    pub fn new(wavelength: f64, distance_mm: f64, pixel_size_mm: f64, beam_center_px: [f64; 2]) -> Self {
        Self {
            wavelength,
            distance_mm,
            pixel_size_mm,
            beam_center_px,
            rotation_axis: Vector3::x(),
        }
    }

    fn s0(&self) -> Vector3 {
        Vector3::new(0.0, 0.0, -1.0 / self.wavelength)
    }
}

impl ReciprocalSpaceMapping for FlatDetectorGeometry {
    fn pixel_to_reciprocal(&self, obs: &SpotObservation) -> Option<Vector3> {
        if obs.panel != 0
            || !obs.pixel.iter().all(|v| v.is_finite())
            || !obs.rotation_angle_rad.is_finite()
            || !(self.wavelength > 0.0)
        {
            return None;
        }
        let x = (obs.pixel[0] - self.beam_center_px[0]) * self.pixel_size_mm;
        let y = (obs.pixel[1] - self.beam_center_px[1]) * self.pixel_size_mm;
        let lab = Vector3::new(x, y, -self.distance_mm);
        let s1 = lab.try_normalize(f64::EPSILON)? / self.wavelength;
        let axis = Unit::try_new(self.rotation_axis, f64::EPSILON)?;
        let unrotate = Rotation3::from_axis_angle(&axis, -obs.rotation_angle_rad);
        Some(unrotate * (s1 - self.s0()))
    }
}
