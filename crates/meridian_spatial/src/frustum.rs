//! View frustum and box clipping.
//!
//! Extracts frustum planes from the view-projection matrix and classifies
//! boxes against them. The four side planes are kept in structure-of-arrays
//! form so one box is tested against all of them in 4-wide lanes.

use bytemuck::{Pod, Zeroable};
use meridian_shared::Vec3;

/// A plane in 3D space (Ax + By + Cz + D = 0), positive side inside.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Plane {
    /// Normal X component.
    pub a: f32,
    /// Normal Y component.
    pub b: f32,
    /// Normal Z component.
    pub c: f32,
    /// Distance from origin.
    pub d: f32,
}

impl Plane {
    /// Creates a new plane.
    #[must_use]
    pub const fn new(a: f32, b: f32, c: f32, d: f32) -> Self {
        Self { a, b, c, d }
    }

    /// Normalizes the plane.
    #[must_use]
    pub fn normalized(self) -> Self {
        let len = (self.a * self.a + self.b * self.b + self.c * self.c).sqrt();
        if len > 0.0 {
            Self {
                a: self.a / len,
                b: self.b / len,
                c: self.c / len,
                d: self.d / len,
            }
        } else {
            self
        }
    }

    /// Returns the signed distance from a point to the plane.
    #[inline]
    #[must_use]
    pub fn distance_to_point(&self, p: Vec3) -> f32 {
        self.a * p.x + self.b * p.y + self.c * p.z + self.d
    }

    /// Projection radius of a box with half extents `extent` onto the normal.
    #[inline]
    #[must_use]
    pub fn projected_radius(&self, extent: Vec3) -> f32 {
        extent.x * self.a.abs() + extent.y * self.b.abs() + extent.z * self.c.abs()
    }
}

/// Result of clipping a box against a frustum.
///
/// Encoded as two bits: bit 0 "has a part inside", bit 1 "has a part
/// outside".
#[repr(u8)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ClipStatus {
    /// Not classified yet.
    #[default]
    Untested = 0,
    /// Completely inside.
    Inside = 1,
    /// Completely outside.
    Outside = 2,
    /// Straddles at least one plane.
    Partial = 3,
}

impl ClipStatus {
    /// Builds a status from its two-bit encoding.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 3 {
            1 => Self::Inside,
            2 => Self::Outside,
            3 => Self::Partial,
            _ => Self::Untested,
        }
    }

    /// Two-bit encoding.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u8 {
        self as u8
    }

    /// True if the whole box is on one side, so children share the status.
    #[inline]
    #[must_use]
    pub const fn is_settled(self) -> bool {
        matches!(self, Self::Inside | Self::Outside)
    }

    /// True if any part may be visible.
    #[inline]
    #[must_use]
    pub const fn is_visible(self) -> bool {
        self.bits() & 1 != 0
    }
}

/// View frustum for culling.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Frustum {
    /// Left, right, bottom, top, near, far planes.
    planes: [Plane; 6],
    // Side planes in 4-wide lanes
    lrbt_nx: [f32; 4],
    lrbt_ny: [f32; 4],
    lrbt_nz: [f32; 4],
    lrbt_w: [f32; 4],
}

impl Frustum {
    /// Plane indices.
    pub const LEFT: usize = 0;
    /// Right plane index.
    pub const RIGHT: usize = 1;
    /// Bottom plane index.
    pub const BOTTOM: usize = 2;
    /// Top plane index.
    pub const TOP: usize = 3;
    /// Near plane index.
    pub const NEAR: usize = 4;
    /// Far plane index.
    pub const FAR: usize = 5;

    /// Builds a frustum from six inward-facing planes in
    /// left, right, bottom, top, near, far order.
    #[must_use]
    pub fn from_planes(planes: [Plane; 6]) -> Self {
        let mut frustum = Self {
            planes,
            ..Self::default()
        };
        for (lane, plane) in planes.iter().take(4).enumerate() {
            frustum.lrbt_nx[lane] = plane.a;
            frustum.lrbt_ny[lane] = plane.b;
            frustum.lrbt_nz[lane] = plane.c;
            frustum.lrbt_w[lane] = plane.d;
        }
        frustum
    }

    /// Extracts frustum planes from a view-projection matrix
    /// (Gribb-Hartmann).
    ///
    /// The matrix should be in column-major order (OpenGL/WGPU convention).
    #[must_use]
    pub fn from_view_projection(m: &[[f32; 4]; 4]) -> Self {
        // Row `r` combined with row 3 as `row3 + sign * row_r`
        let combine = |r: usize, sign: f32| {
            Plane::new(
                m[0][3] + sign * m[0][r],
                m[1][3] + sign * m[1][r],
                m[2][3] + sign * m[2][r],
                m[3][3] + sign * m[3][r],
            )
            .normalized()
        };

        Self::from_planes([
            combine(0, 1.0),
            combine(0, -1.0),
            combine(1, 1.0),
            combine(1, -1.0),
            combine(2, 1.0),
            combine(2, -1.0),
        ])
    }

    /// All six planes.
    #[must_use]
    pub const fn planes(&self) -> &[Plane; 6] {
        &self.planes
    }

    /// Classifies the box `center ± extent`.
    ///
    /// Only the four side planes are tested unless `test_near_far` is set.
    /// A box touching a plane from inside counts as inside.
    #[inline]
    #[must_use]
    pub fn clip_box(&self, center: Vec3, extent: Vec3, test_near_far: bool) -> ClipStatus {
        let mut distance = [0.0f32; 4];
        let mut radius = [0.0f32; 4];
        for lane in 0..4 {
            distance[lane] = center.x * self.lrbt_nx[lane]
                + center.y * self.lrbt_ny[lane]
                + center.z * self.lrbt_nz[lane]
                + self.lrbt_w[lane];
            radius[lane] = extent.x * self.lrbt_nx[lane].abs()
                + extent.y * self.lrbt_ny[lane].abs()
                + extent.z * self.lrbt_nz[lane].abs();
        }

        let mut has_visible = distance.iter().zip(&radius).all(|(d, r)| *d >= -*r);
        let mut has_invisible = distance.iter().zip(&radius).any(|(d, r)| *d < *r);

        if test_near_far && has_visible {
            for plane in &self.planes[Self::NEAR..=Self::FAR] {
                let d = plane.distance_to_point(center);
                let r = plane.projected_radius(extent);
                has_visible &= d >= -r;
                has_invisible |= d < r;
            }
        }

        ClipStatus::from_bits(u8::from(has_visible) | (u8::from(has_invisible) << 1))
    }
}
