//! Core data types shared by the detector and the cue simulator.
//!
//! Everything that crosses a module boundary gets a named type here: raw
//! sensor vectors, location fixes, canvas bounds, colors and the render view
//! of a dot. The detector and the simulator never see platform sensor APIs,
//! only these values.

use serde::{Deserialize, Serialize};

/// A raw three-axis sensor reading in device-local units.
///
/// Accelerometer vectors are in m/s², gyroscope vectors in rad/s.
pub type Vec3 = [f32; 3];

/// Euclidean magnitude of a three-axis vector.
pub fn magnitude(v: Vec3) -> f32 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

/// Which physical sensor produced a vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    Accelerometer,
    Gyroscope,
}

/// A single speed observation from the location provider.
///
/// Fixes arrive at an app-controlled, irregular cadence (roughly every
/// 3 to 5 seconds). The timestamp must come from a monotonic clock shared
/// with every other fix fed to the same detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationFix {
    /// Monotonic timestamp in milliseconds.
    pub timestamp_ms: u64,
    /// Ground speed reported by the provider, m/s.
    pub speed_mps: f32,
}

impl LocationFix {
    pub fn new(timestamp_ms: u64, speed_mps: f32) -> Self {
        Self {
            timestamp_ms,
            speed_mps,
        }
    }
}

/// A typed event pushed into the detector by a motion source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorEvent {
    Accelerometer(Vec3),
    Gyroscope(Vec3),
    Location(LocationFix),
}

impl SensorEvent {
    /// The sensor that produced this event, or `None` for location fixes.
    pub fn sensor_kind(&self) -> Option<SensorKind> {
        match self {
            SensorEvent::Accelerometer(_) => Some(SensorKind::Accelerometer),
            SensorEvent::Gyroscope(_) => Some(SensorKind::Gyroscope),
            SensorEvent::Location(_) => None,
        }
    }
}

/// An 8-bit-per-channel color.
///
/// Serialized as a packed `0xAARRGGBB` integer, the layout used by the
/// settings files and by most platform color APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Unpack a `0xAARRGGBB` value.
    pub const fn from_argb(argb: u32) -> Self {
        Self {
            a: (argb >> 24) as u8,
            r: (argb >> 16) as u8,
            g: (argb >> 8) as u8,
            b: argb as u8,
        }
    }

    /// Pack into `0xAARRGGBB`.
    pub const fn to_argb(self) -> u32 {
        ((self.a as u32) << 24) | ((self.r as u32) << 16) | ((self.g as u32) << 8) | self.b as u32
    }
}

impl Serialize for Rgba {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.to_argb())
    }
}

impl<'de> Deserialize<'de> for Rgba {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u32::deserialize(deserializer).map(Rgba::from_argb)
    }
}

/// Drawable area the dots live in, in rendering-resolution-independent units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CanvasBounds {
    pub width: f32,
    pub height: f32,
}

impl CanvasBounds {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// True once the canvas has been measured with a usable size.
    pub fn is_drawable(&self) -> bool {
        self.width > 0.0 && self.height > 0.0 && self.width.is_finite() && self.height.is_finite()
    }
}

/// What the renderer needs to draw one dot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DotRenderState {
    pub position: (f32, f32),
    pub radius: f32,
    pub color: Rgba,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magnitude() {
        assert_eq!(magnitude([3.0, 4.0, 0.0]), 5.0);
        assert_eq!(magnitude([0.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_rgba_argb_packing() {
        let blue = Rgba::from_argb(0xFF00_00FF);
        assert_eq!(blue, Rgba::new(0, 0, 255, 255));
        assert_eq!(blue.to_argb(), 0xFF00_00FF);

        let odd = Rgba::new(0x12, 0x34, 0x56, 0x78);
        assert_eq!(Rgba::from_argb(odd.to_argb()), odd);
    }

    #[test]
    fn test_rgba_serializes_as_packed_integer() {
        let json = serde_json::to_string(&Rgba::from_argb(0xFF00_00FF)).unwrap();
        assert_eq!(json, "4278190335");
        let back: Rgba = serde_json::from_str(&json).unwrap();
        assert_eq!(back.to_argb(), 0xFF00_00FF);
    }

    #[test]
    fn test_canvas_drawable() {
        assert!(CanvasBounds::new(400.0, 300.0).is_drawable());
        assert!(!CanvasBounds::new(0.0, 300.0).is_drawable());
        assert!(!CanvasBounds::new(400.0, -1.0).is_drawable());
        assert!(!CanvasBounds::new(f32::NAN, 300.0).is_drawable());
    }

    #[test]
    fn test_sensor_event_kind() {
        assert_eq!(
            SensorEvent::Accelerometer([0.0; 3]).sensor_kind(),
            Some(SensorKind::Accelerometer)
        );
        assert_eq!(
            SensorEvent::Gyroscope([0.0; 3]).sensor_kind(),
            Some(SensorKind::Gyroscope)
        );
        assert_eq!(SensorEvent::Location(LocationFix::new(0, 1.0)).sensor_kind(), None);
    }
}
