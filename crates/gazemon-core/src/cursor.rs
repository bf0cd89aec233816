//! Gaze-to-cursor mapping.
//!
//! Two mappings from a camera-space eyes centre to a screen position:
//! a centre-relative one with a dead zone and a sensitivity gain, and a
//! calibrated linear range mapping. Both clamp to the screen bounds.
//! Nothing here posts input events.

use crate::types::Point;

/// Sensitivity at which the centre-relative mapping has unit gain.
pub const BASE_SENSITIVITY: f32 = 600.0;

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CursorMapper {
    /// Gain applied to the offset from screen centre; 600 leaves it unchanged.
    pub sensitivity: f32,
    /// Half-width of the square around the frame centre (in normalised
    /// units) where the cursor is left alone.
    pub dead_zone: f32,
}

impl Default for CursorMapper {
    fn default() -> Self {
        Self {
            sensitivity: BASE_SENSITIVITY,
            dead_zone: 0.1,
        }
    }
}

impl CursorMapper {
    /// Map the eyes centre to a screen position, or `None` inside the dead zone.
    pub fn map(&self, eyes_center: Point, frame: Size, screen: Size) -> Option<(i32, i32)> {
        if frame.width == 0 || frame.height == 0 {
            return None;
        }
        let x_norm = eyes_center.x / frame.width as f32;
        let y_norm = eyes_center.y / frame.height as f32;

        if (x_norm - 0.5).abs() < self.dead_zone && (y_norm - 0.5).abs() < self.dead_zone {
            return None;
        }

        let sw = screen.width as i32;
        let sh = screen.height as i32;
        let center_x = sw / 2;
        let center_y = sh / 2;

        let dx = (x_norm * screen.width as f32) as i32 - center_x;
        let dy = (y_norm * screen.height as f32) as i32 - center_y;
        let gain = self.sensitivity / BASE_SENSITIVITY;

        let x = (center_x + (dx as f32 * gain) as i32).clamp(0, sw);
        let y = (center_y + (dy as f32 * gain) as i32).clamp(0, sh);
        Some((x, y))
    }
}

/// Linear camera-range to screen mapping, calibrated to the span of
/// eye positions observed while looking at the screen edges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibratedMapping {
    pub eye_min_x: f32,
    pub eye_max_x: f32,
    pub eye_min_y: f32,
    pub eye_max_y: f32,
}

impl Default for CalibratedMapping {
    fn default() -> Self {
        Self {
            eye_min_x: 180.0,
            eye_max_x: 430.0,
            eye_min_y: 130.0,
            eye_max_y: 300.0,
        }
    }
}

impl CalibratedMapping {
    pub fn map(&self, eye: Point, screen: Size) -> (i32, i32) {
        let sx = map_value(eye.x, self.eye_min_x, self.eye_max_x, 0.0, screen.width as f32);
        let sy = map_value(eye.y, self.eye_min_y, self.eye_max_y, 0.0, screen.height as f32);
        (
            sx.clamp(0.0, screen.width as f32) as i32,
            sy.clamp(0.0, screen.height as f32) as i32,
        )
    }
}

/// Linear interpolation of `v` from `[in_min, in_max]` onto `[out_min, out_max]`.
/// A degenerate input range maps everything to `out_min`.
pub fn map_value(v: f32, in_min: f32, in_max: f32, out_min: f32, out_max: f32) -> f32 {
    let span = in_max - in_min;
    if span == 0.0 {
        return out_min;
    }
    out_min + (v - in_min) * (out_max - out_min) / span
}
