use serde::{Deserialize, Serialize};
use std::fmt;

/// 2D point in frame-pixel coordinates. Serialized as `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f32; 2]", into = "[f32; 2]")]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Arithmetic mean of a set of points. Returns `None` for an empty set.
    pub fn mean(points: &[Point]) -> Option<Point> {
        if points.is_empty() {
            return None;
        }
        let n = points.len() as f32;
        let (sx, sy) = points
            .iter()
            .fold((0.0f32, 0.0f32), |(sx, sy), p| (sx + p.x, sy + p.y));
        Some(Point::new(sx / n, sy / n))
    }

    pub fn midpoint(self, other: Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

impl From<[f32; 2]> for Point {
    fn from([x, y]: [f32; 2]) -> Self {
        Point::new(x, y)
    }
}

impl From<Point> for [f32; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

/// Face landmarks for one video frame, indexed by the refined 478-point
/// FaceMesh scheme.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkFrame {
    pub points: Vec<Point>,
}

impl LandmarkFrame {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Point> {
        self.points.get(index).copied()
    }
}

impl From<Vec<[f32; 2]>> for LandmarkFrame {
    fn from(raw: Vec<[f32; 2]>) -> Self {
        Self::new(raw.into_iter().map(Point::from).collect())
    }
}

/// Centres of the left and right iris.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IrisCenters {
    pub left: Point,
    pub right: Point,
}

impl IrisCenters {
    /// Midpoint between the two irises.
    pub fn eyes_center(&self) -> Point {
        self.left.midpoint(self.right)
    }
}

/// Discrete gaze direction relative to the frame centre.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GazeDirection {
    #[default]
    Center,
    Left,
    Right,
    Up,
    Down,
}

impl GazeDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            GazeDirection::Center => "CENTER",
            GazeDirection::Left => "LEFT",
            GazeDirection::Right => "RIGHT",
            GazeDirection::Up => "UP",
            GazeDirection::Down => "DOWN",
        }
    }
}

impl fmt::Display for GazeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-frame classification result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazeSample {
    pub direction: GazeDirection,
    /// True iff `direction == Center`.
    pub is_focused: bool,
    /// Horizontal offset of the eyes centre from the frame centre, in [-1, 1].
    pub x_ratio: f32,
    /// Vertical offset of the eyes centre from the frame centre, in [-1, 1].
    pub y_ratio: f32,
}

impl GazeSample {
    pub fn new(direction: GazeDirection, x_ratio: f32, y_ratio: f32) -> Self {
        Self {
            direction,
            is_focused: direction == GazeDirection::Center,
            x_ratio: x_ratio.clamp(-1.0, 1.0),
            y_ratio: y_ratio.clamp(-1.0, 1.0),
        }
    }
}
