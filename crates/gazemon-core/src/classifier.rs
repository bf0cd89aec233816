//! Gaze classifier: iris landmarks to a discrete gaze direction.
//!
//! The eyes centre (midpoint of both iris centres) is expressed as an offset
//! from the frame centre, normalised by the half-extent of the frame, and
//! run through an ordered decision table.

use crate::types::{GazeDirection, GazeSample, IrisCenters, LandmarkFrame, Point};
use thiserror::Error;

/// Refined FaceMesh indices outlining the left iris.
pub const LEFT_IRIS: [usize; 4] = [474, 475, 476, 477];
/// Refined FaceMesh indices outlining the right iris.
pub const RIGHT_IRIS: [usize; 4] = [469, 470, 471, 472];

/// Default half-extent ratio below which gaze counts as centred.
pub const DEFAULT_CENTER_THRESHOLD: f32 = 0.35;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassifyError {
    #[error("landmark {index} missing: frame has {len} points")]
    MissingLandmark { index: usize, len: usize },
    #[error("invalid frame size {width}x{height}")]
    InvalidFrameSize { width: u32, height: u32 },
}

/// One row of the decision table.
struct Rule {
    matches: fn(x: f32, y: f32, threshold: f32) -> bool,
    direction: GazeDirection,
}

/// Evaluated top to bottom; the first matching row wins. When `|x| == |y|`
/// outside the centre box the horizontal rows do not match, so ties resolve
/// to UP or DOWN.
const DECISION_TABLE: [Rule; 5] = [
    Rule {
        matches: |x, y, t| x.abs() < t && y.abs() < t,
        direction: GazeDirection::Center,
    },
    Rule {
        matches: |x, y, _| x.abs() > y.abs() && x < 0.0,
        direction: GazeDirection::Left,
    },
    Rule {
        matches: |x, y, _| x.abs() > y.abs(),
        direction: GazeDirection::Right,
    },
    Rule {
        matches: |_, y, _| y < 0.0,
        direction: GazeDirection::Up,
    },
    Rule {
        matches: |_, _, _| true,
        direction: GazeDirection::Down,
    },
];

/// Map normalised offsets to a direction.
pub fn direction_for(x_ratio: f32, y_ratio: f32, threshold: f32) -> GazeDirection {
    DECISION_TABLE
        .iter()
        .find(|rule| (rule.matches)(x_ratio, y_ratio, threshold))
        .map(|rule| rule.direction)
        .unwrap_or(GazeDirection::Down)
}

/// Average the two fixed 4-point iris subsets.
pub fn iris_centers(landmarks: &LandmarkFrame) -> Result<IrisCenters, ClassifyError> {
    Ok(IrisCenters {
        left: subset_mean(landmarks, &LEFT_IRIS)?,
        right: subset_mean(landmarks, &RIGHT_IRIS)?,
    })
}

fn subset_mean(landmarks: &LandmarkFrame, indices: &[usize; 4]) -> Result<Point, ClassifyError> {
    let mut points = [Point::default(); 4];
    for (slot, &index) in points.iter_mut().zip(indices.iter()) {
        *slot = landmarks.get(index).ok_or(ClassifyError::MissingLandmark {
            index,
            len: landmarks.len(),
        })?;
    }
    // Non-empty by construction.
    Ok(Point::mean(&points).unwrap_or_default())
}

/// Classifies landmark frames with a fixed centre threshold.
#[derive(Debug, Clone, Copy)]
pub struct GazeClassifier {
    threshold: f32,
}

impl Default for GazeClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_CENTER_THRESHOLD)
    }
}

impl GazeClassifier {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Classify one frame's landmarks. Pure: identical inputs give identical output.
    pub fn classify(
        &self,
        landmarks: &LandmarkFrame,
        frame_width: u32,
        frame_height: u32,
    ) -> Result<GazeSample, ClassifyError> {
        if frame_width == 0 || frame_height == 0 {
            return Err(ClassifyError::InvalidFrameSize {
                width: frame_width,
                height: frame_height,
            });
        }

        let eyes = iris_centers(landmarks)?.eyes_center();
        let half_w = frame_width as f32 / 2.0;
        let half_h = frame_height as f32 / 2.0;

        let x_ratio = ((eyes.x - half_w) / half_w).clamp(-1.0, 1.0);
        let y_ratio = ((eyes.y - half_h) / half_h).clamp(-1.0, 1.0);

        let direction = direction_for(x_ratio, y_ratio, self.threshold);
        Ok(GazeSample::new(direction, x_ratio, y_ratio))
    }
}

/// Classify with the default threshold.
pub fn classify(
    landmarks: &LandmarkFrame,
    frame_width: u32,
    frame_height: u32,
) -> Result<GazeSample, ClassifyError> {
    GazeClassifier::default().classify(landmarks, frame_width, frame_height)
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: u32 = 640;
    const H: u32 = 480;

    /// Build a 478-point frame whose irises both sit at `(x, y)`.
    fn frame_with_eyes_at(x: f32, y: f32) -> LandmarkFrame {
        let mut points = vec![Point::default(); 478];
        for &i in LEFT_IRIS.iter().chain(RIGHT_IRIS.iter()) {
            points[i] = Point::new(x, y);
        }
        LandmarkFrame::new(points)
    }

    /// Eyes centre placed at the given normalised offsets.
    fn frame_at_ratio(xr: f32, yr: f32) -> LandmarkFrame {
        let hw = W as f32 / 2.0;
        let hh = H as f32 / 2.0;
        frame_with_eyes_at(hw + xr * hw, hh + yr * hh)
    }

    #[test]
    fn test_center() {
        let s = classify(&frame_at_ratio(0.1, -0.2), W, H).unwrap();
        assert_eq!(s.direction, GazeDirection::Center);
        assert!(s.is_focused);
        assert!((s.x_ratio - 0.1).abs() < 1e-4);
        assert!((s.y_ratio + 0.2).abs() < 1e-4);
    }

    #[test]
    fn test_left_and_right() {
        assert_eq!(classify(&frame_at_ratio(-0.6, 0.1), W, H).unwrap().direction, GazeDirection::Left);
        assert_eq!(classify(&frame_at_ratio(0.6, 0.1), W, H).unwrap().direction, GazeDirection::Right);
    }

    #[test]
    fn test_up_and_down() {
        assert_eq!(classify(&frame_at_ratio(0.1, -0.6), W, H).unwrap().direction, GazeDirection::Up);
        assert_eq!(classify(&frame_at_ratio(0.1, 0.6), W, H).unwrap().direction, GazeDirection::Down);
    }

    #[test]
    fn test_tie_resolves_vertical() {
        assert_eq!(direction_for(0.5, 0.5, 0.35), GazeDirection::Down);
        assert_eq!(direction_for(-0.5, -0.5, 0.35), GazeDirection::Up);
        assert_eq!(direction_for(-0.5, 0.5, 0.35), GazeDirection::Down);
    }

    #[test]
    fn test_threshold_boundary_is_not_center() {
        assert_eq!(direction_for(0.35, 0.0, 0.35), GazeDirection::Right);
        assert_eq!(direction_for(0.0, -0.35, 0.35), GazeDirection::Up);
        assert_eq!(direction_for(0.3499, 0.3499, 0.35), GazeDirection::Center);
    }

    #[test]
    fn test_one_axis_inside_box_still_off_center() {
        // x inside, y outside: vertical wins because |y| > |x|.
        assert_eq!(direction_for(0.2, 0.4, 0.35), GazeDirection::Down);
    }

    #[test]
    fn test_iris_center_is_mean_of_subset() {
        let mut points = vec![Point::default(); 478];
        let offsets = [(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0)];
        for (&i, &(dx, dy)) in LEFT_IRIS.iter().zip(offsets.iter()) {
            points[i] = Point::new(100.0 + dx, 200.0 + dy);
        }
        for (&i, &(dx, dy)) in RIGHT_IRIS.iter().zip(offsets.iter()) {
            points[i] = Point::new(300.0 + dx, 200.0 + dy);
        }
        let centers = iris_centers(&LandmarkFrame::new(points)).unwrap();
        assert_eq!(centers.left, Point::new(102.0, 202.0));
        assert_eq!(centers.right, Point::new(302.0, 202.0));
        assert_eq!(centers.eyes_center(), Point::new(202.0, 202.0));
    }

    #[test]
    fn test_classify_is_pure() {
        let f = frame_at_ratio(-0.42, 0.17);
        let a = classify(&f, W, H).unwrap();
        let b = classify(&f, W, H).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_short_landmark_frame_errors() {
        let f = LandmarkFrame::new(vec![Point::default(); 470]);
        let err = classify(&f, W, H).unwrap_err();
        assert_eq!(err, ClassifyError::MissingLandmark { index: 474, len: 470 });
    }

    #[test]
    fn test_zero_frame_size_errors() {
        let f = frame_with_eyes_at(0.0, 0.0);
        assert!(matches!(
            classify(&f, 0, H),
            Err(ClassifyError::InvalidFrameSize { .. })
        ));
    }

    #[test]
    fn test_custom_threshold() {
        let strict = GazeClassifier::new(0.1);
        let s = strict.classify(&frame_at_ratio(0.2, 0.0), W, H).unwrap();
        assert_eq!(s.direction, GazeDirection::Right);
        assert_eq!(strict.threshold(), 0.1);
    }
}
