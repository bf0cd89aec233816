//! Frame type and raw-buffer conversion to 8-bit grayscale.

use std::time::Instant;

/// A captured grayscale camera frame.
#[derive(Clone)]
pub struct Frame {
    /// Grayscale pixel data (width * height bytes). Empty for frames
    /// replayed from a landmark recording.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
    pub sequence: u32,
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .field("bytes", &self.data.len())
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("{format:?} buffer too short: expected {expected} bytes, got {actual}")]
    InvalidLength {
        format: PixelFormat,
        expected: usize,
        actual: usize,
    },
}

/// Pixel layouts the capture path can turn into grayscale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Packed 4:2:2, `[Y0, U, Y1, V]` per two pixels.
    Yuyv,
    /// 8-bit luma.
    Grey,
    /// 16-bit little-endian luma.
    Y16,
}

impl PixelFormat {
    /// Match a V4L2 FourCC code.
    pub fn from_fourcc(code: &[u8; 4]) -> Option<Self> {
        match code {
            b"YUYV" => Some(PixelFormat::Yuyv),
            b"GREY" => Some(PixelFormat::Grey),
            b"Y16 " | b"Y16\0" => Some(PixelFormat::Y16),
            _ => None,
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Grey => 1,
            PixelFormat::Yuyv | PixelFormat::Y16 => 2,
        }
    }

    /// Convert one `width x height` image to grayscale. Trailing bytes past
    /// the image (driver padding) are ignored.
    pub fn to_grayscale(self, buf: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
        let expected = width as usize * height as usize * self.bytes_per_pixel();
        if buf.len() < expected {
            return Err(FrameError::InvalidLength {
                format: self,
                expected,
                actual: buf.len(),
            });
        }
        let image = &buf[..expected];
        Ok(match self {
            PixelFormat::Grey => image.to_vec(),
            PixelFormat::Yuyv => image.iter().step_by(2).copied().collect(),
            // High byte of each little-endian sample.
            PixelFormat::Y16 => image.chunks_exact(2).map(|px| px[1]).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_lookup() {
        assert_eq!(PixelFormat::from_fourcc(b"YUYV"), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::from_fourcc(b"GREY"), Some(PixelFormat::Grey));
        assert_eq!(PixelFormat::from_fourcc(b"Y16 "), Some(PixelFormat::Y16));
        assert_eq!(PixelFormat::from_fourcc(b"MJPG"), None);
    }

    #[test]
    fn test_yuyv_extracts_luma() {
        let yuyv = [100, 128, 200, 128];
        assert_eq!(PixelFormat::Yuyv.to_grayscale(&yuyv, 2, 1).unwrap(), vec![100, 200]);
    }

    #[test]
    fn test_y16_keeps_high_byte() {
        let y16 = [0xFF, 0x12, 0x01, 0x80];
        assert_eq!(PixelFormat::Y16.to_grayscale(&y16, 2, 1).unwrap(), vec![0x12, 0x80]);
    }

    #[test]
    fn test_grey_ignores_padding() {
        let gray = PixelFormat::Grey.to_grayscale(&[1, 2, 3, 4, 5, 6], 2, 2).unwrap();
        assert_eq!(gray, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_short_buffer_rejected() {
        match PixelFormat::Yuyv.to_grayscale(&[100, 128], 2, 1) {
            Err(FrameError::InvalidLength { expected, actual, .. }) => {
                assert_eq!((expected, actual), (4, 2));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_debug_omits_pixels() {
        let f = Frame {
            data: vec![0; 12],
            width: 4,
            height: 3,
            timestamp: Instant::now(),
            sequence: 7,
        };
        let s = format!("{f:?}");
        assert!(s.contains("bytes: 12"));
        assert!(s.contains("sequence: 7"));
    }
}
