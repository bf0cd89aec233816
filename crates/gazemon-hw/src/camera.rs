//! V4L2 capture for the live monitor.

use crate::frame::{Frame, FrameError, PixelFormat};
use crate::source::{FrameSource, SourceError};
use std::path::Path;
use std::time::Instant;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// The oracle only needs the eye region resolvable; the driver may pick
/// something close instead.
const PREFERRED_SIZE: (u32, u32) = (640, 480);
const STREAM_BUFFERS: u32 = 4;
const MAX_PROBED_NODES: u32 = 16;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("no such device: {0}")]
    NotFound(String),
    #[error("cannot open {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },
    #[error("{0} is not a video capture device")]
    NotCapture(String),
    #[error("format negotiation failed: {0}")]
    Format(String),
    #[error("stream error: {0}")]
    Stream(std::io::Error),
    #[error(transparent)]
    Convert(#[from] FrameError),
}

/// A capture-capable `/dev/video*` node.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Open V4L2 device with a negotiated grayscale-convertible format.
///
/// The mmap stream is started on the first frame and kept for the life of
/// the camera, so steady-state capture is a single dequeue.
pub struct Camera {
    device: Device,
    stream: Option<MmapStream<'static>>,
    path: String,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    sequence: u32,
}

impl Camera {
    pub fn open(path: &str) -> Result<Self, CameraError> {
        if !Path::new(path).exists() {
            return Err(CameraError::NotFound(path.to_string()));
        }
        let device = Device::with_path(path).map_err(|source| CameraError::Open {
            path: path.to_string(),
            source,
        })?;
        let caps = device.query_caps().map_err(|source| CameraError::Open {
            path: path.to_string(),
            source,
        })?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::NotCapture(path.to_string()));
        }

        let (width, height, format) = negotiate(&device)?;
        tracing::info!(
            device = path,
            card = %caps.card,
            width,
            height,
            format = ?format,
            "camera ready"
        );

        Ok(Self {
            device,
            stream: None,
            path: path.to_string(),
            width,
            height,
            format,
            sequence: 0,
        })
    }

    /// Dequeue one buffer and convert it to grayscale.
    pub fn capture(&mut self) -> Result<Frame, CameraError> {
        if self.stream.is_none() {
            let stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, STREAM_BUFFERS)
                .map_err(CameraError::Stream)?;
            tracing::debug!(device = %self.path, buffers = STREAM_BUFFERS, "capture stream started");
            self.stream = Some(stream);
        }
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| CameraError::Stream(std::io::Error::other("stream not started")))?;

        let (buf, _meta) = stream.next().map_err(CameraError::Stream)?;
        let timestamp = Instant::now();
        let data = self.format.to_grayscale(buf, self.width, self.height)?;

        // Driver sequence numbers can jump on dropped buffers; ours stay dense.
        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);

        Ok(Frame {
            data,
            width: self.width,
            height: self.height,
            timestamp,
            sequence,
        })
    }

    /// Enumerate `/dev/video0..15`, keeping capture-capable nodes.
    pub fn list_devices() -> Vec<DeviceInfo> {
        (0..MAX_PROBED_NODES)
            .map(|i| format!("/dev/video{i}"))
            .filter(|path| Path::new(path).exists())
            .filter_map(|path| {
                let caps = Device::with_path(&path).ok()?.query_caps().ok()?;
                caps.capabilities
                    .contains(v4l::capability::Flags::VIDEO_CAPTURE)
                    .then(|| DeviceInfo {
                        path,
                        name: caps.card,
                        driver: caps.driver,
                        bus: caps.bus,
                    })
            })
            .collect()
    }
}

/// Ask for YUYV at the preferred size and accept whatever convertible
/// format the driver settles on.
fn negotiate(device: &Device) -> Result<(u32, u32, PixelFormat), CameraError> {
    let mut fmt = device
        .format()
        .map_err(|e| CameraError::Format(format!("query failed: {e}")))?;
    fmt.fourcc = FourCC::new(b"YUYV");
    (fmt.width, fmt.height) = PREFERRED_SIZE;

    let got = device
        .set_format(&fmt)
        .map_err(|e| CameraError::Format(format!("set failed: {e}")))?;
    let format = PixelFormat::from_fourcc(&got.fourcc.repr).ok_or_else(|| {
        CameraError::Format(format!("driver chose {}, need YUYV, GREY or Y16", got.fourcc))
    })?;
    if (got.width, got.height) != PREFERRED_SIZE {
        tracing::debug!(width = got.width, height = got.height, "driver adjusted frame size");
    }
    Ok((got.width, got.height, format))
}

impl FrameSource for Camera {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        Ok(Some(self.capture()?))
    }

    fn describe(&self) -> String {
        format!("camera {} ({}x{} {:?})", self.path, self.width, self.height, self.format)
    }
}
