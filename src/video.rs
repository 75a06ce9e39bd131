//! Passthrough video collaborator
//!
//! Video acquisition and decoding live outside this crate. A [`VideoSource`]
//! only has to report its frame size and hand over the latest RGBA8 frame.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum VideoError {
    #[error("video frame is {found} bytes, expected {expected} for {width}x{height} RGBA8")]
    InvalidFrame {
        width: u32,
        height: u32,
        expected: usize,
        found: usize,
    },
    #[error("video source unavailable: {0}")]
    Unavailable(String),
}

/// Dimensions of the video feed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
}

impl VideoInfo {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when there is no picture to place (no video attached)
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect(&self) -> Option<f32> {
        (!self.is_empty()).then(|| self.width as f32 / self.height as f32)
    }
}

/// One RGBA8 frame, row 0 at the top
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, VideoError> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected || expected == 0 {
            return Err(VideoError::InvalidFrame {
                width,
                height,
                expected,
                found: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Opaque frame of a single colour
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Diagonal gradient backdrop, handy when no camera is attached
    pub fn gradient(width: u32, height: u32) -> Self {
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
        for y in 0..height {
            for x in 0..width {
                let u = x as f32 / width.max(1) as f32;
                let v = y as f32 / height.max(1) as f32;
                pixels.extend_from_slice(&[
                    (40.0 + 60.0 * u) as u8,
                    (30.0 + 50.0 * v) as u8,
                    (70.0 + 80.0 * (1.0 - u)) as u8,
                    255,
                ]);
            }
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn info(&self) -> VideoInfo {
        VideoInfo::new(self.width, self.height)
    }

    /// RGBA of pixel `(x, y)` as floats in `[0, 1]`
    pub fn texel(&self, x: u32, y: u32) -> [f32; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        let p = &self.pixels[i..i + 4];
        [
            p[0] as f32 / 255.0,
            p[1] as f32 / 255.0,
            p[2] as f32 / 255.0,
            p[3] as f32 / 255.0,
        ]
    }
}

/// Supplier of passthrough video frames
pub trait VideoSource {
    /// Start the feed and report its frame size
    fn open(&mut self) -> Result<VideoInfo, VideoError>;

    /// Latest frame, if one is available this tick
    fn current_frame(&mut self) -> Option<&VideoFrame>;

    /// Stop the feed; must tolerate repeated calls
    fn close(&mut self);
}

/// No passthrough video; the compositor shows the simulation alone
#[derive(Debug, Default)]
pub struct NoVideo;

impl VideoSource for NoVideo {
    fn open(&mut self) -> Result<VideoInfo, VideoError> {
        Ok(VideoInfo::default())
    }

    fn current_frame(&mut self) -> Option<&VideoFrame> {
        None
    }

    fn close(&mut self) {}
}

/// A fixed frame, optionally replaced by the host between ticks
#[derive(Debug)]
pub struct StaticVideo {
    frame: VideoFrame,
    open: bool,
}

impl StaticVideo {
    pub fn new(frame: VideoFrame) -> Self {
        Self { frame, open: false }
    }

    /// Swap in a new frame; its size must match the current one
    pub fn set_frame(&mut self, frame: VideoFrame) -> Result<(), VideoError> {
        if frame.info() != self.frame.info() {
            return Err(VideoError::InvalidFrame {
                width: self.frame.width,
                height: self.frame.height,
                expected: self.frame.pixels.len(),
                found: frame.pixels.len(),
            });
        }
        self.frame = frame;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.open
    }
}

impl VideoSource for StaticVideo {
    fn open(&mut self) -> Result<VideoInfo, VideoError> {
        let info = self.frame.info();
        let expected = info.width as usize * info.height as usize * 4;
        if info.is_empty() || self.frame.pixels.len() != expected {
            return Err(VideoError::InvalidFrame {
                width: info.width,
                height: info.height,
                expected,
                found: self.frame.pixels.len(),
            });
        }
        self.open = true;
        log::info!("Static video opened at {}x{}", info.width, info.height);
        Ok(info)
    }

    fn current_frame(&mut self) -> Option<&VideoFrame> {
        self.open.then_some(&self.frame)
    }

    fn close(&mut self) {
        if self.open {
            log::debug!("Static video closed");
        }
        self.open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_length_is_checked() {
        assert!(VideoFrame::new(2, 2, vec![0; 16]).is_ok());
        assert!(matches!(
            VideoFrame::new(2, 2, vec![0; 15]),
            Err(VideoError::InvalidFrame { expected: 16, .. })
        ));
    }

    #[test]
    fn test_static_video_lifecycle() {
        let mut video = StaticVideo::new(VideoFrame::solid(4, 2, [255, 0, 0, 255]));
        assert!(video.current_frame().is_none());
        assert_eq!(video.open().unwrap(), VideoInfo::new(4, 2));
        assert_eq!(video.current_frame().unwrap().texel(3, 1), [1.0, 0.0, 0.0, 1.0]);
        video.close();
        video.close();
        assert!(video.current_frame().is_none());
    }

    #[test]
    fn test_no_video_is_empty() {
        let mut video = NoVideo;
        assert!(video.open().unwrap().is_empty());
        assert!(video.current_frame().is_none());
    }
}
