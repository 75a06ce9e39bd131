//! Landmark tracking collaborator
//!
//! Pose inference runs outside this crate. A [`Tracker`] only exposes the
//! latest per-person landmark sets in normalized video coordinates. Tracker
//! hiccups (model not ready, zero detections) are never fatal per frame; they
//! simply yield no landmark forcing.

use thiserror::Error;

use crate::video::VideoInfo;

/// Pose landmark indices (33-point body model)
pub mod pose {
    pub const NOSE: usize = 0;
    pub const LEFT_SHOULDER: usize = 11;
    pub const RIGHT_SHOULDER: usize = 12;
    pub const LEFT_ELBOW: usize = 13;
    pub const RIGHT_ELBOW: usize = 14;
    pub const LEFT_WRIST: usize = 15;
    pub const RIGHT_WRIST: usize = 16;
    pub const LEFT_INDEX: usize = 19;
    pub const RIGHT_INDEX: usize = 20;
    pub const LANDMARK_COUNT: usize = 33;
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TrackerError {
    #[error("tracker used before init")]
    NotInitialized,
    #[error("tracking model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("invalid landmark recording: {0}")]
    InvalidRecording(String),
}

/// One tracked point in normalized video space, origin top-left
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    /// Detection confidence in `[0, 1]`.
    pub visibility: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, visibility: f32) -> Self {
        Self { x, y, visibility }
    }
}

/// All landmarks of one person for the current frame
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    /// Stable person index assigned by the tracker.
    pub person: usize,
    pub landmarks: Vec<Landmark>,
}

impl LandmarkSet {
    pub fn new(person: usize, landmarks: Vec<Landmark>) -> Self {
        Self { person, landmarks }
    }

    /// Full pose with every point invisible, then the given points filled in
    pub fn with_points(person: usize, points: &[(usize, Landmark)]) -> Self {
        let mut landmarks = vec![Landmark::new(0.0, 0.0, 0.0); pose::LANDMARK_COUNT];
        for &(index, landmark) in points {
            if let Some(slot) = landmarks.get_mut(index) {
                *slot = landmark;
            }
        }
        Self { person, landmarks }
    }
}

/// Source of per-frame landmark sets
pub trait Tracker {
    /// Prepare for a feed of the given size
    fn init(&mut self, video: &VideoInfo) -> Result<(), TrackerError>;

    /// Advance inference by one frame
    fn update(&mut self) -> Result<(), TrackerError>;

    /// Landmark sets for the current frame; may be empty
    fn landmarks(&self) -> &[LandmarkSet];

    /// Release the model; must tolerate repeated calls
    fn destroy(&mut self);
}

/// Tracker that never detects anyone
#[derive(Debug, Default)]
pub struct NullTracker;

impl Tracker for NullTracker {
    fn init(&mut self, _video: &VideoInfo) -> Result<(), TrackerError> {
        Ok(())
    }

    fn update(&mut self) -> Result<(), TrackerError> {
        Ok(())
    }

    fn landmarks(&self) -> &[LandmarkSet] {
        &[]
    }

    fn destroy(&mut self) {}
}

/// Plays back a recorded landmark sequence, one recorded frame per update
#[derive(Debug, Clone)]
pub struct RecordedTracker {
    frames: Vec<Vec<LandmarkSet>>,
    cursor: Option<usize>,
    ready: bool,
    looping: bool,
}

impl RecordedTracker {
    pub fn new(frames: Vec<Vec<LandmarkSet>>) -> Self {
        Self {
            frames,
            cursor: None,
            ready: false,
            looping: true,
        }
    }

    /// Stop on the last frame instead of wrapping around
    pub fn without_looping(mut self) -> Self {
        self.looping = false;
        self
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl Tracker for RecordedTracker {
    fn init(&mut self, video: &VideoInfo) -> Result<(), TrackerError> {
        let bad = self
            .frames
            .iter()
            .flatten()
            .flat_map(|set| &set.landmarks)
            .any(|l| !l.x.is_finite() || !l.y.is_finite() || !l.visibility.is_finite());
        if bad {
            return Err(TrackerError::InvalidRecording(
                "non-finite landmark coordinate".to_string(),
            ));
        }
        self.cursor = None;
        self.ready = true;
        log::info!(
            "Recorded tracker ready: {} frames for a {}x{} feed",
            self.frames.len(),
            video.width,
            video.height
        );
        Ok(())
    }

    fn update(&mut self) -> Result<(), TrackerError> {
        if !self.ready {
            return Err(TrackerError::NotInitialized);
        }
        if self.frames.is_empty() {
            return Ok(());
        }
        let last = self.frames.len() - 1;
        self.cursor = Some(match self.cursor {
            None => 0,
            Some(i) if i < last => i + 1,
            Some(_) if self.looping => 0,
            Some(i) => i,
        });
        Ok(())
    }

    fn landmarks(&self) -> &[LandmarkSet] {
        match self.cursor {
            Some(i) if self.ready => &self.frames[i],
            _ => &[],
        }
    }

    fn destroy(&mut self) {
        self.ready = false;
        self.cursor = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(person: usize, x: f32) -> Vec<LandmarkSet> {
        vec![LandmarkSet::with_points(
            person,
            &[(pose::LEFT_WRIST, Landmark::new(x, 0.5, 1.0))],
        )]
    }

    #[test]
    fn test_recording_loops() {
        let mut tracker = RecordedTracker::new(vec![frame(0, 0.1), frame(0, 0.2)]);
        assert_eq!(tracker.update(), Err(TrackerError::NotInitialized));
        tracker.init(&VideoInfo::new(640, 480)).unwrap();
        assert!(tracker.landmarks().is_empty());

        let xs: Vec<f32> = (0..3)
            .map(|_| {
                tracker.update().unwrap();
                tracker.landmarks()[0].landmarks[pose::LEFT_WRIST].x
            })
            .collect();
        assert_eq!(xs, vec![0.1, 0.2, 0.1]);
    }

    #[test]
    fn test_destroy_clears_output() {
        let mut tracker = RecordedTracker::new(vec![frame(3, 0.4)]).without_looping();
        tracker.init(&VideoInfo::default()).unwrap();
        tracker.update().unwrap();
        tracker.update().unwrap();
        assert_eq!(tracker.landmarks()[0].person, 3);
        tracker.destroy();
        tracker.destroy();
        assert!(tracker.landmarks().is_empty());
    }

    #[test]
    fn test_rejects_non_finite_recording() {
        let mut tracker = RecordedTracker::new(vec![frame(0, f32::NAN)]);
        assert!(matches!(
            tracker.init(&VideoInfo::default()),
            Err(TrackerError::InvalidRecording(_))
        ));
    }
}
