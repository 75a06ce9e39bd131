use std::collections::{HashMap, HashSet};

use cgmath::{Vector2, Zero};

use super::pointer::PointerMotion;
use super::transform::CoordinateTransform;
use super::{clamp_speed, ForcingSample, ForcingSource};
use crate::config::{LandmarkSettings, PointerSettings, SimulationParameters};
use crate::simulation::program::MAX_FORCING_SAMPLES;
use crate::tracking::LandmarkSet;
use crate::video::VideoInfo;

/// Maps pointer motion and landmark sets into at most
/// [`MAX_FORCING_SAMPLES`] forcing samples per frame
///
/// Landmark velocity is the inter-frame delta of the same `(person, landmark)`
/// point. Points that were gated out, left the field or belong to a person no
/// longer tracked lose their history, so they restart from zero velocity
/// instead of jumping.
pub struct ForcingAdapter {
    pointer: PointerSettings,
    landmarks: LandmarkSettings,
    field: (u32, u32),
    video: VideoInfo,
    transform: CoordinateTransform,
    history: HashMap<(usize, usize), Vector2<f32>>,
    samples: Vec<ForcingSample>,
}

impl ForcingAdapter {
    /// # Arguments
    /// * `params` - Pointer and landmark settings are taken from here
    /// * `field` - Field extent in cells
    /// * `video` - Size of the tracked video feed
    pub fn new(params: &SimulationParameters, field: (u32, u32), video: VideoInfo) -> Self {
        let landmarks = params.landmarks.clone();
        let transform = CoordinateTransform::new(field, video, landmarks.fit, landmarks.mirror);
        Self {
            pointer: params.pointer,
            landmarks,
            field,
            video,
            transform,
            history: HashMap::new(),
            samples: Vec::with_capacity(MAX_FORCING_SAMPLES),
        }
    }

    pub fn configure(&mut self, params: &SimulationParameters) {
        self.pointer = params.pointer;
        self.landmarks = params.landmarks.clone();
        self.recompute_transform();
    }

    pub fn set_field_extent(&mut self, width: u32, height: u32) {
        self.field = (width, height);
        self.recompute_transform();
    }

    pub fn set_video_info(&mut self, video: VideoInfo) {
        self.video = video;
        self.recompute_transform();
    }

    pub fn transform(&self) -> &CoordinateTransform {
        &self.transform
    }

    /// Samples produced by the last [`collect`](Self::collect)
    pub fn samples(&self) -> &[ForcingSample] {
        &self.samples
    }

    /// Drop all per-landmark history
    pub fn reset(&mut self) {
        self.history.clear();
        self.samples.clear();
    }

    fn recompute_transform(&mut self) {
        self.transform = CoordinateTransform::new(
            self.field,
            self.video,
            self.landmarks.fit,
            self.landmarks.mirror,
        );
        // Old positions live in the previous mapping.
        self.history.clear();
    }

    /// Build this frame's forcing samples
    ///
    /// # Arguments
    /// * `dt` - Clamped frame time in seconds
    /// * `pointer` - Pointer motion committed this frame, if a pointer is present
    /// * `sets` - Borrowed landmark snapshot; never retained past this call
    pub fn collect(
        &mut self,
        dt: f32,
        pointer: Option<PointerMotion>,
        sets: &[LandmarkSet],
    ) -> &[ForcingSample] {
        self.samples.clear();

        if let Some(motion) = pointer {
            let strength = if motion.is_still() {
                0.0
            } else {
                self.pointer.strength
            };
            self.samples.push(ForcingSample {
                position: motion.position,
                velocity: motion.velocity(dt, self.pointer.max_speed),
                radius: self.pointer.radius,
                strength,
                source: ForcingSource::Pointer,
            });
        }

        self.collect_landmarks(dt, sets);

        if self.samples.len() > MAX_FORCING_SAMPLES {
            log::debug!(
                "Forcing: {} samples this frame, truncating to {}",
                self.samples.len(),
                MAX_FORCING_SAMPLES
            );
            self.samples.truncate(MAX_FORCING_SAMPLES);
        }
        &self.samples
    }

    fn collect_landmarks(&mut self, dt: f32, sets: &[LandmarkSet]) {
        let settings = &self.landmarks;
        let mut persons: Vec<&LandmarkSet> = sets.iter().collect();
        persons.sort_by_key(|set| set.person);
        persons.dedup_by_key(|set| set.person);

        let mut seen = HashSet::new();
        for set in persons.into_iter().take(settings.person_cap()) {
            for &index in &settings.indices {
                let Some(landmark) = set.landmarks.get(index) else {
                    continue;
                };
                // Gated points are left out, never replaced by stale data.
                if !(landmark.visibility >= settings.min_visibility) {
                    continue;
                }
                let Some(position) = self
                    .transform
                    .video_to_field(Vector2::new(landmark.x, landmark.y))
                else {
                    continue;
                };

                let key = (set.person, index);
                seen.insert(key);
                let velocity = match self.history.insert(key, position) {
                    Some(previous) if dt > 0.0 => {
                        clamp_speed((position - previous) / dt, settings.max_speed)
                    }
                    _ => Vector2::zero(),
                };
                self.samples.push(ForcingSample {
                    position,
                    velocity,
                    radius: settings.radius,
                    strength: settings.strength,
                    source: ForcingSource::Landmark {
                        person: set.person,
                        landmark: index,
                    },
                });
            }
        }
        self.history.retain(|key, _| seen.contains(key));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::{pose, Landmark};

    fn params() -> SimulationParameters {
        let mut params = SimulationParameters::default();
        params.landmarks.mirror = false;
        params.landmarks.indices = vec![pose::LEFT_WRIST, pose::RIGHT_WRIST];
        params
    }

    fn person(person: usize, x: f32, visibility: f32) -> LandmarkSet {
        LandmarkSet::with_points(
            person,
            &[
                (pose::LEFT_WRIST, Landmark::new(x, 0.4, visibility)),
                (pose::RIGHT_WRIST, Landmark::new(x + 0.05, 0.6, visibility)),
            ],
        )
    }

    fn adapter(params: &SimulationParameters) -> ForcingAdapter {
        ForcingAdapter::new(params, (64, 64), VideoInfo::new(64, 64))
    }

    #[test]
    fn test_idle_pointer_yields_zero_strength_sample() {
        let mut forcing = adapter(&params());
        let motion = PointerMotion {
            position: Vector2::new(0.3, 0.3),
            delta: Vector2::zero(),
        };
        let samples = forcing.collect(1.0 / 60.0, Some(motion), &[]);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].strength, 0.0);
        assert_eq!(samples[0].source, ForcingSource::Pointer);
    }

    #[test]
    fn test_first_sighting_has_zero_velocity() {
        let mut forcing = adapter(&params());
        let first = forcing.collect(0.1, None, &[person(0, 0.5, 1.0)]).to_vec();
        assert!(first.iter().all(|s| s.velocity.is_zero()));

        let second = forcing.collect(0.1, None, &[person(0, 0.52, 1.0)]);
        assert!((second[0].velocity.x - 0.2).abs() < 1e-4);
    }

    #[test]
    fn test_low_visibility_is_gated_and_forgotten() {
        let mut forcing = adapter(&params());
        forcing.collect(0.1, None, &[person(0, 0.2, 1.0)]);
        assert!(forcing.collect(0.1, None, &[person(0, 0.3, 0.1)]).is_empty());

        // Reappearing far away must not produce a jump.
        let back = forcing.collect(0.1, None, &[person(0, 0.8, 1.0)]);
        assert_eq!(back.len(), 2);
        assert!(back.iter().all(|s| s.velocity.is_zero()));
    }

    #[test]
    fn test_person_gap_omits_departed_person() {
        let params = params();
        let mut forcing = adapter(&params);
        let mut reference = adapter(&params);

        let all = [person(0, 0.1, 1.0), person(1, 0.4, 1.0), person(2, 0.7, 1.0)];
        forcing.collect(0.05, None, &all);
        reference.collect(0.05, None, &all[..2]);

        let next = [person(0, 0.12, 1.0), person(1, 0.42, 1.0)];
        let with_gap = forcing.collect(0.05, None, &next).to_vec();
        let expected = reference.collect(0.05, None, &next).to_vec();
        assert_eq!(with_gap, expected);
        assert!(with_gap.iter().all(|s| s.person() != Some(2)));
        assert_eq!(with_gap.len(), 4);
    }

    #[test]
    fn test_person_cap_and_single_person_mode() {
        let mut params = params();
        params.landmarks.max_persons = 2;
        let sets = [person(5, 0.1, 1.0), person(1, 0.4, 1.0), person(3, 0.7, 1.0)];

        let mut forcing = adapter(&params);
        let persons: HashSet<_> = forcing
            .collect(0.05, None, &sets)
            .iter()
            .filter_map(|s| s.person())
            .collect();
        assert_eq!(persons, HashSet::from([1, 3]));

        let single = params.with_multi_person(false);
        let mut forcing = adapter(&single);
        let samples = forcing.collect(0.05, None, &sets);
        assert!(samples.iter().all(|s| s.person() == Some(1)));
    }

    #[test]
    fn test_total_samples_capped_with_pointer_first() {
        let mut params = params();
        params.landmarks.max_persons = 40;
        let mut forcing = adapter(&params);
        let crowd: Vec<_> = (0..20).map(|p| person(p, 0.3, 1.0)).collect();
        let motion = PointerMotion {
            position: Vector2::new(0.5, 0.5),
            delta: Vector2::new(0.01, 0.0),
        };
        let samples = forcing.collect(0.05, Some(motion), &crowd);
        assert_eq!(samples.len(), MAX_FORCING_SAMPLES);
        assert_eq!(samples[0].source, ForcingSource::Pointer);
    }

    #[test]
    fn test_points_outside_field_are_dropped() {
        let mut params = params();
        params.landmarks.fit = crate::config::FitMode::Cover;
        // 16:9 video on a square field crops the sides.
        let mut forcing = ForcingAdapter::new(&params, (64, 64), VideoInfo::new(1600, 900));
        let samples = forcing.collect(0.05, None, &[person(0, 0.02, 1.0)]);
        assert!(samples.is_empty());
    }
}
