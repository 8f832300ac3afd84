//! Closed-loop render scale control.
//!
//! Each frame nudges one slot of a four entry ring, chosen by the frame index.
//! A slow frame raises its slot by [`SCALE_STEP`], a fast frame lowers it
//! (only while the effective scale is above 1.0). The effective scale is the
//! mean of the ring, so a single outlier frame moves it by a quarter step.
//! Frames within [`HYSTERESIS`] of the target leave the ring untouched.
use std::time::Duration;

pub const SCALE_SLOTS: usize = 4;
pub const SCALE_STEP: f32 = 0.1;
pub const HYSTERESIS: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, PartialEq)]
pub struct ScaleController {
    slots: [f32; SCALE_SLOTS],
    scale: f32,
    max: f32,
    target: Duration,
}

impl ScaleController {
    /// `max` below 1.0 is treated as 1.0 (no undersampling).
    pub fn new(target: Duration, max: f32) -> Self {
        Self {
            slots: [1.0; SCALE_SLOTS],
            scale: 1.0,
            max: max.max(1.0),
            target,
        }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    pub fn target(&self) -> Duration {
        self.target
    }

    pub fn slots(&self) -> &[f32; SCALE_SLOTS] {
        &self.slots
    }

    /// Feeds one measured frame. Returns the new effective scale when a slot
    /// changed, `None` when the frame was within the hysteresis band or the
    /// slot was already pinned at a bound.
    pub fn observe(&mut self, frame_duration: Duration, frame_index: u64) -> Option<f32> {
        let slot = &mut self.slots[(frame_index % SCALE_SLOTS as u64) as usize];
        let previous = *slot;

        if frame_duration > self.target + HYSTERESIS {
            *slot = (*slot + SCALE_STEP).min(self.max);
        } else if frame_duration + HYSTERESIS < self.target && self.scale > 1.0 {
            *slot = (*slot - SCALE_STEP).max(1.0);
        }

        if *slot == previous {
            return None;
        }
        let mean = self.slots.iter().sum::<f32>() / SCALE_SLOTS as f32;
        self.scale = mean.clamp(1.0, self.max);
        Some(self.scale)
    }

    /// Render target size for a native surface of `width` x `height`.
    pub fn scaled_size(&self, width: u32, height: u32) -> (u32, u32) {
        scaled_size(width, height, self.scale)
    }
}

pub fn scaled_size(width: u32, height: u32, scale: f32) -> (u32, u32) {
    let scale = scale.max(1.0);
    let shrink = |value: u32| ((value as f32 / scale) as u32).max(1);
    (shrink(width), shrink(height))
}
