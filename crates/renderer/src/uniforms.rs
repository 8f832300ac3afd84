use chrono::{Datelike, Local, Timelike};

use shadertoy::CHANNEL_COUNT;

pub const SAMPLE_RATE: f32 = 44_100.0;

/// Per-frame values behind the ShaderToy globals, independent of any GPU layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameUniforms {
    pub resolution: [f32; 3],
    pub time: f32,
    pub time_delta: f32,
    pub frame: i32,
    /// Never clicked; `y` sits on the top row like an untouched ShaderToy canvas.
    pub mouse: [f32; 4],
    /// Year, month, day, seconds since local midnight.
    pub date: [f32; 4],
    pub sample_rate: f32,
    pub channel_time: [f32; CHANNEL_COUNT],
    pub channel_resolution: [[f32; 3]; CHANNEL_COUNT],
}

impl FrameUniforms {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            resolution: [width as f32, height as f32, 1.0],
            time: 0.0,
            time_delta: 0.0,
            frame: 0,
            mouse: [0.0, height.saturating_sub(1) as f32, 0.0, 0.0],
            date: local_date(),
            sample_rate: SAMPLE_RATE,
            channel_time: [0.0; CHANNEL_COUNT],
            channel_resolution: [[0.0; 3]; CHANNEL_COUNT],
        }
    }

    pub fn with_clock(mut self, time: f32, time_delta: f32, frame: u64) -> Self {
        self.time = time;
        self.time_delta = time_delta;
        self.frame = frame.min(i32::MAX as u64) as i32;
        self.channel_time = [time; CHANNEL_COUNT];
        self
    }
}

fn local_date() -> [f32; 4] {
    let now = Local::now();
    let seconds = now.num_seconds_from_midnight() as f32 + now.nanosecond() as f32 / 1e9;
    [now.year() as f32, now.month() as f32, now.day() as f32, seconds]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_fills_channel_time() {
        let uniforms = FrameUniforms::new(640, 360).with_clock(2.5, 0.016, 7);
        assert_eq!(uniforms.resolution, [640.0, 360.0, 1.0]);
        assert_eq!(uniforms.frame, 7);
        assert_eq!(uniforms.channel_time, [2.5; CHANNEL_COUNT]);
        assert!(uniforms.date[0] >= 2024.0);
        assert!((1.0..=12.0).contains(&uniforms.date[1]));
    }

    #[test]
    fn mouse_rests_on_top_row() {
        assert_eq!(FrameUniforms::new(640, 360).mouse, [0.0, 359.0, 0.0, 0.0]);
        assert_eq!(FrameUniforms::new(1, 0).mouse, [0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn frame_counter_saturates() {
        let uniforms = FrameUniforms::new(1, 1).with_clock(0.0, 0.0, u64::MAX);
        assert_eq!(uniforms.frame, i32::MAX);
    }
}
