use bytemuck::{Pod, Zeroable};

use shadertoy::CHANNEL_COUNT;

use crate::uniforms::FrameUniforms;

/// std140 mirror of the `ShaderParams` block declared in the prelude.
/// Scalar arrays take a full 16 byte stride, hence the `[f32; 4]` entries.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub(crate) struct GpuUniforms {
    pub i_resolution: [f32; 3],
    pub i_time: f32,
    pub i_time_delta: f32,
    pub i_frame: i32,
    pub i_sample_rate: f32,
    pub padding0: f32,
    pub i_mouse: [f32; 4],
    pub i_date: [f32; 4],
    pub i_channel_time: [[f32; 4]; CHANNEL_COUNT],
    pub i_channel_resolution: [[f32; 4]; CHANNEL_COUNT],
}

impl From<&FrameUniforms> for GpuUniforms {
    fn from(frame: &FrameUniforms) -> Self {
        let mut channel_time = [[0.0; 4]; CHANNEL_COUNT];
        let mut channel_resolution = [[0.0; 4]; CHANNEL_COUNT];
        for index in 0..CHANNEL_COUNT {
            channel_time[index][0] = frame.channel_time[index];
            let [w, h, d] = frame.channel_resolution[index];
            channel_resolution[index] = [w, h, d, 0.0];
        }
        Self {
            i_resolution: frame.resolution,
            i_time: frame.time,
            i_time_delta: frame.time_delta,
            i_frame: frame.frame,
            i_sample_rate: frame.sample_rate,
            padding0: 0.0,
            i_mouse: frame.mouse,
            i_date: frame.date,
            i_channel_time: channel_time,
            i_channel_resolution: channel_resolution,
        }
    }
}
