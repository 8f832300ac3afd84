use anyhow::Result;

use shadertoy::{SamplerConfig, CHANNEL_COUNT};

use crate::texture::TextureData;
use crate::uniforms::FrameUniforms;

/// GPU operations the render unit needs. The wgpu implementation lives in
/// [`crate::gpu`]; tests use a recording double.
pub trait RenderBackend: Sized {
    type Program;
    type Texture;

    /// Compiles a fully wrapped fragment shader. The error is the compiler log.
    fn compile_program(
        &mut self,
        fragment_source: &str,
    ) -> std::result::Result<Self::Program, String>;

    fn upload_texture(
        &mut self,
        channel: usize,
        data: &TextureData,
        sampler: &SamplerConfig,
    ) -> Result<Self::Texture>;

    fn resize_target(&mut self, width: u32, height: u32);

    /// Draws one frame. `None` clears the target to black.
    fn draw(
        &mut self,
        resources: Option<&RenderResources<Self>>,
        uniforms: &FrameUniforms,
    ) -> Result<()>;
}

pub enum ChannelSlot<T> {
    Empty,
    Image { texture: T, resolution: [u32; 2] },
}

impl<T> ChannelSlot<T> {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn texture(&self) -> Option<&T> {
        match self {
            Self::Empty => None,
            Self::Image { texture, .. } => Some(texture),
        }
    }

    /// `iChannelResolution` entry; empty channels report zero.
    pub fn resolution(&self) -> [f32; 3] {
        match self {
            Self::Empty => [0.0; 3],
            Self::Image { resolution, .. } => [resolution[0] as f32, resolution[1] as f32, 1.0],
        }
    }
}

/// Everything bound for one content item. Dropping it releases the program
/// and textures.
pub struct RenderResources<B: RenderBackend> {
    pub program: B::Program,
    pub channels: [ChannelSlot<B::Texture>; CHANNEL_COUNT],
}

impl<B: RenderBackend> RenderResources<B> {
    pub fn channel_resolutions(&self) -> [[f32; 3]; CHANNEL_COUNT] {
        let mut out = [[0.0; 3]; CHANNEL_COUNT];
        for (slot, channel) in out.iter_mut().zip(&self.channels) {
            *slot = channel.resolution();
        }
        out
    }

    pub fn occupancy(&self) -> String {
        self.channels
            .iter()
            .map(|slot| if slot.is_empty() { '.' } else { 'x' })
            .collect()
    }
}
