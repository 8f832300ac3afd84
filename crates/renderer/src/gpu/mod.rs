//! Headless `wgpu` implementation of [`RenderBackend`].
//!
//! - `context` owns the instance, adapter, device, and queue.
//! - `target` is the offscreen colour attachment, rebuilt on resize, plus
//!   CPU readback for snapshots.
//! - `pipeline` compiles wrapped GLSL through naga into render pipelines
//!   sharing one pair of bind group layouts.
//! - `channels` uploads decoded channel images and the black placeholder
//!   bound to empty channels.
//! - `uniforms` is the std140 mirror of the prelude's uniform block.

mod channels;
mod context;
mod pipeline;
mod target;
mod uniforms;

pub use channels::GpuTexture;
pub use pipeline::WgpuProgram;

use anyhow::Result;
use image::RgbaImage;
use wgpu::util::DeviceExt;

use shadertoy::{SamplerConfig, CHANNEL_COUNT};

use crate::backend::{RenderBackend, RenderResources};
use crate::texture::TextureData;
use crate::uniforms::FrameUniforms;

use context::GpuContext;
use pipeline::PipelineLayouts;
use target::RenderTarget;
use uniforms::GpuUniforms;

pub struct WgpuBackend {
    context: GpuContext,
    layouts: PipelineLayouts,
    target: RenderTarget,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    placeholders: [GpuTexture; CHANNEL_COUNT],
}

impl WgpuBackend {
    pub fn new_headless(width: u32, height: u32) -> Result<Self> {
        let context = GpuContext::new_headless()?;
        let layouts = PipelineLayouts::new(&context.device);
        let (width, height) = context.clamp_size(width, height);
        let target = RenderTarget::new(&context.device, width, height);

        let initial = GpuUniforms::from(&FrameUniforms::new(width, height));
        let uniform_buffer = context
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("shadertoy uniforms"),
                contents: bytemuck::bytes_of(&initial),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
        let uniform_bind_group = context.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("uniform bind group"),
            layout: &layouts.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });
        let placeholders = std::array::from_fn(|channel| {
            channels::placeholder(&context.device, &context.queue, channel)
        });

        tracing::info!(adapter = %context.adapter_name, width, height, "GPU backend ready");
        Ok(Self {
            context,
            layouts,
            target,
            uniform_buffer,
            uniform_bind_group,
            placeholders,
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.context.adapter_name
    }

    pub fn target_size(&self) -> (u32, u32) {
        (self.target.width, self.target.height)
    }

    /// Reads the most recent frame back from the GPU.
    pub fn snapshot(&self) -> Result<RgbaImage> {
        self.target
            .read_back(&self.context.device, &self.context.queue)
    }
}

impl RenderBackend for WgpuBackend {
    type Program = WgpuProgram;
    type Texture = GpuTexture;

    fn compile_program(
        &mut self,
        fragment_source: &str,
    ) -> std::result::Result<WgpuProgram, String> {
        pipeline::compile_program(&self.context.device, &self.layouts, fragment_source)
    }

    fn upload_texture(
        &mut self,
        channel: usize,
        data: &TextureData,
        sampler: &SamplerConfig,
    ) -> Result<GpuTexture> {
        channels::upload(
            &self.context.device,
            &self.context.queue,
            self.context.max_dimension,
            channel,
            data,
            sampler,
        )
    }

    fn resize_target(&mut self, width: u32, height: u32) {
        let (width, height) = self.context.clamp_size(width, height);
        if (width, height) == self.target_size() {
            return;
        }
        self.target = RenderTarget::new(&self.context.device, width, height);
    }

    fn draw(
        &mut self,
        resources: Option<&RenderResources<Self>>,
        uniforms: &FrameUniforms,
    ) -> Result<()> {
        let device = &self.context.device;
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("render encoder"),
        });

        let bound = resources.map(|resources| {
            let textures: [&GpuTexture; CHANNEL_COUNT] = std::array::from_fn(|index| {
                resources.channels[index]
                    .texture()
                    .unwrap_or(&self.placeholders[index])
            });
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("channel bind group"),
                layout: &self.layouts.channel_layout,
                entries: &pipeline::channel_entries(textures),
            });
            (&resources.program, bind_group)
        });

        if bound.is_some() {
            let gpu_uniforms = GpuUniforms::from(uniforms);
            self.context
                .queue
                .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&gpu_uniforms));
        }

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("render pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.target.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            if let Some((program, bind_group)) = bound.as_ref() {
                render_pass.set_pipeline(&program.pipeline);
                render_pass.set_bind_group(0, &self.uniform_bind_group, &[]);
                render_pass.set_bind_group(1, bind_group, &[]);
                render_pass.draw(0..3, 0..1);
            }
        }

        self.context.queue.submit(std::iter::once(encoder.finish()));
        self.context.wait_idle()
    }
}
