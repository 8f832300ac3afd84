use anyhow::{bail, Result};
use wgpu::util::{DeviceExt, TextureDataOrder};

use shadertoy::{FilterMode, SamplerConfig, WrapMode};

use crate::texture::TextureData;

pub struct GpuTexture {
    pub(crate) _texture: wgpu::Texture,
    pub(crate) view: wgpu::TextureView,
    pub(crate) sampler: wgpu::Sampler,
}

pub(crate) fn upload(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    max_dimension: u32,
    channel: usize,
    data: &TextureData,
    config: &SamplerConfig,
) -> Result<GpuTexture> {
    let (width, height) = (data.width(), data.height());
    if width > max_dimension || height > max_dimension {
        bail!("channel {channel} image is {width}x{height}, GPU limit is {max_dimension}");
    }

    let format = if config.srgb {
        wgpu::TextureFormat::Rgba8UnormSrgb
    } else {
        wgpu::TextureFormat::Rgba8Unorm
    };
    let mut bytes = Vec::new();
    for level in data.levels() {
        bytes.extend_from_slice(level.as_raw());
    }

    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some(&format!("channel texture #{channel}")),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: data.mip_level_count(),
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        TextureDataOrder::LayerMajor,
        &bytes,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let sampler = create_sampler(device, channel, config);

    Ok(GpuTexture {
        _texture: texture,
        view,
        sampler,
    })
}

/// 1x1 black texture bound to channels without an image.
pub(crate) fn placeholder(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    channel: usize,
) -> GpuTexture {
    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some(&format!("placeholder channel texture #{channel}")),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        TextureDataOrder::LayerMajor,
        &[0u8, 0, 0, 255],
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let sampler = create_sampler(device, channel, &SamplerConfig::default());
    GpuTexture {
        _texture: texture,
        view,
        sampler,
    }
}

fn create_sampler(device: &wgpu::Device, channel: usize, config: &SamplerConfig) -> wgpu::Sampler {
    let address_mode = match config.wrap {
        WrapMode::Repeat => wgpu::AddressMode::Repeat,
        WrapMode::Clamp => wgpu::AddressMode::ClampToEdge,
    };
    let (filter, mipmap_filter) = match config.filter {
        FilterMode::Nearest => (wgpu::FilterMode::Nearest, wgpu::FilterMode::Nearest),
        FilterMode::Linear => (wgpu::FilterMode::Linear, wgpu::FilterMode::Nearest),
        FilterMode::Mipmap => (wgpu::FilterMode::Linear, wgpu::FilterMode::Linear),
    };
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(&format!("channel sampler #{channel}")),
        address_mode_u: address_mode,
        address_mode_v: address_mode,
        address_mode_w: address_mode,
        mag_filter: filter,
        min_filter: filter,
        mipmap_filter,
        ..Default::default()
    })
}
