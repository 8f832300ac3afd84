//! Test doubles shared by the materializer and render unit tests.
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use image::{ImageFormat, Rgba, RgbaImage};
use shadertoy::{CacheKey, Fetch, SamplerConfig};

use crate::backend::{RenderBackend, RenderResources};
use crate::texture::TextureData;
use crate::uniforms::FrameUniforms;

#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub program: Option<u64>,
    pub resolution: [f32; 3],
    pub frame: i32,
    pub mouse: [f32; 4],
}

#[derive(Default)]
pub struct RecordingBackend {
    pub compiled: Vec<String>,
    pub uploads: Vec<(usize, u32, u32)>,
    pub resizes: Vec<(u32, u32)>,
    pub draws: Vec<DrawRecord>,
    /// Fail every compile with this log.
    pub fail_compile: Option<String>,
    /// Fail compiles whose source contains this marker.
    pub reject_marker: Option<String>,
    pub draw_delay: Duration,
    next_program: u64,
}

impl RenderBackend for RecordingBackend {
    type Program = u64;
    type Texture = (usize, u32, u32);

    fn compile_program(&mut self, fragment_source: &str) -> Result<u64, String> {
        self.compiled.push(fragment_source.to_string());
        if let Some(log) = &self.fail_compile {
            return Err(log.clone());
        }
        if let Some(marker) = &self.reject_marker {
            if fragment_source.contains(marker.as_str()) {
                return Err(format!("rejected marker {marker}"));
            }
        }
        self.next_program += 1;
        Ok(self.next_program)
    }

    fn upload_texture(
        &mut self,
        channel: usize,
        data: &TextureData,
        _sampler: &SamplerConfig,
    ) -> Result<Self::Texture> {
        let record = (channel, data.width(), data.height());
        self.uploads.push(record);
        Ok(record)
    }

    fn resize_target(&mut self, width: u32, height: u32) {
        self.resizes.push((width, height));
    }

    fn draw(
        &mut self,
        resources: Option<&RenderResources<Self>>,
        uniforms: &FrameUniforms,
    ) -> Result<()> {
        if !self.draw_delay.is_zero() {
            std::thread::sleep(self.draw_delay);
        }
        self.draws.push(DrawRecord {
            program: resources.map(|resources| resources.program),
            resolution: uniforms.resolution,
            frame: uniforms.frame,
            mouse: uniforms.mouse,
        });
        Ok(())
    }
}

/// In-memory [`Fetch`] keyed by shader id or normalized media path.
#[derive(Default)]
pub struct StaticFetch {
    bodies: HashMap<String, Vec<u8>>,
    calls: Arc<AtomicUsize>,
}

impl StaticFetch {
    pub fn with(mut self, key: &str, body: impl Into<Vec<u8>>) -> Self {
        self.bodies.insert(key.to_string(), body.into());
        self
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl Fetch for StaticFetch {
    fn fetch(&self, key: &CacheKey) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = match key {
            CacheKey::Definition(id) => id.as_str(),
            CacheKey::Image(path) => path.as_str(),
        };
        self.bodies
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("404 for {name}"))
    }
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255]));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

/// Minimal single-pass definition payload.
pub fn definition_json(title: &str, body: &str, inputs: &str) -> Vec<u8> {
    format!(
        r#"{{"Shader":{{"info":{{"name":"{title}","username":"tester"}},
        "renderpass":[{{"type":"image","code":"{body}","inputs":[{inputs}]}}]}}}}"#
    )
    .into_bytes()
}
