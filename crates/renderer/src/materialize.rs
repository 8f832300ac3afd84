use thiserror::Error;
use tracing::{debug, warn};

use shadertoy::{BlobCache, CacheKey, ContentDefinition, ResourceBinding};

use crate::backend::{ChannelSlot, RenderBackend, RenderResources};
use crate::compile::wrap_fragment;
use crate::texture::TextureData;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MaterializeError {
    #[error("shader failed to compile:\n{0}")]
    CompileFailed(String),
    #[error("channel {channel} left empty: {reason}")]
    ResourceDegraded { channel: usize, reason: String },
}

pub struct Materialized<B: RenderBackend> {
    pub resources: RenderResources<B>,
    /// Channels that could not be loaded; each is bound as empty.
    pub degraded: Vec<MaterializeError>,
}

/// Compiles the program for `definition` and loads its channel images.
///
/// A compile failure aborts without keeping anything. A channel that cannot be
/// fetched, decoded, or uploaded only empties that channel.
pub fn materialize<B: RenderBackend>(
    backend: &mut B,
    images: &BlobCache,
    definition: &ContentDefinition,
) -> Result<Materialized<B>, MaterializeError> {
    let source = wrap_fragment(&definition.body);
    let program = backend
        .compile_program(&source)
        .map_err(MaterializeError::CompileFailed)?;

    let mut channels: [ChannelSlot<B::Texture>; shadertoy::CHANNEL_COUNT] =
        std::array::from_fn(|_| ChannelSlot::Empty);
    let mut degraded = Vec::new();

    for binding in definition.bindings() {
        match load_channel(backend, images, binding) {
            Ok(slot) => {
                debug!(
                    id = %definition.id,
                    channel = binding.channel,
                    src = %binding.source,
                    "channel ready"
                );
                channels[binding.channel] = slot;
            }
            Err(reason) => {
                warn!(
                    id = %definition.id,
                    stage = "materialize",
                    channel = binding.channel,
                    src = %binding.source,
                    error = %reason,
                    "channel degraded to empty"
                );
                degraded.push(MaterializeError::ResourceDegraded {
                    channel: binding.channel,
                    reason,
                });
            }
        }
    }

    Ok(Materialized {
        resources: RenderResources { program, channels },
        degraded,
    })
}

fn load_channel<B: RenderBackend>(
    backend: &mut B,
    images: &BlobCache,
    binding: &ResourceBinding,
) -> Result<ChannelSlot<B::Texture>, String> {
    let key = CacheKey::image(&binding.source).map_err(|err| err.to_string())?;
    let blob = images.get(&key).map_err(|err| err.to_string())?;
    let data = TextureData::decode(&blob.bytes, &binding.sampler)
        .map_err(|err| format!("{err:#}"))?;
    let texture = backend
        .upload_texture(binding.channel, &data, &binding.sampler)
        .map_err(|err| format!("{err:#}"))?;
    Ok(ChannelSlot::Image {
        texture,
        resolution: [data.width(), data.height()],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{png_bytes, RecordingBackend, StaticFetch};
    use shadertoy::{ContentId, FilterMode, SamplerConfig, WrapMode};
    use std::time::Duration;

    fn binding(channel: usize, source: &str) -> ResourceBinding {
        ResourceBinding {
            channel,
            source: source.to_string(),
            sampler: SamplerConfig {
                filter: FilterMode::Linear,
                wrap: WrapMode::Repeat,
                vflip: true,
                srgb: false,
            },
        }
    }

    fn definition(body: &str, bindings: Vec<ResourceBinding>) -> ContentDefinition {
        let mut slots: [Option<ResourceBinding>; shadertoy::CHANNEL_COUNT] = Default::default();
        for binding in bindings {
            let channel = binding.channel;
            slots[channel] = Some(binding);
        }
        ContentDefinition {
            id: ContentId::parse("abc123").unwrap(),
            body: body.to_string(),
            bindings: slots,
            metadata: Default::default(),
        }
    }

    fn cache(temp: &tempfile::TempDir, fetch: StaticFetch) -> BlobCache {
        BlobCache::new(temp.path(), Some(Box::new(fetch)), Duration::from_secs(60))
    }

    #[test]
    fn wraps_body_and_loads_channels() {
        let temp = tempfile::tempdir().unwrap();
        let images = cache(
            &temp,
            StaticFetch::default().with("media/a/noise.png", png_bytes(4, 2)),
        );
        let mut backend = RecordingBackend::default();
        let definition = definition(
            "void mainImage(out vec4 c, in vec2 p) { c = texture(iChannel1, p); }",
            vec![binding(1, "/media/a/noise.png")],
        );

        let materialized = materialize(&mut backend, &images, &definition).unwrap();
        assert!(materialized.degraded.is_empty());
        assert_eq!(materialized.resources.occupancy(), ".x..");
        assert_eq!(materialized.resources.channel_resolutions()[1], [4.0, 2.0, 1.0]);
        assert!(backend.compiled[0].starts_with("#version 450"));
        assert!(backend.compiled[0].contains("texture(iChannel1, p)"));
        assert_eq!(backend.uploads, vec![(1, 4, 2)]);
    }

    #[test]
    fn compile_failure_keeps_nothing() {
        let temp = tempfile::tempdir().unwrap();
        let images = cache(&temp, StaticFetch::default());
        let mut backend = RecordingBackend::default();
        backend.fail_compile = Some("0:1: syntax error".into());
        let definition = definition("garbage", vec![binding(0, "/media/a/x.png")]);

        let err = materialize(&mut backend, &images, &definition).err().unwrap();
        assert_eq!(err, MaterializeError::CompileFailed("0:1: syntax error".into()));
        assert!(backend.uploads.is_empty());
    }

    #[test]
    fn broken_channel_degrades_only_that_channel() {
        let temp = tempfile::tempdir().unwrap();
        let images = cache(
            &temp,
            StaticFetch::default()
                .with("media/a/good.png", png_bytes(2, 2))
                .with("media/a/corrupt.png", b"not a png".to_vec()),
        );
        let mut backend = RecordingBackend::default();
        let definition = definition(
            "void mainImage(out vec4 c, in vec2 p) { c = vec4(1.0); }",
            vec![
                binding(0, "/media/a/good.png"),
                binding(2, "/media/a/corrupt.png"),
                binding(3, "/media/a/missing.png"),
            ],
        );

        let materialized = materialize(&mut backend, &images, &definition).unwrap();
        assert_eq!(materialized.resources.occupancy(), "x...");
        let channels: Vec<usize> = materialized
            .degraded
            .iter()
            .map(|err| match err {
                MaterializeError::ResourceDegraded { channel, .. } => *channel,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(channels, vec![2, 3]);
    }

    #[test]
    fn repeated_materialize_is_equivalent() {
        let temp = tempfile::tempdir().unwrap();
        let fetch = StaticFetch::default().with("media/a/noise.png", png_bytes(8, 8));
        let calls = fetch.calls();
        let images = cache(&temp, fetch);
        let mut backend = RecordingBackend::default();
        let definition = definition(
            "void mainImage(out vec4 c, in vec2 p) { c = vec4(0.5); }",
            vec![binding(0, "/media/a/noise.png")],
        );

        let first = materialize(&mut backend, &images, &definition).unwrap();
        let second = materialize(&mut backend, &images, &definition).unwrap();

        assert_eq!(backend.compiled[0], backend.compiled[1]);
        assert_eq!(backend.uploads[0], backend.uploads[1]);
        assert_eq!(first.resources.occupancy(), second.resources.occupancy());
        assert_eq!(
            first.resources.channel_resolutions(),
            second.resources.channel_resolutions()
        );
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
