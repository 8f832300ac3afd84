//! One independently rotating display: selection, loading, drawing, and
//! resolution control for a single host surface.
//!
//! The host drives a unit through three callbacks: [`RenderUnit::on_resize`],
//! [`RenderUnit::on_frame`], and [`RenderUnit::on_teardown`]. None of them
//! fail; every load problem is logged and answered by trying another
//! candidate or by waiting for the next selection round.
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use scheduler::Selector;
use shadertoy::{BlobCache, CacheKey, ContentId, FetchError, ParseError};

use crate::backend::{RenderBackend, RenderResources};
use crate::materialize::{materialize, MaterializeError};
use crate::scale::ScaleController;
use crate::uniforms::FrameUniforms;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitConfig {
    pub shader_duration: Duration,
    pub frame_interval: Duration,
    pub retry_interval: Duration,
    pub undersample_max: f32,
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self {
            shader_duration: Duration::from_secs(300),
            frame_interval: Duration::from_micros(33_333),
            retry_interval: Duration::from_secs(30),
            undersample_max: 16.0,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("{id}: {source}")]
    Fetch {
        id: ContentId,
        #[source]
        source: FetchError,
    },
    #[error("{id}: {source}")]
    Parse {
        id: ContentId,
        #[source]
        source: ParseError,
    },
    #[error("{id}: {source}")]
    Materialize {
        id: ContentId,
        #[source]
        source: MaterializeError,
    },
}

impl LoadError {
    pub fn id(&self) -> &ContentId {
        match self {
            Self::Fetch { id, .. } | Self::Parse { id, .. } | Self::Materialize { id, .. } => id,
        }
    }

    pub fn stage(&self) -> &'static str {
        match self {
            Self::Fetch { .. } => "fetch",
            Self::Parse { .. } => "parse",
            Self::Materialize { .. } => "materialize",
        }
    }
}

/// Timing and scale bookkeeping for the item on screen. Rebuilt for every
/// newly materialized item.
#[derive(Debug, Clone)]
pub struct ControllerState {
    pub started: Instant,
    pub frame: u64,
    pub last_frame_duration: Duration,
    pub last_frame_at: Option<Instant>,
    pub scale: ScaleController,
}

impl ControllerState {
    fn new(now: Instant, config: &UnitConfig) -> Self {
        Self {
            started: now,
            frame: 0,
            last_frame_duration: Duration::ZERO,
            last_frame_at: None,
            scale: ScaleController::new(config.frame_interval, config.undersample_max),
        }
    }
}

struct ActiveItem<B: RenderBackend> {
    id: ContentId,
    resources: RenderResources<B>,
    controller: ControllerState,
}

enum UnitState<B: RenderBackend> {
    Selecting { retry_at: Instant },
    Active(ActiveItem<B>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Selecting { retry_at: Instant },
    Active,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    /// How long the host should wait before the next frame.
    pub pause: Duration,
    pub frame_duration: Duration,
    pub scale: f32,
    /// Set when this frame switched to a newly loaded item.
    pub loaded: Option<ContentId>,
}

pub struct RenderUnit<B: RenderBackend> {
    backend: B,
    cache: Arc<BlobCache>,
    selector: Selector,
    config: UnitConfig,
    native: (u32, u32),
    state: UnitState<B>,
}

impl<B: RenderBackend> RenderUnit<B> {
    /// The unit starts out selecting; the first [`on_frame`](Self::on_frame)
    /// runs a selection round. Hosts should report the surface size through
    /// [`on_resize`](Self::on_resize) before the first frame.
    pub fn new(backend: B, cache: Arc<BlobCache>, selector: Selector, config: UnitConfig) -> Self {
        Self {
            backend,
            cache,
            selector,
            config,
            native: (1, 1),
            state: UnitState::Selecting {
                retry_at: Instant::now(),
            },
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn phase(&self) -> Phase {
        match &self.state {
            UnitState::Selecting { retry_at } => Phase::Selecting {
                retry_at: *retry_at,
            },
            UnitState::Active(_) => Phase::Active,
        }
    }

    pub fn current(&self) -> Option<&ContentId> {
        match &self.state {
            UnitState::Active(item) => Some(&item.id),
            UnitState::Selecting { .. } => None,
        }
    }

    pub fn controller(&self) -> Option<&ControllerState> {
        match &self.state {
            UnitState::Active(item) => Some(&item.controller),
            UnitState::Selecting { .. } => None,
        }
    }

    pub fn native_size(&self) -> (u32, u32) {
        self.native
    }

    pub fn on_resize(&mut self, width: u32, height: u32) {
        self.native = (width.max(1), height.max(1));
        let (target_w, target_h) = match &self.state {
            UnitState::Active(item) => item.controller.scale.scaled_size(width, height),
            UnitState::Selecting { .. } => self.native,
        };
        debug!(width, height, target_w, target_h, "surface resized");
        self.backend.resize_target(target_w, target_h);
    }

    pub fn on_frame(&mut self, now: Instant) -> FrameReport {
        let due = match &self.state {
            UnitState::Selecting { retry_at } => now >= *retry_at,
            UnitState::Active(item) => {
                let expired = now.saturating_duration_since(item.controller.started)
                    > self.config.shader_duration;
                if expired {
                    info!(id = %item.id, "shader time is up; rotating");
                }
                expired
            }
        };
        let loaded = if due { self.select(now) } else { None };

        let item = match &mut self.state {
            UnitState::Active(item) => item,
            UnitState::Selecting { .. } => {
                let (width, height) = self.native;
                if let Err(err) = self.backend.draw(None, &FrameUniforms::new(width, height)) {
                    warn!(stage = "draw", error = %format!("{err:#}"), "failed to clear target");
                }
                return FrameReport {
                    pause: self.config.frame_interval,
                    frame_duration: Duration::ZERO,
                    scale: 1.0,
                    loaded,
                };
            }
        };

        let controller = &mut item.controller;
        let (native_w, native_h) = self.native;
        let (width, height) = controller.scale.scaled_size(native_w, native_h);
        let time = now.saturating_duration_since(controller.started);
        let delta = controller
            .last_frame_at
            .map(|last| now.saturating_duration_since(last))
            .unwrap_or_default();
        let mut uniforms = FrameUniforms::new(width, height).with_clock(
            time.as_secs_f32(),
            delta.as_secs_f32(),
            controller.frame,
        );
        uniforms.channel_resolution = item.resources.channel_resolutions();
        uniforms.mouse[1] = native_h.saturating_sub(1) as f32 / controller.scale.scale();

        let draw_started = Instant::now();
        if let Err(err) = self.backend.draw(Some(&item.resources), &uniforms) {
            warn!(id = %item.id, stage = "draw", error = %format!("{err:#}"), "draw failed");
        }
        let frame_duration = draw_started.elapsed();

        let frame_index = controller.frame;
        controller.frame += 1;
        controller.last_frame_duration = frame_duration;
        controller.last_frame_at = Some(now);
        if let Some(scale) = controller.scale.observe(frame_duration, frame_index) {
            let (width, height) = controller.scale.scaled_size(native_w, native_h);
            debug!(
                id = %item.id,
                scale,
                width,
                height,
                frame_ms = frame_duration.as_secs_f64() * 1000.0,
                "render scale changed"
            );
            self.backend.resize_target(width, height);
        }

        FrameReport {
            pause: self.config.frame_interval.saturating_sub(frame_duration),
            frame_duration,
            scale: controller.scale.scale(),
            loaded,
        }
    }

    /// Releases the bound resources. The next frame starts a new selection.
    pub fn on_teardown(&mut self) {
        if let UnitState::Active(item) = &self.state {
            debug!(id = %item.id, "tearing down render unit");
        }
        self.state = UnitState::Selecting {
            retry_at: Instant::now(),
        };
    }

    fn select(&mut self, now: Instant) -> Option<ContentId> {
        let attempts = self.selector.attempts();
        let candidates = attempts.len();
        for id in attempts {
            match self.load(&id) {
                Ok(resources) => {
                    // The previous item is dropped only once its replacement exists.
                    self.state = UnitState::Active(ActiveItem {
                        id: id.clone(),
                        resources,
                        controller: ControllerState::new(now, &self.config),
                    });
                    let (width, height) = self.native;
                    self.backend.resize_target(width, height);
                    return Some(id);
                }
                Err(err) => {
                    warn!(
                        id = %err.id(),
                        stage = err.stage(),
                        error = %err,
                        "failed to load shader"
                    );
                }
            }
        }

        let retry_at = now + self.config.retry_interval;
        warn!(
            candidates,
            retry_in_secs = self.config.retry_interval.as_secs_f64(),
            "no loadable shader; clearing display"
        );
        self.state = UnitState::Selecting { retry_at };
        None
    }

    fn load(&mut self, id: &ContentId) -> Result<RenderResources<B>, LoadError> {
        let key = CacheKey::definition(id);
        let blob = self.cache.get(&key).map_err(|source| LoadError::Fetch {
            id: id.clone(),
            source,
        })?;

        let definition = match shadertoy::parse(id, &blob.bytes) {
            Ok(definition) => definition,
            Err(source) => {
                if let Err(err) = self.cache.evict(&key) {
                    warn!(%id, error = %err, "failed to evict unparsable definition");
                }
                return Err(LoadError::Parse {
                    id: id.clone(),
                    source,
                });
            }
        };

        let result = materialize(&mut self.backend, &self.cache, &definition);
        self.cache.retire_if_stale(&blob);
        let materialized = result.map_err(|source| LoadError::Materialize {
            id: id.clone(),
            source,
        })?;

        info!(
            %id,
            title = %definition.metadata.title,
            author = %definition.metadata.author,
            channels = %materialized.resources.occupancy(),
            degraded = materialized.degraded.len(),
            "loaded shader"
        );
        Ok(materialized.resources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{definition_json, png_bytes, RecordingBackend, StaticFetch};
    use scheduler::CandidateList;

    const BODY: &str = "void mainImage(out vec4 c, in vec2 p) { c = vec4(1.0); }";

    fn unit_with(
        list: &str,
        fetch: StaticFetch,
        config: UnitConfig,
    ) -> (tempfile::TempDir, RenderUnit<RecordingBackend>) {
        let temp = tempfile::tempdir().unwrap();
        let cache = Arc::new(BlobCache::new(
            temp.path().join("cache"),
            Some(Box::new(fetch)),
            Duration::from_secs(3600),
        ));
        let selector = Selector::with_seed(Arc::new(CandidateList::parse(list)), 7);
        let mut unit = RenderUnit::new(RecordingBackend::default(), cache, selector, config);
        unit.on_resize(800, 600);
        (temp, unit)
    }

    fn config() -> UnitConfig {
        UnitConfig {
            shader_duration: Duration::from_secs(10),
            frame_interval: Duration::from_millis(20),
            retry_interval: Duration::from_secs(5),
            undersample_max: 4.0,
        }
    }

    #[test]
    fn empty_list_keeps_selecting_and_clears() {
        let (_temp, mut unit) = unit_with("", StaticFetch::default(), config());
        let now = Instant::now();
        let report = unit.on_frame(now);

        assert_eq!(report.loaded, None);
        assert_eq!(report.pause, Duration::from_millis(20));
        assert_eq!(
            unit.phase(),
            Phase::Selecting {
                retry_at: now + Duration::from_secs(5)
            }
        );
        assert_eq!(unit.backend().draws.last().unwrap().program, None);

        // Nothing retried until the retry instant passes.
        unit.on_frame(now + Duration::from_secs(1));
        assert!(matches!(
            unit.phase(),
            Phase::Selecting { retry_at } if retry_at == now + Duration::from_secs(5)
        ));
    }

    #[test]
    fn minimal_definition_becomes_active() {
        let fetch = StaticFetch::default().with("abc123", definition_json("Plain", BODY, ""));
        let (_temp, mut unit) = unit_with("abc123\n", fetch, config());
        let now = Instant::now();
        let report = unit.on_frame(now);

        assert_eq!(report.loaded.as_ref().map(ContentId::as_str), Some("abc123"));
        assert_eq!(unit.phase(), Phase::Active);
        assert_eq!(unit.current().map(ContentId::as_str), Some("abc123"));
        let backend = unit.backend();
        assert_eq!(backend.resizes.last(), Some(&(800, 600)));
        let draw = backend.draws.last().unwrap();
        assert_eq!(draw.program, Some(1));
        assert_eq!(draw.resolution, [800.0, 600.0, 1.0]);
        assert_eq!(draw.frame, 0);
        assert_eq!(draw.mouse, [0.0, 599.0, 0.0, 0.0]);
        assert_eq!(unit.controller().unwrap().frame, 1);
    }

    #[test]
    fn rejected_and_broken_candidates_are_skipped() {
        let fetch = StaticFetch::default()
            .with("gone", br#"{"Error":"Shader not found"}"#.to_vec())
            .with("broken", definition_json("Broken", "BROKEN_MARKER", ""))
            .with("good", definition_json("Good", BODY, ""));
        let (temp, mut unit) = unit_with("gone\nbroken\ngood\n", fetch, config());
        unit.backend_mut().reject_marker = Some("BROKEN_MARKER".into());

        let report = unit.on_frame(Instant::now());
        assert_eq!(report.loaded.as_ref().map(ContentId::as_str), Some("good"));
        // The rejected payload is not kept on disk.
        assert!(!temp.path().join("cache/shaders/gone.json").exists());
        assert!(temp.path().join("cache/shaders/good.json").exists());
    }

    #[test]
    fn all_candidates_failing_schedules_retry() {
        let fetch = StaticFetch::default().with("multi", {
            br#"{"Shader":{"info":{"name":"m","username":"u"},"renderpass":[
                {"type":"buffer","code":"","inputs":[]},
                {"type":"image","code":"","inputs":[]}]}}"#
                .to_vec()
        });
        let (_temp, mut unit) = unit_with("multi\nmissing\n", fetch, config());
        let now = Instant::now();
        unit.on_frame(now);
        assert_eq!(
            unit.phase(),
            Phase::Selecting {
                retry_at: now + Duration::from_secs(5)
            }
        );
    }

    #[test]
    fn rotates_after_shader_duration() {
        let fetch = StaticFetch::default().with("only", definition_json("Only", BODY, ""));
        let (_temp, mut unit) = unit_with("only\n", fetch, config());
        let start = Instant::now();
        unit.on_frame(start);
        assert_eq!(unit.backend().compiled.len(), 1);

        let report = unit.on_frame(start + Duration::from_secs(5));
        assert_eq!(report.loaded, None);
        assert_eq!(unit.backend().compiled.len(), 1);

        let later = start + Duration::from_secs(11);
        let report = unit.on_frame(later);
        assert_eq!(report.loaded.as_ref().map(ContentId::as_str), Some("only"));
        assert_eq!(unit.backend().compiled.len(), 2);
        assert_eq!(unit.controller().unwrap().started, later);
        assert_eq!(unit.backend().draws.last().unwrap().program, Some(2));
    }

    #[test]
    fn rotation_with_exhausted_list_clears_resources() {
        let fetch = StaticFetch::default().with("once", definition_json("Once", BODY, ""));
        let (temp, mut unit) = unit_with("once\n", fetch, config());
        let start = Instant::now();
        unit.on_frame(start);
        assert_eq!(unit.phase(), Phase::Active);

        // Make the definition unusable for the next round.
        std::fs::write(temp.path().join("cache/shaders/once.json"), b"{").unwrap();
        unit.backend_mut().fail_compile = Some("nope".into());

        let later = start + Duration::from_secs(11);
        unit.on_frame(later);
        assert_eq!(
            unit.phase(),
            Phase::Selecting {
                retry_at: later + Duration::from_secs(5)
            }
        );
        assert_eq!(unit.backend().draws.last().unwrap().program, None);
    }

    #[test]
    fn slow_frames_shrink_render_target() {
        let fetch = StaticFetch::default().with("slow", definition_json("Slow", BODY, ""));
        let mut config = config();
        config.frame_interval = Duration::from_millis(5);
        let (_temp, mut unit) = unit_with("slow\n", fetch, config);
        unit.backend_mut().draw_delay = Duration::from_millis(15);

        let start = Instant::now();
        let report = unit.on_frame(start);
        assert!(report.scale > 1.0);
        assert_eq!(report.pause, Duration::ZERO);
        let (width, height) = *unit.backend().resizes.last().unwrap();
        assert!(width < 800 && height < 600);

        let scale = report.scale;
        unit.on_frame(start + Duration::from_millis(1));
        let draw = unit.backend().draws.last().unwrap();
        assert!((draw.mouse[1] - 599.0 / scale).abs() < 1e-3);
    }

    #[test]
    fn resize_applies_current_scale() {
        let fetch = StaticFetch::default().with("s", definition_json("S", BODY, ""));
        let (_temp, mut unit) = unit_with("s\n", fetch, config());
        unit.on_frame(Instant::now());
        unit.on_resize(1024, 768);
        assert_eq!(unit.native_size(), (1024, 768));
        assert_eq!(unit.backend().resizes.last(), Some(&(1024, 768)));
    }

    #[test]
    fn teardown_releases_and_reselects() {
        let fetch = StaticFetch::default()
            .with("tex", definition_json(
                "Tex",
                BODY,
                r#"{"ctype":"texture","channel":0,"src":"/media/a/t.png",
                "sampler":{"filter":"linear","wrap":"clamp","vflip":"true","srgb":"false"}}"#,
            ))
            .with("media/a/t.png", png_bytes(4, 4));
        let (_temp, mut unit) = unit_with("tex\n", fetch, config());
        unit.on_frame(Instant::now());
        assert_eq!(unit.backend().uploads, vec![(0, 4, 4)]);

        unit.on_teardown();
        assert!(matches!(unit.phase(), Phase::Selecting { .. }));
        assert!(unit.current().is_none());

        unit.on_frame(Instant::now());
        assert_eq!(unit.phase(), Phase::Active);
    }
}
