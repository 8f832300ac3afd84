use std::sync::Arc;
use std::thread;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use tracing::{debug, info, warn};

use reelconfig::Settings;
use renderer::gpu::WgpuBackend;
use renderer::{RenderUnit, UnitConfig};
use scheduler::{CandidateList, Selector};
use shadertoy::{
    BlobCache, CacheKey, ContentDefinition, ContentId, Fetch, ShadertoyClient, ShadertoyConfig,
};

use crate::cli::{GlobalArgs, RunArgs};
use crate::environment::Environment;

/// Reads `config.toml` (or `--config`) and applies the command-line overrides.
pub fn load_settings(environment: &Environment, args: &GlobalArgs) -> Result<Settings> {
    let path = args
        .config
        .clone()
        .unwrap_or_else(|| environment.config_file());
    let mut settings = Settings::load(&path)
        .with_context(|| format!("loading settings from {}", path.display()))?;

    if let Some(duration) = args.shader_duration {
        settings.shader_duration = duration;
    }
    if let Some(max) = args.undersample_max {
        settings.undersample_max = max;
    }
    if let Some(interval) = args.frame_interval {
        settings.frame_interval = interval;
    }
    if args.cache_only {
        settings.cache_only = true;
    }
    if let Some(key) = args.shadertoy_api_key.as_deref() {
        if !key.trim().is_empty() {
            settings.api_key = Some(key.trim().to_string());
        }
    }

    settings.validate().context("invalid settings")?;
    debug!(
        shader_duration = ?settings.shader_duration,
        frame_interval = ?settings.frame_interval,
        undersample_max = settings.undersample_max,
        cache_only = settings.cache_only,
        "resolved settings"
    );
    Ok(settings)
}

pub fn unit_config(settings: &Settings) -> UnitConfig {
    UnitConfig {
        shader_duration: settings.shader_duration,
        frame_interval: settings.frame_interval,
        retry_interval: settings.retry_interval,
        undersample_max: settings.undersample_max,
    }
}

pub fn build_cache(environment: &Environment, settings: &Settings) -> Result<BlobCache> {
    let root = environment.cache_dir();
    if settings.cache_only {
        info!("remote fetch disabled (--cache-only)");
        return Ok(BlobCache::cache_only(root, settings.stale_after));
    }

    let api_key = settings.api_key().map(str::to_string);
    if api_key.is_none() {
        warn!("no Shadertoy API key configured; only cached shader definitions can be loaded");
    }
    let config = ShadertoyConfig::new(&settings.remote_host, api_key)?;
    let client = ShadertoyClient::new(config)?;
    let fetcher: Box<dyn Fetch + Send + Sync> = Box::new(client);
    Ok(BlobCache::new(root, Some(fetcher), settings.stale_after))
}

fn load_candidates(environment: &Environment) -> Result<Arc<CandidateList>> {
    let path = environment.candidate_list();
    let list = CandidateList::load(&path)
        .with_context(|| format!("loading candidate list {}", path.display()))?;
    debug!(
        path = %path.display(),
        entries = list.len(),
        enabled = list.enabled_count(),
        "loaded candidate list"
    );
    Ok(Arc::new(list))
}

pub fn run(environment: &Environment, settings: &Settings, args: RunArgs) -> Result<()> {
    let candidates = load_candidates(environment)?;
    if candidates.enabled_count() == 0 {
        warn!(
            path = %environment.candidate_list().display(),
            "candidate list has no enabled shaders; the display will stay black"
        );
    }
    let cache = Arc::new(build_cache(environment, settings)?);
    let config = unit_config(settings);
    let (width, height) = args.size;

    let mut units = Vec::with_capacity(args.units as usize);
    for index in 0..args.units {
        let backend = WgpuBackend::new_headless(width, height)
            .with_context(|| format!("initialising GPU backend for unit {index}"))?;
        let selector = match args.seed {
            Some(seed) => {
                Selector::with_seed(candidates.clone(), seed.wrapping_add(u64::from(index)))
            }
            None => Selector::new(candidates.clone()),
        };
        let mut unit = RenderUnit::new(backend, cache.clone(), selector, config);
        unit.on_resize(width, height);
        units.push(unit);
    }
    info!(units = units.len(), width, height, frames = ?args.frames, "starting render loop");

    let mut frame = 0u64;
    while args.frames.map_or(true, |limit| frame < limit) {
        let now = Instant::now();
        let mut pause = config.frame_interval;
        for (index, unit) in units.iter_mut().enumerate() {
            let report = unit.on_frame(now);
            if let Some(id) = &report.loaded {
                info!(unit = index, %id, "now showing");
            }
            pause = pause.min(report.pause);
        }
        frame += 1;
        if args.frames.map_or(true, |limit| frame < limit) {
            thread::sleep(pause);
        }
    }

    if let Some(path) = &args.snapshot {
        let unit = units
            .first()
            .ok_or_else(|| anyhow!("no render unit to snapshot"))?;
        let image = unit.backend().snapshot()?;
        image
            .save(path)
            .with_context(|| format!("writing snapshot to {}", path.display()))?;
        println!("{}", path.display());
    }

    for unit in &mut units {
        unit.on_teardown();
    }
    Ok(())
}

pub fn pick(environment: &Environment, seed: Option<u64>) -> Result<()> {
    let candidates = load_candidates(environment)?;
    let mut selector = match seed {
        Some(seed) => Selector::with_seed(candidates, seed),
        None => Selector::new(candidates),
    };
    if let Some(id) = selector.pick() {
        println!("{id}");
    }
    Ok(())
}

/// Fetches one definition through the cache and validates it. Invalid
/// definitions are evicted so the next attempt refetches them.
fn fetch_definition(cache: &BlobCache, id: &ContentId) -> Result<ContentDefinition> {
    let key = CacheKey::definition(id);
    let blob = cache.get(&key)?;
    match shadertoy::parse(id, &blob.bytes) {
        Ok(definition) => {
            cache.retire_if_stale(&blob);
            Ok(definition)
        }
        Err(err) => {
            if let Err(evict_err) = cache.evict(&key) {
                warn!(%id, error = %evict_err, "failed to evict unparsable definition");
            }
            Err(err.into())
        }
    }
}

pub fn fetch(environment: &Environment, settings: &Settings, raw_id: &str) -> Result<()> {
    let id: ContentId = raw_id
        .parse()
        .with_context(|| format!("invalid shader id '{raw_id}'"))?;
    let cache = build_cache(environment, settings)?;
    let definition = fetch_definition(&cache, &id)
        .with_context(|| format!("failed to load shader {id}"))?;

    info!(
        %id,
        title = %definition.metadata.title,
        author = %definition.metadata.author,
        "fetched shader definition"
    );
    println!(
        "{} by {}",
        definition.metadata.title, definition.metadata.author
    );
    println!("channels: {}", definition.channel_summary());
    Ok(())
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WarmSummary {
    pub ready: usize,
    pub failed: usize,
    pub images: usize,
    pub image_failures: usize,
}

pub fn warm_cache(cache: &BlobCache, candidates: &CandidateList) -> WarmSummary {
    let mut summary = WarmSummary::default();
    for id in candidates.distinct_enabled() {
        let definition = match fetch_definition(cache, &id) {
            Ok(definition) => definition,
            Err(err) => {
                warn!(%id, error = %format!("{err:#}"), "failed to warm shader");
                summary.failed += 1;
                continue;
            }
        };

        let mut complete = true;
        for binding in definition.bindings() {
            let fetched = CacheKey::image(&binding.source)
                .and_then(|key| cache.get(&key).map(|_| ()));
            match fetched {
                Ok(()) => summary.images += 1,
                Err(err) => {
                    warn!(
                        %id,
                        channel = binding.channel,
                        src = %binding.source,
                        error = %err,
                        "failed to warm channel image"
                    );
                    summary.image_failures += 1;
                    complete = false;
                }
            }
        }
        if complete {
            debug!(%id, title = %definition.metadata.title, "warmed shader");
        }
        summary.ready += 1;
    }
    summary
}

pub fn warm(environment: &Environment, settings: &Settings) -> Result<()> {
    let candidates = load_candidates(environment)?;
    let cache = build_cache(environment, settings)?;
    let summary = warm_cache(&cache, &candidates);
    info!(?summary, "cache warm finished");
    println!(
        "{} shaders ready, {} failed; {} images cached, {} failed",
        summary.ready, summary.failed, summary.images, summary.image_failures
    );
    if summary.ready == 0 && summary.failed > 0 {
        bail!("no shader definition could be loaded");
    }
    Ok(())
}

pub fn describe_paths(environment: &Environment) {
    println!("home:       {}", environment.root().display());
    println!("candidates: {}", environment.candidate_list().display());
    println!("cache:      {}", environment.cache_dir().display());
    println!("log:        {}", environment.log_file().display());
    println!("config:     {}", environment.config_file().display());
}
