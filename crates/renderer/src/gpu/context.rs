use anyhow::{Context as AnyhowContext, Result};

/// Adapter, device, and queue for offscreen rendering. No surface is
/// involved; the host decides where finished frames go.
pub(crate) struct GpuContext {
    pub _instance: wgpu::Instance,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_name: String,
    pub max_dimension: u32,
}

impl GpuContext {
    pub(crate) fn new_headless() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .context("failed to find a suitable GPU adapter")?;

        let info = adapter.get_info();
        let limits = adapter.limits();
        tracing::debug!(
            name = %info.name,
            backend = ?info.backend,
            device_type = ?info.device_type,
            "selected GPU adapter"
        );

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("shaderreel device"),
            required_features: wgpu::Features::empty(),
            required_limits: limits.clone(),
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            trace: wgpu::Trace::default(),
        }))
        .context("failed to create GPU device")?;

        device.on_uncaptured_error(Box::new(|error| {
            tracing::error!(error = %error, "uncaptured GPU error");
        }));

        Ok(Self {
            _instance: instance,
            device,
            queue,
            adapter_name: info.name,
            max_dimension: limits.max_texture_dimension_2d,
        })
    }

    /// Clamps a requested size into what the device can allocate.
    pub(crate) fn clamp_size(&self, width: u32, height: u32) -> (u32, u32) {
        (
            width.clamp(1, self.max_dimension),
            height.clamp(1, self.max_dimension),
        )
    }

    /// Blocks until submitted work has finished.
    pub(crate) fn wait_idle(&self) -> Result<()> {
        self.device
            .poll(wgpu::PollType::Wait)
            .map(|_| ())
            .map_err(|err| anyhow::anyhow!("waiting for GPU: {err}"))
    }
}
