//! Renderer crate for shaderreel.
//!
//! Turns a validated Shadertoy definition into something drawable and keeps it
//! drawing at an interactive rate. The overall flow for one render unit is:
//!
//! ```text
//!   Selector::attempts ──▶ BlobCache::get ──▶ shadertoy::parse
//!                                                  │ ContentDefinition
//!                                                  ▼
//!   RenderUnit::on_frame ◀── RenderResources ◀── materialize()
//!          │                                     (wrap + compile + channels)
//!          └─▶ RenderBackend::draw ─▶ ScaleController ─▶ resize_target
//! ```
//!
//! [`RenderUnit`] owns the backend, the bound resources, and the controller
//! state. The backend is a trait so the state machine can be exercised
//! without a GPU; [`gpu::WgpuBackend`] is the real implementation and renders
//! into an offscreen target.

mod backend;
pub mod compile;
pub mod gpu;
mod materialize;
mod scale;
#[cfg(test)]
mod testing;
mod texture;
mod uniforms;
mod unit;

pub use backend::{ChannelSlot, RenderBackend, RenderResources};
pub use compile::wrap_fragment;
pub use materialize::{materialize, MaterializeError, Materialized};
pub use scale::{scaled_size, ScaleController, HYSTERESIS, SCALE_SLOTS, SCALE_STEP};
pub use texture::TextureData;
pub use uniforms::{FrameUniforms, SAMPLE_RATE};
pub use unit::{ControllerState, FrameReport, LoadError, Phase, RenderUnit, UnitConfig};
