//! The rendering device boundary.
//!
//! The pipeline itself never talks to a GPU API. Every draw, clear, and
//! target allocation goes through [`RenderBackend`], a deliberately narrow
//! trait modeled on an immediate-mode sprite batch: bind a target, begin a
//! batch with a blend state, optionally select a shader technique pass and
//! set named parameters, draw quads, end. The production implementation is
//! [`crate::WgpuBackend`]; tests drive the pipeline against a recording
//! stand-in, which is also why the resource lifecycle can be verified
//! without a device.
//!
//! Handle types are associated so the core never names a graphics API:
//! effects and textures are whatever the host's asset system produced,
//! targets are whatever the backend allocates.

use glam::{Vec2, Vec4};
use thiserror::Error;

/// Failures surfaced by a backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// No device or back buffer exists (dedicated server, tests).
    #[error("no graphics device or back buffer is available")]
    Headless,
    /// A render target could not be allocated.
    #[error("render target allocation failed: {0}")]
    Allocation(String),
}

/// Blend state for one draw batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Blend {
    /// Standard alpha interpolation over the destination.
    Alpha,
    /// Source added onto the destination.
    Additive,
    /// Alpha blending of non-premultiplied source colors.
    NonPremultiplied,
}

/// A named shader parameter value.
///
/// Names are the wire contract with the packaged shader binaries
/// (`"m"`, `"uLightPos"`, ...); the backend maps them onto its own uniform
/// representation.
pub enum ParamValue<'a, B: RenderBackend + ?Sized> {
    Float(f32),
    Vec2(Vec2),
    Vec4(Vec4),
    Int(i32),
    Texture(&'a B::Texture),
    Target(&'a B::Target),
}

/// What a quad draw samples from.
pub enum DrawSource<'a, B: RenderBackend + ?Sized> {
    Texture(&'a B::Texture),
    Target(&'a B::Target),
}

/// One sprite-style quad draw.
///
/// `position` is the destination in pixels of the point that `origin`
/// (in scaled source pixels) lands on; the source is drawn at `scale` and
/// modulated by `alpha`. When `stretch` is set the source fills that pixel
/// extent instead and `origin`/`scale` are ignored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadDraw {
    pub position: Vec2,
    pub origin: Vec2,
    pub scale: f32,
    pub alpha: f32,
    pub stretch: Option<Vec2>,
}

impl QuadDraw {
    /// Draws the source unscaled with its top-left at `position`.
    pub fn at(position: Vec2) -> Self {
        Self {
            position,
            origin: Vec2::ZERO,
            scale: 1.0,
            alpha: 1.0,
            stretch: None,
        }
    }

    /// Draws the source uniformly scaled with its top-left at `position`.
    pub fn scaled(position: Vec2, scale: f32) -> Self {
        Self {
            scale,
            ..Self::at(position)
        }
    }

    /// Stretches the source to fill `size` pixels from the target origin.
    pub fn stretched(size: Vec2) -> Self {
        Self {
            stretch: Some(size),
            ..Self::at(Vec2::ZERO)
        }
    }

    pub fn with_origin(mut self, origin: Vec2) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }
}

/// The draw surface the pipeline runs against.
///
/// Implementations are free to batch: draws between [`begin`](Self::begin)
/// and [`end`](Self::end) share one blend state and shader selection, and
/// may be flushed lazily. Parameter sets apply to every draw issued after
/// them within the batch.
pub trait RenderBackend {
    /// Opaque compiled shader handle (a multi-pass "effect").
    type Effect;
    /// Opaque static texture handle.
    type Texture;
    /// Off-screen render target handle. `Clone` is required so the backend
    /// can retain the bound target across batched calls; clones must alias
    /// the same GPU resource.
    type Target: Clone;

    /// Current back-buffer dimensions, or `None` when running headless
    /// (no display surface — target creation becomes a no-op upstream).
    fn backbuffer_size(&self) -> Option<(u32, u32)>;

    /// Allocates an off-screen target that can be both drawn into and
    /// sampled from.
    fn create_target(
        &mut self,
        label: &str,
        width: u32,
        height: u32,
    ) -> Result<Self::Target, BackendError>;

    /// Dimensions of an allocated target.
    fn target_size(&self, target: &Self::Target) -> (u32, u32);

    /// Binds `target` as the destination for subsequent clears and draws.
    fn bind_target(&mut self, target: &Self::Target);

    /// Clears the bound target to transparent black.
    fn clear(&mut self);

    /// Opens a draw batch with the given blend state and no shader.
    fn begin(&mut self, blend: Blend);

    /// Selects a technique pass of `effect` for the remainder of the batch.
    fn apply_effect(&mut self, effect: &Self::Effect, pass: &str);

    /// Sets a named shader parameter for subsequent draws in the batch.
    fn set_param(&mut self, name: &str, value: ParamValue<'_, Self>);

    /// Queues one quad draw sampling from `source`.
    fn draw(&mut self, source: DrawSource<'_, Self>, quad: QuadDraw);

    /// Closes the batch, flushing any pending work.
    fn end(&mut self);
}
