//! # Afterglow
//!
//! **Screen-space lighting, shadow, and bloom post-processing for 2D games.**
//!
//! Afterglow composites dynamic lighting, sun-biased streak shadows, and
//! adaptive bloom over a host game's captured frame, reacting every frame to
//! time of day, the player's biome, and nearby light-emitting objects. The
//! host stays in charge of everything else — windowing, asset packaging,
//! world simulation — and hands this crate a frame, a scratch buffer, and a
//! read-only snapshot of game state once per presented frame.
//!
//! ## Quick Start
//!
//! ```no_run
//! use afterglow::{RenderConfig, ResourceCache, ShaderPipeline};
//!
//! # fn run(mut backend: afterglow::WgpuBackend,
//! #        mut loader: impl afterglow::AssetLoader<afterglow::WgpuBackend>,
//! #        world: afterglow::WorldSnapshot<'_>,
//! #        frame: afterglow::WgpuTarget,
//! #        swap: afterglow::WgpuTarget) -> Result<(), afterglow::ResourceError> {
//! let mut cache = ResourceCache::new();
//! cache.initialize(&mut loader)?; // fatal if a shader or texture is missing
//!
//! let mut pipeline = ShaderPipeline::new();
//! let config = RenderConfig::default();
//!
//! // once per presented frame, after the host captured into `frame`:
//! pipeline.execute(&mut backend, &mut cache, &config, &world, &frame, &swap);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`ResourceCache`] owns every GPU-bound asset behind name-keyed lookup,
//!   with the render targets on a two-phase lifecycle (allocation waits for
//!   the rendering thread and a live back buffer) and cross-thread disposal
//!   marshaled through a command queue.
//! - [`ShaderPipeline`] runs the fixed Bloom → Lighting → Shadow pass order
//!   against one immutable per-frame [`ShaderContext`].
//! - Passes derive their shader parameters from the [`WorldSnapshot`]
//!   through pure functions, memoized per frame with [`FrameCache`].
//! - [`RenderBackend`] is the narrow device boundary; [`WgpuBackend`] is the
//!   production implementation.

mod backend;
mod config;
mod context;
mod frame_cache;
mod lights;
mod pipeline;
mod resources;
#[cfg(test)]
mod testing;
mod wgpu_backend;
mod world;

pub use backend::{BackendError, Blend, DrawSource, ParamValue, QuadDraw, RenderBackend};
pub use config::RenderConfig;
pub use context::{DAY_LENGTH, NIGHT_LENGTH, ShaderContext, sun_position};
pub use frame_cache::FrameCache;
pub use lights::{LightKind, LightSlots, LightSource};
pub use pipeline::{BloomPass, LightingPass, ShaderPass, ShaderPipeline, ShadowPass};
pub use resources::{
    AssetLoader, DisposeHandle, EFFECT_NAMES, ResourceCache, ResourceError, TARGET_BLOOM,
    TARGET_CLOUD, TARGET_LIGHT, TARGET_SCREEN, TEXTURE_NAMES,
};
pub use wgpu_backend::{WgpuBackend, WgpuEffect, WgpuTarget, WgpuTexture};
pub use world::{
    BRIGHT_DESERT_STYLE, Backdrop, DIM_SNOW_STYLES, PlayerSnapshot, SURFACE_DEPTH_MARGIN,
    TILE_SIZE, TileQuery, WorldSnapshot, ZoneFlags,
};

// Re-export glam math types for convenience
pub use glam::{Vec2, Vec3, Vec4};
