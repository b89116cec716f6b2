//! The ordered multi-pass shader pipeline.
//!
//! Three passes run in a fixed order against one shared [`ShaderContext`]:
//!
//! ```text
//! captured frame ──▶ Bloom ──▶ Lighting ──▶ Shadow ──▶ back to host
//!                      │           │            │
//!                      ▼           ▼            ▼
//!                  "Screen"     "Light"   "Screen"+"Light"
//! ```
//!
//! The order is load-bearing: Bloom works on the raw captured frame,
//! Lighting fills the persistent "Light" layer, and Shadow composites the
//! evolving frame with that layer — so it must come last. Each pass is
//! independently gated by the configuration and soft-skips when the
//! resources it needs are absent (the normal state during startup, before
//! render targets exist).

mod bloom;
mod lighting;
mod shadow;

pub use bloom::BloomPass;
pub use lighting::LightingPass;
pub use shadow::ShadowPass;

use glam::Vec2;
use log::{debug, trace};

use crate::backend::{Blend, DrawSource, QuadDraw, RenderBackend};
use crate::config::RenderConfig;
use crate::context::ShaderContext;
use crate::resources::ResourceCache;
use crate::world::WorldSnapshot;

/// One discrete shader-driven transformation stage.
///
/// Passes are data plus an `execute` entry point: per-pass state is limited
/// to frame-memoized scalars and scratch buffers, and everything else
/// arrives through the context, cache, and config each frame.
pub trait ShaderPass<B: RenderBackend> {
    fn name(&self) -> &'static str;

    /// Whether the pass runs this frame. A disabled pass is skipped
    /// entirely — no state mutation, no draws.
    fn is_enabled(&self, config: &RenderConfig) -> bool;

    fn execute(
        &mut self,
        ctx: &ShaderContext<'_, B>,
        cache: &ResourceCache<B>,
        backend: &mut B,
        config: &RenderConfig,
    );
}

/// The fixed, ordered pass list and the once-per-frame entry point.
pub struct ShaderPipeline<B: RenderBackend + 'static> {
    passes: Vec<Box<dyn ShaderPass<B>>>,
}

impl<B: RenderBackend + 'static> Default for ShaderPipeline<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: RenderBackend + 'static> ShaderPipeline<B> {
    /// Builds the standard Bloom → Lighting → Shadow pipeline.
    pub fn new() -> Self {
        Self {
            passes: vec![
                Box::new(BloomPass::new()),
                Box::new(LightingPass::new()),
                Box::new(ShadowPass::new()),
            ],
        }
    }

    /// Pass names in execution order.
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    /// Runs the pipeline once, transforming the captured `frame` in place.
    ///
    /// Called by the host after it has captured the frame into `frame` and
    /// handed over `swap` as scratch. Drains pending cache commands first
    /// (the defined point where cross-thread disposal executes), makes sure
    /// render targets exist, then runs every enabled pass in order against
    /// one freshly built context.
    pub fn execute(
        &mut self,
        backend: &mut B,
        cache: &mut ResourceCache<B>,
        config: &RenderConfig,
        world: &WorldSnapshot<'_>,
        frame: &B::Target,
        swap: &B::Target,
    ) {
        cache.process_pending();
        cache.ensure_targets(backend);

        let ctx = ShaderContext::new(world, frame, swap);
        for pass in &mut self.passes {
            if pass.is_enabled(config) {
                trace!("executing pass {}", pass.name());
                pass.execute(&ctx, cache, backend, config);
            } else {
                debug!("pass {} disabled, skipping", pass.name());
            }
        }
    }
}

/// Copies the current frame into the host's swap target.
///
/// The standard preamble of every pass that later samples the unmodified
/// frame while overwriting it.
pub(crate) fn copy_frame_to_swap<B: RenderBackend>(backend: &mut B, ctx: &ShaderContext<'_, B>) {
    backend.bind_target(ctx.swap);
    backend.clear();
    backend.begin(Blend::Alpha);
    backend.draw(DrawSource::Target(ctx.frame), QuadDraw::at(Vec2::ZERO));
    backend.end();
}

/// Binds a target and clears it to transparent.
pub(crate) fn bind_and_clear<B: RenderBackend>(backend: &mut B, target: &B::Target) {
    backend.bind_target(target);
    backend.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::ResourceCache;
    use crate::testing::{
        world_fixture, Op, RecordingBackend, StaticTiles, StubLoader,
    };

    fn ready_setup() -> (RecordingBackend, ResourceCache<RecordingBackend>) {
        let mut backend = RecordingBackend::new(1920, 1080);
        let mut cache = ResourceCache::new();
        cache
            .initialize(&mut StubLoader::default())
            .expect("stub assets load");
        cache.ensure_targets(&mut backend);
        backend.ops.clear();
        (backend, cache)
    }

    fn effect_passes(backend: &RecordingBackend) -> Vec<(String, String)> {
        backend
            .ops
            .iter()
            .filter_map(|op| match op {
                Op::Effect { effect, pass } => Some((effect.clone(), pass.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn pass_order_is_bloom_lighting_shadow() {
        let pipeline = ShaderPipeline::<RecordingBackend>::new();
        assert_eq!(pipeline.pass_names(), ["Bloom", "Lighting", "Shadow"]);
    }

    #[test]
    fn full_pipeline_runs_three_passes_in_order() {
        let (mut backend, mut cache) = ready_setup();
        let tiles = StaticTiles::default();
        let mut world = world_fixture(&tiles);
        world.is_day = true;
        world.time_of_day = 13_500.0;

        let frame = backend.make_target("frame", 1920, 1080);
        let swap = backend.make_target("swap", 1920, 1080);
        let config = RenderConfig {
            quality: 3,
            ..RenderConfig::default()
        };

        let mut pipeline = ShaderPipeline::new();
        pipeline.execute(&mut backend, &mut cache, &config, &world, &frame, &swap);

        let shaders = effect_passes(&backend);
        assert_eq!(
            shaders,
            [
                ("Bloom".to_owned(), "Extract".to_owned()),
                ("Bloom".to_owned(), "Blend".to_owned()),
                ("Light".to_owned(), "Light".to_owned()),
                ("Shadow".to_owned(), "Shadow".to_owned()),
                ("Shadow".to_owned(), "Blend".to_owned()),
            ]
        );

        // quality 3 by day: 30 shadow streak draws, recognizable by their
        // fading alpha
        let streaks = backend
            .ops
            .iter()
            .filter(|op| matches!(op, Op::Draw { alpha, .. } if *alpha < 1.0))
            .count();
        assert_eq!(streaks, 30);
    }

    #[test]
    fn disabled_lighting_leaves_only_bloom_work() {
        let (mut backend, mut cache) = ready_setup();
        let tiles = StaticTiles::default();
        let world = world_fixture(&tiles);

        let frame = backend.make_target("frame", 1920, 1080);
        let swap = backend.make_target("swap", 1920, 1080);
        let config = RenderConfig {
            lighting_enabled: false,
            ..RenderConfig::default()
        };

        let mut pipeline = ShaderPipeline::new();
        pipeline.execute(&mut backend, &mut cache, &config, &world, &frame, &swap);

        let shaders = effect_passes(&backend);
        assert_eq!(
            shaders,
            [
                ("Bloom".to_owned(), "Extract".to_owned()),
                ("Bloom".to_owned(), "Blend".to_owned()),
            ]
        );
        // no writes into the light layer
        assert!(!backend
            .ops
            .iter()
            .any(|op| matches!(op, Op::Bind(name) if name == "Light")));
    }

    #[test]
    fn everything_disabled_touches_nothing() {
        let (mut backend, mut cache) = ready_setup();
        let tiles = StaticTiles::default();
        let world = world_fixture(&tiles);

        let frame = backend.make_target("frame", 1920, 1080);
        let swap = backend.make_target("swap", 1920, 1080);
        let config = RenderConfig {
            lighting_enabled: false,
            bloom_enabled: false,
            ..RenderConfig::default()
        };

        let mut pipeline = ShaderPipeline::new();
        pipeline.execute(&mut backend, &mut cache, &config, &world, &frame, &swap);

        assert!(backend.ops.is_empty());
    }

    #[test]
    fn passes_soft_skip_without_render_targets() {
        // headless: ensure_targets never allocates, so every pass skips
        let mut backend = RecordingBackend::headless();
        let mut cache = ResourceCache::new();
        cache
            .initialize(&mut StubLoader::default())
            .expect("stub assets load");

        let tiles = StaticTiles::default();
        let world = world_fixture(&tiles);
        let frame = backend.make_target("frame", 1920, 1080);
        let swap = backend.make_target("swap", 1920, 1080);

        let mut pipeline = ShaderPipeline::new();
        pipeline.execute(
            &mut backend,
            &mut cache,
            &RenderConfig::default(),
            &world,
            &frame,
            &swap,
        );

        assert!(backend.ops.is_empty());
    }

    #[test]
    fn queued_disposal_executes_before_the_passes_run() {
        let (mut backend, mut cache) = ready_setup();
        let tiles = StaticTiles::default();
        let world = world_fixture(&tiles);

        cache.dispose_handle().dispose();

        let frame = backend.make_target("frame", 1920, 1080);
        let swap = backend.make_target("swap", 1920, 1080);
        let mut pipeline = ShaderPipeline::new();
        pipeline.execute(
            &mut backend,
            &mut cache,
            &RenderConfig::default(),
            &world,
            &frame,
            &swap,
        );

        // the cache tore down at frame start, so every pass soft-skipped
        assert!(backend.ops.is_empty());
        assert!(cache.effect("Bloom").is_none());
    }
}
