//! Sun-biased radial streak shadows and the final light/shadow composite.

use glam::Vec2;
use log::debug;

use crate::backend::{Blend, DrawSource, ParamValue, QuadDraw, RenderBackend};
use crate::config::RenderConfig;
use crate::context::ShaderContext;
use crate::pipeline::{ShaderPass, bind_and_clear};
use crate::resources::{ResourceCache, TARGET_LIGHT, TARGET_SCREEN};
use crate::world::WorldSnapshot;

/// Daytime shadow strength before backdrop reduction.
const DAY_SHADOW_BASE: f32 = 1.05;
/// Nighttime shadow strength.
const NIGHT_SHADOW_BASE: f32 = 0.025;
/// Streak iterations at night.
const NIGHT_ITERATIONS: u32 = 22;
/// Streak alpha divisor at night.
const NIGHT_ALPHA_DIVISOR: f32 = 180.0;
/// Per-iteration scale growth shared by day and night streaks.
const ITERATION_SCALE: f32 = 0.018;
/// The directional pass draws the frame at a third of its size.
const SHADOW_SCALE: f32 = 0.333;
/// Streaks anchor on the sun position in reduced-target coordinates.
const STREAK_ANCHOR_DIVISOR: f32 = 3.0;

/// The shadow stage: a directional shadow render, a radial streak
/// accumulation centered on the sun, and the composite of the light and
/// shadow layers back into the frame.
pub struct ShadowPass;

impl ShadowPass {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ShadowPass {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: RenderBackend> ShaderPass<B> for ShadowPass {
    fn name(&self) -> &'static str {
        "Shadow"
    }

    fn is_enabled(&self, config: &RenderConfig) -> bool {
        config.lighting_enabled
    }

    fn execute(
        &mut self,
        ctx: &ShaderContext<'_, B>,
        cache: &ResourceCache<B>,
        backend: &mut B,
        config: &RenderConfig,
    ) {
        let (Some(effect), Some(screen), Some(light)) = (
            cache.effect("Shadow"),
            cache.render_target(TARGET_SCREEN),
            cache.render_target(TARGET_LIGHT),
        ) else {
            debug!("shadow resources unavailable, skipping");
            return;
        };

        // stage 1: directional shadow of the frame into the working target
        bind_and_clear(backend, screen);
        backend.begin(Blend::Additive);
        backend.apply_effect(effect, "Shadow");
        backend.set_param("uScreenResolution", ParamValue::Vec2(ctx.resolution));
        backend.set_param("m", ParamValue::Float(shadow_intensity(ctx.world)));
        backend.set_param(
            "uPos",
            ParamValue::Vec2(ctx.to_screen_coords(ctx.sun_position)),
        );
        backend.draw(
            DrawSource::Target(ctx.frame),
            QuadDraw::scaled(Vec2::ZERO, SHADOW_SCALE),
        );
        backend.end();

        // stage 2: radial streaks about the sun, growing and fading
        bind_and_clear(backend, ctx.frame);
        backend.begin(Blend::Additive);
        let anchor = ctx.sun_position / STREAK_ANCHOR_DIVISOR;
        let (iterations, divisor) = if ctx.is_day {
            (day_iterations(config), day_alpha_divisor(ctx.world, config))
        } else {
            (NIGHT_ITERATIONS, NIGHT_ALPHA_DIVISOR)
        };
        for i in 0..iterations {
            let alpha = (iterations - i) as f32 / divisor;
            let scale = 1.0 + i as f32 * ITERATION_SCALE;
            backend.draw(
                DrawSource::Target(screen),
                QuadDraw::scaled(anchor, scale)
                    .with_origin(anchor)
                    .with_alpha(alpha),
            );
        }
        backend.end();

        // stage 3: copy, re-add the original frame, then multiply the light
        // layer by the accumulated streak texture
        bind_and_clear(backend, screen);
        backend.begin(Blend::Alpha);
        backend.draw(DrawSource::Target(ctx.frame), QuadDraw::at(Vec2::ZERO));
        backend.end();

        bind_and_clear(backend, ctx.frame);
        backend.begin(Blend::Additive);
        backend.draw(DrawSource::Target(ctx.swap), QuadDraw::at(Vec2::ZERO));
        backend.end();

        backend.begin(Blend::Additive);
        backend.apply_effect(effect, "Blend");
        backend.set_param("tex0", ParamValue::Target(screen));
        backend.draw(DrawSource::Target(light), QuadDraw::at(Vec2::ZERO));
        backend.end();
    }
}

/// Directional shadow strength: near-full by day (less under a fading
/// desert backdrop, none under the bright one), a whisper at night.
pub(crate) fn shadow_intensity(world: &WorldSnapshot<'_>) -> f32 {
    let mut desert_reduction = world.backdrop.desert_layer_alpha * 0.1;
    if world.backdrop.bright_desert_active() {
        desert_reduction = 0.0;
    }

    if world.is_day {
        DAY_SHADOW_BASE - desert_reduction
    } else {
        NIGHT_SHADOW_BASE
    }
}

/// Number of daytime streak iterations.
pub(crate) fn day_iterations(config: &RenderConfig) -> u32 {
    config.quality * 10
}

/// Alpha divisor for the daytime streaks; higher quality draws more,
/// fainter streaks, and a dim snow backdrop fades them further.
pub(crate) fn day_alpha_divisor(world: &WorldSnapshot<'_>, config: &RenderConfig) -> f32 {
    let quality = config.quality as f32;
    let mut divisor = quality * 18.0 * (1.0 + quality * 0.16);

    if world.backdrop.dim_snow_active() {
        divisor -= world.backdrop.snow_layer_alpha * 30.0;
    }
    divisor
}
