//! Adaptive bright-pass extraction and additive blend-back.

use glam::Vec2;
use log::debug;

use crate::backend::{Blend, DrawSource, ParamValue, QuadDraw, RenderBackend};
use crate::config::RenderConfig;
use crate::context::{DAY_LENGTH, ShaderContext};
use crate::frame_cache::FrameCache;
use crate::pipeline::{ShaderPass, bind_and_clear, copy_frame_to_swap};
use crate::resources::{ResourceCache, TARGET_SCREEN};
use crate::world::{WorldSnapshot, ZoneFlags};

/// Brightness threshold before intensity and scene adaptation.
const BASE_THRESHOLD: f32 = 0.72;
/// How much the configured bloom intensity lowers the threshold.
const THRESHOLD_MODIFIER: f32 = 0.025;
/// Base blend-back strength.
const BLEND_MULTIPLIER: f32 = 1.65;
/// Base light-scattering strength.
const SCATTER_BASE: f32 = 1.85;
/// Extraction draws the frame down to a third of its size...
const EXTRACT_SCALE: f32 = 0.333;
/// ...and blend-back restores it; also the base of the bloom power curve.
const SCALE_DIVISOR: f32 = 3.0;

/// The bloom stage: extract bright pixels into the reduced "Screen" target,
/// then additively blend them back over the frame.
///
/// All four derived parameters are memoized per frame — the derivations
/// walk zone flags and sky state and are queried repeatedly within a frame.
pub struct BloomPass {
    threshold: FrameCache<f32>,
    scatter: FrameCache<f32>,
    power: FrameCache<f32>,
    multiplier: FrameCache<f32>,
}

impl BloomPass {
    pub fn new() -> Self {
        Self {
            threshold: FrameCache::new(),
            scatter: FrameCache::new(),
            power: FrameCache::new(),
            multiplier: FrameCache::new(),
        }
    }
}

impl Default for BloomPass {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: RenderBackend> ShaderPass<B> for BloomPass {
    fn name(&self) -> &'static str {
        "Bloom"
    }

    fn is_enabled(&self, config: &RenderConfig) -> bool {
        config.bloom_enabled
    }

    fn execute(
        &mut self,
        ctx: &ShaderContext<'_, B>,
        cache: &ResourceCache<B>,
        backend: &mut B,
        config: &RenderConfig,
    ) {
        let (Some(effect), Some(screen)) = (cache.effect("Bloom"), cache.render_target(TARGET_SCREEN))
        else {
            debug!("bloom resources unavailable, skipping");
            return;
        };

        copy_frame_to_swap(backend, ctx);
        bind_and_clear(backend, screen);

        // bright-pass extraction at reduced scale
        let frame = ctx.frame_index;
        let threshold = self
            .threshold
            .get_or_insert_with(frame, || adaptive_threshold(ctx.world, config));
        let scatter = self
            .scatter
            .get_or_insert_with(frame, || scatter_strength(ctx.world, config));

        backend.begin(Blend::Alpha);
        backend.apply_effect(effect, "Extract");
        backend.set_param("m", ParamValue::Float(threshold));
        backend.set_param("bloomScatter", ParamValue::Float(scatter));
        backend.draw(
            DrawSource::Target(ctx.frame),
            QuadDraw::scaled(Vec2::ZERO, EXTRACT_SCALE),
        );
        backend.end();

        // additive blend-back over the frame at full scale
        bind_and_clear(backend, ctx.frame);
        let power = self
            .power
            .get_or_insert_with(frame, || bloom_power(ctx.world));
        let multiplier = self
            .multiplier
            .get_or_insert_with(frame, || bloom_multiplier(ctx.world, config));

        backend.begin(Blend::Additive);
        backend.apply_effect(effect, "Blend");
        backend.set_param("tex0", ParamValue::Target(ctx.swap));
        backend.set_param("uScreenResolution", ParamValue::Vec2(ctx.resolution));
        backend.set_param("p", ParamValue::Float(power));
        backend.set_param("m2", ParamValue::Float(multiplier));
        backend.draw(
            DrawSource::Target(screen),
            QuadDraw::scaled(Vec2::ZERO, SCALE_DIVISOR),
        );
        backend.end();
    }
}

/// Brightness threshold for the bright-pass, adapted to scene conditions.
///
/// Raised toward solar noon (bright scenes over-bloom otherwise), lowered
/// flat at night, and nudged by biome: dark biomes bloom more readily,
/// bright and snowy ones less.
pub(crate) fn adaptive_threshold(world: &WorldSnapshot<'_>, config: &RenderConfig) -> f32 {
    let base = BASE_THRESHOLD - config.bloom_intensity * THRESHOLD_MODIFIER;

    let time_adaptation = if world.is_day {
        let day_progress = world.time_of_day / DAY_LENGTH;
        let noon_factor = 1.0 - (day_progress - 0.5).abs() * 2.0;
        1.0 + noon_factor * 0.3
    } else {
        0.7
    };

    let zones = world.player.zones;
    let location_adaptation = if zones.intersects(ZoneFlags::CORRUPT | ZoneFlags::CRIMSON) {
        0.8
    } else if zones.contains(ZoneFlags::RADIANT) {
        1.2
    } else if zones.contains(ZoneFlags::SNOW) {
        1.1
    } else {
        1.0
    };

    base * time_adaptation * location_adaptation
}

/// Light-scattering strength from atmospheric conditions.
pub(crate) fn scatter_strength(world: &WorldSnapshot<'_>, config: &RenderConfig) -> f32 {
    let mut scatter = SCATTER_BASE;

    let zones = world.player.zones;
    if zones.contains(ZoneFlags::JUNGLE) {
        scatter *= 1.3; // humid haze
    } else if zones.contains(ZoneFlags::SNOW) {
        scatter *= 1.2; // ice crystals in the air
    } else if zones.contains(ZoneFlags::DESERT) {
        scatter *= 1.1; // heat shimmer
    }

    if world.player.is_underground(world.surface_level) {
        scatter *= 0.7;
    }
    if !world.is_day {
        scatter *= 1.4;
    }

    scatter * config.bloom_intensity
}

/// Blend-back power: stronger in darker scenes, judged by mean sky
/// brightness.
pub(crate) fn bloom_power(world: &WorldSnapshot<'_>) -> f32 {
    let sky = world.sky_color;
    let scene_brightness = (sky.x + sky.y + sky.z) / 3.0;
    SCALE_DIVISOR * (1.0 + (1.0 - scene_brightness) * 0.5)
}

/// Blend-back multiplier: bloom reads stronger at night and in dark biomes.
pub(crate) fn bloom_multiplier(world: &WorldSnapshot<'_>, config: &RenderConfig) -> f32 {
    let mut multiplier = BLEND_MULTIPLIER * config.bloom_intensity;
    multiplier *= if world.is_day { 0.8 } else { 1.3 };

    if world
        .player
        .zones
        .intersects(ZoneFlags::CORRUPT | ZoneFlags::CRIMSON)
    {
        multiplier *= 1.2;
    }
    multiplier
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{world_fixture, StaticTiles};
    use approx::assert_relative_eq;
    use glam::Vec3;

    #[test]
    fn threshold_peaks_at_noon() {
        let tiles = StaticTiles::default();
        let mut world = world_fixture(&tiles);
        world.is_day = true;
        let config = RenderConfig::default();

        world.time_of_day = DAY_LENGTH / 2.0;
        let noon = adaptive_threshold(&world, &config);
        world.time_of_day = 0.0;
        let dawn = adaptive_threshold(&world, &config);

        let base = BASE_THRESHOLD - config.bloom_intensity * THRESHOLD_MODIFIER;
        assert_relative_eq!(noon, base * 1.3, epsilon = 1e-5);
        assert_relative_eq!(dawn, base, epsilon = 1e-5);
        assert!(noon > dawn);
    }

    #[test]
    fn threshold_drops_flat_at_night() {
        let tiles = StaticTiles::default();
        let mut world = world_fixture(&tiles);
        world.is_day = false;
        world.time_of_day = 1_000.0;
        let config = RenderConfig::default();

        let base = BASE_THRESHOLD - config.bloom_intensity * THRESHOLD_MODIFIER;
        assert_relative_eq!(adaptive_threshold(&world, &config), base * 0.7, epsilon = 1e-5);
    }

    #[test]
    fn threshold_biome_adaptation() {
        let tiles = StaticTiles::default();
        let mut world = world_fixture(&tiles);
        world.is_day = true;
        world.time_of_day = 0.0;
        let config = RenderConfig::default();
        let base = BASE_THRESHOLD - config.bloom_intensity * THRESHOLD_MODIFIER;

        world.player.zones = ZoneFlags::CORRUPT;
        assert_relative_eq!(adaptive_threshold(&world, &config), base * 0.8, epsilon = 1e-5);
        world.player.zones = ZoneFlags::RADIANT;
        assert_relative_eq!(adaptive_threshold(&world, &config), base * 1.2, epsilon = 1e-5);
        world.player.zones = ZoneFlags::SNOW;
        assert_relative_eq!(adaptive_threshold(&world, &config), base * 1.1, epsilon = 1e-5);
    }

    #[test]
    fn scatter_combines_biome_depth_and_night() {
        let tiles = StaticTiles::default();
        let mut world = world_fixture(&tiles);
        world.is_day = false;
        world.player.zones = ZoneFlags::JUNGLE | ZoneFlags::ROCK_LAYER;
        let config = RenderConfig {
            bloom_intensity: 0.5,
            ..RenderConfig::default()
        };

        let expected = SCATTER_BASE * 1.3 * 0.7 * 1.4 * 0.5;
        assert_relative_eq!(scatter_strength(&world, &config), expected, epsilon = 1e-5);
    }

    #[test]
    fn power_grows_in_dark_scenes() {
        let tiles = StaticTiles::default();
        let mut world = world_fixture(&tiles);

        world.sky_color = Vec3::ONE;
        assert_relative_eq!(bloom_power(&world), SCALE_DIVISOR, epsilon = 1e-5);
        world.sky_color = Vec3::ZERO;
        assert_relative_eq!(bloom_power(&world), SCALE_DIVISOR * 1.5, epsilon = 1e-5);
    }

    #[test]
    fn multiplier_day_night_and_dark_biome() {
        let tiles = StaticTiles::default();
        let mut world = world_fixture(&tiles);
        let config = RenderConfig::default();

        world.is_day = true;
        assert_relative_eq!(bloom_multiplier(&world, &config), BLEND_MULTIPLIER * 0.8, epsilon = 1e-5);

        world.is_day = false;
        world.player.zones = ZoneFlags::CRIMSON;
        assert_relative_eq!(
            bloom_multiplier(&world, &config),
            BLEND_MULTIPLIER * 1.3 * 1.2, epsilon = 1e-5);
    }

    #[test]
    fn derived_scalars_compute_once_per_frame() {
        use crate::resources::ResourceCache;
        use crate::testing::{RecordingBackend, StubLoader};

        let mut backend = RecordingBackend::new(1920, 1080);
        let mut cache = ResourceCache::new();
        cache
            .initialize(&mut StubLoader::default())
            .expect("stub assets load");
        cache.ensure_targets(&mut backend);

        let tiles = StaticTiles::default();
        let world = world_fixture(&tiles);
        let frame = backend.make_target("frame", 1920, 1080);
        let swap = backend.make_target("swap", 1920, 1080);
        let config = RenderConfig::default();

        let mut pass = BloomPass::new();
        let ctx = ShaderContext::new(&world, &frame, &swap);
        ShaderPass::<RecordingBackend>::execute(&mut pass, &ctx, &cache, &mut backend, &config);

        // a second execution in the same frame reuses every cached scalar
        let cached = pass.threshold.get(world.frame_index);
        ShaderPass::<RecordingBackend>::execute(&mut pass, &ctx, &cache, &mut backend, &config);
        assert_eq!(
            pass.threshold.get(world.frame_index).unwrap().to_bits(),
            cached.unwrap().to_bits()
        );

        // and an advanced frame recomputes
        let mut later = world;
        later.frame_index += 1;
        let ctx = ShaderContext::new(&later, &frame, &swap);
        ShaderPass::<RecordingBackend>::execute(&mut pass, &ctx, &cache, &mut backend, &config);
        assert!(pass.threshold.get(world.frame_index).is_none());
        assert!(pass.threshold.get(later.frame_index).is_some());
    }
}
