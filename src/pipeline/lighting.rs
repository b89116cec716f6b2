//! Dynamic light discovery and the ambient/directional light layer.

use glam::Vec2;
use log::debug;

use crate::backend::{Blend, DrawSource, ParamValue, QuadDraw, RenderBackend};
use crate::config::RenderConfig;
use crate::context::ShaderContext;
use crate::lights::{LightKind, LightSlots, LightSource};
use crate::pipeline::{ShaderPass, bind_and_clear, copy_frame_to_swap};
use crate::resources::{ResourceCache, TARGET_LIGHT};
use crate::world::{TILE_SIZE, WorldSnapshot, ZoneFlags};

/// Tiles of padding around the viewport for the scan bounding box.
const SCAN_PADDING_TILES: i32 = 400;
/// Upper bound on the expanding-ring search radius, in tiles.
const MAX_SCAN_RADIUS: i32 = 25;
/// Squared-distance cull radius for world sources, in pixels.
const MAX_LIGHT_DISTANCE: f32 = 800.0;
/// Daytime composite intensity floor.
const BASE_INTENSITY: f32 = 0.82;
/// Weight of the scene-brightness term in the daytime composite.
const INTENSITY_MULTIPLIER: f32 = 1.15;

/// Screen-space tile box the world scan is confined to.
#[derive(Debug, Clone, Copy)]
struct ScanBounds {
    left: i32,
    right: i32,
    top: i32,
    bottom: i32,
}

impl ScanBounds {
    fn around_viewport(world: &WorldSnapshot<'_>) -> Self {
        let camera = world.camera_position;
        let size = world.screen_size;
        Self {
            left: (camera.x / TILE_SIZE) as i32 - SCAN_PADDING_TILES,
            right: ((camera.x + size.x) / TILE_SIZE) as i32 + SCAN_PADDING_TILES,
            top: (camera.y / TILE_SIZE) as i32 - SCAN_PADDING_TILES,
            bottom: ((camera.y + size.y) / TILE_SIZE) as i32 + SCAN_PADDING_TILES,
        }
    }

    fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.left && x <= self.right && y >= self.top && y <= self.bottom
    }
}

/// The lighting stage: scans for the two strongest nearby light sources,
/// packs them into shader uniforms, and renders the light layer through the
/// day/night color lookup.
pub struct LightingPass {
    slots: LightSlots,
}

impl LightingPass {
    pub fn new() -> Self {
        Self {
            slots: LightSlots::default(),
        }
    }

    /// Rebuilds the light source set from scratch for this frame.
    ///
    /// Player-carried emitters take priority, then placed world emitters in
    /// expanding rings around the player so the nearest fill the cap first.
    fn gather(&mut self, world: &WorldSnapshot<'_>) {
        self.slots.clear();
        let bounds = ScanBounds::around_viewport(world);
        self.scan_player(world);
        self.scan_world(world, bounds);
    }

    fn scan_player(&mut self, world: &WorldSnapshot<'_>) {
        let player = &world.player;
        if let Some(kind) = player.held_light {
            self.add(world, player.position, kind);
        }
        for kind in player.equipped_lights.iter().flatten() {
            if self.slots.is_full() {
                break;
            }
            self.add(world, player.position, *kind);
        }
    }

    fn scan_world(&mut self, world: &WorldSnapshot<'_>, bounds: ScanBounds) {
        let (player_x, player_y) = world.player.tile();

        for radius in 0..MAX_SCAN_RADIUS {
            if self.slots.is_full() {
                return;
            }
            for dx in -radius..=radius {
                for dy in -radius..=radius {
                    // perimeter cells only; the interior was covered by
                    // smaller rings
                    if dx.abs() != radius && dy.abs() != radius {
                        continue;
                    }
                    if self.slots.is_full() {
                        return;
                    }

                    let (x, y) = (player_x + dx, player_y + dy);
                    if !bounds.contains(x, y) || !world.tiles.in_world(x, y) {
                        continue;
                    }
                    let Some(kind) = world.tiles.light_kind(x, y) else {
                        continue;
                    };

                    let position = Vec2::new(
                        x as f32 * TILE_SIZE + TILE_SIZE / 2.0,
                        y as f32 * TILE_SIZE + TILE_SIZE / 2.0,
                    );
                    if position.distance_squared(world.player.position)
                        < MAX_LIGHT_DISTANCE * MAX_LIGHT_DISTANCE
                    {
                        self.add(world, position, kind);
                    }
                }
            }
        }
    }

    fn add(&mut self, world: &WorldSnapshot<'_>, position: Vec2, kind: LightKind) {
        let screen_position = (position - world.camera_position) / world.screen_size;
        self.slots.push(LightSource {
            world_position: position,
            screen_position,
            color: kind.color(),
            intensity: kind.intensity(),
        });
    }
}

impl Default for LightingPass {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: RenderBackend> ShaderPass<B> for LightingPass {
    fn name(&self) -> &'static str {
        "Lighting"
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
        let (Some(effect), Some(light_target)) =
            (cache.effect("Light"), cache.render_target(TARGET_LIGHT))
        else {
            debug!("lighting resources unavailable, skipping");
            return;
        };

        self.gather(ctx.world);

        copy_frame_to_swap(backend, ctx);
        bind_and_clear(backend, light_target);

        backend.begin(Blend::NonPremultiplied);
        backend.apply_effect(effect, "Light");
        backend.set_param("uScreenResolution", ParamValue::Vec2(ctx.resolution));
        backend.set_param(
            "uPos",
            ParamValue::Vec2(ctx.to_screen_coords(ctx.sun_position)),
        );

        let lookup = if ctx.is_day {
            cache.texture("ColorTexDay")
        } else {
            cache.texture("ColorTexNight")
        };
        if let Some(texture) = lookup {
            backend.set_param("tex0", ParamValue::Texture(texture));
        }

        backend.set_param("uLightCount", ParamValue::Int(self.slots.len() as i32));
        if !self.slots.is_empty() {
            let (light_pos, light_data) = self.slots.packed();
            backend.set_param("uLightPos", ParamValue::Vec4(light_pos));
            backend.set_param("uLightData", ParamValue::Vec4(light_data));
        }

        backend.set_param(
            "intensity",
            ParamValue::Float(composite_intensity(ctx.world, config)),
        );
        backend.set_param("t", ParamValue::Float(ctx.segment_fraction()));

        // the flat ambient layer only applies above ground; cave interiors
        // keep their own darkness
        if ctx.world.player.is_above_surface(ctx.world.surface_level) {
            if let Some(pixel) = cache.texture("PixelTex") {
                backend.draw(
                    DrawSource::Texture(pixel),
                    QuadDraw::stretched(ctx.resolution),
                );
            }
        }

        backend.end();
    }
}

/// Scene brightness term from the sky color, adjusted by zone and backdrop.
///
/// The weighted RGB average is inverted so dark skies raise the light
/// layer's contribution.
pub(crate) fn scene_intensity(world: &WorldSnapshot<'_>) -> f32 {
    let sky = world.sky_color;
    let mut intensity = 1.0 - 1.2 * (sky.x * 0.3 + sky.y * 0.6 + sky.z * 0.1);

    let zones = world.player.zones;
    if zones.contains(ZoneFlags::SNOW)
        && !zones.intersects(ZoneFlags::CRIMSON | ZoneFlags::CORRUPT)
    {
        intensity -= world.backdrop.snow_layer_alpha * 0.1;
    }
    if zones.contains(ZoneFlags::CRIMSON) {
        intensity += 0.2;
    }

    if world.backdrop.dim_snow_active() {
        intensity -= world.backdrop.snow_layer_alpha;
    }
    if world.backdrop.bright_desert_active() {
        intensity -= world.backdrop.desert_layer_alpha * 0.6;
    }

    intensity
}

/// Moon-phase brightness table; full moon washes the lights out most.
pub(crate) fn moon_factor(phase: u8) -> f32 {
    match phase {
        0 => 1.01,
        3 | 5 => 0.9,
        4 => 0.6,
        _ => 1.0,
    }
}

/// The intensity uniform: daytime couples the configured light intensity
/// with scene brightness, nighttime squares the moon factor under the
/// moonlight setting.
pub(crate) fn composite_intensity(world: &WorldSnapshot<'_>, config: &RenderConfig) -> f32 {
    if world.is_day {
        config.light_intensity * (BASE_INTENSITY + scene_intensity(world) * INTENSITY_MULTIPLIER)
    } else {
        let moon = moon_factor(world.moon_phase);
        config.moonlight_intensity * moon * moon
    }
}
