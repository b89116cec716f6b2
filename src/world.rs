//! Read-only host state consumed by the pipeline each frame.
//!
//! Everything in here is owned by the host game: the pipeline borrows a
//! [`WorldSnapshot`] for the duration of one frame and never writes back.
//! Engine-specific identifiers stop at this boundary — tiles and items reach
//! the pipeline only as [`LightKind`]s via [`TileQuery`] and
//! [`PlayerSnapshot`], and backdrop styles as plain numeric ids the
//! derivation constants understand.

use bitflags::bitflags;
use glam::{Vec2, Vec3};

use crate::lights::LightKind;

/// World-to-pixel conversion factor for tile coordinates.
pub const TILE_SIZE: f32 = 16.0;

/// Extra depth (in pixels) below the nominal surface line that still counts
/// as "above ground" for the ambient overlay and scatter damping.
pub const SURFACE_DEPTH_MARGIN: f32 = 800.0;

/// Backdrop styles that darken the scene when their snow layer fades in.
pub const DIM_SNOW_STYLES: [u16; 3] = [263, 258, 267];

/// The one desert backdrop style bright enough to cancel shadowing.
pub const BRIGHT_DESERT_STYLE: u16 = 248;

bitflags! {
    /// Environmental region flags for the player's current location.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ZoneFlags: u16 {
        const SNOW = 1 << 0;
        const DESERT = 1 << 1;
        const JUNGLE = 1 << 2;
        /// Dark, corrupted terrain.
        const CORRUPT = 1 << 3;
        /// Dark, crimson-tinged terrain.
        const CRIMSON = 1 << 4;
        /// Bright, luminous terrain.
        const RADIANT = 1 << 5;
        /// Player is inside the upper underground layer.
        const DIRT_LAYER = 1 << 6;
        /// Player is inside the deep underground layer.
        const ROCK_LAYER = 1 << 7;
    }
}

/// Adapter over the host's tile grid.
///
/// The host implements this against its own world storage and performs the
/// tile-id → [`LightKind`] mapping, so the scan code never sees raw ids.
pub trait TileQuery {
    /// Whether `(x, y)` lies inside the world bounds.
    fn in_world(&self, x: i32, y: i32) -> bool;

    /// The light-emitting kind occupying the tile, if any.
    fn light_kind(&self, x: i32, y: i32) -> Option<LightKind>;
}

/// Background layer state feeding the lighting/shadow derivations.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Backdrop {
    /// Active snow backdrop style id.
    pub snow_style: u16,
    /// Active desert backdrop style id.
    pub desert_style: u16,
    /// Blend weight of the snow front layer, in `[0, 1]`.
    pub snow_layer_alpha: f32,
    /// Blend weight of the desert front layer, in `[0, 1]`.
    pub desert_layer_alpha: f32,
}

impl Backdrop {
    /// Whether one of the darkening snow backdrops is active.
    pub fn dim_snow_active(&self) -> bool {
        DIM_SNOW_STYLES.contains(&self.snow_style)
    }

    /// Whether the bright desert backdrop is active.
    pub fn bright_desert_active(&self) -> bool {
        self.desert_style == BRIGHT_DESERT_STYLE
    }
}

/// Per-frame view of the local player.
#[derive(Debug, Clone, Copy)]
pub struct PlayerSnapshot<'a> {
    /// Center position in world pixels.
    pub position: Vec2,
    pub zones: ZoneFlags,
    /// Light kind of the held item, if it emits.
    pub held_light: Option<LightKind>,
    /// Light kinds of equipped armor/accessory slots, in slot order.
    pub equipped_lights: &'a [Option<LightKind>],
}

impl PlayerSnapshot<'_> {
    /// The player's position in tile coordinates.
    pub fn tile(&self) -> (i32, i32) {
        (
            (self.position.x / TILE_SIZE) as i32,
            (self.position.y / TILE_SIZE) as i32,
        )
    }

    /// Whether the player counts as underground for atmospheric damping.
    ///
    /// True inside either underground layer, or once the player sinks past
    /// the surface line plus margin regardless of layer flags.
    pub fn is_underground(&self, surface_level: f32) -> bool {
        self.zones
            .intersects(ZoneFlags::DIRT_LAYER | ZoneFlags::ROCK_LAYER)
            || self.position.y > surface_level * TILE_SIZE + SURFACE_DEPTH_MARGIN
    }

    /// Whether the player is high enough for the full-screen ambient overlay.
    pub fn is_above_surface(&self, surface_level: f32) -> bool {
        self.position.y < surface_level * TILE_SIZE + SURFACE_DEPTH_MARGIN
    }
}

/// Immutable bundle of host state for one frame.
///
/// Built by the host right before invoking the pipeline; every field is a
/// plain value or a read-only borrow, so constructing one costs nothing and
/// holding one cannot outlive the frame.
#[derive(Clone, Copy)]
pub struct WorldSnapshot<'a> {
    /// Monotonic frame counter; keys the per-frame memoization caches.
    pub frame_index: u64,
    /// Screen resolution in pixels.
    pub screen_size: Vec2,
    /// Top-left of the viewport in world pixels.
    pub camera_position: Vec2,
    /// Elapsed time within the current day or night segment.
    pub time_of_day: f32,
    pub is_day: bool,
    /// Host-provided vertical offset applied to the computed sun position.
    pub sun_offset_y: f32,
    /// World surface height in tiles.
    pub surface_level: f32,
    /// Current sky color, components in `[0, 1]`.
    pub sky_color: Vec3,
    /// Moon phase index, `0..=7` (0 is new moon, 4 full).
    pub moon_phase: u8,
    pub backdrop: Backdrop,
    pub player: PlayerSnapshot<'a>,
    pub tiles: &'a dyn TileQuery,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(y: f32, zones: ZoneFlags) -> PlayerSnapshot<'static> {
        PlayerSnapshot {
            position: Vec2::new(4000.0, y),
            zones,
            held_light: None,
            equipped_lights: &[],
        }
    }

    #[test]
    fn depth_threshold_splits_surface_from_underground() {
        // surface at 300 tiles -> threshold at 300 * 16 + 800 = 5600 px
        let above = player(5599.0, ZoneFlags::empty());
        let below = player(5601.0, ZoneFlags::empty());

        assert!(above.is_above_surface(300.0));
        assert!(!above.is_underground(300.0));
        assert!(!below.is_above_surface(300.0));
        assert!(below.is_underground(300.0));
    }

    #[test]
    fn layer_flags_force_underground_even_when_shallow() {
        let caver = player(100.0, ZoneFlags::ROCK_LAYER);
        assert!(caver.is_underground(300.0));
        // the overlay check only looks at depth
        assert!(caver.is_above_surface(300.0));
    }

    #[test]
    fn backdrop_style_matching() {
        let mut backdrop = Backdrop::default();
        assert!(!backdrop.dim_snow_active());
        assert!(!backdrop.bright_desert_active());

        backdrop.snow_style = 258;
        backdrop.desert_style = BRIGHT_DESERT_STYLE;
        assert!(backdrop.dim_snow_active());
        assert!(backdrop.bright_desert_active());
    }
}
