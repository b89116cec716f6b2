//! The per-frame context handed to every pass, and the solar position math.

use glam::Vec2;

use crate::backend::RenderBackend;
use crate::world::WorldSnapshot;

/// Total length of a day segment, in host time units.
pub const DAY_LENGTH: f32 = 54_000.0;

/// Total length of a night segment, in host time units.
pub const NIGHT_LENGTH: f32 = 32_400.0;

/// Immutable value bundle built once per frame and shared by all passes.
///
/// Nothing in here is owned: the captured frame and swap targets are
/// borrowed from the host for the duration of the frame, and the world
/// snapshot is the host state the frame was captured under. Passes read the
/// context, never mutate it — which is what keeps them order-dependent only
/// through the render targets they write.
pub struct ShaderContext<'f, B: RenderBackend + ?Sized> {
    /// The captured frame being transformed; also the pipeline's output.
    pub frame: &'f B::Target,
    /// Host-provided scratch target for whole-frame copies.
    pub swap: &'f B::Target,
    /// Screen resolution in pixels.
    pub resolution: Vec2,
    /// Sun (or moon) position in screen pixels for this frame.
    pub sun_position: Vec2,
    pub is_day: bool,
    /// Elapsed time within the current day/night segment.
    pub time_of_day: f32,
    /// Frame counter keying the memoization caches.
    pub frame_index: u64,
    pub world: &'f WorldSnapshot<'f>,
}

impl<'f, B: RenderBackend + ?Sized> ShaderContext<'f, B> {
    pub fn new(world: &'f WorldSnapshot<'f>, frame: &'f B::Target, swap: &'f B::Target) -> Self {
        Self {
            frame,
            swap,
            resolution: world.screen_size,
            sun_position: sun_position(world),
            is_day: world.is_day,
            time_of_day: world.time_of_day,
            frame_index: world.frame_index,
            world,
        }
    }

    /// Normalizes a pixel position by the screen resolution.
    pub fn to_screen_coords(&self, position: Vec2) -> Vec2 {
        position / self.resolution
    }

    /// Fraction of the current day or night segment elapsed, in `[0, 1)`.
    pub fn segment_fraction(&self) -> f32 {
        self.time_of_day / if self.is_day { DAY_LENGTH } else { NIGHT_LENGTH }
    }
}

/// Screen position of the sun (by day) or moon (by night).
///
/// Deterministic in the snapshot; must reproduce the host's own sky
/// rendering to stay visually aligned with it. Horizontally the body sweeps
/// `-100` → `screen_width + 100` linearly over the segment. Vertically the
/// daytime path is piecewise-quadratic — a parabola peaking at midday,
/// expressed in two halves to match the background gradient renderer —
/// lifted by a backdrop-scroll term and the host's vertical offset. At
/// night the vertical position stays at the base offset.
pub fn sun_position(world: &WorldSnapshot<'_>) -> Vec2 {
    let bg_top = ((0.0 - f64::from(world.camera_position.y))
        / (f64::from(world.surface_level) * 16.0 - 600.0)
        * 200.0) as i32 as f32;

    let time = world.time_of_day;
    let mut height = 0.0;
    if world.is_day {
        let arc = if time < DAY_LENGTH / 2.0 {
            1.0 - time / DAY_LENGTH * 2.0
        } else {
            (time / DAY_LENGTH - 0.5) * 2.0
        };
        height = bg_top + arc * arc * 250.0 + 180.0;
    }

    let segment = if world.is_day { DAY_LENGTH } else { NIGHT_LENGTH };
    Vec2::new(
        time / segment * (world.screen_size.x + 200.0) - 100.0,
        height + world.sun_offset_y,
    )
}
