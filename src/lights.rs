//! Dynamic light sources: kinds, tint/intensity catalog, and uniform packing.
//!
//! The pipeline is engine-agnostic: the host maps whatever identifiers its
//! world uses (item ids, tile ids) to a [`LightKind`] at the boundary, and
//! everything past that point works in terms of the abstract kind. The
//! catalog below fixes each kind's tint and strength; kinds without a tuned
//! entry fall back to a warm white at middling strength.

use glam::{Vec2, Vec3, Vec4};

/// Fallback tint for light emitters without a tuned catalog entry.
const WARM_WHITE: Vec3 = Vec3::new(1.0, 0.95, 0.8);

/// Fallback intensity for light emitters without a tuned catalog entry.
const DEFAULT_INTENSITY: f32 = 0.8;

/// An abstract kind of light-emitting object.
///
/// Covers both carried/equipped emitters and placed world emitters; the
/// scan code does not care which side a kind came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightKind {
    Torch,
    CursedTorch,
    IchorTorch,
    CoralTorch,
    Candle,
    Glowstick,
    FairyGlowstick,
    SpelunkerGlowstick,
    MinersLamp,
    JellyfishPendant,
    NightCharm,
    Flare,
    HeartLantern,
    SkullLantern,
    JackOLantern,
    DiscoBall,
    LavaLamp,
    Chandelier,
    Candelabra,
    Furnace,
    InfernalForge,
    VerdantForge,
    Campfire,
    FireflyJar,
    LightningJar,
    Lamp,
    PaperLantern,
    HeartCrystal,
    /// A source the host flagged as light-emitting without naming a kind.
    Generic,
}

impl LightKind {
    /// The 3-channel tint this kind casts.
    pub fn color(self) -> Vec3 {
        match self {
            Self::Torch => Vec3::new(1.0, 0.95, 0.8),
            Self::CursedTorch => Vec3::new(0.5, 1.0, 0.5),
            Self::IchorTorch => Vec3::new(1.0, 1.0, 0.5),
            Self::CoralTorch => Vec3::new(0.8, 0.4, 1.0),
            Self::Candle => Vec3::new(1.0, 0.9, 0.7),
            Self::Glowstick | Self::SpelunkerGlowstick => Vec3::new(0.7, 1.0, 0.7),
            Self::FairyGlowstick => Vec3::new(1.0, 0.7, 1.0),
            Self::MinersLamp => Vec3::new(1.0, 1.0, 0.9),
            Self::JellyfishPendant => Vec3::new(0.6, 0.8, 1.0),
            Self::NightCharm => Vec3::new(0.9, 0.7, 1.0),
            Self::Flare => Vec3::new(1.0, 0.5, 0.5),
            Self::HeartLantern | Self::HeartCrystal => Vec3::new(1.0, 0.8, 0.8),
            Self::SkullLantern => Vec3::new(0.9, 0.9, 0.7),
            Self::JackOLantern => Vec3::new(1.0, 0.7, 0.3),
            Self::DiscoBall => Vec3::new(0.8, 0.8, 1.0),
            Self::LavaLamp => Vec3::new(1.0, 0.6, 0.8),
            Self::Chandelier => Vec3::new(1.0, 0.95, 0.85),
            Self::Candelabra => Vec3::new(1.0, 0.9, 0.75),
            Self::Furnace => Vec3::new(1.0, 0.6, 0.4),
            Self::InfernalForge => Vec3::new(1.0, 0.5, 0.3),
            Self::VerdantForge => Vec3::new(0.8, 1.0, 0.8),
            Self::Campfire => Vec3::new(1.0, 0.8, 0.5),
            Self::FireflyJar => Vec3::new(0.9, 1.0, 0.7),
            Self::LightningJar => Vec3::new(0.7, 0.9, 1.0),
            Self::Lamp => Vec3::new(1.0, 1.0, 0.95),
            Self::PaperLantern => Vec3::new(1.0, 0.7, 0.5),
            Self::Generic => WARM_WHITE,
        }
    }

    /// The scalar intensity this kind casts at.
    pub fn intensity(self) -> f32 {
        match self {
            Self::Torch => 0.85,
            Self::CursedTorch | Self::IchorTorch => 0.9,
            Self::CoralTorch => 0.8,
            Self::Candle => 0.6,
            Self::Glowstick => 0.7,
            Self::MinersLamp => 1.0,
            Self::JellyfishPendant => 0.8,
            Self::NightCharm => 1.2,
            Self::Flare => 1.1,
            Self::HeartLantern => 0.9,
            Self::DiscoBall => 1.0,
            Self::LavaLamp => 0.8,
            Self::Chandelier => 1.2,
            Self::Candelabra => 1.0,
            Self::Furnace => 1.0,
            Self::InfernalForge => 1.1,
            Self::Campfire => 0.9,
            Self::Lamp => 1.0,
            Self::HeartCrystal => 0.8,
            _ => DEFAULT_INTENSITY,
        }
    }
}

/// One discovered light source, rebuilt from scratch every frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightSource {
    /// Position in world pixels.
    pub world_position: Vec2,
    /// Position normalized by screen resolution.
    pub screen_position: Vec2,
    /// Tint from the kind catalog.
    pub color: Vec3,
    /// Strength from the kind catalog.
    pub intensity: f32,
}

/// The per-frame set of active light sources, capped at two.
///
/// The cap is a shader-instruction-budget constraint, not a tuning choice:
/// the lighting shader receives exactly two packed slots. Slot 0 and 1 fill
/// in discovery order and the packed vectors stay zero for unused slots.
#[derive(Debug, Clone, Copy, Default)]
pub struct LightSlots {
    sources: [Option<LightSource>; Self::MAX],
    count: usize,
}

impl LightSlots {
    /// Hard cap on simultaneous light sources.
    pub const MAX: usize = 2;

    /// Empties both slots for a fresh scan.
    pub fn clear(&mut self) {
        self.sources = [None; Self::MAX];
        self.count = 0;
    }

    /// Records a source; returns `false` once the cap is reached.
    pub fn push(&mut self, source: LightSource) -> bool {
        if self.count >= Self::MAX {
            return false;
        }
        self.sources[self.count] = Some(source);
        self.count += 1;
        true
    }

    /// Number of active sources, always in `0..=2`.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count >= Self::MAX
    }

    /// The source in `slot`, if populated.
    pub fn get(&self, slot: usize) -> Option<&LightSource> {
        self.sources.get(slot).and_then(|s| s.as_ref())
    }

    /// Packs both slots into the shader's compact uniform layout:
    /// `light_pos = [s0.x, s0.y, s1.x, s1.y]`, `light_data = [i0, i1, 0, 0]`.
    pub fn packed(&self) -> (Vec4, Vec4) {
        let mut light_pos = Vec4::ZERO;
        let mut light_data = Vec4::ZERO;

        if let Some(first) = self.get(0) {
            light_pos.x = first.screen_position.x;
            light_pos.y = first.screen_position.y;
            light_data.x = first.intensity;
        }
        if let Some(second) = self.get(1) {
            light_pos.z = second.screen_position.x;
            light_pos.w = second.screen_position.y;
            light_data.y = second.intensity;
        }

        (light_pos, light_data)
    }
}
