//! Test doubles: a recording backend, a stub asset loader, and world
//! fixtures.
//!
//! The backend records every call the pipeline makes as an [`Op`], which is
//! what lets the tests assert pass ordering, draw counts, and zero-side-
//! effect skips without a GPU. Targets log the thread they are released on
//! so the cross-thread disposal contract is checkable.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use glam::{Vec2, Vec3};

use crate::backend::{Blend, BackendError, DrawSource, ParamValue, QuadDraw, RenderBackend};
use crate::lights::LightKind;
use crate::resources::AssetLoader;
use crate::world::{Backdrop, PlayerSnapshot, TileQuery, WorldSnapshot, ZoneFlags};

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Op {
    Bind(String),
    Clear,
    Begin(Blend),
    Effect { effect: String, pass: String },
    Param(String),
    Draw { source: String, scale: f32, alpha: f32 },
    End,
}

#[derive(Debug)]
pub(crate) struct MockEffect {
    pub name: &'static str,
}

#[derive(Debug)]
pub(crate) struct MockTexture {
    pub name: &'static str,
}

#[derive(Debug)]
struct TargetInner {
    label: String,
    width: u32,
    height: u32,
    id: u64,
    drop_log: Arc<Mutex<Vec<(String, ThreadId)>>>,
}

impl Drop for TargetInner {
    fn drop(&mut self) {
        self.drop_log
            .lock()
            .unwrap()
            .push((self.label.clone(), thread::current().id()));
    }
}

/// A fake render target; clones alias the same allocation, and the
/// allocation records which thread finally released it.
#[derive(Debug, Clone)]
pub(crate) struct MockTarget(Arc<TargetInner>);

impl MockTarget {
    pub fn label(&self) -> &str {
        &self.0.label
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }
}

/// A standalone target for contexts that need one without a backend.
pub(crate) fn plain_target(label: &str) -> MockTarget {
    MockTarget(Arc::new(TargetInner {
        label: label.to_owned(),
        width: 1920,
        height: 1080,
        id: u64::MAX,
        drop_log: Arc::new(Mutex::new(Vec::new())),
    }))
}

/// A [`RenderBackend`] that allocates nothing and remembers everything.
pub(crate) struct RecordingBackend {
    pub ops: Vec<Op>,
    pub fail_target_creation: bool,
    backbuffer: Option<(u32, u32)>,
    next_id: u64,
    created: u64,
    drop_log: Arc<Mutex<Vec<(String, ThreadId)>>>,
}

impl RecordingBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            ops: Vec::new(),
            fail_target_creation: false,
            backbuffer: Some((width, height)),
            next_id: 1,
            created: 0,
            drop_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn headless() -> Self {
        Self {
            backbuffer: None,
            ..Self::new(0, 0)
        }
    }

    /// Builds a target outside the cache (the host's frame/swap targets).
    pub fn make_target(&mut self, label: &str, width: u32, height: u32) -> MockTarget {
        let id = self.next_id;
        self.next_id += 1;
        MockTarget(Arc::new(TargetInner {
            label: label.to_owned(),
            width,
            height,
            id,
            drop_log: Arc::clone(&self.drop_log),
        }))
    }

    /// Number of targets allocated through the trait.
    pub fn created_targets(&self) -> u64 {
        self.created
    }

    /// Number of target allocations released so far.
    pub fn dropped_targets(&self) -> usize {
        self.drop_log.lock().unwrap().len()
    }

    /// Thread ids the released targets were dropped on.
    pub fn target_drop_threads(&self) -> Vec<ThreadId> {
        self.drop_log
            .lock()
            .unwrap()
            .iter()
            .map(|(_, thread_id)| *thread_id)
            .collect()
    }

    fn source_label(source: &DrawSource<'_, Self>) -> String {
        match source {
            DrawSource::Texture(texture) => texture.name.to_owned(),
            DrawSource::Target(target) => target.label().to_owned(),
        }
    }
}

impl RenderBackend for RecordingBackend {
    type Effect = MockEffect;
    type Texture = MockTexture;
    type Target = MockTarget;

    fn backbuffer_size(&self) -> Option<(u32, u32)> {
        self.backbuffer
    }

    fn create_target(
        &mut self,
        label: &str,
        width: u32,
        height: u32,
    ) -> Result<Self::Target, BackendError> {
        if self.fail_target_creation {
            return Err(BackendError::Allocation(format!(
                "simulated failure allocating `{label}`"
            )));
        }
        let target = self.make_target(label, width, height);
        self.created += 1;
        Ok(target)
    }

    fn target_size(&self, target: &Self::Target) -> (u32, u32) {
        (target.0.width, target.0.height)
    }

    fn bind_target(&mut self, target: &Self::Target) {
        self.ops.push(Op::Bind(target.label().to_owned()));
    }

    fn clear(&mut self) {
        self.ops.push(Op::Clear);
    }

    fn begin(&mut self, blend: Blend) {
        self.ops.push(Op::Begin(blend));
    }

    fn apply_effect(&mut self, effect: &Self::Effect, pass: &str) {
        self.ops.push(Op::Effect {
            effect: effect.name.to_owned(),
            pass: pass.to_owned(),
        });
    }

    fn set_param(&mut self, name: &str, _value: ParamValue<'_, Self>) {
        self.ops.push(Op::Param(name.to_owned()));
    }

    fn draw(&mut self, source: DrawSource<'_, Self>, quad: QuadDraw) {
        self.ops.push(Op::Draw {
            source: Self::source_label(&source),
            scale: quad.scale,
            alpha: quad.alpha,
        });
    }

    fn end(&mut self) {
        self.ops.push(Op::End);
    }
}

/// Asset loader handing out mock effects/textures, optionally failing for
/// one name.
#[derive(Default)]
pub(crate) struct StubLoader {
    fail_name: Option<&'static str>,
}

impl StubLoader {
    pub fn failing(name: &'static str) -> Self {
        Self {
            fail_name: Some(name),
        }
    }

    fn check(&self, name: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        match self.fail_name {
            Some(failing) if failing == name => Err(format!("asset `{name}` not found").into()),
            _ => Ok(()),
        }
    }
}

impl AssetLoader<RecordingBackend> for StubLoader {
    fn load_effect(
        &mut self,
        name: &str,
    ) -> Result<MockEffect, Box<dyn std::error::Error + Send + Sync>> {
        self.check(name)?;
        let name = crate::resources::EFFECT_NAMES
            .iter()
            .find(|known| **known == name)
            .copied()
            .unwrap_or("unknown");
        Ok(MockEffect { name })
    }

    fn load_texture(
        &mut self,
        name: &str,
    ) -> Result<MockTexture, Box<dyn std::error::Error + Send + Sync>> {
        self.check(name)?;
        let name = crate::resources::TEXTURE_NAMES
            .iter()
            .find(|known| **known == name)
            .copied()
            .unwrap_or("unknown");
        Ok(MockTexture { name })
    }
}

/// In-memory tile grid for scan tests.
#[derive(Default)]
pub(crate) struct StaticTiles {
    lights: HashMap<(i32, i32), LightKind>,
}

impl StaticTiles {
    pub fn place(&mut self, x: i32, y: i32, kind: LightKind) {
        self.lights.insert((x, y), kind);
    }
}

impl TileQuery for StaticTiles {
    fn in_world(&self, x: i32, y: i32) -> bool {
        (0..8400).contains(&x) && (0..2400).contains(&y)
    }

    fn light_kind(&self, x: i32, y: i32) -> Option<LightKind> {
        self.lights.get(&(x, y)).copied()
    }
}

/// A daytime snapshot with the player at tile (100, 100) and quiet
/// surroundings; tests override the fields they care about.
pub(crate) fn world_fixture(tiles: &StaticTiles) -> WorldSnapshot<'_> {
    WorldSnapshot {
        frame_index: 1,
        screen_size: Vec2::new(1920.0, 1080.0),
        camera_position: Vec2::ZERO,
        time_of_day: 13_500.0,
        is_day: true,
        sun_offset_y: 0.0,
        surface_level: 300.0,
        sky_color: Vec3::new(0.4, 0.5, 0.8),
        moon_phase: 1,
        backdrop: Backdrop::default(),
        player: PlayerSnapshot {
            position: Vec2::new(100.0 * 16.0 + 8.0, 100.0 * 16.0 + 8.0),
            zones: ZoneFlags::empty(),
            held_light: None,
            equipped_lights: &[],
        },
        tiles,
    }
}
