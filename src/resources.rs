//! Name-keyed ownership of every GPU-bound asset the pipeline touches.
//!
//! [`ResourceCache`] holds three tables — effects, static textures, render
//! targets — looked up by fixed symbolic names. The tables have different
//! lifecycles:
//!
//! * Effects and textures load once, up front, from the host's asset system
//!   via [`AssetLoader`]. Loading is safe on any thread because nothing here
//!   touches the device; a missing asset is fatal and propagates.
//! * Render targets exist in two phases: logically (a name the passes may
//!   ask for) and physically (a backend allocation). The physical phase
//!   requires the rendering thread and a live back buffer, so it is deferred
//!   to [`ensure_targets`](ResourceCache::ensure_targets), which the
//!   pipeline calls at the top of every frame. Until then — and whenever
//!   allocation fails — lookups return `None` and passes soft-skip.
//!
//! Teardown may be requested from any thread through a [`DisposeHandle`],
//! which posts a command consumed by
//! [`process_pending`](ResourceCache::process_pending) on the rendering
//! thread at the defined point in the frame loop. No resource is ever
//! released on the requesting thread.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};

use log::{debug, error, info};
use thiserror::Error;

use crate::backend::{BackendError, RenderBackend};

/// Effects the pipeline requires, by load name.
pub const EFFECT_NAMES: [&str; 3] = ["Light", "Shadow", "Bloom"];

/// Static textures the pipeline requires, by load name.
pub const TEXTURE_NAMES: [&str; 3] = ["ColorTexDay", "ColorTexNight", "PixelTex"];

/// Reduced-scale working target shared by bloom extraction and shadowing.
pub const TARGET_SCREEN: &str = "Screen";
/// Full-scale persistent light layer.
pub const TARGET_LIGHT: &str = "Light";
/// Reduced-scale bloom accumulation target.
pub const TARGET_BLOOM: &str = "Bloom";
/// Reduced-scale target reserved for the host's cloud overlay.
pub const TARGET_CLOUD: &str = "Cloud";

/// Divisor applied to the back-buffer size for the reduced-scale targets.
const TARGET_SCALE_DIVISOR: u32 = 3;

/// Fatal resource failures. Only asset loading propagates; target
/// allocation problems are logged and absorbed by the frame loop.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("failed to load required asset `{name}`")]
    Asset {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// The opaque-handle boundary to the host's asset system.
///
/// Shader binaries and static textures are packaged and compiled by the
/// host; the cache only asks for them by name. Errors are wrapped into
/// [`ResourceError::Asset`] and abort initialization.
pub trait AssetLoader<B: RenderBackend + ?Sized> {
    fn load_effect(
        &mut self,
        name: &str,
    ) -> Result<B::Effect, Box<dyn std::error::Error + Send + Sync>>;

    fn load_texture(
        &mut self,
        name: &str,
    ) -> Result<B::Texture, Box<dyn std::error::Error + Send + Sync>>;
}

enum CacheCommand {
    Dispose,
}

/// Posts teardown requests to the cache from any thread.
///
/// Cheap to clone; dropping every handle is harmless. The actual release
/// happens on the rendering thread when the cache next drains its queue —
/// a handle never touches resources itself.
#[derive(Clone)]
pub struct DisposeHandle {
    commands: Sender<CacheCommand>,
}

impl DisposeHandle {
    /// Requests disposal. Returns immediately; the request is consumed at
    /// the start of the next frame. Requests after disposal are ignored.
    pub fn dispose(&self) {
        let _ = self.commands.send(CacheCommand::Dispose);
    }
}

/// Owner of all named effects, textures, and render targets.
pub struct ResourceCache<B: RenderBackend> {
    effects: HashMap<&'static str, B::Effect>,
    textures: HashMap<&'static str, B::Texture>,
    targets: HashMap<&'static str, B::Target>,
    targets_ready: bool,
    disposed: bool,
    commands: Receiver<CacheCommand>,
    command_sender: Sender<CacheCommand>,
}

impl<B: RenderBackend> Default for ResourceCache<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: RenderBackend> ResourceCache<B> {
    pub fn new() -> Self {
        let (command_sender, commands) = mpsc::channel();
        Self {
            effects: HashMap::new(),
            textures: HashMap::new(),
            targets: HashMap::new(),
            targets_ready: false,
            disposed: false,
            commands,
            command_sender,
        }
    }

    /// Loads every required effect and texture.
    ///
    /// Safe to call off the rendering thread; never touches render targets.
    /// Any load failure propagates — the pipeline is meaningless without
    /// its shaders.
    pub fn initialize(&mut self, loader: &mut dyn AssetLoader<B>) -> Result<(), ResourceError> {
        if self.disposed {
            return Ok(());
        }

        for name in EFFECT_NAMES {
            let effect = loader.load_effect(name).map_err(|source| {
                ResourceError::Asset {
                    name: name.to_owned(),
                    source,
                }
            })?;
            self.effects.insert(name, effect);
        }
        for name in TEXTURE_NAMES {
            let texture = loader.load_texture(name).map_err(|source| {
                ResourceError::Asset {
                    name: name.to_owned(),
                    source,
                }
            })?;
            self.textures.insert(name, texture);
        }

        info!(
            "resource cache initialized ({} effects, {} textures)",
            self.effects.len(),
            self.textures.len()
        );
        Ok(())
    }

    /// Allocates the render targets if they do not exist yet.
    ///
    /// Idempotent; a no-op once initialized, after disposal, or when the
    /// backend reports no back buffer (headless). Allocation failure is
    /// logged and leaves the cache uninitialized so a later frame retries.
    pub fn ensure_targets(&mut self, backend: &mut B) {
        if self.disposed || self.targets_ready {
            return;
        }
        let Some((width, height)) = backend.backbuffer_size() else {
            return;
        };

        match Self::create_targets(backend, width, height) {
            Ok(targets) => {
                self.targets = targets;
                self.targets_ready = true;
                debug!("render targets created at {width}x{height}");
            }
            Err(err) => error!("error creating render targets: {err}"),
        }
    }

    /// Disposes and reallocates every render target at the new dimensions.
    ///
    /// Invoked from the host's resolution-change event. Failures are logged,
    /// never propagated: a bad resize must not take down the frame loop, it
    /// just costs the effects until targets come back.
    pub fn resize_targets(&mut self, backend: &mut B, width: u32, height: u32) {
        if self.disposed || backend.backbuffer_size().is_none() {
            return;
        }

        self.drop_targets();
        match Self::create_targets(backend, width, height) {
            Ok(targets) => {
                self.targets = targets;
                self.targets_ready = true;
                debug!("render targets resized to {width}x{height}");
            }
            Err(err) => {
                self.targets_ready = false;
                error!("error updating render targets: {err}");
            }
        }
    }

    fn create_targets(
        backend: &mut B,
        width: u32,
        height: u32,
    ) -> Result<HashMap<&'static str, B::Target>, BackendError> {
        let reduced = (width / TARGET_SCALE_DIVISOR, height / TARGET_SCALE_DIVISOR);

        let mut targets = HashMap::new();
        targets.insert(
            TARGET_SCREEN,
            backend.create_target(TARGET_SCREEN, reduced.0, reduced.1)?,
        );
        targets.insert(
            TARGET_LIGHT,
            backend.create_target(TARGET_LIGHT, width, height)?,
        );
        targets.insert(
            TARGET_BLOOM,
            backend.create_target(TARGET_BLOOM, reduced.0, reduced.1)?,
        );
        targets.insert(
            TARGET_CLOUD,
            backend.create_target(TARGET_CLOUD, reduced.0, reduced.1)?,
        );
        Ok(targets)
    }

    /// The named effect, or `None` when unknown or disposed.
    pub fn effect(&self, name: &str) -> Option<&B::Effect> {
        if self.disposed {
            None
        } else {
            self.effects.get(name)
        }
    }

    /// The named texture, or `None` when unknown or disposed.
    pub fn texture(&self, name: &str) -> Option<&B::Texture> {
        if self.disposed {
            None
        } else {
            self.textures.get(name)
        }
    }

    /// The named render target, or `None` before
    /// [`ensure_targets`](Self::ensure_targets) has run, after disposal, or
    /// for an unknown name.
    pub fn render_target(&self, name: &str) -> Option<&B::Target> {
        if self.disposed {
            None
        } else {
            self.targets.get(name)
        }
    }

    /// A cloneable, `Send` handle for requesting disposal from other threads.
    pub fn dispose_handle(&self) -> DisposeHandle {
        DisposeHandle {
            commands: self.command_sender.clone(),
        }
    }

    /// Drains queued commands. Called by the pipeline at the start of every
    /// frame, on the rendering thread — the only place cross-thread
    /// disposal requests actually execute.
    pub fn process_pending(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                CacheCommand::Dispose => self.dispose(),
            }
        }
    }

    /// Releases everything. Idempotent; afterwards all lookups return
    /// `None`. Render targets go first (the most exhaustion-prone
    /// resources), then the effect and texture tables are cleared.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        self.drop_targets();
        self.effects.clear();
        self.textures.clear();
        self.targets_ready = false;
        debug!("resource cache disposed");
    }

    fn drop_targets(&mut self) {
        // released one by one so a single misbehaving handle cannot keep
        // the rest alive
        for (name, target) in self.targets.drain() {
            drop(target);
            debug!("released render target `{name}`");
        }
    }
}
