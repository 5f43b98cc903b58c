use crate::layers::{self, LayerStack};
use crate::layout::{ConfigError, Layout};
use crate::persistence::{ConfigFlags, PersistenceDriver};
use crate::tap_hold::{HoldRole, Profile, ReleaseOutcome, Resolution, TapHoldResolver};
use crate::types::{
    CompositeOp, Edge, FeedbackKind, KeyEvent, Keycode, LayerId, MatrixPos, Modifier, OutputEvent,
};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, warn};

/// Counters for conditions the engine absorbs instead of failing on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub duplicate_press: u32,
    pub duplicate_release: u32,
    pub out_of_range: u32,
    pub persist_failures: u32,
}

/// What was engaged at press time for a currently-held position, so the
/// release always undoes exactly that even if the layer stack has moved on.
#[derive(Debug, Clone, Copy)]
enum Held {
    Code(u16),
    Modifier(Modifier),
    Layer(LayerId),
    DualRole,
    CompositeHold(Modifier),
    Inert,
}

/// The input-interpretation core: consumes scanner events one at a time,
/// fully resolving and dispatching each before the next, and returns the
/// output-layer events the caller forwards to the host.
pub struct Engine {
    layout: Layout,
    profile: Profile,
    layers: LayerStack,
    resolver: TapHoldResolver,
    held: HashMap<MatrixPos, Held>,
    flags: ConfigFlags,
    store: Box<dyn PersistenceDriver + Send>,
    feedback: Option<Box<dyn Fn(FeedbackKind) + Send + Sync>>,
    diag: Diagnostics,
}

impl Engine {
    /// Validates the layout, then boots layer state from the store. Store
    /// failures (and stale records referencing layers that no longer
    /// exist) fall back to built-in defaults; only configuration errors
    /// prevent construction.
    pub fn new(
        layout: Layout,
        profile: Profile,
        mut store: Box<dyn PersistenceDriver + Send>,
    ) -> Result<Self, ConfigError> {
        layout.validate()?;

        let default = match store.read_default_layer() {
            Ok(layer) if (layer as usize) < layout.layer_count() => layer,
            Ok(layer) => {
                warn!(layer, "persisted default layer out of range, using layer 0");
                0
            }
            Err(e) => {
                warn!(error = %e, "default layer unavailable, using layer 0");
                0
            }
        };
        let flags = match store.read_flags() {
            Ok(blob) => ConfigFlags::from_blob(&blob),
            Err(e) => {
                warn!(error = %e, "flags blob unavailable, using defaults");
                ConfigFlags::default()
            }
        };

        let resolver = TapHoldResolver::new(&profile);
        Ok(Self {
            layout,
            profile,
            layers: LayerStack::new(default),
            resolver,
            held: HashMap::new(),
            flags,
            store,
            feedback: None,
            diag: Diagnostics::default(),
        })
    }

    pub fn set_feedback(&mut self, cb: impl Fn(FeedbackKind) + Send + Sync + 'static) {
        self.feedback = Some(Box::new(cb));
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn set_profile(&mut self, profile: Profile) {
        self.resolver.configure(&profile);
        self.profile = profile;
        self.refresh_forced();
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn layers(&self) -> &LayerStack {
        &self.layers
    }

    pub fn flags(&self) -> ConfigFlags {
        self.flags
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.diag
    }

    /// Earliest instant at which `poll` would do work.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.resolver.next_deadline()
    }

    /// Non-blocking tap/hold deadline check, for callers waking up between
    /// events.
    pub fn poll(&mut self, now: Instant) -> Vec<OutputEvent> {
        let mut out = Vec::new();
        for r in self.resolver.poll(now) {
            self.apply_resolution(r, &mut out);
        }
        out
    }

    /// Active-layer lookup: forced composite layer first, then momentary
    /// layers most-recent-first, then the default layer. Transparent cells
    /// defer; no-op cells stop the fallthrough.
    pub fn resolve(&self, pos: MatrixPos) -> Keycode {
        for layer in self.layers.iter_above_default() {
            let cell = self.layout.cell(layer, pos);
            if !cell.is_transparent() {
                return cell;
            }
        }
        self.layout.cell(self.layers.default_layer(), pos)
    }

    /// Processes one scanner event to completion.
    pub fn process_event(&mut self, event: KeyEvent) -> Vec<OutputEvent> {
        // A deadline that elapsed before this event logically fired first.
        let mut out = Vec::new();
        for r in self.resolver.poll(event.t) {
            self.apply_resolution(r, &mut out);
        }

        if !self.layout.in_bounds(event.pos) {
            self.diag.out_of_range += 1;
            warn!(row = event.pos.row, col = event.pos.col, "event outside the matrix, ignored");
            return out;
        }

        match event.edge {
            Edge::Pressed => self.on_press(event.pos, event.t, &mut out),
            Edge::Released => self.on_release(event.pos, &mut out),
        }
        out
    }

    fn on_press(&mut self, pos: MatrixPos, t: Instant, out: &mut Vec<OutputEvent>) {
        if self.held.contains_key(&pos) {
            self.diag.duplicate_press += 1;
            warn!(row = pos.row, col = pos.col, "duplicate press, ignored");
            return;
        }

        // Pending dual-role keys become holds now, before this key is
        // looked up, so the lookup already sees their layers/modifiers.
        for r in self.resolver.interrupt() {
            self.apply_resolution(r, out);
        }

        let code = self.resolve(pos);
        let held = match code {
            Keycode::Transparent | Keycode::NoOp => Held::Inert,
            Keycode::Plain(c) => {
                out.push(OutputEvent::KeyDown(c));
                Held::Code(c)
            }
            Keycode::Modifier(m) => {
                out.push(OutputEvent::KeyDown(m.code()));
                Held::Modifier(m)
            }
            Keycode::MomentaryLayer(layer) => {
                self.layers.activate(layer);
                self.refresh_forced();
                Held::Layer(layer)
            }
            Keycode::DefaultLayer(layer) => {
                self.set_default_layer(layer);
                Held::Inert
            }
            Keycode::LayerTap { layer, tap } => {
                self.resolver.arm(pos, tap, HoldRole::Layer(layer), t);
                Held::DualRole
            }
            Keycode::ModTap { modifier, tap } => {
                self.resolver.arm(pos, tap, HoldRole::Modifier(modifier), t);
                Held::DualRole
            }
            Keycode::Composite(id) => self.run_composite(id, out),
        };
        self.held.insert(pos, held);
    }

    fn on_release(&mut self, pos: MatrixPos, out: &mut Vec<OutputEvent>) {
        let Some(held) = self.held.remove(&pos) else {
            self.diag.duplicate_release += 1;
            warn!(row = pos.row, col = pos.col, "release without press, ignored");
            return;
        };

        match held {
            Held::DualRole => match self.resolver.release(pos) {
                Some(ReleaseOutcome::Tap { code }) => {
                    out.push(OutputEvent::KeyDown(code));
                    out.push(OutputEvent::KeyUp(code));
                }
                Some(ReleaseOutcome::TapRelease { code }) => {
                    out.push(OutputEvent::KeyUp(code));
                }
                Some(ReleaseOutcome::HoldEnd { role }) => self.deactivate_role(role, out),
                None => debug!(row = pos.row, col = pos.col, "stale dual-role release"),
            },
            Held::Code(c) => out.push(OutputEvent::KeyUp(c)),
            Held::Modifier(m) => out.push(OutputEvent::KeyUp(m.code())),
            Held::Layer(layer) => {
                self.layers.deactivate(layer);
                self.refresh_forced();
            }
            Held::CompositeHold(m) => out.push(OutputEvent::KeyUp(m.code())),
            Held::Inert => {}
        }
    }

    fn apply_resolution(&mut self, r: Resolution, out: &mut Vec<OutputEvent>) {
        match r {
            Resolution::Hold { role, .. } => match role {
                HoldRole::Modifier(m) => out.push(OutputEvent::KeyDown(m.code())),
                HoldRole::Layer(layer) => {
                    self.layers.activate(layer);
                    self.refresh_forced();
                }
            },
            Resolution::TapPress { code, .. } => out.push(OutputEvent::KeyDown(code)),
        }
    }

    fn deactivate_role(&mut self, role: HoldRole, out: &mut Vec<OutputEvent>) {
        match role {
            HoldRole::Modifier(m) => out.push(OutputEvent::KeyUp(m.code())),
            HoldRole::Layer(layer) => {
                self.layers.deactivate(layer);
                self.refresh_forced();
            }
        }
    }

    /// Re-evaluates the tri-layer combinator against the momentary stack.
    /// Called once per stack mutation, so activation and deactivation of
    /// the composite layer are atomic with the mutation that caused them.
    fn refresh_forced(&mut self) {
        let forced = self.profile.tri_layer.and_then(|cfg| {
            layers::combine(
                cfg,
                self.layers.momentary_active(cfg.a),
                self.layers.momentary_active(cfg.b),
            )
        });
        self.layers.set_forced(forced);
    }

    fn set_default_layer(&mut self, layer: LayerId) {
        self.layers.set_default(layer);
        if let Err(e) = self.store.write_default_layer(layer) {
            self.diag.persist_failures += 1;
            warn!(error = %e, layer, "default layer not persisted, keeping it for this session");
        }
        self.notify(FeedbackKind::DefaultLayerChanged);
    }

    fn run_composite(&mut self, id: u16, out: &mut Vec<OutputEvent>) -> Held {
        let Some(op) = self.layout.composite(id).cloned() else {
            warn!(id, "composite action not defined in layout, ignored");
            return Held::Inert;
        };
        match op {
            CompositeOp::ModeSwitch {
                deactivate,
                activate,
                notify,
            } => {
                for layer in deactivate {
                    self.layers.deactivate(layer);
                }
                if let Some(layer) = activate {
                    self.layers.activate(layer);
                }
                // One re-evaluation for the whole rewrite; no lookup can
                // observe the layers mid-sequence.
                self.refresh_forced();
                if let Some(kind) = notify {
                    self.notify(kind);
                }
                Held::Inert
            }
            CompositeOp::FeedbackHold { modifier, notify } => {
                out.push(OutputEvent::KeyDown(modifier.code()));
                self.notify(notify);
                Held::CompositeHold(modifier)
            }
            CompositeOp::ToggleFlag { flag, notify } => {
                self.flags.toggle(flag);
                if let Err(e) = self.store.write_flags(&self.flags.to_blob()) {
                    self.diag.persist_failures += 1;
                    warn!(error = %e, ?flag, "flag change not persisted");
                }
                if let Some(kind) = notify {
                    self.notify(kind);
                }
                Held::Inert
            }
        }
    }

    fn notify(&self, kind: FeedbackKind) {
        if let Some(cb) = &self.feedback {
            cb(kind);
        }
    }
}
