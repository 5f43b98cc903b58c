use kasane_core::engine::Engine;
use kasane_core::layout::Layout;
use kasane_core::names::code;
use kasane_core::persistence::{MemoryStore, PersistenceDriver, StoreError};
use kasane_core::tap_hold::Profile;
use kasane_core::types::{
    CompositeOp, ConfigFlag, Edge, FeedbackKind, KeyEvent, Keycode, LayerId, MatrixPos,
    OutputEvent,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Store handle that survives an engine, standing in for the EEPROM that
/// outlives a reboot.
#[derive(Clone, Default)]
struct SharedStore(Arc<Mutex<MemoryStore>>);

impl PersistenceDriver for SharedStore {
    fn read_default_layer(&mut self) -> Result<LayerId, StoreError> {
        self.0.lock().read_default_layer()
    }
    fn write_default_layer(&mut self, layer: LayerId) -> Result<(), StoreError> {
        self.0.lock().write_default_layer(layer)
    }
    fn read_flags(&mut self) -> Result<Vec<u8>, StoreError> {
        self.0.lock().read_flags()
    }
    fn write_flags(&mut self, blob: &[u8]) -> Result<(), StoreError> {
        self.0.lock().write_flags(blob)
    }
}

// col 0: base cell; col 1: switch default to layer 1; col 2: flag toggle.
fn fixture() -> Layout {
    use Keycode::*;
    Layout::builder(1, 3)
        .layer(
            "qwerty",
            vec![vec![Plain(code::Q), DefaultLayer(1), Composite(0)]],
        )
        .layer(
            "colemak",
            vec![vec![Plain(code::F), DefaultLayer(1), Composite(0)]],
        )
        .composite(
            0,
            CompositeOp::ToggleFlag {
                flag: ConfigFlag::NKeyRollover,
                notify: None,
            },
        )
        .finish()
        .expect("fixture layout")
}

fn boot(store: SharedStore) -> Engine {
    Engine::new(fixture(), Profile::default(), Box::new(store)).expect("engine")
}

fn tap(e: &mut Engine, col: u8) -> Vec<OutputEvent> {
    let t = Instant::now();
    let mut out = e.process_event(KeyEvent::new(MatrixPos::new(0, col), Edge::Pressed, t));
    out.extend(e.process_event(KeyEvent::new(MatrixPos::new(0, col), Edge::Released, t)));
    out
}

#[test]
fn default_layer_survives_a_simulated_restart() {
    let store = SharedStore::default();
    let mut e = boot(store.clone());
    assert_eq!(e.layers().default_layer(), 0);
    assert_eq!(e.resolve(MatrixPos::new(0, 0)), Keycode::Plain(code::Q));

    tap(&mut e, 1);
    assert_eq!(e.layers().default_layer(), 1);
    drop(e);

    let rebooted = boot(store);
    assert_eq!(rebooted.layers().default_layer(), 1);
    // No other layers on: the new default supplies the cell.
    assert_eq!(rebooted.resolve(MatrixPos::new(0, 0)), Keycode::Plain(code::F));
}

#[test]
fn default_layer_switch_notifies_feedback() {
    let changed = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&changed);
    let mut e = boot(SharedStore::default());
    e.set_feedback(move |kind| {
        if kind == FeedbackKind::DefaultLayerChanged {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });
    tap(&mut e, 1);
    assert_eq!(changed.load(Ordering::SeqCst), 1);
}

#[test]
fn persistence_failure_keeps_the_session_selection() {
    let store = SharedStore::default();
    store.0.lock().fail_writes = true;
    let mut e = boot(store.clone());

    tap(&mut e, 1);
    // In-memory selection took effect although nothing was written.
    assert_eq!(e.layers().default_layer(), 1);
    assert_eq!(e.diagnostics().persist_failures, 1);
    assert_eq!(e.resolve(MatrixPos::new(0, 0)), Keycode::Plain(code::F));
    drop(e);

    let rebooted = boot(store);
    assert_eq!(rebooted.layers().default_layer(), 0);
}

#[test]
fn flags_roundtrip_through_the_store() {
    let store = SharedStore::default();
    let mut e = boot(store.clone());
    assert!(!e.flags().get(ConfigFlag::NKeyRollover));

    tap(&mut e, 2);
    assert!(e.flags().get(ConfigFlag::NKeyRollover));
    drop(e);

    let rebooted = boot(store);
    assert!(rebooted.flags().get(ConfigFlag::NKeyRollover));
    assert!(!rebooted.flags().get(ConfigFlag::Audio));
}

#[test]
fn key_handling_continues_after_store_failures() {
    let store = SharedStore::default();
    store.0.lock().fail_writes = true;
    let mut e = boot(store);

    tap(&mut e, 1);
    tap(&mut e, 2);
    assert_eq!(e.diagnostics().persist_failures, 2);
    // The input path is unaffected.
    assert_eq!(
        tap(&mut e, 0),
        vec![OutputEvent::KeyDown(code::F), OutputEvent::KeyUp(code::F)]
    );
}
