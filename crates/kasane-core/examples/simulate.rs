//! Feeds a short scripted typing session through the event pump and prints
//! what the core would send to the host.

use kasane_core::engine::Engine;
use kasane_core::layers::TriLayer;
use kasane_core::parser;
use kasane_core::persistence::MemoryStore;
use kasane_core::runtime::{self, SharedEngine};
use kasane_core::tap_hold::Profile;
use kasane_core::types::{Edge, KeyEvent, MatrixPos};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("..");
    path.push("..");
    path.push("layouts");
    path.push("planck_colemak.kas");
    let layout = parser::load_layout(&path)?;
    println!("loaded `{}`", layout.name().unwrap_or("unnamed"));

    let profile = Profile {
        tri_layer: Some(TriLayer {
            a: 1,
            b: 2,
            composite: 4,
        }),
        ..Profile::default()
    };
    let engine = Engine::new(layout, profile, Box::new(MemoryStore::new()))?;
    let shared = SharedEngine::new(engine);

    let (tx, rx) = runtime::event_channel(64);
    let scanner = thread::spawn(move || {
        // q . lower-held 1 . ctrl(esc)-wrapped q . lone esc tap
        let script: [(MatrixPos, Edge, u64); 12] = [
            (MatrixPos::new(0, 1), Edge::Pressed, 0),
            (MatrixPos::new(0, 1), Edge::Released, 40),
            (MatrixPos::new(3, 4), Edge::Pressed, 100),
            (MatrixPos::new(1, 1), Edge::Pressed, 130),
            (MatrixPos::new(1, 1), Edge::Released, 170),
            (MatrixPos::new(3, 4), Edge::Released, 200),
            (MatrixPos::new(1, 0), Edge::Pressed, 300),
            (MatrixPos::new(0, 1), Edge::Pressed, 320),
            (MatrixPos::new(0, 1), Edge::Released, 360),
            (MatrixPos::new(1, 0), Edge::Released, 400),
            (MatrixPos::new(1, 0), Edge::Pressed, 500),
            (MatrixPos::new(1, 0), Edge::Released, 560),
        ];
        let t0 = Instant::now();
        for (pos, edge, ms) in script {
            let due = t0 + Duration::from_millis(ms);
            if let Some(wait) = due.checked_duration_since(Instant::now()) {
                thread::sleep(wait);
            }
            if tx.send(KeyEvent::new(pos, edge, Instant::now())).is_err() {
                break;
            }
        }
    });

    runtime::run_loop(&shared, &rx, &mut |ev| println!("host <- {ev:?}"));
    scanner.join().expect("scanner thread");
    Ok(())
}
