use crate::engine::Engine;
use crate::types::{KeyEvent, OutputEvent};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Scanner-facing side of the event queue. Capacity bounds how far a
/// scanner can run ahead of processing; order is preserved end to end.
pub fn event_channel(capacity: usize) -> (Sender<KeyEvent>, Receiver<KeyEvent>) {
    bounded(capacity)
}

/// Shared handle to the engine. The pump locks it once per event, which is
/// the single ordering boundary: everything the engine owns is only ever
/// touched with the lock held, so processing order equals arrival order.
#[derive(Clone)]
pub struct SharedEngine {
    inner: Arc<Mutex<Engine>>,
}

impl SharedEngine {
    pub fn new(engine: Engine) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Engine> {
        self.inner.lock()
    }
}

/// Drains scanner events until the sending side disconnects, forwarding
/// every output event in dispatch order. Between events it sleeps no longer
/// than the next tap/hold deadline, so pending dual-role keys resolve on
/// time without a timer thread.
pub fn run_loop(
    engine: &SharedEngine,
    events: &Receiver<KeyEvent>,
    forward: &mut dyn FnMut(OutputEvent),
) {
    info!("event pump started");
    loop {
        let deadline = engine.lock().next_deadline();
        let event = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if deadline <= now {
                    for ev in engine.lock().poll(now) {
                        forward(ev);
                    }
                    continue;
                }
                match events.recv_timeout(deadline - now) {
                    Ok(event) => event,
                    Err(RecvTimeoutError::Timeout) => {
                        for ev in engine.lock().poll(Instant::now()) {
                            forward(ev);
                        }
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match events.recv() {
                Ok(event) => event,
                Err(_) => break,
            },
        };
        for ev in engine.lock().process_event(event) {
            forward(ev);
        }
    }
    info!("event pump stopped");
}
