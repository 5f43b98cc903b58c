use crate::layers::TriLayer;
use crate::types::{LayerId, MatrixPos, Modifier};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// What the held role of a dual-role key engages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldRole {
    Modifier(Modifier),
    Layer(LayerId),
}

/// Policy when the deadline passes with no interrupting press. One
/// configurable decision, applied uniformly in `poll`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeoutPolicy {
    Hold,
    Tap,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::Hold
    }
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    #[serde(default = "default_tap_hold_timeout_ms")]
    pub tap_hold_timeout_ms: u64,
    #[serde(default)]
    pub timeout_policy: TimeoutPolicy,
    #[serde(default)]
    pub tri_layer: Option<TriLayer>,
}

fn default_tap_hold_timeout_ms() -> u64 {
    200
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            tap_hold_timeout_ms: 200,
            timeout_policy: TimeoutPolicy::Hold,
            tri_layer: None,
        }
    }
}

/// A dual-role key that has been pressed but not yet classified.
#[derive(Debug, Clone, Copy)]
struct Pending {
    pos: MatrixPos,
    tap: u16,
    hold: HoldRole,
    armed_at: Instant,
}

/// Post-classification state of a still-held dual-role key.
#[derive(Debug, Clone, Copy)]
enum KeyState {
    /// Tap code is down (timeout-tap policy); key-up comes with the
    /// physical release.
    TapFired(u16),
    HoldActive(HoldRole),
}

/// Classification produced by an interrupting press or a deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Hold role engaged; the engine activates it before anything else in
    /// the same event is looked up.
    Hold { pos: MatrixPos, role: HoldRole },
    /// Tap press fired at the deadline; the release follows the physical
    /// release.
    TapPress { pos: MatrixPos, code: u16 },
}

/// What a physical release of a tracked key amounts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Released while still pending: a clean tap, press and release
    /// dispatched back-to-back.
    Tap { code: u16 },
    /// Release of a tap code fired earlier at the deadline.
    TapRelease { code: u16 },
    /// Hold role disengages.
    HoldEnd { role: HoldRole },
}

/// Per-key tap/hold state machine: `Idle → Pending → {TapFired, HoldActive}
/// → Idle`. Owns no clock; every decision is driven by event timestamps and
/// explicit polls, so nothing here ever blocks.
#[derive(Debug)]
pub struct TapHoldResolver {
    timeout: Duration,
    policy: TimeoutPolicy,
    pending: Vec<Pending>,
    active: HashMap<MatrixPos, KeyState>,
}

impl TapHoldResolver {
    pub fn new(profile: &Profile) -> Self {
        Self {
            timeout: Duration::from_millis(profile.tap_hold_timeout_ms),
            policy: profile.timeout_policy,
            pending: Vec::new(),
            active: HashMap::new(),
        }
    }

    /// Applies a profile change. In-flight pending keys keep their original
    /// arm time and are judged against the new deadline.
    pub fn configure(&mut self, profile: &Profile) {
        self.timeout = Duration::from_millis(profile.tap_hold_timeout_ms);
        self.policy = profile.timeout_policy;
    }

    /// Enters `Pending` for a freshly pressed dual-role key. Nothing is
    /// dispatched until the key is classified.
    pub fn arm(&mut self, pos: MatrixPos, tap: u16, hold: HoldRole, now: Instant) {
        self.pending.push(Pending {
            pos,
            tap,
            hold,
            armed_at: now,
        });
    }

    /// Any other press classifies every pending key as Hold, most recent
    /// first. The caller activates each role before resolving the
    /// interrupting key, which is what gives the interrupter a view with
    /// the held role already in effect.
    pub fn interrupt(&mut self) -> Vec<Resolution> {
        let mut out = Vec::new();
        while let Some(p) = self.pending.pop() {
            self.active.insert(p.pos, KeyState::HoldActive(p.hold));
            out.push(Resolution::Hold {
                pos: p.pos,
                role: p.hold,
            });
        }
        out
    }

    /// Physical release of a key this resolver may be tracking. `None`
    /// means the key was never dual-role (or already fully resolved).
    pub fn release(&mut self, pos: MatrixPos) -> Option<ReleaseOutcome> {
        if let Some(i) = self.pending.iter().position(|p| p.pos == pos) {
            let p = self.pending.remove(i);
            return Some(ReleaseOutcome::Tap { code: p.tap });
        }
        match self.active.remove(&pos) {
            Some(KeyState::TapFired(code)) => Some(ReleaseOutcome::TapRelease { code }),
            Some(KeyState::HoldActive(role)) => Some(ReleaseOutcome::HoldEnd { role }),
            None => None,
        }
    }

    /// Non-blocking deadline check; classifies every pending key whose
    /// deadline has passed according to the configured policy.
    pub fn poll(&mut self, now: Instant) -> Vec<Resolution> {
        let mut out = Vec::new();
        let timeout = self.timeout;
        let mut i = 0;
        while i < self.pending.len() {
            if now.duration_since(self.pending[i].armed_at) >= timeout {
                let p = self.pending.remove(i);
                match self.policy {
                    TimeoutPolicy::Hold => {
                        self.active.insert(p.pos, KeyState::HoldActive(p.hold));
                        out.push(Resolution::Hold {
                            pos: p.pos,
                            role: p.hold,
                        });
                    }
                    TimeoutPolicy::Tap => {
                        self.active.insert(p.pos, KeyState::TapFired(p.tap));
                        out.push(Resolution::TapPress {
                            pos: p.pos,
                            code: p.tap,
                        });
                    }
                }
            } else {
                i += 1;
            }
        }
        out
    }

    /// Earliest pending deadline, for the event pump's wakeup.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending
            .iter()
            .map(|p| p.armed_at + self.timeout)
            .min()
    }

    pub fn is_tracked(&self, pos: MatrixPos) -> bool {
        self.pending.iter().any(|p| p.pos == pos) || self.active.contains_key(&pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::code;

    const POS: MatrixPos = MatrixPos::new(1, 0);

    fn resolver(policy: TimeoutPolicy) -> TapHoldResolver {
        TapHoldResolver::new(&Profile {
            tap_hold_timeout_ms: 200,
            timeout_policy: policy,
            tri_layer: None,
        })
    }

    #[test]
    fn test_lone_release_before_timeout_is_tap() {
        let mut r = resolver(TimeoutPolicy::Hold);
        let t0 = Instant::now();
        r.arm(POS, code::A, HoldRole::Modifier(Modifier::LShift), t0);
        assert!(r.poll(t0 + Duration::from_millis(50)).is_empty());
        assert_eq!(r.release(POS), Some(ReleaseOutcome::Tap { code: code::A }));
        assert!(!r.is_tracked(POS));
    }

    #[test]
    fn test_interrupt_classifies_as_hold() {
        let mut r = resolver(TimeoutPolicy::Hold);
        let t0 = Instant::now();
        r.arm(POS, code::A, HoldRole::Layer(2), t0);
        let res = r.interrupt();
        assert_eq!(
            res,
            vec![Resolution::Hold {
                pos: POS,
                role: HoldRole::Layer(2)
            }]
        );
        assert_eq!(
            r.release(POS),
            Some(ReleaseOutcome::HoldEnd {
                role: HoldRole::Layer(2)
            })
        );
    }

    #[test]
    fn test_timeout_hold_policy() {
        let mut r = resolver(TimeoutPolicy::Hold);
        let t0 = Instant::now();
        r.arm(POS, code::A, HoldRole::Modifier(Modifier::LCtrl), t0);
        let res = r.poll(t0 + Duration::from_millis(200));
        assert_eq!(
            res,
            vec![Resolution::Hold {
                pos: POS,
                role: HoldRole::Modifier(Modifier::LCtrl)
            }]
        );
        // The release then only disengages the hold.
        assert_eq!(
            r.release(POS),
            Some(ReleaseOutcome::HoldEnd {
                role: HoldRole::Modifier(Modifier::LCtrl)
            })
        );
    }

    #[test]
    fn test_timeout_tap_policy_splits_press_and_release() {
        let mut r = resolver(TimeoutPolicy::Tap);
        let t0 = Instant::now();
        r.arm(POS, code::A, HoldRole::Modifier(Modifier::LCtrl), t0);
        let res = r.poll(t0 + Duration::from_millis(250));
        assert_eq!(
            res,
            vec![Resolution::TapPress {
                pos: POS,
                code: code::A
            }]
        );
        assert_eq!(
            r.release(POS),
            Some(ReleaseOutcome::TapRelease { code: code::A })
        );
    }

    #[test]
    fn test_second_dual_role_press_resolves_first_as_hold() {
        let mut r = resolver(TimeoutPolicy::Hold);
        let t0 = Instant::now();
        let second = MatrixPos::new(1, 11);
        r.arm(POS, code::ESC, HoldRole::Modifier(Modifier::LCtrl), t0);
        // The engine interrupts before arming the second key.
        let res = r.interrupt();
        assert_eq!(res.len(), 1);
        r.arm(
            second,
            code::ENT,
            HoldRole::Modifier(Modifier::RCtrl),
            t0 + Duration::from_millis(30),
        );
        assert!(r.is_tracked(POS));
        assert!(r.is_tracked(second));
        assert_eq!(
            r.release(second),
            Some(ReleaseOutcome::Tap { code: code::ENT })
        );
        assert_eq!(
            r.release(POS),
            Some(ReleaseOutcome::HoldEnd {
                role: HoldRole::Modifier(Modifier::LCtrl)
            })
        );
    }

    #[test]
    fn test_deadline_reflects_earliest_pending() {
        let mut r = resolver(TimeoutPolicy::Hold);
        let t0 = Instant::now();
        assert_eq!(r.next_deadline(), None);
        r.arm(POS, code::A, HoldRole::Layer(1), t0);
        assert_eq!(r.next_deadline(), Some(t0 + Duration::from_millis(200)));
    }

    #[test]
    fn test_reconfigure_applies_to_pending_keys() {
        let mut r = resolver(TimeoutPolicy::Hold);
        let t0 = Instant::now();
        r.arm(POS, code::A, HoldRole::Layer(1), t0);
        r.configure(&Profile {
            tap_hold_timeout_ms: 50,
            timeout_policy: TimeoutPolicy::Hold,
            tri_layer: None,
        });
        assert_eq!(r.next_deadline(), Some(t0 + Duration::from_millis(50)));
        assert_eq!(r.poll(t0 + Duration::from_millis(60)).len(), 1);
    }
}
