use crate::types::LayerId;
use serde::{Deserialize, Serialize};

/// Active-layer state: one always-active default layer, an ordered stack of
/// momentary layers, and at most one forced composite layer that outranks
/// every momentary layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerStack {
    default: LayerId,
    stack: Vec<LayerId>,
    forced: Option<LayerId>,
}

impl LayerStack {
    pub fn new(default: LayerId) -> Self {
        Self {
            default,
            stack: Vec::new(),
            forced: None,
        }
    }

    pub fn default_layer(&self) -> LayerId {
        self.default
    }

    /// Replaces the default layer. The default is never "off", only swapped.
    pub fn set_default(&mut self, layer: LayerId) {
        self.default = layer;
    }

    /// Pushes a momentary layer. Re-activation leaves the stack order as-is.
    pub fn activate(&mut self, layer: LayerId) {
        if !self.stack.contains(&layer) {
            self.stack.push(layer);
        }
    }

    pub fn deactivate(&mut self, layer: LayerId) {
        self.stack.retain(|&l| l != layer);
    }

    pub fn set_forced(&mut self, layer: Option<LayerId>) {
        self.forced = layer;
    }

    pub fn forced(&self) -> Option<LayerId> {
        self.forced
    }

    /// True when the layer is momentarily held (stack only, ignoring the
    /// default and any forced layer). This is the view the tri-layer
    /// combinator is fed.
    pub fn momentary_active(&self, layer: LayerId) -> bool {
        self.stack.contains(&layer)
    }

    pub fn is_active(&self, layer: LayerId) -> bool {
        self.forced == Some(layer) || self.stack.contains(&layer) || self.default == layer
    }

    /// Layers in lookup-priority order: forced composite first, then the
    /// momentary stack most-recent-first. The default layer is the caller's
    /// final fallback and is not yielded here.
    pub fn iter_above_default(&self) -> impl Iterator<Item = LayerId> + '_ {
        self.forced
            .into_iter()
            .chain(self.stack.iter().rev().copied())
    }
}

/// Tri-layer wiring: when both source layers are momentarily active, the
/// composite layer is forced on top of everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriLayer {
    pub a: LayerId,
    pub b: LayerId,
    pub composite: LayerId,
}

/// The combinator itself. Pure; the engine re-evaluates it after every
/// layer-stack mutation so a release drops the composite in the same event.
pub fn combine(cfg: TriLayer, a_active: bool, b_active: bool) -> Option<LayerId> {
    if a_active && b_active {
        Some(cfg.composite)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_orders_most_recent_first() {
        let mut layers = LayerStack::new(0);
        layers.activate(1);
        layers.activate(2);
        let order: Vec<LayerId> = layers.iter_above_default().collect();
        assert_eq!(order, vec![2, 1]);
    }

    #[test]
    fn test_forced_layer_outranks_stack() {
        let mut layers = LayerStack::new(0);
        layers.activate(1);
        layers.activate(2);
        layers.set_forced(Some(4));
        let order: Vec<LayerId> = layers.iter_above_default().collect();
        assert_eq!(order, vec![4, 2, 1]);
    }

    #[test]
    fn test_deactivate_removes_from_middle() {
        let mut layers = LayerStack::new(0);
        layers.activate(1);
        layers.activate(2);
        layers.activate(3);
        layers.deactivate(2);
        let order: Vec<LayerId> = layers.iter_above_default().collect();
        assert_eq!(order, vec![3, 1]);
    }

    #[test]
    fn test_reactivation_keeps_position() {
        let mut layers = LayerStack::new(0);
        layers.activate(1);
        layers.activate(2);
        layers.activate(1);
        let order: Vec<LayerId> = layers.iter_above_default().collect();
        assert_eq!(order, vec![2, 1]);
    }

    #[test]
    fn test_default_always_active() {
        let mut layers = LayerStack::new(0);
        assert!(layers.is_active(0));
        layers.set_default(3);
        assert!(layers.is_active(3));
        assert!(!layers.is_active(0));
    }

    #[test]
    fn test_combine_requires_both_sources() {
        let cfg = TriLayer { a: 1, b: 2, composite: 4 };
        assert_eq!(combine(cfg, true, true), Some(4));
        assert_eq!(combine(cfg, true, false), None);
        assert_eq!(combine(cfg, false, true), None);
        assert_eq!(combine(cfg, false, false), None);
    }

    #[test]
    fn test_momentary_ignores_default_and_forced() {
        let mut layers = LayerStack::new(1);
        layers.set_forced(Some(2));
        assert!(!layers.momentary_active(1));
        assert!(!layers.momentary_active(2));
        layers.activate(2);
        assert!(layers.momentary_active(2));
    }
}
