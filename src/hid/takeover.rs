use std::collections::HashMap;

use tracing::{debug, trace};

use crate::engine::{ControlEngine, ControlKey};

pub const DEFAULT_KNOB_MODE: &str = "default";

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct TakeoverRecord {
    caught_up: bool,
    last_applied: Option<f64>,
}

/// Keeps a physical knob from jumping a control it no longer matches.
///
/// A record starts out not caught up. The `threshold` window only applies
/// while it is in that state: a physical value within `threshold` of the
/// current logical value is applied and marks the record caught up. From
/// then on every physical value is applied, because the logical value is
/// known to follow the knob. Any engine change the bridge did not write
/// itself (a value other than the last one applied) drops the record back
/// to not caught up.
#[derive(Debug, Clone)]
pub struct SoftTakeover {
    threshold: f64,
    records: HashMap<ControlKey, TakeoverRecord>,
}

impl SoftTakeover {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            records: HashMap::new(),
        }
    }

    pub fn enable(&mut self, key: ControlKey) {
        self.records.entry(key).or_default();
    }

    pub fn is_enabled(&self, key: &ControlKey) -> bool {
        self.records.contains_key(key)
    }

    #[cfg(test)]
    pub fn is_caught_up(&self, key: &ControlKey) -> bool {
        self.records.get(key).is_some_and(|record| record.caught_up)
    }

    /// Returns whether `physical` may be written. Keys without takeover always pass.
    pub fn offer(&mut self, key: &ControlKey, physical: f64, current: f64) -> bool {
        let Some(record) = self.records.get_mut(key) else {
            return true;
        };
        if !record.caught_up && (physical - current).abs() > self.threshold {
            trace!(control = %key, physical, current, "soft takeover holding");
            return false;
        }
        record.caught_up = true;
        record.last_applied = Some(physical);
        true
    }

    pub fn engine_changed(&mut self, key: &ControlKey, value: f64) {
        let Some(record) = self.records.get_mut(key) else {
            return;
        };
        let ours = record
            .last_applied
            .is_some_and(|applied| (applied - value).abs() < 1e-9);
        if !ours && record.caught_up {
            trace!(control = %key, value, "soft takeover lost");
            record.caught_up = false;
        }
    }

    pub fn reset_all(&mut self) {
        for record in self.records.values_mut() {
            record.caught_up = false;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KnobLink {
    pub key: ControlKey,
    pub scale: f64,
}

/// Routes physical knob fields to logical controls through soft takeover.
///
/// Links are grouped by knob mode so the same knob can drive different controls.
#[derive(Debug, Clone)]
pub struct KnobBridge {
    mode: String,
    links: HashMap<(String, String), KnobLink>,
    takeover: SoftTakeover,
}

impl KnobBridge {
    pub fn new(takeover: SoftTakeover) -> Self {
        Self {
            mode: DEFAULT_KNOB_MODE.to_string(),
            links: HashMap::new(),
            takeover,
        }
    }

    pub fn takeover(&self) -> &SoftTakeover {
        &self.takeover
    }

    #[cfg(test)]
    pub fn set_mode(&mut self, mode: impl Into<String>) {
        self.mode = mode.into();
        self.takeover.reset_all();
    }

    pub fn bridge(&mut self, mode: &str, field: &str, key: ControlKey, scale: f64) {
        self.links
            .insert((mode.to_string(), field.to_string()), KnobLink { key, scale });
    }

    pub fn link(&self, field: &str) -> Option<&KnobLink> {
        self.links.get(&(self.mode.clone(), field.to_string()))
    }

    /// Every linked control, once.
    pub fn keys(&self) -> Vec<ControlKey> {
        let mut keys: Vec<ControlKey> = self.links.values().map(|link| link.key.clone()).collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// Handle a new physical reading. Returns whether the engine was written.
    pub fn physical_changed(
        &mut self,
        field: &str,
        raw: i64,
        engine: &mut dyn ControlEngine,
    ) -> bool {
        let Some(link) = self.link(field).cloned() else {
            debug!(field, mode = %self.mode, "knob not mapped in mode");
            return false;
        };
        let logical = raw as f64 / link.scale;
        let current = engine.get_parameter(&link.key);
        if !self.takeover.offer(&link.key, logical, current) {
            return false;
        }
        engine.set_parameter(&link.key, logical);
        true
    }

    pub fn engine_changed(&mut self, key: &ControlKey, engine: &dyn ControlEngine) {
        if self.takeover.is_enabled(key) {
            self.takeover.engine_changed(key, engine.get_parameter(key));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryEngine;
    use proptest::prelude::*;

    const T: f64 = 3.0 / 128.0;

    fn volume() -> ControlKey {
        ControlKey::channel(1, "volume")
    }

    fn bridge() -> KnobBridge {
        let mut takeover = SoftTakeover::new(T);
        takeover.enable(volume());
        let mut bridge = KnobBridge::new(takeover);
        bridge.bridge(DEFAULT_KNOB_MODE, "1_vol", volume(), 4096.0);
        bridge
    }

    #[test]
    fn far_knob_waits_until_it_comes_close() {
        let mut engine = MemoryEngine::new();
        engine.inject(&volume(), 0.5);
        let mut bridge = bridge();

        assert!(!bridge.physical_changed("1_vol", 0, &mut engine));
        assert_eq!(engine.get_value(&volume()), 0.5);
        assert!(!bridge.physical_changed("1_vol", 1800, &mut engine));

        assert!(bridge.physical_changed("1_vol", 2000, &mut engine));
        assert_eq!(engine.get_value(&volume()), 2000.0 / 4096.0);

        // caught up: big jumps follow the knob
        assert!(bridge.physical_changed("1_vol", 0, &mut engine));
        assert_eq!(engine.get_value(&volume()), 0.0);
    }

    #[test]
    fn outside_change_drops_takeover() {
        let mut engine = MemoryEngine::new();
        engine.subscribe(&volume());
        let mut bridge = bridge();
        assert!(bridge.physical_changed("1_vol", 0, &mut engine));
        for change in engine.drain_changes() {
            bridge.engine_changed(&change.key, &engine);
        }
        assert!(bridge.takeover().is_caught_up(&volume()));

        engine.inject(&volume(), 1.0);
        bridge.engine_changed(&volume(), &engine);
        assert!(!bridge.takeover().is_caught_up(&volume()));
        assert!(!bridge.physical_changed("1_vol", 100, &mut engine));
        assert_eq!(engine.get_value(&volume()), 1.0);
    }

    #[test]
    fn unmapped_fields_and_modes_are_ignored() {
        let mut engine = MemoryEngine::new();
        let mut bridge = bridge();
        assert!(!bridge.physical_changed("2_vol", 10, &mut engine));
        bridge.set_mode("shifted");
        assert!(!bridge.physical_changed("1_vol", 0, &mut engine));
        assert_eq!(engine.stats.writes, 0);
    }

    #[test]
    fn keys_without_takeover_always_apply() {
        let mut engine = MemoryEngine::new();
        engine.inject(&ControlKey::new("[Master]", "balance"), 1.0);
        let mut bridge = KnobBridge::new(SoftTakeover::new(T));
        bridge.bridge(DEFAULT_KNOB_MODE, "bal", ControlKey::new("[Master]", "balance"), 4096.0);
        assert!(bridge.physical_changed("bal", 0, &mut engine));
    }

    proptest! {
        #[test]
        fn applies_exactly_within_window(current in 0.0f64..=1.0, physical in 0.0f64..=1.0) {
            let key = volume();
            let mut takeover = SoftTakeover::new(T);
            takeover.enable(key.clone());
            let applied = takeover.offer(&key, physical, current);
            prop_assert_eq!(applied, (physical - current).abs() <= T);
            prop_assert_eq!(takeover.is_caught_up(&key), applied);
        }
    }
}
