use std::{
    collections::{HashMap, HashSet, VecDeque},
    fmt,
};

use tracing::{debug, trace};

/// Names one logical control of the mixing engine, e.g. `[Channel1]` / `play`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControlKey {
    pub group: String,
    pub key: String,
}

impl ControlKey {
    pub fn new(group: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            key: key.into(),
        }
    }

    pub fn channel(deck: u8, key: impl Into<String>) -> Self {
        Self::new(format!("[Channel{deck}]"), key)
    }
}

impl fmt::Display for ControlKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.group, self.key)
    }
}

/// A value change delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlChange {
    pub key: ControlKey,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScratchParams {
    pub intervals_per_rev: u32,
    pub rpm: f64,
    pub alpha: f64,
    pub beta: f64,
    pub ramp: bool,
}

/// Services the host's control engine provides to the mapping.
pub trait ControlEngine {
    fn get_value(&self, key: &ControlKey) -> f64;
    fn set_value(&mut self, key: &ControlKey, value: f64);

    /// Normalised 0..1 view of a control. Hosts with non-linear controls override these.
    fn get_parameter(&self, key: &ControlKey) -> f64 {
        self.get_value(key)
    }

    fn set_parameter(&mut self, key: &ControlKey, value: f64) {
        self.set_value(key, value)
    }

    fn subscribe(&mut self, key: &ControlKey);
    fn unsubscribe(&mut self, key: &ControlKey);

    fn scratch_enable(&mut self, deck: u8, params: ScratchParams);
    fn scratch_disable(&mut self, deck: u8, ramp: bool);
    fn scratch_tick(&mut self, deck: u8, ticks: i32);
    fn is_scratching(&self, deck: u8) -> bool;

    /// Flip a binary control.
    fn toggle(&mut self, key: &ControlKey) {
        let value = if self.get_value(key) > 0.0 { 0.0 } else { 1.0 };
        self.set_value(key, value);
    }

    /// Pulse a trigger control (1 then 0).
    fn trigger(&mut self, key: &ControlKey) {
        self.set_value(key, 1.0);
        self.set_value(key, 0.0);
    }
}

/// Call counters, mostly useful to assert on side effects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub subscribes: usize,
    pub unsubscribes: usize,
    pub writes: usize,
}

/// In-memory control store used when no mixing application is attached.
///
/// Writes to subscribed keys queue a [`ControlChange`] that the event loop
/// hands back to the controller, the same way a host delivers change callbacks.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    values: HashMap<ControlKey, f64>,
    subscriptions: HashMap<ControlKey, usize>,
    pending: VecDeque<ControlChange>,
    scratching: HashSet<u8>,
    pub stats: EngineStats,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value as if another source (GUI, another controller) changed it.
    #[cfg(test)]
    pub fn inject(&mut self, key: &ControlKey, value: f64) {
        self.store(key, value);
    }

    pub fn is_subscribed(&self, key: &ControlKey) -> bool {
        self.subscriptions.get(key).is_some_and(|count| *count > 0)
    }

    #[cfg(test)]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.values().filter(|count| **count > 0).count()
    }

    pub fn drain_changes(&mut self) -> Vec<ControlChange> {
        self.pending.drain(..).collect()
    }

    fn store(&mut self, key: &ControlKey, value: f64) {
        let previous = self.values.insert(key.clone(), value);
        if previous == Some(value) {
            return;
        }
        if self.is_subscribed(key) {
            self.pending.push_back(ControlChange {
                key: key.clone(),
                value,
            });
        }
    }
}

impl ControlEngine for MemoryEngine {
    fn get_value(&self, key: &ControlKey) -> f64 {
        self.values.get(key).copied().unwrap_or(0.0)
    }

    fn set_value(&mut self, key: &ControlKey, value: f64) {
        debug!(control = %key, value, "engine write");
        self.stats.writes += 1;
        self.store(key, value);
    }

    fn subscribe(&mut self, key: &ControlKey) {
        trace!(control = %key, "subscribe");
        self.stats.subscribes += 1;
        *self.subscriptions.entry(key.clone()).or_default() += 1;
    }

    fn unsubscribe(&mut self, key: &ControlKey) {
        trace!(control = %key, "unsubscribe");
        self.stats.unsubscribes += 1;
        if let Some(count) = self.subscriptions.get_mut(key) {
            *count = count.saturating_sub(1);
        }
    }

    fn scratch_enable(&mut self, deck: u8, params: ScratchParams) {
        debug!(deck, ?params, "scratch enable");
        self.scratching.insert(deck);
    }

    fn scratch_disable(&mut self, deck: u8, ramp: bool) {
        debug!(deck, ramp, "scratch disable");
        self.scratching.remove(&deck);
    }

    fn scratch_tick(&mut self, deck: u8, ticks: i32) {
        trace!(deck, ticks, "scratch tick");
        let key = ControlKey::channel(deck, "scratch_ticks");
        let total = self.get_value(&key) + f64::from(ticks);
        self.values.insert(key, total);
    }

    fn is_scratching(&self, deck: u8) -> bool {
        self.scratching.contains(&deck)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_subscribed_changes_are_queued() {
        let mut engine = MemoryEngine::new();
        let play = ControlKey::channel(1, "play");
        let pfl = ControlKey::channel(1, "pfl");

        engine.subscribe(&play);
        engine.set_value(&play, 1.0);
        engine.set_value(&pfl, 1.0);
        // unchanged value does not notify
        engine.set_value(&play, 1.0);

        let changes = engine.drain_changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].key, play);
        assert_eq!(changes[0].value, 1.0);
    }

    #[test]
    fn toggle_and_trigger() {
        let mut engine = MemoryEngine::new();
        let key = ControlKey::channel(2, "pfl");
        engine.toggle(&key);
        assert_eq!(engine.get_value(&key), 1.0);
        engine.toggle(&key);
        assert_eq!(engine.get_value(&key), 0.0);

        let loop_key = ControlKey::channel(2, "beatloop_activate");
        engine.trigger(&loop_key);
        assert_eq!(engine.get_value(&loop_key), 0.0);
        assert_eq!(engine.stats.writes, 4);
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let mut engine = MemoryEngine::new();
        let key = ControlKey::channel(1, "VuMeter");
        engine.subscribe(&key);
        engine.unsubscribe(&key);
        engine.inject(&key, 0.5);
        assert!(engine.drain_changes().is_empty());
        assert!(!engine.is_subscribed(&key));
    }
}
