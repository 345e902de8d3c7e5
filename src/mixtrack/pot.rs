use tracing::trace;

use crate::{
    engine::{ControlEngine, ControlKey},
    hid::SoftTakeover,
    midi::MidiAddress,
};

const POT_MAX: f64 = 127.0;

/// An absolute knob or fader sending one 7-bit CC.
#[derive(Debug, Clone, PartialEq)]
pub struct Pot {
    address: MidiAddress,
    key: ControlKey,
    invert: bool,
}

impl Pot {
    pub fn new(address: MidiAddress, key: ControlKey) -> Self {
        Self {
            address,
            key,
            invert: false,
        }
    }

    /// Full travel maps to 1..0 instead of 0..1.
    pub fn inverted(mut self) -> Self {
        self.invert = true;
        self
    }

    pub fn parameter(&self, value: u8) -> f64 {
        let parameter = f64::from(value.min(0x7F)) / POT_MAX;
        if self.invert {
            1.0 - parameter
        } else {
            parameter
        }
    }
}

/// Pots sharing one soft-takeover table.
#[derive(Debug, Clone)]
pub struct PotGroup {
    pots: Vec<Pot>,
    takeover: SoftTakeover,
}

impl PotGroup {
    pub fn new(threshold: f64, pots: Vec<Pot>) -> Self {
        let mut takeover = SoftTakeover::new(threshold);
        for pot in &pots {
            takeover.enable(pot.key.clone());
        }
        Self { pots, takeover }
    }

    /// Listen for outside changes so takeover can be dropped.
    pub fn connect(&self, engine: &mut dyn ControlEngine) {
        for pot in &self.pots {
            engine.subscribe(&pot.key);
        }
    }

    /// Returns false when no pot of the group lives at the address.
    pub fn midi_input(
        &mut self,
        status: u8,
        control: u8,
        value: u8,
        engine: &mut dyn ControlEngine,
    ) -> bool {
        let Some(pot) = self
            .pots
            .iter()
            .find(|pot| pot.address == MidiAddress::new(status, control))
        else {
            return false;
        };
        let parameter = pot.parameter(value);
        let current = engine.get_parameter(&pot.key);
        if self.takeover.offer(&pot.key, parameter, current) {
            engine.set_parameter(&pot.key, parameter);
        } else {
            trace!(control = %pot.key, value, "pot waiting for takeover");
        }
        true
    }

    pub fn engine_changed(&mut self, key: &ControlKey, value: f64) {
        self.takeover.engine_changed(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryEngine;

    fn rate() -> ControlKey {
        ControlKey::channel(1, "rate")
    }

    fn group() -> PotGroup {
        PotGroup::new(
            3.0 / 128.0,
            vec![
                Pot::new(MidiAddress::new(0xB0, 0x1C), ControlKey::channel(1, "volume")),
                Pot::new(MidiAddress::new(0xB0, 0x09), rate()).inverted(),
            ],
        )
    }

    #[test]
    fn inverted_pot_runs_backwards() {
        let pot = Pot::new(MidiAddress::new(0xB0, 0x09), rate()).inverted();
        assert_eq!(pot.parameter(0), 1.0);
        assert_eq!(pot.parameter(0x7F), 0.0);
    }

    #[test]
    fn pot_takes_over_once_close() {
        let mut engine = MemoryEngine::new();
        let volume = ControlKey::channel(1, "volume");
        engine.inject(&volume, 1.0);
        let mut pots = group();

        assert!(pots.midi_input(0xB0, 0x1C, 0x00, &mut engine));
        assert_eq!(engine.get_value(&volume), 1.0);

        pots.midi_input(0xB0, 0x1C, 0x7E, &mut engine);
        assert_eq!(engine.get_value(&volume), 126.0 / 127.0);
        pots.midi_input(0xB0, 0x1C, 0x00, &mut engine);
        assert_eq!(engine.get_value(&volume), 0.0);
    }

    #[test]
    fn outside_change_drops_takeover() {
        let mut engine = MemoryEngine::new();
        let mut pots = group();
        pots.connect(&mut engine);
        assert!(engine.is_subscribed(&rate()));

        // centred pitch fader matches the 0.5 rate only after inversion
        engine.inject(&rate(), 0.5);
        engine.drain_changes();
        pots.midi_input(0xB0, 0x09, 0x40, &mut engine);
        assert_eq!(engine.get_value(&rate()), 1.0 - 64.0 / 127.0);
        // our own write echoing back keeps the pot in control
        for change in engine.drain_changes() {
            pots.engine_changed(&change.key, change.value);
        }
        pots.midi_input(0xB0, 0x09, 0x00, &mut engine);
        assert_eq!(engine.get_value(&rate()), 1.0);

        engine.inject(&rate(), 0.9);
        pots.engine_changed(&rate(), 0.9);
        pots.midi_input(0xB0, 0x09, 0x20, &mut engine);
        assert_eq!(engine.get_value(&rate()), 0.9);
    }

    #[test]
    fn unknown_address_is_not_consumed() {
        let mut engine = MemoryEngine::new();
        assert!(!group().midi_input(0xB1, 0x1C, 0x10, &mut engine));
    }
}
