use crate::{
    engine::{ControlEngine, ControlKey},
    host::MidiHost,
    midi::{MidiAddress, MidiOut, CONTROL_CHANGE},
    pads::{Action, Input, ShiftBinding, ShiftLayer},
};

use super::pot::{Pot, PotGroup};

const PARAM_STEP: f64 = 0.05;
const PARAM_CC: u8 = 0x00;
const ENABLE_SWITCH_CC: u8 = 0x03;
const DRY_WET_CC: u8 = 0x04;
const TAP_NOTE: u8 = 0x09;

/// Effect selection buttons and the parameter encoder of one effect unit.
///
/// With shift held the selection buttons become pitch up/down for the matching deck.
#[derive(Debug)]
pub struct EffectUnit {
    number: u8,
    prev_effect: ShiftBinding,
    next_effect: ShiftBinding,
    /// Three-way switch: middle is off, up or down is on.
    enable_switch: ShiftBinding,
    tap: ShiftBinding,
    param_encoder: MidiAddress,
    dry_wet: PotGroup,
    layer: ShiftLayer,
}

impl EffectUnit {
    pub fn new(number: u8, takeover_threshold: f64) -> Self {
        let effect = format!("[EffectRack1_EffectUnit{number}_Effect1]");
        let offset = (number - 1) * 2;
        let cc = CONTROL_CHANGE + 0x08 + number - 1;
        let enabled = Action::new(Input::Push(ControlKey::new(effect.clone(), "enabled")), None);
        let tap = Action::push(ControlKey::channel(number, "bpm_tap"));
        Self {
            number,
            prev_effect: ShiftBinding::new(
                MidiAddress::new(0x98, offset),
                Action::push(ControlKey::new(effect.clone(), "prev_effect")),
                Action::push(ControlKey::channel(number, "pitch_up")),
            ),
            next_effect: ShiftBinding::new(
                MidiAddress::new(0x99, 0x03 + offset),
                Action::push(ControlKey::new(effect, "next_effect")),
                Action::push(ControlKey::channel(number, "pitch_down")),
            ),
            enable_switch: ShiftBinding::new(
                MidiAddress::new(cc, ENABLE_SWITCH_CC),
                enabled.clone(),
                enabled,
            ),
            tap: ShiftBinding::new(
                MidiAddress::new(0x98 + number - 1, TAP_NOTE),
                tap.clone(),
                tap,
            ),
            param_encoder: MidiAddress::new(cc, PARAM_CC),
            dry_wet: PotGroup::new(
                takeover_threshold,
                vec![Pot::new(
                    MidiAddress::new(cc, DRY_WET_CC),
                    ControlKey::new(format!("[EffectRack1_EffectUnit{number}]"), "mix"),
                )],
            ),
            layer: ShiftLayer::Unshifted,
        }
    }

    fn effect_group(&self) -> String {
        format!("[EffectRack1_EffectUnit{}_Effect1]", self.number)
    }

    /// The encoder drives parameter1, or parameter2 while shifted.
    pub fn param_key(&self) -> ControlKey {
        let key = match self.layer {
            ShiftLayer::Unshifted => "parameter1",
            ShiftLayer::Shifted => "parameter2",
        };
        ControlKey::new(self.effect_group(), key)
    }

    fn buttons(&self) -> [&ShiftBinding; 4] {
        [
            &self.prev_effect,
            &self.next_effect,
            &self.enable_switch,
            &self.tap,
        ]
    }

    fn buttons_mut(&mut self) -> [&mut ShiftBinding; 4] {
        [
            &mut self.prev_effect,
            &mut self.next_effect,
            &mut self.enable_switch,
            &mut self.tap,
        ]
    }

    pub fn connect(&mut self, layer: ShiftLayer, host: &mut MidiHost<'_>) {
        self.layer = layer;
        for button in self.buttons_mut() {
            button.set_layer(layer);
            button.connect(host.engine);
            button.trigger(host);
        }
        self.dry_wet.connect(host.engine);
    }

    pub fn set_layer(&mut self, layer: ShiftLayer, host: &mut MidiHost<'_>) {
        self.layer = layer;
        for button in self.buttons_mut() {
            button.rebind(layer, host);
        }
    }

    pub fn midi_input(
        &mut self,
        status: u8,
        control: u8,
        value: u8,
        engine: &mut dyn ControlEngine,
    ) -> bool {
        if status == self.param_encoder.status && control == self.param_encoder.control {
            let key = self.param_key();
            let step = if value < 0x40 { PARAM_STEP } else { -PARAM_STEP };
            let current = engine.get_parameter(&key);
            engine.set_parameter(&key, (current + step).clamp(0.0, 1.0));
            return true;
        }
        if self.dry_wet.midi_input(status, control, value, engine) {
            return true;
        }
        match self
            .buttons()
            .into_iter()
            .find(|button| button.matches(status, control))
        {
            Some(button) => {
                button.input(value, engine);
                true
            }
            None => false,
        }
    }

    pub fn engine_changed(&mut self, key: &ControlKey, value: f64, midi: &mut dyn MidiOut) {
        for button in self.buttons() {
            button.engine_changed(key, value, midi);
        }
        self.dry_wet.engine_changed(key, value);
    }
}
