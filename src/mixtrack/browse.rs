use crate::{
    config::MixtrackSettings,
    engine::{ControlEngine, ControlKey},
    midi::MidiAddress,
    pads::{Action, Input, ShiftBinding, ShiftLayer},
};

const LIBRARY: &str = "[Library]";

/// Library browse encoder and its push button. Shifted messages arrive one control up.
#[derive(Debug)]
pub struct Browse {
    knob: MidiAddress,
    button: ShiftBinding,
    layer: ShiftLayer,
}

impl Browse {
    pub fn new(knob: MidiAddress, button: MidiAddress) -> Self {
        Self {
            knob,
            button: ShiftBinding::new(
                button,
                Action::new(Input::Push(ControlKey::new(LIBRARY, "MoveFocusForward")), None),
                Action::new(Input::Push(ControlKey::new(LIBRARY, "GoToItem")), None),
            )
            .with_shift_offset(0x01),
            layer: ShiftLayer::Unshifted,
        }
    }

    pub fn set_layer(&mut self, layer: ShiftLayer) {
        self.layer = layer;
        self.button.set_layer(layer);
    }

    pub fn midi_input(
        &mut self,
        status: u8,
        control: u8,
        value: u8,
        settings: &MixtrackSettings,
        engine: &mut dyn ControlEngine,
    ) -> bool {
        if self.button.matches(status, control) {
            self.button.input(value, engine);
            return true;
        }
        let knob = status == self.knob.status
            && (control == self.knob.control || control == self.knob.control.wrapping_add(1));
        if !knob {
            return false;
        }
        match self.layer {
            ShiftLayer::Unshifted => {
                let direction = if value > 0x40 {
                    i32::from(value) - 0x80
                } else {
                    i32::from(value)
                };
                let vertical = ControlKey::new(LIBRARY, "MoveVertical");
                engine.set_parameter(&vertical, f64::from(direction));
            }
            ShiftLayer::Shifted => {
                let zoom = if value > 0x40 {
                    "waveform_zoom_up"
                } else {
                    "waveform_zoom_down"
                };
                engine.set_parameter(&ControlKey::channel(1, zoom), 1.0);
                // a synced host already zooms every waveform
                if !settings.waveforms_synced {
                    engine.set_parameter(&ControlKey::channel(2, zoom), 1.0);
                }
            }
        }
        true
    }
}
