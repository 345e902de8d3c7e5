use tracing::trace;

use crate::{
    engine::{ControlEngine, ControlKey},
    host::MidiHost,
    midi::{MidiAddress, MidiOut},
};

pub const LED_ON: u8 = 0x7F;
/// Lights are dimmed rather than switched off when inactive.
pub const LED_OFF: u8 = 0x01;

/// Which of a binding's two targets is live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ShiftLayer {
    #[default]
    Unshifted,
    Shifted,
}

/// Controller-wide shift modifier, passed by reference to everything that resolves a binding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShiftState {
    shifted: bool,
}

impl ShiftState {
    pub fn set(&mut self, shifted: bool) {
        self.shifted = shifted;
    }

    pub fn is_shifted(&self) -> bool {
        self.shifted
    }

    pub fn layer(&self) -> ShiftLayer {
        if self.shifted {
            ShiftLayer::Shifted
        } else {
            ShiftLayer::Unshifted
        }
    }
}

/// Behaviours the owner of a binding implements itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    LoopActivate,
    ToggleScratchMode,
    CyclePitchRange,
}

/// What a press does to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// 1 while held, 0 on release.
    Push(ControlKey),
    /// Flips the control on press.
    Toggle(ControlKey),
    /// Sampler pad: play or load when unshifted, stop or eject when shifted.
    Sampler { group: String, shifted: bool },
    Command(Command),
    Ignore,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub input: Input,
    pub output: Option<ControlKey>,
}

impl Action {
    /// Push input and LED on the same control.
    pub fn push(key: ControlKey) -> Self {
        Self {
            output: Some(key.clone()),
            input: Input::Push(key),
        }
    }

    pub fn toggle(key: ControlKey) -> Self {
        Self {
            output: Some(key.clone()),
            input: Input::Toggle(key),
        }
    }

    pub fn new(input: Input, output: Option<ControlKey>) -> Self {
        Self { input, output }
    }

    pub fn command(command: Command) -> Self {
        Self {
            input: Input::Command(command),
            output: None,
        }
    }
}

pub fn led_value(value: f64) -> u8 {
    if value > 0.0 {
        LED_ON
    } else {
        LED_OFF
    }
}

/// One physical button with an unshifted and a shifted target.
///
/// The live target is picked from `layer` at lookup time. Connection state
/// tracks which output key the binding currently listens to.
#[derive(Debug, Clone)]
pub struct ShiftBinding {
    address: MidiAddress,
    shift_offset: u8,
    unshifted: Action,
    shifted: Action,
    layer: ShiftLayer,
    connected: Option<ControlKey>,
}

impl ShiftBinding {
    pub fn new(address: MidiAddress, unshifted: Action, shifted: Action) -> Self {
        Self {
            address,
            shift_offset: 0,
            unshifted,
            shifted,
            layer: ShiftLayer::Unshifted,
            connected: None,
        }
    }

    /// The shifted layer arrives on, and is lit at, `control + offset`.
    pub fn with_shift_offset(mut self, offset: u8) -> Self {
        self.shift_offset = offset;
        self
    }

    pub fn address(&self) -> MidiAddress {
        self.address
    }

    pub fn layer(&self) -> ShiftLayer {
        self.layer
    }

    pub fn action(&self) -> &Action {
        match self.layer {
            ShiftLayer::Unshifted => &self.unshifted,
            ShiftLayer::Shifted => &self.shifted,
        }
    }

    pub fn output_key(&self) -> Option<&ControlKey> {
        self.action().output.as_ref()
    }

    pub fn connected(&self) -> Option<&ControlKey> {
        self.connected.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.is_some()
    }

    /// Address the current layer is lit at.
    pub fn led_address(&self) -> MidiAddress {
        match self.layer {
            ShiftLayer::Unshifted => self.address,
            ShiftLayer::Shifted => self.address.offset(self.shift_offset),
        }
    }

    pub fn matches(&self, status: u8, control: u8) -> bool {
        status == self.address.status
            && (control == self.address.control
                || (self.shift_offset != 0
                    && control == self.address.control.wrapping_add(self.shift_offset)))
    }

    /// Change layers without touching connections.
    pub fn set_layer(&mut self, layer: ShiftLayer) {
        self.layer = layer;
    }

    /// Change layers on a live binding: reconnect if the output key moved, then refresh the LED.
    pub fn rebind(&mut self, layer: ShiftLayer, host: &mut MidiHost<'_>) {
        if self.layer == layer {
            return;
        }
        self.layer = layer;
        if !self.is_connected() {
            return;
        }
        if self.connected.as_ref() != self.output_key() {
            self.disconnect(host.engine);
            self.connect(host.engine);
        }
        self.trigger(host);
    }

    pub fn connect(&mut self, engine: &mut dyn ControlEngine) {
        self.disconnect(engine);
        if let Some(key) = self.action().output.clone() {
            engine.subscribe(&key);
            self.connected = Some(key);
        }
    }

    pub fn disconnect(&mut self, engine: &mut dyn ControlEngine) {
        if let Some(key) = self.connected.take() {
            engine.unsubscribe(&key);
        }
    }

    /// Push the connected control's current value to the LED.
    pub fn trigger(&self, host: &mut MidiHost<'_>) {
        if let Some(key) = &self.connected {
            let value = host.engine.get_value(key);
            self.output(value, host.midi);
        }
    }

    pub fn output(&self, value: f64, midi: &mut dyn MidiOut) {
        let address = self.led_address();
        midi.send_short(address.status, address.control, led_value(value));
    }

    /// Apply a change notification if it is for the connected control.
    pub fn engine_changed(&self, key: &ControlKey, value: f64, midi: &mut dyn MidiOut) -> bool {
        if self.connected.as_ref() == Some(key) {
            self.output(value, midi);
            true
        } else {
            false
        }
    }

    /// Run the live target's input. Commands are handed back to the owner.
    pub fn input(&self, value: u8, engine: &mut dyn ControlEngine) -> Option<Command> {
        let pressed = value > 0;
        trace!(address = ?self.address, layer = ?self.layer, value, "binding input");
        match &self.action().input {
            Input::Push(key) => {
                engine.set_value(key, if pressed { 1.0 } else { 0.0 });
            }
            Input::Toggle(key) => {
                if pressed {
                    engine.toggle(key);
                }
            }
            Input::Sampler { group, shifted } => sampler_input(group, *shifted, pressed, engine),
            Input::Command(command) => {
                if pressed {
                    return Some(*command);
                }
            }
            Input::Ignore => {}
        }
        None
    }
}

fn sampler_input(group: &str, shifted: bool, pressed: bool, engine: &mut dyn ControlEngine) {
    let key = |name: &str| ControlKey::new(group, name);
    if !shifted {
        if !pressed {
            return;
        }
        if engine.get_value(&key("track_loaded")) == 0.0 {
            engine.set_value(&key("LoadSelectedTrack"), 1.0);
        } else {
            engine.set_value(&key("cue_gotoandplay"), 1.0);
        }
    } else if engine.get_value(&key("play")) > 0.0 {
        if pressed {
            engine.set_value(&key("cue_gotoandstop"), 1.0);
        }
    } else {
        engine.set_value(&key("eject"), if pressed { 1.0 } else { 0.0 });
    }
}
