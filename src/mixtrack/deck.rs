use tracing::debug;

use crate::{
    config::MixtrackSettings,
    engine::{ControlEngine, ControlKey, ScratchParams},
    host::MidiHost,
    midi::{MidiAddress, MidiOut, CONTROL_CHANGE, NOTE_ON},
    pads::{Action, Command, Input, ShiftBinding, ShiftLayer, LED_OFF, LED_ON},
};

use super::pot::{Pot, PotGroup};

const SCRATCH_RPM: f64 = 33.0 + 1.0 / 3.0;
/// Load buttons sit on the global channel, one note per deck.
const LOAD_STATUS: u8 = 0x9F;
const LOAD_NOTE: u8 = 0x02;

/// Transport, loop and jog controls of one deck.
#[derive(Debug)]
pub struct Deck {
    number: u8,
    play: ShiftBinding,
    cue: ShiftBinding,
    sync: ShiftBinding,
    pfl: ShiftBinding,
    loop_button: ShiftBinding,
    loop_half: ShiftBinding,
    loop_double: ShiftBinding,
    scratch_toggle: ShiftBinding,
    pitch_bend_up: ShiftBinding,
    pitch_bend_down: ShiftBinding,
    set_beatgrid: ShiftBinding,
    load: ShiftBinding,
    /// Volume, EQ, filter, gain and pitch.
    pots: PotGroup,
    scratch_mode: bool,
    pitch_range: usize,
}

impl Deck {
    pub fn new(number: u8, takeover_threshold: f64) -> Self {
        let channel = number - 1;
        let deck = NOTE_ON + channel;
        let pads = 0x94 + channel;
        let cc = CONTROL_CHANGE + channel;
        let key = |name: &str| ControlKey::channel(number, name);
        let equalizer = format!("[EqualizerRack1_[Channel{number}]_Effect1]");
        let load = Action::new(Input::Push(key("LoadSelectedTrack")), None);

        Self {
            number,
            play: ShiftBinding::new(
                MidiAddress::new(deck, 0x00),
                Action::new(Input::Toggle(key("play")), Some(key("play_indicator"))),
                Action::new(Input::Push(key("reverse")), Some(key("play_indicator"))),
            )
            .with_shift_offset(0x04),
            cue: ShiftBinding::new(
                MidiAddress::new(deck, 0x01),
                Action::new(Input::Push(key("cue_default")), Some(key("cue_indicator"))),
                Action::new(Input::Push(key("start_stop")), Some(key("cue_indicator"))),
            )
            .with_shift_offset(0x04),
            sync: ShiftBinding::new(
                MidiAddress::new(deck, 0x02),
                Action::toggle(key("sync_enabled")),
                Action::toggle(key("quantize")),
            )
            .with_shift_offset(0x01),
            pfl: ShiftBinding::new(
                MidiAddress::new(deck, 0x1B),
                Action::toggle(key("pfl")),
                Action::toggle(key("pfl")),
            ),
            loop_button: ShiftBinding::new(
                MidiAddress::new(pads, 0x40),
                Action::new(Input::Command(Command::LoopActivate), Some(key("loop_enabled"))),
                Action::new(Input::Push(key("loop_in_goto")), Some(key("loop_enabled"))),
            )
            .with_shift_offset(0x01),
            loop_half: ShiftBinding::new(
                MidiAddress::new(pads, 0x34),
                Action::push(key("loop_halve")),
                Action::push(key("loop_in")),
            )
            .with_shift_offset(0x02),
            loop_double: ShiftBinding::new(
                MidiAddress::new(pads, 0x35),
                Action::push(key("loop_double")),
                Action::push(key("loop_out")),
            )
            .with_shift_offset(0x02),
            scratch_toggle: ShiftBinding::new(
                MidiAddress::new(deck, 0x07),
                Action::command(Command::ToggleScratchMode),
                Action::push(key("reverseroll")),
            )
            .with_shift_offset(0x01),
            pitch_bend_up: ShiftBinding::new(
                MidiAddress::new(deck, 0x0B),
                Action::new(Input::Push(key("rate_temp_up")), None),
                Action::new(Input::Toggle(key("keylock")), None),
            )
            .with_shift_offset(0x20),
            pitch_bend_down: ShiftBinding::new(
                MidiAddress::new(deck, 0x0C),
                Action::new(Input::Push(key("rate_temp_down")), None),
                Action::command(Command::CyclePitchRange),
            )
            .with_shift_offset(0x20),
            set_beatgrid: ShiftBinding::new(
                MidiAddress::new(0x98 + channel, 0x01 + channel * 3),
                Action::push(key("beats_translate_curpos")),
                Action::push(key("beats_translate_curpos")),
            ),
            load: ShiftBinding::new(
                MidiAddress::new(LOAD_STATUS, LOAD_NOTE + channel),
                load.clone(),
                load,
            ),
            pots: PotGroup::new(
                takeover_threshold,
                vec![
                    Pot::new(MidiAddress::new(cc, 0x1C), key("volume")),
                    Pot::new(MidiAddress::new(cc, 0x17), ControlKey::new(&equalizer, "parameter3")),
                    Pot::new(MidiAddress::new(cc, 0x18), ControlKey::new(&equalizer, "parameter2")),
                    Pot::new(MidiAddress::new(cc, 0x19), ControlKey::new(&equalizer, "parameter1")),
                    Pot::new(
                        MidiAddress::new(cc, 0x1A),
                        ControlKey::new(format!("[QuickEffectRack1_[Channel{number}]]"), "super1"),
                    ),
                    Pot::new(MidiAddress::new(cc, 0x16), key("pregain")),
                    Pot::new(MidiAddress::new(cc, 0x09), key("rate")).inverted(),
                ],
            ),
            scratch_mode: true,
            pitch_range: 0,
        }
    }

    #[cfg(test)]
    pub fn scratch_mode(&self) -> bool {
        self.scratch_mode
    }

    fn group(&self) -> String {
        format!("[Channel{}]", self.number)
    }

    fn buttons(&self) -> [&ShiftBinding; 12] {
        [
            &self.play,
            &self.cue,
            &self.sync,
            &self.pfl,
            &self.loop_button,
            &self.loop_half,
            &self.loop_double,
            &self.scratch_toggle,
            &self.pitch_bend_up,
            &self.pitch_bend_down,
            &self.set_beatgrid,
            &self.load,
        ]
    }

    fn buttons_mut(&mut self) -> [&mut ShiftBinding; 12] {
        [
            &mut self.play,
            &mut self.cue,
            &mut self.sync,
            &mut self.pfl,
            &mut self.loop_button,
            &mut self.loop_half,
            &mut self.loop_double,
            &mut self.scratch_toggle,
            &mut self.pitch_bend_up,
            &mut self.pitch_bend_down,
            &mut self.set_beatgrid,
            &mut self.load,
        ]
    }

    /// Connect every button and push current state to the LEDs.
    pub fn connect(&mut self, layer: ShiftLayer, host: &mut MidiHost<'_>) {
        for button in self.buttons_mut() {
            button.set_layer(layer);
            button.connect(host.engine);
            button.trigger(host);
        }
        self.pots.connect(host.engine);
        if layer == ShiftLayer::Unshifted {
            self.show_scratch_state(host);
        }
    }

    pub fn set_layer(&mut self, layer: ShiftLayer, host: &mut MidiHost<'_>) {
        for button in self.buttons_mut() {
            button.rebind(layer, host);
        }
        if layer == ShiftLayer::Unshifted {
            self.show_scratch_state(host);
        }
    }

    /// Scratch mode on the button, reverse-roll state on its shifted LED.
    fn show_scratch_state(&self, host: &mut MidiHost<'_>) {
        let address = self.scratch_toggle.address();
        host.midi.send_short(
            address.status,
            address.control,
            if self.scratch_mode { LED_ON } else { LED_OFF },
        );
        let bleep = host
            .engine
            .get_parameter(&ControlKey::channel(self.number, "reverseroll"))
            == 1.0;
        host.midi.send_short(
            address.status,
            address.control + 1,
            if bleep { LED_ON } else { LED_OFF },
        );
    }

    /// Returns false when no button or pot of this deck lives at the address.
    pub fn midi_input(
        &mut self,
        status: u8,
        control: u8,
        value: u8,
        settings: &MixtrackSettings,
        host: &mut MidiHost<'_>,
    ) -> bool {
        if self.pots.midi_input(status, control, value, host.engine) {
            return true;
        }
        let Some(button) = self
            .buttons()
            .into_iter()
            .find(|button| button.matches(status, control))
        else {
            return false;
        };
        if let Some(command) = button.input(value, host.engine) {
            self.run(command, settings, host);
        }
        true
    }

    fn run(&mut self, command: Command, settings: &MixtrackSettings, host: &mut MidiHost<'_>) {
        let number = self.number;
        let key = |name: &str| ControlKey::channel(number, name);
        match command {
            Command::LoopActivate => {
                if host.engine.get_value(&key("loop_enabled")) == 0.0 {
                    host.engine.trigger(&key("beatloop_activate"));
                } else {
                    host.engine.trigger(&key("beatlooproll_activate"));
                }
            }
            Command::ToggleScratchMode => {
                self.scratch_mode = !self.scratch_mode;
                debug!(deck = self.number, enabled = self.scratch_mode, "scratch mode");
                let address = self.scratch_toggle.address();
                host.midi.send_short(
                    address.status,
                    address.control,
                    if self.scratch_mode { LED_ON } else { LED_OFF },
                );
            }
            Command::CyclePitchRange => {
                if settings.pitch_ranges.is_empty() {
                    return;
                }
                self.pitch_range = (self.pitch_range + 1) % settings.pitch_ranges.len();
                host.engine
                    .set_value(&key("rateRange"), settings.pitch_ranges[self.pitch_range]);
            }
        }
    }

    pub fn engine_changed(&mut self, key: &ControlKey, value: f64, midi: &mut dyn MidiOut) {
        for button in self.buttons() {
            button.engine_changed(key, value, midi);
        }
        self.pots.engine_changed(key, value);
    }

    pub fn wheel_touch(
        &self,
        value: u8,
        shifted: bool,
        settings: &MixtrackSettings,
        engine: &mut dyn ControlEngine,
    ) {
        if !shifted && self.scratch_mode && value == 0x7F {
            engine.scratch_enable(
                self.number,
                ScratchParams {
                    intervals_per_rev: settings.jog_scratch_sensitivity,
                    rpm: SCRATCH_RPM,
                    alpha: settings.jog_scratch_alpha,
                    beta: settings.jog_scratch_beta,
                    ramp: true,
                },
            );
        } else if value == 0 {
            engine.scratch_disable(self.number, true);
        }
    }

    /// Seek with shift, scratch while touched, otherwise pitch bend.
    pub fn wheel_turn(
        &self,
        value: u8,
        shifted: bool,
        settings: &MixtrackSettings,
        engine: &mut dyn ControlEngine,
    ) {
        let ticks = relative_ticks(value);
        let group = self.group();

        if shifted {
            let position = ControlKey::new(group, "playposition");
            let old = engine.get_value(&position);
            engine.set_value(
                &position,
                old + f64::from(ticks) / settings.jog_seek_sensitivity,
            );
        } else if self.scratch_mode && engine.is_scratching(self.number) {
            engine.scratch_tick(self.number, ticks);
        } else {
            engine.set_value(
                &ControlKey::new(group, "jog"),
                f64::from(ticks) / settings.jog_pitch_sensitivity,
            );
        }
    }
}

/// Two's-complement 7-bit relative value.
pub fn relative_ticks(value: u8) -> i32 {
    let value = i32::from(value);
    if value >= 64 {
        value - 128
    } else {
        value
    }
}
