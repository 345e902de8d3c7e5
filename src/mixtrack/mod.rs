//! Numark Mixtrack Pro FX mapping.

mod browse;
mod deck;
mod effect;
mod pot;

use tracing::{debug, info, trace};

pub use browse::Browse;
pub use deck::Deck;
pub use effect::EffectUnit;
pub use pot::{Pot, PotGroup};

use crate::{
    config::MixtrackSettings,
    engine::{ControlChange, ControlKey},
    host::MidiHost,
    midi::{MidiAddress, MidiMessage, CONTROL_CHANGE, NOTE_ON},
    pads::{
        pad_status, BlinkSettings, PadModeCode, PadSection, ShiftState, FIRST_PAD,
        LED_OFF, LED_ON, PAD_COUNT,
    },
    timer::TimerId,
};

pub const DECKS: u8 = 2;
const SHIFT_NOTE: u8 = 0x20;
const JOG_TOUCH_NOTE: u8 = 0x06;
const JOG_TURN_CC: u8 = 0x06;
const VU_METER_CC: u8 = 0x1F;
/// Mixer section controls on the global channel.
const GLOBAL_CC: u8 = CONTROL_CHANGE + 0x0F;
const BROWSE_KNOB: MidiAddress = MidiAddress::new(GLOBAL_CC, 0x00);
const BROWSE_BUTTON: MidiAddress = MidiAddress::new(NOTE_ON + 0x0F, 0x06);
const MAIN_GAIN_CC: u8 = 0x0A;
const CUE_GAIN_CC: u8 = 0x0C;
const CUE_MIX_CC: u8 = 0x0D;

const EXIT_DEMO_SYSEX: [u8; 6] = [0xF0, 0x7E, 0x00, 0x06, 0x01, 0xF7];
const STATUS_SYSEX: [u8; 7] = [0xF0, 0x00, 0x20, 0x7F, 0x03, 0x01, 0xF7];
/// Enables "fader cuts" on the bottom four pads.
const FADER_CUT_SYSEX: [u8; 6] = [0xF0, 0x00, 0x20, 0x7F, 0x03, 0xF7];
const SHUTDOWN_SYSEX: [u8; 6] = [0xF0, 0x00, 0x20, 0x7F, 0x02, 0xF7];

/// Whole-controller state. Shift is global: either deck's shift button shifts everything.
pub struct MixtrackProFx {
    settings: MixtrackSettings,
    shift: ShiftState,
    decks: Vec<Deck>,
    pads: Vec<PadSection>,
    effects: Vec<EffectUnit>,
    browse: Browse,
    /// Main gain, cue gain and cue mix.
    gains: PotGroup,
}

impl MixtrackProFx {
    pub fn new(settings: MixtrackSettings) -> Self {
        let blink = BlinkSettings {
            enabled: settings.enable_blink,
            interval: settings.blink_interval(),
        };
        let threshold = settings.soft_takeover_threshold;
        let master = |cc: u8, key: &str| {
            Pot::new(MidiAddress::new(GLOBAL_CC, cc), ControlKey::new("[Master]", key))
        };
        Self {
            decks: (1..=DECKS).map(|deck| Deck::new(deck, threshold)).collect(),
            pads: (1..=DECKS)
                .map(|deck| PadSection::with_default_modes(deck, blink))
                .collect(),
            effects: (1..=DECKS)
                .map(|unit| EffectUnit::new(unit, threshold))
                .collect(),
            browse: Browse::new(BROWSE_KNOB, BROWSE_BUTTON),
            gains: PotGroup::new(
                threshold,
                vec![
                    master(MAIN_GAIN_CC, "gain"),
                    master(CUE_GAIN_CC, "headGain"),
                    master(CUE_MIX_CC, "headMix"),
                ],
            ),
            shift: ShiftState::default(),
            settings,
        }
    }

    pub fn is_shifted(&self) -> bool {
        self.shift.is_shifted()
    }

    pub fn pads(&self, deck: u8) -> Option<&PadSection> {
        self.pads.get(usize::from(deck).checked_sub(1)?)
    }

    pub fn init(&mut self, host: &mut MidiHost<'_>) {
        host.midi.send_sysex(&EXIT_DEMO_SYSEX);
        host.midi.send_sysex(&STATUS_SYSEX);
        host.midi.send_sysex(&FADER_CUT_SYSEX);

        for deck in 1..=DECKS {
            let status = pad_status(deck);
            for code in PadModeCode::ALL {
                let value = if code == PadModeCode::Hotcue { LED_ON } else { LED_OFF };
                host.midi.send_short(status, code.control(), value);
            }
            host.engine.subscribe(&ControlKey::channel(deck, "VuMeter"));
        }

        let layer = self.shift.layer();
        for section in &mut self.pads {
            section.connect_current(layer, host);
        }
        for deck in &mut self.decks {
            deck.connect(layer, host);
        }
        for effect in &mut self.effects {
            effect.connect(layer, host);
        }
        self.browse.set_layer(layer);
        self.gains.connect(host.engine);
        info!("Mixtrack Pro FX initialised");
    }

    pub fn shutdown(&mut self, host: &mut MidiHost<'_>) {
        for section in &mut self.pads {
            section.stop_blink(host);
        }
        host.midi.send_sysex(&SHUTDOWN_SYSEX);
        info!("Mixtrack Pro FX shut down");
    }

    pub fn shift(&mut self, host: &mut MidiHost<'_>) {
        self.set_shift(true, host);
    }

    pub fn unshift(&mut self, host: &mut MidiHost<'_>) {
        self.set_shift(false, host);
    }

    fn set_shift(&mut self, shifted: bool, host: &mut MidiHost<'_>) {
        if self.shift.is_shifted() == shifted {
            return;
        }
        debug!(shifted, "shift");
        self.shift.set(shifted);
        let layer = self.shift.layer();
        for section in &mut self.pads {
            section.set_layer(layer, host);
        }
        for deck in &mut self.decks {
            deck.set_layer(layer, host);
        }
        for effect in &mut self.effects {
            effect.set_layer(layer, host);
        }
        self.browse.set_layer(layer);
    }

    /// Dispatch one incoming MIDI message.
    pub fn midi_event(&mut self, message: MidiMessage, host: &mut MidiHost<'_>) {
        let channel = message.channel();
        let value = message.value();
        let control = message.data1;

        if message.is_note() {
            let status = NOTE_ON | channel;
            if channel < DECKS {
                let index = usize::from(channel);
                match control {
                    SHIFT_NOTE => {
                        if value > 0 {
                            self.shift(host);
                        } else {
                            self.unshift(host);
                        }
                        return;
                    }
                    JOG_TOUCH_NOTE => {
                        self.decks[index].wheel_touch(
                            value,
                            self.shift.is_shifted(),
                            &self.settings,
                            host.engine,
                        );
                        return;
                    }
                    _ => {}
                }
            }

            if let Some(index) = self.pad_section_index(status) {
                if PadModeCode::try_from(control).is_ok() {
                    self.pads[index].mode_button(control, value, self.shift.layer(), host);
                    return;
                }
                if (FIRST_PAD..FIRST_PAD + 2 * PAD_COUNT as u8).contains(&control) {
                    if let Some(command) = self.pads[index].pad_event(control, value, host) {
                        trace!(?command, "pad command has no owner");
                    }
                    return;
                }
            }

            for deck in &mut self.decks {
                if deck.midi_input(status, control, value, &self.settings, host) {
                    return;
                }
            }
            for effect in &mut self.effects {
                if effect.midi_input(status, control, value, host.engine) {
                    return;
                }
            }
            if self
                .browse
                .midi_input(status, control, value, &self.settings, host.engine)
            {
                return;
            }
        } else if message.kind() == CONTROL_CHANGE {
            if channel < DECKS && control == JOG_TURN_CC {
                self.decks[usize::from(channel)].wheel_turn(
                    value,
                    self.shift.is_shifted(),
                    &self.settings,
                    host.engine,
                );
                return;
            }
            let status = message.status;
            for deck in &mut self.decks {
                if deck.midi_input(status, control, value, &self.settings, host) {
                    return;
                }
            }
            for effect in &mut self.effects {
                if effect.midi_input(status, control, value, host.engine) {
                    return;
                }
            }
            if self.gains.midi_input(status, control, value, host.engine)
                || self
                    .browse
                    .midi_input(status, control, value, &self.settings, host.engine)
            {
                return;
            }
        }
        trace!(?message, "unmapped midi message");
    }

    fn pad_section_index(&self, status: u8) -> Option<usize> {
        self.pads
            .iter()
            .position(|section| pad_status(section.deck()) == status)
    }

    pub fn engine_changed(&mut self, change: &ControlChange, host: &mut MidiHost<'_>) {
        let ControlChange { key, value } = change;
        if key.key == "VuMeter" {
            self.vu_meter(key, *value, host);
            return;
        }
        for section in &self.pads {
            section.engine_changed(key, *value, host.midi);
        }
        for deck in &mut self.decks {
            deck.engine_changed(key, *value, host.midi);
        }
        for effect in &mut self.effects {
            effect.engine_changed(key, *value, host.midi);
        }
        self.gains.engine_changed(key, *value);
    }

    fn vu_meter(&self, key: &ControlKey, value: f64, host: &mut MidiHost<'_>) {
        let Some(deck) = deck_from_group(&key.group) else {
            return;
        };
        let level = (value * 90.0).clamp(0.0, 127.0) as u8;
        host.midi
            .send_short(CONTROL_CHANGE + deck - 1, VU_METER_CC, level);
    }

    pub fn on_timer(&mut self, id: TimerId, host: &mut MidiHost<'_>) {
        for section in &mut self.pads {
            if section.on_timer(id, host.midi) {
                return;
            }
        }
    }
}

/// `[ChannelN]` → N
fn deck_from_group(group: &str) -> Option<u8> {
    group
        .strip_prefix("[Channel")?
        .strip_suffix(']')?
        .parse()
        .ok()
        .filter(|deck| (1..=DECKS).contains(deck))
}
