use crate::{
    engine::{ControlEngine, ControlKey},
    error::MappingError,
    midi::MidiAddress,
};

use super::binding::{Action, Input, ShiftBinding, ShiftLayer, LED_ON};

pub const PAD_COUNT: usize = 8;
pub const FIRST_PAD: u8 = 0x14;
/// Shifted pads arrive on, and are lit at, the note eight above.
pub const PAD_SHIFT_OFFSET: u8 = 0x08;
pub const FADER_CUTS_LED_ON: u8 = 0x09;

pub const AUTO_LOOP_SIZES: [&str; PAD_COUNT] =
    ["0.0625", "0.125", "0.25", "0.5", "1", "2", "4", "8"];

/// Trailing underscores are part of the key. The blank entry jumps by the size selected in the GUI.
pub const BEAT_JUMP_VALUES: [&str; PAD_COUNT] =
    ["0.0625_", "0.125_", "0.25_", "0.5_", "1_", "2_", "", "8_"];

/// Mode selector notes. Fixed by the controller firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum PadModeCode {
    Hotcue = 0x00,
    Beatjump = 0x02,
    FaderCuts = 0x07,
    Sample1 = 0x0B,
    AutoLoop = 0x0D,
    Sample2 = 0x0F,
}

impl PadModeCode {
    pub const ALL: [PadModeCode; 6] = [
        PadModeCode::Hotcue,
        PadModeCode::AutoLoop,
        PadModeCode::FaderCuts,
        PadModeCode::Sample1,
        PadModeCode::Beatjump,
        PadModeCode::Sample2,
    ];

    pub fn control(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for PadModeCode {
    type Error = MappingError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        PadModeCode::ALL
            .into_iter()
            .find(|code| code.control() == value)
            .ok_or(MappingError::UnknownModeCode(value))
    }
}

/// One interpretation of the eight pads.
#[derive(Debug, Clone)]
pub struct PadMode {
    code: PadModeCode,
    /// Set on modes reached with shift; holds the selector that blinks while active.
    secondary_of: Option<PadModeCode>,
    light_on: u8,
    pads: Vec<ShiftBinding>,
}

impl PadMode {
    pub fn new(code: PadModeCode, light_on: u8, pads: Vec<ShiftBinding>) -> Self {
        Self {
            code,
            secondary_of: None,
            light_on,
            pads,
        }
    }

    pub fn secondary_to(mut self, primary: PadModeCode) -> Self {
        self.secondary_of = Some(primary);
        self
    }

    pub fn code(&self) -> PadModeCode {
        self.code
    }

    pub fn secondary_of(&self) -> Option<PadModeCode> {
        self.secondary_of
    }

    #[cfg(test)]
    pub fn is_secondary(&self) -> bool {
        self.secondary_of.is_some()
    }

    pub fn light_on(&self) -> u8 {
        self.light_on
    }

    pub fn pads(&self) -> &[ShiftBinding] {
        &self.pads
    }

    pub fn pad(&self, index: usize) -> Option<&ShiftBinding> {
        self.pads.get(index)
    }

    pub fn pads_mut(&mut self) -> &mut [ShiftBinding] {
        &mut self.pads
    }

    pub fn set_layer(&mut self, layer: ShiftLayer) {
        for pad in &mut self.pads {
            pad.set_layer(layer);
        }
    }

    pub fn disconnect(&mut self, engine: &mut dyn ControlEngine) {
        for pad in &mut self.pads {
            pad.disconnect(engine);
        }
    }

    pub fn hotcue(deck: u8) -> Self {
        let pads = (0..PAD_COUNT)
            .map(|i| {
                let number = i + 1;
                let enabled = ControlKey::channel(deck, format!("hotcue_{number}_enabled"));
                pad(
                    deck,
                    i,
                    Action::new(
                        Input::Push(ControlKey::channel(deck, format!("hotcue_{number}_activate"))),
                        Some(enabled.clone()),
                    ),
                    Action::new(
                        Input::Push(ControlKey::channel(deck, format!("hotcue_{number}_clear"))),
                        Some(enabled),
                    ),
                )
            })
            .collect();
        Self::new(PadModeCode::Hotcue, LED_ON, pads)
    }

    pub fn auto_loop(deck: u8) -> Self {
        let pads = AUTO_LOOP_SIZES
            .iter()
            .enumerate()
            .map(|(i, size)| {
                pad(
                    deck,
                    i,
                    Action::new(
                        Input::Push(ControlKey::channel(deck, format!("beatloop_{size}_toggle"))),
                        Some(ControlKey::channel(deck, format!("beatloop_{size}_enabled"))),
                    ),
                    Action::push(ControlKey::channel(
                        deck,
                        format!("beatlooproll_{size}_activate"),
                    )),
                )
            })
            .collect();
        Self::new(PadModeCode::AutoLoop, LED_ON, pads)
    }

    /// Pads drive the crossfader in firmware; there is nothing to bind.
    pub fn fader_cuts() -> Self {
        Self::new(PadModeCode::FaderCuts, FADER_CUTS_LED_ON, Vec::new())
    }

    /// Samplers 1-8, or 9-16 for the shifted variant.
    pub fn sample(deck: u8, secondary: bool) -> Self {
        let first = if secondary { 9 } else { 1 };
        let pads = (0..PAD_COUNT)
            .map(|i| {
                let group = format!("[Sampler{}]", first + i);
                let loaded = ControlKey::new(group.clone(), "track_loaded");
                pad(
                    deck,
                    i,
                    Action::new(
                        Input::Sampler {
                            group: group.clone(),
                            shifted: false,
                        },
                        Some(loaded.clone()),
                    ),
                    Action::new(
                        Input::Sampler {
                            group,
                            shifted: true,
                        },
                        Some(loaded),
                    ),
                )
            })
            .collect();
        if secondary {
            Self::new(PadModeCode::Sample2, LED_ON, pads).secondary_to(PadModeCode::Sample1)
        } else {
            Self::new(PadModeCode::Sample1, LED_ON, pads)
        }
    }

    pub fn beatjump(deck: u8) -> Self {
        let pads = BEAT_JUMP_VALUES
            .iter()
            .enumerate()
            .map(|(i, size)| {
                pad(
                    deck,
                    i,
                    Action::push(ControlKey::channel(deck, format!("beatjump_{size}forward"))),
                    Action::push(ControlKey::channel(deck, format!("beatjump_{size}backward"))),
                )
            })
            .collect();
        Self::new(PadModeCode::Beatjump, LED_ON, pads).secondary_to(PadModeCode::Hotcue)
    }
}

/// Status byte shared by a deck's pads and mode selectors.
pub fn pad_status(deck: u8) -> u8 {
    0x93 + deck
}

fn pad(deck: u8, index: usize, unshifted: Action, shifted: Action) -> ShiftBinding {
    // index < PAD_COUNT
    let address = MidiAddress::new(pad_status(deck), FIRST_PAD + index as u8);
    ShiftBinding::new(address, unshifted, shifted).with_shift_offset(PAD_SHIFT_OFFSET)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_codes_round_trip_through_bytes() {
        for code in PadModeCode::ALL {
            assert_eq!(PadModeCode::try_from(code.control()).unwrap(), code);
        }
        assert!(matches!(
            PadModeCode::try_from(0x05),
            Err(MappingError::UnknownModeCode(0x05))
        ));
    }

    #[test]
    fn builders_address_deck_pads() {
        let mode = PadMode::hotcue(2);
        assert_eq!(mode.pads().len(), PAD_COUNT);
        assert_eq!(mode.pads()[0].address(), MidiAddress::new(0x95, 0x14));
        assert_eq!(mode.pads()[7].address(), MidiAddress::new(0x95, 0x1B));
        assert_eq!(
            mode.pads()[2].output_key().unwrap(),
            &ControlKey::channel(2, "hotcue_3_enabled")
        );
    }

    #[test]
    fn secondary_modes_point_at_their_selector() {
        assert_eq!(
            PadMode::beatjump(1).secondary_of(),
            Some(PadModeCode::Hotcue)
        );
        assert_eq!(
            PadMode::sample(1, true).secondary_of(),
            Some(PadModeCode::Sample1)
        );
        assert!(!PadMode::sample(1, false).is_secondary());
        assert_eq!(PadMode::fader_cuts().light_on(), FADER_CUTS_LED_ON);
        assert!(PadMode::fader_cuts().pads().is_empty());
    }

    #[test]
    fn beatjump_keys_keep_gui_size_entry() {
        let mode = PadMode::beatjump(1);
        assert_eq!(mode.pads()[6].output_key().unwrap().key, "beatjump_forward");
        assert_eq!(mode.pads()[0].output_key().unwrap().key, "beatjump_0.0625_forward");
    }
}
