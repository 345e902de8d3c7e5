use std::{collections::BTreeMap, time::Duration};

use tracing::{debug, trace, warn};

use crate::{
    engine::ControlKey,
    error::MappingError,
    host::MidiHost,
    midi::{MidiAddress, MidiOut},
    timer::TimerId,
};

use super::{
    binding::{Command, ShiftLayer, LED_OFF},
    blink::Blinker,
    mode::{pad_status, PadMode, PadModeCode, FIRST_PAD, PAD_COUNT},
};

/// Mode whose pads are handled by the controller firmware.
pub const HARDWARE_MODE: PadModeCode = PadModeCode::FaderCuts;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlinkSettings {
    pub enabled: bool,
    pub interval: Duration,
}

impl Default for BlinkSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_millis(700),
        }
    }
}

/// The pad section of one deck: a registry of pad modes with exactly one active.
#[derive(Debug)]
pub struct PadSection {
    deck: u8,
    modes: BTreeMap<PadModeCode, PadMode>,
    current: PadModeCode,
    blinker: Blinker,
    blink: BlinkSettings,
}

impl PadSection {
    /// `initial` is registered and becomes the active mode, still unconnected.
    pub fn new(deck: u8, initial: PadMode, blink: BlinkSettings) -> Self {
        let current = initial.code();
        let mut modes = BTreeMap::new();
        modes.insert(current, initial);
        Self {
            deck,
            modes,
            current,
            blinker: Blinker::default(),
            blink,
        }
    }

    /// All six firmware modes, HOTCUE active.
    pub fn with_default_modes(deck: u8, blink: BlinkSettings) -> Self {
        let mut section = Self::new(deck, PadMode::hotcue(deck), blink);
        section.register_mode(PadMode::auto_loop(deck));
        section.register_mode(PadMode::fader_cuts());
        section.register_mode(PadMode::sample(deck, false));
        section.register_mode(PadMode::beatjump(deck));
        section.register_mode(PadMode::sample(deck, true));
        section
    }

    pub fn register_mode(&mut self, mode: PadMode) {
        let code = mode.code();
        if code == self.current {
            warn!(deck = self.deck, ?code, "refusing to replace the active pad mode");
            return;
        }
        if self.modes.insert(code, mode).is_some() {
            warn!(deck = self.deck, ?code, "pad mode registered twice, replacing");
        }
    }

    pub fn deck(&self) -> u8 {
        self.deck
    }

    pub fn current(&self) -> PadModeCode {
        self.current
    }

    pub fn mode(&self, code: PadModeCode) -> Option<&PadMode> {
        self.modes.get(&code)
    }

    #[cfg(test)]
    pub fn blinker(&self) -> &Blinker {
        &self.blinker
    }

    fn status(&self) -> u8 {
        pad_status(self.deck)
    }

    /// Connect the active mode at start-up.
    pub fn connect_current(&mut self, layer: ShiftLayer, host: &mut MidiHost<'_>) {
        if let Some(mode) = self.modes.get_mut(&self.current) {
            mode.set_layer(layer);
            for pad in mode.pads_mut() {
                pad.connect(host.engine);
                pad.trigger(host);
            }
        }
    }

    /// Mode-select button handler.
    pub fn mode_button(
        &mut self,
        control: u8,
        value: u8,
        layer: ShiftLayer,
        host: &mut MidiHost<'_>,
    ) {
        if value != 0x7F {
            return;
        }
        match PadModeCode::try_from(control) {
            Ok(code) => self.select_mode(code, layer, host),
            Err(err) => warn!(deck = self.deck, %err, "ignoring mode button"),
        }
    }

    pub fn select_mode(&mut self, code: PadModeCode, layer: ShiftLayer, host: &mut MidiHost<'_>) {
        if code == self.current {
            return;
        }
        if !self.modes.contains_key(&code) {
            let err = MappingError::ModeNotRegistered(code);
            warn!(deck = self.deck, %err, "ignoring mode select");
            return;
        }
        debug!(deck = self.deck, from = ?self.current, to = ?code, "pad mode");

        let status = self.status();
        let previous = self.current;
        let previous_secondary = match self.modes.get_mut(&previous) {
            Some(old) => {
                old.disconnect(host.engine);
                old.secondary_of()
            }
            None => None,
        };

        let Some(new_mode) = self.modes.get_mut(&code) else {
            return;
        };
        new_mode.set_layer(layer);
        for pad in new_mode.pads_mut() {
            pad.connect(host.engine);
            pad.trigger(host);
        }
        let new_secondary = new_mode.secondary_of();
        let light_on = new_mode.light_on();

        if self.blink.enabled {
            if let Some(selector) = previous_secondary {
                self.blinker.stop(host.timers);
                // the blink may have been left lit
                host.midi.send_short(status, selector.control(), LED_OFF);
            }
            if let Some(selector) = new_secondary {
                self.blinker.start(
                    MidiAddress::new(status, selector.control()),
                    self.blink.interval,
                    host.timers,
                );
            }
        }

        host.midi.send_short(status, previous.control(), LED_OFF);
        host.midi.send_short(status, code.control(), light_on);

        if code == HARDWARE_MODE {
            self.disable_pad_lights(host.midi);
        }

        self.current = code;
    }

    /// Route a pad press to the active mode. Returns a command the owner must run.
    pub fn pad_event(
        &mut self,
        control: u8,
        value: u8,
        host: &mut MidiHost<'_>,
    ) -> Option<Command> {
        if self.current == HARDWARE_MODE {
            trace!(deck = self.deck, control, "pad handled by firmware");
            return None;
        }
        let index = usize::from(control.wrapping_sub(FIRST_PAD)) % PAD_COUNT;
        let mode = self.modes.get(&self.current)?;
        match mode.pad(index) {
            Some(pad) => pad.input(value, host.engine),
            None => {
                warn!(deck = self.deck, mode = ?self.current, index, "pad not mapped");
                None
            }
        }
    }

    /// Re-resolve every binding of every mode; only the active mode's bindings reconnect.
    pub fn set_layer(&mut self, layer: ShiftLayer, host: &mut MidiHost<'_>) {
        for (code, mode) in self.modes.iter_mut() {
            if *code == self.current {
                for pad in mode.pads_mut() {
                    pad.rebind(layer, host);
                }
            } else {
                mode.set_layer(layer);
            }
        }
    }

    pub fn engine_changed(&self, key: &ControlKey, value: f64, midi: &mut dyn MidiOut) {
        if let Some(mode) = self.modes.get(&self.current) {
            for pad in mode.pads() {
                pad.engine_changed(key, value, midi);
            }
        }
    }

    pub fn on_timer(&mut self, id: TimerId, midi: &mut dyn MidiOut) -> bool {
        self.blinker.tick(id, midi)
    }

    pub fn stop_blink(&mut self, host: &mut MidiHost<'_>) {
        self.blinker.stop(host.timers);
    }

    /// Both layers of all eight pads.
    fn disable_pad_lights(&self, midi: &mut dyn MidiOut) {
        for i in 0..(PAD_COUNT as u8 * 2) {
            midi.send_short(self.status(), FIRST_PAD + i, LED_OFF);
        }
    }
}
