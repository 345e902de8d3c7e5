use std::time::Duration;

use crate::{
    midi::{MidiAddress, MidiOut},
    timer::{TimerId, Timers},
};

use super::binding::{LED_OFF, LED_ON};

/// Toggles one LED on a recurring timer.
#[derive(Debug, Default)]
pub struct Blinker {
    /// `None` means no timer is running.
    timer: Option<TimerId>,
    target: Option<MidiAddress>,
    lit: bool,
}

impl Blinker {
    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    #[cfg(test)]
    pub fn target(&self) -> Option<MidiAddress> {
        self.target
    }

    pub fn start(&mut self, target: MidiAddress, interval: Duration, timers: &mut dyn Timers) {
        self.stop(timers);
        self.lit = true;
        self.target = Some(target);
        self.timer = Some(timers.start_timer(interval));
    }

    pub fn stop(&mut self, timers: &mut dyn Timers) {
        let Some(timer) = self.timer.take() else {
            return;
        };
        timers.stop_timer(timer);
        self.target = None;
    }

    /// Handle a timer firing. Returns false if the timer is not ours.
    pub fn tick(&mut self, id: TimerId, midi: &mut dyn MidiOut) -> bool {
        if self.timer != Some(id) {
            return false;
        }
        if let Some(target) = self.target {
            let value = if self.lit { LED_ON } else { LED_OFF };
            midi.send_short(target.status, target.control, value);
            self.lit = !self.lit;
        }
        true
    }
}
