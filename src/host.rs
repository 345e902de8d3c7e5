//! Borrowed bundles of host services handed to the mappings for one event.

use crate::{engine::ControlEngine, midi::MidiOut, timer::Timers};

/// Raw HID output report transmission.
pub trait ReportOut {
    fn send_report(&mut self, data: &[u8]);
}

pub struct MidiHost<'a> {
    pub engine: &'a mut dyn ControlEngine,
    pub timers: &'a mut dyn Timers,
    pub midi: &'a mut dyn MidiOut,
}

pub struct HidHost<'a> {
    pub engine: &'a mut dyn ControlEngine,
    pub reports: &'a mut dyn ReportOut,
}

#[cfg(test)]
pub mod testing {
    use super::ReportOut;
    use crate::midi::MidiOut;

    /// Records every outgoing MIDI message.
    #[derive(Debug, Default)]
    pub struct RecordingMidi {
        pub short: Vec<[u8; 3]>,
        pub sysex: Vec<Vec<u8>>,
    }

    impl RecordingMidi {
        pub fn clear(&mut self) {
            self.short.clear();
            self.sysex.clear();
        }

        /// Last value sent to `(status, control)`.
        pub fn last(&self, status: u8, control: u8) -> Option<u8> {
            self.short
                .iter()
                .rev()
                .find(|msg| msg[0] == status && msg[1] == control)
                .map(|msg| msg[2])
        }
    }

    impl MidiOut for RecordingMidi {
        fn send_short(&mut self, status: u8, data1: u8, data2: u8) {
            self.short.push([status, data1, data2]);
        }

        fn send_sysex(&mut self, data: &[u8]) {
            self.sysex.push(data.to_vec());
        }
    }

    #[derive(Debug, Default)]
    pub struct RecordingReports {
        pub sent: Vec<Vec<u8>>,
    }

    impl ReportOut for RecordingReports {
        fn send_report(&mut self, data: &[u8]) {
            self.sent.push(data.to_vec());
        }
    }
}
