mod transport;

pub use transport::{MidiPorts, MidirOut};

pub const NOTE_ON: u8 = 0x90;
pub const NOTE_OFF: u8 = 0x80;
pub const CONTROL_CHANGE: u8 = 0xB0;

/// Raw MIDI transmission supplied by the host.
pub trait MidiOut {
    fn send_short(&mut self, status: u8, data1: u8, data2: u8);
    fn send_sysex(&mut self, data: &[u8]);
}

/// Status byte and note/control number of a physical control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MidiAddress {
    pub status: u8,
    pub control: u8,
}

impl MidiAddress {
    pub const fn new(status: u8, control: u8) -> Self {
        Self { status, control }
    }

    pub fn offset(self, by: u8) -> Self {
        Self {
            status: self.status,
            control: self.control.wrapping_add(by),
        }
    }

    pub fn channel(self) -> u8 {
        self.status & 0x0F
    }
}

/// One incoming three-byte message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiMessage {
    pub status: u8,
    pub data1: u8,
    pub data2: u8,
}

impl MidiMessage {
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [status, data1, data2, ..] => Some(Self {
                status: *status,
                data1: *data1,
                data2: *data2,
            }),
            _ => None,
        }
    }

    pub fn kind(&self) -> u8 {
        self.status & 0xF0
    }

    pub fn channel(&self) -> u8 {
        self.status & 0x0F
    }

    /// Note-off is folded into note-on with velocity 0.
    pub fn is_note(&self) -> bool {
        matches!(self.kind(), NOTE_ON | NOTE_OFF)
    }

    pub fn value(&self) -> u8 {
        if self.kind() == NOTE_OFF {
            0
        } else {
            self.data2
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_off_reads_as_zero() {
        let msg = MidiMessage::from_bytes(&[0x84, 0x14, 0x40]).unwrap();
        assert!(msg.is_note());
        assert_eq!(msg.channel(), 4);
        assert_eq!(msg.value(), 0);
        assert!(MidiMessage::from_bytes(&[0xF8]).is_none());
    }
}
