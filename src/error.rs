use thiserror::Error;

pub type Result<T> = std::result::Result<T, MappingError>;

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("field {field} overlaps {other} in packet {packet}")]
    FieldOverlap {
        packet: String,
        field: String,
        other: String,
    },
    #[error("field {field} ({offset}+{width}) does not fit packet {packet} of {length} bytes")]
    FieldOutOfBounds {
        packet: String,
        field: String,
        offset: usize,
        width: usize,
        length: usize,
    },
    #[error("field {field} cannot sit on the report id byte of packet {packet}")]
    ReservedOffset { packet: String, field: String },
    #[error("mask {mask:#x} is empty or wider than field {field}")]
    InvalidMask { field: String, mask: u32 },
    #[error("unknown packet {0}")]
    UnknownPacket(String),
    #[error("unknown field {field} in packet {packet}")]
    UnknownField { packet: String, field: String },
    #[error("no input packet for report id {0:#04x}")]
    UnknownReportId(u8),
    #[error("report for packet {packet} is {got} bytes, expected {expected}")]
    ShortReport {
        packet: String,
        expected: usize,
        got: usize,
    },
    #[error("packet {0} has the wrong direction for this operation")]
    WrongDirection(String),
    #[error("unknown pad mode code {0:#04x}")]
    UnknownModeCode(u8),
    #[error("pad mode {0:?} is not registered")]
    ModeNotRegistered(crate::pads::PadModeCode),
    #[error("config error: {0}")]
    Config(#[from] serde_yaml::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("midi error: {0}")]
    Midi(String),
    #[error("usb error: {0}")]
    Usb(#[from] rusb::Error),
    #[error("no {0} controller found")]
    DeviceNotFound(&'static str),
}
