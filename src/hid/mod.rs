//! Bitfield report model for HID controllers: differential parsing with
//! per-field callbacks, dirty-checked output and soft takeover for knobs.

mod controller;
mod field;
mod packet;
mod takeover;

pub use controller::{FieldEvent, HidController};
pub use field::FieldKind;
pub use packet::HidPacket;
pub use takeover::{KnobBridge, SoftTakeover, DEFAULT_KNOB_MODE};
