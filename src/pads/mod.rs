//! Pad-mode state machine: a per-deck registry of pad modes whose bindings
//! are rebound live as the mode or the shift modifier changes.

mod binding;
mod blink;
mod mode;
mod section;

pub use binding::{
    led_value, Action, Command, Input, ShiftBinding, ShiftLayer, ShiftState, LED_OFF, LED_ON,
};
pub use blink::Blinker;
pub use mode::{pad_status, PadMode, PadModeCode, FIRST_PAD, PAD_COUNT, PAD_SHIFT_OFFSET};
pub use section::{BlinkSettings, PadSection, HARDWARE_MODE};
