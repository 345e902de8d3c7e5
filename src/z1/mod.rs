//! Native Instruments Traktor Kontrol Z1 over USB HID.

mod usb;

pub use usb::Z1Device;

use tracing::{info, warn};

use crate::{
    config::Z1Settings,
    engine::{ControlEngine, ControlKey},
    error::Result,
    hid::{
        FieldEvent, FieldKind, HidController, HidPacket, KnobBridge, SoftTakeover,
        DEFAULT_KNOB_MODE,
    },
    host::HidHost,
};

pub const INPUT_REPORT_ID: u8 = 0x01;
pub const INPUT_REPORT_LEN: usize = 30;
pub const OUTPUT_REPORT_ID: u8 = 0x80;
pub const OUTPUT_REPORT_LEN: usize = 22;
pub const KNOB_SCALE: f64 = 4096.0;
pub const METER_SEGMENTS: usize = 7;

const CONTROL: &str = "control";
const LIGHTS: &str = "lights";
const BUTTON_BYTE: usize = 29;

fn quick_effect(channel: u8) -> String {
    format!("[QuickEffectRack1_[Channel{channel}]_Effect1]")
}

fn equalizer(channel: u8) -> String {
    format!("[EqualizerRack1_[Channel{channel}]_Effect1]")
}

/// Knob position of a 12-bit field, as `(field, control)` per channel.
fn channel_knobs(channel: u8) -> [(String, ControlKey); 6] {
    [
        (format!("{channel}_gain"), ControlKey::channel(channel, "pregain")),
        (format!("{channel}_hi"), ControlKey::new(equalizer(channel), "parameter3")),
        (format!("{channel}_mid"), ControlKey::new(equalizer(channel), "parameter2")),
        (format!("{channel}_low"), ControlKey::new(equalizer(channel), "parameter1")),
        (
            format!("{channel}_fx"),
            ControlKey::new(format!("[QuickEffectRack1_[Channel{channel}]]"), "super1"),
        ),
        (format!("{channel}_vol"), ControlKey::channel(channel, "volume")),
    ]
}

fn control_packet() -> Result<HidPacket> {
    let mut packet = HidPacket::input(CONTROL, INPUT_REPORT_ID, INPUT_REPORT_LEN);
    for channel in 1..=2usize {
        let o = channel * 10;
        packet.add_field(format!("{channel}_gain"), o - 9, FieldKind::U16, None)?;
        packet.add_field(format!("{channel}_hi"), o - 7, FieldKind::U16, None)?;
        packet.add_field(format!("{channel}_mid"), o - 5, FieldKind::U16, None)?;
        packet.add_field(format!("{channel}_low"), o - 3, FieldKind::U16, None)?;
        packet.add_field(format!("{channel}_fx"), o - 1, FieldKind::U16, None)?;
    }
    packet.add_field("cue_mix", 21, FieldKind::U16, None)?;
    packet.add_field("1_vol", 23, FieldKind::U16, None)?;
    packet.add_field("2_vol", 25, FieldKind::U16, None)?;
    packet.add_field("crossfader", 27, FieldKind::U16, None)?;

    for (name, mask) in [
        ("mode", 0x02),
        ("1_headphone", 0x10),
        ("2_headphone", 0x01),
        ("1_button_fx", 0x04),
        ("2_button_fx", 0x08),
    ] {
        packet.add_field(name, BUTTON_BYTE, FieldKind::U8, Some(mask))?;
    }
    Ok(packet)
}

fn lights_packet() -> Result<HidPacket> {
    let mut packet = HidPacket::output(LIGHTS, OUTPUT_REPORT_ID, OUTPUT_REPORT_LEN);
    for channel in 1..=2usize {
        for segment in 1..=METER_SEGMENTS {
            packet.add_field(
                format!("ch{channel}_meter_segment{segment}"),
                segment + (channel - 1) * METER_SEGMENTS,
                FieldKind::U8,
                None,
            )?;
        }
        packet.add_field(format!("{channel}_headphone"), 14 + channel, FieldKind::U8, None)?;
        packet.add_field(
            format!("{channel}_button_fx_red"),
            14 + channel * 3,
            FieldKind::U8,
            None,
        )?;
        packet.add_field(
            format!("{channel}_button_fx_blue"),
            15 + channel * 3,
            FieldKind::U8,
            None,
        )?;
    }
    packet.add_field("mode", 19, FieldKind::U8, None)?;
    Ok(packet)
}

/// Every control that only moves once the knob has caught up with it.
pub fn soft_takeover_keys() -> Vec<ControlKey> {
    let mut keys = Vec::new();
    for channel in 1..=4u8 {
        for parameter in ["parameter1", "parameter2", "parameter3"] {
            keys.push(ControlKey::new(equalizer(channel), parameter));
        }
        keys.push(ControlKey::new(
            format!("[QuickEffectRack1_[Channel{channel}]]"),
            "super1",
        ));
        for key in ["pregain", "volume", "rate"] {
            keys.push(ControlKey::channel(channel, key));
        }
        for effect in 1..=3 {
            keys.push(ControlKey::new(
                format!("[EffectRack1_EffectUnit{channel}_Effect{effect}]"),
                "meta",
            ));
        }
    }
    keys.push(ControlKey::new("[Master]", "headMix"));
    keys.push(ControlKey::new("[Master]", "crossfader"));
    keys
}

/// Brightness of each VU segment for a level in 0..1. Segments fade in over
/// one seventh of the range each.
pub fn meter_levels(level: f64, brightness: u8) -> [i64; METER_SEGMENTS] {
    let step = 1.0 / METER_SEGMENTS as f64;
    let mut levels = [0; METER_SEGMENTS];
    for (i, slot) in levels.iter_mut().enumerate() {
        let lit = ((level - i as f64 * step) * METER_SEGMENTS as f64).clamp(0.0, 1.0);
        *slot = (lit * f64::from(brightness)) as i64;
    }
    levels
}

/// State the input callbacks work on.
pub struct Z1State {
    pub knobs: KnobBridge,
}

fn knob(state: &mut Z1State, event: &FieldEvent<'_>, host: &mut HidHost<'_>) {
    state.knobs.physical_changed(event.field, event.value, host.engine);
}

pub struct KontrolZ1 {
    settings: Z1Settings,
    hid: HidController<Z1State>,
    state: Z1State,
}

impl KontrolZ1 {
    pub fn new(settings: Z1Settings) -> Result<Self> {
        let mut takeover = SoftTakeover::new(settings.soft_takeover_threshold);
        for key in soft_takeover_keys() {
            takeover.enable(key);
        }
        let mut z1 = Self {
            settings,
            hid: HidController::new(),
            state: Z1State {
                knobs: KnobBridge::new(takeover),
            },
        };
        z1.hid.register_input(control_packet()?);
        z1.hid.register_output(lights_packet()?);
        z1.register_callbacks()?;
        Ok(z1)
    }

    fn register_callbacks(&mut self) -> Result<()> {
        self.hid.link_modifier(CONTROL, "mode", "mode")?;

        for channel in 1..=2u8 {
            self.hid
                .set_callback(CONTROL, &format!("{channel}_headphone"), move |_, event, host| {
                    if event.pressed() {
                        host.engine.toggle(&ControlKey::channel(channel, "pfl"));
                    }
                })?;

            self.hid
                .set_callback(CONTROL, &format!("{channel}_button_fx"), move |_, event, host| {
                    if !event.pressed() {
                        return;
                    }
                    if event.modifiers.get("mode") {
                        host.engine.toggle(&ControlKey::channel(channel, "play"));
                        return;
                    }
                    let quick = ControlKey::new(quick_effect(channel), "enabled");
                    let enabled = if host.engine.get_parameter(&quick) > 0.0 { 0.0 } else { 1.0 };
                    host.engine
                        .set_parameter(&ControlKey::new(equalizer(channel), "enabled"), enabled);
                    host.engine.set_parameter(&quick, enabled);
                })?;

            for (field, key) in channel_knobs(channel) {
                self.state.knobs.bridge(DEFAULT_KNOB_MODE, &field, key, KNOB_SCALE);
                self.hid.set_callback(CONTROL, &field, knob)?;
            }
        }

        for (field, key) in [
            ("cue_mix", ControlKey::new("[Master]", "headMix")),
            ("crossfader", ControlKey::new("[Master]", "crossfader")),
        ] {
            self.state.knobs.bridge(DEFAULT_KNOB_MODE, field, key, KNOB_SCALE);
            self.hid.set_callback(CONTROL, field, knob)?;
        }
        Ok(())
    }

    /// Connect the lights and start watching knob controls for outside changes.
    pub fn init(&mut self, host: &mut HidHost<'_>) -> Result<()> {
        let brightness = self.settings.brightness;
        for channel in 1..=2u8 {
            self.hid.connect_light(
                ControlKey::channel(channel, "VuMeter"),
                LIGHTS,
                move |value, packet| {
                    for (i, level) in meter_levels(value, brightness).into_iter().enumerate() {
                        packet.set_field(&format!("ch{channel}_meter_segment{}", i + 1), level)?;
                    }
                    Ok(())
                },
                host,
            )?;
            self.hid.connect_light(
                ControlKey::channel(channel, "pfl"),
                LIGHTS,
                move |value, packet| {
                    let level = (value * f64::from(brightness)) as i64;
                    packet.set_field(&format!("{channel}_headphone"), level)
                },
                host,
            )?;
            self.hid.connect_light(
                ControlKey::new(quick_effect(channel), "enabled"),
                LIGHTS,
                move |value, packet| {
                    let level = (value * f64::from(brightness)) as i64;
                    packet.set_field(&format!("{channel}_button_fx_red"), level)?;
                    packet.set_field(&format!("{channel}_button_fx_blue"), level)
                },
                host,
            )?;
        }

        for key in self.state.knobs.keys() {
            if self.state.knobs.takeover().is_enabled(&key) {
                host.engine.subscribe(&key);
            }
        }
        info!("Kontrol Z1 initialised");
        Ok(())
    }

    pub fn shutdown(&mut self, host: &mut HidHost<'_>) {
        for key in self.state.knobs.keys() {
            if self.state.knobs.takeover().is_enabled(&key) {
                host.engine.unsubscribe(&key);
            }
        }
        self.hid.disconnect_lights(host);
        if let Err(err) = self.hid.clear(LIGHTS, host.reports) {
            warn!(%err, "could not clear lights");
        }
        info!("Kontrol Z1 shut down");
    }

    /// Handle one raw input report. Malformed reports are logged and dropped.
    pub fn incoming_data(&mut self, raw: &[u8], host: &mut HidHost<'_>) {
        if let Err(err) = self.hid.parse(raw, &mut self.state, host) {
            warn!(%err, "dropping report");
            return;
        }
        let mode = if self.hid.modifiers().get("mode") {
            i64::from(self.settings.brightness)
        } else {
            0
        };
        let sent = self
            .hid
            .set_field(LIGHTS, "mode", mode)
            .and_then(|()| self.hid.send(LIGHTS, host.reports));
        if let Err(err) = sent {
            warn!(%err, "could not update mode light");
        }
    }

    pub fn engine_changed(&mut self, key: &ControlKey, value: f64, host: &mut HidHost<'_>) {
        self.state.knobs.engine_changed(key, host.engine);
        self.hid.engine_changed(key, value, host.reports);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{engine::MemoryEngine, host::testing::RecordingReports};

    struct Report {
        buf: Vec<u8>,
    }

    impl Report {
        fn new() -> Self {
            let mut buf = vec![0u8; INPUT_REPORT_LEN];
            buf[0] = INPUT_REPORT_ID;
            Self { buf }
        }

        fn word(mut self, offset: usize, value: u16) -> Self {
            self.buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
            self
        }

        fn buttons(mut self, bits: u8) -> Self {
            self.buf[BUTTON_BYTE] = bits;
            self
        }
    }

    struct Rig {
        engine: MemoryEngine,
        reports: RecordingReports,
        z1: KontrolZ1,
    }

    impl Rig {
        fn new() -> Self {
            let mut rig = Self {
                engine: MemoryEngine::new(),
                reports: RecordingReports::default(),
                z1: KontrolZ1::new(Z1Settings::default()).unwrap(),
            };
            let mut host = HidHost {
                engine: &mut rig.engine,
                reports: &mut rig.reports,
            };
            rig.z1.init(&mut host).unwrap();
            rig
        }

        fn feed(&mut self, report: Report) {
            let mut host = HidHost {
                engine: &mut self.engine,
                reports: &mut self.reports,
            };
            self.z1.incoming_data(&report.buf, &mut host);
            self.settle();
        }

        fn settle(&mut self) {
            for change in self.engine.drain_changes() {
                let mut host = HidHost {
                    engine: &mut self.engine,
                    reports: &mut self.reports,
                };
                self.z1.engine_changed(&change.key, change.value, &mut host);
            }
        }

        fn last_lights(&self) -> &[u8] {
            self.reports.sent.last().map(Vec::as_slice).unwrap_or(&[])
        }
    }

    #[test]
    fn layouts_register_cleanly() {
        assert_eq!(control_packet().unwrap().fields().len(), 19);
        assert_eq!(lights_packet().unwrap().fields().len(), 21);
        assert_eq!(soft_takeover_keys().len(), 4 * 10 + 2);
    }

    #[test]
    fn init_connects_lights() {
        let rig = Rig::new();
        assert!(rig.engine.is_subscribed(&ControlKey::channel(1, "pfl")));
        assert!(rig.engine.is_subscribed(&ControlKey::channel(2, "VuMeter")));
        assert!(rig.engine.is_subscribed(&ControlKey::new("[Master]", "crossfader")));
        assert_eq!(rig.reports.sent.len(), 1);
        assert_eq!(rig.last_lights()[0], OUTPUT_REPORT_ID);
        assert_eq!(rig.last_lights().len(), OUTPUT_REPORT_LEN);
    }

    #[test]
    fn headphone_button_toggles_pfl_and_its_light() {
        let mut rig = Rig::new();
        rig.feed(Report::new().buttons(0x10));
        assert_eq!(rig.engine.get_value(&ControlKey::channel(1, "pfl")), 1.0);
        assert_eq!(rig.last_lights()[15], 0x7F);

        // release does nothing, second press turns it off
        rig.feed(Report::new());
        rig.feed(Report::new().buttons(0x10));
        assert_eq!(rig.engine.get_value(&ControlKey::channel(1, "pfl")), 0.0);
        assert_eq!(rig.last_lights()[15], 0x00);
    }

    #[test]
    fn fx_button_toggles_quick_effect_or_play_with_mode() {
        let mut rig = Rig::new();
        rig.feed(Report::new().buttons(0x08));
        let quick = ControlKey::new(quick_effect(2), "enabled");
        assert_eq!(rig.engine.get_value(&quick), 1.0);
        assert_eq!(rig.engine.get_value(&ControlKey::new(equalizer(2), "enabled")), 1.0);
        assert_eq!(rig.last_lights()[14 + 2 * 3], 0x7F);
        assert_eq!(rig.last_lights()[15 + 2 * 3], 0x7F);

        rig.feed(Report::new());
        rig.feed(Report::new().buttons(0x02 | 0x08));
        assert_eq!(rig.engine.get_value(&ControlKey::channel(2, "play")), 1.0);
        assert_eq!(rig.engine.get_value(&quick), 1.0);
        assert_eq!(rig.last_lights()[19], 0x7F);
    }

    #[test]
    fn knobs_use_soft_takeover() {
        let mut rig = Rig::new();
        let volume = ControlKey::channel(1, "volume");

        rig.feed(Report::new().word(23, 4000));
        assert_eq!(rig.engine.get_value(&volume), 0.0);

        rig.feed(Report::new().word(23, 50));
        assert_eq!(rig.engine.get_value(&volume), 50.0 / KNOB_SCALE);

        rig.feed(Report::new().word(23, 4000));
        assert_eq!(rig.engine.get_value(&volume), 4000.0 / KNOB_SCALE);

        // another source moves the control: the knob has to find it again
        rig.engine.inject(&volume, 0.2);
        rig.settle();
        rig.feed(Report::new().word(23, 3000));
        assert_eq!(rig.engine.get_value(&volume), 0.2);
    }

    #[test]
    fn meter_segments_fill_in_order() {
        assert_eq!(meter_levels(0.0, 0x7F), [0; METER_SEGMENTS]);
        assert_eq!(meter_levels(1.0, 0x7F), [0x7F; METER_SEGMENTS]);

        let mut rig = Rig::new();
        rig.engine.set_value(&ControlKey::channel(1, "VuMeter"), 0.5);
        rig.settle();
        assert_eq!(&rig.last_lights()[1..=7], &[0x7F, 0x7F, 0x7F, 63, 0, 0, 0]);
    }

    #[test]
    fn bad_reports_are_dropped() {
        let mut rig = Rig::new();
        let before = rig.engine.stats;
        let mut host = HidHost {
            engine: &mut rig.engine,
            reports: &mut rig.reports,
        };
        rig.z1.incoming_data(&[0x07, 0x00], &mut host);
        rig.z1.incoming_data(&[INPUT_REPORT_ID, 0x00], &mut host);
        assert_eq!(rig.engine.stats, before);
    }

    #[test]
    fn shutdown_blanks_lights() {
        let mut rig = Rig::new();
        rig.feed(Report::new().buttons(0x10));
        let mut host = HidHost {
            engine: &mut rig.engine,
            reports: &mut rig.reports,
        };
        rig.z1.shutdown(&mut host);
        let last = rig.last_lights();
        assert_eq!(last[0], OUTPUT_REPORT_ID);
        assert!(last[1..].iter().all(|byte| *byte == 0));
        assert!(!rig.engine.is_subscribed(&ControlKey::channel(1, "pfl")));
    }
}
