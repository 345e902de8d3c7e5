use std::collections::HashMap;

use tracing::{debug, trace, warn};

use super::packet::HidPacket;
use crate::{
    engine::ControlKey,
    error::{MappingError, Result},
    host::{HidHost, ReportOut},
};

/// Named boolean modifiers driven by input fields (e.g. a held "mode" button).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Modifiers {
    states: HashMap<String, bool>,
}

impl Modifiers {
    pub fn get(&self, name: &str) -> bool {
        self.states.get(name).copied().unwrap_or(false)
    }

    pub fn set(&mut self, name: &str, active: bool) {
        self.states.insert(name.to_string(), active);
    }
}

/// Information about a field value change.
#[derive(Debug, Clone, Copy)]
pub struct FieldEvent<'a> {
    pub packet: &'a str,
    pub field: &'a str,
    pub value: i64,
    pub previous: i64,
    pub modifiers: &'a Modifiers,
}

impl FieldEvent<'_> {
    pub fn pressed(&self) -> bool {
        self.value != 0
    }
}

pub type FieldCallback<C> = Box<dyn FnMut(&mut C, &FieldEvent<'_>, &mut HidHost<'_>)>;
pub type LightFormatter = Box<dyn Fn(f64, &mut HidPacket) -> Result<()>>;

struct InputPacket<C> {
    packet: HidPacket,
    callbacks: HashMap<usize, FieldCallback<C>>,
    modifier_links: HashMap<usize, String>,
}

struct LightConnection {
    key: ControlKey,
    packet: String,
    formatter: LightFormatter,
}

/// Packet registry for one HID device.
///
/// Input reports are diffed field by field and every changed field fires its
/// callback with the mapping state `C`. Output packets are staged and sent
/// only when their bytes change.
pub struct HidController<C> {
    inputs: Vec<InputPacket<C>>,
    outputs: Vec<HidPacket>,
    lights: Vec<LightConnection>,
    modifiers: Modifiers,
}

impl<C> Default for HidController<C> {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            outputs: Vec::new(),
            lights: Vec::new(),
            modifiers: Modifiers::default(),
        }
    }
}

impl<C> HidController<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn modifiers(&self) -> &Modifiers {
        &self.modifiers
    }

    pub fn register_input(&mut self, packet: HidPacket) {
        self.inputs.retain(|input| input.packet.report_id() != packet.report_id());
        self.inputs.push(InputPacket {
            packet,
            callbacks: HashMap::new(),
            modifier_links: HashMap::new(),
        });
    }

    pub fn register_output(&mut self, packet: HidPacket) {
        self.outputs.retain(|output| output.name() != packet.name());
        self.outputs.push(packet);
    }

    fn input_mut(&mut self, packet: &str) -> Result<&mut InputPacket<C>> {
        self.inputs
            .iter_mut()
            .find(|input| input.packet.name() == packet)
            .ok_or_else(|| MappingError::UnknownPacket(packet.to_string()))
    }

    pub fn output_mut(&mut self, packet: &str) -> Result<&mut HidPacket> {
        self.outputs
            .iter_mut()
            .find(|output| output.name() == packet)
            .ok_or_else(|| MappingError::UnknownPacket(packet.to_string()))
    }

    /// Install the callback for one input field, replacing any earlier one.
    pub fn set_callback<F>(&mut self, packet: &str, field: &str, callback: F) -> Result<()>
    where
        F: FnMut(&mut C, &FieldEvent<'_>, &mut HidHost<'_>) + 'static,
    {
        let input = self.input_mut(packet)?;
        let index = input.packet.field_index(field)?;
        input.callbacks.insert(index, Box::new(callback));
        Ok(())
    }

    /// Let `field` drive the modifier `name` (non-zero means active).
    pub fn link_modifier(&mut self, packet: &str, field: &str, name: &str) -> Result<()> {
        let input = self.input_mut(packet)?;
        let index = input.packet.field_index(field)?;
        input.modifier_links.insert(index, name.to_string());
        Ok(())
    }

    /// Decode an input report and fire the callbacks of every changed field.
    ///
    /// Modifiers are updated from the whole report before any callback runs.
    /// Returns the number of changed fields.
    pub fn parse(&mut self, raw: &[u8], ctx: &mut C, host: &mut HidHost<'_>) -> Result<usize> {
        let Some(&report_id) = raw.first() else {
            return Err(MappingError::ShortReport {
                packet: "<empty>".to_string(),
                expected: 1,
                got: 0,
            });
        };
        let input = self
            .inputs
            .iter_mut()
            .find(|input| input.packet.report_id() == report_id)
            .ok_or(MappingError::UnknownReportId(report_id))?;
        let changes = input.packet.parse(raw)?;

        for change in &changes {
            if let Some(name) = input.modifier_links.get(&change.index) {
                self.modifiers.set(name, change.value != 0);
            }
        }

        for change in &changes {
            let Some(field) = input.packet.field(change.index) else {
                continue;
            };
            let Some(callback) = input.callbacks.get_mut(&change.index) else {
                continue;
            };
            let event = FieldEvent {
                packet: input.packet.name(),
                field: field.name(),
                value: change.value,
                previous: change.previous,
                modifiers: &self.modifiers,
            };
            trace!(
                packet = event.packet,
                field = event.field,
                value = event.value,
                previous = event.previous,
                "field changed"
            );
            callback(ctx, &event, host);
        }
        Ok(changes.len())
    }

    pub fn set_field(&mut self, packet: &str, field: &str, value: i64) -> Result<()> {
        self.output_mut(packet)?.set_field(field, value)
    }

    pub fn send(&mut self, packet: &str, reports: &mut dyn ReportOut) -> Result<bool> {
        Ok(self.output_mut(packet)?.send(reports))
    }

    pub fn clear(&mut self, packet: &str, reports: &mut dyn ReportOut) -> Result<()> {
        self.output_mut(packet)?.clear(reports);
        Ok(())
    }

    /// Drive an output packet from a control: subscribe, render the current value, send.
    pub fn connect_light<F>(
        &mut self,
        key: ControlKey,
        packet: &str,
        formatter: F,
        host: &mut HidHost<'_>,
    ) -> Result<()>
    where
        F: Fn(f64, &mut HidPacket) -> Result<()> + 'static,
    {
        let output = self.output_mut(packet)?;
        host.engine.subscribe(&key);
        formatter(host.engine.get_value(&key), output)?;
        output.send(host.reports);
        self.lights.push(LightConnection {
            key,
            packet: packet.to_string(),
            formatter: Box::new(formatter),
        });
        Ok(())
    }

    /// Re-render every light connected to `key`.
    pub fn engine_changed(&mut self, key: &ControlKey, value: f64, reports: &mut dyn ReportOut) {
        for light in self.lights.iter().filter(|light| &light.key == key) {
            let Some(output) = self
                .outputs
                .iter_mut()
                .find(|output| output.name() == light.packet)
            else {
                debug!(packet = %light.packet, "light packet vanished");
                continue;
            };
            if let Err(err) = (light.formatter)(value, output) {
                warn!(control = %key, %err, "light formatter failed");
                continue;
            }
            output.send(reports);
        }
    }

    /// Drop every light connection and unsubscribe its control.
    pub fn disconnect_lights(&mut self, host: &mut HidHost<'_>) {
        for light in self.lights.drain(..) {
            host.engine.unsubscribe(&light.key);
        }
    }
}
