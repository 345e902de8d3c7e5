use std::sync::mpsc::{self, Receiver};

use midir::{
    Ignore, MidiIO, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection,
};
use tracing::{info, warn};

use super::{MidiMessage, MidiOut};
use crate::error::{MappingError, Result};

const CLIENT_NAME: &str = "deck-mapper";

/// Open input and output connections to one controller.
///
/// Incoming messages are forwarded through a channel so they can be handled
/// on the event loop thread instead of midir's callback thread.
pub struct MidiPorts {
    pub _input: MidiInputConnection<()>,
    pub output: MidirOut,
    pub messages: Receiver<MidiMessage>,
}

impl MidiPorts {
    pub fn open(in_hint: &str, out_hint: &str) -> Result<Self> {
        let mut midi_in =
            MidiInput::new(CLIENT_NAME).map_err(|err| MappingError::Midi(err.to_string()))?;
        midi_in.ignore(Ignore::None);
        let midi_out =
            MidiOutput::new(CLIENT_NAME).map_err(|err| MappingError::Midi(err.to_string()))?;

        let in_port = find_port(&midi_in, in_hint)?;
        let out_port = find_port(&midi_out, out_hint)?;
        let in_name = port_label(&midi_in, &in_port);
        let out_name = port_label(&midi_out, &out_port);

        let (tx, messages) = mpsc::channel::<MidiMessage>();
        let input = midi_in
            .connect(
                &in_port,
                "deck-mapper-in",
                move |_stamp, bytes, _| {
                    if let Some(message) = MidiMessage::from_bytes(bytes) {
                        let _ = tx.send(message);
                    }
                },
                (),
            )
            .map_err(|err| MappingError::Midi(err.to_string()))?;

        let connection = midi_out
            .connect(&out_port, "deck-mapper-out")
            .map_err(|err| MappingError::Midi(err.to_string()))?;

        info!(input = %in_name, output = %out_name, "midi ports open");

        Ok(Self {
            _input: input,
            output: MidirOut {
                connection,
                port_name: out_name,
            },
            messages,
        })
    }
}

pub struct MidirOut {
    connection: MidiOutputConnection,
    port_name: String,
}

impl MidirOut {
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    fn send(&mut self, bytes: &[u8]) {
        if let Err(err) = self.connection.send(bytes) {
            warn!(port = %self.port_name, %err, "failed to send midi message");
        }
    }
}

impl MidiOut for MidirOut {
    fn send_short(&mut self, status: u8, data1: u8, data2: u8) {
        self.send(&[status, data1, data2]);
    }

    fn send_sysex(&mut self, data: &[u8]) {
        self.send(data);
    }
}

/// First port whose name contains `hint` (case-insensitive), or the first port
/// when the hint is blank.
fn find_port<T: MidiIO>(io: &T, hint: &str) -> Result<T::Port> {
    let ports = io.ports();
    if ports.is_empty() {
        return Err(MappingError::Midi(format!(
            "no MIDI port matching \"{hint}\" was found"
        )));
    }

    if hint.trim().is_empty() {
        return Ok(ports[0].clone());
    }

    let hint = hint.to_lowercase();
    ports
        .iter()
        .find(|port| {
            io.port_name(port)
                .map(|name| name.to_lowercase().contains(&hint))
                .unwrap_or(false)
        })
        .cloned()
        .ok_or_else(|| MappingError::Midi(format!("no MIDI port matching \"{hint}\" was found")))
}

fn port_label<T: MidiIO>(io: &T, port: &T::Port) -> String {
    io.port_name(port).unwrap_or_else(|_| "<unknown>".into())
}
