mod config;
mod engine;
mod error;
mod hid;
mod host;
mod midi;
mod mixtrack;
mod pads;
mod timer;
mod z1;

use std::{
    sync::mpsc::TryRecvError,
    thread,
    time::{Duration, Instant},
};

use tracing::info;
use tracing_subscriber::EnvFilter;

use config::{ControllerKind, MapperConfig, MixtrackSettings, Z1Settings};
use engine::MemoryEngine;
use error::Result;
use host::{HidHost, MidiHost};
use midi::MidiPorts;
use mixtrack::MixtrackProFx;
use timer::TimerQueue;
use z1::{KontrolZ1, Z1Device};

const LOOP_SLEEP: Duration = Duration::from_millis(2);

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let path = std::env::args().nth(1);
    let config = MapperConfig::load(path.as_deref())?;
    info!(controller = ?config.controller, "starting");

    match config.controller {
        ControllerKind::Mixtrack => run_mixtrack(config.mixtrack),
        ControllerKind::Z1 => run_z1(config.z1),
    }
}

fn run_mixtrack(settings: MixtrackSettings) -> Result<()> {
    let mut ports = MidiPorts::open(&settings.midi_in_hint, &settings.midi_out_hint)?;
    info!(port = %ports.output.port_name(), "Mixtrack Pro FX connected");

    let mut engine = MemoryEngine::new();
    let mut timers = TimerQueue::new();
    let mut controller = MixtrackProFx::new(settings);

    {
        let mut host = MidiHost {
            engine: &mut engine,
            timers: &mut timers,
            midi: &mut ports.output,
        };
        controller.init(&mut host);
    }

    loop {
        let mut host = MidiHost {
            engine: &mut engine,
            timers: &mut timers,
            midi: &mut ports.output,
        };

        // Drain controller events.
        let disconnected = loop {
            match ports.messages.try_recv() {
                Ok(message) => controller.midi_event(message, &mut host),
                Err(TryRecvError::Empty) => break false,
                Err(TryRecvError::Disconnected) => break true,
            }
        };
        if disconnected {
            controller.shutdown(&mut host);
            break;
        }

        for id in timers.poll(Instant::now()) {
            let mut host = MidiHost {
                engine: &mut engine,
                timers: &mut timers,
                midi: &mut ports.output,
            };
            controller.on_timer(id, &mut host);
        }

        for change in engine.drain_changes() {
            let mut host = MidiHost {
                engine: &mut engine,
                timers: &mut timers,
                midi: &mut ports.output,
            };
            controller.engine_changed(&change, &mut host);
        }

        thread::sleep(LOOP_SLEEP);
    }

    info!("midi input closed");
    Ok(())
}

fn run_z1(settings: Z1Settings) -> Result<()> {
    let mut device = Z1Device::connect(&settings)?;
    let poll_interval = Duration::from_millis(settings.poll_interval_ms);

    let mut engine = MemoryEngine::new();
    let mut controller = KontrolZ1::new(settings)?;

    {
        let mut host = HidHost {
            engine: &mut engine,
            reports: &mut device,
        };
        controller.init(&mut host)?;
    }

    let result = loop {
        let report = match device.read_report() {
            Ok(report) => report.map(<[u8]>::to_vec),
            Err(err) => break Err(err),
        };

        if let Some(report) = report {
            let mut host = HidHost {
                engine: &mut engine,
                reports: &mut device,
            };
            controller.incoming_data(&report, &mut host);
        }

        for change in engine.drain_changes() {
            let mut host = HidHost {
                engine: &mut engine,
                reports: &mut device,
            };
            controller.engine_changed(&change.key, change.value, &mut host);
        }

        thread::sleep(poll_interval);
    };

    let mut host = HidHost {
        engine: &mut engine,
        reports: &mut device,
    };
    controller.shutdown(&mut host);
    result
}
