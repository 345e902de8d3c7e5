use std::time::Duration;

use rusb::{Context, DeviceHandle, Error, UsbContext};
use tracing::{debug, info, warn};

use crate::{
    config::Z1Settings,
    error::{MappingError, Result},
    host::ReportOut,
};

const READ_TIMEOUT: Duration = Duration::from_millis(50);

/// USB connection to a Kontrol Z1, exchanging raw HID reports over its interrupt endpoints.
pub struct Z1Device {
    _context: Context,
    handle: DeviceHandle<Context>,
    read_endpoint: u8,
    write_endpoint: u8,
    input_buf: [u8; 64],
}

impl Z1Device {
    /// Open the first device on the bus matching the configured vendor and product id.
    pub fn connect(settings: &Z1Settings) -> Result<Self> {
        let context = Context::new()?;
        let mut handle = None;

        for device in context.devices()?.iter() {
            let desc = device.device_descriptor()?;
            if desc.vendor_id() == settings.vendor_id && desc.product_id() == settings.product_id {
                handle = Some(device.open()?);
                break;
            }
        }

        let Some(mut handle) = handle else {
            return Err(MappingError::DeviceNotFound("Kontrol Z1"));
        };

        if let Err(err) = handle.set_auto_detach_kernel_driver(true) {
            debug!(?err, "kernel driver auto-detach unavailable");
        }
        handle.claim_interface(0)?;
        info!(
            vendor = settings.vendor_id,
            product = settings.product_id,
            "opened Kontrol Z1"
        );

        Ok(Self {
            _context: context,
            handle,
            read_endpoint: settings.read_endpoint,
            write_endpoint: settings.write_endpoint,
            input_buf: [0; 64],
        })
    }

    /// Wait briefly for the next input report. `None` on timeout.
    pub fn read_report(&mut self) -> Result<Option<&[u8]>> {
        match self
            .handle
            .read_interrupt(self.read_endpoint, &mut self.input_buf, READ_TIMEOUT)
        {
            Ok(len) => Ok(Some(&self.input_buf[..len])),
            Err(Error::Timeout) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

impl ReportOut for Z1Device {
    fn send_report(&mut self, data: &[u8]) {
        if let Err(err) = self
            .handle
            .write_interrupt(self.write_endpoint, data, READ_TIMEOUT)
        {
            warn!(?err, "USB write error");
        }
    }
}
