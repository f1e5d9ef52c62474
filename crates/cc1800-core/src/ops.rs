//! Composite operations built from the boot ROM requests.

use tracing::{debug, info, instrument, warn};

use crate::device::Cc1800Device;
use crate::error::{BootError, Result};
use crate::transport::UsbTransport;

/// First difference between written and read-back data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mismatch {
    pub offset: usize,
    pub expected: u8,
    pub actual: u8,
    /// Total number of differing bytes.
    pub count: usize,
}

impl Mismatch {
    pub fn into_error(self, address: u32) -> BootError {
        BootError::VerifyMismatch {
            address: address.wrapping_add(self.offset as u32),
            offset: self.offset,
            expected: self.expected,
            actual: self.actual,
        }
    }
}

/// Compare two buffers of equal length.
pub fn find_mismatch(expected: &[u8], actual: &[u8]) -> Option<Mismatch> {
    let mut diffs = expected
        .iter()
        .zip(actual)
        .enumerate()
        .filter(|(_, (e, a))| e != a);
    let (offset, (&e, &a)) = diffs.next()?;
    Some(Mismatch {
        offset,
        expected: e,
        actual: a,
        count: 1 + diffs.count(),
    })
}

/// Write `data` to device memory at `address`.
#[instrument(skip(device, data), fields(address = %format!("0x{:08X}", address), len = data.len()))]
pub fn upload<T: UsbTransport>(
    device: &mut Cc1800Device<'_, T>,
    data: &[u8],
    address: u32,
) -> Result<usize> {
    let written = device.arm_upload(address, data.len())?.write(data)?;
    debug!(written, "Upload complete");
    Ok(written)
}

/// Read `length` bytes of device memory at `address`.
#[instrument(skip(device), fields(address = %format!("0x{:08X}", address)))]
pub fn download<T: UsbTransport>(
    device: &mut Cc1800Device<'_, T>,
    address: u32,
    length: u32,
) -> Result<Vec<u8>> {
    let data = device.arm_download(address, length)?.read()?;
    debug!(read = data.len(), "Download complete");
    Ok(data)
}

/// Upload `data` and read it back. Returns the first difference, if any.
///
/// Transfer failures are errors; a difference is not.
pub fn upload_and_verify<T: UsbTransport>(
    device: &mut Cc1800Device<'_, T>,
    data: &[u8],
    address: u32,
) -> Result<Option<Mismatch>> {
    upload(device, data, address)?;
    // upload() already rejected payloads that do not fit the length word
    let readback = download(device, address, data.len() as u32)?;
    Ok(find_mismatch(data, &readback))
}

/// Upload, verify and execute `data` at `address`.
///
/// A readback difference is fatal here: it fails with
/// [`BootError::VerifyMismatch`] and EXECUTE is never sent.
#[instrument(skip(device, data), fields(address = %format!("0x{:08X}", address), len = data.len()))]
pub fn upload_verify_execute<T: UsbTransport>(
    device: &mut Cc1800Device<'_, T>,
    data: &[u8],
    address: u32,
) -> Result<()> {
    if let Some(mismatch) = upload_and_verify(device, data, address)? {
        warn!(
            offset = mismatch.offset,
            count = mismatch.count,
            "Verification failed, not executing"
        );
        return Err(mismatch.into_error(address));
    }
    info!("Verified, executing");
    device.execute()?;
    Ok(())
}
