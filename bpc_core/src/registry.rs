//! One-shot device discovery.
//!
//! Scans the bus's addressable range and identifies every responding
//! address. Runs once per connect, never concurrently with polling.

use crate::device::{DeviceHandle, DeviceKind, ID_SETTLE};
use crate::error::{MonitorError, Report, Result};
use bpc_traits::{BusTransport, Clock};
use std::ops::RangeInclusive;

/// 7-bit addressable range, address 0 reserved.
pub const SCAN_RANGE: RangeInclusive<u8> = 1..=127;

/// Scan `range` for devices, identifying each with an `I` query.
///
/// Addresses that do not acknowledge, answer nothing, or declare a module
/// we do not speak are skipped. Zero usable handles is `NoDevicesFound`;
/// the caller must surface that before allowing a connect.
pub fn discover<T: BusTransport + ?Sized>(
    bus: &mut T,
    clock: &dyn Clock,
    range: RangeInclusive<u8>,
) -> Result<Vec<DeviceHandle>> {
    let mut handles = Vec::new();
    for address in range {
        // A failed write means nothing ACKed at this address.
        if bus.write(address, "I").is_err() {
            continue;
        }
        clock.sleep(ID_SETTLE);
        let resp = match bus.read(address) {
            Ok(resp) => resp,
            Err(e) => {
                tracing::debug!(address, error = %e, "no identification reply");
                continue;
            }
        };
        match parse_identity(&resp) {
            Some(kind) => {
                tracing::info!(address, device = kind.label(), "discovered device");
                handles.push(DeviceHandle::new(address, kind));
            }
            None => {
                tracing::warn!(address, resp = %resp, "unrecognized device skipped");
            }
        }
    }
    if handles.is_empty() {
        return Err(Report::new(MonitorError::NoDevicesFound));
    }
    Ok(handles)
}

/// Parse an identification reply: `1: ?I,<module>,<firmware>`.
fn parse_identity(resp: &str) -> Option<DeviceKind> {
    let (code, payload) = resp.split_once(':')?;
    if code.trim() != "1" {
        return None;
    }
    let mut fields = payload.trim().split(',');
    if fields.next()? != "?I" {
        return None;
    }
    let module = fields.next()?.trim_matches(['\0', ' ']);
    DeviceKind::from_module(module)
}
