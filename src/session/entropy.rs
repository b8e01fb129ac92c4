//! Session id derivation.
//!
//! The id is the first eight bytes of a SHA-1 digest over the triggering
//! request, the current session table and a few slowly changing device
//! readings. This is not a cryptographically secure token.

use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use sha1::{Digest, Sha1};

use crate::session::store::SessionId;

/// Device readings mixed into session ids.
pub trait DeviceState: Send + Sync {
    /// Hardware serial number.
    fn serial(&self) -> String;
    /// Monotonic clock reading.
    fn monotonic(&self) -> String;
    /// Free (or used) memory counter.
    fn free_memory(&self) -> String;
    /// Auxiliary supply voltage.
    fn aux_voltage(&self) -> String;
}

/// Device state of the host process.
#[derive(Debug)]
pub struct HostDeviceState {
    serial: String,
    started: Instant,
    aux_voltage: AtomicU64,
}

impl HostDeviceState {
    pub fn new(serial: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            started: Instant::now(),
            aux_voltage: AtomicU64::new(0f64.to_bits()),
        }
    }

    /// Report a new voltage reading (any thread).
    pub fn set_aux_voltage(&self, volts: f64) {
        self.aux_voltage.store(volts.to_bits(), Ordering::Relaxed);
    }
}

impl DeviceState for HostDeviceState {
    fn serial(&self) -> String {
        self.serial.clone()
    }

    fn monotonic(&self) -> String {
        self.started.elapsed().as_micros().to_string()
    }

    fn free_memory(&self) -> String {
        // Resident pages of this process; "0" where procfs is unavailable.
        std::fs::read_to_string("/proc/self/statm")
            .ok()
            .and_then(|s| s.split_whitespace().nth(1).map(str::to_string))
            .unwrap_or_else(|| "0".to_string())
    }

    fn aux_voltage(&self) -> String {
        format!("{:.2}", f64::from_bits(self.aux_voltage.load(Ordering::Relaxed)))
    }
}

/// Hash the available entropy into a non-zero session id.
pub fn derive_session_id(request: &[u8], table: &[u8], device: &dyn DeviceState) -> SessionId {
    let mut hasher = Sha1::new();
    hasher.update(request);
    hasher.update(table);
    hasher.update(device.serial().as_bytes());
    hasher.update(device.monotonic().as_bytes());
    hasher.update(device.free_memory().as_bytes());
    hasher.update(device.aux_voltage().as_bytes());
    let digest = hasher.finalize();

    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    SessionId::from(NonZeroU64::new(u64::from_le_bytes(head)).unwrap_or(NonZeroU64::MIN))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl DeviceState for Fixed {
        fn serial(&self) -> String {
            "SN123".into()
        }
        fn monotonic(&self) -> String {
            "42".into()
        }
        fn free_memory(&self) -> String {
            "1000".into()
        }
        fn aux_voltage(&self) -> String {
            "12.60".into()
        }
    }

    #[test]
    fn same_inputs_same_id() {
        let a = derive_session_id(b"GET /login", &[0; 16], &Fixed);
        let b = derive_session_id(b"GET /login", &[0; 16], &Fixed);
        assert_eq!(a, b);
    }

    #[test]
    fn table_contents_change_id() {
        let a = derive_session_id(b"GET /login", &[0; 16], &Fixed);
        let b = derive_session_id(b"GET /login", &[1; 16], &Fixed);
        assert_ne!(a, b);
    }

    #[test]
    fn host_state_reports_voltage() {
        let state = HostDeviceState::new("SN1");
        state.set_aux_voltage(12.5);
        assert_eq!(state.aux_voltage(), "12.50");
        assert_eq!(state.serial(), "SN1");
    }
}
