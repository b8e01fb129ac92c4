//! Fixed-capacity session table.
//!
//! # Responsibilities
//! - Create sessions, evicting the least recently used one when full
//! - Resolve cookie values to sessions and refresh their idle timer
//! - Expire idle sessions on the maintenance tick
//!
//! # Design Decisions
//! - Slots are `Option<Session>`; a slot index is stable while the session lives
//! - Linear scans everywhere: the table holds a handful of entries
//! - Eviction ties are broken by the lowest slot index

use std::fmt;
use std::num::NonZeroU64;
use std::str::FromStr;
use std::time::{Duration, Instant};

use crate::observability::metrics;
use crate::session::cookie::session_id_from_header;
use crate::session::entropy::{derive_session_id, DeviceState};

/// Session identifier. Displayed and parsed as lowercase hexadecimal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(NonZeroU64);

impl SessionId {
    pub fn as_u64(&self) -> u64 {
        self.0.get()
    }
}

impl From<NonZeroU64> for SessionId {
    fn from(value: NonZeroU64) -> Self {
        Self(value)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

/// Error for cookie values that do not name a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidSessionId;

impl FromStr for SessionId {
    type Err = InvalidSessionId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = u64::from_str_radix(s, 16).map_err(|_| InvalidSessionId)?;
        NonZeroU64::new(value).map(Self).ok_or(InvalidSessionId)
    }
}

/// An authenticated session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    pub last_used: Instant,
}

/// The session table.
#[derive(Debug)]
pub struct SessionStore {
    slots: Box<[Option<Session>]>,
    ttl: Duration,
    epoch: Instant,
}

impl SessionStore {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            slots: vec![None; capacity.max(1)].into_boxed_slice(),
            ttl,
            epoch: Instant::now(),
        }
    }

    /// Create a session for the request described by `fingerprint`. Never fails.
    pub fn create(&mut self, fingerprint: &[u8], device: &dyn DeviceState, now: Instant) -> Session {
        let slot = match self.slots.iter().position(Option::is_none) {
            Some(slot) => slot,
            None => {
                let slot = self.oldest_slot();
                if let Some(evicted) = self.slots[slot].take() {
                    tracing::debug!(slot, session = %evicted.id, "Session evicted");
                    metrics::record_session_event("evicted");
                }
                slot
            }
        };

        let id = derive_session_id(fingerprint, &self.table_bytes(), device);
        let session = Session { id, last_used: now };
        self.slots[slot] = Some(session);

        tracing::debug!(slot, session = %id, "Session created");
        metrics::record_session_event("created");
        metrics::set_active_sessions(self.len());
        session
    }

    /// Find a live session and refresh its idle timer.
    pub fn lookup(&mut self, id: SessionId, now: Instant) -> Option<Session> {
        let session = self.slots.iter_mut().flatten().find(|s| s.id == id)?;
        session.last_used = now;
        Some(*session)
    }

    /// Resolve a `Cookie` header to a session.
    pub fn get_by_cookie(&mut self, cookie_header: Option<&str>, name: &str, now: Instant) -> Option<Session> {
        let id = session_id_from_header(cookie_header?, name)?;
        self.lookup(id, now)
    }

    /// Remove a session. Destroying an unknown id is a no-op.
    pub fn destroy(&mut self, id: SessionId) -> bool {
        let Some(slot) = self.slot_of(id) else {
            return false;
        };
        self.slots[slot] = None;
        tracing::debug!(slot, session = %id, "Session destroyed");
        metrics::record_session_event("destroyed");
        metrics::set_active_sessions(self.len());
        true
    }

    /// Drop sessions idle for longer than the TTL. Returns how many expired.
    pub fn sweep_idle(&mut self, now: Instant) -> usize {
        let mut expired = 0;
        for (slot, entry) in self.slots.iter_mut().enumerate() {
            if let Some(session) = entry {
                if now.saturating_duration_since(session.last_used) > self.ttl {
                    tracing::debug!(slot, session = %session.id, "Session expired");
                    metrics::record_session_event("expired");
                    *entry = None;
                    expired += 1;
                }
            }
        }
        if expired > 0 {
            metrics::set_active_sessions(self.len());
        }
        expired
    }

    pub fn set_ttl(&mut self, ttl: Duration) {
        self.ttl = ttl;
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Occupied slots.
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn slot_of(&self, id: SessionId) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.is_some_and(|s| s.id == id))
    }

    fn oldest_slot(&self) -> usize {
        self.slots
            .iter()
            .enumerate()
            .min_by_key(|(_, s)| s.map(|s| s.last_used))
            .map(|(index, _)| index)
            .unwrap_or(0)
    }

    /// Raw table contents, mixed into new ids.
    fn table_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.slots.len() * 24);
        for slot in self.slots.iter() {
            let (id, used) = match slot {
                Some(s) => (s.id.as_u64(), s.last_used.saturating_duration_since(self.epoch)),
                None => (0, Duration::ZERO),
            };
            bytes.extend_from_slice(&id.to_le_bytes());
            bytes.extend_from_slice(&used.as_nanos().to_le_bytes());
        }
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::cookie::set_cookie;
    use crate::session::entropy::HostDeviceState;

    fn store(capacity: usize) -> SessionStore {
        SessionStore::new(capacity, Duration::from_secs(60))
    }

    #[test]
    fn fills_empty_slots_first() {
        let device = HostDeviceState::new("SN");
        let mut sessions = store(3);
        let now = Instant::now();

        let a = sessions.create(b"a", &device, now);
        let b = sessions.create(b"b", &device, now);
        assert_eq!(sessions.slot_of(a.id), Some(0));
        assert_eq!(sessions.slot_of(b.id), Some(1));
        assert_eq!(sessions.len(), 2);
    }

    #[test]
    fn full_table_evicts_least_recently_used() {
        let device = HostDeviceState::new("SN");
        let mut sessions = store(3);
        let t0 = Instant::now();

        let a = sessions.create(b"a", &device, t0);
        let b = sessions.create(b"b", &device, t0 + Duration::from_secs(1));
        let c = sessions.create(b"c", &device, t0 + Duration::from_secs(2));

        // Touch `a` so `b` becomes the oldest.
        sessions.lookup(a.id, t0 + Duration::from_secs(3)).unwrap();

        let d = sessions.create(b"d", &device, t0 + Duration::from_secs(4));
        assert_eq!(sessions.len(), 3);
        assert_eq!(sessions.slot_of(b.id), None);
        assert_eq!(sessions.slot_of(d.id), Some(1));
        assert!(sessions.slot_of(a.id).is_some());
        assert!(sessions.slot_of(c.id).is_some());
    }

    #[test]
    fn eviction_ties_go_to_lowest_slot() {
        let device = HostDeviceState::new("SN");
        let mut sessions = store(2);
        let now = Instant::now();

        let a = sessions.create(b"a", &device, now);
        let b = sessions.create(b"b", &device, now);
        let c = sessions.create(b"c", &device, now);

        assert_eq!(sessions.slot_of(a.id), None);
        assert_eq!(sessions.slot_of(c.id), Some(0));
        assert_eq!(sessions.slot_of(b.id), Some(1));
    }

    #[test]
    fn destroy_is_idempotent() {
        let device = HostDeviceState::new("SN");
        let mut sessions = store(2);
        let now = Instant::now();
        let a = sessions.create(b"a", &device, now);
        let b = sessions.create(b"b", &device, now);

        assert!(sessions.destroy(a.id));
        assert!(!sessions.destroy(a.id));
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions.slot_of(b.id), Some(1));
    }

    #[test]
    fn lookup_refreshes_last_used() {
        let device = HostDeviceState::new("SN");
        let mut sessions = store(1);
        let t0 = Instant::now();
        let a = sessions.create(b"a", &device, t0);

        let later = t0 + Duration::from_secs(50);
        assert_eq!(sessions.lookup(a.id, later).unwrap().last_used, later);

        // 50s + 59s since creation, but only 59s idle.
        assert_eq!(sessions.sweep_idle(later + Duration::from_secs(59)), 0);
        assert!(sessions.lookup(a.id, later + Duration::from_secs(59)).is_some());
    }

    #[test]
    fn create_lookup_expire_scenario() {
        let device = HostDeviceState::new("SN");
        let mut sessions = SessionStore::new(5, Duration::from_secs(3600));
        let t0 = Instant::now();

        let session = sessions.create(b"POST /login", &device, t0);
        assert_ne!(session.id.as_u64(), 0);
        assert_eq!(sessions.slot_of(session.id), Some(0));

        let cookie = set_cookie("sid", session.id);
        let header = cookie.split(';').next().unwrap().to_string();
        let t1 = t0 + Duration::from_secs(10);
        let found = sessions.get_by_cookie(Some(&header), "sid", t1).unwrap();
        assert_eq!(found.id, session.id);
        assert_eq!(found.last_used, t1);

        let t2 = t1 + Duration::from_secs(3601);
        assert_eq!(sessions.sweep_idle(t2), 1);
        assert!(sessions.get_by_cookie(Some(&header), "sid", t2).is_none());
        assert!(sessions.is_empty());
    }

    #[test]
    fn session_id_hex_round_trip() {
        let id: SessionId = "00ff".parse().unwrap();
        assert_eq!(id.to_string(), "ff");
        assert!("0".parse::<SessionId>().is_err());
    }
}
