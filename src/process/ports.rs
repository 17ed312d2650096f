//! Local port selection.
//!
//! A free check only says the port was free a moment ago. The tool's own bind at
//! start time is the authoritative check; returned ports are hints.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::error::{AppError, Result};

/// Search upward from `preferred` for a port that can be bound right now.
pub fn find_available_port(preferred: u16, max_attempts: u32) -> Result<u16> {
    scan(preferred, max_attempts, portpicker::is_free_tcp)
}

fn scan<F>(preferred: u16, max_attempts: u32, mut usable: F) -> Result<u16>
where
    F: FnMut(u16) -> bool,
{
    let mut attempts = 0;
    let mut port = preferred;
    while attempts < max_attempts {
        attempts += 1;
        if port != 0 && usable(port) {
            return Ok(port);
        }
        port = match port.checked_add(1) {
            Some(next) => next,
            None => break,
        };
    }
    Err(AppError::port_exhaustion(preferred, attempts))
}

/// Process-wide table of ports handed out to in-flight creations.
///
/// Cheap to clone; clones share the table.
#[derive(Debug, Clone)]
pub struct PortAllocator {
    reserved: Arc<Mutex<HashSet<u16>>>,
    max_attempts: u32,
}

impl PortAllocator {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            reserved: Arc::new(Mutex::new(HashSet::new())),
            max_attempts,
        }
    }

    /// Reserve a free port at or above `preferred`.
    ///
    /// The port stays reserved in this process until the returned guard drops.
    pub fn reserve(&self, preferred: u16) -> Result<PortReservation> {
        let mut reserved = self.reserved.lock().unwrap_or_else(|e| e.into_inner());
        let port = scan(preferred, self.max_attempts, |port| {
            !reserved.contains(&port) && portpicker::is_free_tcp(port)
        })?;
        reserved.insert(port);
        drop(reserved);

        log::debug!("Reserved port {} (preferred {})", port, preferred);
        Ok(PortReservation {
            port,
            table: Arc::clone(&self.reserved),
        })
    }

    pub fn is_reserved(&self, port: u16) -> bool {
        self.reserved
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&port)
    }
}

/// A port held in the allocator's table until dropped.
#[derive(Debug)]
pub struct PortReservation {
    port: u16,
    table: Arc<Mutex<HashSet<u16>>>,
}

impl PortReservation {
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Drop for PortReservation {
    fn drop(&mut self) {
        self.table
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.port);
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn scan_skips_unusable_ports() {
        let port = scan(5000, 10, |p| p == 5003).unwrap();
        assert_eq!(port, 5003);
    }

    #[test]
    fn scan_gives_up_after_window() {
        let err = scan(5000, 10, |_| false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PortExhaustion);
        assert_eq!(err.get("attempts"), Some("10"));
    }

    #[test]
    fn scan_stops_at_top_of_range() {
        let err = scan(u16::MAX - 1, 1000, |_| false).unwrap_err();
        assert_eq!(err.get("attempts"), Some("2"));
    }

    #[test]
    fn skips_bound_port() {
        let listener = TcpListener::bind(("0.0.0.0", 0)).unwrap();
        let taken = listener.local_addr().unwrap().port();

        let port = find_available_port(taken, 1000).unwrap();

        assert_ne!(port, taken);
        assert!(port > taken);
    }

    #[test]
    fn concurrent_reservations_never_collide() {
        let allocator = PortAllocator::new(1000);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let allocator = allocator.clone();
                std::thread::spawn(move || allocator.reserve(41000).unwrap())
            })
            .collect();

        let reservations: Vec<PortReservation> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        let unique: HashSet<u16> = reservations.iter().map(PortReservation::port).collect();

        assert_eq!(unique.len(), reservations.len());
    }

    #[test]
    fn dropping_reservation_releases_port() {
        let allocator = PortAllocator::new(1000);
        let reservation = allocator.reserve(42000).unwrap();
        let port = reservation.port();
        assert!(allocator.is_reserved(port));

        drop(reservation);

        assert!(!allocator.is_reserved(port));
    }
}
