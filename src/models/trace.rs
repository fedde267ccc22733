//! Activity tracing.
//!
//! Every completed activity carries the energy consumed while it ran:
//! `nominal power (W) × elapsed seconds`. Soldering and test activities add
//! kind-specific measurements.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Offset added to packed faulty-contact codes.
const ERROR_CODE_OFFSET: i64 = 42;
/// Bits used per contact number.
const CONTACT_BITS: u32 = 3;

/// Tracing attached to a completed activity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActivityTrace {
    /// Energy consumed in watt-seconds.
    pub energy_consumption: f64,
    /// Kind-specific measurements.
    pub detail: TraceDetail,
}

/// Kind-specific tracing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum TraceDetail {
    /// Energy only.
    #[default]
    Energy,
    /// Soldering temperature in °C.
    Soldering {
        /// Effective soldering temperature.
        temperature: i32,
    },
    /// Electrical test measurements.
    Test {
        /// Contacts found faulty (1..=6).
        faulty_contacts: Vec<u8>,
        /// First faulty contact, if any.
        contact: Option<u8>,
        /// Measured resistance in ohms.
        resistance: f64,
    },
}

impl ActivityTrace {
    /// Energy tracing for a run of `elapsed` at `nominal_power` watts.
    pub fn energy(nominal_power: u32, elapsed: Duration) -> Self {
        Self {
            energy_consumption: energy_consumption(nominal_power, elapsed),
            detail: TraceDetail::Energy,
        }
    }

    /// Replaces the detail.
    pub fn with_detail(mut self, detail: TraceDetail) -> Self {
        self.detail = detail;
        self
    }

    /// Error code of the faulty contacts, if this is a test trace.
    pub fn error_code(&self) -> Option<i64> {
        match &self.detail {
            TraceDetail::Test {
                faulty_contacts, ..
            } => Some(encode_faulty_contacts(faulty_contacts)),
            _ => None,
        }
    }
}

/// Energy in watt-seconds.
pub fn energy_consumption(nominal_power: u32, elapsed: Duration) -> f64 {
    f64::from(nominal_power) * elapsed.as_secs_f64()
}

/// Packs contact numbers into an error code, first contact in the highest bits.
pub fn encode_faulty_contacts(contacts: &[u8]) -> i64 {
    contacts
        .iter()
        .fold(0i64, |acc, &c| (acc << CONTACT_BITS) + i64::from(c & 0b111))
        + ERROR_CODE_OFFSET
}

/// Unpacks an error code produced by [`encode_faulty_contacts`].
pub fn decode_faulty_contacts(error_code: i64) -> Vec<u8> {
    let mut packed = error_code - ERROR_CODE_OFFSET;
    let mut contacts = Vec::new();
    while packed > 0 {
        contacts.push((packed & 0b111) as u8);
        packed >>= CONTACT_BITS;
    }
    contacts.reverse();
    contacts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_energy() {
        let trace = ActivityTrace::energy(225, Duration::from_millis(2000));
        assert!((trace.energy_consumption - 450.0).abs() < 1e-9);
        assert_eq!(trace.detail, TraceDetail::Energy);
    }

    #[test]
    fn test_faulty_contact_code() {
        assert_eq!(encode_faulty_contacts(&[]), 42);
        assert_eq!(encode_faulty_contacts(&[3]), 45);
        assert_eq!(encode_faulty_contacts(&[2, 5]), (2 << 3) + 5 + 42);
        assert_eq!(decode_faulty_contacts(encode_faulty_contacts(&[2, 5])), vec![2, 5]);
        assert!(decode_faulty_contacts(42).is_empty());
    }

    #[test]
    fn test_error_code_only_for_test_trace() {
        let trace = ActivityTrace::energy(10, Duration::ZERO);
        assert_eq!(trace.error_code(), None);
        let trace = trace.with_detail(TraceDetail::Test {
            faulty_contacts: vec![1],
            contact: Some(1),
            resistance: 80.0,
        });
        assert_eq!(trace.error_code(), Some(43));
    }
}
