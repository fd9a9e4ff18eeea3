//! Voicecall domain model: call records, the retained call list and the
//! dial/incoming filter chain.

pub mod filter;
pub mod list;

use heapless::String;
use serde::{Deserialize, Serialize};

/// Longest phone number carried on the wire, digits only.
pub const MAX_PHONE_NUMBER_LEN: usize = 80;
/// Longest calling-name (CNAP) string.
pub const MAX_CALLER_NAME_LEN: usize = 80;
/// Largest number of concurrent calls a modem reports.
pub const MAX_CALLS: usize = 16;

/// Type-of-address byte for an international number.
pub const TOA_INTERNATIONAL: u8 = 145;
/// Type-of-address byte for an unknown numbering plan.
pub const TOA_UNKNOWN: u8 = 129;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CallStatus {
    Active = 0,
    Held = 1,
    Dialing = 2,
    Alerting = 3,
    Incoming = 4,
    Waiting = 5,
    #[default]
    Disconnected = 6,
}

impl TryFrom<i32> for CallStatus {
    type Error = ();

    fn try_from(v: i32) -> Result<Self, ()> {
        match v {
            0 => Ok(Self::Active),
            1 => Ok(Self::Held),
            2 => Ok(Self::Dialing),
            3 => Ok(Self::Alerting),
            4 => Ok(Self::Incoming),
            5 => Ok(Self::Waiting),
            6 => Ok(Self::Disconnected),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CallDirection {
    #[default]
    MobileOriginated = 0,
    MobileTerminated = 1,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CallType {
    #[default]
    Voice,
    Other,
}

/// CLIP/CNAP presentation validity.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Validity {
    Valid = 0,
    Withheld = 1,
    #[default]
    NotAvailable = 2,
}

/// Why a call left the active set.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DisconnectReason {
    #[default]
    Unknown,
    LocalHangup,
    RemoteHangup,
    Error,
}

/// CLIR override carried on a dial request.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClirOption {
    #[default]
    Default = 0,
    Invocation = 1,
    Suppression = 2,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PhoneNumber {
    pub number: String<MAX_PHONE_NUMBER_LEN>,
    /// 3GPP type-of-address byte.
    pub number_type: u8,
}

impl PhoneNumber {
    pub fn new(number: &str, number_type: u8) -> Self {
        let mut n = String::new();
        // Longer numbers are not representable on the wire either.
        for c in number.chars() {
            if n.push(c).is_err() {
                break;
            }
        }
        Self { number: n, number_type }
    }

    pub fn is_empty(&self) -> bool {
        self.number.is_empty()
    }
}

/// One call in a modem's active set. `id` is assigned by the modem and is
/// unique among the currently active calls of that modem.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Call {
    pub id: u32,
    pub status: CallStatus,
    pub direction: CallDirection,
    pub call_type: CallType,
    /// Remote party.
    pub phone_number: PhoneNumber,
    /// Number we dialed; only ever learned at dial time.
    pub called_number: PhoneNumber,
    pub name: String<MAX_CALLER_NAME_LEN>,
    pub clip_validity: Validity,
    pub cnap_validity: Validity,
}

impl Call {
    pub fn new(id: u32, status: CallStatus, direction: CallDirection) -> Self {
        Self {
            id,
            status,
            direction,
            call_type: CallType::Voice,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_number_truncates_at_capacity() {
        let long: std::string::String = core::iter::repeat('9').take(120).collect();
        let ph = PhoneNumber::new(&long, TOA_UNKNOWN);
        assert_eq!(ph.number.len(), MAX_PHONE_NUMBER_LEN);
    }

    #[test]
    fn call_status_from_wire() {
        assert_eq!(CallStatus::try_from(4), Ok(CallStatus::Incoming));
        assert_eq!(CallStatus::try_from(7), Err(()));
    }
}
