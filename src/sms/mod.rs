//! Short-message domain model and the send/receive filter chain.

pub mod filter;

use heapless::{String, Vec};
use serde::{Deserialize, Serialize};

/// Longest SMS address, digits only.
pub const MAX_SMS_ADDRESS_LEN: usize = 20;
/// Longest message text we carry through the filter chain; concatenated
/// messages are reassembled before they get here.
pub const MAX_SMS_TEXT_LEN: usize = 512;
/// Largest application datagram payload.
pub const MAX_DATAGRAM_LEN: usize = 512;
/// SHA-1 sized storage identifier of a received message.
pub const UUID_LEN: usize = 20;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsAddress {
    pub number: String<MAX_SMS_ADDRESS_LEN>,
    /// 3GPP type-of-address byte.
    pub number_type: u8,
}

impl SmsAddress {
    pub fn new(number: &str, number_type: u8) -> Self {
        let mut n = String::new();
        for c in number.chars() {
            if n.push(c).is_err() {
                break;
            }
        }
        Self { number: n, number_type }
    }
}

/// Service-center timestamp of an inbound message.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Scts {
    pub year: u8,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// Quarter-hour offset from GMT.
    pub timezone: i8,
}

/// Identifies a received message in history storage.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageUuid(pub [u8; UUID_LEN]);

/// Message class from the data coding scheme.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SmsClass {
    Class0 = 0,
    Class1 = 1,
    Class2 = 2,
    Class3 = 3,
    /// The DCS did not carry a class.
    #[default]
    Unspecified = 4,
}

/// An outgoing point-to-point text.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OutgoingText {
    pub addr: SmsAddress,
    pub text: String<MAX_SMS_TEXT_LEN>,
}

/// A decoded inbound point-to-point text.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TextMessage {
    pub uuid: StorageUuid,
    pub text: String<MAX_SMS_TEXT_LEN>,
    pub class: SmsClass,
    pub addr: SmsAddress,
    pub scts: Scts,
}

/// An inbound application datagram (port-addressed payload).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub uuid: StorageUuid,
    pub dst_port: u16,
    pub src_port: u16,
    pub data: Vec<u8, MAX_DATAGRAM_LEN>,
    pub addr: SmsAddress,
    pub scts: Scts,
}
