//! Voicecall records and requests on the parcel transport.

use heapless::Vec;

use super::parcel::{Parcel, ParcelError, ParcelReader};
use crate::call::list::VoicecallSink;
use crate::call::{
    Call, CallDirection, CallStatus, CallType, ClirOption, DisconnectReason, PhoneNumber, Validity,
    MAX_CALLER_NAME_LEN, MAX_PHONE_NUMBER_LEN,
};

/// Disconnect cause values reported by the last-call-fail-cause request.
pub const CALL_FAIL_NORMAL: i32 = 16;
pub const CALL_FAIL_BUSY: i32 = 17;
pub const CALL_FAIL_ERROR_UNSPECIFIED: i32 = 0xffff;

/// DTMF tones queued but not yet passed to the modem.
pub const MAX_DTMF_BUFFER: usize = 32;

/// Decode a current-calls response into a call set sorted ascending by id,
/// ready for reconciliation. An empty payload means no calls; some modems
/// signal the idle state that way instead of sending a zero count.
pub fn parse_current_calls<const N: usize>(
    reader: &mut ParcelReader<'_>,
) -> Result<Vec<Call, N>, ParcelError> {
    let mut calls: Vec<Call, N> = Vec::new();

    if reader.data_avail() < 4 {
        return Ok(calls);
    }

    let num = reader.read_i32();
    if num < 0 {
        return Err(ParcelError::Malformed);
    }

    for _ in 0..num {
        let status = reader.read_i32();
        let id = reader.read_i32();
        let toa = reader.read_i32();
        let _is_mpty = reader.read_i32();
        let is_mt = reader.read_i32();
        let _als = reader.read_i32();
        let is_voice = reader.read_i32();
        let _is_voice_privacy = reader.read_i32();
        let number = reader.read_string::<MAX_PHONE_NUMBER_LEN>();
        let _number_presentation = reader.read_i32();
        let name = reader.read_string::<MAX_CALLER_NAME_LEN>();
        let _name_presentation = reader.read_i32();
        let _uus_info = reader.read_i32();

        if reader.malformed() {
            return Err(ParcelError::Malformed);
        }

        let Ok(status) = CallStatus::try_from(status) else {
            warn!("ignoring call id {} with unknown state {}", id, status);
            continue;
        };

        let mut call = Call::new(
            id as u32,
            status,
            if is_mt != 0 {
                CallDirection::MobileTerminated
            } else {
                CallDirection::MobileOriginated
            },
        );
        call.call_type = if is_voice != 0 {
            CallType::Voice
        } else {
            CallType::Other
        };
        if let Some(number) = number {
            call.phone_number = PhoneNumber {
                number,
                number_type: toa as u8,
            };
        }
        if let Some(name) = name {
            call.name = name;
        }
        call.clip_validity = if call.phone_number.is_empty() {
            Validity::NotAvailable
        } else {
            Validity::Valid
        };

        debug!(
            "[id={},status={:?},number={:?}]",
            call.id, call.status, call.phone_number.number
        );

        let pos = calls
            .iter()
            .position(|c| c.id > call.id)
            .unwrap_or(calls.len());
        if calls.insert(pos, call).is_err() {
            warn!("too many calls in response, dropping the rest");
            break;
        }
    }

    Ok(calls)
}

/// Build the dial request: number, CLIR mode and an empty UUS block.
pub fn dial_request<const N: usize>(number: &PhoneNumber, clir: ClirOption) -> Parcel<N> {
    let mut p = Parcel::new();
    p.write_string(Some(number.number.as_str()));
    p.write_i32(clir as i32);
    p.write_i32(0);
    p.write_i32(0);
    p
}

/// Release one call by id (the 1x variant of call release).
pub fn hangup_request<const N: usize>(id: u32) -> Parcel<N> {
    let mut p = Parcel::new();
    p.write_i32(1);
    p.write_i32(id as i32);
    p
}

/// Split one call out of a multiparty; the payload is a one-element array.
pub fn separate_request<const N: usize>(id: u32) -> Parcel<N> {
    let mut p = Parcel::new();
    p.write_i32(1);
    p.write_i32(id as i32);
    p
}

/// The modem takes one tone at a time, as a string.
pub fn dtmf_request<const N: usize>(tone: char) -> Parcel<N> {
    let mut buf = [0u8; 4];
    let mut p = Parcel::new();
    p.write_string(Some(tone.encode_utf8(&mut buf)));
    p
}

/// Map the last-call-fail-cause response onto a disconnect reason. Normal
/// clearing and busy both mean the remote side ended the call; everything
/// else is reported as an error.
pub fn parse_last_cause(reader: &mut ParcelReader<'_>) -> DisconnectReason {
    let mut last_cause = CALL_FAIL_ERROR_UNSPECIFIED;

    if reader.data_avail() >= 4 && reader.read_i32() > 0 {
        last_cause = reader.read_i32();
    }

    if last_cause == CALL_FAIL_NORMAL || last_cause == CALL_FAIL_BUSY {
        DisconnectReason::RemoteHangup
    } else {
        DisconnectReason::Error
    }
}

/// Decode a supplementary-service notification and forward it to the sink.
/// Notification type 1 is mobile-terminated (unsolicited), 0 is the
/// mobile-originated intermediate result.
pub fn parse_ssn<S: VoicecallSink>(reader: &mut ParcelReader<'_>, sink: &mut S) {
    let notif_type = reader.read_i32();
    let code = reader.read_i32();
    let index = reader.read_i32();
    let ton = reader.read_i32();
    let number = reader.read_string::<MAX_PHONE_NUMBER_LEN>();

    if reader.malformed() {
        warn!("malformed supplementary service notification");
        return;
    }

    let number = number
        .map(|n| PhoneNumber {
            number: n,
            number_type: ton as u8,
        })
        .unwrap_or_default();

    if notif_type == 1 {
        sink.ssn_mt_notify(code, index, &number);
    } else {
        sink.ssn_mo_notify(code, index);
    }
}

/// Tones are handed to the modem strictly one at a time; the next one goes
/// out when the previous transmit is acknowledged. A failed transmit drops
/// whatever is still queued.
#[derive(Debug, Default)]
pub struct DtmfQueue {
    tones: heapless::String<MAX_DTMF_BUFFER>,
    pending: bool,
}

impl DtmfQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue tones up to capacity; excess is dropped.
    pub fn push(&mut self, tones: &str) {
        for c in tones.chars() {
            if self.tones.push(c).is_err() {
                warn!("tone queue full, dropping remainder");
                break;
            }
        }
    }

    /// Next tone to transmit, unless one is already in flight.
    pub fn next(&mut self) -> Option<char> {
        if self.pending {
            return None;
        }
        let c = self.tones.chars().next()?;
        self.pending = true;
        Some(c)
    }

    /// The in-flight tone was sent; drop it and allow the next one out.
    pub fn acknowledge(&mut self) {
        if !self.pending {
            return;
        }
        self.pending = false;
        let rest: heapless::String<MAX_DTMF_BUFFER> =
            self.tones.chars().skip(1).collect();
        self.tones = rest;
    }

    /// The transmit failed; clear everything.
    pub fn clear(&mut self) {
        self.tones.clear();
        self.pending = false;
    }

    pub fn is_empty(&self) -> bool {
        self.tones.is_empty()
    }
}
