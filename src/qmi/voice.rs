//! Voice service messages: the all-call-status record feeding the call
//! list, and the dial/answer/end exchanges.

use heapless::Vec;

use super::{QmiError, QmiParam, QmiResult};
use crate::call::{
    Call, CallDirection, CallStatus, CallType, PhoneNumber, Validity, MAX_CALLS,
    MAX_PHONE_NUMBER_LEN,
};

/// Voice service message ids used here.
pub const VOICE_DIAL_CALL: u16 = 0x20;
pub const VOICE_END_CALL: u16 = 0x21;
pub const VOICE_ANSWER_CALL: u16 = 0x22;
pub const VOICE_ALL_CALL_STATUS_IND: u16 = 0x2e;
pub const VOICE_GET_ALL_STATUS: u16 = 0x2f;

/// Dial a voice call even if the modem would prefer another bearer.
pub const CALL_TYPE_VOICE_FORCE: u8 = 0x01;

const TLV_CALL_INFORMATION: u8 = 0x01;
const TLV_REMOTE_PARTY_NUMBER: u8 = 0x10;
const TLV_CALL_ID: u8 = 0x10;
const TLV_DIAL_NUMBER: u8 = 0x01;
const TLV_DIAL_CALL_TYPE: u8 = 0x10;

const CALL_INFO_SIZE: usize = 7;
const REMOTE_PARTY_HEADER: usize = 3;

/// Call states of the voice service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum VoiceCallState {
    Idle = 0x00,
    Orig = 0x01,
    Incoming = 0x02,
    Conv = 0x03,
    CcInProg = 0x04,
    Alerting = 0x05,
    Hold = 0x06,
    Waiting = 0x07,
    Disconnecting = 0x08,
    End = 0x09,
    Setup = 0x0a,
}

impl TryFrom<u8> for VoiceCallState {
    type Error = ();

    fn try_from(v: u8) -> Result<Self, ()> {
        match v {
            0x00 => Ok(Self::Idle),
            0x01 => Ok(Self::Orig),
            0x02 => Ok(Self::Incoming),
            0x03 => Ok(Self::Conv),
            0x04 => Ok(Self::CcInProg),
            0x05 => Ok(Self::Alerting),
            0x06 => Ok(Self::Hold),
            0x07 => Ok(Self::Waiting),
            0x08 => Ok(Self::Disconnecting),
            0x09 => Ok(Self::End),
            0x0a => Ok(Self::Setup),
            _ => Err(()),
        }
    }
}

/// Map a voice-service call state onto the domain status. States with no
/// counterpart return `None` and the call is ignored.
pub fn call_status(state: u8) -> Option<CallStatus> {
    Some(match VoiceCallState::try_from(state).ok()? {
        VoiceCallState::Idle | VoiceCallState::Disconnecting | VoiceCallState::End => {
            CallStatus::Disconnected
        }
        VoiceCallState::Orig => CallStatus::Dialing,
        VoiceCallState::Incoming => CallStatus::Incoming,
        VoiceCallState::Conv => CallStatus::Active,
        // no separate representation for call-control/setup; both show up
        // as an early dialing phase
        VoiceCallState::CcInProg | VoiceCallState::Setup => CallStatus::Dialing,
        VoiceCallState::Alerting => CallStatus::Alerting,
        VoiceCallState::Hold => CallStatus::Held,
        VoiceCallState::Waiting => CallStatus::Waiting,
    })
}

/// The service counts directions from 1.
pub fn call_direction(value: u8) -> CallDirection {
    if value == 2 {
        CallDirection::MobileTerminated
    } else {
        CallDirection::MobileOriginated
    }
}

/// Decode an all-call-status record (solicited or unsolicited; both carry
/// the same fields) into a call set sorted ascending by id.
///
/// The call-information field is mandatory and its length must match its
/// declared instance count exactly. The remote-party-number field is
/// mandatory too and is walked with a running offset because each instance
/// carries a variable-length number.
pub fn parse_all_call_status(result: &QmiResult<'_>) -> Result<Vec<Call, MAX_CALLS>, QmiError> {
    let info = result
        .get(TLV_CALL_INFORMATION)
        .ok_or(QmiError::MissingTlv(TLV_CALL_INFORMATION))?;

    let count = *info.first().ok_or(QmiError::InvalidLength(TLV_CALL_INFORMATION))? as usize;
    if info.len() != 1 + count * CALL_INFO_SIZE {
        return Err(QmiError::InvalidLength(TLV_CALL_INFORMATION));
    }

    let numbers = result
        .get(TLV_REMOTE_PARTY_NUMBER)
        .ok_or(QmiError::MissingTlv(TLV_REMOTE_PARTY_NUMBER))?;
    let number_count =
        *numbers.first().ok_or(QmiError::InvalidLength(TLV_REMOTE_PARTY_NUMBER))? as usize;

    if count != number_count {
        // every call must come with its remote party entry
        return Err(QmiError::InvalidLength(TLV_REMOTE_PARTY_NUMBER));
    }

    let mut calls: Vec<Call, MAX_CALLS> = Vec::new();
    let mut num_offset = 1usize;

    for i in 0..count {
        let instance = &info[1 + i * CALL_INFO_SIZE..1 + (i + 1) * CALL_INFO_SIZE];
        let (id, state, direction) = (instance[0], instance[1], instance[3]);

        // parallel walk of the variable-length remote party records
        let header = numbers
            .get(num_offset..num_offset + REMOTE_PARTY_HEADER)
            .ok_or(QmiError::InvalidLength(TLV_REMOTE_PARTY_NUMBER))?;
        let (_presentation, number_len) = (header[1], header[2] as usize);
        let number = numbers
            .get(num_offset + REMOTE_PARTY_HEADER..num_offset + REMOTE_PARTY_HEADER + number_len)
            .ok_or(QmiError::InvalidLength(TLV_REMOTE_PARTY_NUMBER))?;
        num_offset += REMOTE_PARTY_HEADER + number_len;

        let Some(status) = call_status(state) else {
            debug!("ignoring call id {}, unknown state {}", id, state);
            continue;
        };

        let mut call = Call::new(id as u32, status, call_direction(direction));
        call.call_type = CallType::Voice;

        let mut ph = PhoneNumber::default();
        for &b in number.iter().take(MAX_PHONE_NUMBER_LEN) {
            if ph.number.push(b as char).is_err() {
                break;
            }
        }
        call.clip_validity = if ph.is_empty() {
            Validity::NotAvailable
        } else {
            Validity::Valid
        };
        call.phone_number = ph;

        let pos = calls
            .iter()
            .position(|c| c.id > call.id)
            .unwrap_or(calls.len());
        if calls.insert(pos, call).is_err() {
            warn!("too many calls in status record, dropping the rest");
            break;
        }
    }

    Ok(calls)
}

/// Parameters for a dial request: the number, and the forced-voice call
/// type so data-preferred modems still place a voice call.
pub fn dial_call_param(number: &PhoneNumber) -> Result<QmiParam, QmiError> {
    let mut param = QmiParam::new();
    param.append(TLV_DIAL_NUMBER, number.number.as_bytes())?;
    param.append_u8(TLV_DIAL_CALL_TYPE, CALL_TYPE_VOICE_FORCE)?;
    Ok(param)
}

/// The assigned call id of a dial response. Mandatory.
pub fn parse_dial_result(result: &QmiResult<'_>) -> Result<u8, QmiError> {
    result.error()?;
    result.get_u8(TLV_CALL_ID).ok_or(QmiError::MissingTlv(TLV_CALL_ID))
}

pub fn end_call_param(call_id: u8) -> Result<QmiParam, QmiError> {
    let mut param = QmiParam::new();
    param.append_u8(0x01, call_id)?;
    Ok(param)
}

/// The call id confirmed by an end response, when present.
pub fn parse_end_result(result: &QmiResult<'_>) -> Result<Option<u8>, QmiError> {
    result.error()?;
    Ok(result.get_u8(TLV_CALL_ID))
}

pub fn answer_call_param(call_id: u8) -> Result<QmiParam, QmiError> {
    let mut param = QmiParam::new();
    param.append_u8(0x01, call_id)?;
    Ok(param)
}

/// The call id confirmed by an answer response, when present.
pub fn parse_answer_result(result: &QmiResult<'_>) -> Result<Option<u8>, QmiError> {
    result.error()?;
    Ok(result.get_u8(TLV_CALL_ID))
}
