//! Supplementary-service (USSD) messages of the voice service.
//!
//! USSD payloads ride in a small packed block: a data coding scheme byte, a
//! length byte and that many data bytes. The network's answer to a request
//! arrives asynchronously as an indication, not in the request's response.

use super::{QmiParam, QmiResult};

/// Voice service message ids for supplementary services.
pub const VOICE_CANCEL_USSD: u16 = 0x3c;
pub const VOICE_USSD_RELEASE_IND: u16 = 0x3d;
pub const VOICE_USSD_IND: u16 = 0x3e;
pub const VOICE_ASYNC_ORIG_USSD: u16 = 0x43;

/// Request field carrying the USSD block.
pub const TLV_USS_DATA: u8 = 0x01;
/// Error word of the asynchronous originate indication.
pub const TLV_ASYNC_USSD_ERROR: u8 = 0x10;
/// Network failure cause, present when the error word says so.
pub const TLV_ASYNC_USSD_FAILURE_CAUSE: u8 = 0x11;
/// USSD block of the asynchronous originate indication.
pub const TLV_ASYNC_USSD_DATA: u8 = 0x12;
/// User-action field of an unsolicited USSD indication.
pub const TLV_USSD_IND_USER_ACTION: u8 = 0x01;
/// USSD block of an unsolicited indication.
pub const TLV_USSD_IND_DATA: u8 = 0x10;

/// The error word value that says a failure cause follows.
const USSD_ERROR_CAUSE_FOLLOWS: u16 = 92;

/// 23.038 coding group 1111, no message class, 8-bit data.
pub const GSM_DCS_8BIT: u8 = 0xf4;
/// 23.038 coding group 01xx, class 0, UCS2.
pub const GSM_DCS_UCS2: u8 = 0x48;
/// Default alphabet, language unspecific.
pub const GSM_DCS_UNSPECIFIC: u8 = 0x0f;

/// Data coding scheme values of the USSD block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum UssdDcs {
    Ascii = 1,
    EightBit = 2,
    Ucs2 = 3,
}

impl TryFrom<u8> for UssdDcs {
    type Error = ();

    fn try_from(v: u8) -> Result<Self, ()> {
        match v {
            1 => Ok(Self::Ascii),
            2 => Ok(Self::EightBit),
            3 => Ok(Self::Ucs2),
            _ => Err(()),
        }
    }
}

/// The 23.038 scheme an indication's coding maps onto. Only the ASCII
/// coding has a faithful mapping; the other two are rejected so garbled
/// payloads never reach the user.
pub fn gsm_dcs(dcs: UssdDcs) -> Option<u8> {
    match dcs {
        UssdDcs::Ascii => Some(GSM_DCS_8BIT),
        _ => None,
    }
}

/// A decoded USSD block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UssdData<'a> {
    pub dcs: UssdDcs,
    pub data: &'a [u8],
}

/// Validate and slice a USSD block: dcs byte, length byte, payload of at
/// least that length.
pub fn parse_ussd_data(raw: &[u8]) -> Option<UssdData<'_>> {
    let (&dcs, rest) = raw.split_first()?;
    let (&length, payload) = rest.split_first()?;
    if payload.len() < length as usize {
        return None;
    }

    Some(UssdData {
        dcs: UssdDcs::try_from(dcs).ok()?,
        data: &payload[..length as usize],
    })
}

/// What an asynchronous originate indication amounts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UssdEvent<'a> {
    /// The network answered; deliver the payload under the given 23.038
    /// scheme.
    Notify { dcs: u8, data: &'a [u8] },
    /// The session is gone, with or without a cause.
    Terminated,
    /// Nothing to deliver.
    None,
}

/// Decode the asynchronous originate indication. An error word of zero
/// means the payload (if any) is the network's answer; the cause-follows
/// value carries a network failure cause; anything else terminates the
/// session.
pub fn parse_async_orig<'a>(result: &QmiResult<'a>) -> UssdEvent<'a> {
    let error = result.get_u16(TLV_ASYNC_USSD_ERROR).unwrap_or(0);
    match error {
        0 => {}
        USSD_ERROR_CAUSE_FOLLOWS => {
            let cause = result.get_u16(TLV_ASYNC_USSD_FAILURE_CAUSE).unwrap_or(0);
            debug!("ussd failure cause {}", cause);
            return UssdEvent::Terminated;
        }
        _ => {
            debug!("ussd error {}", error);
            return UssdEvent::Terminated;
        }
    }

    let Some(raw) = result.get(TLV_ASYNC_USSD_DATA) else {
        return UssdEvent::None;
    };
    match parse_ussd_data(raw).and_then(|u| Some((gsm_dcs(u.dcs)?, u.data))) {
        Some((dcs, data)) => UssdEvent::Notify { dcs, data },
        None => UssdEvent::Terminated,
    }
}

/// Decode an unsolicited USSD indication. Returns the payload and whether
/// the network expects a user response.
pub fn parse_ussd_ind<'a>(result: &QmiResult<'a>) -> Option<(UssdData<'a>, bool)> {
    let user_action = result
        .get_u8(TLV_USSD_IND_USER_ACTION)
        .map(|v| v == 1)
        .unwrap_or(false);

    let data = parse_ussd_data(result.get(TLV_USSD_IND_DATA)?)?;
    Some((data, user_action))
}

/// Parameters originating a USSD exchange. The payload goes out under the
/// ASCII coding; the broken 8-bit and UCS2 codings are not offered.
pub fn originate_param(text: &[u8]) -> Result<QmiParam, super::QmiError> {
    let mut block = heapless::Vec::<u8, 258>::new();
    block.push(UssdDcs::Ascii as u8).ok();
    block.push(text.len() as u8).ok();
    block
        .extend_from_slice(text)
        .map_err(|_| super::QmiError::Overflow)?;

    let mut param = QmiParam::new();
    param.append(TLV_USS_DATA, &block)?;
    Ok(param)
}
