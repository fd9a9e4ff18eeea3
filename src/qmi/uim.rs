//! UIM service messages: the card status record and PIN verification.
//!
//! The card status record is a packed tree: a header addressing the primary
//! applications, then per-slot records, each carrying per-application info
//! blocks with a variable-length AID in the middle. The walk below keeps a
//! running offset and captures the application the GSM/UMTS primary index
//! points at.

use super::{QmiError, QmiParam, QmiResult};
use crate::sim::{AppState, AppType, CardState, SimError};

/// UIM service message ids used here.
pub const UIM_EVENT_REGISTRATION: u16 = 0x2e;
pub const UIM_GET_CARD_STATUS: u16 = 0x2f;
pub const UIM_VERIFY_PIN: u16 = 0x26;
pub const UIM_CARD_STATUS_EVENT: u16 = 0x32;

/// The card status record of a response or indication.
pub const TLV_CARD_STATUS: u8 = 0x01;
/// Event mask confirmed by an event registration response.
pub const TLV_EVENT_MASK: u8 = 0x10;

/// Card status reporting bit of the event mask.
pub const EVENT_CARD_STATUS: u32 = 0x0001;

/// The primary GSM/UMTS application, pulled out of the card status walk.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CardStatus {
    pub card_state: CardState,
    pub app_type: AppType,
    pub app_state: AppState,
    pub pin1_retries: u8,
    pub puk1_retries: u8,
    pub pin2_retries: u8,
    pub puk2_retries: u8,
}

struct Walker<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Walker<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn u8(&mut self) -> Result<u8, SimError> {
        let v = *self.data.get(self.offset).ok_or(SimError::Truncated)?;
        self.offset += 1;
        Ok(v)
    }

    fn u16(&mut self) -> Result<u16, SimError> {
        let lo = self.u8()?;
        let hi = self.u8()?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    fn skip(&mut self, len: usize) -> Result<(), SimError> {
        if self.data.len() - self.offset < len {
            return Err(SimError::Truncated);
        }
        self.offset += len;
        Ok(())
    }
}

/// Walk the card status record and return the application addressed by the
/// primary GSM/UMTS index (low byte: application, high byte: slot). An
/// index pointing outside the walked applications means there is no active
/// GSM/UMTS application on the card.
pub fn parse_card_status(result: &QmiResult<'_>) -> Result<CardStatus, SimError> {
    let raw = result.get(TLV_CARD_STATUS).ok_or(SimError::MissingStatus)?;
    let mut w = Walker::new(raw);

    let num_slot = w.u8()?;
    let index_gw_pri = w.u16()?;
    let _index_1x_pri = w.u16()?;
    let _index_gw_sec = w.u16()?;
    let _index_1x_sec = w.u16()?;

    let want_app = (index_gw_pri & 0xff) as u8;
    let want_slot = (index_gw_pri >> 8) as u8;

    let mut selected = None;

    for slot in 0..num_slot {
        let card_state = w.u8()?;
        let _upin_state = w.u8()?;
        let _upin_retries = w.u8()?;
        let _upuk_retries = w.u8()?;
        let num_app = w.u8()?;

        for app in 0..num_app {
            let app_type = w.u8()?;
            let app_state = w.u8()?;
            let _perso_substate = w.u8()?;
            let aid_len = w.u8()?;
            w.skip(aid_len as usize)?;

            let _univ_pin = w.u8()?;
            let _pin1_replaced = w.u8()?;
            let _pin1_state = w.u8()?;
            let pin1_retries = w.u8()?;
            let puk1_retries = w.u8()?;
            let _pin2_state = w.u8()?;
            let pin2_retries = w.u8()?;
            let puk2_retries = w.u8()?;

            if slot == want_slot && app == want_app {
                selected = Some(CardStatus {
                    card_state: CardState::from(card_state),
                    app_type: AppType::from(app_type),
                    app_state: AppState::from(app_state),
                    pin1_retries,
                    puk1_retries,
                    pin2_retries,
                    puk2_retries,
                });
            }
        }
    }

    selected.ok_or(SimError::NoActiveApp)
}

/// Event mask confirmed by an event registration response.
pub fn parse_event_mask(result: &QmiResult<'_>) -> Result<u32, QmiError> {
    result.error()?;
    result
        .get_u32(TLV_EVENT_MASK)
        .ok_or(QmiError::MissingTlv(TLV_EVENT_MASK))
}

/// Parameters requesting card status events.
pub fn event_registration_param(mask: u32) -> Result<QmiParam, QmiError> {
    let mut param = QmiParam::new();
    param.append_u32(0x01, mask)?;
    Ok(param)
}

/// Parameters verifying PIN1 of the primary application.
pub fn verify_pin_param(pin: &str) -> Result<QmiParam, QmiError> {
    if pin.is_empty() || pin.len() > 0xff {
        return Err(QmiError::InvalidLength(0x01));
    }

    let mut info = heapless::Vec::<u8, 258>::new();
    info.push(0x01).ok(); // PIN1
    info.push(pin.len() as u8).ok();
    info.extend_from_slice(pin.as_bytes())
        .map_err(|_| QmiError::Overflow)?;

    let mut param = QmiParam::new();
    param.append(0x01, &info)?;
    // primary GSM/UMTS session, no AID
    param.append(0x02, &[0x06, 0x00])?;
    Ok(param)
}
