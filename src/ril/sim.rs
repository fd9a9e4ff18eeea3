//! SIM card status records on the parcel transport.
//!
//! The application state codes here belong to this transport; they are not
//! the UIM service codes (notably "ready" is 5 here, 7 there).

use heapless::{String, Vec};

use super::parcel::{ParcelError, ParcelReader};
use crate::sim::{AppType, CardState, PasswdState};

/// Applications a multi-application UICC can expose at once.
pub const MAX_UICC_APPS: usize = 8;
/// Longest application id / label we keep.
pub const MAX_AID_LEN: usize = 32;

pub const APPSTATE_UNKNOWN: i32 = 0;
pub const APPSTATE_DETECTED: i32 = 1;
pub const APPSTATE_PIN: i32 = 2;
pub const APPSTATE_PUK: i32 = 3;
pub const APPSTATE_SUBSCRIPTION_PERSO: i32 = 4;
pub const APPSTATE_READY: i32 = 5;

/// One application entry of the card status record.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AppRecord {
    pub app_type: AppType,
    pub app_state: i32,
    pub perso_substate: i32,
    pub aid: Option<String<MAX_AID_LEN>>,
    pub label: Option<String<MAX_AID_LEN>>,
    pub pin_replaced: i32,
    pub pin1_state: i32,
    pub pin2_state: i32,
}

impl AppRecord {
    /// Password the application is waiting for. Personalization locks are
    /// out of scope here and read as no password required.
    pub fn passwd_state(&self) -> PasswdState {
        match self.app_state {
            APPSTATE_PIN => PasswdState::SimPin,
            APPSTATE_PUK => PasswdState::SimPuk,
            APPSTATE_READY | APPSTATE_SUBSCRIPTION_PERSO => PasswdState::None,
            _ => PasswdState::Invalid,
        }
    }
}

/// The decoded card status reply.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SimCardStatus {
    pub card_state: CardState,
    /// Universal PIN state for multi-application cards.
    pub pin_state: i32,
    pub gsm_umts_index: i32,
    pub cdma_index: i32,
    pub ims_index: i32,
    pub apps: Vec<AppRecord, MAX_UICC_APPS>,
}

impl SimCardStatus {
    /// The application the GSM/UMTS index points at, if it is in range.
    pub fn gsm_umts_app(&self) -> Option<&AppRecord> {
        usize::try_from(self.gsm_umts_index)
            .ok()
            .and_then(|i| self.apps.get(i))
    }
}

/// Decode a card status reply. An absent card carries no application
/// records; its header alone is a complete record.
pub fn parse_sim_status(reader: &mut ParcelReader<'_>) -> Result<SimCardStatus, ParcelError> {
    let mut status = SimCardStatus {
        card_state: CardState::from(reader.read_i32() as u8),
        pin_state: reader.read_i32(),
        gsm_umts_index: reader.read_i32(),
        cdma_index: reader.read_i32(),
        ims_index: reader.read_i32(),
        ..Default::default()
    };
    let num_apps = reader.read_i32();

    if reader.malformed() {
        return Err(ParcelError::Malformed);
    }

    if status.card_state != CardState::Present {
        return Ok(status);
    }

    if num_apps < 0 {
        return Err(ParcelError::Malformed);
    }
    let mut num_apps = num_apps as usize;
    if num_apps > MAX_UICC_APPS {
        error!("too many applications on the card: {}", num_apps);
        num_apps = MAX_UICC_APPS;
    }

    for _ in 0..num_apps {
        let app = AppRecord {
            app_type: AppType::from(reader.read_i32() as u8),
            app_state: reader.read_i32(),
            perso_substate: reader.read_i32(),
            aid: reader.read_string::<MAX_AID_LEN>(),
            label: reader.read_string::<MAX_AID_LEN>(),
            pin_replaced: reader.read_i32(),
            pin1_state: reader.read_i32(),
            pin2_state: reader.read_i32(),
        };

        if reader.malformed() {
            return Err(ParcelError::Malformed);
        }

        // capacity matches the cap above
        status.apps.push(app).ok();
    }

    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ril::parcel::Parcel;

    #[test]
    fn present_card_with_one_usim_app() {
        let mut p: Parcel<512> = Parcel::new();
        p.write_i32(1); // present
        p.write_i32(0); // universal pin state
        p.write_i32(0); // gsm/umts index
        p.write_i32(-1); // cdma index
        p.write_i32(-1); // ims index
        p.write_i32(1); // num apps
        p.write_i32(2); // usim
        p.write_i32(APPSTATE_READY);
        p.write_i32(0); // perso substate
        p.write_string(Some("a0000000871002"));
        p.write_string(None);
        p.write_i32(0);
        p.write_i32(2); // pin1 enabled+verified
        p.write_i32(1);

        let mut r = ParcelReader::new(p.as_bytes());
        let status = parse_sim_status(&mut r).unwrap();

        assert_eq!(status.card_state, CardState::Present);
        assert_eq!(status.apps.len(), 1);
        let app = status.gsm_umts_app().unwrap();
        assert_eq!(app.app_type, AppType::Usim);
        assert_eq!(app.passwd_state(), PasswdState::None);
        assert_eq!(app.aid.as_deref(), Some("a0000000871002"));
        assert_eq!(app.label, None);
    }

    #[test]
    fn pin_locked_app_reports_sim_pin() {
        let mut app = AppRecord::default();
        app.app_state = APPSTATE_PIN;
        assert_eq!(app.passwd_state(), PasswdState::SimPin);
        app.app_state = APPSTATE_PUK;
        assert_eq!(app.passwd_state(), PasswdState::SimPuk);
        app.app_state = APPSTATE_DETECTED;
        assert_eq!(app.passwd_state(), PasswdState::Invalid);
    }

    #[test]
    fn absent_card_has_no_apps() {
        let mut p: Parcel<64> = Parcel::new();
        p.write_i32(0); // absent
        p.write_i32(0);
        p.write_i32(-1);
        p.write_i32(-1);
        p.write_i32(-1);
        p.write_i32(0);

        let mut r = ParcelReader::new(p.as_bytes());
        let status = parse_sim_status(&mut r).unwrap();
        assert_eq!(status.card_state, CardState::Absent);
        assert!(status.apps.is_empty());
        assert_eq!(status.gsm_umts_app(), None);
    }

    #[test]
    fn short_header_is_malformed() {
        let mut p: Parcel<16> = Parcel::new();
        p.write_i32(1);
        p.write_i32(0);

        let mut r = ParcelReader::new(p.as_bytes());
        assert_eq!(parse_sim_status(&mut r), Err(ParcelError::Malformed));
    }

    #[test]
    fn out_of_range_index_yields_no_app() {
        let mut p: Parcel<64> = Parcel::new();
        p.write_i32(1); // present
        p.write_i32(0);
        p.write_i32(3); // points past the single app
        p.write_i32(-1);
        p.write_i32(-1);
        p.write_i32(0); // no apps at all

        let mut r = ParcelReader::new(p.as_bytes());
        let status = parse_sim_status(&mut r).unwrap();
        assert_eq!(status.gsm_umts_app(), None);
    }
}
