//! String-level helpers for registration replies: the radio-technology
//! field and the operator numeric that arrive as decimal strings.

use heapless::String;

/// Radio technology values the modem reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(i32)]
pub enum RadioTech {
    Unknown = 0,
    Gprs = 1,
    Edge = 2,
    Umts = 3,
    Hsdpa = 9,
    Hsupa = 10,
    Hspa = 11,
    Lte = 14,
    Hspap = 15,
    Gsm = 16,
}

/// 3GPP 27.007 access technology (the `<AcT>` values).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(i32)]
pub enum AccessTechnology {
    Gsm = 0,
    GsmCompact = 1,
    Utran = 2,
    GsmEgprs = 3,
    UtranHsdpa = 4,
    UtranHsupa = 5,
    UtranHsdpaHsupa = 6,
    Eutran = 7,
}

impl TryFrom<i32> for RadioTech {
    type Error = ();

    fn try_from(v: i32) -> Result<Self, ()> {
        match v {
            0 => Ok(Self::Unknown),
            1 => Ok(Self::Gprs),
            2 => Ok(Self::Edge),
            3 => Ok(Self::Umts),
            9 => Ok(Self::Hsdpa),
            10 => Ok(Self::Hsupa),
            11 => Ok(Self::Hspa),
            14 => Ok(Self::Lte),
            15 => Ok(Self::Hspap),
            16 => Ok(Self::Gsm),
            _ => Err(()),
        }
    }
}

/// Access technology a radio technology registers as. HSPA+ folds into
/// HSDPA+HSUPA; there is no finer-grained value to map it to.
pub fn access_tech(tech: RadioTech) -> Option<AccessTechnology> {
    match tech {
        RadioTech::Unknown => None,
        RadioTech::Gsm | RadioTech::Gprs => Some(AccessTechnology::Gsm),
        RadioTech::Edge => Some(AccessTechnology::GsmEgprs),
        RadioTech::Umts => Some(AccessTechnology::Utran),
        RadioTech::Hsdpa => Some(AccessTechnology::UtranHsdpa),
        RadioTech::Hsupa => Some(AccessTechnology::UtranHsupa),
        RadioTech::Hspa | RadioTech::Hspap => Some(AccessTechnology::UtranHsdpaHsupa),
        RadioTech::Lte => Some(AccessTechnology::Eutran),
    }
}

/// Parse the decimal radio-technology string of a registration reply.
/// `None` input, junk, and technologies with no access-technology mapping
/// all come back as `None`.
pub fn parse_tech(s: Option<&str>) -> Option<(AccessTechnology, RadioTech)> {
    let tech: RadioTech = s?.parse::<i32>().ok()?.try_into().ok()?;
    Some((access_tech(tech)?, tech))
}

/// Operator identity from the registration reply's numeric field.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperatorNumeric {
    pub mcc: String<3>,
    pub mnc: String<3>,
    pub tech: Option<AccessTechnology>,
}

/// Parse an operator numeric: three MCC digits, one to three MNC digits,
/// optionally followed by `+` and a radio-technology number. Trailing
/// digits past a three-digit MNC are tolerated and ignored.
pub fn parse_mcc_mnc(s: &str) -> Option<OperatorNumeric> {
    let mut op = OperatorNumeric::default();
    let mut chars = s.char_indices().peekable();

    for _ in 0..3 {
        let (_, c) = chars.next()?;
        if !c.is_ascii_digit() {
            return None;
        }
        op.mcc.push(c).ok()?;
    }

    while let Some(&(_, c)) = chars.peek() {
        if !c.is_ascii_digit() || op.mnc.len() == 3 {
            break;
        }
        op.mnc.push(c).ok()?;
        chars.next();
    }
    if op.mnc.is_empty() {
        return None;
    }

    // an optional technology suffix after '+'
    if let Some(plus) = s.find('+') {
        op.tech = parse_tech(Some(&s[plus + 1..])).map(|(access, _)| access);
    }

    Some(op)
}
