//! The TLV wire format: a message is a sequence of fields, each framed as a
//! one-byte type tag, a little-endian u16 length, and that many payload
//! bytes. Requests are built with [`QmiParam`], responses consumed through
//! [`QmiResult`].

pub mod uim;
pub mod ussd;
pub mod voice;

use heapless::Vec;

/// Default backing capacity for outgoing parameter blocks.
pub const PARAM_CAPACITY: usize = 256;

/// The result field every response carries.
pub const TLV_RESULT: u8 = 0x02;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum QmiError {
    /// TLV framing ran past the end of the buffer.
    Malformed,
    /// A mandatory field is missing.
    MissingTlv(u8),
    /// A field's length does not match its declared contents.
    InvalidLength(u8),
    /// The service reported a failure in its result field.
    Service { error: u16 },
    /// A parameter block ran out of backing space.
    Overflow,
}

/// Read-only view of a decoded message's TLV region.
#[derive(Debug, Clone, Copy)]
pub struct QmiResult<'a> {
    tlvs: &'a [u8],
}

impl<'a> QmiResult<'a> {
    pub fn new(tlvs: &'a [u8]) -> Self {
        Self { tlvs }
    }

    /// Split a raw message into its two-byte id and the TLV region.
    pub fn from_message(bytes: &'a [u8]) -> Result<(u16, Self), QmiError> {
        if bytes.len() < 2 {
            return Err(QmiError::Malformed);
        }
        let id = u16::from_le_bytes([bytes[0], bytes[1]]);
        Ok((id, Self::new(&bytes[2..])))
    }

    /// First field with the given type tag. Truncated framing terminates
    /// the search.
    pub fn get(&self, tag: u8) -> Option<&'a [u8]> {
        let mut rest = self.tlvs;
        while rest.len() >= 3 {
            let ty = rest[0];
            let len = u16::from_le_bytes([rest[1], rest[2]]) as usize;
            let payload = rest.get(3..3 + len)?;
            if ty == tag {
                return Some(payload);
            }
            rest = &rest[3 + len..];
        }
        None
    }

    pub fn get_u8(&self, tag: u8) -> Option<u8> {
        match self.get(tag)? {
            [v, ..] => Some(*v),
            _ => None,
        }
    }

    pub fn get_u16(&self, tag: u8) -> Option<u16> {
        let p = self.get(tag)?;
        Some(u16::from_le_bytes([*p.first()?, *p.get(1)?]))
    }

    pub fn get_u32(&self, tag: u8) -> Option<u32> {
        let p = self.get(tag)?;
        if p.len() < 4 {
            return None;
        }
        Some(u32::from_le_bytes([p[0], p[1], p[2], p[3]]))
    }

    /// Inspect the result field. A missing field reads as success; a result
    /// word other than zero carries the service's error code.
    pub fn error(&self) -> Result<(), QmiError> {
        let Some(p) = self.get(TLV_RESULT) else {
            return Ok(());
        };
        if p.len() < 4 {
            return Err(QmiError::InvalidLength(TLV_RESULT));
        }
        let result = u16::from_le_bytes([p[0], p[1]]);
        let error = u16::from_le_bytes([p[2], p[3]]);
        if result == 0 {
            Ok(())
        } else {
            Err(QmiError::Service { error })
        }
    }
}

/// Outgoing parameter block.
#[derive(Debug, Default)]
pub struct QmiParam<const N: usize = { PARAM_CAPACITY }> {
    buf: Vec<u8, N>,
}

impl<const N: usize> QmiParam<N> {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn append(&mut self, tag: u8, payload: &[u8]) -> Result<(), QmiError> {
        if payload.len() > u16::MAX as usize {
            return Err(QmiError::Overflow);
        }
        let len = (payload.len() as u16).to_le_bytes();
        self.buf.push(tag).map_err(|_| QmiError::Overflow)?;
        self.buf
            .extend_from_slice(&len)
            .map_err(|_| QmiError::Overflow)?;
        self.buf
            .extend_from_slice(payload)
            .map_err(|_| QmiError::Overflow)
    }

    pub fn append_u8(&mut self, tag: u8, value: u8) -> Result<(), QmiError> {
        self.append(tag, &[value])
    }

    pub fn append_u16(&mut self, tag: u8, value: u16) -> Result<(), QmiError> {
        self.append(tag, &value.to_le_bytes())
    }

    pub fn append_u32(&mut self, tag: u8, value: u32) -> Result<(), QmiError> {
        self.append(tag, &value.to_le_bytes())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_finds_the_first_matching_field() {
        // 0x01 len 2 [aa bb], 0x10 len 1 [cc], 0x10 len 1 [dd]
        let raw = [
            0x01, 0x02, 0x00, 0xaa, 0xbb, 0x10, 0x01, 0x00, 0xcc, 0x10, 0x01, 0x00, 0xdd,
        ];
        let result = QmiResult::new(&raw);

        assert_eq!(result.get(0x01), Some(&[0xaa, 0xbb][..]));
        assert_eq!(result.get(0x10), Some(&[0xcc][..]));
        assert_eq!(result.get(0x42), None);
    }

    #[test]
    fn truncated_framing_stops_the_search() {
        // second field claims 4 bytes but only 1 follows
        let raw = [0x01, 0x01, 0x00, 0xaa, 0x02, 0x04, 0x00, 0xbb];
        let result = QmiResult::new(&raw);

        assert_eq!(result.get(0x01), Some(&[0xaa][..]));
        assert_eq!(result.get(0x02), None);
    }

    #[test]
    fn scalar_accessors_are_little_endian() {
        let raw = [
            0x10, 0x01, 0x00, 0x7f, 0x11, 0x02, 0x00, 0x34, 0x12, 0x12, 0x04, 0x00, 0x78, 0x56,
            0x34, 0x12,
        ];
        let result = QmiResult::new(&raw);

        assert_eq!(result.get_u8(0x10), Some(0x7f));
        assert_eq!(result.get_u16(0x11), Some(0x1234));
        assert_eq!(result.get_u32(0x12), Some(0x1234_5678));
        assert_eq!(result.get_u32(0x11), None);
    }

    #[test]
    fn result_field_maps_to_service_errors() {
        let ok = [0x02, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00];
        assert_eq!(QmiResult::new(&ok).error(), Ok(()));

        // failure, error code 0x0010
        let failed = [0x02, 0x04, 0x00, 0x01, 0x00, 0x10, 0x00];
        assert_eq!(
            QmiResult::new(&failed).error(),
            Err(QmiError::Service { error: 0x10 })
        );

        // no result field reads as success
        assert_eq!(QmiResult::new(&[]).error(), Ok(()));
    }

    #[test]
    fn message_header_split() {
        let raw = [0x2e, 0x00, 0x10, 0x01, 0x00, 0x05];
        let (id, result) = QmiResult::from_message(&raw).unwrap();
        assert_eq!(id, 0x2e);
        assert_eq!(result.get_u8(0x10), Some(5));

        assert!(matches!(
            QmiResult::from_message(&[0x01]),
            Err(QmiError::Malformed)
        ));
    }

    #[test]
    fn param_framing() {
        let mut param: QmiParam<64> = QmiParam::new();
        param.append(0x01, b"123").unwrap();
        param.append_u8(0x10, 0x09).unwrap();
        param.append_u16(0x11, 0x2211).unwrap();

        assert_eq!(
            param.as_bytes(),
            [
                0x01, 0x03, 0x00, b'1', b'2', b'3', 0x10, 0x01, 0x00, 0x09, 0x11, 0x02, 0x00,
                0x11, 0x22,
            ]
        );
    }

    #[test]
    fn param_overflow() {
        let mut param: QmiParam<4> = QmiParam::new();
        assert_eq!(param.append(0x01, &[0, 0]), Err(QmiError::Overflow));
    }
}
