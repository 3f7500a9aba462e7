//! Fixed-offset field access and sentinel handling shared by the decoders.
//!
//! Consoles mark "no reading" with out-of-range values rather than a flag;
//! every helper here maps those sentinels to `None` so nothing downstream
//! mistakes a dead sensor for a zero reading.

use bytes::Buf;

#[derive(Clone, Copy)]
pub(crate) struct Fields<'a> {
    bytes: &'a [u8],
}

impl<'a> Fields<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub(crate) fn u8(&self, offset: usize) -> u8 {
        self.bytes[offset]
    }

    pub(crate) fn i8(&self, offset: usize) -> i8 {
        self.bytes[offset] as i8
    }

    pub(crate) fn u16_le(&self, offset: usize) -> u16 {
        (&self.bytes[offset..offset + 2]).get_u16_le()
    }

    pub(crate) fn i16_le(&self, offset: usize) -> i16 {
        (&self.bytes[offset..offset + 2]).get_i16_le()
    }

    /// Temperature in tenths of a degree.
    pub(crate) fn temp_tenths(&self, offset: usize) -> Option<f64> {
        temp_tenths(self.i16_le(offset))
    }

    /// Temperature in whole degrees, 16-bit.
    pub(crate) fn temp_whole(&self, offset: usize) -> Option<f64> {
        let raw = self.i16_le(offset);
        if raw == i16::MAX || raw == i16::MIN || raw == 255 || raw <= -99 {
            return None;
        }
        Some(f64::from(raw))
    }

    /// 8-bit temperature stored with a +90 °F offset.
    pub(crate) fn temp_offset90(&self, offset: usize) -> Option<f64> {
        match self.u8(offset) {
            u8::MAX => None,
            raw => Some(f64::from(raw) - 90.0),
        }
    }

    pub(crate) fn humidity(&self, offset: usize) -> Option<u8> {
        match self.u8(offset) {
            raw if raw > 100 => None,
            raw => Some(raw),
        }
    }

    /// Any 8-bit reading whose only sentinel is 255.
    pub(crate) fn byte(&self, offset: usize) -> Option<u8> {
        match self.u8(offset) {
            u8::MAX => None,
            raw => Some(raw),
        }
    }

    pub(crate) fn wind_mph(&self, offset: usize) -> Option<f64> {
        wind_mph(f64::from(self.u8(offset)))
    }

    pub(crate) fn wind_tenths_mph(&self, offset: usize) -> Option<f64> {
        match self.u16_le(offset) {
            u16::MAX | 0x7FFF => None,
            raw => wind_mph(f64::from(raw) / 10.0),
        }
    }

    pub(crate) fn wind_mph_u16(&self, offset: usize) -> Option<f64> {
        match self.u16_le(offset) {
            u16::MAX | 0x7FFF => None,
            raw => wind_mph(f64::from(raw)),
        }
    }

    /// Compass point 0-15, returned as degrees.
    pub(crate) fn compass(&self, offset: usize) -> Option<f64> {
        match self.u8(offset) {
            raw if raw > 15 => None,
            raw => Some(f64::from(raw) * 22.5),
        }
    }

    /// Direction in whole degrees; 0 means no reading in live frames.
    pub(crate) fn degrees(&self, offset: usize, zero_is_missing: bool) -> Option<u16> {
        match self.u16_le(offset) {
            0 if zero_is_missing => None,
            raw if raw > 360 => None,
            raw => Some(raw),
        }
    }

    pub(crate) fn barometer(&self, offset: usize) -> Option<f64> {
        match self.u16_le(offset) {
            0 | 0x7FFF | u16::MAX => None,
            raw => Some(f64::from(raw) / 1000.0),
        }
    }

    pub(crate) fn solar(&self, offset: usize) -> Option<u16> {
        match self.u16_le(offset) {
            raw if raw >= 32_000 => None,
            raw => Some(raw),
        }
    }

    pub(crate) fn uv(&self, offset: usize) -> Option<f64> {
        self.byte(offset).map(|raw| f64::from(raw) / 10.0)
    }

    pub(crate) fn clicks(&self, offset: usize) -> Option<u16> {
        match self.u16_le(offset) {
            u16::MAX => None,
            raw => Some(raw),
        }
    }
}

pub(crate) fn temp_tenths(raw: i16) -> Option<f64> {
    if raw == i16::MAX || raw == i16::MIN || raw <= -990 {
        return None;
    }
    Some(f64::from(raw) / 10.0)
}

fn wind_mph(value: f64) -> Option<f64> {
    if value >= 200.0 {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn little_endian_access() {
        let bytes = [0x34, 0x12, 0xFE, 0xFF];
        let fields = Fields::new(&bytes);
        assert_eq!(fields.u16_le(0), 0x1234);
        assert_eq!(fields.i16_le(2), -2);
    }

    #[test]
    fn temperature_sentinels_are_missing() {
        assert_eq!(temp_tenths(0x7FFF), None);
        assert_eq!(temp_tenths(i16::MIN), None);
        assert_eq!(temp_tenths(-990), None);
        assert_eq!(temp_tenths(-985), Some(-98.5));
        assert_eq!(temp_tenths(725), Some(72.5));
    }

    #[test]
    fn eight_bit_sentinels_are_missing() {
        let bytes = [255, 101, 100, 200, 199, 16, 15];
        let fields = Fields::new(&bytes);
        assert_eq!(fields.byte(0), None);
        assert_eq!(fields.humidity(1), None);
        assert_eq!(fields.humidity(2), Some(100));
        assert_eq!(fields.wind_mph(3), None);
        assert_eq!(fields.wind_mph(4), Some(199.0));
        assert_eq!(fields.compass(5), None);
        assert_eq!(fields.compass(6), Some(337.5));
    }

    #[test]
    fn wide_sentinels_are_missing() {
        let bytes = [0x00, 0x7D, 0x00, 0x00, 0x10, 0x75];
        let fields = Fields::new(&bytes);
        assert_eq!(fields.solar(0), None); // 32000
        assert_eq!(fields.barometer(2), None);
        assert_eq!(fields.barometer(4), Some(29.968));
    }
}
