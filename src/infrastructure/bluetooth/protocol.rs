//! Daydream Controller Protocol
//!
//! Identifiers of the controller's GATT service and the decoder for the
//! 20-byte report it pushes on the data characteristic.

use crate::domain::models::ControllerState;
use thiserror::Error;

/// Controller BLE Service UUID (16-bit 0xFE55 in the Bluetooth base UUID)
pub const SERVICE_UUID: &str = "0000fe55-0000-1000-8000-00805f9b34fb";

/// Data Notify Characteristic UUID - where reports are received
pub const DATA_CHAR_UUID: &str = "00000001-1000-1000-8000-00805f9b34fb";

/// Client Characteristic Configuration descriptor used to enable notifications
pub const CLIENT_CONFIG_UUID: &str = "00002902-0000-1000-8000-00805f9b34fb";

/// Length of one controller report
pub const FRAME_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid frame length: {actual} (expected 20)")]
    BadLength { actual: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid UUID format: {0}")]
pub struct UuidError(String);

/// A field of the report, addressed as an MSB-first bit range over the
/// whole frame. Bit 0 is the most significant bit of byte 0.
#[derive(Debug, Clone, Copy)]
pub struct BitField {
    pub start: usize,
    pub width: u32,
}

impl BitField {
    const fn new(start: usize, width: u32) -> Self {
        Self { start, width }
    }

    /// Byte holding the first bit of the field
    pub const fn first_byte(&self) -> usize {
        self.start / 8
    }

    /// Bit position (7 = MSB) of the first bit within its byte
    pub const fn first_bit(&self) -> u32 {
        7 - (self.start % 8) as u32
    }
}

/// Report layout
///
/// ```text
/// sync_time : byte0[7:0]  byte1[7]                   9 bits
/// sync_seq  : byte1[6:2]                             5 bits
/// ori_x     : byte1[1:0]  byte2[7:0]  byte3[7:5]    13 bits signed
/// ori_y     : byte3[4:0]  byte4[7:0]                13 bits signed
/// ori_z     : byte5[7:0]  byte6[7:3]                13 bits signed
/// acc_x     : byte6[2:0]  byte7[7:0]  byte8[7:6]    13 bits signed
/// acc_y     : byte8[5:0]  byte9[7:1]                13 bits signed
/// acc_z     : byte9[0]    byte10[7:0] byte11[7:4]   13 bits signed
/// gyr_x     : byte11[3:0] byte12[7:0] byte13[7]     13 bits signed
/// gyr_y     : byte13[6:0] byte14[7:2]               13 bits signed
/// gyr_z     : byte14[1:0] byte15[7:0] byte16[7:5]   13 bits signed
/// touch_x   : byte16[4:0] byte17[7:5]                8 bits
/// touch_y   : byte17[4:0] byte18[7:5]                8 bits
/// vol_up    : byte18[4]
/// vol_down  : byte18[3]
/// app       : byte18[2]
/// home      : byte18[1]
/// click     : byte18[0]
/// ```
pub mod layout {
    use super::BitField;

    pub const SYNC_TIME: BitField = BitField::new(0, 9);
    pub const SYNC_SEQ: BitField = BitField::new(9, 5);
    pub const ORI_X: BitField = BitField::new(14, 13);
    pub const ORI_Y: BitField = BitField::new(27, 13);
    pub const ORI_Z: BitField = BitField::new(40, 13);
    pub const ACC_X: BitField = BitField::new(53, 13);
    pub const ACC_Y: BitField = BitField::new(66, 13);
    pub const ACC_Z: BitField = BitField::new(79, 13);
    pub const GYR_X: BitField = BitField::new(92, 13);
    pub const GYR_Y: BitField = BitField::new(105, 13);
    pub const GYR_Z: BitField = BitField::new(118, 13);
    pub const TOUCH_X: BitField = BitField::new(131, 8);
    pub const TOUCH_Y: BitField = BitField::new(139, 8);
    pub const VOL_UP: BitField = BitField::new(147, 1);
    pub const VOL_DOWN: BitField = BitField::new(148, 1);
    pub const APP: BitField = BitField::new(149, 1);
    pub const HOME: BitField = BitField::new(150, 1);
    pub const CLICK: BitField = BitField::new(151, 1);

    /// Every two's-complement field, in report order
    pub const SIGNED: [BitField; 9] = [
        ORI_X, ORI_Y, ORI_Z, ACC_X, ACC_Y, ACC_Z, GYR_X, GYR_Y, GYR_Z,
    ];
}

/// Read `field` from `frame` as an unsigned value.
///
/// Bits are gathered one at a time so the result does not depend on host
/// byte order. The caller guarantees the range lies inside the frame.
fn read_bits(frame: &[u8], field: BitField) -> u32 {
    let mut byte = field.first_byte();
    let mut bit = field.first_bit();
    let mut value = 0u32;

    for _ in 0..field.width {
        value = (value << 1) | u32::from((frame[byte] >> bit) & 1);
        if bit == 0 {
            byte += 1;
            bit = 7;
        } else {
            bit -= 1;
        }
    }
    value
}

/// Interpret the low `width` bits of `raw` as two's complement.
/// `width` must be in `1..=32`.
pub fn sign_extend(raw: u32, width: u32) -> i32 {
    debug_assert!((1..=32).contains(&width), "bad field width {}", width);
    let shift = 32 - width;
    ((raw << shift) as i32) >> shift
}

fn read_signed(frame: &[u8], field: BitField) -> i32 {
    sign_extend(read_bits(frame, field), field.width)
}

fn read_flag(frame: &[u8], field: BitField) -> bool {
    read_bits(frame, field) != 0
}

/// Decode one 20-byte report.
///
/// Pure: no I/O and no state between calls. `swipe_x`/`swipe_y` are left at
/// zero, they are filled by the gesture tracker.
pub fn decode(frame: &[u8]) -> Result<ControllerState, DecodeError> {
    if frame.len() != FRAME_LEN {
        return Err(DecodeError::BadLength {
            actual: frame.len(),
        });
    }

    Ok(ControllerState {
        sync_time: read_bits(frame, layout::SYNC_TIME) as u16,
        sync_seq: read_bits(frame, layout::SYNC_SEQ) as u8,

        click: read_flag(frame, layout::CLICK),
        home: read_flag(frame, layout::HOME),
        app: read_flag(frame, layout::APP),
        vol_up: read_flag(frame, layout::VOL_UP),
        vol_down: read_flag(frame, layout::VOL_DOWN),

        touch_x: read_bits(frame, layout::TOUCH_X) as u8,
        touch_y: read_bits(frame, layout::TOUCH_Y) as u8,

        acc_x: read_signed(frame, layout::ACC_X),
        acc_y: read_signed(frame, layout::ACC_Y),
        acc_z: read_signed(frame, layout::ACC_Z),

        gyr_x: read_signed(frame, layout::GYR_X),
        gyr_y: read_signed(frame, layout::GYR_Y),
        gyr_z: read_signed(frame, layout::GYR_Z),

        ori_x: read_signed(frame, layout::ORI_X),
        ori_y: read_signed(frame, layout::ORI_Y),
        ori_z: read_signed(frame, layout::ORI_Z),

        swipe_x: 0,
        swipe_y: 0,
    })
}

impl TryFrom<&[u8]> for ControllerState {
    type Error = DecodeError;

    fn try_from(frame: &[u8]) -> Result<Self, Self::Error> {
        decode(frame)
    }
}

/// Parse a UUID string into its 128-bit value
pub fn parse_uuid(uuid_str: &str) -> Result<u128, UuidError> {
    let digits = uuid_str.replace('-', "");

    if digits.len() != 32 {
        return Err(UuidError(uuid_str.to_string()));
    }

    u128::from_str_radix(&digits, 16).map_err(|_| UuidError(uuid_str.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Field values, in report order: 0x1A5, 0x13, -1234, 2047, -4096, 4095,
    /// -1, 812, -77, 3000, -2500, touch (200, 37), vol_up + app + click
    const KNOWN_FRAME: [u8; FRAME_LEN] = [
        0xD2, 0xCF, 0x65, 0xC7, 0xFF, 0x80, 0x03, 0xFF, 0xFF, 0xFE, 0x32, 0xCF, 0xD9, 0xAE, 0xE2,
        0xC7, 0x99, 0x04, 0xB5, 0x00,
    ];

    fn write_bits(frame: &mut [u8], field: BitField, value: u32) {
        for i in 0..field.width as usize {
            let pos = field.start + i;
            let bit = (value >> (field.width as usize - 1 - i)) & 1;
            let mask = 1u8 << (7 - pos % 8);
            if bit == 1 {
                frame[pos / 8] |= mask;
            } else {
                frame[pos / 8] &= !mask;
            }
        }
    }

    #[test]
    fn test_known_frame() {
        let state = decode(&KNOWN_FRAME).unwrap();

        assert_eq!(state.sync_time, 421);
        assert_eq!(state.sync_seq, 19);

        assert_eq!(state.ori_x, -1234);
        assert_eq!(state.ori_y, 2047);
        assert_eq!(state.ori_z, -4096);

        assert_eq!(state.acc_x, 4095);
        assert_eq!(state.acc_y, -1);
        assert_eq!(state.acc_z, 812);

        assert_eq!(state.gyr_x, -77);
        assert_eq!(state.gyr_y, 3000);
        assert_eq!(state.gyr_z, -2500);

        assert_eq!(state.touch_x, 200);
        assert_eq!(state.touch_y, 37);

        assert!(state.click);
        assert!(!state.home);
        assert!(state.app);
        assert!(!state.vol_down);
        assert!(state.vol_up);

        assert_eq!((state.swipe_x, state.swipe_y), (0, 0));
    }

    #[test]
    fn test_touch_vector() {
        let mut frame = [0u8; FRAME_LEN];
        frame[17] = 0b0010_0000;
        frame[18] = 0b0100_0000;

        let state = decode(&frame).unwrap();
        assert_eq!(state.touch_x, 1);
        assert_eq!(state.touch_y, 2);
        assert!(!state.any_button());
    }

    #[test]
    fn test_bad_length() {
        for len in (0..=64).filter(|len| *len != FRAME_LEN) {
            let frame = vec![0xFFu8; len];
            assert_eq!(decode(&frame), Err(DecodeError::BadLength { actual: len }));
        }
        assert!(decode(&[0u8; FRAME_LEN]).is_ok());
    }

    #[test]
    fn test_any_twenty_bytes_decode() {
        // A walking byte pattern over every position
        for seed in 0..=255u8 {
            let frame: Vec<u8> = (0..FRAME_LEN as u8)
                .map(|i| seed.wrapping_mul(31).wrapping_add(i.wrapping_mul(97)))
                .collect();
            assert!(decode(&frame).is_ok());
            assert_eq!(decode(&frame), decode(&frame));
        }
    }

    #[test]
    fn test_sign_extension_round_trip() {
        for field in layout::SIGNED {
            for pattern in 0..(1u32 << 13) {
                let mut frame = [0u8; FRAME_LEN];
                write_bits(&mut frame, field, pattern);
                let state = decode(&frame).unwrap();

                let values = [
                    state.ori_x,
                    state.ori_y,
                    state.ori_z,
                    state.acc_x,
                    state.acc_y,
                    state.acc_z,
                    state.gyr_x,
                    state.gyr_y,
                    state.gyr_z,
                ];
                let decoded = values
                    .iter()
                    .zip(layout::SIGNED.iter())
                    .find(|(_, f)| f.start == field.start)
                    .map(|(v, _)| *v)
                    .unwrap();

                let expected = if pattern < 4096 {
                    pattern as i32
                } else {
                    pattern as i32 - 8192
                };
                assert_eq!(decoded, expected);
                assert_eq!((decoded as u32) & 0x1FFF, pattern);

                // No bleed into the other signed fields
                assert_eq!(values.iter().filter(|v| **v != 0).count(), usize::from(pattern != 0));
            }
        }
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "bad field width")]
    fn test_sign_extend_rejects_zero_width() {
        sign_extend(1, 0);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "bad field width")]
    fn test_sign_extend_rejects_wide_field() {
        sign_extend(1, 33);
    }

    #[test]
    fn test_sign_extend_edges() {
        assert_eq!(sign_extend(0x0FFF, 13), 4095);
        assert_eq!(sign_extend(0x1000, 13), -4096);
        assert_eq!(sign_extend(0x1FFF, 13), -1);
        assert_eq!(sign_extend(0, 13), 0);
        // Bits above the field width are discarded
        assert_eq!(sign_extend(0xFFFF_E001, 13), 1);
    }

    #[test]
    fn test_button_independence() {
        let cases: [(u8, [bool; 5]); 5] = [
            // click, home, app, vol_down, vol_up
            (0b0000_0001, [true, false, false, false, false]),
            (0b0000_0010, [false, true, false, false, false]),
            (0b0000_0100, [false, false, true, false, false]),
            (0b0000_1000, [false, false, false, true, false]),
            (0b0001_0000, [false, false, false, false, true]),
        ];

        for (byte, expected) in cases {
            let mut frame = [0u8; FRAME_LEN];
            frame[18] = byte;
            let s = decode(&frame).unwrap();
            assert_eq!([s.click, s.home, s.app, s.vol_down, s.vol_up], expected);
            assert_eq!((s.touch_x, s.touch_y), (0, 0));
        }
    }

    #[test]
    fn test_sync_counters() {
        let mut frame = [0u8; FRAME_LEN];
        write_bits(&mut frame, layout::SYNC_TIME, 0x1FF);
        write_bits(&mut frame, layout::SYNC_SEQ, 0x1F);
        assert_eq!(frame[0], 0xFF);
        assert_eq!(frame[1], 0xFC);

        let state = decode(&frame).unwrap();
        assert_eq!(state.sync_time, 511);
        assert_eq!(state.sync_seq, 31);
        assert_eq!(state.ori_x, 0);
    }

    #[test]
    fn test_field_byte_positions() {
        assert_eq!(layout::GYR_Z.first_byte(), 14);
        assert_eq!(layout::GYR_Z.first_bit(), 1);
        assert_eq!(layout::TOUCH_X.first_byte(), 16);
        assert_eq!(layout::TOUCH_X.first_bit(), 4);
        assert_eq!(layout::CLICK.first_byte(), 18);
        assert_eq!(layout::CLICK.first_bit(), 0);
    }

    #[test]
    fn test_try_from() {
        let state = ControllerState::try_from(&KNOWN_FRAME[..]).unwrap();
        assert_eq!(state.gyr_y, 3000);
        assert!(ControllerState::try_from(&KNOWN_FRAME[..19]).is_err());
    }

    #[test]
    fn test_parse_uuid() {
        assert_eq!(
            parse_uuid(SERVICE_UUID).unwrap(),
            0x0000fe55_0000_1000_8000_00805f9b34fb
        );
        assert!(parse_uuid("1234").is_err());
        assert!(parse_uuid("zzzzzzzz-0000-1000-8000-00805f9b34fb").is_err());
    }
}
