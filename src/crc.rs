//! Dallas/Maxim 8-bit CRC (polynomial x^8 + x^5 + x^4 + 1, LSB first)

const POLYNOMIAL: u8 = 0x8C;

/// Continue a checksum over `data` starting from `crc`
pub fn crc8_update(crc: u8, data: &[u8]) -> u8 {
    let mut crc = crc;
    for byte in data.iter() {
        let mut byte = *byte;
        for _ in 0..8 {
            let mix = (crc ^ byte) & 0x01;
            crc >>= 1;
            if mix != 0x00 {
                crc ^= POLYNOMIAL;
            }
            byte >>= 1;
        }
    }
    crc
}

/// Checksum of `data` from a zero seed
pub fn crc8(data: &[u8]) -> u8 {
    crc8_update(0, data)
}

/// True if `data` ends with its own checksum, i.e. the residual over the whole
/// slice is zero.
pub fn check_crc8(data: &[u8]) -> bool {
    crc8(data) == 0
}
