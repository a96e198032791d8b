//! Code for the CRC and data type signature, used in multi-frame transfers.

use crunchy::unroll;

const CRC_POLY: u16 = 0x1021;

const SIGNATURE_POLY: u64 = 0x42F0_E1EB_A9EA_3693;
const SIGNATURE_MASK64: u64 = 0xFFFF_FFFF_FFFF_FFFF;

/// Code for computing CRC for multi-frame transfers (CRC-16-CCITT-FALSE):
/// Adapted from https://dronecan.github.io/Specification/4._CAN_bus_transport_layer/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferCrc {
    pub value: u16,
}

impl Default for TransferCrc {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferCrc {
    pub fn new() -> Self {
        Self { value: 0xffff }
    }

    /// Seed the CRC with a data type signature, little-endian. The result is the
    /// `base_crc` that `pydronecan` reports for each data type.
    pub fn new_with_signature(signature: u64) -> Self {
        let mut crc = Self::new();
        crc.add_bytes(&signature.to_le_bytes());
        crc
    }

    /// CRC of a multi-frame payload, as carried in the first two bytes of its first frame.
    pub fn compute(signature: u64, payload: &[u8]) -> u16 {
        let mut crc = Self::new_with_signature(signature);
        crc.add_bytes(payload);
        crc.value
    }

    pub fn add_byte(&mut self, byte: u8) {
        self.value ^= (byte as u16) << 8;

        unroll! {
            for _bit in 0..8 {
                if (self.value & 0x8000) != 0 {
                    self.value = (self.value << 1) ^ CRC_POLY;
                } else {
                    self.value <<= 1;
                }
            }
        }
    }

    pub fn add_bytes(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.add_byte(*byte)
        }
    }
}

/// Code for computing the data type signature (CRC-64-WE):
/// Adapted from https://dronecan.github.io/Specification/3._Data_structure_description_language/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    crc: u64,
}

impl Signature {
    /// `extend_from` continues a previously finished signature, which is how nested type
    /// signatures get folded into their parent's.
    pub fn new(extend_from: Option<u64>) -> Self {
        let crc = match extend_from {
            Some(e) => (e & SIGNATURE_MASK64) ^ SIGNATURE_MASK64,
            None => SIGNATURE_MASK64,
        };

        Self { crc }
    }

    pub fn add(&mut self, data_bytes: &[u8]) {
        for byte in data_bytes {
            self.crc ^= ((*byte as u64) << 56) & SIGNATURE_MASK64;

            unroll! {
                for _bit in 0..8 {
                    if self.crc & (1 << 63) != 0 {
                        self.crc = ((self.crc << 1) & SIGNATURE_MASK64) ^ SIGNATURE_POLY;
                    } else {
                        self.crc <<= 1;
                    }
                }
            }
        }
    }

    pub fn value(&self) -> u64 {
        (self.crc & SIGNATURE_MASK64) ^ SIGNATURE_MASK64
    }
}

/// Signature of a piece of normalized DSDL text.
pub fn compute_signature(text: &str) -> u64 {
    let mut sig = Signature::new(None);
    sig.add(text.as_bytes());
    sig.value()
}
