//! DSDL serialization and the CAN transfer layer of DroneCAN (UAVCAN v0).
//!
//! Types are described at runtime with the model in [`dsdl`], values are bit-packed by
//! [`codec`], and payloads are split into CAN frames by [`tx`] and put back together by [`rx`].
//! [`Node`] ties these together over a [`FrameTransport`].

//! [DroneCAN specification](https://dronecan.github.io/Specification/)
//! [Transport layer](https://dronecan.github.io/Specification/4._CAN_bus_transport_layer/)

pub mod bitstream;
pub mod codec;
pub mod config;
pub mod crc;
pub mod dsdl;
pub mod error;
pub mod messages;
pub mod node;
pub mod protocol;
pub mod registry;
pub mod rx;
pub mod transport;
pub mod tx;
pub mod value;

pub use config::NodeConfig;
pub use dsdl::{
    ArrayMode, ArrayType, CastMode, CompositeType, Constant, ConstantValue, DsdlType, Field,
    PrimitiveKind, PrimitiveType, ServiceType,
};
pub use error::*;
pub use messages::*;
pub use node::{Node, ResponseTicket};
pub use protocol::*;
pub use registry::{DataTypeKind, RegisteredType, TypeDefinition, TypeRegistry};
pub use rx::{AcceptanceFilter, Reassembler, Transfer};
pub use transport::{FrameTransport, MemoryTransport};
pub use tx::TxQueue;
pub use value::{DsdlObject, Record, Value};

/// Classic CAN data field length.
pub const FRAME_MAX_LEN: usize = 8;

pub const TRANSFER_ID_BITS: u8 = 5;

/// Anonymous messages only carry the 2 low bits of their data type id.
pub const ANON_TYPE_ID_MASK: u16 = 0b11;

/// Partial transfers idle for longer than this are abandoned.
pub const TRANSFER_TIMEOUT_US: u64 = 2_000_000;
pub const STALE_SWEEP_INTERVAL_US: u64 = 1_000_000;

pub const NODE_ID_MIN: u8 = 1;
pub const NODE_ID_MAX: u8 = 127;

pub const MESSAGE_TYPE_ID_MAX: u16 = u16::MAX;
pub const SERVICE_TYPE_ID_MAX: u8 = u8::MAX;

/// 16-bit floating point, for `float16` fields.
/// Alternative to `half` lib, without bringing in a dep.
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct f16 {
    bits: u16,
}

impl f16 {
    /// Rounds to nearest, ties to even. Out of range values become infinity.
    pub fn from_f32(value: f32) -> Self {
        // half's implementation
        // https://github.com/starkat99/half-rs/blob/main/src/binary16/arch.rs
        let x = value.to_bits();

        // Extract IEEE754 components
        let sign = x & 0x8000_0000u32;
        let exp = x & 0x7F80_0000u32;
        let man = x & 0x007F_FFFFu32;

        // Check for all exponent bits being set, which is Infinity or NaN
        if exp == 0x7F80_0000u32 {
            // Set mantissa MSB for NaN (and also keep shifted mantissa bits)
            let nan_bit = if man == 0 { 0 } else { 0x0200u32 };
            return Self {
                bits: ((sign >> 16) | 0x7C00u32 | nan_bit | (man >> 13)) as u16,
            };
        }

        // The number is normalized, start assembling half precision version
        let half_sign = sign >> 16;
        // Unbias the exponent, then bias for half precision
        let unbiased_exp = ((exp >> 23) as i32) - 127;
        let half_exp = unbiased_exp + 15;

        // Check for exponent overflow, return +infinity
        if half_exp >= 0x1F {
            return Self {
                bits: (half_sign | 0x7C00u32) as u16,
            };
        }

        // Check for underflow
        if half_exp <= 0 {
            // Check mantissa for what we can do
            if 14 - half_exp > 24 {
                // No rounding possibility, so this is a full underflow, return signed zero
                return Self {
                    bits: half_sign as u16,
                };
            }
            // Don't forget about hidden leading mantissa bit when assembling mantissa
            let man = man | 0x0080_0000u32;
            let mut half_man = man >> (14 - half_exp);
            let round_bit = 1 << (13 - half_exp);
            if (man & round_bit) != 0 && (man & (3 * round_bit - 1)) != 0 {
                half_man += 1;
            }
            // No exponent for subnormals
            return Self {
                bits: (half_sign | half_man) as u16,
            };
        }

        // Rebias the exponent
        let half_exp = (half_exp as u32) << 10;
        let half_man = man >> 13;
        let round_bit = 0x0000_1000u32;

        // A carry out of the mantissa correctly bumps the exponent.
        let bits = if (man & round_bit) != 0 && (man & (3 * round_bit - 1)) != 0 {
            ((half_sign | half_exp | half_man) + 1) as u16
        } else {
            (half_sign | half_exp | half_man) as u16
        };

        Self { bits }
    }

    /// Exact; every `f16` is representable as an `f32`.
    pub fn to_f32(self) -> f32 {
        let i = self.bits;

        // Signed zero
        if i & 0x7FFF == 0 {
            return f32::from_bits((i as u32) << 16);
        }

        let half_sign = (i & 0x8000) as u32;
        let half_exp = (i & 0x7C00) as u32;
        let half_man = (i & 0x03FF) as u32;
        let sign = half_sign << 16;

        // Infinity or NaN
        if half_exp == 0x7C00 {
            return if half_man == 0 {
                f32::from_bits(sign | 0x7F80_0000)
            } else {
                f32::from_bits(sign | 0x7FC0_0000 | (half_man << 13))
            };
        }

        // Subnormals become normal: shift the mantissa up to its hidden bit.
        if half_exp == 0 {
            let e = (half_man as u16).leading_zeros() - 6;
            let exp = (127 - 15 - e) << 23;
            let man = (half_man << (14 + e)) & 0x7F_FFFF;
            return f32::from_bits(sign | exp | man);
        }

        let unbiased_exp = ((half_exp >> 10) as i32) - 15;
        let exp = ((unbiased_exp + 127) as u32) << 23;
        f32::from_bits(sign | exp | (half_man << 13))
    }

    pub const fn from_bits(bits: u16) -> Self {
        Self { bits }
    }

    pub const fn to_bits(self) -> u16 {
        self.bits
    }

    pub fn to_le_bytes(&self) -> [u8; 2] {
        self.bits.to_le_bytes()
    }
}
