//! Error types, grouped by where they arise: schema construction, the codec, frame
//! reception, transfer generation, and the node as a whole.

use thiserror::Error;

use crate::protocol::{CanFrame, TransferDescriptor};

/// A type description that can't exist on a DSDL network.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("invalid bit length {bit_len} for {kind}")]
    InvalidBitLength { kind: &'static str, bit_len: u8 },

    #[error("duplicate field name `{0}`")]
    DuplicateField(String),

    #[error("union `{0}` needs at least 2 fields")]
    UnionTooSmall(String),

    #[error("union `{0}` can't contain void fields")]
    VoidInUnion(String),

    #[error("arrays of arrays are not allowed")]
    NestedArray,

    #[error("array elements can't be void")]
    VoidArrayElement,

    #[error("static array must have at least one element")]
    EmptyStaticArray,

    #[error("constant `{0}` does not fit its type")]
    ConstantOutOfRange(String),

    #[error("type `{0}` is already registered")]
    DuplicateType(String),

    #[error("{kind} data type id {id} is already taken")]
    DuplicateTypeId { kind: &'static str, id: u16 },

    #[error("{kind} data type id {id} out of range")]
    TypeIdOutOfRange { kind: &'static str, id: u16 },

    #[error("type `{0}` refers to itself")]
    Cycle(String),
}

/// Encoding or decoding a value failed.
///
/// `TruncatedPayload`, `InvalidUnionTag` and `InvalidArrayLength` come from malformed input
/// and are recoverable; the rest are caller mistakes for the single encode call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("payload truncated: {needed} more bit(s) needed")]
    TruncatedPayload { needed: usize },

    #[error("value does not match the type of `{0}`")]
    TypeMismatch(String),

    #[error("missing value for field `{0}`")]
    MissingField(String),

    #[error("array `{field}` holds {len} elements; at most {max} allowed")]
    ArrayTooLong { field: String, len: usize, max: usize },

    #[error("static array `{field}` needs exactly {expected} elements, got {actual}")]
    ArrayLength {
        field: String,
        expected: usize,
        actual: usize,
    },

    #[error("union `{0}` needs exactly one active field")]
    InvalidUnion(String),

    #[error("union tag {tag} out of range for `{union}`")]
    InvalidUnionTag { union: String, tag: u64 },

    #[error("decoded array length {len} exceeds {max}")]
    InvalidArrayLength { len: u64, max: usize },
}

impl CodecError {
    /// Errors caused by the bytes on the wire rather than by the caller.
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            Self::TruncatedPayload { .. }
                | Self::InvalidUnionTag { .. }
                | Self::InvalidArrayLength { .. }
        )
    }
}

/// Why a received frame did not contribute to a transfer.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxErrorKind {
    #[error("not an extended data frame with a tail byte")]
    IncompatibleFrame,
    #[error("frame does not continue a transfer we saw start")]
    MissedTransferStart,
    #[error("unexpected toggle bit")]
    WrongToggle,
    #[error("unexpected transfer id")]
    UnexpectedTransferId,
    #[error("first frame too short to carry the transfer CRC")]
    ShortFrame,
    #[error("transfer CRC mismatch")]
    BadCrc,
    #[error("transfer payload exceeds the configured limit")]
    PayloadTooLong,
}

/// A protocol error, tagged with the frames that caused it.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind} ({} frame(s) discarded)", frames.len())]
pub struct RxError {
    pub kind: RxErrorKind,
    /// `None` when the frame's ID could not be interpreted.
    pub descriptor: Option<TransferDescriptor>,
    pub frames: Vec<CanFrame>,
}

/// Transfer parameters that can't be put on the wire.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TxError {
    #[error("node id {0} out of range")]
    InvalidNodeId(u8),

    #[error("service data type id {0} out of range")]
    InvalidServiceTypeId(u16),

    #[error("priority {0} out of range")]
    InvalidPriority(u8),

    #[error("anonymous transfers carry at most 7 bytes, got {0}")]
    AnonymousPayloadTooLong(usize),

    #[error("anonymous nodes can't take part in service transfers")]
    AnonymousService,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error(transparent)]
    Tx(#[from] TxError),

    #[error("transfer timeout must be non-zero")]
    ZeroTimeout,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Tx(#[from] TxError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("unknown data type `{0}`")]
    UnknownType(String),

    #[error("`{0}` is a service, not a message")]
    NotAMessage(String),

    #[error("`{0}` is a message, not a service")]
    NotAService(String),

    #[error("frame transport failed: {0}")]
    Transport(String),

    #[error("request cancelled")]
    Cancelled,
}
