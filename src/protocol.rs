//! Frame-level protocol: the 29-bit CAN ID, the tail byte, and arbitration order.
//! https://dronecan.github.io/Specification/4._CAN_bus_transport_layer/

use core::{
    cmp::Ordering,
    hash::{Hash, Hasher},
};

use num_enum::TryFromPrimitive;

use crate::{registry::DataTypeKind, ANON_TYPE_ID_MASK, FRAME_MAX_LEN, TRANSFER_ID_BITS};

const EXT_ID_MASK: u32 = 0x1FFF_FFFF;
const STD_ID_MASK: u32 = 0x7FF;
const DISCRIMINATOR_MASK: u16 = 0x3FFF;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Distinguish single and multi-part transfers. The inner value is the toggle value of the
/// previous frame.
pub enum TransferComponent {
    SingleFrame,
    MultiStart,
    MultiMid(bool),
    MultiEnd(bool),
}

/// https://dronecan.github.io/Specification/4._CAN_bus_transport_layer/
/// Valid values for priority range from 0 to 31, inclusively, where 0 corresponds to highest priority
/// (and 31 corresponds to lowest priority).
/// In multi-frame transfers, the value of the priority field must be identical for all frames of the transfer.
///
/// The named levels are conventional points on that scale; any other level is `Other`.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MsgPriority {
    Highest,
    High,
    Medium,
    Low,
    Lowest,
    Other(u8),
}

impl Default for MsgPriority {
    fn default() -> Self {
        Self::Medium
    }
}

impl MsgPriority {
    pub fn val(&self) -> u8 {
        match self {
            Self::Highest => 0,
            Self::High => 8,
            Self::Medium => 16,
            Self::Low => 24,
            Self::Lowest => 31,
            Self::Other(val) => *val,
        }
    }

    pub fn from_val(val: u8) -> Self {
        match val {
            0 => Self::Highest,
            8 => Self::High,
            16 => Self::Medium,
            24 => Self::Low,
            31 => Self::Lowest,
            _ => Self::Other(val),
        }
    }
}

// `Other(16)` and `Medium` are the same priority.
impl PartialEq for MsgPriority {
    fn eq(&self, other: &Self) -> bool {
        self.val() == other.val()
    }
}

impl Eq for MsgPriority {}

impl Hash for MsgPriority {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.val().hash(state)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum RequestResponse {
    Request = 1,
    Response = 0,
}

/// Data present in services, but not messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServiceData {
    pub dest_node_id: u8, // 7 bits
    pub req_or_resp: RequestResponse,
}

/// Differentiates between messages and services
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameType {
    Message,
    /// Sent by a node without a node ID. The 14-bit discriminator keeps simultaneous
    /// anonymous transfers of different content from colliding.
    MessageAnon { discriminator: u16 },
    Service(ServiceData),
}

/// What a transfer is, from the receiver's point of view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferType {
    Message,
    ServiceRequest,
    ServiceResponse,
}

impl TransferType {
    pub fn kind(&self) -> DataTypeKind {
        match self {
            Self::Message => DataTypeKind::Message,
            _ => DataTypeKind::Service,
        }
    }
}

/// Identifies one stream of transfers: reassembly state is kept per descriptor, and service
/// responses are matched to requests by it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransferDescriptor {
    pub data_type_id: u16,
    pub transfer_type: TransferType,
    pub source_node_id: u8,
    /// 0 for messages.
    pub dest_node_id: u8,
}

/// 5-bit transfer ID, wrapping mod 32.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransferId(u8);

impl TransferId {
    const MASK: u8 = (1 << TRANSFER_ID_BITS) - 1;

    pub fn new(val: u8) -> Self {
        Self(val & Self::MASK)
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    pub fn increment(&mut self) {
        self.0 = (self.0 + 1) & Self::MASK;
    }

    /// How many increments it takes to get from `self` to `to`.
    pub fn forward_distance(&self, to: Self) -> u8 {
        to.0.wrapping_sub(self.0) & Self::MASK
    }
}

/// Construct a CAN ID. See DroneCAN Spec, CAN bus transport layer doc, "ID field" section.
/// https://dronecan.github.io/Specification/4._CAN_bus_transport_layer/
/// "DroneCAN uses only CAN 2.0B frame format (29-bit identifiers).
/// DroneCAN can share the same bus with other protocols based on CAN 2.0A (11-bit identifiers)."
///  This means we always use extended Id.
///
/// "In the case of a message broadcast transfer, the CAN ID field of every frame of the transfer will contain the following fields:
/// - Priority (5 bits)
/// - Message type ID: Data type ID of the encoded message (16 bits)
/// - Service not message: Always 0. 1 bit.
/// - Source nod ID.Can be 1-27. 7 bits.
///
/// Services replace the message type ID with an 8-bit service type ID, a request-not-response
/// bit and the 7-bit destination node ID. Anonymous messages replace it with a 14-bit
/// discriminator and the 2 low bits of the message type ID.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CanId {
    pub priority: MsgPriority,
    /// Note: This is `service_type_id` for services.
    pub type_id: u16,
    // Valid values of Node ID range from 1 to 127, inclusively.
    // Note that Node ID is represented by a 7-bit unsigned integer value and that zero is reserved,
    // to represent either an unknown node or all nodes, depending on the context.
    pub source_node_id: u8,
    pub frame_type: FrameType,
}

impl CanId {
    pub fn value(&self) -> u32 {
        // The `&` operations are to enforce the smaller-bit-count allowed than the datatype allows.
        let priority_bits = (self.priority.val() as u32 & 0b1_1111) << 24;
        let source = (self.source_node_id & 0b111_1111) as u32;

        match &self.frame_type {
            FrameType::Message => priority_bits | ((self.type_id as u32) << 8) | source,
            FrameType::MessageAnon { discriminator } => {
                priority_bits
                    | (((discriminator & DISCRIMINATOR_MASK) as u32) << 10)
                    | (((self.type_id & ANON_TYPE_ID_MASK) as u32) << 8)
            }
            FrameType::Service(service_data) => {
                priority_bits
                    | (((self.type_id & 0xff) as u32) << 16)
                    | ((service_data.req_or_resp as u32) << 15)
                    | (((service_data.dest_node_id & 0b111_1111) as u32) << 8)
                    | (1 << 7)
                    | source
            }
        }
    }

    /// Pull priority, type id, and addressing from the CAN id.
    pub fn from_value(val: u32) -> Self {
        let source_node_id = val as u8 & 0b111_1111;
        let priority = MsgPriority::from_val((val >> 24) as u8 & 0b1_1111);

        let (type_id, frame_type) = if (val >> 7) & 1 == 0 {
            if source_node_id == 0 {
                (
                    ((val >> 8) & ANON_TYPE_ID_MASK as u32) as u16,
                    FrameType::MessageAnon {
                        discriminator: ((val >> 10) & DISCRIMINATOR_MASK as u32) as u16,
                    },
                )
            } else {
                ((val >> 8) as u16, FrameType::Message)
            }
        } else {
            // A single bit is always a valid flag.
            let req_or_resp = RequestResponse::try_from(((val >> 15) & 1) as u8)
                .unwrap_or(RequestResponse::Response);
            (
                ((val >> 16) & 0xff) as u16,
                FrameType::Service(ServiceData {
                    dest_node_id: ((val >> 8) & 0b111_1111) as u8,
                    req_or_resp,
                }),
            )
        };

        Self {
            priority,
            type_id,
            source_node_id,
            frame_type,
        }
    }

    pub fn descriptor(&self) -> TransferDescriptor {
        let (transfer_type, dest_node_id) = match self.frame_type {
            FrameType::Message | FrameType::MessageAnon { .. } => (TransferType::Message, 0),
            FrameType::Service(ServiceData {
                dest_node_id,
                req_or_resp: RequestResponse::Request,
            }) => (TransferType::ServiceRequest, dest_node_id),
            FrameType::Service(ServiceData { dest_node_id, .. }) => {
                (TransferType::ServiceResponse, dest_node_id)
            }
        };

        TransferDescriptor {
            data_type_id: self.type_id,
            transfer_type,
            source_node_id: self.source_node_id,
            dest_node_id,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TailByte {
    pub start_of_transfer: bool,
    pub end_of_transfer: bool,
    pub toggle: bool,
    pub transfer_id: u8,
}

impl TailByte {
    pub fn value(&self) -> u8 {
        // (DroneCAN):
        // For single-frame transfers, the value of this field is always 1.
        // For multi-frame transfers, the value of this field is 1 if the current frame is the first
        // frame of the transfer, and 0 otherwise.
        ((self.start_of_transfer as u8) << 7)
            // For single-frame transfers, the value of this field is always 1.
            // For multi-frame transfers, the value of this field is 1 if the current frame is the last
            // frame of the transfer, and 0 otherwise.
            | ((self.end_of_transfer as u8) << 6)
            // For single-frame transfers, the value of this field is always 0.
            // For multi-frame transfers, this field contains the value of the toggle bit. As specified
            // above this will alternate value between frames, starting at 0 for the first frame.
            | ((self.toggle as u8) << 5)
            | (self.transfer_id & 0b1_1111)
    }

    /// Pull start_of_transfer, end_of_transfer, and toggle flags from the tail byte. We don't
    /// convert to TransferComponent due to ambiguities in Single vs multi-mid.
    pub fn from_value(val: u8) -> Self {
        Self {
            transfer_id: val & 0b1_1111,
            toggle: (val >> 5) & 1 != 0,
            end_of_transfer: (val >> 6) & 1 != 0,
            start_of_transfer: (val >> 7) & 1 != 0,
        }
    }
}

/// Construct a tail byte. See DroneCAN Spec, CAN bus transport layer.
/// "The Data field of the CAN frame is shared between the following fields:
/// - Transfer payload
/// - 0 tail byte, which contains the following fields. Start of transfer (1 bit), End of transfer (1 bit)
/// toggle bit (1 bit), Transfer id (5 bits)."
pub fn make_tail_byte(transfer_component: TransferComponent, transfer_id: TransferId) -> TailByte {
    // Defaults for a single-frame transfer.
    let mut start_of_transfer = true;
    let mut end_of_transfer = true;
    let mut toggle = false;

    match transfer_component {
        TransferComponent::MultiStart => {
            end_of_transfer = false;
        }
        TransferComponent::MultiMid(toggle_prev) => {
            start_of_transfer = false;
            end_of_transfer = false;
            toggle = !toggle_prev;
        }
        TransferComponent::MultiEnd(toggle_prev) => {
            start_of_transfer = false;
            toggle = !toggle_prev;
        }
        TransferComponent::SingleFrame => (),
    }

    TailByte {
        start_of_transfer,
        end_of_transfer,
        toggle,
        transfer_id: transfer_id.value(),
    }
}

/// A classic CAN frame, as handed to and from the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CanFrame {
    pub id: u32,
    pub extended: bool,
    pub rtr: bool,
    pub error: bool,
    data: [u8; FRAME_MAX_LEN],
    len: u8,
}

impl CanFrame {
    /// An extended-ID data frame. Panics if `data` is longer than 8 bytes.
    pub fn new_extended(id: u32, data: &[u8]) -> Self {
        Self::new(id & EXT_ID_MASK, true, data)
    }

    /// A standard (11-bit) ID data frame, as other protocols sharing the bus send.
    pub fn new_standard(id: u32, data: &[u8]) -> Self {
        Self::new(id & STD_ID_MASK, false, data)
    }

    fn new(id: u32, extended: bool, data: &[u8]) -> Self {
        assert!(data.len() <= FRAME_MAX_LEN, "frame data too long");

        let mut buf = [0; FRAME_MAX_LEN];
        buf[..data.len()].copy_from_slice(data);

        Self {
            id,
            extended,
            rtr: false,
            error: false,
            data: buf,
            len: data.len() as u8,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// Mutable access to the data bytes; the length is fixed.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data[..self.len as usize]
    }

    pub fn can_id(&self) -> CanId {
        CanId::from_value(self.id)
    }

    /// The last data byte; `None` for an empty frame.
    pub fn tail_byte(&self) -> Option<TailByte> {
        self.data().last().map(|b| TailByte::from_value(*b))
    }

    /// Data bytes before the tail byte.
    pub fn payload(&self) -> &[u8] {
        let len = self.len.saturating_sub(1) as usize;
        &self.data[..len]
    }

    fn clean_id(&self) -> u32 {
        if self.extended {
            self.id & EXT_ID_MASK
        } else {
            self.id & STD_ID_MASK
        }
    }

    /// Bus arbitration order: `Less` means `self` wins.
    ///
    /// Between a standard and an extended frame, the 11-bit base IDs are compared, and the
    /// standard frame wins a tie. Between a data and a remote frame with the same ID, the
    /// data frame wins. Otherwise the lower ID wins.
    pub fn arbitration_cmp(&self, other: &Self) -> Ordering {
        let (a, b) = (self.clean_id(), other.clean_id());

        if self.extended != other.extended {
            let arb11 = |frame: &Self, id: u32| if frame.extended { id >> 18 } else { id };
            let tie_break = if self.extended {
                Ordering::Greater
            } else {
                Ordering::Less
            };
            return arb11(self, a).cmp(&arb11(other, b)).then(tie_break);
        }

        if a == b && self.rtr != other.rtr {
            return if self.rtr {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        a.cmp(&b)
    }
}
