//! Transfer generation: splitting a payload into CAN frames, and ordering frames for the bus.
//! See [The DroneCAN spec, transport layer page](https://dronecan.github.io/Specification/4._CAN_bus_transport_layer/)

use std::{cmp::Ordering, collections::BinaryHeap};

use crate::{
    crc::TransferCrc,
    error::TxError,
    protocol::{
        make_tail_byte, CanFrame, CanId, FrameType, MsgPriority, ServiceData, TransferComponent,
        TransferId,
    },
    FRAME_MAX_LEN, NODE_ID_MAX, NODE_ID_MIN, SERVICE_TYPE_ID_MAX,
};

/// Payload bytes per frame, after the tail byte.
const FRAME_PAYLOAD_LEN: usize = FRAME_MAX_LEN - 1;
/// The first frame of a multi-frame transfer also carries the 2-byte CRC.
const FIRST_FRAME_PAYLOAD_LEN: usize = FRAME_PAYLOAD_LEN - 2;
const ANON_DISCRIMINATOR_MASK: u16 = 0x3FFF;

/// Number of frames a payload of `payload_len` bytes is split into.
pub fn frame_count(payload_len: usize) -> usize {
    if payload_len <= FRAME_PAYLOAD_LEN {
        1
    } else {
        (payload_len - FIRST_FRAME_PAYLOAD_LEN).div_ceil(FRAME_PAYLOAD_LEN) + 1
    }
}

/// The frames of one transfer, produced one at a time.
#[derive(Clone, Debug)]
pub struct TransferFrames<'a> {
    can_id: u32,
    payload: &'a [u8],
    transfer_id: TransferId,
    /// Set for multi-frame transfers.
    crc: Option<u16>,
    /// Index of the next payload byte to send.
    offset: usize,
    toggle: bool,
    remaining: usize,
}

impl<'a> TransferFrames<'a> {
    fn new(can_id: u32, signature: u64, transfer_id: TransferId, payload: &'a [u8]) -> Self {
        let remaining = frame_count(payload.len());
        let crc = (remaining > 1).then(|| TransferCrc::compute(signature, payload));

        Self {
            can_id,
            payload,
            transfer_id,
            crc,
            offset: 0,
            toggle: false,
            remaining,
        }
    }

    pub fn can_id(&self) -> u32 {
        self.can_id
    }
}

impl Iterator for TransferFrames<'_> {
    type Item = CanFrame;

    fn next(&mut self) -> Option<CanFrame> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let mut buf = [0; FRAME_MAX_LEN];

        let Some(crc) = self.crc else {
            let len = self.payload.len();
            buf[..len].copy_from_slice(self.payload);
            buf[len] = make_tail_byte(TransferComponent::SingleFrame, self.transfer_id).value();
            return Some(CanFrame::new_extended(self.can_id, &buf[..len + 1]));
        };

        if self.offset == 0 {
            // Populate the first frame. This is different from the others due to the CRC.
            let chunk = &self.payload[..FIRST_FRAME_PAYLOAD_LEN];
            buf[..2].copy_from_slice(&crc.to_le_bytes());
            buf[2..FRAME_PAYLOAD_LEN].copy_from_slice(chunk);
            buf[FRAME_PAYLOAD_LEN] =
                make_tail_byte(TransferComponent::MultiStart, self.transfer_id).value();

            self.offset = FIRST_FRAME_PAYLOAD_LEN;
            return Some(CanFrame::new_extended(self.can_id, &buf));
        }

        let end = (self.offset + FRAME_PAYLOAD_LEN).min(self.payload.len());
        let chunk = &self.payload[self.offset..end];

        let component = if end == self.payload.len() {
            TransferComponent::MultiEnd(self.toggle)
        } else {
            TransferComponent::MultiMid(self.toggle)
        };
        let tail_byte = make_tail_byte(component, self.transfer_id);
        self.toggle = tail_byte.toggle;

        buf[..chunk.len()].copy_from_slice(chunk);
        buf[chunk.len()] = tail_byte.value();

        self.offset = end;
        Some(CanFrame::new_extended(self.can_id, &buf[..chunk.len() + 1]))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for TransferFrames<'_> {}

fn check_node_id(node_id: u8) -> Result<(), TxError> {
    if !(NODE_ID_MIN..=NODE_ID_MAX).contains(&node_id) {
        return Err(TxError::InvalidNodeId(node_id));
    }
    Ok(())
}

/// Split `payload` into the frames of a transfer with the given ID. `signature` is the data
/// type signature; it seeds the CRC of multi-frame transfers.
pub fn generate(
    signature: u64,
    can_id: CanId,
    transfer_id: TransferId,
    payload: &[u8],
) -> Result<TransferFrames<'_>, TxError> {
    if can_id.priority.val() > 31 {
        return Err(TxError::InvalidPriority(can_id.priority.val()));
    }

    match can_id.frame_type {
        FrameType::Message => check_node_id(can_id.source_node_id)?,
        FrameType::MessageAnon { .. } => {
            if can_id.source_node_id != 0 {
                return Err(TxError::InvalidNodeId(can_id.source_node_id));
            }
            if payload.len() > FRAME_PAYLOAD_LEN {
                return Err(TxError::AnonymousPayloadTooLong(payload.len()));
            }
        }
        FrameType::Service(service_data) => {
            if can_id.source_node_id == 0 {
                return Err(TxError::AnonymousService);
            }
            check_node_id(can_id.source_node_id)?;
            check_node_id(service_data.dest_node_id)?;
            if can_id.type_id > SERVICE_TYPE_ID_MAX as u16 {
                return Err(TxError::InvalidServiceTypeId(can_id.type_id));
            }
        }
    }

    Ok(TransferFrames::new(can_id.value(), signature, transfer_id, payload))
}

/// Frames of a message broadcast. A `source_node_id` of 0 sends an anonymous message: at most
/// 7 bytes, with a discriminator derived from the payload.
pub fn broadcast(
    signature: u64,
    data_type_id: u16,
    transfer_id: TransferId,
    source_node_id: u8,
    priority: MsgPriority,
    payload: &[u8],
) -> Result<TransferFrames<'_>, TxError> {
    let frame_type = if source_node_id == 0 {
        let mut crc = TransferCrc::new();
        crc.add_bytes(payload);
        FrameType::MessageAnon {
            discriminator: crc.value & ANON_DISCRIMINATOR_MASK,
        }
    } else {
        FrameType::Message
    };

    let can_id = CanId {
        priority,
        type_id: data_type_id,
        source_node_id,
        frame_type,
    };

    generate(signature, can_id, transfer_id, payload)
}

/// Frames of a service request or response.
pub fn service(
    signature: u64,
    service_type_id: u16,
    transfer_id: TransferId,
    source_node_id: u8,
    service_data: ServiceData,
    priority: MsgPriority,
    payload: &[u8],
) -> Result<TransferFrames<'_>, TxError> {
    let can_id = CanId {
        priority,
        type_id: service_type_id,
        source_node_id,
        frame_type: FrameType::Service(service_data),
    };

    generate(signature, can_id, transfer_id, payload)
}

#[derive(Debug)]
struct QueuedFrame {
    frame: CanFrame,
    seq: u64,
}

// `BinaryHeap` is a max-heap: the frame that wins arbitration must compare greatest.
impl Ord for QueuedFrame {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .frame
            .arbitration_cmp(&self.frame)
            .then(other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedFrame {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedFrame {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedFrame {}

/// Outgoing frames, popped in bus arbitration order. Frames with equal IDs come out in the
/// order they went in, which keeps each transfer's frames in sequence.
#[derive(Debug, Default)]
pub struct TxQueue {
    heap: BinaryHeap<QueuedFrame>,
    seq: u64,
}

impl TxQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: CanFrame) {
        self.heap.push(QueuedFrame {
            frame,
            seq: self.seq,
        });
        self.seq += 1;
    }

    /// The frame that would win arbitration against everything else queued.
    pub fn peek(&self) -> Option<&CanFrame> {
        self.heap.peek().map(|q| &q.frame)
    }

    pub fn pop(&mut self) -> Option<CanFrame> {
        self.heap.pop().map(|q| q.frame)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

impl Extend<CanFrame> for TxQueue {
    fn extend<I: IntoIterator<Item = CanFrame>>(&mut self, iter: I) {
        for frame in iter {
            self.push(frame);
        }
    }
}
