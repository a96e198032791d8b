//! Transfer reassembly: CAN frames in, complete transfers out.
//!
//! State is kept per [`TransferDescriptor`]. The rules, per frame:
//! - Only extended data frames with at least a tail byte are considered.
//! - A transfer can only begin with a start-of-transfer frame, and only if the acceptance
//!   filter knows its data type; the filter also supplies the signature for the CRC.
//! - The state restarts on a start frame whose transfer ID isn't the expected one or the one
//!   just before it, or after `timeout_us` without activity.
//! - Toggle bits must alternate starting at 0, and every frame must carry the transfer's ID.
//! - Multi-frame transfers end with a CRC check over the signature and the payload.
//!
//! Any error discards the transfer in progress, except a stray transfer ID, which only
//! discards the offending frame.

use std::collections::HashMap;

use log::{debug, trace};

use crate::{
    config::NodeConfig,
    crc::TransferCrc,
    error::{RxError, RxErrorKind},
    protocol::{CanFrame, MsgPriority, TransferDescriptor, TransferId},
};

/// Decides which transfers to receive. Called once per start-of-transfer frame.
pub trait AcceptanceFilter {
    /// The data type signature to check the transfer against, or `None` to ignore it.
    fn accept(&self, descriptor: &TransferDescriptor) -> Option<u64>;
}

impl<F> AcceptanceFilter for F
where
    F: Fn(&TransferDescriptor) -> Option<u64>,
{
    fn accept(&self, descriptor: &TransferDescriptor) -> Option<u64> {
        self(descriptor)
    }
}

/// A complete, CRC-checked transfer.
#[derive(Clone, Debug, PartialEq)]
pub struct Transfer {
    pub descriptor: TransferDescriptor,
    pub priority: MsgPriority,
    pub transfer_id: TransferId,
    /// Reception time of the first frame.
    pub timestamp_us: u64,
    pub payload: Vec<u8>,
    /// The frames the transfer was assembled from, in order.
    pub frames: Vec<CanFrame>,
}

#[derive(Debug)]
struct RxState {
    /// The ID of the transfer in progress, or of the next one expected.
    transfer_id: TransferId,
    toggle: bool,
    last_timestamp_us: u64,
    start_timestamp_us: u64,
    priority: MsgPriority,
    signature: u64,
    expected_crc: u16,
    payload: Vec<u8>,
    frames: Vec<CanFrame>,
}

impl RxState {
    fn new(transfer_id: TransferId, timestamp_us: u64) -> Self {
        Self {
            transfer_id,
            toggle: false,
            last_timestamp_us: timestamp_us,
            start_timestamp_us: timestamp_us,
            priority: MsgPriority::default(),
            signature: 0,
            expected_crc: 0,
            payload: Vec::new(),
            frames: Vec::new(),
        }
    }

    fn restart(&mut self, transfer_id: TransferId) {
        self.transfer_id = transfer_id;
        self.toggle = false;
        self.payload.clear();
        self.frames.clear();
    }

    /// Move on to the next transfer ID, handing back the frames of the current one.
    fn advance(&mut self) -> Vec<CanFrame> {
        self.transfer_id.increment();
        self.toggle = false;
        self.payload.clear();
        std::mem::take(&mut self.frames)
    }
}

#[derive(Debug)]
pub struct Reassembler {
    states: HashMap<TransferDescriptor, RxState>,
    timeout_us: u64,
    sweep_interval_us: u64,
    max_payload: usize,
    last_sweep_us: Option<u64>,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new(&NodeConfig::default())
    }
}

impl Reassembler {
    pub fn new(config: &NodeConfig) -> Self {
        Self {
            states: HashMap::new(),
            timeout_us: config.transfer_timeout_us,
            sweep_interval_us: config.sweep_interval_us,
            max_payload: config.max_transfer_payload,
            last_sweep_us: None,
        }
    }

    /// Feed one received frame. Returns the transfer it completes, if any.
    pub fn process_frame(
        &mut self,
        frame: CanFrame,
        timestamp_us: u64,
        filter: &impl AcceptanceFilter,
    ) -> Result<Option<Transfer>, RxError> {
        let tail_byte = match frame.tail_byte() {
            Some(t) if frame.extended && !frame.rtr && !frame.error => t,
            _ => {
                return Err(RxError {
                    kind: RxErrorKind::IncompatibleFrame,
                    descriptor: None,
                    frames: vec![frame],
                })
            }
        };

        let can_id = frame.can_id();
        let descriptor = can_id.descriptor();
        let frame_tid = TransferId::new(tail_byte.transfer_id);
        let sot = tail_byte.start_of_transfer;
        let eot = tail_byte.end_of_transfer;

        let error = |kind: RxErrorKind, frames: Vec<CanFrame>| RxError {
            kind,
            descriptor: Some(descriptor),
            frames,
        };

        let signature = if sot {
            match filter.accept(&descriptor) {
                Some(sig) => Some(sig),
                None => {
                    trace!("Ignoring transfer {:?}", descriptor);
                    return Ok(None);
                }
            }
        } else {
            None
        };

        let fresh = !self.states.contains_key(&descriptor);
        if fresh && !sot {
            debug!("Frame without a transfer start from {:?}", descriptor);
            return Err(error(RxErrorKind::MissedTransferStart, vec![frame]));
        }

        let state = self
            .states
            .entry(descriptor)
            .or_insert_with(|| RxState::new(frame_tid, timestamp_us));

        let timed_out = timestamp_us.saturating_sub(state.last_timestamp_us) > self.timeout_us;
        let restart = fresh
            || timed_out
            || (sot && frame_tid.forward_distance(state.transfer_id) > 1);

        if restart {
            state.restart(frame_tid);
            if !sot {
                state.last_timestamp_us = timestamp_us;
                state.transfer_id.increment();
                debug!("Missed the start of transfer {:?} from {:?}", frame_tid, descriptor);
                return Err(error(RxErrorKind::MissedTransferStart, vec![frame]));
            }
        }

        if frame_tid != state.transfer_id {
            debug!(
                "Unexpected transfer id {:?} (expected {:?}) from {:?}",
                frame_tid, state.transfer_id, descriptor
            );
            return Err(error(RxErrorKind::UnexpectedTransferId, vec![frame]));
        }

        // Frames are only buffered between a start frame and the end of its transfer.
        if !sot && state.frames.is_empty() {
            debug!("Missed the start of transfer {:?} from {:?}", frame_tid, descriptor);
            return Err(error(RxErrorKind::MissedTransferStart, vec![frame]));
        }

        state.last_timestamp_us = timestamp_us;

        let fail = |state: &mut RxState, kind: RxErrorKind| {
            debug!("Discarding transfer from {:?}: {}", descriptor, kind);
            let mut frames = state.advance();
            frames.push(frame);
            Err(error(kind, frames))
        };

        if (sot && tail_byte.toggle) || (!sot && tail_byte.toggle != state.toggle) {
            return fail(state, RxErrorKind::WrongToggle);
        }

        if sot {
            // A start frame with the expected ID supersedes whatever was in progress.
            state.payload.clear();
            state.frames.clear();
            state.priority = can_id.priority;
            state.start_timestamp_us = timestamp_us;
            state.signature = signature.unwrap_or_default();

            if eot {
                state.payload.extend_from_slice(frame.payload());
                state.frames.push(frame);
                return Ok(Some(Self::complete(state, descriptor)));
            }

            if frame.data().len() <= 3 {
                return fail(state, RxErrorKind::ShortFrame);
            }

            let data = frame.payload();
            state.expected_crc = u16::from_le_bytes([data[0], data[1]]);
            state.payload.extend_from_slice(&data[2..]);
        } else {
            state.payload.extend_from_slice(frame.payload());
        }

        if state.payload.len() > self.max_payload {
            return fail(state, RxErrorKind::PayloadTooLong);
        }

        if !eot {
            state.frames.push(frame);
            state.toggle = !state.toggle;
            return Ok(None);
        }

        let crc = TransferCrc::compute(state.signature, &state.payload);
        if crc != state.expected_crc {
            return fail(state, RxErrorKind::BadCrc);
        }

        state.frames.push(frame);
        Ok(Some(Self::complete(state, descriptor)))
    }

    fn complete(state: &mut RxState, descriptor: TransferDescriptor) -> Transfer {
        let transfer_id = state.transfer_id;
        let payload = std::mem::take(&mut state.payload);
        let frames = state.advance();

        trace!(
            "Received transfer {:?} from {:?}: {} bytes",
            transfer_id,
            descriptor,
            payload.len()
        );

        Transfer {
            descriptor,
            priority: state.priority,
            transfer_id,
            timestamp_us: state.start_timestamp_us,
            payload,
            frames,
        }
    }

    /// Drop state that has seen no activity for longer than the transfer timeout. Runs at
    /// most once per sweep interval; returns how many states were dropped.
    pub fn sweep(&mut self, now_us: u64) -> usize {
        if let Some(last) = self.last_sweep_us {
            if now_us.saturating_sub(last) < self.sweep_interval_us {
                return 0;
            }
        }
        self.last_sweep_us = Some(now_us);

        let timeout = self.timeout_us;
        let before = self.states.len();
        self.states
            .retain(|_, s| now_us.saturating_sub(s.last_timestamp_us) <= timeout);

        let evicted = before - self.states.len();
        if evicted > 0 {
            debug!("Evicted {} stale transfer state(s)", evicted);
        }
        evicted
    }

    pub fn contains(&self, descriptor: &TransferDescriptor) -> bool {
        self.states.contains_key(descriptor)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        protocol::{CanId, TransferType},
        tx, TRANSFER_TIMEOUT_US,
    };
    use proptest::prelude::*;

    const SIG: u64 = 0xEE46_8A81_21C4_6A9E;

    fn accept_all(_: &TransferDescriptor) -> Option<u64> {
        Some(SIG)
    }

    fn frames_from(source: u8, tid: u8, payload: &[u8]) -> Vec<CanFrame> {
        tx::broadcast(SIG, 2000, TransferId::new(tid), source, MsgPriority::Medium, payload)
            .unwrap()
            .collect()
    }

    fn frames(tid: u8, payload: &[u8]) -> Vec<CanFrame> {
        frames_from(10, tid, payload)
    }

    fn feed(
        rx: &mut Reassembler,
        frames: Vec<CanFrame>,
        ts: u64,
    ) -> Vec<Result<Option<Transfer>, RxError>> {
        frames
            .into_iter()
            .map(|f| rx.process_frame(f, ts, &accept_all))
            .collect()
    }

    fn last_ok(results: Vec<Result<Option<Transfer>, RxError>>) -> Transfer {
        let n = results.len();
        for r in &results[..n - 1] {
            assert_eq!(r, &Ok(None));
        }
        results.into_iter().last().unwrap().unwrap().unwrap()
    }

    fn descriptor() -> TransferDescriptor {
        TransferDescriptor {
            data_type_id: 2000,
            transfer_type: TransferType::Message,
            source_node_id: 10,
            dest_node_id: 0,
        }
    }

    #[test]
    fn test_round_trip_sizes() {
        let _ = env_logger::builder().is_test(true).try_init();

        let mut rx = Reassembler::default();
        for (i, len) in [0usize, 1, 7, 8, 50, 200].into_iter().enumerate() {
            let payload: Vec<u8> = (0..len).map(|b| (b * 7) as u8).collect();
            let sent = frames(i as u8, &payload);

            let transfer = last_ok(feed(&mut rx, sent.clone(), 1_000));
            assert_eq!(transfer.payload, payload);
            assert_eq!(transfer.frames, sent);
            assert_eq!(transfer.descriptor, descriptor());
            assert_eq!(transfer.transfer_id, TransferId::new(i as u8));
        }
    }

    #[test]
    fn test_wrong_toggle() {
        let mut rx = Reassembler::default();
        let mut sent = frames(0, &[5; 15]);
        assert_eq!(sent.len(), 3);

        let tail = sent[1].data().len() - 1;
        sent[1].data_mut()[tail] ^= 1 << 5;

        let results = feed(&mut rx, sent, 0);
        assert_eq!(results[0], Ok(None));
        let err = results[1].clone().unwrap_err();
        assert_eq!(err.kind, RxErrorKind::WrongToggle);
        assert_eq!(err.frames.len(), 2);
        // The end frame has nothing left to continue.
        assert_eq!(
            results[2].clone().unwrap_err().kind,
            RxErrorKind::UnexpectedTransferId
        );
    }

    #[test]
    fn test_bad_crc() {
        let mut rx = Reassembler::default();
        let mut sent = frames(0, &[5; 15]);
        sent[1].data_mut()[3] ^= 0xFF;

        let results = feed(&mut rx, sent, 0);
        let err = results[2].clone().unwrap_err();
        assert_eq!(err.kind, RxErrorKind::BadCrc);
        assert_eq!(err.frames.len(), 3);
        assert_eq!(err.descriptor, Some(descriptor()));

        // The next transfer goes through.
        let ok = last_ok(feed(&mut rx, frames(1, &[6; 15]), 10));
        assert_eq!(ok.payload, vec![6; 15]);
    }

    #[test]
    fn test_wrong_signature_is_bad_crc() {
        let mut rx = Reassembler::default();
        let other_sig = |_: &TransferDescriptor| Some(SIG ^ 1);
        let mut last = Ok(None);
        for frame in frames(0, &[1; 20]) {
            last = rx.process_frame(frame, 0, &other_sig);
        }
        assert_eq!(last.unwrap_err().kind, RxErrorKind::BadCrc);
    }

    #[test]
    fn test_incompatible_frames() {
        let mut rx = Reassembler::default();
        let valid = frames(0, &[1])[0];

        let standard = CanFrame::new_standard(0x100, &[0xC0]);
        let empty = CanFrame::new_extended(valid.id, &[]);
        let mut remote = valid;
        remote.rtr = true;
        let mut error = valid;
        error.error = true;

        for frame in [standard, empty, remote, error] {
            let err = rx.process_frame(frame, 0, &accept_all).unwrap_err();
            assert_eq!(err.kind, RxErrorKind::IncompatibleFrame);
            assert_eq!(err.descriptor, None);
        }
        assert!(rx.is_empty());
    }

    #[test]
    fn test_missed_start() {
        let mut rx = Reassembler::default();
        let sent = frames(3, &[1; 20]);

        let err = rx.process_frame(sent[1], 0, &accept_all).unwrap_err();
        assert_eq!(err.kind, RxErrorKind::MissedTransferStart);
        assert!(!rx.contains(&descriptor()));
    }

    #[test]
    fn test_missed_start_after_timeout() {
        let mut rx = Reassembler::default();
        let sent = frames(3, &[1; 20]);

        assert_eq!(rx.process_frame(sent[0], 0, &accept_all), Ok(None));
        let err = rx
            .process_frame(sent[1], TRANSFER_TIMEOUT_US + 1, &accept_all)
            .unwrap_err();
        assert_eq!(err.kind, RxErrorKind::MissedTransferStart);

        // A fresh transfer with the next id starts cleanly.
        let ok = last_ok(feed(&mut rx, frames(4, &[2; 3]), TRANSFER_TIMEOUT_US + 2));
        assert_eq!(ok.payload, vec![2; 3]);
    }

    #[test]
    fn test_duplicate_rejected_then_restart() {
        let mut rx = Reassembler::default();
        let single = frames(7, &[1, 2]);

        assert!(rx.process_frame(single[0], 0, &accept_all).unwrap().is_some());
        // The same transfer again, eg from a redundant interface.
        let err = rx.process_frame(single[0], 10, &accept_all).unwrap_err();
        assert_eq!(err.kind, RxErrorKind::UnexpectedTransferId);

        // A jump in transfer id restarts reception.
        let jumped = frames(20, &[3]);
        assert!(rx.process_frame(jumped[0], 20, &accept_all).unwrap().is_some());

        // After a timeout, the previous id is fine again.
        let again = frames(20, &[3]);
        assert!(rx
            .process_frame(again[0], 30 + TRANSFER_TIMEOUT_US, &accept_all)
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_missed_start_between_transfers() {
        let mut rx = Reassembler::default();
        let ok = last_ok(feed(&mut rx, frames(0, &[4; 30]), 0));
        assert_eq!(ok.payload, vec![4; 30]);

        // The first two frames of the next transfer are lost.
        let sent = frames(1, &[8; 30]);
        assert_eq!(sent.len(), 5);
        for result in feed(&mut rx, sent[2..].to_vec(), 10) {
            let err = result.unwrap_err();
            assert_eq!(err.kind, RxErrorKind::MissedTransferStart);
            assert_eq!(err.frames.len(), 1);
        }

        // Still waiting on transfer 1; a complete copy of it is accepted.
        let ok = last_ok(feed(&mut rx, sent, 20));
        assert_eq!(ok.payload, vec![8; 30]);
        assert_eq!(ok.transfer_id, TransferId::new(1));
    }

    #[test]
    fn test_stray_frame_keeps_transfer() {
        let mut rx = Reassembler::default();
        let sent = frames(5, &[9; 20]);
        let stray = frames(9, &[1; 20]);

        assert_eq!(rx.process_frame(sent[0], 0, &accept_all), Ok(None));
        let err = rx.process_frame(stray[1], 0, &accept_all).unwrap_err();
        assert_eq!(err.kind, RxErrorKind::UnexpectedTransferId);

        let ok = last_ok(feed(&mut rx, sent[1..].to_vec(), 0));
        assert_eq!(ok.payload, vec![9; 20]);
    }

    #[test]
    fn test_short_frame() {
        let mut rx = Reassembler::default();
        // Start, not end, toggle 0, tid 0; only two bytes before the tail.
        let id = frames(0, &[])[0].id;
        let frame = CanFrame::new_extended(id, &[0x12, 0x34, 0b1000_0000]);

        let err = rx.process_frame(frame, 0, &accept_all).unwrap_err();
        assert_eq!(err.kind, RxErrorKind::ShortFrame);
    }

    #[test]
    fn test_start_with_toggle_set() {
        let mut rx = Reassembler::default();
        let id = frames(0, &[])[0].id;
        let frame = CanFrame::new_extended(id, &[1, 0b1110_0000]);

        let err = rx.process_frame(frame, 0, &accept_all).unwrap_err();
        assert_eq!(err.kind, RxErrorKind::WrongToggle);
    }

    #[test]
    fn test_payload_limit() {
        let mut rx = Reassembler::new(&NodeConfig::default().with_max_transfer_payload(10));
        let results = feed(&mut rx, frames(0, &[0; 30]), 0);
        let err = results
            .into_iter()
            .find_map(|r| r.err())
            .unwrap();
        assert_eq!(err.kind, RxErrorKind::PayloadTooLong);
    }

    #[test]
    fn test_acceptance_filter() {
        let mut rx = Reassembler::default();
        let refuse = |_: &TransferDescriptor| -> Option<u64> { None };

        for frame in frames(0, &[1; 20]).into_iter().take(1) {
            assert_eq!(rx.process_frame(frame, 0, &refuse), Ok(None));
        }
        assert!(rx.is_empty());
    }

    #[test]
    fn test_interleaved_sources() {
        let mut rx = Reassembler::default();
        let a = frames_from(10, 0, &[0xA; 20]);
        let b = frames_from(11, 0, &[0xB; 20]);

        let mut done = Vec::new();
        for (fa, fb) in a.into_iter().zip(b) {
            done.extend(rx.process_frame(fa, 0, &accept_all).unwrap());
            done.extend(rx.process_frame(fb, 0, &accept_all).unwrap());
        }

        assert_eq!(done.len(), 2);
        assert_eq!(done[0].payload, vec![0xA; 20]);
        assert_eq!(done[1].payload, vec![0xB; 20]);
        assert_eq!(done[1].descriptor.source_node_id, 11);
    }

    #[test]
    fn test_service_descriptor() {
        let mut rx = Reassembler::default();
        let data = crate::protocol::ServiceData {
            dest_node_id: 3,
            req_or_resp: crate::protocol::RequestResponse::Request,
        };
        let frame = tx::service(SIG, 1, TransferId::new(0), 4, data, MsgPriority::High, &[])
            .unwrap()
            .next()
            .unwrap();

        let transfer = rx.process_frame(frame, 0, &accept_all).unwrap().unwrap();
        assert_eq!(transfer.descriptor.transfer_type, TransferType::ServiceRequest);
        assert_eq!(transfer.descriptor.dest_node_id, 3);
        assert_eq!(transfer.priority, MsgPriority::High);
        assert_eq!(CanId::from_value(transfer.frames[0].id).source_node_id, 4);
    }

    #[test]
    fn test_stale_eviction() {
        let mut rx = Reassembler::default();
        let sent = frames(0, &[1; 20]);
        assert_eq!(rx.process_frame(sent[0], 100, &accept_all), Ok(None));
        assert!(rx.contains(&descriptor()));

        assert_eq!(rx.sweep(100 + TRANSFER_TIMEOUT_US), 0);
        // Rate limited.
        assert_eq!(rx.sweep(101 + TRANSFER_TIMEOUT_US), 0);
        assert!(rx.contains(&descriptor()));

        assert_eq!(rx.sweep(200 + 2 * TRANSFER_TIMEOUT_US), 1);
        assert!(!rx.contains(&descriptor()));
    }

    proptest! {
        #[test]
        fn prop_reassembly(payload in proptest::collection::vec(any::<u8>(), 0..300), tid in 0u8..32) {
            let mut rx = Reassembler::default();
            let transfer = last_ok(feed(&mut rx, frames(tid, &payload), 5));
            prop_assert_eq!(transfer.payload, payload);
            prop_assert_eq!(transfer.timestamp_us, 5);
        }
    }
}
