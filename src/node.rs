//! A node on the bus: publishes messages, calls and serves services, and turns received frames
//! into transfers.
//!
//! All methods take `&self`; internal state sits behind mutexes, so a node can be shared
//! between the thread that feeds it frames and the ones that send.

use std::{
    collections::HashMap,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use log::{debug, trace, warn};
use parking_lot::{Mutex, MutexGuard};
use tokio::sync::oneshot;

use crate::{
    codec,
    config::NodeConfig,
    dsdl::CompositeType,
    error::{NodeError, RxError, TxError},
    messages::MsgType,
    protocol::{
        CanFrame, MsgPriority, RequestResponse, ServiceData, TransferDescriptor, TransferId,
        TransferType,
    },
    registry::{DataTypeKind, RegisteredType, TypeRegistry},
    rx::{Reassembler, Transfer},
    transport::FrameTransport,
    tx::{self, TxQueue},
    value::{DsdlObject, Record},
};

/// Outgoing transfer ID counters are kept per data type, transfer type and destination.
type TransferIdKey = (u16, TransferType, u8);
/// A pending request is matched by the descriptor of the response it expects, and the
/// request's transfer ID.
type PendingKey = (TransferDescriptor, TransferId);
type ResponseSender = oneshot::Sender<Result<Transfer, NodeError>>;

/// Resolves to the response of a service request.
///
/// Resolves to `NodeError::Cancelled` if the request is cancelled, replaced by a newer request
/// with the same transfer ID, or if the node is dropped. There's no built-in timeout.
#[derive(Debug)]
pub struct ResponseTicket {
    key: PendingKey,
    rx: oneshot::Receiver<Result<Transfer, NodeError>>,
}

impl ResponseTicket {
    pub fn transfer_id(&self) -> TransferId {
        self.key.1
    }

    /// The node expected to respond.
    pub fn server_node_id(&self) -> u8 {
        self.key.0.source_node_id
    }
}

impl Future for ResponseTicket {
    type Output = Result<Transfer, NodeError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // Sender dropped without a response.
            Poll::Ready(Err(_)) => Poll::Ready(Err(NodeError::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

pub struct Node<T: FrameTransport> {
    config: NodeConfig,
    registry: Arc<TypeRegistry>,
    transport: Mutex<T>,
    rx: Mutex<Reassembler>,
    tx_queue: Mutex<TxQueue>,
    transfer_ids: Mutex<HashMap<TransferIdKey, TransferId>>,
    pending: Mutex<HashMap<PendingKey, ResponseSender>>,
}

impl<T: FrameTransport> Node<T> {
    pub fn new(config: NodeConfig, registry: Arc<TypeRegistry>, transport: T) -> Result<Self, NodeError> {
        config.validate()?;

        Ok(Self {
            rx: Mutex::new(Reassembler::new(&config)),
            config,
            registry,
            transport: Mutex::new(transport),
            tx_queue: Mutex::new(TxQueue::new()),
            transfer_ids: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn node_id(&self) -> u8 {
        self.config.node_id
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Direct access to the transport, eg to inject or collect frames.
    pub fn transport(&self) -> MutexGuard<'_, T> {
        self.transport.lock()
    }

    fn lookup(&self, full_name: &str) -> Result<&RegisteredType, NodeError> {
        self.registry
            .by_name(full_name)
            .ok_or_else(|| NodeError::UnknownType(full_name.to_owned()))
    }

    fn lookup_id(&self, kind: DataTypeKind, id: u16) -> Result<&RegisteredType, NodeError> {
        self.registry
            .by_id(kind, id)
            .ok_or_else(|| NodeError::UnknownType(format!("{kind:?} {id}")))
    }

    /// The transfer ID to use next for this stream, advancing the counter.
    fn next_transfer_id(&self, key: TransferIdKey) -> TransferId {
        let mut ids = self.transfer_ids.lock();
        let tid = ids.entry(key).or_default();
        let result = *tid;
        tid.increment();
        result
    }

    /// Broadcast a message at the configured default priority.
    pub fn publish(&self, full_name: &str, record: &Record) -> Result<(), NodeError> {
        self.publish_with_priority(full_name, record, self.config.default_priority)
    }

    pub fn publish_with_priority(
        &self,
        full_name: &str,
        record: &Record,
        priority: MsgPriority,
    ) -> Result<(), NodeError> {
        let entry = self.lookup(full_name)?;
        let schema = entry
            .as_message()
            .ok_or_else(|| NodeError::NotAMessage(full_name.to_owned()))?;

        let payload = codec::encode(record, schema)?;
        let tid = self.next_transfer_id((entry.id, TransferType::Message, 0));
        let frames = tx::broadcast(
            entry.signature,
            entry.id,
            tid,
            self.config.node_id,
            priority,
            &payload,
        )?;

        trace!("Publishing {} ({} bytes)", full_name, payload.len());
        self.tx_queue.lock().extend(frames);
        self.flush()?;
        Ok(())
    }

    /// Broadcast a typed message. Standard types go out at their usual priority, anything
    /// else at the configured default.
    pub fn publish_object<O: DsdlObject>(&self, obj: &O) -> Result<(), NodeError> {
        let priority = self.priority_for(O::FULL_NAME);
        self.publish_with_priority(O::FULL_NAME, &obj.to_record(), priority)
    }

    fn priority_for(&self, full_name: &str) -> MsgPriority {
        MsgType::from_full_name(full_name)
            .map(|t| t.priority())
            .unwrap_or(self.config.default_priority)
    }

    /// Send a service request to `dest_node_id`. The returned ticket resolves to the response
    /// transfer once it arrives through [`handle_frame`](Self::handle_frame) or
    /// [`poll`](Self::poll).
    pub fn request(&self, full_name: &str, dest_node_id: u8, record: &Record) -> Result<ResponseTicket, NodeError> {
        self.request_with_priority(full_name, dest_node_id, record, self.config.default_priority)
    }

    pub fn request_with_priority(
        &self,
        full_name: &str,
        dest_node_id: u8,
        record: &Record,
        priority: MsgPriority,
    ) -> Result<ResponseTicket, NodeError> {
        if self.config.is_anonymous() {
            return Err(TxError::AnonymousService.into());
        }

        let entry = self.lookup(full_name)?;
        let schema = entry
            .as_service()
            .ok_or_else(|| NodeError::NotAService(full_name.to_owned()))?;

        let payload = codec::encode(record, schema.request())?;
        let tid = self.next_transfer_id((entry.id, TransferType::ServiceRequest, dest_node_id));
        let service_data = ServiceData {
            dest_node_id,
            req_or_resp: RequestResponse::Request,
        };
        let frames = tx::service(
            entry.signature,
            entry.id,
            tid,
            self.config.node_id,
            service_data,
            priority,
            &payload,
        )?;

        let response = TransferDescriptor {
            data_type_id: entry.id,
            transfer_type: TransferType::ServiceResponse,
            source_node_id: dest_node_id,
            dest_node_id: self.config.node_id,
        };
        let key = (response, tid);

        let (sender, receiver) = oneshot::channel();
        if self.pending.lock().insert(key, sender).is_some() {
            warn!("Replacing pending request {:?} with a newer one", key);
        }

        self.tx_queue.lock().extend(frames);
        if let Err(e) = self.flush() {
            self.pending.lock().remove(&key);
            return Err(e);
        }

        Ok(ResponseTicket { key, rx: receiver })
    }

    pub fn request_object<O: DsdlObject>(&self, dest_node_id: u8, obj: &O) -> Result<ResponseTicket, NodeError> {
        let priority = self.priority_for(O::FULL_NAME);
        self.request_with_priority(O::FULL_NAME, dest_node_id, &obj.to_record(), priority)
    }

    /// Answer a received request. The response reuses the request's transfer ID and priority.
    pub fn respond(&self, request: &Transfer, record: &Record) -> Result<(), NodeError> {
        let descriptor = &request.descriptor;
        if descriptor.transfer_type != TransferType::ServiceRequest {
            return Err(NodeError::NotAService(format!(
                "{:?} transfer",
                descriptor.transfer_type
            )));
        }

        let entry = self.lookup_id(DataTypeKind::Service, descriptor.data_type_id)?;
        let schema = entry
            .as_service()
            .ok_or_else(|| NodeError::NotAService(entry.full_name().to_owned()))?;

        let payload = codec::encode(record, schema.response())?;
        let service_data = ServiceData {
            dest_node_id: descriptor.source_node_id,
            req_or_resp: RequestResponse::Response,
        };
        let frames = tx::service(
            entry.signature,
            entry.id,
            request.transfer_id,
            self.config.node_id,
            service_data,
            request.priority,
            &payload,
        )?;

        self.tx_queue.lock().extend(frames);
        self.flush()?;
        Ok(())
    }

    pub fn respond_object<O: DsdlObject>(&self, request: &Transfer, obj: &O) -> Result<(), NodeError> {
        self.respond(request, &obj.to_record())
    }

    /// Hand queued frames to the transport, highest priority first, until it would block.
    /// Returns the number of frames sent.
    pub fn flush(&self) -> Result<usize, NodeError> {
        let mut queue = self.tx_queue.lock();
        let mut transport = self.transport.lock();
        let mut sent = 0;

        while let Some(frame) = queue.peek() {
            match transport.transmit(frame) {
                Ok(()) => {
                    queue.pop();
                    sent += 1;
                }
                Err(nb::Error::WouldBlock) => break,
                Err(nb::Error::Other(e)) => {
                    warn!("Frame transmit failed: {:?}", e);
                    return Err(NodeError::Transport(format!("{e:?}")));
                }
            }
        }

        Ok(sent)
    }

    /// Frames waiting for the transport.
    pub fn queued_frames(&self) -> usize {
        self.tx_queue.lock().len()
    }

    /// The schema of a transfer's payload.
    fn schema_for(&self, descriptor: &TransferDescriptor) -> Result<Arc<CompositeType>, NodeError> {
        let entry = self.lookup_id(descriptor.transfer_type.kind(), descriptor.data_type_id)?;

        let schema = match (descriptor.transfer_type, entry.as_message(), entry.as_service()) {
            (TransferType::Message, Some(m), _) => m.clone(),
            (TransferType::ServiceRequest, _, Some(s)) => s.request().clone(),
            (TransferType::ServiceResponse, _, Some(s)) => s.response().clone(),
            _ => return Err(NodeError::UnknownType(entry.full_name().to_owned())),
        };
        Ok(schema)
    }

    /// Decode a received transfer against its registered type.
    pub fn decode(&self, transfer: &Transfer) -> Result<Record, NodeError> {
        let schema = self.schema_for(&transfer.descriptor)?;
        Ok(codec::decode(&transfer.payload, &schema)?)
    }

    pub fn decode_object<O: DsdlObject>(&self, transfer: &Transfer) -> Result<O, NodeError> {
        Ok(O::from_record(&self.decode(transfer)?)?)
    }

    /// Whether this node receives a transfer: its type must be registered, and service
    /// transfers must be addressed to us.
    fn accept(&self, descriptor: &TransferDescriptor) -> Option<u64> {
        if descriptor.transfer_type != TransferType::Message
            && (self.config.is_anonymous() || descriptor.dest_node_id != self.config.node_id)
        {
            return None;
        }
        self.registry
            .signature(descriptor.transfer_type.kind(), descriptor.data_type_id)
    }

    /// Process one received frame. Returns messages and requests as they complete. Responses
    /// to our own requests go to their tickets instead; unsolicited ones are returned.
    pub fn handle_frame(&self, frame: CanFrame, timestamp_us: u64) -> Result<Option<Transfer>, RxError> {
        let completed = {
            let mut rx = self.rx.lock();
            rx.sweep(timestamp_us);
            rx.process_frame(frame, timestamp_us, &|d: &TransferDescriptor| self.accept(d))?
        };

        let Some(transfer) = completed else {
            return Ok(None);
        };

        if transfer.descriptor.transfer_type == TransferType::ServiceResponse {
            let key = (transfer.descriptor, transfer.transfer_id);
            if let Some(sender) = self.pending.lock().remove(&key) {
                if sender.send(Ok(transfer)).is_err() {
                    debug!("Response to {:?} arrived after its ticket was dropped", key);
                }
                return Ok(None);
            }
        }

        Ok(Some(transfer))
    }

    /// Drain the transport's receive side. Protocol errors are returned alongside transfers
    /// rather than aborting the drain.
    pub fn poll(&self) -> Result<Vec<Result<Transfer, RxError>>, NodeError> {
        let mut result = Vec::new();

        loop {
            // Don't hold the transport while processing.
            let received = self.transport.lock().receive();
            match received {
                Ok((frame, timestamp_us)) => match self.handle_frame(frame, timestamp_us) {
                    Ok(Some(transfer)) => result.push(Ok(transfer)),
                    Ok(None) => (),
                    Err(e) => result.push(Err(e)),
                },
                Err(nb::Error::WouldBlock) => break,
                Err(nb::Error::Other(e)) => {
                    warn!("Frame receive failed: {:?}", e);
                    return Err(NodeError::Transport(format!("{e:?}")));
                }
            }
        }

        Ok(result)
    }

    /// Drop stale partial transfers. Rate limited by the configured sweep interval.
    pub fn sweep(&self, now_us: u64) -> usize {
        self.rx.lock().sweep(now_us)
    }

    /// Cancel a pending request; its ticket resolves to `Cancelled`. Returns false if it
    /// already completed.
    pub fn cancel(&self, ticket: &ResponseTicket) -> bool {
        self.pending.lock().remove(&ticket.key).is_some()
    }

    pub fn cancel_all(&self) -> usize {
        let mut pending = self.pending.lock();
        let count = pending.len();
        pending.clear();
        count
    }

    pub fn pending_requests(&self) -> usize {
        self.pending.lock().len()
    }
}

impl<T: FrameTransport> Drop for Node<T> {
    fn drop(&mut self) {
        let cancelled = self.cancel_all();
        if cancelled > 0 {
            debug!("Node dropped with {} pending request(s)", cancelled);
        }
    }
}
