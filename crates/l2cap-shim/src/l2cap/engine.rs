//! Transport engine boundary
//!
//! The engine owns framing, retransmission and the physical link. The shim
//! drives it through [`TransportEngine`] and hears back through callbacks and
//! one-shot [`Completion`]s, delivered on whatever thread the engine uses.

use std::sync::Arc;

use crossbeam::channel::{bounded, Receiver, Sender};
use log::debug;

use super::types::{ChannelId, ChannelMode};
use crate::gap::BdAddr;

/// Inbound connection on a registered PSM: `(remote address, psm, cid)`
pub type InboundConnectionCallback = Arc<dyn Fn(BdAddr, u16, ChannelId) + Send + Sync + 'static>;

/// Payload received on an open channel
pub type DataReadyCallback = Box<dyn Fn(ChannelId, Vec<u8>) + Send + Sync + 'static>;

/// Channel closed, with the engine's error code
pub type ChannelClosedCallback = Box<dyn Fn(ChannelId, i32) + Send + Sync + 'static>;

/// Work the engine runs later on its own context
pub type DeferredTask = Box<dyn FnOnce() + Send + 'static>;

/// Capabilities the shim consumes from the transport engine.
///
/// Every method returns promptly; results arrive through the supplied
/// callbacks and completions.
pub trait TransportEngine: Send + Sync {
    /// Start listening on `psm`; fulfil `completion` once listening
    fn register_service(
        &self,
        psm: u16,
        mode: ChannelMode,
        mtu: u16,
        on_connection: InboundConnectionCallback,
        completion: Completion<()>,
    );

    /// Stop listening on `psm`
    fn unregister_service(&self, psm: u16);

    /// Open a channel to `address`; fulfil `completion` with the new CID, or
    /// with [`INVALID_CID`](super::constants::INVALID_CID) on failure
    fn open_channel(&self, psm: u16, address: BdAddr, completion: Completion<ChannelId>);

    /// Close an open channel; closure is reported through the closed callback
    fn close_channel(&self, cid: ChannelId);

    fn write(&self, cid: ChannelId, data: &[u8]);

    fn set_data_callback(&self, cid: ChannelId, callback: DataReadyCallback);

    fn set_closed_callback(&self, cid: ChannelId, callback: ChannelClosedCallback);

    /// Run `task` later from the engine's own context
    fn run_deferred(&self, task: DeferredTask);
}

/// Producer half of a pending operation, handed to the engine
#[derive(Debug)]
pub struct Completion<T> {
    sender: Sender<T>,
}

impl<T> Completion<T> {
    /// Fulfil the operation. Consumes the completion, so it fires at most once.
    pub fn complete(self, value: T) {
        if self.sender.send(value).is_err() {
            debug!("Completion fired after its waiter went away");
        }
    }
}

/// Consumer half of a pending operation, kept by the caller
#[derive(Debug)]
pub struct PendingOperation<T> {
    receiver: Receiver<T>,
}

impl<T> PendingOperation<T> {
    /// Block until the engine fulfils the matching [`Completion`].
    ///
    /// Returns `None` if the completion was dropped unfulfilled. There is no
    /// timeout.
    pub fn wait(self) -> Option<T> {
        self.receiver.recv().ok()
    }
}

/// One-shot rendezvous between a caller and the engine
pub fn pending_operation<T>() -> (Completion<T>, PendingOperation<T>) {
    let (sender, receiver) = bounded(1);
    (Completion { sender }, PendingOperation { receiver })
}
