//! L2CAP channel shim
//!
//! [`L2capShim`] sits between upper-layer services and the transport engine:
//! - Service registration and unregistration
//! - Channel origination and acceptance
//! - Configuration and disconnection requests
//! - Routing of data and closure events to the owning service

use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, error, info, warn};

use super::channel::ChannelTable;
use super::constants::*;
use super::engine::{
    pending_operation, ChannelClosedCallback, DataReadyCallback, InboundConnectionCallback,
    TransportEngine,
};
use super::psm::{PsmAllocator, PsmRegistry};
use super::types::*;
use crate::gap::BdAddr;

/// Upcalls delivered to a registered service.
///
/// Upcalls run on the caller's thread or on the engine's callback thread and
/// may call back into the shim.
pub trait ServiceCallbacks: Send + Sync {
    /// A remote device opened a channel to the service
    fn on_connect_ind(&self, address: BdAddr, cid: ChannelId, psm: u16, identifier: u8);

    /// Outcome of a connection the service originated
    fn on_connect_cfm(&self, cid: ChannelId, result: ConnectResult);

    fn on_config_ind(&self, cid: ChannelId, config: &ConfigInfo);

    fn on_config_cfm(&self, cid: ChannelId, config: &ConfigInfo);

    fn on_data_ind(&self, cid: ChannelId, message: L2capMessage);

    /// The channel closed without the service asking for it
    fn on_disconnect_ind(&self, cid: ChannelId, response_required: bool);

    /// A disconnect requested by the service completed
    fn on_disconnect_cfm(&self, cid: ChannelId, result: u16);
}

/// Shared handle to a service's upcalls
pub type ServiceHandle = Arc<dyn ServiceCallbacks>;

/// Shim configuration
#[derive(Debug, Clone)]
pub struct ShimConfig {
    /// MTU advertised to the engine when a service registers
    pub mtu: u16,
    /// Prefix of every diagnostic dump line
    pub dump_tag: String,
}

impl Default for ShimConfig {
    fn default() -> Self {
        Self {
            mtu: L2CAP_DEFAULT_SERVICE_MTU,
            dump_tag: DUMP_TAG.to_string(),
        }
    }
}

/// Everything guarded by the shim lock
#[derive(Default)]
struct ShimState {
    classic: PsmRegistry<ServiceHandle>,
    le: PsmRegistry<ServiceHandle>,
    allocator: PsmAllocator,
    channels: ChannelTable,
    client_psms: HashMap<u16, u16>,
}

impl ShimState {
    fn registry(&self, transport: ConnectionType) -> &PsmRegistry<ServiceHandle> {
        match transport {
            ConnectionType::Classic => &self.classic,
            ConnectionType::LE => &self.le,
        }
    }

    fn registry_mut(&mut self, transport: ConnectionType) -> &mut PsmRegistry<ServiceHandle> {
        match transport {
            ConnectionType::Classic => &mut self.classic,
            ConnectionType::LE => &mut self.le,
        }
    }

    /// Handler of the service owning `cid`, if both still exist
    fn owner_of(&self, cid: ChannelId) -> Option<(u16, Option<ServiceHandle>)> {
        let psm = self.channels.get(cid)?;
        Some((psm, self.classic.get(psm).cloned()))
    }
}

struct ShimInner {
    engine: Arc<dyn TransportEngine>,
    config: ShimConfig,
    state: Mutex<ShimState>,
}

/// Connection coordinator bridging services onto the transport engine.
///
/// Cheap to clone; clones share the same tables.
#[derive(Clone)]
pub struct L2capShim {
    inner: Arc<ShimInner>,
}

impl L2capShim {
    /// Create a shim driving `engine` with the default configuration
    pub fn new(engine: Arc<dyn TransportEngine>) -> Self {
        Self::with_config(engine, ShimConfig::default())
    }

    pub fn with_config(engine: Arc<dyn TransportEngine>, config: ShimConfig) -> Self {
        Self {
            inner: Arc::new(ShimInner {
                engine,
                config,
                state: Mutex::new(ShimState::default()),
            }),
        }
    }

    pub fn config(&self) -> &ShimConfig {
        &self.inner.config
    }

    /// Register a classic service on `psm` and block until the engine listens.
    ///
    /// # Panics
    ///
    /// Panics if `psm` already has a registered service.
    pub fn register_service(
        &self,
        psm: u16,
        callbacks: ServiceHandle,
        enable_snoop: bool,
        ertm_info: Option<&ErtmInfo>,
    ) {
        if let Err(e) = self.try_register_service(psm, callbacks, enable_snoop, ertm_info) {
            error!("Failed to register service on psm:0x{:04x}: {}", psm, e);
        }
    }

    /// [`L2capShim::register_service`] reporting a dropped engine completion.
    /// The registration is rolled back in that case.
    pub fn try_register_service(
        &self,
        psm: u16,
        callbacks: ServiceHandle,
        enable_snoop: bool,
        ertm_info: Option<&ErtmInfo>,
    ) -> L2capResult<()> {
        debug!("Registering service on psm:0x{:04x}", psm);

        if !enable_snoop {
            warn!("Cannot disable snooping on psm:0x{:04x}", psm);
        }
        let was_reserved = {
            let mut state = self.inner.lock_state();
            let was_reserved = state.classic.is_registered(psm);
            state.classic.register(psm, Some(callbacks));
            was_reserved
        };

        let mode = ChannelMode::from_preference(ertm_info);
        let (completion, pending) = pending_operation();
        let weak = Arc::downgrade(&self.inner);
        let on_connection: InboundConnectionCallback = Arc::new(move |address, psm, cid| {
            if let Some(inner) = weak.upgrade() {
                inner.on_remote_connection(address, psm, cid);
            }
        });
        self.inner
            .engine
            .register_service(psm, mode, self.inner.config.mtu, on_connection, completion);

        if pending.wait().is_none() {
            let mut state = self.inner.lock_state();
            if state.classic.is_registered(psm) {
                state.classic.unregister(psm);
            }
            if was_reserved {
                state.classic.reserve(psm);
            }
            return Err(L2capError::EngineDropped("registration"));
        }
        debug!("Successfully registered service on psm:0x{:04x} mode:{:?}", psm, mode);
        Ok(())
    }

    /// Stop serving `psm`. Unknown PSMs are logged and ignored.
    pub fn unregister_service(&self, psm: u16) {
        {
            let state = self.inner.lock_state();
            if !state.classic.has_handler(psm) {
                warn!("Service must be registered in order to unregister psm:0x{:04x}", psm);
                return;
            }
            for cid in state.channels.cids_for(psm) {
                warn!(
                    "Unregistering service with active channels psm:0x{:04x} cid:0x{:04x}",
                    psm, cid
                );
            }
        }

        debug!("Unregistering service on psm:0x{:04x}", psm);
        self.inner.engine.unregister_service(psm);

        let mut state = self.inner.lock_state();
        if state.classic.is_registered(psm) {
            state.classic.unregister(psm);
        }
    }

    /// Open a channel to `address` on `psm`, blocking until the engine
    /// answers. Returns the new CID, or [`INVALID_CID`] on failure.
    pub fn connect(&self, psm: u16, address: BdAddr) -> ChannelId {
        match self.try_connect(psm, address) {
            Ok(cid) => cid,
            Err(e) => {
                warn!("{}", e);
                INVALID_CID
            }
        }
    }

    pub fn try_connect(&self, psm: u16, address: BdAddr) -> L2capResult<ChannelId> {
        let handler = self
            .inner
            .lock_state()
            .classic
            .get(psm)
            .cloned()
            .ok_or(L2capError::PsmNotRegistered(psm))?;

        debug!(
            "Starting local initiated connection to psm:0x{:04x} address:{}",
            psm, address
        );
        let (completion, pending) = pending_operation();
        self.inner.engine.open_channel(psm, address, completion);

        let cid = pending.wait().unwrap_or(INVALID_CID);
        if cid == INVALID_CID {
            handler.on_connect_cfm(INVALID_CID, ConnectResult::Failed);
            return Err(L2capError::ConnectionFailed { psm, address });
        }

        debug!(
            "Successfully connected to psm:0x{:04x} address:{} cid:0x{:04x}",
            psm, address, cid
        );
        self.inner.lock_state().channels.insert(cid, psm);
        self.inner.set_downstream_callbacks(cid);
        handler.on_connect_cfm(cid, ConnectResult::Success);
        Ok(cid)
    }

    /// Hand `data` to the engine for `cid`
    pub fn write(&self, cid: ChannelId, data: &[u8]) -> bool {
        match self.try_write(cid, data) {
            Ok(()) => true,
            Err(e) => {
                debug!("Dropping write: {}", e);
                false
            }
        }
    }

    pub fn try_write(&self, cid: ChannelId, data: &[u8]) -> L2capResult<()> {
        if !self.connection_exists(cid) {
            return Err(L2capError::ChannelNotFound(cid));
        }
        if data.is_empty() {
            return Err(L2capError::EmptyPayload(cid));
        }
        debug!("Writing data cid:0x{:04x} len:{}", cid, data.len());
        self.inner.engine.write(cid, data);
        Ok(())
    }

    /// Answer to a connect indication. The engine has already accepted the
    /// channel, so there is nothing to send.
    pub fn connect_response(
        &self,
        address: BdAddr,
        identifier: u8,
        cid: ChannelId,
        result: u16,
        status: u16,
    ) -> bool {
        debug!(
            "Dropping connect response for {} id:{} cid:0x{:04x} result:{} status:{}, channel is already connected",
            address, identifier, cid, result, status
        );
        true
    }

    /// Configure `cid`. Parameters are not negotiated: the service is told,
    /// from the engine's context, that both directions were accepted as is.
    pub fn config_request(&self, cid: ChannelId, config: &ConfigInfo) -> bool {
        match self.try_config_request(cid, config) {
            Ok(()) => true,
            Err(e) => {
                warn!("Rejecting config request: {}", e);
                false
            }
        }
    }

    pub fn try_config_request(&self, cid: ChannelId, config: &ConfigInfo) -> L2capResult<()> {
        info!(
            "Received config request from upper layer cid:0x{:04x} options:{:?}",
            cid,
            config.present()
        );
        if !self.connection_exists(cid) {
            return Err(L2capError::ChannelNotFound(cid));
        }

        let weak = Arc::downgrade(&self.inner);
        self.inner.engine.run_deferred(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.on_config_complete(cid);
            }
        }));
        Ok(())
    }

    pub fn config_response(&self, cid: ChannelId, _config: &ConfigInfo) -> bool {
        debug!(
            "Dropping config response cid:0x{:04x}, channel is already open",
            cid
        );
        true
    }

    /// Ask the engine to close `cid`; the service hears about it through a
    /// disconnect confirmation once the engine reports the closure.
    pub fn disconnect_request(&self, cid: ChannelId) -> bool {
        match self.try_disconnect_request(cid) {
            Ok(()) => true,
            Err(e) => {
                warn!("Rejecting disconnect request: {}", e);
                false
            }
        }
    }

    pub fn try_disconnect_request(&self, cid: ChannelId) -> L2capResult<()> {
        {
            let mut state = self.inner.lock_state();
            if !state.channels.exists(cid) {
                return Err(L2capError::ChannelNotFound(cid));
            }
            if state.channels.is_closing(cid) {
                return Err(L2capError::ChannelClosing(cid));
            }
            state.channels.mark_closing(cid);
        }
        debug!("Closing channel cid:0x{:04x}", cid);
        self.inner.engine.close_channel(cid);
        Ok(())
    }

    pub fn disconnect_response(&self, cid: ChannelId) -> bool {
        debug!(
            "Dropping disconnect response cid:0x{:04x}, channel is already disconnected",
            cid
        );
        true
    }

    pub fn connection_exists(&self, cid: ChannelId) -> bool {
        self.inner.lock_state().channels.exists(cid)
    }

    /// PSM owning `cid`, if the channel is open
    pub fn channel_psm(&self, cid: ChannelId) -> Option<u16> {
        self.inner.lock_state().channels.get(cid)
    }

    pub fn channel_state(&self, cid: ChannelId) -> L2capChannelState {
        self.inner.lock_state().channels.state(cid)
    }

    /// Next free dynamic PSM for `transport`. Nothing is reserved.
    pub fn allocate_psm(&self, transport: ConnectionType) -> L2capResult<u16> {
        let mut guard = self.inner.lock_state();
        let state = &mut *guard;
        match transport {
            ConnectionType::Classic => state.allocator.next_classic_dynamic(&state.classic),
            ConnectionType::LE => state.allocator.next_le_dynamic(&state.le),
        }
    }

    /// Claim `psm` on `transport` without binding a service.
    ///
    /// # Panics
    ///
    /// Panics if a service is already registered on `psm`.
    pub fn reserve_psm(&self, transport: ConnectionType, psm: u16) {
        self.inner.lock_state().registry_mut(transport).reserve(psm);
    }

    /// # Panics
    ///
    /// Panics if `psm` is not registered on `transport`.
    pub fn release_psm(&self, transport: ConnectionType, psm: u16) {
        self.inner.lock_state().registry_mut(transport).unregister(psm);
    }

    pub fn is_psm_registered(&self, transport: ConnectionType, psm: u16) -> bool {
        self.inner.lock_state().registry(transport).is_registered(psm)
    }

    /// Real PSM to register for `client_psm`.
    ///
    /// Outgoing-only connections get a fresh virtual PSM each, remembered
    /// until [`L2capShim::remove_client_psm`].
    pub fn convert_client_to_real_psm(
        &self,
        client_psm: u16,
        is_outgoing_only: bool,
    ) -> L2capResult<u16> {
        if !is_outgoing_only {
            return Ok(client_psm);
        }

        let mut guard = self.inner.lock_state();
        let state = &mut *guard;
        let real_psm = state.allocator.next_virtual(client_psm, &state.classic)?;
        if real_psm != client_psm {
            debug!(
                "Mapping client psm:0x{:04x} to virtual psm:0x{:04x}",
                client_psm, real_psm
            );
            state.client_psms.insert(client_psm, real_psm);
        }
        Ok(real_psm)
    }

    /// Real PSM recorded for `client_psm`, or `client_psm` itself
    pub fn real_psm_for(&self, client_psm: u16) -> u16 {
        self.inner
            .lock_state()
            .client_psms
            .get(&client_psm)
            .copied()
            .unwrap_or(client_psm)
    }

    pub fn remove_client_psm(&self, client_psm: u16) {
        self.inner.lock_state().client_psms.remove(&client_psm);
    }

    /// Write one line per open channel to `out`
    pub fn dump<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let channels: Vec<(ChannelId, u16)> = self.inner.lock_state().channels.iter().collect();
        let tag = &self.inner.config.dump_tag;

        if channels.is_empty() {
            return writeln!(out, "{} No active l2cap channels", tag);
        }
        for (cid, psm) in channels {
            writeln!(
                out,
                "{} active l2cap channel cid:0x{:04x} psm:0x{:04x}",
                tag, cid, psm
            )?;
        }
        Ok(())
    }
}

impl ShimInner {
    fn lock_state(&self) -> MutexGuard<'_, ShimState> {
        self.state.lock().expect("l2cap shim state poisoned")
    }

    fn on_remote_connection(self: &Arc<Self>, address: BdAddr, psm: u16, cid: ChannelId) {
        debug!(
            "Sending connection indicator to upper stack from device:{} psm:0x{:04x} cid:0x{:04x}",
            address, psm, cid
        );

        let handler = {
            let mut state = self.lock_state();
            assert!(
                !state.channels.exists(cid),
                "cid 0x{:04x} is already open (psm 0x{:04x})",
                cid,
                state.channels.psm_of(cid)
            );
            let handler = state.classic.get(psm).cloned();
            if handler.is_some() {
                state.channels.insert(cid, psm);
            }
            handler
        };
        let Some(handler) = handler else {
            warn!(
                "Closing inbound channel cid:0x{:04x} on psm:0x{:04x} with no service",
                cid, psm
            );
            self.engine.close_channel(cid);
            return;
        };

        self.set_downstream_callbacks(cid);
        handler.on_connect_ind(address, cid, psm, UNUSED_SIGNAL_ID);
    }

    fn set_downstream_callbacks(self: &Arc<Self>, cid: ChannelId) {
        let weak = Arc::downgrade(self);
        let on_data: DataReadyCallback = Box::new(move |cid, data| {
            if let Some(inner) = weak.upgrade() {
                inner.on_data_ready(cid, data);
            }
        });
        self.engine.set_data_callback(cid, on_data);

        let weak = Arc::downgrade(self);
        let on_closed: ChannelClosedCallback = Box::new(move |cid, error_code| {
            if let Some(inner) = weak.upgrade() {
                inner.on_channel_closed(cid, error_code);
            }
        });
        self.engine.set_closed_callback(cid, on_closed);
    }

    fn on_data_ready(&self, cid: ChannelId, data: Vec<u8>) {
        debug!("OnDataReady cid:0x{:04x} len:{}", cid, data.len());

        let owner = self.lock_state().owner_of(cid);
        match owner {
            Some((_, Some(handler))) => handler.on_data_ind(cid, L2capMessage::new(data)),
            Some((psm, None)) => {
                warn!(
                    "Dropping data for cid:0x{:04x}, psm:0x{:04x} has no service",
                    cid, psm
                );
            }
            None => warn!("Dropping data for unknown cid:0x{:04x}", cid),
        }
    }

    fn on_channel_closed(&self, cid: ChannelId, error_code: i32) {
        debug!("OnChannel closed callback cid:0x{:04x} error:{}", cid, error_code);

        let (psm, handler, closing) = {
            let mut state = self.lock_state();
            if !state.channels.claim_closure(cid) {
                warn!("Unexpected channel closure cid:0x{:04x}", cid);
                return;
            }
            let psm = state.channels.psm_of(cid);
            (psm, state.classic.get(psm).cloned(), state.channels.is_closing(cid))
        };

        match handler {
            Some(handler) if closing => handler.on_disconnect_cfm(cid, UNUSED_RESULT),
            Some(handler) => handler.on_disconnect_ind(cid, DISCONNECT_RESPONSE_REQUIRED),
            None => warn!(
                "Channel cid:0x{:04x} closed after psm:0x{:04x} lost its service",
                cid, psm
            ),
        }

        self.lock_state().channels.remove(cid);
    }

    fn on_config_complete(&self, cid: ChannelId) {
        let owner = self.lock_state().owner_of(cid);
        let handler = match owner {
            Some((_, Some(handler))) => handler,
            Some((psm, None)) => {
                warn!(
                    "Dropping config result for cid:0x{:04x}, psm:0x{:04x} has no service",
                    cid, psm
                );
                return;
            }
            None => {
                warn!("Channel cid:0x{:04x} closed before configuration completed", cid);
                return;
            }
        };

        let config = ConfigInfo::accepted();
        handler.on_config_cfm(cid, &config);
        handler.on_config_ind(cid, &config);
    }
}
