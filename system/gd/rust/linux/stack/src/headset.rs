//! Anything related to the Hands-Free Profile Audio Gateway API (IBluetoothHeadset).

mod active_device;
mod audio_mode;

use log::{debug, error, info, warn};
use std::collections::HashMap;
use tokio::sync::mpsc::Sender;

use crate::address::RawAddress;
use crate::callbacks::Callbacks;
use crate::config::HfpConfig;
use crate::native::{HfpNative, HfpStackEvent};
use crate::registry::{BondedDevice, SessionRegistry};
use crate::session::{
    AudioPolicyValue, BthfAudioState, BthfConnectionState, CallAudioPolicy, SessionFactory,
    SessionMessage,
};
use crate::status::HfpStatus;
use crate::system::{CallState, HeadsetCallState, HfpSystem, PhoneState};
use crate::timeout::{PendingEvent, TimeoutKind, TimeoutScheduler};
use crate::{Message, RPCProxy};

/// Reports posted into the dispatch loop by device sessions and timers.
#[derive(Debug)]
pub enum HfpActions {
    ConnectionStateChanged(RawAddress, BthfConnectionState, BthfConnectionState),
    AudioStateChanged(RawAddress, BthfAudioState, BthfAudioState),
    /// The device asked to bring up SCO itself.
    ScoRequested(RawAddress),
    DialOutgoingCall(RawAddress, String),
    StartVoiceRecognitionByHeadset(RawAddress),
    StopVoiceRecognitionByHeadset(RawAddress),
    AnswerCall(RawAddress),
    HangupCall(RawAddress),
    CallAudioPolicyChanged(RawAddress),
    DeviceBonded(BondedDevice),
    BondRemoved(RawAddress),
    DialingOutTimeout(u64),
    VoiceRecognitionTimeout(u64),
}

#[derive(Debug, Default, FromPrimitive, ToPrimitive, PartialEq, Eq, Clone, Copy)]
#[repr(u32)]
pub enum ConnectionPolicy {
    #[default]
    Unknown = 0,
    Forbidden,
    Allowed,
}

/// Observers of the Audio Gateway.
pub trait IHeadsetCallback: RPCProxy {
    fn on_connection_state_changed(&mut self, addr: RawAddress, state: BthfConnectionState);

    fn on_audio_state_changed(&mut self, addr: RawAddress, state: BthfAudioState);

    /// The active device changed. `None` means there is no active device any more.
    fn on_active_device_changed(&mut self, addr: Option<RawAddress>);
}

/// Control API of the Audio Gateway.
pub trait IBluetoothHeadset {
    /// Adds an observer. Returns the id to unregister it with.
    fn register_callback(&mut self, callback: Box<dyn IHeadsetCallback + Send>) -> u32;

    fn unregister_callback(&mut self, callback_id: u32) -> bool;

    /// Initiates a service level connection to a bonded headset.
    fn connect(&mut self, device: RawAddress) -> bool;

    fn disconnect(&mut self, device: RawAddress) -> bool;

    fn get_connected_devices(&self) -> Vec<RawAddress>;

    fn get_devices_matching_connection_states(
        &self,
        states: Vec<BthfConnectionState>,
    ) -> Vec<RawAddress>;

    fn get_connection_state(&self, device: RawAddress) -> BthfConnectionState;

    /// Stores the policy. Allowing connects the device, forbidding disconnects it.
    fn set_connection_policy(&mut self, device: RawAddress, policy: ConnectionPolicy) -> bool;

    fn get_connection_policy(&self, device: RawAddress) -> ConnectionPolicy;

    fn start_voice_recognition(&mut self, device: RawAddress) -> bool;

    fn stop_voice_recognition(&mut self, device: RawAddress) -> bool;

    /// Brings up SCO on the active device.
    fn connect_audio(&mut self) -> HfpStatus;

    fn connect_audio_to(&mut self, device: RawAddress) -> HfpStatus;

    /// Tears down SCO on every device that has it.
    fn disconnect_audio(&mut self) -> HfpStatus;

    fn disconnect_audio_from(&mut self, device: RawAddress) -> HfpStatus;

    fn get_audio_state(&self, device: RawAddress) -> BthfAudioState;

    fn set_active_device(&mut self, device: Option<RawAddress>) -> bool;

    fn get_active_device(&self) -> Option<RawAddress>;

    fn start_sco_using_virtual_voice_call(&mut self) -> bool;

    fn stop_sco_using_virtual_voice_call(&mut self) -> bool;

    fn set_force_sco_audio(&mut self, forced: bool);

    fn get_force_sco_audio(&self) -> bool;

    fn set_audio_route_allowed(&mut self, allowed: bool);

    fn get_audio_route_allowed(&self) -> bool;

    /// Telephony call state update. `is_virtual` marks updates made up for a virtual call.
    #[allow(clippy::too_many_arguments)]
    fn phone_state_changed(
        &mut self,
        num_active: u32,
        num_held: u32,
        call_state: CallState,
        number: String,
        number_type: i32,
        name: String,
        is_virtual: bool,
    );

    fn is_inband_ringing_enabled(&self) -> bool;

    /// Whether any device has SCO up or in transition.
    fn is_audio_on(&self) -> bool;

    fn set_silence_mode(&mut self, device: RawAddress, silence: bool) -> bool;

    fn is_noise_reduction_supported(&self, device: RawAddress) -> bool;

    fn is_voice_recognition_supported(&self, device: RawAddress) -> bool;
}

/// The Audio Gateway coordinator.
///
/// Owners wrap it in `Arc<Mutex<Box<HeadsetService>>>` and feed [`HfpActions`] to it from
/// [`crate::Stack::dispatch`].
pub struct HeadsetService {
    config: HfpConfig,
    native: Box<dyn HfpNative + Send>,
    system: Box<dyn HfpSystem + Send>,
    registry: SessionRegistry,
    callbacks: Callbacks<dyn IHeadsetCallback + Send>,
    scheduler: TimeoutScheduler,
    started: bool,

    active_device: Option<RawAddress>,
    max_connections: usize,
    force_sco_audio: bool,
    audio_route_allowed: bool,
    voice_recognition_started: bool,
    virtual_call_started: bool,
    inband_ringing_runtime_disabled: bool,

    pending_dial_out: Option<PendingEvent>,
    pending_voice_recognition: Option<PendingEvent>,

    connection_policies: HashMap<RawAddress, ConnectionPolicy>,
    phone_state: PhoneState,
}

impl HeadsetService {
    pub fn new(
        config: HfpConfig,
        tx: Sender<Message>,
        factory: Box<dyn SessionFactory + Send>,
        native: Box<dyn HfpNative + Send>,
        system: Box<dyn HfpSystem + Send>,
    ) -> HeadsetService {
        HeadsetService {
            max_connections: config.max_connections.max(1),
            force_sco_audio: config.force_sco_audio,
            config,
            native,
            system,
            registry: SessionRegistry::new(factory, tx.clone()),
            callbacks: Callbacks::new(tx.clone(), Message::HeadsetCallbackDisconnected),
            scheduler: TimeoutScheduler::new(tx),
            started: false,
            active_device: None,
            audio_route_allowed: true,
            voice_recognition_started: false,
            virtual_call_started: false,
            inband_ringing_runtime_disabled: false,
            pending_dial_out: None,
            pending_voice_recognition: None,
            connection_policies: HashMap::new(),
            phone_state: PhoneState::default(),
        }
    }

    /// Brings up the native profile.
    pub fn start(&mut self) {
        if self.started {
            warn!("Headset service already started");
            return;
        }

        // One extra slot lets an incoming connection be seen and rejected.
        let inband = self.is_inband_ringing_enabled();
        self.native.init(self.max_connections.saturating_add(1), inband);
        self.native.set_sco_allowed(self.audio_route_allowed);
        self.started = true;
        info!("Headset service started, max connections {}", self.max_connections);
    }

    /// Resets every mode, cancels the timers and drops all sessions.
    pub fn stop(&mut self) {
        if !self.started {
            return;
        }

        if self.active_device.take().is_some() {
            self.notify_active_device_changed();
        }
        self.inband_ringing_runtime_disabled = false;
        self.force_sco_audio = self.config.force_sco_audio;
        self.audio_route_allowed = true;
        self.max_connections = self.config.max_connections.max(1);
        self.voice_recognition_started = false;
        self.virtual_call_started = false;
        self.pending_dial_out = None;
        if self.pending_voice_recognition.take().is_some()
            && self.system.is_voice_recognition_wake_lock_held()
        {
            self.system.release_voice_recognition_wake_lock();
        }
        self.registry.clear();
        self.native.cleanup();
        self.started = false;
        info!("Headset service stopped");
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_voice_recognition_started(&self) -> bool {
        self.voice_recognition_started
    }

    pub fn is_virtual_call_started(&self) -> bool {
        self.virtual_call_started
    }

    pub fn has_pending_dial_out(&self) -> bool {
        self.pending_dial_out.is_some()
    }

    pub fn has_pending_voice_recognition(&self) -> bool {
        self.pending_voice_recognition.is_some()
    }

    pub fn get_call_audio_policy(&self, device: RawAddress) -> Option<CallAudioPolicy> {
        self.registry.find(&device).map(|s| s.call_audio_policy())
    }

    pub fn handle_action(&mut self, action: HfpActions) {
        match action {
            HfpActions::ConnectionStateChanged(addr, from, to) => {
                self.connection_state_changed(addr, from, to);
            }
            HfpActions::AudioStateChanged(addr, from, to) => {
                self.audio_state_changed(addr, from, to);
            }
            HfpActions::ScoRequested(addr) => {
                self.sco_requested(addr);
            }
            HfpActions::DialOutgoingCall(addr, number) => {
                if !self.dial_outgoing_call(addr, &number) {
                    self.registry.send(&addr, SessionMessage::DialingOutResult(false));
                }
            }
            HfpActions::StartVoiceRecognitionByHeadset(addr) => {
                // Success is only confirmed once the platform starts recognition.
                if !self.start_voice_recognition_by_headset(addr) {
                    self.registry.send(&addr, SessionMessage::VoiceRecognitionResult(false));
                }
            }
            HfpActions::StopVoiceRecognitionByHeadset(addr) => {
                let stopped = self.stop_voice_recognition_by_headset(addr);
                self.registry.send(&addr, SessionMessage::VoiceRecognitionResult(stopped));
            }
            HfpActions::AnswerCall(addr) => {
                self.answer_call(addr);
            }
            HfpActions::HangupCall(addr) => {
                self.hangup_call(addr);
            }
            HfpActions::CallAudioPolicyChanged(addr) => {
                self.call_audio_policy_changed(addr);
            }
            HfpActions::DeviceBonded(device) => {
                self.device_bonded(device);
            }
            HfpActions::BondRemoved(addr) => {
                self.bond_removed(addr);
            }
            HfpActions::DialingOutTimeout(id) => {
                self.dialing_out_timeout(id);
            }
            HfpActions::VoiceRecognitionTimeout(id) => {
                self.voice_recognition_timeout(id);
            }
        }
    }

    pub fn callback_disconnected(&mut self, id: u32) {
        self.callbacks.remove_callback(id);
    }

    /// Routes an event of the native stack to the session of its device.
    ///
    /// A connecting or connected report for an unknown device creates its session. Any other
    /// event for an unknown device is an error.
    pub fn message_from_native(&mut self, event: HfpStackEvent) -> Result<(), HfpStatus> {
        if !self.registry.contains(&event.address) {
            if !event.creates_session() {
                error!("[{}] Native event {:?} without a session", event.address, event.kind);
                return Err(HfpStatus::NoSession);
            }
            self.registry.get_or_create(event.address);
        }

        debug!("[{}] Native event {:?}", event.address, event.kind);
        self.registry.send(&event.address, SessionMessage::StackEvent(event.kind));
        Ok(())
    }

    pub fn device_bonded(&mut self, device: BondedDevice) {
        info!("[{}] Bonded, headset service {}", device.address, device.supports_headset());
        self.registry.add_bonded(device);
    }

    /// Forgets a device. Its session goes away now if it is disconnected, or once it is.
    pub fn bond_removed(&mut self, addr: RawAddress) {
        if !self.registry.remove_bonded(&addr) {
            return;
        }
        self.connection_policies.remove(&addr);
        if self.registry.connection_state(&addr) == BthfConnectionState::Disconnected {
            self.registry.remove(&addr);
        }
    }

    fn connection_state_changed(
        &mut self,
        addr: RawAddress,
        from: BthfConnectionState,
        to: BthfConnectionState,
    ) {
        if !self.registry.contains(&addr) {
            error!("[{}] Connection state report without a session", addr);
            return;
        }
        info!("[{}] Connection state {:?} -> {:?}", addr, from, to);

        if to == BthfConnectionState::Connecting
            || (to == BthfConnectionState::Connected && from != BthfConnectionState::Connecting)
        {
            self.registry.record_connecting(&addr);
        }

        if from != BthfConnectionState::Connected && to == BthfConnectionState::Connected {
            self.update_inband_ringing(addr, true);
            self.activate_on_connect(addr);
        }

        if from == BthfConnectionState::Connected && to != BthfConnectionState::Connected {
            self.update_inband_ringing(addr, false);
            if self.active_device == Some(addr) {
                self.set_active_device(None);
            }
        }

        if to == BthfConnectionState::Disconnected && !self.registry.is_bonded(&addr) {
            self.registry.remove(&addr);
        }

        self.callbacks.for_all_callbacks(|callback| {
            callback.on_connection_state_changed(addr, to);
        });
    }

    fn activate_on_connect(&mut self, addr: RawAddress) {
        if !self.config.activate_on_connect || self.registry.is_silenced(&addr) {
            return;
        }
        let policy = self.registry.find(&addr).map(|s| s.call_audio_policy()).unwrap_or_default();
        if policy.active_device_after_connection == AudioPolicyValue::NotAllowed {
            info!("[{}] Not activating, device policy forbids it", addr);
            return;
        }
        // Do not pull an ongoing audio session away from the current device.
        if self.active_device.is_some() && self.is_audio_on() {
            info!("[{}] Not activating while audio is on", addr);
            return;
        }
        self.set_active_device(Some(addr));
    }

    fn audio_state_changed(&mut self, addr: RawAddress, from: BthfAudioState, to: BthfAudioState) {
        info!("[{}] Audio state {:?} -> {:?}", addr, from, to);

        if from != BthfAudioState::Disconnected && to == BthfAudioState::Disconnected {
            if let Some(active) = self.active_device {
                if active != addr && self.should_persist_audio() {
                    let status = self.connect_audio_to(active);
                    if status != HfpStatus::Success {
                        warn!("[{}] Could not move audio to active device: {:?}", active, status);
                    }
                }
            }
            if self.voice_recognition_started && !self.stop_voice_recognition_by_headset(addr) {
                warn!("[{}] Failed to stop voice recognition after audio went down", addr);
            }
            if self.virtual_call_started && !self.stop_sco_using_virtual_voice_call() {
                warn!("Failed to stop virtual call after audio went down");
            }
            if self.phone_state.is_idle() {
                self.system.set_audio_suspended(false);
            }
        }

        self.callbacks.for_all_callbacks(|callback| {
            callback.on_audio_state_changed(addr, to);
        });
    }

    fn sco_requested(&mut self, addr: RawAddress) {
        let status = self.is_sco_acceptable(addr);
        if status != HfpStatus::Success {
            warn!("[{}] Rejecting SCO request: {:?}", addr, status);
        }
        self.registry.send(&addr, SessionMessage::ScoRequestResult(status));
    }

    fn answer_call(&mut self, addr: RawAddress) {
        let policy = self.registry.find(&addr).map(|s| s.call_audio_policy()).unwrap_or_default();
        if policy.call_establish != AudioPolicyValue::NotAllowed {
            self.set_active_device(Some(addr));
        } else {
            info!("[{}] Answering without activating, device policy", addr);
        }
        self.system.answer_call();
    }

    fn hangup_call(&mut self, addr: RawAddress) {
        if self.virtual_call_started {
            info!("[{}] Hangup ends the virtual call", addr);
            self.stop_sco_using_virtual_voice_call();
        } else {
            self.system.hangup_call();
        }
    }

    fn call_audio_policy_changed(&mut self, addr: RawAddress) {
        if self.registry.connection_state(&addr) == BthfConnectionState::Connected {
            let enabled = self.inband_ringing_for(&addr);
            self.registry.send(&addr, SessionMessage::SetInbandRinging(enabled));
        }
    }

    /// Starts a call the headset asked for. Returns false if the request is refused.
    pub fn dial_outgoing_call(&mut self, addr: RawAddress, number: &str) -> bool {
        if let Some(pending) = &self.pending_dial_out {
            warn!("[{}] Already dialing out for {}", addr, pending.device);
            return false;
        }
        if self.virtual_call_started && !self.stop_sco_using_virtual_voice_call() {
            warn!("[{}] Failed to stop the virtual call before dialing", addr);
            return false;
        }
        if !self.set_active_device(Some(addr)) {
            warn!("[{}] Cannot dial out, failed to make device active", addr);
            return false;
        }
        if !self.system.dial(number) {
            warn!("[{}] Telephony refused to dial", addr);
            return false;
        }

        let timeout = self.config.dialing_out_timeout();
        self.pending_dial_out =
            Some(self.scheduler.schedule(TimeoutKind::DialingOut, addr, timeout));
        true
    }

    fn dialing_out_timeout(&mut self, id: u64) {
        match &self.pending_dial_out {
            Some(pending) if pending.id == id && !pending.is_confirmed() => (),
            _ => {
                debug!("Ignoring stale dialing out timeout {}", id);
                return;
            }
        }
        if let Some(pending) = self.pending_dial_out.take() {
            warn!("[{}] Dialing out timed out", pending.device);
            self.registry.send(&pending.device, SessionMessage::DialingOutResult(false));
        }
    }

    fn update_pending_dial_out(&mut self, call_state: CallState) {
        let pending = match self.pending_dial_out.as_mut() {
            Some(pending) => pending,
            None => return,
        };
        match call_state {
            CallState::Dialing => {
                if !pending.is_confirmed() {
                    pending.confirm();
                    info!("[{}] Dialing out confirmed", pending.device);
                    self.registry.send(&pending.device, SessionMessage::DialingOutResult(true));
                }
            }
            // An unconfirmed request is left to its timer, whose expiry may already be queued.
            CallState::Active | CallState::Idle => {
                if pending.is_confirmed() {
                    self.pending_dial_out = None;
                }
            }
            _ => (),
        }
    }

    /// Whether inband ringing is enabled for `addr`, honouring its policy.
    fn inband_ringing_for(&self, addr: &RawAddress) -> bool {
        let allowed_by_policy = self.registry.find(addr).map_or(true, |s| {
            s.call_audio_policy().inband_ringtone != AudioPolicyValue::NotAllowed
        });
        self.config.inband_ringing_supported
            && !self.inband_ringing_runtime_disabled
            && allowed_by_policy
    }

    /// Recomputes whether inband ringing may be used after `addr` connected or disconnected.
    pub fn update_inband_ringing(&mut self, addr: RawAddress, connected: bool) {
        let was_disabled = self.inband_ringing_runtime_disabled;
        self.inband_ringing_runtime_disabled = self.registry.connected_devices().len() > 1
            || self.system.is_headset_client_connected();
        let update_all = was_disabled != self.inband_ringing_runtime_disabled;

        info!(
            "[{}] Inband ringing runtime disabled {} (connected {}, update all {})",
            addr, self.inband_ringing_runtime_disabled, connected, update_all
        );

        if update_all {
            for device in self.registry.connected_devices() {
                let enabled = self.inband_ringing_for(&device);
                self.registry.send(&device, SessionMessage::SetInbandRinging(enabled));
            }
        } else if connected {
            let enabled = self.inband_ringing_for(&addr);
            self.registry.send(&addr, SessionMessage::SetInbandRinging(enabled));
        }
    }

    fn notify_active_device_changed(&mut self) {
        let active = self.active_device;
        self.callbacks.for_all_callbacks(|callback| {
            callback.on_active_device_changed(active);
        });
    }
}

impl IBluetoothHeadset for HeadsetService {
    fn register_callback(&mut self, callback: Box<dyn IHeadsetCallback + Send>) -> u32 {
        self.callbacks.add_callback(callback)
    }

    fn unregister_callback(&mut self, callback_id: u32) -> bool {
        self.callbacks.remove_callback(callback_id)
    }

    fn connect(&mut self, device: RawAddress) -> bool {
        if !self.started {
            warn!("[{}] Cannot connect, service not started", device);
            return false;
        }
        if self.get_connection_policy(device) == ConnectionPolicy::Forbidden {
            warn!("[{}] Cannot connect, connection policy forbids it", device);
            return false;
        }
        if !self.registry.bonded_device(&device).map_or(false, |d| d.supports_headset()) {
            warn!("[{}] Cannot connect, not a bonded headset", device);
            return false;
        }

        let state = self.registry.get_or_create(device).connection_state();
        if state == BthfConnectionState::Connected || state == BthfConnectionState::Connecting {
            warn!("[{}] Cannot connect, already {:?}", device, state);
            return false;
        }

        let busy = self
            .registry
            .matching(&[BthfConnectionState::Connecting, BthfConnectionState::Connected]);
        if busy.len() >= self.max_connections {
            if self.max_connections == 1 {
                // A single slot is handed over to the newest request.
                for other in busy {
                    info!("[{}] Disconnecting to make room for {}", other, device);
                    self.registry.send(&other, SessionMessage::Disconnect);
                }
            } else {
                warn!(
                    "[{}] Cannot connect, {} of {} connections in use",
                    device,
                    busy.len(),
                    self.max_connections
                );
                return false;
            }
        }

        self.registry.send(&device, SessionMessage::Connect)
    }

    fn disconnect(&mut self, device: RawAddress) -> bool {
        let state = self.registry.connection_state(&device);
        if state != BthfConnectionState::Connected && state != BthfConnectionState::Connecting {
            warn!("[{}] Cannot disconnect, state is {:?}", device, state);
            return false;
        }
        self.registry.send(&device, SessionMessage::Disconnect)
    }

    fn get_connected_devices(&self) -> Vec<RawAddress> {
        self.registry.connected_devices()
    }

    fn get_devices_matching_connection_states(
        &self,
        states: Vec<BthfConnectionState>,
    ) -> Vec<RawAddress> {
        self.registry.matching(&states)
    }

    fn get_connection_state(&self, device: RawAddress) -> BthfConnectionState {
        self.registry.connection_state(&device)
    }

    fn set_connection_policy(&mut self, device: RawAddress, policy: ConnectionPolicy) -> bool {
        info!("[{}] Connection policy {:?}", device, policy);
        self.connection_policies.insert(device, policy);
        match policy {
            ConnectionPolicy::Allowed => {
                if self.registry.connection_state(&device) == BthfConnectionState::Disconnected {
                    self.connect(device);
                }
            }
            ConnectionPolicy::Forbidden => {
                let state = self.registry.connection_state(&device);
                if state == BthfConnectionState::Connected
                    || state == BthfConnectionState::Connecting
                {
                    self.disconnect(device);
                }
            }
            ConnectionPolicy::Unknown => (),
        }
        true
    }

    fn get_connection_policy(&self, device: RawAddress) -> ConnectionPolicy {
        self.connection_policies.get(&device).copied().unwrap_or_default()
    }

    fn start_voice_recognition(&mut self, device: RawAddress) -> bool {
        self.start_voice_recognition_impl(device)
    }

    fn stop_voice_recognition(&mut self, device: RawAddress) -> bool {
        self.stop_voice_recognition_impl(device)
    }

    fn connect_audio(&mut self) -> HfpStatus {
        match self.active_device {
            Some(device) => self.connect_audio_to(device),
            None => {
                warn!("Cannot connect audio, no active device");
                HfpStatus::NoActiveDevice
            }
        }
    }

    fn connect_audio_to(&mut self, device: RawAddress) -> HfpStatus {
        self.connect_audio_impl(device)
    }

    fn disconnect_audio(&mut self) -> HfpStatus {
        let mut status = HfpStatus::AudioAlreadyDisconnected;
        for device in self.registry.audio_busy_devices() {
            if self.disconnect_audio_from(device) == HfpStatus::Success {
                status = HfpStatus::Success;
            }
        }
        status
    }

    fn disconnect_audio_from(&mut self, device: RawAddress) -> HfpStatus {
        self.disconnect_audio_impl(device)
    }

    fn get_audio_state(&self, device: RawAddress) -> BthfAudioState {
        self.registry.audio_state(&device)
    }

    fn set_active_device(&mut self, device: Option<RawAddress>) -> bool {
        match device {
            Some(device) => self.activate(device),
            None => self.deactivate(),
        }
    }

    fn get_active_device(&self) -> Option<RawAddress> {
        self.active_device
    }

    fn start_sco_using_virtual_voice_call(&mut self) -> bool {
        self.start_virtual_call_impl()
    }

    fn stop_sco_using_virtual_voice_call(&mut self) -> bool {
        self.stop_virtual_call_impl()
    }

    fn set_force_sco_audio(&mut self, forced: bool) {
        info!("Force SCO audio {}", forced);
        self.force_sco_audio = forced;
    }

    fn get_force_sco_audio(&self) -> bool {
        self.force_sco_audio
    }

    fn set_audio_route_allowed(&mut self, allowed: bool) {
        info!("Audio route allowed {}", allowed);
        self.audio_route_allowed = allowed;
        self.native.set_sco_allowed(allowed);
    }

    fn get_audio_route_allowed(&self) -> bool {
        self.audio_route_allowed
    }

    fn phone_state_changed(
        &mut self,
        num_active: u32,
        num_held: u32,
        call_state: CallState,
        number: String,
        number_type: i32,
        name: String,
        is_virtual: bool,
    ) {
        let in_call = num_active + num_held > 0 || call_state != CallState::Idle;
        if in_call {
            // A real call preempts the other audio modes.
            if !is_virtual && self.virtual_call_started {
                self.stop_sco_using_virtual_voice_call();
            }
            if self.voice_recognition_started {
                if let Some(active) = self.active_device {
                    self.stop_voice_recognition_impl(active);
                }
            }
        } else if !is_virtual && self.virtual_call_started {
            info!("Ignoring telephony idle update during a virtual call");
            return;
        }

        if !is_virtual {
            self.update_pending_dial_out(call_state);
        }

        let was_idle = self.phone_state.is_idle();
        self.phone_state = PhoneState { num_active, num_held, state: call_state };
        if !is_virtual {
            self.system.update_phone_state(self.phone_state);
        }
        if self.active_device.is_some() && was_idle && !self.phone_state.is_idle() {
            self.system.set_audio_suspended(true);
        }

        let headset_call_state =
            HeadsetCallState { num_active, num_held, call_state, number, number_type, name };
        self.registry
            .for_each_connected(|_| SessionMessage::CallStateChanged(headset_call_state.clone()));

        if self.phone_state.is_idle() && !self.is_audio_on() {
            self.system.set_audio_suspended(false);
        }

        if call_state == CallState::Idle && !is_virtual {
            if let Some(active) = self.active_device {
                let policy = self.registry.find(&active).map(|s| s.call_audio_policy());
                if policy.map_or(false, |p| {
                    p.active_device_after_connection == AudioPolicyValue::NotAllowed
                }) {
                    info!("[{}] Call ended, device may not stay active", active);
                    self.set_active_device(None);
                }
            }
        }
    }

    fn is_inband_ringing_enabled(&self) -> bool {
        let connected = self.registry.connected_devices();
        let allowed_by_policy = match connected.as_slice() {
            [only] => self.registry.find(only).map_or(true, |s| {
                s.call_audio_policy().inband_ringtone != AudioPolicyValue::NotAllowed
            }),
            _ => true,
        };
        self.config.inband_ringing_supported
            && !self.inband_ringing_runtime_disabled
            && allowed_by_policy
            && !self.system.is_headset_client_connected()
    }

    fn is_audio_on(&self) -> bool {
        !self.registry.audio_busy_devices().is_empty()
    }

    fn set_silence_mode(&mut self, device: RawAddress, silence: bool) -> bool {
        if !self.registry.set_silenced(&device, silence) {
            warn!("[{}] Cannot set silence mode, no session", device);
            return false;
        }
        self.registry.send(&device, SessionMessage::SetSilenced(silence));

        if silence && self.active_device == Some(device) {
            self.set_active_device(None);
        } else if !silence && self.active_device.is_none() {
            self.set_active_device(Some(device));
        }
        true
    }

    fn is_noise_reduction_supported(&self, device: RawAddress) -> bool {
        self.native.is_noise_reduction_supported(device)
    }

    fn is_voice_recognition_supported(&self, device: RawAddress) -> bool {
        self.native.is_voice_recognition_supported(device)
    }
}
