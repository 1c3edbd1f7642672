#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{Receiver, Sender};

use bt_hfp_ag::config::HfpConfig;
use bt_hfp_ag::headset::{HeadsetService, HfpActions, IBluetoothHeadset, IHeadsetCallback};
use bt_hfp_ag::native::HfpNative;
use bt_hfp_ag::registry::{uuid_from_16bit, BondedDevice, HFP_UUID16};
use bt_hfp_ag::session::{
    BthfAudioState, BthfConnectionState, CallAudioPolicy, HfpSession, SessionFactory,
    SessionMessage,
};
use bt_hfp_ag::system::{CallState, HfpSystem, PhoneState};
use bt_hfp_ag::{Message, RPCProxy, RawAddress, Stack};

pub const COD_HEADSET: u32 = 0x240404;
pub const COD_WATCH: u32 = 0x000704;

pub fn addr(last: u8) -> RawAddress {
    RawAddress { address: [0x00, 0x11, 0x22, 0x33, 0x44, last] }
}

/// State of a fake device session, shared with the test.
#[derive(Default)]
pub struct FakeSessionState {
    pub connection_state: BthfConnectionState,
    pub audio_state: BthfAudioState,
    pub policy: CallAudioPolicy,
    pub messages: Vec<SessionMessage>,
}

type SharedSessions = Arc<Mutex<HashMap<RawAddress, Arc<Mutex<FakeSessionState>>>>>;
type MessageLog = Arc<Mutex<Vec<(RawAddress, SessionMessage)>>>;

pub struct FakeSession {
    address: RawAddress,
    state: Arc<Mutex<FakeSessionState>>,
    log: MessageLog,
}

impl HfpSession for FakeSession {
    fn send_message(&self, message: SessionMessage) {
        self.log.lock().unwrap().push((self.address, message.clone()));
        self.state.lock().unwrap().messages.push(message);
    }

    fn connection_state(&self) -> BthfConnectionState {
        self.state.lock().unwrap().connection_state
    }

    fn audio_state(&self) -> BthfAudioState {
        self.state.lock().unwrap().audio_state
    }

    fn call_audio_policy(&self) -> CallAudioPolicy {
        self.state.lock().unwrap().policy
    }
}

pub struct FakeSessionFactory {
    sessions: SharedSessions,
    log: MessageLog,
}

impl SessionFactory for FakeSessionFactory {
    fn create(&mut self, address: RawAddress, _tx: Sender<Message>) -> Box<dyn HfpSession + Send> {
        let state = self.sessions.lock().unwrap().entry(address).or_default().clone();
        Box::new(FakeSession { address, state, log: self.log.clone() })
    }
}

#[derive(Default)]
pub struct NativeState {
    pub init: Option<(usize, bool)>,
    pub active_device: Option<RawAddress>,
    pub refuse_active_device: bool,
    pub sco_allowed: Option<bool>,
    pub cleaned_up: bool,
}

pub struct FakeNative {
    state: Arc<Mutex<NativeState>>,
}

impl HfpNative for FakeNative {
    fn init(&mut self, max_connections: usize, inband_ringing_enabled: bool) {
        self.state.lock().unwrap().init = Some((max_connections, inband_ringing_enabled));
    }

    fn set_active_device(&mut self, addr: Option<RawAddress>) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.refuse_active_device {
            return false;
        }
        state.active_device = addr;
        true
    }

    fn set_sco_allowed(&mut self, allowed: bool) {
        self.state.lock().unwrap().sco_allowed = Some(allowed);
    }

    fn is_noise_reduction_supported(&self, addr: RawAddress) -> bool {
        addr.address[5] % 2 == 0
    }

    fn is_voice_recognition_supported(&self, _addr: RawAddress) -> bool {
        true
    }

    fn cleanup(&mut self) {
        self.state.lock().unwrap().cleaned_up = true;
    }
}

pub struct SystemState {
    pub phone: PhoneState,
    pub headset_client_connected: bool,
    pub activate_voice_recognition_result: bool,
    pub voice_recognition_active: bool,
    pub audio_suspended: Vec<bool>,
    pub wake_lock: Option<Duration>,
    pub dial_result: bool,
    pub dialed: Vec<String>,
    pub answered: u32,
    pub hung_up: u32,
}

impl Default for SystemState {
    fn default() -> Self {
        SystemState {
            phone: PhoneState::default(),
            headset_client_connected: false,
            activate_voice_recognition_result: true,
            voice_recognition_active: false,
            audio_suspended: vec![],
            wake_lock: None,
            dial_result: true,
            dialed: vec![],
            answered: 0,
            hung_up: 0,
        }
    }
}

pub struct FakeSystem {
    state: Arc<Mutex<SystemState>>,
}

impl HfpSystem for FakeSystem {
    fn is_call_idle(&self) -> bool {
        self.state.lock().unwrap().phone.is_idle()
    }

    fn is_in_call(&self) -> bool {
        let phone = self.state.lock().unwrap().phone;
        phone.num_active + phone.num_held > 0
            || matches!(
                phone.state,
                CallState::Dialing | CallState::Alerting | CallState::Active | CallState::Held
            )
    }

    fn is_ringing(&self) -> bool {
        self.state.lock().unwrap().phone.state == CallState::Incoming
    }

    fn is_headset_client_connected(&self) -> bool {
        self.state.lock().unwrap().headset_client_connected
    }

    fn activate_voice_recognition(&mut self) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.activate_voice_recognition_result {
            state.voice_recognition_active = true;
        }
        state.activate_voice_recognition_result
    }

    fn deactivate_voice_recognition(&mut self) -> bool {
        self.state.lock().unwrap().voice_recognition_active = false;
        true
    }

    fn set_audio_suspended(&mut self, suspended: bool) {
        self.state.lock().unwrap().audio_suspended.push(suspended);
    }

    fn acquire_voice_recognition_wake_lock(&mut self, timeout: Duration) {
        self.state.lock().unwrap().wake_lock = Some(timeout);
    }

    fn release_voice_recognition_wake_lock(&mut self) {
        self.state.lock().unwrap().wake_lock = None;
    }

    fn is_voice_recognition_wake_lock_held(&self) -> bool {
        self.state.lock().unwrap().wake_lock.is_some()
    }

    fn dial(&mut self, number: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        state.dialed.push(number.to_string());
        state.dial_result
    }

    fn answer_call(&mut self) {
        self.state.lock().unwrap().answered += 1;
    }

    fn hangup_call(&mut self) {
        self.state.lock().unwrap().hung_up += 1;
    }

    fn update_phone_state(&mut self, state: PhoneState) {
        self.state.lock().unwrap().phone = state;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallbackEvent {
    ConnectionState(RawAddress, BthfConnectionState),
    AudioState(RawAddress, BthfAudioState),
    ActiveDevice(Option<RawAddress>),
}

type DisconnectWatch = Arc<Mutex<Option<(u32, Box<dyn Fn(u32) + Send>)>>>;

pub struct FakeCallback {
    events: Arc<Mutex<Vec<CallbackEvent>>>,
    disconnect: DisconnectWatch,
}

impl RPCProxy for FakeCallback {
    fn register_disconnect(&mut self, id: u32, f: Box<dyn Fn(u32) + Send>) {
        *self.disconnect.lock().unwrap() = Some((id, f));
    }

    fn unregister(&mut self, _id: u32) -> bool {
        self.disconnect.lock().unwrap().take().is_some()
    }
}

impl IHeadsetCallback for FakeCallback {
    fn on_connection_state_changed(&mut self, addr: RawAddress, state: BthfConnectionState) {
        self.events.lock().unwrap().push(CallbackEvent::ConnectionState(addr, state));
    }

    fn on_audio_state_changed(&mut self, addr: RawAddress, state: BthfAudioState) {
        self.events.lock().unwrap().push(CallbackEvent::AudioState(addr, state));
    }

    fn on_active_device_changed(&mut self, addr: Option<RawAddress>) {
        self.events.lock().unwrap().push(CallbackEvent::ActiveDevice(addr));
    }
}

/// A started headset service wired to fake collaborators.
pub struct TestBench {
    pub service: HeadsetService,
    pub rx: Receiver<Message>,
    pub sessions: SharedSessions,
    pub log: MessageLog,
    pub native: Arc<Mutex<NativeState>>,
    pub system: Arc<Mutex<SystemState>>,
    pub events: Arc<Mutex<Vec<CallbackEvent>>>,
    pub disconnect: DisconnectWatch,
    pub callback_id: u32,
    bonded: HashSet<RawAddress>,
}

impl TestBench {
    /// Must be called from within a tokio runtime since timers spawn tasks.
    pub fn new(config: HfpConfig) -> TestBench {
        let (tx, rx) = Stack::create_channel();
        let sessions = SharedSessions::default();
        let log = MessageLog::default();
        let native = Arc::new(Mutex::new(NativeState::default()));
        let system = Arc::new(Mutex::new(SystemState::default()));
        let events = Arc::new(Mutex::new(vec![]));
        let disconnect = DisconnectWatch::default();

        let mut service = HeadsetService::new(
            config,
            tx,
            Box::new(FakeSessionFactory { sessions: sessions.clone(), log: log.clone() }),
            Box::new(FakeNative { state: native.clone() }),
            Box::new(FakeSystem { state: system.clone() }),
        );
        service.start();
        let callback_id = service.register_callback(Box::new(FakeCallback {
            events: events.clone(),
            disconnect: disconnect.clone(),
        }));

        TestBench {
            service,
            rx,
            sessions,
            log,
            native,
            system,
            events,
            disconnect,
            callback_id,
            bonded: HashSet::new(),
        }
    }

    pub fn with_defaults() -> TestBench {
        TestBench::new(HfpConfig::default())
    }

    pub fn bond_with_class(&mut self, device: RawAddress, class_of_device: u32, headset: bool) {
        self.bonded.insert(device);
        self.service.handle_action(HfpActions::DeviceBonded(BondedDevice {
            address: device,
            name: format!("Device {}", device),
            class_of_device,
            uuids: if headset { vec![uuid_from_16bit(HFP_UUID16)] } else { vec![] },
        }));
    }

    pub fn bond(&mut self, device: RawAddress) {
        self.bond_with_class(device, COD_HEADSET, true);
    }

    pub fn unbond(&mut self, device: RawAddress) {
        self.bonded.remove(&device);
        self.service.handle_action(HfpActions::BondRemoved(device));
    }

    pub fn bond_watch(&mut self, device: RawAddress) {
        self.bond_with_class(device, COD_WATCH, true);
    }

    /// State of the session of `device`, creating it ahead of the service if needed.
    pub fn session(&self, device: RawAddress) -> Arc<Mutex<FakeSessionState>> {
        self.sessions.lock().unwrap().entry(device).or_default().clone()
    }

    pub fn set_policy(&self, device: RawAddress, policy: CallAudioPolicy) {
        self.session(device).lock().unwrap().policy = policy;
    }

    /// Moves the fake session to `to` and reports it the way a session would.
    pub fn set_connection_state(&mut self, device: RawAddress, to: BthfConnectionState) {
        let session = self.session(device);
        let from = std::mem::replace(&mut session.lock().unwrap().connection_state, to);
        self.service.handle_action(HfpActions::ConnectionStateChanged(device, from, to));
    }

    pub fn set_audio(&mut self, device: RawAddress, to: BthfAudioState) {
        let session = self.session(device);
        let from = std::mem::replace(&mut session.lock().unwrap().audio_state, to);
        self.service.handle_action(HfpActions::AudioStateChanged(device, from, to));
    }

    /// Bonds `device` as a headset if needed and brings it to Connected.
    pub fn connect_device(&mut self, device: RawAddress) {
        if !self.bonded.contains(&device) {
            self.bond(device);
        }
        assert!(self.service.connect(device));
        self.set_connection_state(device, BthfConnectionState::Connecting);
        self.set_connection_state(device, BthfConnectionState::Connected);
    }

    /// Takes `device` from Connected down to Disconnected.
    pub fn disconnect_device(&mut self, device: RawAddress) {
        self.set_connection_state(device, BthfConnectionState::Disconnecting);
        self.set_connection_state(device, BthfConnectionState::Disconnected);
    }

    pub fn phone(&mut self, num_active: u32, num_held: u32, state: CallState) {
        self.service.phone_state_changed(
            num_active,
            num_held,
            state,
            "5551234".to_string(),
            129,
            String::new(),
            false,
        );
    }

    pub fn messages(&self, device: RawAddress) -> Vec<SessionMessage> {
        self.session(device).lock().unwrap().messages.clone()
    }

    pub fn clear_messages(&self) {
        self.log.lock().unwrap().clear();
        for session in self.sessions.lock().unwrap().values() {
            session.lock().unwrap().messages.clear();
        }
    }

    pub fn events(&self) -> Vec<CallbackEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear_events(&self) {
        self.events.lock().unwrap().clear();
    }

    /// Handles every message queued in the dispatch channel.
    pub fn pump(&mut self) {
        while let Ok(m) = self.rx.try_recv() {
            match m {
                Message::Hfp(action) => self.service.handle_action(action),
                Message::HeadsetCallbackDisconnected(id) => self.service.callback_disconnected(id),
            }
        }
    }
}
