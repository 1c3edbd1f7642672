//! Registry of device sessions and of the bonded devices they may belong to.

use itertools::Itertools;
use log::{info, warn};
use std::collections::HashMap;
use tokio::sync::mpsc::Sender;
use tokio::time::Instant;

use crate::address::RawAddress;
use crate::session::{
    BthfAudioState, BthfConnectionState, HfpSession, SessionFactory, SessionMessage,
};
use crate::Message;

pub type Uuid128Bit = [u8; 16];

/// Headset Profile (HSP) service class.
pub const HSP_UUID16: u16 = 0x1108;
/// Hands-Free Profile (HFP) service class.
pub const HFP_UUID16: u16 = 0x111E;

/// Class of device for a wearable wrist watch (major class and minor class bits).
const WEARABLE_WRIST_WATCH: u32 = 0x0704;
const MAJOR_MINOR_CLASS_MASK: u32 = 0x1FFC;

const BASE_UUID: Uuid128Bit =
    [0, 0, 0, 0, 0, 0, 0x10, 0, 0x80, 0, 0, 0x80, 0x5f, 0x9b, 0x34, 0xfb];

/// Expands a 16-bit service class into the Bluetooth base UUID.
pub fn uuid_from_16bit(uuid16: u16) -> Uuid128Bit {
    let mut uuid = BASE_UUID;
    uuid[2..4].copy_from_slice(&uuid16.to_be_bytes());
    uuid
}

/// A device bonded with the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BondedDevice {
    pub address: RawAddress,
    pub name: String,
    pub class_of_device: u32,
    pub uuids: Vec<Uuid128Bit>,
}

impl BondedDevice {
    /// Whether the device advertises the HFP or HSP service.
    pub fn supports_headset(&self) -> bool {
        let headset_uuids = [uuid_from_16bit(HFP_UUID16), uuid_from_16bit(HSP_UUID16)];
        self.uuids.iter().any(|u| headset_uuids.contains(u))
    }

    /// Watches are never picked as a fallback active device.
    pub fn is_wearable(&self) -> bool {
        self.class_of_device & MAJOR_MINOR_CLASS_MASK == WEARABLE_WRIST_WATCH
    }
}

struct SessionEntry {
    session: Box<dyn HfpSession + Send>,
    /// When the session began connecting, with a sequence number breaking ties.
    connecting_timestamp: Option<(Instant, u64)>,
    silenced: bool,
}

/// Maps device addresses to their session. No address appears twice.
pub struct SessionRegistry {
    factory: Box<dyn SessionFactory + Send>,
    tx: Sender<Message>,
    sessions: HashMap<RawAddress, SessionEntry>,
    bonded: Vec<BondedDevice>,
    connecting_seq: u64,
}

impl SessionRegistry {
    pub fn new(factory: Box<dyn SessionFactory + Send>, tx: Sender<Message>) -> SessionRegistry {
        SessionRegistry {
            factory,
            tx,
            sessions: HashMap::new(),
            bonded: vec![],
            connecting_seq: 0,
        }
    }

    /// Returns the session for `addr`, creating it if this is the first time it is seen.
    pub fn get_or_create(&mut self, addr: RawAddress) -> &(dyn HfpSession + Send) {
        let factory = &mut self.factory;
        let tx = &self.tx;
        let entry = self.sessions.entry(addr).or_insert_with(|| {
            info!("[{}] Creating device session", addr);
            SessionEntry {
                session: factory.create(addr, tx.clone()),
                connecting_timestamp: None,
                silenced: false,
            }
        });
        entry.session.as_ref()
    }

    pub fn find(&self, addr: &RawAddress) -> Option<&(dyn HfpSession + Send)> {
        self.sessions.get(addr).map(|e| e.session.as_ref())
    }

    pub fn contains(&self, addr: &RawAddress) -> bool {
        self.sessions.contains_key(addr)
    }

    /// Drops the session of `addr`. Refused unless the session is disconnected.
    pub fn remove(&mut self, addr: &RawAddress) -> bool {
        let state = match self.sessions.get(addr) {
            Some(entry) => entry.session.connection_state(),
            None => return false,
        };
        if state != BthfConnectionState::Disconnected {
            warn!("[{}] Cannot remove session in state {:?}", addr, state);
            return false;
        }
        info!("[{}] Removing device session", addr);
        self.sessions.remove(addr);
        true
    }

    /// Drops every session regardless of its state.
    pub fn clear(&mut self) {
        self.sessions.clear();
    }

    /// Bonded devices whose connection state is one of `states`.
    ///
    /// Devices without a session report `Disconnected`. Devices that have no session and do not
    /// advertise a headset service are skipped.
    pub fn matching(&self, states: &[BthfConnectionState]) -> Vec<RawAddress> {
        self.bonded
            .iter()
            .filter(|d| self.sessions.contains_key(&d.address) || d.supports_headset())
            .filter(|d| states.contains(&self.connection_state(&d.address)))
            .map(|d| d.address)
            .collect_vec()
    }

    pub fn connection_state(&self, addr: &RawAddress) -> BthfConnectionState {
        self.find(addr).map_or(BthfConnectionState::Disconnected, |s| s.connection_state())
    }

    pub fn audio_state(&self, addr: &RawAddress) -> BthfAudioState {
        self.find(addr).map_or(BthfAudioState::Disconnected, |s| s.audio_state())
    }

    /// Every session currently in the connected state.
    pub fn connected_devices(&self) -> Vec<RawAddress> {
        self.sessions
            .iter()
            .filter(|(_, e)| e.session.connection_state() == BthfConnectionState::Connected)
            .map(|(addr, _)| *addr)
            .sorted()
            .collect_vec()
    }

    /// Every session whose audio is not disconnected.
    pub fn audio_busy_devices(&self) -> Vec<RawAddress> {
        self.sessions
            .iter()
            .filter(|(_, e)| e.session.audio_state() != BthfAudioState::Disconnected)
            .map(|(addr, _)| *addr)
            .sorted()
            .collect_vec()
    }

    /// Posts `message` to the session of `addr`. Returns false if there is no such session.
    pub fn send(&self, addr: &RawAddress, message: SessionMessage) -> bool {
        match self.sessions.get(addr) {
            Some(entry) => {
                entry.session.send_message(message);
                true
            }
            None => {
                warn!("[{}] No session to send {:?}", addr, message);
                false
            }
        }
    }

    /// Posts a message built by `f` to every connected session.
    pub fn for_each_connected<F: Fn(&RawAddress) -> SessionMessage>(&self, f: F) {
        for (addr, entry) in self.sessions.iter() {
            if entry.session.connection_state() == BthfConnectionState::Connected {
                entry.session.send_message(f(addr));
            }
        }
    }

    /// Stamps `addr` as having just started connecting.
    pub fn record_connecting(&mut self, addr: &RawAddress) {
        if let Some(entry) = self.sessions.get_mut(addr) {
            self.connecting_seq += 1;
            entry.connecting_timestamp = Some((Instant::now(), self.connecting_seq));
        }
    }

    pub fn set_silenced(&mut self, addr: &RawAddress, silenced: bool) -> bool {
        match self.sessions.get_mut(addr) {
            Some(entry) => {
                entry.silenced = silenced;
                true
            }
            None => false,
        }
    }

    pub fn is_silenced(&self, addr: &RawAddress) -> bool {
        self.sessions.get(addr).map_or(false, |e| e.silenced)
    }

    /// The connected device that connected most recently, ignoring `exclude`, silenced devices
    /// and wearables.
    pub fn fallback_candidate(&self, exclude: Option<RawAddress>) -> Option<RawAddress> {
        self.sessions
            .iter()
            .filter(|(addr, _)| Some(**addr) != exclude)
            .filter(|(_, e)| e.session.connection_state() == BthfConnectionState::Connected)
            .filter(|(_, e)| !e.silenced)
            .filter(|(addr, _)| !self.bonded_device(addr).map_or(false, |d| d.is_wearable()))
            .max_by_key(|(_, e)| e.connecting_timestamp)
            .map(|(addr, _)| *addr)
    }

    /// Adds or replaces a bonded device.
    pub fn add_bonded(&mut self, device: BondedDevice) {
        match self.bonded.iter_mut().find(|d| d.address == device.address) {
            Some(existing) => *existing = device,
            None => self.bonded.push(device),
        }
    }

    pub fn remove_bonded(&mut self, addr: &RawAddress) -> bool {
        let before = self.bonded.len();
        self.bonded.retain(|d| d.address != *addr);
        before != self.bonded.len()
    }

    pub fn bonded_device(&self, addr: &RawAddress) -> Option<&BondedDevice> {
        self.bonded.iter().find(|d| d.address == *addr)
    }

    pub fn is_bonded(&self, addr: &RawAddress) -> bool {
        self.bonded_device(addr).is_some()
    }
}
