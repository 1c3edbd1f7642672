//! Contract between the headset service and the per-device session state machines.
//!
//! A session owns the connection and audio state of one remote device and runs on its own
//! serialized worker. The headset service only reads its state and posts messages to it. Sessions
//! report back by sending [`crate::Message::Hfp`] into the stack dispatch channel, never by
//! calling into the service directly.

use num_traits::cast::FromPrimitive;
use tokio::sync::mpsc::Sender;

use crate::address::RawAddress;
use crate::native::HfpStackEventKind;
use crate::status::HfpStatus;
use crate::system::HeadsetCallState;
use crate::Message;

#[derive(Debug, Default, FromPrimitive, ToPrimitive, PartialEq, Eq, PartialOrd, Clone, Copy)]
#[repr(u32)]
pub enum BthfConnectionState {
    #[default]
    Disconnected = 0,
    Connecting,
    Connected,
    Disconnecting,
}

impl From<u32> for BthfConnectionState {
    fn from(item: u32) -> Self {
        BthfConnectionState::from_u32(item).unwrap_or(BthfConnectionState::Disconnected)
    }
}

#[derive(Debug, Default, FromPrimitive, ToPrimitive, PartialEq, Eq, PartialOrd, Clone, Copy)]
#[repr(u32)]
pub enum BthfAudioState {
    #[default]
    Disconnected = 0,
    Connecting,
    Connected,
    Disconnecting,
}

impl From<u32> for BthfAudioState {
    fn from(item: u32) -> Self {
        BthfAudioState::from_u32(item).unwrap_or(BthfAudioState::Disconnected)
    }
}

#[derive(Debug, Default, FromPrimitive, ToPrimitive, PartialEq, Eq, Clone, Copy)]
#[repr(u32)]
pub enum AudioPolicyValue {
    #[default]
    Unconfigured = 0,
    Allowed,
    NotAllowed,
}

/// Call audio preferences a remote device advertised.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct CallAudioPolicy {
    /// Whether answering a call from the device may make it the active device.
    pub call_establish: AudioPolicyValue,
    /// Whether the device may become, or stay, active outside of a call it picked up.
    pub active_device_after_connection: AudioPolicyValue,
    /// Whether the device accepts inband ringtones.
    pub inband_ringtone: AudioPolicyValue,
}

/// Messages understood by a device session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionMessage {
    Connect,
    Disconnect,
    ConnectAudio,
    DisconnectAudio,
    VoiceRecognitionStart,
    VoiceRecognitionStop,
    /// Answer to a voice recognition request made by the device.
    VoiceRecognitionResult(bool),
    /// Answer to a dial request made by the device.
    DialingOutResult(bool),
    CallStateChanged(HeadsetCallState),
    SetInbandRinging(bool),
    SetSilenced(bool),
    /// Answer to an incoming SCO request made by the device.
    ScoRequestResult(HfpStatus),
    StackEvent(HfpStackEventKind),
}

/// A per-device session as seen by the headset service.
pub trait HfpSession {
    /// Posts a message to the session. Must not block and must not call back synchronously.
    fn send_message(&self, message: SessionMessage);

    fn connection_state(&self) -> BthfConnectionState;

    fn audio_state(&self) -> BthfAudioState;

    fn call_audio_policy(&self) -> CallAudioPolicy;
}

/// Creates device sessions on demand.
pub trait SessionFactory {
    /// Creates the session for `address`. The session reports state changes through `tx`.
    fn create(&mut self, address: RawAddress, tx: Sender<Message>) -> Box<dyn HfpSession + Send>;
}
