//! Native HFP interface and the events it reports.

use crate::address::RawAddress;
use crate::session::{BthfAudioState, BthfConnectionState};

/// Event reported by the native stack for one remote device.
#[derive(Debug, Clone, PartialEq)]
pub struct HfpStackEvent {
    pub address: RawAddress,
    pub kind: HfpStackEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HfpStackEventKind {
    ConnectionState(BthfConnectionState),
    AudioState(BthfAudioState),
    VolumeUpdate(u8),
    BatteryLevelUpdate(u8),
    CapsUpdate(bool),
    VoiceRecognition(bool),
    DialCall(String),
    AnswerCall,
    HangupCall,
}

impl HfpStackEvent {
    pub fn new(address: RawAddress, kind: HfpStackEventKind) -> Self {
        HfpStackEvent { address, kind }
    }

    /// Whether the event announces a device the gateway may not have seen yet.
    pub(crate) fn creates_session(&self) -> bool {
        matches!(
            self.kind,
            HfpStackEventKind::ConnectionState(
                BthfConnectionState::Connecting | BthfConnectionState::Connected
            )
        )
    }
}

/// Calls into the native HFP interface.
///
/// All calls are fire-and-forget requests to the radio; they must not block.
pub trait HfpNative {
    /// Brings up the native profile allowing `max_connections` service level connections.
    fn init(&mut self, max_connections: usize, inband_ringing_enabled: bool);

    /// Marks `addr` as the active device, or clears it. Returns false if the stack refused.
    fn set_active_device(&mut self, addr: Option<RawAddress>) -> bool;

    /// Allows or disallows SCO connections at the controller level.
    fn set_sco_allowed(&mut self, allowed: bool);

    fn is_noise_reduction_supported(&self, addr: RawAddress) -> bool;

    fn is_voice_recognition_supported(&self, addr: RawAddress) -> bool;

    fn cleanup(&mut self);
}
