//! Status codes returned by the audio related operations.

use num_traits::cast::FromPrimitive;

/// Result of an audio or SCO related request.
///
/// Policy rejections and resource conflicts are reported through these codes and never retried
/// by the gateway itself.
#[derive(Debug, FromPrimitive, ToPrimitive, PartialEq, Eq, Clone, Copy, Hash)]
#[repr(u32)]
pub enum HfpStatus {
    Success = 0,
    /// The device is not the active device.
    NotActiveDevice,
    /// Audio routing to Bluetooth has been disallowed.
    AudioRouteBlocked,
    /// No call, virtual call or voice recognition needs audio.
    NoActiveCall,
    /// There is no active device to route audio to.
    NoActiveDevice,
    /// SCO is already up or connecting on this device.
    AudioAlreadyConnected,
    /// SCO is already down on this device.
    AudioAlreadyDisconnected,
    /// SCO is up on another device.
    AudioBusy,
    /// The device is not connected.
    ProfileNotConnected,
    /// There is no session for the device.
    NoSession,
    /// Rejected by a connection or audio policy.
    NotAllowed,
    Fail,
}

impl From<u32> for HfpStatus {
    fn from(item: u32) -> Self {
        HfpStatus::from_u32(item).unwrap_or(HfpStatus::Fail)
    }
}

impl From<HfpStatus> for u32 {
    fn from(item: HfpStatus) -> Self {
        item as u32
    }
}
