//! Telephony and platform services consumed by the Audio Gateway.

use num_traits::cast::FromPrimitive;
use std::time::Duration;

#[derive(Debug, Default, FromPrimitive, ToPrimitive, PartialEq, Eq, Clone, Copy)]
#[repr(u32)]
pub enum CallState {
    #[default]
    Idle = 0,
    Incoming,
    Dialing,
    Alerting,
    Active,
    Held,
}

impl From<u32> for CallState {
    fn from(item: u32) -> Self {
        CallState::from_u32(item).unwrap_or(CallState::Idle)
    }
}

/// Aggregated phone state as last reported by telephony.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct PhoneState {
    pub num_active: u32,
    pub num_held: u32,
    pub state: CallState,
}

impl PhoneState {
    /// True when there is no call in any state.
    pub fn is_idle(&self) -> bool {
        self.num_active + self.num_held == 0 && self.state == CallState::Idle
    }
}

/// Call state tuple pushed to each connected session.
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct HeadsetCallState {
    pub num_active: u32,
    pub num_held: u32,
    pub call_state: CallState,
    pub number: String,
    pub number_type: i32,
    pub name: String,
}

/// Telephony and system services.
///
/// Every method is expected to return promptly; none of them may call back into the headset
/// service.
pub trait HfpSystem {
    /// True when telephony has no call in any state.
    fn is_call_idle(&self) -> bool;

    /// True when a call is active, held or being placed.
    fn is_in_call(&self) -> bool;

    /// True when an incoming call is ringing.
    fn is_ringing(&self) -> bool;

    /// True when this host is also connected as a hands-free client to some phone.
    fn is_headset_client_connected(&self) -> bool;

    /// Asks the platform to start voice recognition. Returns false if it refused.
    fn activate_voice_recognition(&mut self) -> bool;

    /// Asks the platform to stop voice recognition. Returns false if it refused.
    fn deactivate_voice_recognition(&mut self) -> bool;

    /// Suspends or resumes other audio streams (e.g. A2DP) in favor of call audio.
    fn set_audio_suspended(&mut self, suspended: bool);

    /// Keeps the host awake for at most `timeout` while a voice recognition request is pending.
    fn acquire_voice_recognition_wake_lock(&mut self, timeout: Duration);

    fn release_voice_recognition_wake_lock(&mut self);

    fn is_voice_recognition_wake_lock_held(&self) -> bool;

    /// Places an outgoing call. Returns false if the request could not be started.
    fn dial(&mut self, number: &str) -> bool;

    fn answer_call(&mut self);

    fn hangup_call(&mut self);

    /// Records the phone state reported by telephony.
    fn update_phone_state(&mut self, state: PhoneState);
}
