//! Call, virtual call and voice recognition audio, and who may open SCO for them.

use log::{info, warn};

use super::{HeadsetService, IBluetoothHeadset};
use crate::address::RawAddress;
use crate::session::{BthfAudioState, BthfConnectionState, SessionMessage};
use crate::status::HfpStatus;
use crate::system::CallState;
use crate::timeout::TimeoutKind;

impl HeadsetService {
    /// Whether telephony wants audio on the headset: a call, or inband ringing.
    pub fn should_call_audio_be_active(&self) -> bool {
        self.system.is_in_call() || (self.system.is_ringing() && self.is_inband_ringing_enabled())
    }

    /// Whether call audio must follow the active device when it changes.
    pub(super) fn should_persist_audio(&self) -> bool {
        !self.virtual_call_started && self.should_call_audio_be_active()
    }

    pub fn is_audio_mode_idle(&self) -> bool {
        !(self.voice_recognition_started || self.virtual_call_started || self.system.is_in_call())
    }

    /// Decides whether SCO may be opened to `device`, whoever asks for it.
    pub fn is_sco_acceptable(&self, device: RawAddress) -> HfpStatus {
        if self.active_device != Some(device) {
            return HfpStatus::NotActiveDevice;
        }
        if self.force_sco_audio {
            return HfpStatus::Success;
        }
        if !self.audio_route_allowed {
            return HfpStatus::AudioRouteBlocked;
        }
        if self.voice_recognition_started || self.virtual_call_started {
            return HfpStatus::Success;
        }
        if self.should_call_audio_be_active() {
            return HfpStatus::Success;
        }
        HfpStatus::NoActiveCall
    }

    pub(super) fn connect_audio_impl(&mut self, device: RawAddress) -> HfpStatus {
        let (state, audio_state) = match self.registry.find(&device) {
            Some(session) => (session.connection_state(), session.audio_state()),
            None => {
                warn!("[{}] Cannot connect audio, no session", device);
                return HfpStatus::ProfileNotConnected;
            }
        };

        let status = self.is_sco_acceptable(device);
        if status != HfpStatus::Success {
            warn!("[{}] Cannot connect audio: {:?}", device, status);
            return status;
        }
        if state != BthfConnectionState::Connected {
            warn!("[{}] Cannot connect audio, state is {:?}", device, state);
            return HfpStatus::ProfileNotConnected;
        }
        if audio_state != BthfAudioState::Disconnected {
            warn!("[{}] Cannot connect audio, audio is {:?}", device, audio_state);
            return HfpStatus::AudioAlreadyConnected;
        }
        if self.is_audio_on() {
            warn!(
                "[{}] Cannot connect audio, busy on {:?}",
                device,
                self.registry.audio_busy_devices()
            );
            return HfpStatus::AudioBusy;
        }

        self.registry.send(&device, SessionMessage::ConnectAudio);
        HfpStatus::Success
    }

    pub(super) fn disconnect_audio_impl(&mut self, device: RawAddress) -> HfpStatus {
        let audio_state = match self.registry.find(&device) {
            Some(session) => session.audio_state(),
            None => {
                warn!("[{}] Cannot disconnect audio, no session", device);
                return HfpStatus::ProfileNotConnected;
            }
        };
        if audio_state == BthfAudioState::Disconnected {
            warn!("[{}] Audio already disconnected", device);
            return HfpStatus::AudioAlreadyDisconnected;
        }

        self.registry.send(&device, SessionMessage::DisconnectAudio);
        HfpStatus::Success
    }

    /// Stops voice recognition or a virtual call left running, so the caller can retry.
    ///
    /// Returns true if something had to be stopped.
    fn force_stop_exclusive_modes(&mut self, caller: &str) -> bool {
        if self.voice_recognition_started {
            let target = self.active_device;
            let stopped = match target {
                Some(device) => self.stop_voice_recognition_impl(device),
                None => false,
            };
            self.voice_recognition_started = false;
            warn!(
                "{}: voice recognition still running, stop on {:?} returned {}, try again",
                caller, target, stopped
            );
            return true;
        }
        if self.virtual_call_started {
            let stopped = self.stop_virtual_call_impl();
            warn!("{}: virtual call still running, stop returned {}, try again", caller, stopped);
            return true;
        }
        false
    }

    /// Checks shared by every request to start an exclusive audio mode.
    fn can_start_exclusive_mode(&mut self, caller: &str) -> bool {
        if self.force_stop_exclusive_modes(caller) {
            return false;
        }
        if !self.is_audio_mode_idle() {
            warn!("{}: audio mode not idle, active device {:?}", caller, self.active_device);
            return false;
        }
        if self.is_audio_on() {
            let status = self.disconnect_audio();
            warn!(
                "{}: audio is on without an audio mode, disconnect returned {:?}",
                caller, status
            );
            return false;
        }
        true
    }

    pub(super) fn start_voice_recognition_impl(&mut self, device: RawAddress) -> bool {
        if !self.can_start_exclusive_mode("start_voice_recognition") {
            return false;
        }

        let mut device = device;
        let mut requested_by_headset = false;
        if let Some(pending) = self.pending_voice_recognition.take() {
            if pending.device != device {
                warn!(
                    "[{}] Voice recognition pending for {}, starting there instead",
                    device, pending.device
                );
                device = pending.device;
            }
            if self.system.is_voice_recognition_wake_lock_held() {
                self.system.release_voice_recognition_wake_lock();
            }
            requested_by_headset = true;
        }

        if self.active_device != Some(device) && !self.set_active_device(Some(device)) {
            warn!("[{}] Cannot start voice recognition, failed to activate", device);
            if requested_by_headset {
                self.registry.send(&device, SessionMessage::VoiceRecognitionResult(false));
            }
            return false;
        }

        self.voice_recognition_started = true;
        if requested_by_headset {
            self.registry.send(&device, SessionMessage::VoiceRecognitionResult(true));
        } else {
            self.registry.send(&device, SessionMessage::VoiceRecognitionStart);
        }
        let status = self.connect_audio_to(device);
        if status != HfpStatus::Success {
            warn!("[{}] Voice recognition started without audio: {:?}", device, status);
        }
        info!("[{}] Voice recognition started", device);
        true
    }

    pub(super) fn stop_voice_recognition_impl(&mut self, device: RawAddress) -> bool {
        if !self.voice_recognition_started {
            warn!("[{}] Voice recognition was not started", device);
            return false;
        }

        let device = match self.active_device {
            Some(active) if active != device => {
                warn!("[{}] Not active, stopping voice recognition on {}", device, active);
                active
            }
            _ => device,
        };
        self.voice_recognition_started = false;
        if self.registry.contains(&device) {
            self.registry.send(&device, SessionMessage::VoiceRecognitionStop);
            self.disconnect_audio_from(device);
        }
        info!("[{}] Voice recognition stopped", device);
        true
    }

    /// Handles a voice recognition request made by a headset.
    ///
    /// On success the platform is asked to start recognition and the request stays pending until
    /// it calls `start_voice_recognition` or the request times out.
    pub fn start_voice_recognition_by_headset(&mut self, device: RawAddress) -> bool {
        info!("[{}] Headset requests voice recognition", device);
        if !self.can_start_exclusive_mode("start_voice_recognition_by_headset") {
            return false;
        }
        if let Some(pending) = &self.pending_voice_recognition {
            warn!("[{}] Voice recognition already pending for {}", device, pending.device);
            return false;
        }
        if !self.set_active_device(Some(device)) {
            warn!("[{}] Cannot start voice recognition, failed to activate", device);
            return false;
        }
        if !self.system.activate_voice_recognition() {
            warn!("[{}] Platform refused to activate voice recognition", device);
            return false;
        }

        let timeout = self.config.voice_recognition_timeout();
        self.pending_voice_recognition =
            Some(self.scheduler.schedule(TimeoutKind::VoiceRecognition, device, timeout));
        if !self.system.is_voice_recognition_wake_lock_held() {
            self.system.acquire_voice_recognition_wake_lock(timeout);
        }
        true
    }

    /// Handles a headset asking to end voice recognition, pending or running.
    pub fn stop_voice_recognition_by_headset(&mut self, device: RawAddress) -> bool {
        if self.active_device != Some(device) {
            warn!("[{}] Cannot stop voice recognition, not the active device", device);
            return false;
        }
        if !self.voice_recognition_started && self.pending_voice_recognition.is_none() {
            warn!("[{}] Voice recognition not started", device);
            return false;
        }

        if self.pending_voice_recognition.take().is_some()
            && self.system.is_voice_recognition_wake_lock_held()
        {
            self.system.release_voice_recognition_wake_lock();
        }
        if self.voice_recognition_started {
            let status = self.disconnect_audio();
            if status != HfpStatus::Success {
                warn!("[{}] Disconnecting voice recognition audio: {:?}", device, status);
            }
            self.voice_recognition_started = false;
        }
        if !self.system.deactivate_voice_recognition() {
            warn!("[{}] Platform refused to deactivate voice recognition", device);
            return false;
        }
        true
    }

    pub(super) fn voice_recognition_timeout(&mut self, id: u64) {
        match &self.pending_voice_recognition {
            Some(pending) if pending.id == id => (),
            _ => {
                log::debug!("Ignoring stale voice recognition timeout {}", id);
                return;
            }
        }
        if let Some(pending) = self.pending_voice_recognition.take() {
            warn!("[{}] Voice recognition request timed out", pending.device);
            if self.system.is_voice_recognition_wake_lock_held() {
                self.system.release_voice_recognition_wake_lock();
            }
            self.registry.send(&pending.device, SessionMessage::VoiceRecognitionResult(false));
        }
    }

    pub(super) fn start_virtual_call_impl(&mut self) -> bool {
        if !self.can_start_exclusive_mode("start_sco_using_virtual_voice_call") {
            return false;
        }
        let device = match self.active_device {
            Some(device) => device,
            None => {
                warn!("Cannot start virtual call, no active device");
                return false;
            }
        };

        self.virtual_call_started = true;
        // Made up call progress lets the headset set up its call audio.
        self.phone_state_changed(0, 0, CallState::Dialing, String::new(), 0, String::new(), true);
        self.phone_state_changed(0, 0, CallState::Alerting, String::new(), 0, String::new(), true);
        self.phone_state_changed(1, 0, CallState::Idle, String::new(), 0, String::new(), true);

        let status = self.connect_audio_to(device);
        if status != HfpStatus::Success {
            warn!("[{}] Virtual call started without audio: {:?}", device, status);
        }
        info!("[{}] Virtual call started", device);
        true
    }

    pub(super) fn stop_virtual_call_impl(&mut self) -> bool {
        if !self.virtual_call_started {
            warn!("Virtual call was not started");
            return false;
        }

        self.virtual_call_started = false;
        self.phone_state_changed(0, 0, CallState::Idle, String::new(), 0, String::new(), true);
        if self.is_audio_on() {
            self.disconnect_audio();
        }
        info!("Virtual call stopped");
        true
    }
}
