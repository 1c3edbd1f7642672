//! Selection of the single device that carries call audio.

use log::{error, info, warn};

use super::{HeadsetService, IBluetoothHeadset};
use crate::address::RawAddress;
use crate::session::{BthfAudioState, BthfConnectionState};
use crate::status::HfpStatus;

impl HeadsetService {
    /// Makes `device` the active device.
    ///
    /// The previous device loses its audio first; audio then follows to `device` once that
    /// completes. If the switch cannot be carried out the previous device stays active, both here
    /// and in the native layer.
    pub(super) fn activate(&mut self, device: RawAddress) -> bool {
        if self.active_device == Some(device) {
            return true;
        }

        let state = match self.registry.find(&device) {
            Some(session) => session.connection_state(),
            None => {
                warn!("[{}] Cannot activate, no session", device);
                return false;
            }
        };
        if state != BthfConnectionState::Connected {
            warn!("[{}] Cannot activate, state is {:?}", device, state);
            return false;
        }

        let previous = self.active_device;
        if !self.native.set_active_device(Some(device)) {
            warn!("[{}] Native layer refused to activate", device);
            return false;
        }
        self.active_device = Some(device);

        let previous_with_audio = previous
            .filter(|p| self.registry.audio_state(p) != BthfAudioState::Disconnected);
        if let Some(previous_device) = previous_with_audio {
            let status = self.disconnect_audio_from(previous_device);
            if status != HfpStatus::Success {
                warn!("[{}] Cannot take audio from {}: {:?}", device, previous_device, status);
                self.restore_active_device(previous);
                return false;
            }
        } else if self.should_persist_audio() {
            let status = self.connect_audio_to(device);
            if status != HfpStatus::Success {
                warn!("[{}] Cannot move call audio: {:?}", device, status);
                self.restore_active_device(previous);
                return false;
            }
        }

        info!("Active device {:?} -> {}", previous, device);
        self.notify_active_device_changed();
        true
    }

    /// Clears the active device, or hands the role over to a fallback device if the current one
    /// dropped its connection.
    pub(super) fn deactivate(&mut self) -> bool {
        let previous = match self.active_device {
            Some(previous) => previous,
            None => return true,
        };

        if self.registry.connection_state(&previous) != BthfConnectionState::Connected {
            if let Some(fallback) = self.registry.fallback_candidate(Some(previous)) {
                info!("[{}] Falling back to {}", previous, fallback);
                if self.activate(fallback) {
                    return true;
                }
                warn!("[{}] Fallback to {} failed", previous, fallback);
            }
        }

        if self.voice_recognition_started {
            self.stop_voice_recognition_impl(previous);
        }
        if self.virtual_call_started {
            self.stop_virtual_call_impl();
        }
        if self.registry.audio_state(&previous) != BthfAudioState::Disconnected {
            self.disconnect_audio_from(previous);
        }

        if !self.native.set_active_device(None) {
            error!("[{}] Native layer refused to clear the active device", previous);
        }
        self.active_device = None;

        info!("Active device {} -> none", previous);
        self.notify_active_device_changed();
        true
    }

    fn restore_active_device(&mut self, previous: Option<RawAddress>) {
        self.active_device = previous;
        if !self.native.set_active_device(previous) {
            error!("Native layer refused to restore active device {:?}", previous);
        }
    }
}
