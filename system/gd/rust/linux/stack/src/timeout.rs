//! Confirmation timers for requests made by a headset.

use log::debug;
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tokio::time;
use tokio::time::Duration;

use crate::address::RawAddress;
use crate::headset::HfpActions;
use crate::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    /// Waiting for telephony to report that a call requested by the headset is dialing.
    DialingOut,
    /// Waiting for the platform to start voice recognition requested by the headset.
    VoiceRecognition,
}

impl TimeoutKind {
    fn expired_action(&self, id: u64) -> HfpActions {
        match self {
            TimeoutKind::DialingOut => HfpActions::DialingOutTimeout(id),
            TimeoutKind::VoiceRecognition => HfpActions::VoiceRecognitionTimeout(id),
        }
    }
}

/// A request waiting for confirmation.
///
/// The timer task only sleeps and posts the expiry into the dispatch loop, so a finished timer
/// does not mean its expiry was handled. The handler of that message compares ids and checks
/// `is_confirmed`.
#[derive(Debug)]
pub struct PendingEvent {
    pub device: RawAddress,
    pub id: u64,
    timer: Option<JoinHandle<()>>,
    confirmed: bool,
}

impl PendingEvent {
    /// Stops the timer. The event itself stays pending.
    fn disarm(&mut self) {
        if let Some(h) = self.timer.take() {
            h.abort();
        }
    }

    /// Marks the request as answered and stops the timer. An expiry already queued is stale.
    pub fn confirm(&mut self) {
        self.confirmed = true;
        self.disarm();
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }
}

impl Drop for PendingEvent {
    fn drop(&mut self) {
        self.disarm();
    }
}

/// Arms timers that report back through the stack dispatch channel.
pub struct TimeoutScheduler {
    tx: Sender<Message>,
    last_id: u64,
}

impl TimeoutScheduler {
    pub fn new(tx: Sender<Message>) -> Self {
        Self { tx, last_id: 0 }
    }

    /// Arms a timer of `kind` for `device` expiring after `timeout`.
    pub fn schedule(
        &mut self,
        kind: TimeoutKind,
        device: RawAddress,
        timeout: Duration,
    ) -> PendingEvent {
        self.last_id += 1;
        let id = self.last_id;
        let tx = self.tx.clone();

        debug!("[{}] Arming {:?} timer {} for {:?}", device, kind, id, timeout);
        let timer = tokio::spawn(async move {
            time::sleep(timeout).await;
            let _result = tx.send(Message::Hfp(kind.expired_action(id))).await;
        });

        PendingEvent { device, id, timer: Some(timer), confirmed: false }
    }
}
