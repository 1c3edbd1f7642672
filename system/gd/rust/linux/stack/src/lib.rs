//! Floss Hands-Free Profile Audio Gateway.
//!
//! This crate coordinates every hands-free device known to the Audio Gateway: it keeps the
//! registry of per-device sessions, arbitrates the single active device that owns SCO, keeps the
//! audio modes (telephony call, virtual call, voice recognition) mutually exclusive and runs the
//! dialing-out and voice recognition confirmation timers. The per-device state machines, the
//! native HFP interface and telephony are consumed through the traits in [`session`], [`native`]
//! and [`system`].

#[macro_use]
extern crate num_derive;

pub mod address;
pub mod callbacks;
pub mod config;
pub mod headset;
pub mod hfp_logging;
pub mod native;
pub mod registry;
pub mod session;
pub mod status;
pub mod system;
pub mod timeout;

use log::{debug, info};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::channel;
use tokio::sync::mpsc::{Receiver, Sender};

pub use crate::address::RawAddress;
pub use crate::status::HfpStatus;

use crate::headset::{HeadsetService, HfpActions};

/// Message types that are sent to the stack main dispatch loop.
#[derive(Debug)]
pub enum Message {
    /// Reports from device sessions and fired timers.
    Hfp(HfpActions),
    /// An observer registered through `IBluetoothHeadset::register_callback` went away.
    HeadsetCallbackDisconnected(u32),
}

/// Umbrella class for the HFP Audio Gateway.
pub struct Stack {}

impl Stack {
    /// Creates an mpsc channel for passing messages to the main dispatch loop.
    pub fn create_channel() -> (Sender<Message>, Receiver<Message>) {
        channel::<Message>(1)
    }

    /// Runs the main dispatch loop.
    ///
    /// Every session report, timer expiry and callback disconnection is handled here with the
    /// headset lock held, so they are strictly ordered with respect to each other and to any
    /// caller holding the same lock.
    pub async fn dispatch(mut rx: Receiver<Message>, headset: Arc<Mutex<Box<HeadsetService>>>) {
        loop {
            let m = match rx.recv().await {
                Some(m) => m,
                None => {
                    info!("Message dispatch loop quit");
                    break;
                }
            };

            match m {
                Message::Hfp(action) => {
                    debug!("Dispatching {:?}", action);
                    headset.lock().unwrap().handle_action(action);
                }

                Message::HeadsetCallbackDisconnected(id) => {
                    headset.lock().unwrap().callback_disconnected(id);
                }
            }
        }
    }
}

/// Signifies that the object may be a proxy to a remote RPC object.
///
/// An object that implements RPCProxy trait signifies that the object may be a proxy to a remote
/// RPC object. Therefore the object may be disconnected and thus should implement
/// `register_disconnect` to let others observe the disconnection event.
pub trait RPCProxy {
    /// Registers disconnect observer that will be notified when the remote object is disconnected.
    /// `id` is the identifier the observer list assigned to this object.
    fn register_disconnect(&mut self, _id: u32, _f: Box<dyn Fn(u32) + Send>) {}

    /// Stops watching for disconnection of the object registered with `id`.
    fn unregister(&mut self, _id: u32) -> bool {
        false
    }
}
