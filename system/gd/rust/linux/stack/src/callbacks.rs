//! Observers registered with the headset service.

use std::collections::BTreeMap;
use tokio::sync::mpsc::Sender;

use crate::{Message, RPCProxy};

/// Observers keyed by the id handed out at registration.
///
/// Observers are notified in registration order.
pub struct Callbacks<T: Send + ?Sized> {
    observers: BTreeMap<u32, Box<T>>,
    last_id: u32,
    tx: Sender<Message>,
    on_disconnect: fn(u32) -> Message,
}

impl<T: RPCProxy + Send + ?Sized> Callbacks<T> {
    /// `on_disconnect` builds the message posted to `tx` when an observer goes away.
    pub fn new(tx: Sender<Message>, on_disconnect: fn(u32) -> Message) -> Self {
        Self { observers: BTreeMap::new(), last_id: 0, tx, on_disconnect }
    }

    /// Registers `observer` and returns its id.
    ///
    /// If the observer reports a disconnection, the message built by `on_disconnect` is posted
    /// and its handler is expected to call `remove_callback`.
    pub fn add_callback(&mut self, mut observer: Box<T>) -> u32 {
        self.last_id += 1;
        let id = self.last_id;

        let tx = self.tx.clone();
        let on_disconnect = self.on_disconnect;
        observer.register_disconnect(
            id,
            Box::new(move |gone| {
                let tx = tx.clone();
                tokio::spawn(async move {
                    let _result = tx.send(on_disconnect(gone)).await;
                });
            }),
        );

        self.observers.insert(id, observer);
        id
    }

    /// Drops the observer `id`. Returns false if there is none.
    pub fn remove_callback(&mut self, id: u32) -> bool {
        match self.observers.remove(&id) {
            Some(mut observer) => {
                observer.unregister(id);
                true
            }
            None => false,
        }
    }

    pub fn for_all_callbacks<F: FnMut(&mut Box<T>)>(&mut self, mut f: F) {
        self.observers.values_mut().for_each(|observer| f(observer));
    }
}
