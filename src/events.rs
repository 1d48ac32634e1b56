//! Bridge between vendor callback context and the consumer thread.
//!
//! Vendor callbacks only push raw [`SdkEvent`] records into a channel; all
//! real work (downloads, caller callbacks, the structured event queue)
//! happens when the consumer drains the channel during its pump loops. The
//! channel is the single hand-off point between the two contexts, so no
//! shared lock is needed.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, Sender};

use log::warn;
use serde::Serialize;

use crate::traits::{ObjectEventKind, ObjectHandle, PropId, PropertyEventKind};

/// Raw event as forwarded from the vendor callback context.
#[derive(Debug, Clone, Copy)]
pub enum SdkEvent {
    /// An object event (transfer request, item created...).
    Object {
        /// Event kind.
        kind: ObjectEventKind,
        /// Handle of the object the event refers to.
        handle: ObjectHandle,
    },
    /// A property event.
    Property {
        /// Event kind.
        kind: PropertyEventKind,
        /// Property the event refers to.
        prop: PropId,
        /// Vendor-defined event parameter.
        param: u32,
    },
}

/// Structured event record delivered on the consumer queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CameraEvent {
    /// Event family: `"object"` or `"property"`.
    pub kind: &'static str,
    /// Event name, e.g. `"DirItemRequestTransfer"`.
    pub event: &'static str,
    /// Saved file path, for completed transfers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Property name, for property events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property: Option<&'static str>,
    /// Event parameter, for property events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<u32>,
}

impl CameraEvent {
    /// Record for an object event, with the saved path when one was produced.
    #[must_use]
    pub const fn object(event: ObjectEventKind, path: Option<PathBuf>) -> Self {
        Self {
            kind: "object",
            event: event.name(),
            path,
            property: None,
            param: None,
        }
    }

    /// Record for a property event.
    #[must_use]
    pub const fn property(event: PropertyEventKind, prop: PropId, param: u32) -> Self {
        Self {
            kind: "property",
            event: event.name(),
            path: None,
            property: Some(prop.name()),
            param: Some(param),
        }
    }
}

/// Caller callback for object events. The return value mirrors the vendor
/// callback convention; `0` is the neutral "handled" code.
pub type ObjectCallback = Box<dyn FnMut(ObjectEventKind, ObjectHandle) -> u32 + Send>;

/// Caller callback for property events.
pub type PropertyCallback = Box<dyn FnMut(PropertyEventKind, PropId, u32) -> u32 + Send>;

/// Consumer-side event bridge owned by the session.
pub(crate) struct EventBridge {
    raw_tx: Sender<SdkEvent>,
    raw_rx: Receiver<SdkEvent>,
    object_cb: Option<ObjectCallback>,
    property_cb: Option<PropertyCallback>,
    queue_tx: Option<Sender<CameraEvent>>,
}

impl EventBridge {
    pub(crate) fn new() -> Self {
        let (raw_tx, raw_rx) = channel();
        Self {
            raw_tx,
            raw_rx,
            object_cb: None,
            property_cb: None,
            queue_tx: None,
        }
    }

    /// Sender handed to the vendor-context handler shims.
    pub(crate) fn sender(&self) -> Sender<SdkEvent> {
        self.raw_tx.clone()
    }

    /// Pull every raw event currently pending, in arrival order.
    pub(crate) fn drain(&self) -> Vec<SdkEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.raw_rx.try_recv() {
            events.push(event);
        }
        events
    }

    pub(crate) fn set_object_callback(&mut self, cb: Option<ObjectCallback>) {
        self.object_cb = cb;
    }

    pub(crate) fn set_property_callback(&mut self, cb: Option<PropertyCallback>) {
        self.property_cb = cb;
    }

    /// Enable the structured event queue and return its receiving end.
    pub(crate) fn enable_queue(&mut self) -> Receiver<CameraEvent> {
        let (tx, rx) = channel();
        self.queue_tx = Some(tx);
        rx
    }

    pub(crate) fn disable_queue(&mut self) {
        self.queue_tx = None;
    }

    /// Push a structured record onto the queue, if one is enabled.
    ///
    /// A disconnected receiver silently disables the queue.
    pub(crate) fn publish(&mut self, event: CameraEvent) {
        if let Some(tx) = &self.queue_tx {
            if tx.send(event).is_err() {
                self.queue_tx = None;
            }
        }
    }

    /// Dispatch to the caller's object callback, if installed.
    ///
    /// A panicking callback is converted to the neutral return code so it
    /// cannot poison the event pipeline.
    pub(crate) fn dispatch_object(&mut self, kind: ObjectEventKind, handle: ObjectHandle) -> u32 {
        match &mut self.object_cb {
            Some(cb) => catch_unwind(AssertUnwindSafe(|| cb(kind, handle))).unwrap_or_else(|_| {
                warn!("object callback panicked for {}", kind.name());
                0
            }),
            None => 0,
        }
    }

    /// Dispatch to the caller's property callback, if installed.
    pub(crate) fn dispatch_property(
        &mut self,
        kind: PropertyEventKind,
        prop: PropId,
        param: u32,
    ) -> u32 {
        match &mut self.property_cb {
            Some(cb) => catch_unwind(AssertUnwindSafe(|| cb(kind, prop, param))).unwrap_or_else(
                |_| {
                    warn!("property callback panicked for {}", kind.name());
                    0
                },
            ),
            None => 0,
        }
    }
}
