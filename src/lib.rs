//! Tethercam: tethered camera control behind an opaque vendor-SDK boundary.
//!
//! This library drives a tethered camera through a vendor device SDK: it
//! opens a session, translates human-friendly property values (`"f/5.6"`,
//! `"1/125"`, `"Auto"`) to device codes and back, triggers captures that are
//! completed by asynchronous transfer callbacks, and polls live-view frames
//! with transient-error retry. The SDK itself is abstracted behind
//! [`DeviceSdk`], so tests (and the demo binary) run against the scripted
//! [`MockSdk`].

pub mod capture;
pub mod codec;
pub mod events;
pub mod live_view;
pub mod mock;
pub mod session;
pub mod traits;

pub use capture::CaptureRequest;
pub use codec::{PropertyKind, PropertyValue};
pub use events::{CameraEvent, ObjectCallback, PropertyCallback};
pub use live_view::LiveViewData;
pub use mock::MockSdk;
pub use session::{Camera, CameraOptions, CameraProfile, PropertySettings};
pub use traits::{
    CameraError, Capacity, DeviceSdk, ErrorInfo, ObjectEventKind, ObjectHandle, ObjectInfo,
    PropId, PropertyEventKind, Result, SaveTarget,
};
