//! Core traits and types for the vendor-SDK boundary.
//!
//! Everything the controller needs from the vendor SDK is expressed through
//! the [`DeviceSdk`] trait, so production code can bind a real FFI port while
//! tests drive the scripted [`crate::mock::MockSdk`].

use std::path::Path;

use serde::Serialize;
use thiserror::Error;

/// Device property identifiers understood by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropId {
    /// Aperture value.
    Av,
    /// Shutter speed.
    Tv,
    /// ISO speed.
    IsoSpeed,
    /// Destination for captured images (camera card, host, or both).
    SaveTo,
    /// Auto-exposure mode.
    AeMode,
    /// Metering mode.
    MeteringMode,
    /// White balance.
    WhiteBalance,
    /// Image quality / recording format.
    ImageQuality,
    /// Drive (shooting) mode.
    DriveMode,
    /// Autofocus mode.
    AfMode,
    /// Live-view autofocus mode.
    EvfAfMode,
    /// Live-view on/off.
    EvfMode,
    /// Live-view output routing.
    EvfOutputDevice,
}

impl PropId {
    /// Short name used in log lines.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Av => "Av",
            Self::Tv => "Tv",
            Self::IsoSpeed => "ISOSpeed",
            Self::SaveTo => "SaveTo",
            Self::AeMode => "AEMode",
            Self::MeteringMode => "MeteringMode",
            Self::WhiteBalance => "WhiteBalance",
            Self::ImageQuality => "ImageQuality",
            Self::DriveMode => "DriveMode",
            Self::AfMode => "AFMode",
            Self::EvfAfMode => "EvfAFMode",
            Self::EvfMode => "EvfMode",
            Self::EvfOutputDevice => "EvfOutputDevice",
        }
    }
}

/// Destination for captured images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveTarget {
    /// Keep images on the camera card.
    Camera,
    /// Transfer images to the host.
    #[default]
    Host,
    /// Write to both the card and the host.
    Both,
}

impl SaveTarget {
    /// Device code for this destination.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Camera => 1,
            Self::Host => 2,
            Self::Both => 3,
        }
    }
}

/// Host-side storage capacity reported to the device.
///
/// Cameras refuse host transfers unless the host advertises free space.
#[derive(Debug, Clone, Copy)]
pub struct Capacity {
    /// Reset the previously reported capacity first.
    pub reset: bool,
    /// Sector size in bytes.
    pub bytes_per_sector: u32,
    /// Number of free clusters to advertise.
    pub free_clusters: u32,
}

impl Default for Capacity {
    fn default() -> Self {
        Self {
            reset: true,
            bytes_per_sector: 512,
            free_clusters: 0x7FFF_FFFF,
        }
    }
}

/// Opaque handle to an object (captured image) living on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHandle(pub u64);

/// Metadata of a device object, as reported by the SDK.
#[derive(Debug, Clone, Default)]
pub struct ObjectInfo {
    /// File name the camera assigned, if any.
    pub file_name: Option<String>,
    /// Object size in bytes.
    pub size: u64,
}

/// Object-event kinds delivered by the vendor callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectEventKind {
    /// A captured object is ready and the device requests a host transfer.
    DirItemRequestTransfer,
    /// A directory item was created on the camera card.
    DirItemCreated,
    /// A directory item was removed.
    DirItemRemoved,
    /// Volume (card) information changed.
    VolumeUpdated,
}

impl ObjectEventKind {
    /// Event name as exposed in structured event records.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::DirItemRequestTransfer => "DirItemRequestTransfer",
            Self::DirItemCreated => "DirItemCreated",
            Self::DirItemRemoved => "DirItemRemoved",
            Self::VolumeUpdated => "VolumeUpdated",
        }
    }
}

/// Property-event kinds delivered by the vendor callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyEventKind {
    /// A property value changed.
    PropertyChanged,
    /// A property's supported-value descriptor changed.
    PropertyDescChanged,
}

impl PropertyEventKind {
    /// Event name as exposed in structured event records.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::PropertyChanged => "PropertyChanged",
            Self::PropertyDescChanged => "PropertyDescChanged",
        }
    }
}

/// Device error code for "object not ready yet" (transient).
pub const ERR_OBJECT_NOT_READY: u32 = 0x0000_A102;
/// Device error code for "device busy" (transient).
pub const ERR_DEVICE_BUSY: u32 = 0x0000_0081;

/// Error type for camera operations.
#[derive(Debug, Error)]
pub enum CameraError {
    /// No cameras were detected during session open.
    #[error("no cameras connected")]
    NoCameraFound,
    /// The requested device index exceeds the detected device count.
    #[error("camera index {index} out of range (found {count})")]
    IndexOutOfRange {
        /// Requested index.
        index: u32,
        /// Number of detected devices.
        count: u32,
    },
    /// A property value could not be parsed or is not accepted by the device.
    #[error("unsupported {kind} value: {value}")]
    UnsupportedValue {
        /// Property kind the value was given for.
        kind: &'static str,
        /// The offending input, as supplied.
        value: String,
    },
    /// The transfer wait (including retries) was exhausted.
    #[error("timed out waiting for image transfer event")]
    CaptureTimeout,
    /// The caller supplied an invalid argument combination.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A busy/not-ready device condition, expected to clear shortly.
    #[error("transient device error 0x{code:08X}: {message}")]
    DeviceTransient {
        /// Vendor error code.
        code: u32,
        /// Vendor error message.
        message: String,
    },
    /// Any other device-layer failure; not retried.
    #[error("device error: {message}")]
    DeviceTerminal {
        /// Vendor error code, when the failure carries one.
        code: Option<u32>,
        /// Vendor error message.
        message: String,
    },
    /// The external image decoder rejected the captured bytes.
    #[error(
        "image decode failed: {0}; this usually means the camera records \
         RAW-only image quality - switch to JPEG or JPEG+RAW and retry"
    )]
    DecodeFailure(String),
    /// An operation was invoked without an open session.
    #[error("camera session not open")]
    SessionClosed,
    /// I/O error while saving or reading captured data.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Profile document could not be serialized or deserialized.
    #[error("profile error: {0}")]
    Profile(#[from] serde_json::Error),
}

/// Structured `{code, message}` view of an error, for user reporting.
///
/// `code` is present only when the failure originated from the device layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    /// Vendor error code, when available.
    pub code: Option<u32>,
    /// Human-readable message.
    pub message: String,
}

impl CameraError {
    /// Structured error info: device-layer failures expose their vendor code.
    #[must_use]
    pub fn info(&self) -> ErrorInfo {
        let code = match self {
            Self::DeviceTransient { code, .. } => Some(*code),
            Self::DeviceTerminal { code, .. } => *code,
            _ => None,
        };
        ErrorInfo {
            code,
            message: self.to_string(),
        }
    }

    /// Whether this failure is a transient busy/not-ready condition.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::DeviceTransient { .. })
    }
}

/// Classify a raw vendor error code into the transient/terminal taxonomy.
#[must_use]
pub fn classify_device_error(code: u32, message: impl Into<String>) -> CameraError {
    let message = message.into();
    if code == ERR_OBJECT_NOT_READY || code == ERR_DEVICE_BUSY {
        CameraError::DeviceTransient { code, message }
    } else {
        CameraError::DeviceTerminal {
            code: Some(code),
            message,
        }
    }
}

/// Result type for camera operations.
pub type Result<T> = std::result::Result<T, CameraError>;

/// Handler invoked for object events (captured image ready, item created...).
pub type ObjectEventHandler = Box<dyn FnMut(ObjectEventKind, ObjectHandle) + Send>;

/// Handler invoked for property events.
pub type PropertyEventHandler = Box<dyn FnMut(PropertyEventKind, PropId, u32) + Send>;

/// Abstraction over the vendor camera SDK.
///
/// Mirrors the capability surface the controller consumes: session lifetime,
/// property access, capture trigger, event-handler registration and object
/// download. Any conforming implementation is interchangeable.
pub trait DeviceSdk {
    /// Initialize the SDK. Called once per session, before any other call.
    fn init(&mut self) -> Result<()>;

    /// Tear the SDK down. Best-effort counterpart of [`Self::init`].
    fn terminate(&mut self) -> Result<()>;

    /// Number of currently attached devices.
    fn device_count(&mut self) -> Result<u32>;

    /// Open a session with the device at `index`.
    fn open_session(&mut self, index: u32) -> Result<()>;

    /// Close the open session.
    fn close_session(&mut self) -> Result<()>;

    /// Read the current code of a property.
    fn get_property(&mut self, prop: PropId) -> Result<u32>;

    /// Write a property code to the device.
    fn set_property(&mut self, prop: PropId, code: u32) -> Result<()>;

    /// Codes the attached device currently accepts for `prop`.
    ///
    /// An empty vector means the device cannot report a descriptor for this
    /// property; callers must not treat that as "nothing supported".
    fn supported_codes(&mut self, prop: PropId) -> Result<Vec<u32>>;

    /// Advertise host storage capacity to the device.
    fn set_capacity(&mut self, capacity: &Capacity) -> Result<()>;

    /// Send the take-picture command.
    fn trigger(&mut self) -> Result<()>;

    /// Install the object-event handler for the session's lifetime.
    fn register_object_handler(&mut self, handler: ObjectEventHandler) -> Result<()>;

    /// Install the property-event handler.
    ///
    /// Many bodies do not support property events; callers treat failure as
    /// non-fatal.
    fn register_property_handler(&mut self, handler: PropertyEventHandler) -> Result<()>;

    /// Message-pump tick. Pending vendor callbacks fire inside this call.
    fn pump_events(&mut self);

    /// Metadata of a device object.
    fn object_info(&mut self, handle: ObjectHandle) -> Result<ObjectInfo>;

    /// Download a device object into `dest` and acknowledge completion.
    fn download_object(&mut self, handle: ObjectHandle, dest: &Path) -> Result<()>;

    /// Download one live-view frame into `dest`.
    fn download_live_frame(&mut self, dest: &Path) -> Result<()>;
}
