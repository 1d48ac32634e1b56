//! Camera session: open/close lifetime, property batches and profiles.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::codec::{self, PropertyKind, PropertyValue, AF_MODE_MANUAL};
use crate::events::{CameraEvent, EventBridge, ObjectCallback, PropertyCallback, SdkEvent};
use crate::traits::{
    CameraError, Capacity, DeviceSdk, ObjectEventKind, PropId, Result, SaveTarget,
};

/// Value reported for properties the attached body cannot read back.
const UNREADABLE: &str = "-1";

/// Properties tracked by [`Camera::get_properties`] and
/// [`Camera::list_supported`], in read order.
const TRACKED: &[(PropertyKind, PropId)] = &[
    (PropertyKind::Aperture, PropId::Av),
    (PropertyKind::Shutter, PropId::Tv),
    (PropertyKind::Iso, PropId::IsoSpeed),
    (PropertyKind::AeMode, PropId::AeMode),
    (PropertyKind::Metering, PropId::MeteringMode),
    (PropertyKind::WhiteBalance, PropId::WhiteBalance),
    (PropertyKind::ImageQuality, PropId::ImageQuality),
    (PropertyKind::DriveMode, PropId::DriveMode),
    (PropertyKind::AfMode, PropId::AfMode),
    (PropertyKind::EvfAfMode, PropId::EvfAfMode),
];

/// Session configuration passed to [`Camera::open`].
#[derive(Debug, Clone)]
pub struct CameraOptions {
    /// Device index to open.
    pub index: u32,
    /// Directory captured images are saved into.
    pub save_dir: PathBuf,
    /// Where the camera stores captures.
    pub save_to: SaveTarget,
    /// Advertise unlimited host capacity on open.
    pub auto_capacity: bool,
    /// Register the property-event handler (failure is non-fatal).
    pub register_property_events: bool,
    /// Filename pattern for saved captures; see [`crate::capture`].
    pub file_pattern: Option<String>,
    /// Starting value of the per-session `{seq}` counter.
    pub seq_start: u32,
}

impl Default for CameraOptions {
    fn default() -> Self {
        Self {
            index: 0,
            save_dir: PathBuf::from("."),
            save_to: SaveTarget::Host,
            auto_capacity: true,
            register_property_events: true,
            file_pattern: None,
            seq_start: 1,
        }
    }
}

impl CameraOptions {
    /// Options for device 0 with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the device index to open.
    #[must_use]
    pub const fn index(mut self, index: u32) -> Self {
        self.index = index;
        self
    }

    /// Set the save directory.
    #[must_use]
    pub fn save_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.save_dir = dir.into();
        self
    }

    /// Set where the camera stores captures.
    #[must_use]
    pub const fn save_to(mut self, save_to: SaveTarget) -> Self {
        self.save_to = save_to;
        self
    }

    /// Enable or disable the automatic capacity advertisement.
    #[must_use]
    pub const fn auto_capacity(mut self, enabled: bool) -> Self {
        self.auto_capacity = enabled;
        self
    }

    /// Enable or disable property-event registration.
    #[must_use]
    pub const fn register_property_events(mut self, enabled: bool) -> Self {
        self.register_property_events = enabled;
        self
    }

    /// Set the capture filename pattern.
    #[must_use]
    pub fn file_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.file_pattern = Some(pattern.into());
        self
    }

    /// Set the starting `{seq}` counter value.
    #[must_use]
    pub const fn seq_start(mut self, seq: u32) -> Self {
        self.seq_start = seq;
        self
    }
}

/// A batch of optional property values for [`Camera::set_properties`].
#[derive(Debug, Clone, Default)]
pub struct PropertySettings {
    /// Aperture, e.g. `5.6` or `"f/5.6"`.
    pub av: Option<PropertyValue>,
    /// Shutter speed, e.g. `"1/125"` or `0.5`.
    pub tv: Option<PropertyValue>,
    /// ISO, e.g. `400` or `"auto"`.
    pub iso: Option<PropertyValue>,
    /// Auto-exposure mode.
    pub ae_mode: Option<PropertyValue>,
    /// Metering mode.
    pub metering: Option<PropertyValue>,
    /// White balance.
    pub white_balance: Option<PropertyValue>,
    /// Image quality.
    pub image_quality: Option<PropertyValue>,
    /// Drive mode.
    pub drive_mode: Option<PropertyValue>,
    /// Convenience flag; `Some(true)` takes precedence over `af_mode`.
    pub manual_focus: Option<bool>,
    /// Autofocus mode.
    pub af_mode: Option<PropertyValue>,
    /// Live-view autofocus mode.
    pub evf_af_mode: Option<PropertyValue>,
}

impl PropertySettings {
    /// Empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the aperture.
    #[must_use]
    pub fn av(mut self, value: impl Into<PropertyValue>) -> Self {
        self.av = Some(value.into());
        self
    }

    /// Set the shutter speed.
    #[must_use]
    pub fn tv(mut self, value: impl Into<PropertyValue>) -> Self {
        self.tv = Some(value.into());
        self
    }

    /// Set the ISO speed.
    #[must_use]
    pub fn iso(mut self, value: impl Into<PropertyValue>) -> Self {
        self.iso = Some(value.into());
        self
    }

    /// Set the auto-exposure mode.
    #[must_use]
    pub fn ae_mode(mut self, value: impl Into<PropertyValue>) -> Self {
        self.ae_mode = Some(value.into());
        self
    }

    /// Set the metering mode.
    #[must_use]
    pub fn metering(mut self, value: impl Into<PropertyValue>) -> Self {
        self.metering = Some(value.into());
        self
    }

    /// Set the white balance.
    #[must_use]
    pub fn white_balance(mut self, value: impl Into<PropertyValue>) -> Self {
        self.white_balance = Some(value.into());
        self
    }

    /// Set the image quality.
    #[must_use]
    pub fn image_quality(mut self, value: impl Into<PropertyValue>) -> Self {
        self.image_quality = Some(value.into());
        self
    }

    /// Set the drive mode.
    #[must_use]
    pub fn drive_mode(mut self, value: impl Into<PropertyValue>) -> Self {
        self.drive_mode = Some(value.into());
        self
    }

    /// Request manual focus; overrides `af_mode` when `true`.
    #[must_use]
    pub const fn manual_focus(mut self, enabled: bool) -> Self {
        self.manual_focus = Some(enabled);
        self
    }

    /// Set the autofocus mode.
    #[must_use]
    pub fn af_mode(mut self, value: impl Into<PropertyValue>) -> Self {
        self.af_mode = Some(value.into());
        self
    }

    /// Set the live-view autofocus mode.
    #[must_use]
    pub fn evf_af_mode(mut self, value: impl Into<PropertyValue>) -> Self {
        self.evf_af_mode = Some(value.into());
        self
    }
}

/// Snapshot of the tracked properties, as display strings.
///
/// Serializes to the external profile document with its fixed key names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraProfile {
    /// Aperture display string.
    #[serde(rename = "Av")]
    pub av: String,
    /// Shutter-speed display string.
    #[serde(rename = "Tv")]
    pub tv: String,
    /// ISO display string.
    #[serde(rename = "ISO")]
    pub iso: String,
    /// Save-to destination.
    #[serde(rename = "SaveTo")]
    pub save_to: String,
    /// Auto-exposure mode name.
    #[serde(rename = "AEMode")]
    pub ae_mode: String,
    /// Metering mode name.
    #[serde(rename = "MeteringMode")]
    pub metering: String,
    /// White balance name.
    #[serde(rename = "WhiteBalance")]
    pub white_balance: String,
    /// Image quality name.
    #[serde(rename = "ImageQuality")]
    pub image_quality: String,
    /// Drive mode name.
    #[serde(rename = "DriveMode")]
    pub drive_mode: String,
    /// Autofocus mode name, or `-1` when unreadable.
    #[serde(rename = "AFMode")]
    pub af_mode: String,
    /// Live-view autofocus mode name, or `-1` when unreadable.
    #[serde(rename = "EvfAFMode")]
    pub evf_af_mode: String,
}

/// Controller for one open device session.
///
/// Owns the SDK handle and the installed callback bindings for its lifetime;
/// the session is closed (best-effort) on drop.
pub struct Camera<S: DeviceSdk> {
    pub(crate) sdk: S,
    pub(crate) bridge: EventBridge,
    pub(crate) open: bool,
    pub(crate) save_dir: PathBuf,
    pub(crate) file_pattern: Option<String>,
    pub(crate) seq: u32,
    pub(crate) pending_filename: Option<String>,
    pub(crate) saved_paths: Vec<PathBuf>,
    pub(crate) live_view_on: bool,
    pub(crate) temp_counter: u32,
}

impl<S: DeviceSdk> fmt::Debug for Camera<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Camera")
            .field("open", &self.open)
            .field("save_dir", &self.save_dir)
            .field("file_pattern", &self.file_pattern)
            .field("seq", &self.seq)
            .field("pending_filename", &self.pending_filename)
            .field("saved_paths", &self.saved_paths)
            .field("live_view_on", &self.live_view_on)
            .field("temp_counter", &self.temp_counter)
            .finish_non_exhaustive()
    }
}

impl<S: DeviceSdk> Camera<S> {
    /// Open a session with the device selected by `options.index`.
    ///
    /// Fails with [`CameraError::NoCameraFound`] when no devices are attached
    /// and [`CameraError::IndexOutOfRange`] when the index exceeds the device
    /// count; the SDK is torn down again on every failure path.
    pub fn open(mut sdk: S, options: CameraOptions) -> Result<Self> {
        sdk.init()?;

        let count = match sdk.device_count() {
            Ok(count) => count,
            Err(err) => {
                Self::terminate_quietly(&mut sdk);
                return Err(err);
            }
        };
        if count == 0 {
            Self::terminate_quietly(&mut sdk);
            return Err(CameraError::NoCameraFound);
        }
        if options.index >= count {
            Self::terminate_quietly(&mut sdk);
            return Err(CameraError::IndexOutOfRange {
                index: options.index,
                count,
            });
        }

        if let Err(err) = sdk.open_session(options.index) {
            Self::terminate_quietly(&mut sdk);
            return Err(err);
        }

        let mut camera = Self {
            sdk,
            bridge: EventBridge::new(),
            open: true,
            save_dir: options.save_dir,
            file_pattern: options.file_pattern,
            seq: options.seq_start,
            pending_filename: None,
            saved_paths: Vec::new(),
            live_view_on: false,
            temp_counter: 0,
        };

        if let Err(err) = camera.install_handlers(options.register_property_events) {
            camera.close();
            return Err(err);
        }
        if let Err(err) = camera.sdk.set_property(PropId::SaveTo, options.save_to.code()) {
            camera.close();
            return Err(err);
        }
        if options.auto_capacity {
            if let Err(err) = camera.sdk.set_capacity(&Capacity::default()) {
                camera.close();
                return Err(err);
            }
        }

        info!("camera session opened (index {})", options.index);
        Ok(camera)
    }

    fn install_handlers(&mut self, register_property_events: bool) -> Result<()> {
        let tx = self.bridge.sender();
        self.sdk.register_object_handler(Box::new(move |kind, handle| {
            // vendor context: hand off and return immediately
            let _ = tx.send(SdkEvent::Object { kind, handle });
        }))?;

        if register_property_events {
            let tx = self.bridge.sender();
            let result = self.sdk.register_property_handler(Box::new(move |kind, prop, param| {
                let _ = tx.send(SdkEvent::Property { kind, prop, param });
            }));
            if let Err(err) = result {
                // many bodies do not support property events
                warn!("skip property events: {err}");
            }
        }
        Ok(())
    }

    fn terminate_quietly(sdk: &mut S) {
        if let Err(err) = sdk.terminate() {
            warn!("SDK teardown failed: {err}");
        }
    }

    /// Close the session. Idempotent and best-effort: both the session close
    /// and the SDK teardown are always attempted, failures only logged.
    pub fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        self.live_view_on = false;
        if let Err(err) = self.sdk.close_session() {
            warn!("session close failed: {err}");
        }
        Self::terminate_quietly(&mut self.sdk);
        info!("camera session closed");
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(CameraError::SessionClosed)
        }
    }

    /// Parse, validate and apply a batch of property values, in field order.
    ///
    /// With `validate`, each parsed code is checked against the device's
    /// supported set (an empty descriptor cannot be checked and is accepted).
    /// With `tolerate_unsupported`, AE-mode and AF-mode settings the device
    /// rejects are dropped silently instead of failing the batch; these two
    /// are read-only on many bodies.
    pub fn set_properties(
        &mut self,
        settings: &PropertySettings,
        validate: bool,
        tolerate_unsupported: bool,
    ) -> Result<()> {
        self.ensure_open()?;

        fn push_parsed(
            to_set: &mut Vec<(PropertyKind, PropId, u32)>,
            kind: PropertyKind,
            pid: PropId,
            value: Option<&PropertyValue>,
        ) -> Result<()> {
            if let Some(value) = value {
                let code = codec::parse(kind, value)?;
                to_set.push((kind, pid, code));
            }
            Ok(())
        }

        let mut to_set: Vec<(PropertyKind, PropId, u32)> = Vec::new();
        push_parsed(&mut to_set, PropertyKind::Aperture, PropId::Av, settings.av.as_ref())?;
        push_parsed(&mut to_set, PropertyKind::Shutter, PropId::Tv, settings.tv.as_ref())?;
        push_parsed(&mut to_set, PropertyKind::Iso, PropId::IsoSpeed, settings.iso.as_ref())?;
        push_parsed(&mut to_set, PropertyKind::AeMode, PropId::AeMode, settings.ae_mode.as_ref())?;
        push_parsed(
            &mut to_set,
            PropertyKind::Metering,
            PropId::MeteringMode,
            settings.metering.as_ref(),
        )?;
        push_parsed(
            &mut to_set,
            PropertyKind::WhiteBalance,
            PropId::WhiteBalance,
            settings.white_balance.as_ref(),
        )?;
        push_parsed(
            &mut to_set,
            PropertyKind::ImageQuality,
            PropId::ImageQuality,
            settings.image_quality.as_ref(),
        )?;
        push_parsed(
            &mut to_set,
            PropertyKind::DriveMode,
            PropId::DriveMode,
            settings.drive_mode.as_ref(),
        )?;
        if settings.manual_focus == Some(true) {
            to_set.push((PropertyKind::AfMode, PropId::AfMode, AF_MODE_MANUAL));
        } else {
            push_parsed(&mut to_set, PropertyKind::AfMode, PropId::AfMode, settings.af_mode.as_ref())?;
        }
        push_parsed(
            &mut to_set,
            PropertyKind::EvfAfMode,
            PropId::EvfAfMode,
            settings.evf_af_mode.as_ref(),
        )?;

        if validate {
            let mut filtered = Vec::with_capacity(to_set.len());
            for (kind, pid, code) in to_set {
                let supported = self.sdk.supported_codes(pid).unwrap_or_default();
                if !supported.is_empty() && !supported.contains(&code) {
                    if tolerate_unsupported && Self::tolerated(pid) {
                        info!("skip unsupported {} during validate: {code}", pid.name());
                        continue;
                    }
                    return Err(CameraError::UnsupportedValue {
                        kind: kind.name(),
                        value: codec::format(kind, code),
                    });
                }
                filtered.push((kind, pid, code));
            }
            to_set = filtered;
        }

        for (_, pid, code) in to_set {
            debug!("set {} -> {code}", pid.name());
            if let Err(err) = self.sdk.set_property(pid, code) {
                if tolerate_unsupported && Self::tolerated(pid) {
                    warn!("skip unsupported {}: {err}", pid.name());
                    continue;
                }
                return Err(err);
            }
        }
        Ok(())
    }

    /// Property kinds that are read-only on many bodies and may be dropped
    /// under the tolerate-unsupported policy.
    const fn tolerated(pid: PropId) -> bool {
        matches!(pid, PropId::AeMode | PropId::AfMode)
    }

    /// Read back all tracked properties as display strings.
    ///
    /// AF mode and live-view AF mode are unreadable on many bodies and report
    /// the `-1` sentinel instead of failing the whole read.
    pub fn get_properties(&mut self) -> Result<CameraProfile> {
        self.ensure_open()?;
        let read = |sdk: &mut S, kind: PropertyKind, pid: PropId| -> Result<String> {
            sdk.get_property(pid).map(|code| codec::format(kind, code))
        };
        Ok(CameraProfile {
            av: read(&mut self.sdk, PropertyKind::Aperture, PropId::Av)?,
            tv: read(&mut self.sdk, PropertyKind::Shutter, PropId::Tv)?,
            iso: read(&mut self.sdk, PropertyKind::Iso, PropId::IsoSpeed)?,
            save_to: read(&mut self.sdk, PropertyKind::SaveTo, PropId::SaveTo)?,
            ae_mode: read(&mut self.sdk, PropertyKind::AeMode, PropId::AeMode)?,
            metering: read(&mut self.sdk, PropertyKind::Metering, PropId::MeteringMode)?,
            white_balance: read(&mut self.sdk, PropertyKind::WhiteBalance, PropId::WhiteBalance)?,
            image_quality: read(&mut self.sdk, PropertyKind::ImageQuality, PropId::ImageQuality)?,
            drive_mode: read(&mut self.sdk, PropertyKind::DriveMode, PropId::DriveMode)?,
            af_mode: self.safe_display(PropertyKind::AfMode, PropId::AfMode),
            evf_af_mode: self.safe_display(PropertyKind::EvfAfMode, PropId::EvfAfMode),
        })
    }

    fn safe_display(&mut self, kind: PropertyKind, pid: PropId) -> String {
        self.sdk
            .get_property(pid)
            .map_or_else(|_| UNREADABLE.to_owned(), |code| codec::format(kind, code))
    }

    /// Display strings of the codes the device reports as supported, per
    /// property. When the device cannot report a descriptor, the codec's
    /// whole table is returned as a hint.
    pub fn list_supported(&mut self) -> Result<BTreeMap<String, Vec<String>>> {
        self.ensure_open()?;
        let mut supported = BTreeMap::new();
        for &(kind, pid) in TRACKED {
            let codes = self.sdk.supported_codes(pid).unwrap_or_default();
            let values = if codes.is_empty() {
                codec::display_table(kind)
            } else {
                codes.into_iter().map(|code| codec::format(kind, code)).collect()
            };
            supported.insert(kind.name().to_owned(), values);
        }
        Ok(supported)
    }

    /// Save the current properties to a JSON profile document.
    pub fn save_profile(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let profile = self.get_properties()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(&profile)?)?;
        info!("profile saved: {}", path.display());
        Ok(())
    }

    /// Load a JSON profile document and optionally re-apply it.
    ///
    /// Application uses the same semantics as [`Camera::set_properties`]; the
    /// manual-focus flag is set when the profile's AF mode is `ManualFocus`.
    pub fn load_profile(
        &mut self,
        path: impl AsRef<Path>,
        apply: bool,
        validate: bool,
    ) -> Result<CameraProfile> {
        let path = path.as_ref();
        let profile: CameraProfile = serde_json::from_str(&fs::read_to_string(path)?)?;
        if apply {
            let mut settings = PropertySettings::new()
                .av(profile.av.clone())
                .tv(profile.tv.clone())
                .iso(profile.iso.clone())
                .ae_mode(profile.ae_mode.clone())
                .metering(profile.metering.clone())
                .white_balance(profile.white_balance.clone())
                .image_quality(profile.image_quality.clone())
                .drive_mode(profile.drive_mode.clone())
                .af_mode(profile.af_mode.clone())
                .evf_af_mode(profile.evf_af_mode.clone());
            if profile.af_mode == "ManualFocus" {
                settings = settings.manual_focus(true);
            }
            self.set_properties(&settings, validate, false)?;
        }
        info!("profile loaded: {}", path.display());
        Ok(profile)
    }

    /// Register a caller callback for object events.
    pub fn on_object(&mut self, callback: ObjectCallback) {
        self.bridge.set_object_callback(Some(callback));
    }

    /// Register a caller callback for property events.
    pub fn on_property(&mut self, callback: PropertyCallback) {
        self.bridge.set_property_callback(Some(callback));
    }

    /// Enable the structured event queue and return its consuming end.
    ///
    /// Queue delivery is independent of the registered callbacks; both may be
    /// active at once.
    pub fn enable_events(&mut self) -> Receiver<CameraEvent> {
        self.bridge.enable_queue()
    }

    /// Disable the structured event queue.
    pub fn disable_events(&mut self) {
        self.bridge.disable_queue();
    }

    /// Tick the vendor message pump and process everything it delivered.
    pub fn pump(&mut self) -> Result<()> {
        self.sdk.pump_events();
        self.process_events()
    }

    /// Drain the bridge: download requested transfers, publish structured
    /// records and dispatch caller callbacks, in arrival order.
    pub(crate) fn process_events(&mut self) -> Result<()> {
        for event in self.bridge.drain() {
            match event {
                SdkEvent::Object {
                    kind: kind @ ObjectEventKind::DirItemRequestTransfer,
                    handle,
                } => {
                    let path = self.save_transfer_item(handle)?;
                    self.saved_paths.push(path.clone());
                    self.bridge.publish(CameraEvent::object(kind, Some(path)));
                    self.bridge.dispatch_object(kind, handle);
                }
                SdkEvent::Object { kind, handle } => {
                    self.bridge.publish(CameraEvent::object(kind, None));
                    self.bridge.dispatch_object(kind, handle);
                }
                SdkEvent::Property { kind, prop, param } => {
                    self.bridge.publish(CameraEvent::property(kind, prop, param));
                    self.bridge.dispatch_property(kind, prop, param);
                }
            }
        }
        Ok(())
    }

    /// Directory captures are saved into.
    #[must_use]
    pub fn save_directory(&self) -> &Path {
        &self.save_dir
    }
}

impl<S: DeviceSdk> Drop for Camera<S> {
    fn drop(&mut self) {
        self.close();
    }
}
