//! Scripted mock SDK for testing without hardware.
//!
//! The mock implements the full [`DeviceSdk`] surface with scriptable
//! behavior: transfer events fire a configurable number of pump ticks after a
//! trigger, property writes can be rejected, and live-view grabs follow a
//! step script of frames and failures. State lives behind an `Arc` so tests
//! can keep a [`MockSdk::clone`] for assertions after handing the mock to the
//! controller.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::traits::{
    classify_device_error, CameraError, Capacity, DeviceSdk, ObjectEventHandler, ObjectEventKind,
    ObjectHandle, ObjectInfo, PropId, PropertyEventHandler, Result,
};

/// Generic vendor error code used for scripted terminal failures.
pub const ERR_MOCK_GENERIC: u32 = 0x0000_2000;

/// One step of the live-view grab script.
#[derive(Debug, Clone, Copy)]
pub enum LiveFrameStep {
    /// Deliver a frame.
    Frame,
    /// Fail with a transient device error carrying this code.
    Transient(u32),
    /// Fail with a terminal device error carrying this code.
    Terminal(u32),
}

struct MockState {
    device_count: u32,
    initialized: bool,
    session_open: bool,
    properties: HashMap<PropId, u32>,
    supported: HashMap<PropId, Vec<u32>>,
    unreadable: HashSet<PropId>,
    rejected_writes: HashMap<PropId, u32>,
    property_events_unsupported: bool,
    emit_transfers: bool,
    transfer_delay_pumps: u32,
    trigger_count: u32,
    shot_counter: u32,
    object_extension: String,
    object_payload: Vec<u8>,
    objects: HashMap<u64, ObjectInfo>,
    pending: Vec<(u32, ObjectHandle)>,
    live_script: VecDeque<LiveFrameStep>,
    live_payload: Vec<u8>,
    close_count: u32,
    terminate_count: u32,
}

impl Default for MockState {
    fn default() -> Self {
        let mut properties = HashMap::new();
        properties.insert(PropId::Av, 0x30); // 5.6
        properties.insert(PropId::Tv, 0x70); // 1/125
        properties.insert(PropId::IsoSpeed, 0x48); // 100
        properties.insert(PropId::SaveTo, 2);
        properties.insert(PropId::AeMode, 3); // Manual
        properties.insert(PropId::MeteringMode, 3); // Evaluative
        properties.insert(PropId::WhiteBalance, 0); // Auto
        properties.insert(PropId::ImageQuality, 0x0010_FF0F); // LargeFineJpeg
        properties.insert(PropId::DriveMode, 0); // Single
        properties.insert(PropId::AfMode, 0); // OneShot
        properties.insert(PropId::EvfAfMode, 1); // Live
        properties.insert(PropId::EvfMode, 0);
        properties.insert(PropId::EvfOutputDevice, 1);
        Self {
            device_count: 1,
            initialized: false,
            session_open: false,
            properties,
            supported: HashMap::new(),
            unreadable: HashSet::new(),
            rejected_writes: HashMap::new(),
            property_events_unsupported: false,
            emit_transfers: true,
            transfer_delay_pumps: 1,
            trigger_count: 0,
            shot_counter: 0,
            object_extension: "CR3".to_owned(),
            object_payload: b"mock image payload".to_vec(),
            objects: HashMap::new(),
            pending: Vec::new(),
            live_script: VecDeque::new(),
            live_payload: b"mock live frame".to_vec(),
            close_count: 0,
            terminate_count: 0,
        }
    }
}

/// Mock device for testing without hardware.
#[derive(Clone)]
pub struct MockSdk {
    state: Arc<Mutex<MockState>>,
    object_handler: Arc<Mutex<Option<ObjectEventHandler>>>,
    property_handler: Arc<Mutex<Option<PropertyEventHandler>>>,
}

impl Default for MockSdk {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSdk {
    /// One attached device with sane property defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            object_handler: Arc::new(Mutex::new(None)),
            property_handler: Arc::new(Mutex::new(None)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Set the number of attached devices.
    #[must_use]
    pub fn with_device_count(self, count: u32) -> Self {
        self.lock().device_count = count;
        self
    }

    /// Preset a property code.
    #[must_use]
    pub fn with_property(self, prop: PropId, code: u32) -> Self {
        self.lock().properties.insert(prop, code);
        self
    }

    /// Set the supported-code descriptor for a property.
    #[must_use]
    pub fn with_supported(self, prop: PropId, codes: Vec<u32>) -> Self {
        self.lock().supported.insert(prop, codes);
        self
    }

    /// Make reads of a property fail, as on bodies that cannot report it.
    #[must_use]
    pub fn with_unreadable(self, prop: PropId) -> Self {
        self.lock().unreadable.insert(prop);
        self
    }

    /// Make writes of a property fail with the given vendor code.
    #[must_use]
    pub fn with_write_rejected(self, prop: PropId, code: u32) -> Self {
        self.lock().rejected_writes.insert(prop, code);
        self
    }

    /// Fail property-event handler registration.
    #[must_use]
    pub fn with_property_events_unsupported(self) -> Self {
        self.lock().property_events_unsupported = true;
        self
    }

    /// Triggers succeed but never produce a transfer event.
    #[must_use]
    pub fn without_transfer_events(self) -> Self {
        self.lock().emit_transfers = false;
        self
    }

    /// Pump ticks between a trigger and its transfer event.
    #[must_use]
    pub fn with_transfer_delay(self, pumps: u32) -> Self {
        self.lock().transfer_delay_pumps = pumps;
        self
    }

    /// Extension of the names the mock camera assigns (`IMG_0001.<ext>`).
    #[must_use]
    pub fn with_object_extension(self, ext: impl Into<String>) -> Self {
        self.lock().object_extension = ext.into();
        self
    }

    /// Bytes written for every downloaded object.
    #[must_use]
    pub fn with_object_payload(self, payload: Vec<u8>) -> Self {
        self.lock().object_payload = payload;
        self
    }

    /// Script the outcomes of live-view grabs; an exhausted script delivers
    /// frames.
    #[must_use]
    pub fn with_live_script(self, steps: Vec<LiveFrameStep>) -> Self {
        self.lock().live_script = steps.into();
        self
    }

    /// Bytes written for every delivered live-view frame.
    #[must_use]
    pub fn with_live_payload(self, payload: Vec<u8>) -> Self {
        self.lock().live_payload = payload;
        self
    }

    /// Number of trigger commands received.
    #[must_use]
    pub fn trigger_count(&self) -> u32 {
        self.lock().trigger_count
    }

    /// Number of session-close calls received.
    #[must_use]
    pub fn close_count(&self) -> u32 {
        self.lock().close_count
    }

    /// Number of SDK-teardown calls received.
    #[must_use]
    pub fn terminate_count(&self) -> u32 {
        self.lock().terminate_count
    }

    /// Current code of a property, if set.
    #[must_use]
    pub fn property(&self, prop: PropId) -> Option<u32> {
        self.lock().properties.get(&prop).copied()
    }

    /// Whether a session is currently open.
    #[must_use]
    pub fn session_open(&self) -> bool {
        self.lock().session_open
    }
}

impl DeviceSdk for MockSdk {
    fn init(&mut self) -> Result<()> {
        self.lock().initialized = true;
        Ok(())
    }

    fn terminate(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.terminate_count += 1;
        state.initialized = false;
        Ok(())
    }

    fn device_count(&mut self) -> Result<u32> {
        Ok(self.lock().device_count)
    }

    fn open_session(&mut self, index: u32) -> Result<()> {
        let mut state = self.lock();
        if index >= state.device_count {
            return Err(classify_device_error(ERR_MOCK_GENERIC, "no such device"));
        }
        state.session_open = true;
        Ok(())
    }

    fn close_session(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.close_count += 1;
        state.session_open = false;
        Ok(())
    }

    fn get_property(&mut self, prop: PropId) -> Result<u32> {
        let state = self.lock();
        if state.unreadable.contains(&prop) {
            return Err(classify_device_error(
                ERR_MOCK_GENERIC,
                format!("property {} not readable", prop.name()),
            ));
        }
        state.properties.get(&prop).copied().ok_or_else(|| {
            classify_device_error(ERR_MOCK_GENERIC, format!("unknown property {}", prop.name()))
        })
    }

    fn set_property(&mut self, prop: PropId, code: u32) -> Result<()> {
        let mut state = self.lock();
        if let Some(&err_code) = state.rejected_writes.get(&prop) {
            return Err(classify_device_error(
                err_code,
                format!("write to {} rejected", prop.name()),
            ));
        }
        state.properties.insert(prop, code);
        Ok(())
    }

    fn supported_codes(&mut self, prop: PropId) -> Result<Vec<u32>> {
        Ok(self.lock().supported.get(&prop).cloned().unwrap_or_default())
    }

    fn set_capacity(&mut self, _capacity: &Capacity) -> Result<()> {
        Ok(())
    }

    fn trigger(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.trigger_count += 1;
        if state.emit_transfers {
            state.shot_counter += 1;
            let handle = ObjectHandle(u64::from(state.shot_counter));
            let name = format!("IMG_{:04}.{}", state.shot_counter, state.object_extension);
            let size = state.object_payload.len() as u64;
            state.objects.insert(handle.0, ObjectInfo {
                file_name: Some(name),
                size,
            });
            let delay = state.transfer_delay_pumps;
            state.pending.push((delay, handle));
        }
        Ok(())
    }

    fn register_object_handler(&mut self, handler: ObjectEventHandler) -> Result<()> {
        *self
            .object_handler
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(handler);
        Ok(())
    }

    fn register_property_handler(&mut self, handler: PropertyEventHandler) -> Result<()> {
        if self.lock().property_events_unsupported {
            return Err(classify_device_error(
                ERR_MOCK_GENERIC,
                "property events not supported",
            ));
        }
        *self
            .property_handler
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(handler);
        Ok(())
    }

    fn pump_events(&mut self) {
        let ready: Vec<ObjectHandle> = {
            let mut state = self.lock();
            let mut ready = Vec::new();
            state.pending.retain_mut(|(ticks, handle)| {
                if *ticks == 0 {
                    ready.push(*handle);
                    false
                } else {
                    *ticks -= 1;
                    true
                }
            });
            ready
        };
        if ready.is_empty() {
            return;
        }
        // fire outside the state lock; the handler only forwards events
        let mut guard = self
            .object_handler
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(handler) = guard.as_mut() {
            for handle in ready {
                handler(ObjectEventKind::DirItemRequestTransfer, handle);
            }
        }
    }

    fn object_info(&mut self, handle: ObjectHandle) -> Result<ObjectInfo> {
        self.lock().objects.get(&handle.0).cloned().ok_or_else(|| {
            classify_device_error(ERR_MOCK_GENERIC, format!("unknown object {}", handle.0))
        })
    }

    fn download_object(&mut self, handle: ObjectHandle, dest: &Path) -> Result<()> {
        let payload = {
            let state = self.lock();
            if !state.objects.contains_key(&handle.0) {
                return Err(classify_device_error(
                    ERR_MOCK_GENERIC,
                    format!("unknown object {}", handle.0),
                ));
            }
            state.object_payload.clone()
        };
        fs::write(dest, payload).map_err(CameraError::Io)
    }

    fn download_live_frame(&mut self, dest: &Path) -> Result<()> {
        let step = self
            .lock()
            .live_script
            .pop_front()
            .unwrap_or(LiveFrameStep::Frame);
        match step {
            LiveFrameStep::Frame => {
                let payload = self.lock().live_payload.clone();
                fs::write(dest, payload).map_err(CameraError::Io)
            }
            LiveFrameStep::Transient(code) => {
                Err(classify_device_error(code, "live frame not ready"))
            }
            LiveFrameStep::Terminal(code) => Err(CameraError::DeviceTerminal {
                code: Some(code),
                message: "live view failed".to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ERR_OBJECT_NOT_READY;

    #[test]
    fn trigger_schedules_transfer_after_delay() {
        let mut sdk = MockSdk::new().with_transfer_delay(2);
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fired);
        sdk.register_object_handler(Box::new(move |kind, handle| {
            sink.lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push((kind, handle));
        }))
        .expect("register");

        sdk.trigger().expect("trigger");
        sdk.pump_events();
        sdk.pump_events();
        assert!(fired
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .is_empty());
        sdk.pump_events();
        let events = fired
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events.first(),
            Some((ObjectEventKind::DirItemRequestTransfer, _))
        ));
    }

    #[test]
    fn scripted_live_failures_are_classified() {
        let mut sdk =
            MockSdk::new().with_live_script(vec![LiveFrameStep::Transient(ERR_OBJECT_NOT_READY)]);
        let dir = tempfile::tempdir().expect("tempdir");
        let dest = dir.path().join("frame.jpg");
        let err = sdk.download_live_frame(&dest).expect_err("scripted failure");
        assert!(err.is_transient());
        // script exhausted: next grab delivers a frame
        sdk.download_live_frame(&dest).expect("frame");
        assert!(dest.exists());
    }

    #[test]
    fn rejected_write_keeps_old_code() {
        let mut sdk = MockSdk::new().with_write_rejected(PropId::AeMode, ERR_MOCK_GENERIC);
        let before = sdk.property(PropId::AeMode);
        assert!(sdk.set_property(PropId::AeMode, 0).is_err());
        assert_eq!(sdk.property(PropId::AeMode), before);
    }
}
