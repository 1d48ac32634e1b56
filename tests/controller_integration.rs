//! End-to-end controller tests against the scripted mock SDK.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tempfile::tempdir;
use tethercam::mock::{LiveFrameStep, MockSdk, ERR_MOCK_GENERIC};
use tethercam::traits::ERR_OBJECT_NOT_READY;
use tethercam::{
    Camera, CameraError, CameraOptions, CaptureRequest, LiveViewData, PropId, PropertySettings,
};

fn open_camera(sdk: MockSdk, options: CameraOptions) -> Camera<MockSdk> {
    Camera::open(sdk, options).expect("open should succeed")
}

#[test]
fn open_fails_without_cameras() {
    let sdk = MockSdk::new().with_device_count(0);
    let probe = sdk.clone();
    let err = Camera::open(sdk, CameraOptions::new()).expect_err("no cameras");
    assert!(matches!(err, CameraError::NoCameraFound));
    // SDK torn down again on the failure path
    assert_eq!(probe.terminate_count(), 1);
}

#[test]
fn open_fails_for_out_of_range_index() {
    let sdk = MockSdk::new().with_device_count(2);
    let err = Camera::open(sdk, CameraOptions::new().index(5)).expect_err("out of range");
    assert!(matches!(
        err,
        CameraError::IndexOutOfRange { index: 5, count: 2 }
    ));
}

#[test]
fn open_configures_save_to_host() {
    let sdk = MockSdk::new().with_property(PropId::SaveTo, 1);
    let probe = sdk.clone();
    let _camera = open_camera(sdk, CameraOptions::new());
    assert_eq!(probe.property(PropId::SaveTo), Some(2));
}

#[test]
fn open_survives_unsupported_property_events() {
    let sdk = MockSdk::new().with_property_events_unsupported();
    let mut camera = open_camera(sdk, CameraOptions::new());
    camera.close();
}

#[test]
fn close_is_idempotent() {
    let sdk = MockSdk::new();
    let probe = sdk.clone();
    let mut camera = open_camera(sdk, CameraOptions::new());
    camera.close();
    camera.close();
    assert_eq!(probe.close_count(), 1);
    assert_eq!(probe.terminate_count(), 1);
    assert!(!probe.session_open());
}

#[test]
fn set_properties_applies_parsed_codes() {
    let sdk = MockSdk::new();
    let probe = sdk.clone();
    let mut camera = open_camera(sdk, CameraOptions::new());
    let settings = PropertySettings::new()
        .av("f/8")
        .tv("1/250")
        .iso("auto")
        .metering("spot")
        .white_balance("Daylight");
    camera
        .set_properties(&settings, true, false)
        .expect("set_properties");
    assert_eq!(probe.property(PropId::Av), Some(0x38));
    assert_eq!(probe.property(PropId::Tv), Some(0x78));
    assert_eq!(probe.property(PropId::IsoSpeed), Some(0));
    assert_eq!(probe.property(PropId::MeteringMode), Some(4)); // Partial
    assert_eq!(probe.property(PropId::WhiteBalance), Some(1));
}

#[test]
fn validation_rejects_codes_outside_supported_set() {
    let sdk = MockSdk::new().with_supported(PropId::Av, vec![0x30]);
    let mut camera = open_camera(sdk, CameraOptions::new());
    let err = camera
        .set_properties(&PropertySettings::new().av("f/8"), true, false)
        .expect_err("unsupported aperture");
    assert!(matches!(err, CameraError::UnsupportedValue { kind: "Av", .. }));
}

#[test]
fn tolerate_unsupported_drops_ae_mode_at_validation() {
    let sdk = MockSdk::new().with_supported(PropId::AeMode, vec![3]);
    let probe = sdk.clone();
    let mut camera = open_camera(sdk, CameraOptions::new());
    let settings = PropertySettings::new().ae_mode("Program");
    camera
        .set_properties(&settings, true, true)
        .expect("tolerated ae_mode must not raise");
    // setting was dropped, not applied
    assert_eq!(probe.property(PropId::AeMode), Some(3));
}

#[test]
fn tolerate_unsupported_drops_rejected_af_mode_write() {
    let sdk = MockSdk::new().with_write_rejected(PropId::AfMode, ERR_MOCK_GENERIC);
    let probe = sdk.clone();
    let mut camera = open_camera(sdk, CameraOptions::new());
    let settings = PropertySettings::new().af_mode("AIServo");
    camera
        .set_properties(&settings, true, true)
        .expect("tolerated af_mode must not raise");
    assert_eq!(probe.property(PropId::AfMode), Some(0));

    // without the tolerate flag the device rejection propagates
    let err = camera
        .set_properties(&settings, true, false)
        .expect_err("rejection propagates");
    assert!(matches!(err, CameraError::DeviceTerminal { .. }));
}

#[test]
fn manual_focus_flag_overrides_af_mode() {
    let sdk = MockSdk::new();
    let probe = sdk.clone();
    let mut camera = open_camera(sdk, CameraOptions::new());
    let settings = PropertySettings::new().manual_focus(true).af_mode("OneShot");
    camera.set_properties(&settings, true, false).expect("set");
    assert_eq!(probe.property(PropId::AfMode), Some(3)); // ManualFocus
}

#[test]
fn get_properties_reports_display_strings() {
    let sdk = MockSdk::new().with_unreadable(PropId::AfMode);
    let mut camera = open_camera(sdk, CameraOptions::new());
    let profile = camera.get_properties().expect("get_properties");
    assert_eq!(profile.av, "5.6");
    assert_eq!(profile.tv, "1/125");
    assert_eq!(profile.iso, "100");
    assert_eq!(profile.save_to, "Host");
    assert_eq!(profile.ae_mode, "Manual");
    // unreadable property reports the sentinel instead of failing the read
    assert_eq!(profile.af_mode, "-1");
    assert_eq!(profile.evf_af_mode, "Live");
}

#[test]
fn list_supported_falls_back_to_codec_table() {
    let sdk = MockSdk::new().with_supported(PropId::IsoSpeed, vec![0x48, 0x00]);
    let mut camera = open_camera(sdk, CameraOptions::new());
    let supported = camera.list_supported().expect("list_supported");

    let iso = supported.get("ISO").expect("ISO entry");
    assert_eq!(iso, &vec!["100".to_owned(), "Auto".to_owned()]);

    // no descriptor for Av: whole codec table as a hint
    let av = supported.get("Av").expect("Av entry");
    assert!(av.iter().any(|v| v == "5.6"));
    assert!(av.len() > 10);
}

#[test]
fn capture_returns_path_per_shot_in_trigger_order() {
    let dir = tempdir().expect("tempdir");
    let sdk = MockSdk::new();
    let mut camera = open_camera(sdk, CameraOptions::new().save_dir(dir.path()));
    let paths = camera
        .capture(&CaptureRequest::new().shots(3))
        .expect("capture");
    let names: Vec<_> = paths
        .iter()
        .map(|p| p.file_name().expect("name").to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["IMG_0001.CR3", "IMG_0002.CR3", "IMG_0003.CR3"]);
    for path in &paths {
        assert!(path.exists());
    }
}

#[test]
fn explicit_filename_keeps_device_extension() {
    let dir = tempdir().expect("tempdir");
    let sdk = MockSdk::new();
    let mut camera = open_camera(sdk, CameraOptions::new().save_dir(dir.path()));
    let paths = camera
        .capture(&CaptureRequest::new().filename("x"))
        .expect("capture");
    assert_eq!(paths.len(), 1);
    assert!(paths.first().expect("path").ends_with("x.CR3"));
}

#[test]
fn explicit_filename_extension_is_replaced() {
    let dir = tempdir().expect("tempdir");
    let sdk = MockSdk::new();
    let mut camera = open_camera(sdk, CameraOptions::new().save_dir(dir.path()));
    let paths = camera
        .capture(&CaptureRequest::new().filename("frame.png"))
        .expect("capture");
    let name = paths
        .first()
        .and_then(|p| p.file_name())
        .expect("name")
        .to_string_lossy()
        .into_owned();
    assert_eq!(name, "frame.CR3");
}

#[test]
fn explicit_filename_is_consumed_once() {
    let dir = tempdir().expect("tempdir");
    let sdk = MockSdk::new();
    let mut camera = open_camera(sdk, CameraOptions::new().save_dir(dir.path()));
    camera
        .capture(&CaptureRequest::new().filename("first"))
        .expect("capture");
    let paths = camera.capture(&CaptureRequest::new()).expect("capture");
    let name = paths
        .first()
        .and_then(|p| p.file_name())
        .expect("name")
        .to_string_lossy()
        .into_owned();
    assert_eq!(name, "IMG_0002.CR3");
}

#[test]
fn explicit_filename_requires_single_shot() {
    let dir = tempdir().expect("tempdir");
    let sdk = MockSdk::new();
    let mut camera = open_camera(sdk, CameraOptions::new().save_dir(dir.path()));
    let err = camera
        .capture(&CaptureRequest::new().shots(2).filename("x"))
        .expect_err("multi-shot with filename");
    assert!(matches!(err, CameraError::InvalidArgument(_)));
}

#[test]
fn pattern_naming_increments_sequence() {
    let dir = tempdir().expect("tempdir");
    let sdk = MockSdk::new();
    let options = CameraOptions::new()
        .save_dir(dir.path())
        .file_pattern("{seq}_{basename}.{ext}")
        .seq_start(7);
    let mut camera = open_camera(sdk, options);
    let paths = camera
        .capture(&CaptureRequest::new().shots(2))
        .expect("capture");
    let names: Vec<_> = paths
        .iter()
        .map(|p| p.file_name().expect("name").to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["0007_IMG_0001.CR3", "0008_IMG_0002.CR3"]);
}

#[test]
fn capture_times_out_after_exhausting_retries() {
    let dir = tempdir().expect("tempdir");
    let sdk = MockSdk::new().without_transfer_events();
    let probe = sdk.clone();
    let mut camera = open_camera(sdk, CameraOptions::new().save_dir(dir.path()));
    let request = CaptureRequest::new()
        .timeout(Duration::from_millis(50))
        .retry(2)
        .retry_delay(Duration::from_millis(10));
    let err = camera.capture(&request).expect_err("no transfer event");
    assert!(matches!(err, CameraError::CaptureTimeout));
    // 1 initial attempt + 2 retries
    assert_eq!(probe.trigger_count(), 3);
}

#[test]
fn capture_bytes_removes_files_by_default() {
    let dir = tempdir().expect("tempdir");
    let sdk = MockSdk::new().with_object_payload(b"payload".to_vec());
    let mut camera = open_camera(sdk, CameraOptions::new().save_dir(dir.path()));
    let data = camera
        .capture_bytes(&CaptureRequest::new(), false)
        .expect("capture_bytes");
    assert_eq!(data, vec![b"payload".to_vec()]);
    assert!(!dir.path().join("IMG_0001.CR3").exists());
}

#[test]
fn capture_bytes_can_keep_files() {
    let dir = tempdir().expect("tempdir");
    let sdk = MockSdk::new();
    let mut camera = open_camera(sdk, CameraOptions::new().save_dir(dir.path()));
    camera
        .capture_bytes(&CaptureRequest::new(), true)
        .expect("capture_bytes");
    assert!(dir.path().join("IMG_0001.CR3").exists());
}

#[test]
fn capture_images_reports_decode_failure() {
    let dir = tempdir().expect("tempdir");
    // the default payload is not a decodable image, like a RAW-only capture
    let sdk = MockSdk::new();
    let mut camera = open_camera(sdk, CameraOptions::new().save_dir(dir.path()));
    let err = camera
        .capture_images(&CaptureRequest::new(), false)
        .expect_err("undecodable payload");
    assert!(matches!(err, CameraError::DecodeFailure(_)));
}

#[test]
#[allow(clippy::panic)]
fn live_view_grab_retries_transient_failures() {
    let dir = tempdir().expect("tempdir");
    let sdk = MockSdk::new()
        .with_live_payload(b"frame".to_vec())
        .with_live_script(vec![
            LiveFrameStep::Transient(ERR_OBJECT_NOT_READY),
            LiveFrameStep::Transient(ERR_OBJECT_NOT_READY),
            LiveFrameStep::Frame,
        ]);
    let mut camera = open_camera(sdk, CameraOptions::new().save_dir(dir.path()));
    let data = camera.grab_live_view_frame(None).expect("frame after retries");
    match data {
        LiveViewData::Bytes(bytes) => assert_eq!(bytes, b"frame".to_vec()),
        LiveViewData::Saved(path) => panic!("expected bytes, got {}", path.display()),
    }
    assert!(camera.is_live_view_on());
}

#[test]
fn live_view_terminal_failure_is_not_retried() {
    let dir = tempdir().expect("tempdir");
    let sdk = MockSdk::new().with_live_script(vec![
        LiveFrameStep::Terminal(ERR_MOCK_GENERIC),
        LiveFrameStep::Frame,
    ]);
    let mut camera = open_camera(sdk, CameraOptions::new().save_dir(dir.path()));
    let err = camera
        .grab_live_view_frame(None)
        .expect_err("terminal failure");
    assert!(!err.is_transient());
    assert_eq!(err.info().code, Some(ERR_MOCK_GENERIC));
}

#[test]
fn live_view_saves_to_requested_path() {
    let dir = tempdir().expect("tempdir");
    let sdk = MockSdk::new().with_live_payload(b"jpegish".to_vec());
    let probe = sdk.clone();
    let mut camera = open_camera(sdk, CameraOptions::new().save_dir(dir.path()));
    let dest = dir.path().join("frames/preview.jpg");
    let data = camera
        .grab_live_view_frame(Some(&dest))
        .expect("saved frame");
    assert!(matches!(data, LiveViewData::Saved(_)));
    assert_eq!(std::fs::read(&dest).expect("read frame"), b"jpegish".to_vec());
    // lazy start routed the feed to the host
    assert_eq!(probe.property(PropId::EvfMode), Some(1));
    assert_eq!(probe.property(PropId::EvfOutputDevice), Some(2));

    camera.stop_live_view();
    assert!(!camera.is_live_view_on());
    assert_eq!(probe.property(PropId::EvfMode), Some(0));
}

#[test]
fn profile_round_trips_without_apply() {
    let dir = tempdir().expect("tempdir");
    let sdk = MockSdk::new();
    let mut camera = open_camera(sdk, CameraOptions::new());
    let path = dir.path().join("profiles/studio.json");

    let original = camera.get_properties().expect("get_properties");
    camera.save_profile(&path).expect("save_profile");
    let loaded = camera.load_profile(&path, false, true).expect("load_profile");
    assert_eq!(loaded, original);
}

#[test]
fn profile_reapplies_equivalent_codes() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("studio.json");

    let sdk = MockSdk::new();
    let mut camera = open_camera(sdk, CameraOptions::new());
    camera.save_profile(&path).expect("save_profile");

    // apply the saved profile to a second body with different exposure
    let probe_sdk = MockSdk::new();
    let probe = probe_sdk.clone();
    let mut second = open_camera(probe_sdk, CameraOptions::new());
    second
        .set_properties(&PropertySettings::new().av("f/16"), true, false)
        .expect("set");
    second.load_profile(&path, true, true).expect("load_profile");
    assert_eq!(probe.property(PropId::Av), Some(0x30)); // back to 5.6
    assert_eq!(probe.property(PropId::Tv), Some(0x70)); // 1/125
}

#[test]
fn event_queue_records_transfers_with_paths() {
    let dir = tempdir().expect("tempdir");
    let sdk = MockSdk::new();
    let mut camera = open_camera(sdk, CameraOptions::new().save_dir(dir.path()));
    let events = camera.enable_events();

    camera.capture(&CaptureRequest::new()).expect("capture");

    let event = events.try_recv().expect("queued event");
    assert_eq!(event.kind, "object");
    assert_eq!(event.event, "DirItemRequestTransfer");
    let path = event.path.expect("transfer path");
    assert!(path.to_string_lossy().ends_with("IMG_0001.CR3"));
}

#[test]
fn object_callback_runs_alongside_queue() {
    let dir = tempdir().expect("tempdir");
    let sdk = MockSdk::new();
    let mut camera = open_camera(sdk, CameraOptions::new().save_dir(dir.path()));
    let events = camera.enable_events();

    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    camera.on_object(Box::new(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        0
    }));

    camera.capture(&CaptureRequest::new()).expect("capture");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(events.try_recv().is_ok());
}

#[test]
#[allow(clippy::panic)]
fn panicking_object_callback_does_not_break_capture() {
    let dir = tempdir().expect("tempdir");
    let sdk = MockSdk::new();
    let mut camera = open_camera(sdk, CameraOptions::new().save_dir(dir.path()));
    camera.on_object(Box::new(|_, _| panic!("faulty caller callback")));
    let paths = camera.capture(&CaptureRequest::new()).expect("capture");
    assert_eq!(paths.len(), 1);
}

#[test]
fn operations_fail_cleanly_after_close() {
    let sdk = MockSdk::new();
    let mut camera = open_camera(sdk, CameraOptions::new());
    camera.close();
    let err = camera
        .capture(&CaptureRequest::new())
        .expect_err("closed session");
    assert!(matches!(err, CameraError::SessionClosed));
    let err = camera.get_properties().expect_err("closed session");
    assert!(matches!(err, CameraError::SessionClosed));
}
