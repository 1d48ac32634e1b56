//! Demo binary driving the controller against the scripted mock SDK.

use tethercam::{Camera, CameraOptions, CaptureRequest, MockSdk, PropertySettings};

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> tethercam::Result<()> {
    let save_dir = std::env::temp_dir().join("tethercam-demo");
    std::fs::create_dir_all(&save_dir)?;

    let sdk = MockSdk::new();
    let mut camera = Camera::open(sdk, CameraOptions::new().save_dir(&save_dir))?;

    let settings = PropertySettings::new().av("f/5.6").tv("1/125").iso("auto");
    camera.set_properties(&settings, true, false)?;

    let profile = camera.get_properties()?;
    println!("Av:  {}", profile.av);
    println!("Tv:  {}", profile.tv);
    println!("ISO: {}", profile.iso);

    for path in camera.capture(&CaptureRequest::new())? {
        println!("saved {}", path.display());
    }

    camera.close();
    Ok(())
}
