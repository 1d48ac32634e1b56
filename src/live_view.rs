//! Live-view poller: feed control and single-frame grabs with retry.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use image::DynamicImage;
use log::{debug, info, warn};

use crate::session::Camera;
use crate::traits::{CameraError, DeviceSdk, PropId, Result};

/// Attempt budget for one frame grab.
const MAX_ATTEMPTS: u32 = 10;
/// Delay between attempts after a transient failure.
const RETRY_DELAY: Duration = Duration::from_millis(70);
/// Grace period for the first frame after enabling the feed.
const FIRST_FRAME_DELAY: Duration = Duration::from_millis(100);

/// Output-device code routing the feed to the camera's own screen.
const EVF_OUTPUT_CAMERA: u32 = 1;
/// Output-device code routing the feed to the host.
const EVF_OUTPUT_HOST: u32 = 2;

/// One grabbed live-view frame.
#[derive(Debug, Clone)]
pub enum LiveViewData {
    /// Frame written to the requested path.
    Saved(PathBuf),
    /// Frame bytes read back from a temporary file.
    Bytes(Vec<u8>),
}

impl<S: DeviceSdk> Camera<S> {
    /// Enable the live feed and route it to the host.
    pub fn start_live_view(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.sdk.set_property(PropId::EvfMode, 1)?;
        self.sdk.set_property(PropId::EvfOutputDevice, EVF_OUTPUT_HOST)?;
        self.live_view_on = true;
        info!("live view started");
        Ok(())
    }

    /// Disable the live feed. Best-effort: device errors are ignored.
    pub fn stop_live_view(&mut self) {
        if !self.open {
            return;
        }
        if let Err(err) = self.sdk.set_property(PropId::EvfOutputDevice, EVF_OUTPUT_CAMERA) {
            warn!("live view output reset failed: {err}");
        }
        if let Err(err) = self.sdk.set_property(PropId::EvfMode, 0) {
            warn!("live view disable failed: {err}");
        }
        self.live_view_on = false;
        info!("live view stopped");
    }

    /// Whether the feed is currently enabled.
    #[must_use]
    pub const fn is_live_view_on(&self) -> bool {
        self.live_view_on
    }

    /// Grab one frame, starting the feed first if necessary.
    ///
    /// With a `save_path` the frame lands there; otherwise it goes through a
    /// temporary file whose bytes are returned. Transient busy/not-ready
    /// failures are retried up to the attempt budget with a pump nudge in
    /// between; the last transient failure is surfaced when the budget runs
    /// out. Terminal failures propagate immediately.
    pub fn grab_live_view_frame(&mut self, save_path: Option<&Path>) -> Result<LiveViewData> {
        self.ensure_open()?;
        if !self.live_view_on {
            self.start_live_view()?;
            thread::sleep(FIRST_FRAME_DELAY);
        }
        for attempt in 1..=MAX_ATTEMPTS {
            let result = match save_path {
                Some(path) => self
                    .download_frame_to(path)
                    .map(|()| LiveViewData::Saved(path.to_owned())),
                None => self.download_frame_bytes().map(LiveViewData::Bytes),
            };
            match result {
                Ok(data) => {
                    debug!("live view frame grabbed (attempt {attempt}/{MAX_ATTEMPTS})");
                    return Ok(data);
                }
                Err(err) if err.is_transient() && attempt < MAX_ATTEMPTS => {
                    info!("live view retry {attempt}/{MAX_ATTEMPTS} after transient error: {err}");
                    self.sdk.pump_events();
                    thread::sleep(RETRY_DELAY);
                }
                Err(err) => return Err(err),
            }
        }
        Err(CameraError::DeviceTerminal {
            code: None,
            message: "unexpected live view failure".to_owned(),
        })
    }

    /// Grab one frame and decode it through the image library.
    pub fn grab_live_view_image(&mut self) -> Result<DynamicImage> {
        let bytes = match self.grab_live_view_frame(None)? {
            LiveViewData::Bytes(bytes) => bytes,
            LiveViewData::Saved(path) => fs::read(path)?,
        };
        image::load_from_memory(&bytes).map_err(|err| CameraError::DecodeFailure(err.to_string()))
    }

    fn download_frame_to(&mut self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        self.sdk.download_live_frame(path)
    }

    fn download_frame_bytes(&mut self) -> Result<Vec<u8>> {
        let temp_id = self.next_temp_id();
        let tmp = self.save_dir.join(format!("evf_{temp_id:04}.jpg"));
        self.sdk.download_live_frame(&tmp)?;
        let bytes = fs::read(&tmp)?;
        if let Err(err) = fs::remove_file(&tmp) {
            warn!("could not remove {}: {err}", tmp.display());
        }
        Ok(bytes)
    }
}
