//! Capture engine: trigger, transfer wait, retries and filename derivation.
//!
//! A capture call is a small state machine per shot: trigger, poll the pump
//! until the event bridge records a new saved path, retry the trigger on
//! timeout, then move to the next shot. Saved-path order matches trigger
//! order because transfers are processed as their events arrive.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Local;
use image::DynamicImage;
use log::{debug, info, warn};

use crate::session::Camera;
use crate::traits::{CameraError, DeviceSdk, ObjectHandle, Result};

/// Poll step of the transfer wait loop.
const WAIT_POLL: Duration = Duration::from_millis(10);

/// Extension used when the device reports a file without one.
const DEFAULT_EXT: &str = "bin";

/// Parameters of one capture call.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    /// Number of shots to take.
    pub shots: u32,
    /// Per-shot transfer wait budget.
    pub timeout: Duration,
    /// Pause between shots (not after the last).
    pub interval: Duration,
    /// Additional trigger attempts after a transfer timeout.
    pub retry: u32,
    /// Pause between trigger attempts.
    pub retry_delay: Duration,
    /// Explicit base name for the saved file; only valid with one shot. The
    /// device's original extension is kept regardless of any extension given.
    pub filename: Option<String>,
}

impl Default for CaptureRequest {
    fn default() -> Self {
        Self {
            shots: 1,
            timeout: Duration::from_secs(5),
            interval: Duration::ZERO,
            retry: 0,
            retry_delay: Duration::from_millis(300),
            filename: None,
        }
    }
}

impl CaptureRequest {
    /// One shot with default timing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of shots.
    #[must_use]
    pub const fn shots(mut self, shots: u32) -> Self {
        self.shots = shots;
        self
    }

    /// Set the per-shot transfer timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the inter-shot interval.
    #[must_use]
    pub const fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the retry budget for timed-out triggers.
    #[must_use]
    pub const fn retry(mut self, retry: u32) -> Self {
        self.retry = retry;
        self
    }

    /// Set the delay between trigger attempts.
    #[must_use]
    pub const fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the explicit one-shot filename.
    #[must_use]
    pub fn filename(mut self, name: impl Into<String>) -> Self {
        self.filename = Some(name.into());
        self
    }
}

impl<S: DeviceSdk> Camera<S> {
    /// Take `request.shots` pictures and return the saved paths in trigger
    /// order.
    ///
    /// Each shot blocks until the transfer event lands or `request.timeout`
    /// elapses; a timeout re-triggers up to `request.retry` times before
    /// surfacing [`CameraError::CaptureTimeout`].
    pub fn capture(&mut self, request: &CaptureRequest) -> Result<Vec<PathBuf>> {
        self.ensure_open()?;
        self.saved_paths.clear();
        if let Some(name) = &request.filename {
            if request.shots != 1 {
                return Err(CameraError::InvalidArgument(
                    "filename can be used only when shots=1".to_owned(),
                ));
            }
            self.pending_filename = Some(name.clone());
        }

        let shots = request.shots.max(1);
        for shot in 0..shots {
            let mut attempt = 0;
            loop {
                debug!("trigger shot {}/{shots}", shot + 1);
                self.sdk.trigger()?;
                match self.wait_for_transfer(request.timeout) {
                    Ok(()) => break,
                    Err(CameraError::CaptureTimeout) if attempt < request.retry => {
                        attempt += 1;
                        info!(
                            "retry shot {}/{shots} (attempt {attempt}/{})",
                            shot + 1,
                            request.retry
                        );
                        thread::sleep(request.retry_delay);
                    }
                    Err(err) => return Err(err),
                }
            }
            if !request.interval.is_zero() && shot + 1 < shots {
                thread::sleep(request.interval);
            }
        }
        Ok(self.saved_paths.clone())
    }

    /// Capture and return the image bytes instead of paths.
    ///
    /// The on-disk files are removed unless `keep_files` is set; removal is
    /// best-effort and attempted even when reading fails.
    pub fn capture_bytes(
        &mut self,
        request: &CaptureRequest,
        keep_files: bool,
    ) -> Result<Vec<Vec<u8>>> {
        let paths = self.capture(request)?;
        let mut data = Vec::with_capacity(paths.len());
        for path in paths {
            let bytes = fs::read(&path);
            if !keep_files {
                if let Err(err) = fs::remove_file(&path) {
                    warn!("could not remove {}: {err}", path.display());
                }
            }
            data.push(bytes?);
        }
        Ok(data)
    }

    /// Capture and decode the results through the image library.
    ///
    /// Decode rejection surfaces [`CameraError::DecodeFailure`]; the usual
    /// cause is a body recording RAW-only image quality.
    pub fn capture_images(
        &mut self,
        request: &CaptureRequest,
        keep_files: bool,
    ) -> Result<Vec<DynamicImage>> {
        let mut images = Vec::new();
        for bytes in self.capture_bytes(request, keep_files)? {
            let image = image::load_from_memory(&bytes)
                .map_err(|err| CameraError::DecodeFailure(err.to_string()))?;
            images.push(image);
        }
        Ok(images)
    }

    /// Poll the pump until a new saved path appears or `timeout` elapses.
    ///
    /// Callback delivery needs active pumping, so this is a bounded polling
    /// loop rather than a blocking wait.
    fn wait_for_transfer(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let already = self.saved_paths.len();
        while Instant::now() < deadline {
            thread::sleep(WAIT_POLL);
            self.sdk.pump_events();
            self.process_events()?;
            if self.saved_paths.len() > already {
                return Ok(());
            }
        }
        Err(CameraError::CaptureTimeout)
    }

    /// Download a transfer-requested object under its derived name.
    pub(crate) fn save_transfer_item(&mut self, handle: ObjectHandle) -> Result<PathBuf> {
        let info = self.sdk.object_info(handle).unwrap_or_default();
        let original = info
            .file_name
            .unwrap_or_else(|| format!("capture_{:04}.{DEFAULT_EXT}", self.next_temp_id()));
        let name = self.derive_save_name(&original);
        let dest = self.save_dir.join(name);
        self.sdk.download_object(handle, &dest)?;
        debug!("saved {}", dest.display());
        Ok(dest)
    }

    /// Pick the saved file name: pending one-shot name, then the session
    /// pattern, then the sanitized device-original name.
    fn derive_save_name(&mut self, original: &str) -> String {
        // 1) explicit one-shot name; consumed here, device extension kept
        if let Some(provided) = self.pending_filename.take() {
            let provided = sanitize_name(&provided);
            let base = Path::new(&provided)
                .file_stem()
                .map_or_else(|| "image".to_owned(), |s| s.to_string_lossy().into_owned());
            let base = if base.is_empty() { "image".to_owned() } else { base };
            return format!("{base}.{}", original_extension(original));
        }
        // 2) pattern-based naming
        if let Some(pattern) = self.file_pattern.clone() {
            let basename = Path::new(original)
                .file_stem()
                .map_or_else(String::new, |s| s.to_string_lossy().into_owned());
            let name = pattern
                .replace("{basename}", &basename)
                .replace("{ext}", &original_extension(original))
                .replace(
                    "{timestamp}",
                    &Local::now().format("%Y%m%d_%H%M%S").to_string(),
                )
                .replace("{seq}", &format!("{:04}", self.seq));
            self.seq += 1;
            return name;
        }
        // 3) device-original name
        sanitize_name(original)
    }

    /// Monotonic id for generated file names.
    pub(crate) fn next_temp_id(&mut self) -> u32 {
        self.temp_counter += 1;
        self.temp_counter
    }
}

/// Replace path separators so a reported name cannot escape the save dir.
fn sanitize_name(name: &str) -> String {
    name.replace(['\\', '/'], "_")
}

/// Extension of the device-reported name, without the dot.
fn original_extension(name: &str) -> String {
    Path::new(name)
        .extension()
        .map_or_else(|| DEFAULT_EXT.to_owned(), |e| e.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_separators() {
        assert_eq!(sanitize_name("DCIM/100/IMG.CR3"), "DCIM_100_IMG.CR3");
        assert_eq!(sanitize_name("a\\b.jpg"), "a_b.jpg");
    }

    #[test]
    fn extension_defaults_to_bin() {
        assert_eq!(original_extension("IMG_0001.CR3"), "CR3");
        assert_eq!(original_extension("IMG_0001"), "bin");
    }

    #[test]
    fn request_builder_sets_fields() {
        let request = CaptureRequest::new()
            .shots(3)
            .timeout(Duration::from_secs(2))
            .interval(Duration::from_millis(100))
            .retry(2)
            .retry_delay(Duration::from_millis(50))
            .filename("shot");
        assert_eq!(request.shots, 3);
        assert_eq!(request.retry, 2);
        assert_eq!(request.filename.as_deref(), Some("shot"));
    }
}
