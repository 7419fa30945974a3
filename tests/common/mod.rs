//! Fake collaborators shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use exif::experimental::Writer;
use exif::{Field, In, Tag, Value};
use img_parts::jpeg::Jpeg;
use img_parts::ImageEXIF;
use parking_lot::Mutex;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;
use video_gps_recorder_lib::capture::{
    AudioSettings, CameraLens, CaptureDevice, CaptureError, CaptureEvent, CaptureResult,
    DeviceFormat, FrameRateRange, MicrophoneDevice, PermissionStatus, Resolution,
};
use video_gps_recorder_lib::location::{AuthorizationStatus, LocationProvider};
use video_gps_recorder_lib::recorder::RecorderEvent;
use video_gps_recorder_lib::RecorderConfig;

/// Camera that completes movies and photos through the event channel
pub struct FakeCamera {
    lenses: Vec<CameraLens>,
    max_fps: f64,
    photo: Vec<u8>,
    events: Mutex<Option<mpsc::UnboundedSender<CaptureEvent>>>,
    inputs: Mutex<Vec<CameraLens>>,
    movie: Mutex<Option<PathBuf>>,
    pub movies_started: AtomicUsize,
    pub default_format_uses: AtomicUsize,
}

impl FakeCamera {
    pub fn new(lenses: Vec<CameraLens>, max_fps: f64, photo: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            lenses,
            max_fps,
            photo,
            events: Mutex::new(None),
            inputs: Mutex::new(Vec::new()),
            movie: Mutex::new(None),
            movies_started: AtomicUsize::new(0),
            default_format_uses: AtomicUsize::new(0),
        })
    }

    pub fn attach(&self, events: mpsc::UnboundedSender<CaptureEvent>) {
        *self.events.lock() = Some(events);
    }

    pub fn inputs(&self) -> Vec<CameraLens> {
        self.inputs.lock().clone()
    }

    fn emit(&self, event: CaptureEvent) {
        if let Some(tx) = self.events.lock().as_ref() {
            let _ = tx.send(event);
        }
    }
}

impl CaptureDevice for FakeCamera {
    fn camera_permission(&self) -> PermissionStatus {
        PermissionStatus::Granted
    }

    fn available_lenses(&self) -> Vec<CameraLens> {
        self.lenses.clone()
    }

    fn formats(&self, _lens: CameraLens) -> Vec<DeviceFormat> {
        vec![DeviceFormat {
            id: format!("1080p-{}", self.max_fps),
            resolution: Resolution {
                width: 1920,
                height: 1080,
            },
            frame_rate_ranges: vec![FrameRateRange::new(1.0, self.max_fps)],
        }]
    }

    fn begin_configuration(&self) {}

    fn commit_configuration(&self) {}

    fn add_input(&self, lens: CameraLens) -> CaptureResult<()> {
        if !self.lenses.contains(&lens) {
            return Err(CaptureError::DeviceNotFound(format!("{:?}", lens)));
        }
        self.inputs.lock().push(lens);
        Ok(())
    }

    fn remove_input(&self, lens: CameraLens) {
        self.inputs.lock().retain(|l| *l != lens);
    }

    fn add_movie_output(&self) -> CaptureResult<()> {
        Ok(())
    }

    fn add_photo_output(&self) -> CaptureResult<()> {
        Ok(())
    }

    fn set_active_format(&self, _lens: CameraLens, _format: &DeviceFormat, _fps: u32) -> CaptureResult<()> {
        Ok(())
    }

    fn use_default_format(&self, _lens: CameraLens) {
        self.default_format_uses.fetch_add(1, Ordering::SeqCst);
    }

    fn start_running(&self) {}

    fn stop_running(&self) {}

    fn start_movie(&self, path: &Path) -> CaptureResult<()> {
        std::fs::write(path, b"").map_err(|e| CaptureError::Device(e.to_string()))?;
        *self.movie.lock() = Some(path.to_path_buf());
        self.movies_started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop_movie(&self) {
        if let Some(path) = self.movie.lock().take() {
            let _ = std::fs::write(&path, b"moov");
            self.emit(CaptureEvent::MovieFinished { path, error: None });
        }
    }

    fn capture_photo(&self, request_id: Uuid) -> CaptureResult<()> {
        self.emit(CaptureEvent::PhotoProcessed {
            request_id,
            data: self.photo.clone(),
        });
        Ok(())
    }
}

/// Microphone with permission already granted
#[derive(Default)]
pub struct FakeMicrophone {
    pub clips: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl MicrophoneDevice for FakeMicrophone {
    fn permission(&self) -> PermissionStatus {
        PermissionStatus::Granted
    }

    async fn request_permission(&self) -> bool {
        true
    }

    fn start_encoding(&self, path: &Path, _settings: &AudioSettings) -> CaptureResult<()> {
        self.clips.lock().push(path.to_path_buf());
        Ok(())
    }

    fn stop_encoding(&self) {}
}

/// Location provider that is always authorized and counts start requests
#[derive(Default)]
pub struct FakeProvider {
    pub starts: AtomicUsize,
}

impl LocationProvider for FakeProvider {
    fn authorization_status(&self) -> AuthorizationStatus {
        AuthorizationStatus::AuthorizedWhenInUse
    }

    fn request_authorization(&self) {}

    fn start_updates(&self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn stop_updates(&self) {}
}

pub fn config(dir: &Path) -> RecorderConfig {
    RecorderConfig {
        output_dir: dir.to_path_buf(),
        sample_interval_ms: 50,
        ..RecorderConfig::default()
    }
}

/// Small gradient JPEG encoded by the `image` crate
pub fn jpeg_fixture() -> Vec<u8> {
    let pixels = image::RgbImage::from_fn(32, 24, |x, y| {
        image::Rgb([(x * 8) as u8, (y * 10) as u8, 128])
    });
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(pixels)
        .write_to(&mut out, image::ImageFormat::Jpeg)
        .unwrap();
    out.into_inner()
}

/// JPEG fixture carrying a camera `Make` tag
pub fn jpeg_fixture_with_make(make: &str) -> Vec<u8> {
    let field = Field {
        tag: Tag::Make,
        ifd_num: In::PRIMARY,
        value: Value::Ascii(vec![make.as_bytes().to_vec()]),
    };
    let mut writer = Writer::new();
    writer.push_field(&field);
    let mut tiff = Cursor::new(Vec::new());
    writer.write(&mut tiff, false).unwrap();

    let mut jpeg = Jpeg::from_bytes(jpeg_fixture().into()).unwrap();
    jpeg.set_exif(Some(tiff.into_inner().into()));
    jpeg.encoder().bytes().to_vec()
}

/// JPEG bytes with the EXIF segment removed
pub fn strip_exif(data: &[u8]) -> Vec<u8> {
    let mut jpeg = Jpeg::from_bytes(data.to_vec().into()).unwrap();
    jpeg.set_exif(None);
    jpeg.encoder().bytes().to_vec()
}

pub fn read_exif(data: &[u8]) -> Option<exif::Exif> {
    exif::Reader::new()
        .read_from_container(&mut Cursor::new(data))
        .ok()
}

/// Degrees from a GPS DMS rational triple
pub fn dms_degrees(exif: &exif::Exif, tag: Tag) -> Option<f64> {
    match &exif.get_field(tag, In::PRIMARY)?.value {
        Value::Rational(parts) if parts.len() == 3 => Some(
            parts[0].to_f64() + parts[1].to_f64() / 60.0 + parts[2].to_f64() / 3600.0,
        ),
        _ => None,
    }
}

pub fn ascii_value(exif: &exif::Exif, tag: Tag) -> Option<String> {
    match &exif.get_field(tag, In::PRIMARY)?.value {
        Value::Ascii(parts) => parts
            .first()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned()),
        _ => None,
    }
}

/// Wait for the first event matching `pred`
pub async fn wait_for<F>(rx: &mut broadcast::Receiver<RecorderEvent>, mut pred: F) -> RecorderEvent
where
    F: FnMut(&RecorderEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for recorder event")
}

/// Poll `check` until it holds or a few seconds pass
pub async fn eventually<F: FnMut() -> bool>(mut check: F) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}
