mod common;

use common::*;
use exif::{In, Tag};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use video_gps_recorder_lib::capture::CameraLens;
use video_gps_recorder_lib::commands::recording::{
    capture_photo, delete_media, get_recorder_status, list_media, start_recording,
    stop_recording, switch_camera,
};
use video_gps_recorder_lib::location::{LocationEvent, LocationFix};
use video_gps_recorder_lib::recorder::{CaptureState, RecorderEvent, SwitchOutcome};
use video_gps_recorder_lib::utils::files::ArtifactKind;
use video_gps_recorder_lib::RecorderState;

async fn launch(
    dir: &std::path::Path,
    lenses: Vec<CameraLens>,
    max_fps: f64,
    photo: Vec<u8>,
) -> (RecorderState, Arc<FakeCamera>) {
    let camera = FakeCamera::new(lenses, max_fps, photo);
    let state = RecorderState::launch(
        config(dir),
        camera.clone(),
        Arc::new(FakeMicrophone::default()),
        Arc::new(FakeProvider::default()),
    )
    .await
    .unwrap();
    camera.attach(state.capture_events());
    (state, camera)
}

async fn deliver_fix(state: &RecorderState, fix: LocationFix) {
    state
        .location_events()
        .send(LocationEvent::Fixes(vec![fix]))
        .unwrap();
    eventually(|| state.location.last_fix() == Some(fix)).await;
}

#[tokio::test]
async fn test_recording_writes_video_and_track() {
    let dir = tempfile::tempdir().unwrap();
    let (state, camera) = launch(dir.path(), vec![CameraLens::Standard], 60.0, jpeg_fixture()).await;
    let mut events = state.subscribe();

    start_recording(&state, Some(60)).await;
    let status = get_recorder_status(&state).await;
    assert_eq!(status.state, CaptureState::Recording);
    assert!(status.location.logging);
    assert_eq!(status.graph.frame_rate, 60);

    deliver_fix(&state, LocationFix::new(40.0, -74.0, 12.0, 5.0)).await;
    tokio::time::sleep(std::time::Duration::from_millis(150)).await;

    let track = stop_recording(&state).await.unwrap();
    assert!(track.finalized);
    assert_eq!(track.points_written, 1);
    assert!(!state.coordinator.is_recording());
    assert_eq!(camera.movies_started.load(Ordering::SeqCst), 1);

    let finished = wait_for(&mut events, |e| matches!(e, RecorderEvent::RecordingFinished { .. })).await;
    let RecorderEvent::RecordingFinished { path, error } = finished else {
        unreachable!()
    };
    assert!(error.is_none());
    assert!(path.file_name().unwrap().to_string_lossy().starts_with("video_"));

    let media = list_media(&state).await.unwrap();
    assert!(media.iter().any(|m| m.kind == ArtifactKind::Video));
    let track = media.iter().find(|m| m.kind == ArtifactKind::Track).unwrap();
    assert!(track.complete);
    assert_eq!(track.distance_m, Some(0.0));
}

#[tokio::test]
async fn test_start_and_stop_twice_is_same_as_once() {
    let dir = tempfile::tempdir().unwrap();
    let (state, camera) = launch(dir.path(), vec![CameraLens::Standard], 60.0, jpeg_fixture()).await;

    start_recording(&state, None).await;
    let first = get_recorder_status(&state).await;
    start_recording(&state, None).await;
    let second = get_recorder_status(&state).await;
    assert_eq!(first.state, second.state);
    assert_eq!(first.location.track_path, second.location.track_path);
    assert_eq!(camera.movies_started.load(Ordering::SeqCst), 1);

    assert!(stop_recording(&state).await.is_some());
    assert!(stop_recording(&state).await.is_none());
    let status = get_recorder_status(&state).await;
    assert_eq!(status.state, CaptureState::Idle);
    assert!(!status.location.logging);
    assert!(status.elapsed.is_none());
}

#[tokio::test]
async fn test_lens_switch_mid_recording_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (state, camera) = launch(
        dir.path(),
        vec![CameraLens::Standard, CameraLens::UltraWide],
        60.0,
        jpeg_fixture(),
    )
    .await;

    start_recording(&state, Some(30)).await;
    let before = state.coordinator.graph().await;

    let outcome = switch_camera(&state, true).await;
    assert_eq!(outcome, SwitchOutcome::RejectedWhileRecording);
    assert!(state.coordinator.is_recording());
    assert_eq!(state.coordinator.graph().await, before);
    assert_eq!(camera.inputs(), vec![CameraLens::Standard]);

    stop_recording(&state).await;
    assert_eq!(switch_camera(&state, true).await, SwitchOutcome::Switched);
    assert_eq!(camera.inputs(), vec![CameraLens::UltraWide]);
}

#[tokio::test]
async fn test_sixty_fps_falls_back_to_default_format() {
    let dir = tempfile::tempdir().unwrap();
    let (state, camera) = launch(dir.path(), vec![CameraLens::Standard], 30.0, jpeg_fixture()).await;

    start_recording(&state, Some(60)).await;
    assert!(state.coordinator.is_recording());
    let graph = state.coordinator.graph().await;
    assert_eq!(graph.active_format, None);
    assert_eq!(graph.frame_rate, 30);
    assert!(camera.default_format_uses.load(Ordering::SeqCst) >= 1);
    stop_recording(&state).await;
}

#[tokio::test]
async fn test_photo_without_fix_has_no_gps() {
    let dir = tempfile::tempdir().unwrap();
    let (state, _camera) = launch(dir.path(), vec![CameraLens::Standard], 60.0, jpeg_fixture()).await;
    let mut events = state.subscribe();

    assert!(capture_photo(&state, false).await.is_some());
    let saved = wait_for(&mut events, |e| matches!(e, RecorderEvent::PhotoSaved { .. })).await;
    let RecorderEvent::PhotoSaved { path, geotagged } = saved else {
        unreachable!()
    };
    assert!(!geotagged);
    assert!(path.file_name().unwrap().to_string_lossy().starts_with("photo_"));

    let data = std::fs::read(&path).unwrap();
    assert_eq!(data, jpeg_fixture());
    let has_gps = read_exif(&data)
        .map(|exif| exif.get_field(Tag::GPSLatitude, In::PRIMARY).is_some())
        .unwrap_or(false);
    assert!(!has_gps);
}

#[tokio::test]
async fn test_photo_after_fix_carries_matching_gps() {
    let dir = tempfile::tempdir().unwrap();
    let original = jpeg_fixture_with_make("FieldCam");
    let (state, _camera) = launch(dir.path(), vec![CameraLens::Standard], 60.0, original.clone()).await;
    let mut events = state.subscribe();

    let fix = LocationFix::new(-33.856784, 151.215297, -4.25, 8.0);
    deliver_fix(&state, fix).await;

    capture_photo(&state, false).await.unwrap();
    let saved = wait_for(&mut events, |e| matches!(e, RecorderEvent::PhotoSaved { .. })).await;
    let RecorderEvent::PhotoSaved { path, geotagged } = saved else {
        unreachable!()
    };
    assert!(geotagged);

    let data = std::fs::read(&path).unwrap();
    let exif = read_exif(&data).unwrap();

    let lat = dms_degrees(&exif, Tag::GPSLatitude).unwrap();
    let lon = dms_degrees(&exif, Tag::GPSLongitude).unwrap();
    assert!((lat - 33.856784).abs() < 1e-6);
    assert!((lon - 151.215297).abs() < 1e-6);
    assert_eq!(ascii_value(&exif, Tag::GPSLatitudeRef).as_deref(), Some("S"));
    assert_eq!(ascii_value(&exif, Tag::GPSLongitudeRef).as_deref(), Some("E"));

    let altitude = exif
        .get_field(Tag::GPSAltitude, In::PRIMARY)
        .and_then(|f| match &f.value {
            exif::Value::Rational(v) => v.first().map(|r| r.to_f64()),
            _ => None,
        })
        .unwrap();
    assert!((altitude - 4.25).abs() < 1e-3);
    let below = exif
        .get_field(Tag::GPSAltitudeRef, In::PRIMARY)
        .and_then(|f| f.value.get_uint(0));
    assert_eq!(below, Some(1));

    // Camera metadata survives and the image data is untouched
    assert_eq!(ascii_value(&exif, Tag::Make).as_deref(), Some("FieldCam"));
    assert_eq!(strip_exif(&data), strip_exif(&original));
}

#[tokio::test]
async fn test_photo_with_audio_starts_snippet() {
    let dir = tempfile::tempdir().unwrap();
    let (state, _camera) = launch(dir.path(), vec![CameraLens::Standard], 60.0, jpeg_fixture()).await;

    capture_photo(&state, true).await.unwrap();
    eventually(|| state.coordinator.audio().is_active()).await;

    let status = get_recorder_status(&state).await;
    assert!(status.mic_countdown > 0);
    let clip = state.coordinator.audio().current_path().unwrap();
    assert!(clip.file_name().unwrap().to_string_lossy().starts_with("mic_"));
}

#[tokio::test]
async fn test_media_can_be_deleted() {
    let dir = tempfile::tempdir().unwrap();
    let (state, _camera) = launch(dir.path(), vec![CameraLens::Standard], 60.0, jpeg_fixture()).await;
    let mut events = state.subscribe();

    capture_photo(&state, false).await.unwrap();
    let RecorderEvent::PhotoSaved { path, .. } =
        wait_for(&mut events, |e| matches!(e, RecorderEvent::PhotoSaved { .. })).await
    else {
        unreachable!()
    };

    delete_media(&state, &path).await.unwrap();
    assert!(!path.exists());
    assert!(list_media(&state).await.unwrap().is_empty());

    let outside = tempfile::tempdir().unwrap();
    let stray = outside.path().join("photo_1.jpg");
    std::fs::write(&stray, b"x").unwrap();
    assert!(delete_media(&state, &stray).await.is_err());
    assert!(stray.exists());
}

#[tokio::test]
async fn test_launch_rejects_zero_sample_interval() {
    let dir = tempfile::tempdir().unwrap();
    let config = video_gps_recorder_lib::RecorderConfig {
        sample_interval_ms: 0,
        ..config(dir.path())
    };
    let result = RecorderState::launch(
        config,
        FakeCamera::new(vec![CameraLens::Standard], 60.0, jpeg_fixture()),
        Arc::new(FakeMicrophone::default()),
        Arc::new(FakeProvider::default()),
    )
    .await;

    let err = result.err().unwrap();
    assert!(format!("{:#}", err).contains("sampleIntervalMs"));
}
