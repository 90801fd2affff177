//! Integration tests for the capture stream manager and screen share loop

mod mocks;

use argon_core::capture::{
    CaptureManager, CaptureState, ContentCatalog, ScreenShare, SinkStatus, UpdateKind,
};
use argon_core::config::{CaptureConfiguration, CaptureKind, ContentFilter};
use argon_core::error::ArgonError;
use argon_core::pipeline::FrameDeliveryPipeline;
use argon_core::types::{CapturerHandle, FrameSize};
use futures::StreamExt;
use mocks::{captured, RecordingTransport, RecordingView, ScriptedPlatform};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn display_config(id: u32) -> CaptureConfiguration {
    CaptureConfiguration::new(ContentFilter::display(id))
        .with_resolution(1280, 720)
        .with_frame_interval(argon_core::config::FrameInterval {
            numerator: 0,
            denominator: 1,
        })
        .with_queue_depth(3)
}

async fn wait_for_preview(preview: &RecordingView, count: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while preview.count() < count {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_start_emits_frames_in_order() {
    let platform = ScriptedPlatform::new();
    let manager = CaptureManager::new(platform.clone());

    let mut frames = manager.start(display_config(1)).await.unwrap().unwrap();
    assert_eq!(manager.state(), CaptureState::Running);

    assert_eq!(platform.push(captured(1280, 720, 1)), SinkStatus::Accepted);
    assert_eq!(platform.push(captured(1280, 720, 2)), SinkStatus::Accepted);

    let first = frames.next_frame().await.unwrap();
    let second = frames.next().await.unwrap();
    assert_eq!(first.buffer.pts(), 1);
    assert_eq!(second.buffer.pts(), 2);
    assert_eq!(first.size, FrameSize::new(1280, 720));
}

#[tokio::test]
async fn test_second_start_is_noop() {
    let platform = ScriptedPlatform::new();
    let manager = CaptureManager::new(platform.clone());

    let _frames = manager.start(display_config(1)).await.unwrap().unwrap();
    let again = manager.start(display_config(2)).await.unwrap();

    assert!(again.is_none());
    assert!(manager.is_running());
    assert_eq!(platform.opened(), 1);
    assert_eq!(manager.configuration().unwrap().content_filter, ContentFilter::display(1));
}

#[tokio::test]
async fn test_permission_denied_leaves_idle() {
    let platform = ScriptedPlatform::new();
    platform.deny(true);
    let manager = CaptureManager::new(platform.clone());

    let err = manager.start(display_config(1)).await.err().unwrap();
    assert!(matches!(err, ArgonError::PermissionDenied(_)));
    assert_eq!(manager.state(), CaptureState::Idle);
    assert_eq!(platform.opened(), 0);
}

#[tokio::test]
async fn test_content_query_runs_once_per_start() {
    let platform = ScriptedPlatform::new();
    let manager = CaptureManager::new(platform.clone());

    let _frames = manager.start(display_config(1)).await.unwrap();
    manager.stop().await.unwrap();
    let _frames = manager.start(display_config(1)).await.unwrap();

    assert_eq!(platform.log.content_queries.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_stream_start_failure_leaves_idle() {
    let platform = ScriptedPlatform::new();
    platform.fail_open(true);
    let manager = CaptureManager::new(platform.clone());

    let err = manager.start(display_config(1)).await.err().unwrap();
    assert!(matches!(err, ArgonError::StreamStart(_)));
    assert_eq!(manager.state(), CaptureState::Idle);

    platform.fail_open(false);
    assert!(manager.start(display_config(1)).await.unwrap().is_some());
}

#[tokio::test]
async fn test_unknown_target_fails_to_start() {
    let platform = ScriptedPlatform::new();
    let manager = CaptureManager::new(platform.clone());

    let err = manager.start(display_config(99)).await.err().unwrap();
    assert!(matches!(err, ArgonError::StreamStart(_)));
    assert!(!manager.is_running());
}

#[tokio::test]
async fn test_stop_ends_sequence_deterministically() {
    let platform = ScriptedPlatform::new();
    let manager = CaptureManager::new(platform.clone());
    let mut frames = manager.start(display_config(1)).await.unwrap().unwrap();

    platform.push(captured(1280, 720, 1));
    platform.push(captured(1280, 720, 2));
    manager.stop().await.unwrap();

    assert_eq!(manager.state(), CaptureState::Idle);
    assert_eq!(platform.live_streams(), 0);
    // Frames queued before stop are not emitted after it
    assert!(frames.next_frame().await.is_none());
    assert_eq!(platform.push(captured(1280, 720, 3)), SinkStatus::Closed);
}

#[tokio::test]
async fn test_restart_yields_fresh_sequence() {
    let platform = ScriptedPlatform::new();
    let manager = CaptureManager::new(platform.clone());

    let mut old = manager.start(display_config(1)).await.unwrap().unwrap();
    platform.push(captured(1280, 720, 1));
    manager.stop().await.unwrap();

    let mut fresh = manager.start(display_config(1)).await.unwrap().unwrap();
    platform.push(captured(1280, 720, 10));

    assert_eq!(fresh.next_frame().await.unwrap().buffer.pts(), 10);
    assert_eq!(fresh.pending(), 0);
    assert!(old.next_frame().await.is_none());
}

#[tokio::test]
async fn test_backpressure_bounds_queue() {
    let platform = ScriptedPlatform::new();
    let manager = CaptureManager::new(platform.clone());
    let mut frames = manager.start(display_config(1)).await.unwrap().unwrap();

    for pts in 0..3 {
        assert_eq!(platform.push(captured(1280, 720, pts)), SinkStatus::Accepted);
    }
    assert_eq!(platform.push(captured(1280, 720, 3)), SinkStatus::Backpressure);
    assert_eq!(frames.pending(), 3);

    // A waiting producer resumes once the consumer takes a frame
    let producer = {
        let platform = platform.clone();
        tokio::spawn(async move { platform.send(captured(1280, 720, 4)).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!producer.is_finished());

    assert_eq!(frames.next_frame().await.unwrap().buffer.pts(), 0);
    assert_eq!(producer.await.unwrap(), SinkStatus::Accepted);
    assert_eq!(frames.pending(), 3);
    assert_eq!(frames.stats().backpressured, 1);
}

#[tokio::test]
async fn test_frame_interval_caps_rate() {
    let platform = ScriptedPlatform::new();
    let manager = CaptureManager::new(platform.clone());
    let config = display_config(1).with_frame_rate(1);
    let _frames = manager.start(config).await.unwrap().unwrap();

    assert_eq!(platform.push(captured(1280, 720, 1)), SinkStatus::Accepted);
    assert_eq!(platform.push(captured(1280, 720, 2)), SinkStatus::Throttled);
}

#[tokio::test]
async fn test_update_resolution_in_place() {
    let platform = ScriptedPlatform::new();
    let manager = CaptureManager::new(platform.clone());
    let mut frames = manager.start(display_config(1)).await.unwrap().unwrap();

    let update = manager
        .update(display_config(1).with_resolution(1920, 1080))
        .await
        .unwrap();

    assert_eq!(update, UpdateKind::InPlace);
    assert_eq!(platform.opened(), 1);
    assert_eq!(platform.log.config_updates.load(Ordering::SeqCst), 1);
    assert_eq!(platform.log.filter_updates.load(Ordering::SeqCst), 0);

    // Same sequence keeps flowing
    platform.push(captured(1920, 1080, 5));
    assert_eq!(frames.next_frame().await.unwrap().size, FrameSize::new(1920, 1080));
}

#[tokio::test]
async fn test_update_exclusions_in_place() {
    let platform = ScriptedPlatform::new();
    let manager = CaptureManager::new(platform.clone());
    let _frames = manager.start(display_config(1)).await.unwrap().unwrap();

    let update = manager
        .update(display_config(1).with_excluded_apps(["org.argon"]))
        .await
        .unwrap();

    assert_eq!(update, UpdateKind::InPlace);
    assert_eq!(platform.log.filter_updates.load(Ordering::SeqCst), 1);
    assert_eq!(platform.log.config_updates.load(Ordering::SeqCst), 0);
    let filter = platform.log.last_filter.lock().clone().unwrap();
    assert_eq!(filter.excluded_apps(), ["org.argon".to_string()]);
}

#[tokio::test]
async fn test_update_target_restarts_without_ending_sequence() {
    let platform = ScriptedPlatform::new();
    let manager = CaptureManager::new(platform.clone());
    let mut frames = manager.start(display_config(1)).await.unwrap().unwrap();

    let update = manager
        .update(CaptureConfiguration::new(ContentFilter::window(20)).with_queue_depth(3))
        .await
        .unwrap();

    assert_eq!(update, UpdateKind::Restarted);
    assert_eq!(platform.opened(), 2);
    assert_eq!(platform.live_streams(), 1);

    platform.push(captured(800, 600, 9));
    assert_eq!(frames.next_frame().await.unwrap().buffer.pts(), 9);
}

#[tokio::test]
async fn test_identical_update_is_unchanged() {
    let platform = ScriptedPlatform::new();
    let manager = CaptureManager::new(platform.clone());
    let _frames = manager.start(display_config(1)).await.unwrap().unwrap();

    assert_eq!(
        manager.update(display_config(1)).await.unwrap(),
        UpdateKind::Unchanged
    );
}

#[tokio::test]
async fn test_update_while_idle_is_rejected() {
    let manager = CaptureManager::new(ScriptedPlatform::new());
    let err = manager.update(display_config(1)).await.err().unwrap();
    assert!(matches!(err, ArgonError::InvalidState(_)));
}

#[tokio::test]
async fn test_cancelled_start_leaves_no_stream() {
    let platform = ScriptedPlatform::new();
    platform.hang_open(true);
    let manager = CaptureManager::new(platform.clone());

    let result = tokio::time::timeout(
        Duration::from_millis(50),
        manager.start(display_config(1)),
    )
    .await;
    assert!(result.is_err());
    assert_eq!(manager.state(), CaptureState::Idle);
    assert_eq!(platform.live_streams(), 0);

    manager.stop().await.unwrap();
    platform.hang_open(false);
    assert!(manager.start(display_config(1)).await.unwrap().is_some());
}

#[tokio::test]
async fn test_screen_share_forwards_only_while_injected() {
    let platform = ScriptedPlatform::new();
    let manager = CaptureManager::new(platform.clone());
    let transport = RecordingTransport::new();
    let preview = RecordingView::new();
    let pipeline = Arc::new(FrameDeliveryPipeline::new(
        RecordingView::new(),
        RecordingView::new(),
        transport.clone(),
    ));

    let frames = manager.start(display_config(1)).await.unwrap().unwrap();
    let share = ScreenShare::new(preview.clone(), pipeline.clone()).spawn(frames);

    platform.send(captured(1280, 720, 1)).await;
    wait_for_preview(&preview, 1).await;
    pipeline.active_source().inject(CapturerHandle::from_raw(1));
    platform.send(captured(1280, 720, 2)).await;
    platform.send(captured(1440, 900, 3)).await;
    wait_for_preview(&preview, 3).await;
    manager.stop().await.unwrap();
    let stats = share.await.unwrap();

    assert_eq!(preview.frames(), vec![1, 2, 3]);
    assert_eq!(transport.consumed(), vec![2, 3]);
    assert_eq!(stats.frames, 3);
    assert_eq!(stats.injected, 2);
    assert_eq!(stats.size_changes, 2);
}

#[tokio::test]
async fn test_catalog_defaults_and_window_filtering() {
    let platform = ScriptedPlatform::new();
    let catalog = ContentCatalog::new(Some("org.argon".to_string()));
    catalog.refresh(platform.as_ref()).await.unwrap();

    let names: Vec<String> = catalog.windows().iter().map(|w| w.display_name()).collect();
    assert_eq!(names, vec!["Browser: Docs", "Editor: notes.txt"]);
    assert_eq!(catalog.selected_display().unwrap().id, 1);
    assert_eq!(catalog.selected_window().unwrap().id, 21);

    let config = catalog.configuration(CaptureKind::Display, 2, true).unwrap();
    assert_eq!(config.target_size(), FrameSize::new(2880, 1800));
    assert_eq!(config.queue_depth, 5);
    assert_eq!(config.fps(), 60);
    assert_eq!(config.content_filter.excluded_apps(), ["org.argon".to_string()]);

    assert!(catalog.select_display(2));
    assert!(!catalog.select_display(42));
    assert_eq!(catalog.selected_display().unwrap().id, 2);
}
