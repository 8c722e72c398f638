//! Single-cycle behaviour of the scan orchestrator against mock hardware.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing_test::traced_test;
use traffic_rig::config::ScanConfig;
use traffic_rig::error::CaptureError;
use traffic_rig::hardware::mock::{
    MockArtifactStore, MockDetector, MockFrameSource, MockMotorTransport, MockReviewer,
};
use traffic_rig::hardware::MotorLink;
use traffic_rig::scan::{
    stop_channel, Flow, Position, ScanDirection, ScanOrchestrator, StopSignal,
};

/// Mock hardware plus handles kept for inspection.
struct Rig {
    camera: MockFrameSource,
    detector: MockDetector,
    store: MockArtifactStore,
    reviewer: MockReviewer,
}

impl Rig {
    fn new(detector: MockDetector) -> Self {
        Self {
            camera: MockFrameSource::new(),
            detector,
            store: MockArtifactStore::new(),
            reviewer: MockReviewer::new(),
        }
    }

    fn orchestrator(&self, stop: StopSignal) -> ScanOrchestrator {
        ScanOrchestrator::new(
            Arc::new(self.camera.clone()),
            Arc::new(self.detector.clone()),
            Arc::new(self.store.clone()),
            Arc::new(self.reviewer.clone()),
            ScanConfig::default(),
            stop,
        )
    }
}

fn side(label: u8) -> Position {
    Position::new(label).unwrap()
}

fn acking_link(delay: Duration) -> (MotorLink<MockMotorTransport>, MockMotorTransport) {
    let transport = MockMotorTransport::new().with_turn_ack(delay);
    (MotorLink::new(transport.clone()), transport)
}

#[tokio::test(start_paused = true)]
async fn test_forward_cycle_turns_three_times_and_sends_priority() {
    let rig = Rig::new(MockDetector::with_counts([2, 5, 5, 0]));
    let (mut link, motor) = acking_link(Duration::from_secs(1));

    let start = Instant::now();
    let cycle = rig
        .orchestrator(StopSignal::never())
        .scan_cycle(&mut link, ScanDirection::Forward)
        .await
        .unwrap();

    assert_eq!(motor.sent(), vec!["T", "T", "T", "O2314"]);
    assert_eq!(rig.camera.captures(), Position::ALL.to_vec());
    assert_eq!(cycle.priority.digits(), "2314");
    assert_eq!(cycle.total_vehicles(), 12);
    // Three turns, each acknowledged after 1s and followed by the 3s settle.
    assert_eq!(start.elapsed(), Duration::from_secs(12));
}

#[tokio::test(start_paused = true)]
async fn test_reverse_cycle_visits_four_to_one() {
    let rig = Rig::new(MockDetector::with_counts([2, 5, 5, 0]));
    let (mut link, motor) = acking_link(Duration::from_millis(200));

    let cycle = rig
        .orchestrator(StopSignal::never())
        .scan_cycle(&mut link, ScanDirection::Reverse)
        .await
        .unwrap();

    assert_eq!(
        rig.camera.captures(),
        vec![side(4), side(3), side(2), side(1)]
    );
    assert_eq!(
        cycle.sides.map(|s| s.position),
        [side(4), side(3), side(2), side(1)]
    );
    assert_eq!(motor.sent(), vec!["R", "R", "R", "O3214"]);
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn test_all_captures_failing_still_yields_four_zero_counts() {
    let rig = Rig::new(MockDetector::with_counts([9, 9, 9, 9]));
    rig.camera
        .fail_at(side(1), CaptureError::Timeout(Duration::from_secs(10)));
    rig.camera
        .fail_at(side(2), CaptureError::Transport("connection refused".into()));
    rig.camera
        .fail_at(side(3), CaptureError::Decode("truncated jpeg".into()));
    rig.camera
        .fail_at(side(4), CaptureError::Transport("host unreachable".into()));
    let (mut link, motor) = acking_link(Duration::from_millis(100));

    let cycle = rig
        .orchestrator(StopSignal::never())
        .scan_cycle(&mut link, ScanDirection::Forward)
        .await
        .unwrap();

    assert_eq!(cycle.sides.len(), 4);
    assert!(cycle.sides.iter().all(|s| s.count == 0));
    assert_eq!(cycle.priority.digits(), "1234");
    assert_eq!(motor.sent().last().map(String::as_str), Some("O1234"));
    assert!(rig.store.paths().is_empty());

    assert!(logs_contain("capture failed"));
    assert!(logs_contain("timeout"));
    assert!(logs_contain("transport"));
    assert!(logs_contain("decode"));
}

#[tokio::test(start_paused = true)]
async fn test_detection_failure_counts_zero_for_that_side_only() {
    let rig = Rig::new(MockDetector::with_counts([3, 4, 1, 2]));
    rig.detector.fail_at(side(2));
    let (mut link, _motor) = acking_link(Duration::from_millis(100));

    let cycle = rig
        .orchestrator(StopSignal::never())
        .scan_cycle(&mut link, ScanDirection::Forward)
        .await
        .unwrap();

    assert_eq!(cycle.count_for(side(1)), 3);
    assert_eq!(cycle.count_for(side(2)), 0);
    assert_eq!(cycle.count_for(side(4)), 2);
    assert_eq!(cycle.priority.digits(), "1432");
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn test_missing_ack_waits_full_budget_then_settles() {
    let rig = Rig::new(MockDetector::with_counts([1, 0, 0, 0]));
    let motor = MockMotorTransport::new();
    let mut link = MotorLink::new(motor.clone());

    let start = Instant::now();
    let cycle = rig
        .orchestrator(StopSignal::never())
        .scan_cycle(&mut link, ScanDirection::Forward)
        .await;

    assert!(cycle.is_some());
    assert_eq!(motor.sent(), vec!["T", "T", "T", "O1234"]);
    // 10s ack budget plus 3s settle, three times.
    assert_eq!(start.elapsed(), Duration::from_secs(39));
    assert!(logs_contain("no TURN_DONE"));
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn test_controller_chatter_during_turn_is_logged() {
    let rig = Rig::new(MockDetector::new());
    let (mut link, motor) = acking_link(Duration::from_secs(1));
    motor.push_line_after(Duration::from_millis(400), "STEPS 512");

    rig.orchestrator(StopSignal::never())
        .scan_cycle(&mut link, ScanDirection::Forward)
        .await
        .unwrap();

    assert!(logs_contain("STEPS 512"));
}

#[tokio::test(start_paused = true)]
async fn test_closed_link_skips_scan_and_continues() {
    let rig = Rig::new(MockDetector::new());
    let mut link: MotorLink<MockMotorTransport> = MotorLink::closed();

    let flow = rig
        .orchestrator(StopSignal::never())
        .perform_full_scan(&mut link, ScanDirection::Forward)
        .await;

    assert_eq!(flow, Flow::Continue);
    assert!(rig.camera.captures().is_empty());
    assert_eq!(rig.store.resets(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_annotated_cycle_goes_to_review() {
    let rig = Rig::new(MockDetector::with_counts([0, 1, 0, 6]).annotating());
    let (mut link, _motor) = acking_link(Duration::from_millis(100));

    let flow = rig
        .orchestrator(StopSignal::never())
        .perform_full_scan(&mut link, ScanDirection::Forward)
        .await;

    assert_eq!(flow, Flow::Continue);
    let reviewed = rig.reviewer.reviewed();
    assert_eq!(reviewed.len(), 1);
    assert_eq!(reviewed[0].artifacts.len(), 4);
    assert_eq!(reviewed[0].priority.digits(), "4213");
}

#[tokio::test(start_paused = true)]
async fn test_review_stop_is_propagated() {
    let mut rig = Rig::new(MockDetector::new().annotating());
    rig.reviewer = MockReviewer::stopping_after(1);
    let (mut link, _motor) = acking_link(Duration::from_millis(100));

    let flow = rig
        .orchestrator(StopSignal::never())
        .perform_full_scan(&mut link, ScanDirection::Reverse)
        .await;

    assert_eq!(flow, Flow::Stop);
}

#[tokio::test(start_paused = true)]
async fn test_no_artifacts_skips_review() {
    let rig = Rig::new(MockDetector::with_counts([1, 1, 1, 1]));
    let (mut link, _motor) = acking_link(Duration::from_millis(100));

    let flow = rig
        .orchestrator(StopSignal::never())
        .perform_full_scan(&mut link, ScanDirection::Forward)
        .await;

    assert_eq!(flow, Flow::Continue);
    assert!(rig.reviewer.reviewed().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stop_abandons_cycle_without_priority() {
    let rig = Rig::new(MockDetector::with_counts([1, 2, 3, 4]));
    let (mut link, motor) = acking_link(Duration::from_secs(1));
    let (handle, signal) = stop_channel();
    handle.trigger();

    let flow = rig
        .orchestrator(signal)
        .perform_full_scan(&mut link, ScanDirection::Forward)
        .await;

    assert_eq!(flow, Flow::Stop);
    assert_eq!(rig.camera.captures(), vec![side(1)]);
    assert!(motor.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_turn_send_still_completes_cycle() {
    let rig = Rig::new(MockDetector::with_counts([0, 0, 2, 0]));
    let (mut link, motor) = acking_link(Duration::from_millis(100));
    motor.fail_next_write();

    let cycle = rig
        .orchestrator(StopSignal::never())
        .scan_cycle(&mut link, ScanDirection::Forward)
        .await
        .unwrap();

    assert_eq!(motor.sent(), vec!["T", "T", "O3124"]);
    assert_eq!(cycle.priority.digits(), "3124");
}
