//! Calibration session and live preview against mock hardware.

use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_test::traced_test;
use traffic_rig::calibration::{
    run_live_preview, CalibrationExit, CalibrationSession, CalibrationSummary,
};
use traffic_rig::config::CalibrationConfig;
use traffic_rig::error::{CaptureError, RigError};
use traffic_rig::hardware::mock::{MockArtifactStore, MockFrameSource, MockMotorTransport};
use traffic_rig::hardware::MotorLink;
use traffic_rig::scan::{stop_channel, Position, StopSignal};

fn session() -> CalibrationSession {
    CalibrationSession::from_config(&CalibrationConfig::default())
}

fn queued_input(lines: &[&str]) -> (mpsc::Sender<String>, mpsc::Receiver<String>) {
    let (tx, rx) = mpsc::channel(16);
    for line in lines {
        tx.try_send((*line).to_string()).unwrap();
    }
    (tx, rx)
}

#[tokio::test(start_paused = true)]
async fn test_moves_are_sent_and_malformed_input_is_skipped() {
    let motor = MockMotorTransport::new();
    let mut link = MotorLink::new(motor.clone());
    let (_tx, mut input) = queued_input(&["move 50", "M -200", "spin", "", "m fast", "done", "m 5"]);

    let summary = session()
        .run(&mut link, &mut input, &mut StopSignal::never())
        .await
        .unwrap();

    assert_eq!(
        summary,
        CalibrationSummary {
            moves_sent: 2,
            rejected_inputs: 2,
            exit: CalibrationExit::Done,
        }
    );
    assert_eq!(motor.sent(), vec!["P", "M50", "M-200"]);
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn test_pause_and_move_replies_are_reported() {
    let motor = MockMotorTransport::new();
    motor.push_line("PAUSED");
    let mut link = MotorLink::new(motor.clone());
    let (tx, mut input) = queued_input(&[]);

    let feeder = {
        let motor = motor.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            tx.send("m 25".to_string()).await.unwrap();
            motor.push_line_after(Duration::from_millis(50), "MOVED 25");
            tokio::time::sleep(Duration::from_secs(1)).await;
            tx.send("done".to_string()).await.unwrap();
        })
    };

    let summary = session()
        .run(&mut link, &mut input, &mut StopSignal::never())
        .await
        .unwrap();
    feeder.await.unwrap();

    assert_eq!(summary.moves_sent, 1);
    assert_eq!(summary.exit, CalibrationExit::Done);
    assert!(logs_contain("PAUSED"));
    assert!(logs_contain("MOVED 25"));
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn test_unsolicited_controller_output_is_logged_while_idle() {
    let motor = MockMotorTransport::new();
    let mut link = MotorLink::new(motor.clone());
    motor.push_line_after(Duration::from_secs(2), "LIMIT SWITCH");
    let (tx, mut input) = queued_input(&[]);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        tx.send("done".to_string()).await.unwrap();
    });

    let summary = session()
        .run(&mut link, &mut input, &mut StopSignal::never())
        .await
        .unwrap();

    assert_eq!(summary.exit, CalibrationExit::Done);
    assert!(logs_contain("LIMIT SWITCH"));
}

#[tokio::test(start_paused = true)]
async fn test_stop_ends_session() {
    let motor = MockMotorTransport::new();
    let mut link = MotorLink::new(motor.clone());
    let (_tx, mut input) = queued_input(&[]);
    let (handle, mut stop) = stop_channel();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(3)).await;
        handle.trigger();
    });

    let summary = session().run(&mut link, &mut input, &mut stop).await.unwrap();

    assert_eq!(summary.exit, CalibrationExit::Stopped);
    assert_eq!(motor.sent(), vec!["P"]);
}

#[tokio::test(start_paused = true)]
async fn test_closed_input_ends_session() {
    let mut link = MotorLink::new(MockMotorTransport::new());
    let (tx, mut input) = queued_input(&["m 10"]);
    drop(tx);

    let summary = session()
        .run(&mut link, &mut input, &mut StopSignal::never())
        .await
        .unwrap();

    assert_eq!(summary.moves_sent, 1);
    assert_eq!(summary.exit, CalibrationExit::InputClosed);
}

#[tokio::test]
async fn test_closed_link_is_rejected() {
    let mut link: MotorLink<MockMotorTransport> = MotorLink::closed();
    let (_tx, mut input) = queued_input(&["done"]);

    let result = session()
        .run(&mut link, &mut input, &mut StopSignal::never())
        .await;

    assert!(matches!(result, Err(RigError::LinkNotOpen)));
}

#[tokio::test(start_paused = true)]
async fn test_live_preview_refreshes_until_stopped() {
    let camera = MockFrameSource::new();
    let store = MockArtifactStore::new();
    let (handle, stop) = stop_channel();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(3500)).await;
        handle.trigger();
    });

    let written = run_live_preview(&camera, &store, Duration::from_secs(1), stop).await;

    assert_eq!(written, 4);
    assert_eq!(store.paths(), vec![PathBuf::from("preview/latest.jpg")]);
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn test_live_preview_retries_after_failed_capture() {
    let camera = MockFrameSource::new();
    camera.fail_at(
        Position::ALL[0],
        CaptureError::Transport("camera offline".into()),
    );
    let store = MockArtifactStore::new();
    let (handle, stop) = stop_channel();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(2500)).await;
        handle.trigger();
    });

    let written = run_live_preview(&camera, &store, Duration::from_secs(1), stop).await;

    assert_eq!(written, 0);
    assert_eq!(camera.captures().len(), 3);
    assert!(store.paths().is_empty());
    assert!(logs_contain("preview capture failed"));
}
