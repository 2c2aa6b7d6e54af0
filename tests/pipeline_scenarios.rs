use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ground_monitor::log::summarize;
use ground_monitor::{
    CalibrationSession, Correspondence, Detection, DistanceEngine, FileViolationLog, Mode,
    Monitor, PixelPoint, RecordingDisplay, ScriptedBackend, ScriptedOperator, SourceConfig,
    StdinOperator, SyntheticSource, WorldPoint,
};

const SQUARE: [((f64, f64), (f64, f64)); 4] = [
    ((100.0, 500.0), (0.0, 0.0)),
    ((500.0, 500.0), (4.0, 0.0)),
    ((100.0, 100.0), (0.0, 4.0)),
    ((500.0, 100.0), (4.0, 4.0)),
];

fn square_operator() -> ScriptedOperator {
    SQUARE.iter().fold(ScriptedOperator::new(), |op, &(p, w)| {
        op.point(PixelPoint::new(p.0, p.1), WorldPoint::new(w.0, w.1))
    })
}

fn calibrated_session() -> CalibrationSession {
    let points: Vec<Correspondence> = SQUARE
        .iter()
        .map(|&(p, w)| {
            Correspondence::new(PixelPoint::new(p.0, p.1), WorldPoint::new(w.0, w.1)).unwrap()
        })
        .collect();
    let mut session = CalibrationSession::new(4).unwrap();
    session.preload(&points).unwrap();
    session
}

/// Two people one meter apart on the ground.
fn close_pair() -> Vec<Detection> {
    vec![
        Detection::person(80.0, 250.0, 120.0, 500.0),
        Detection::person(180.0, 250.0, 220.0, 500.0),
    ]
}

fn source(frames: u64) -> SyntheticSource {
    SyntheticSource::new(SourceConfig {
        frame_limit: Some(frames),
        ..SourceConfig::default()
    })
}

#[test]
fn three_violating_frames_append_three_lines() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("distance_violations.log");
    std::fs::write(&log_path, "2024-01-01 00:00:00 - Distance violation: 0.90 meters\n").unwrap();

    let mut monitor = Monitor::new(
        calibrated_session(),
        Box::new(ScriptedBackend::repeating(close_pair())),
        DistanceEngine::default(),
        Box::new(FileViolationLog::new(&log_path)),
    );
    let mut display = RecordingDisplay::new();
    let stats = monitor
        .run(
            &mut source(3),
            &mut ScriptedOperator::new(),
            &mut display,
            &AtomicBool::new(false),
        )
        .unwrap();

    assert_eq!(stats.frames, 3);
    assert_eq!(stats.violations, 3);
    assert_eq!(display.overlays.len(), 3);
    assert!(display.overlays.iter().all(|o| o.has_alert()));

    let content = std::fs::read_to_string(&log_path).unwrap();
    let lines: Vec<_> = content.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "2024-01-01 00:00:00 - Distance violation: 0.90 meters");
    for line in &lines[1..] {
        assert!(line.ends_with(" - Distance violation: 1.00 meters"), "{line}");
    }

    let summary = summarize(content.as_bytes()).unwrap();
    assert_eq!(summary.violations, 4);
    assert_eq!(summary.malformed_lines, 0);
    assert_eq!(summary.min_distance, Some(0.9));
}

#[test]
fn tighter_threshold_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("violations.log");

    let mut monitor = Monitor::new(
        calibrated_session(),
        Box::new(ScriptedBackend::repeating(close_pair())),
        DistanceEngine::new(0.5).unwrap(),
        Box::new(FileViolationLog::new(&log_path)),
    );
    let mut display = RecordingDisplay::new();
    let stats = monitor
        .run(
            &mut source(2),
            &mut ScriptedOperator::new(),
            &mut display,
            &AtomicBool::new(false),
        )
        .unwrap();

    assert_eq!(stats.pairs, 2);
    assert_eq!(stats.violations, 0);
    assert!(!log_path.exists());
    assert!(display
        .overlays
        .iter()
        .all(|o| o.labels().any(|l| l == "1.00 meters") && !o.has_alert()));
}

#[test]
fn unwritable_log_still_alerts_and_keeps_running() {
    let dir = tempfile::tempdir().unwrap();

    let mut monitor = Monitor::new(
        calibrated_session(),
        Box::new(ScriptedBackend::repeating(close_pair())),
        DistanceEngine::default(),
        Box::new(FileViolationLog::new(dir.path())),
    );
    let mut display = RecordingDisplay::new();
    let stats = monitor
        .run(
            &mut source(2),
            &mut ScriptedOperator::new(),
            &mut display,
            &AtomicBool::new(false),
        )
        .unwrap();

    assert_eq!(stats.frames, 2);
    assert_eq!(stats.persistence_failures, 2);
    assert!(display.overlays.iter().all(|o| o.has_alert()));
}

#[test]
fn interactive_calibration_then_measurement() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("violations.log");

    let mut monitor = Monitor::new(
        CalibrationSession::new(4).unwrap(),
        Box::new(ScriptedBackend::repeating(close_pair())),
        DistanceEngine::default(),
        Box::new(FileViolationLog::new(&log_path)),
    );
    let mut display = RecordingDisplay::new();
    let stats = monitor
        .run(
            &mut source(6),
            &mut square_operator(),
            &mut display,
            &AtomicBool::new(false),
        )
        .unwrap();

    assert_eq!(monitor.mode(), Mode::Measuring);
    assert_eq!(stats.calibration_frames, 4);
    assert_eq!(stats.measuring_frames, 2);
    assert_eq!(stats.violations, 2);
    assert!(display.overlays[..4]
        .iter()
        .all(|o| o.banners().any(|b| b.starts_with("Calibration Mode"))));

    let content = std::fs::read_to_string(&log_path).unwrap();
    assert_eq!(content.lines().count(), 2);
}

#[test]
fn quit_flag_stops_before_first_frame() {
    let mut monitor = Monitor::new(
        calibrated_session(),
        Box::new(ScriptedBackend::repeating(close_pair())),
        DistanceEngine::default(),
        Box::new(ground_monitor::InMemoryViolationLog::new()),
    );
    let mut display = RecordingDisplay::new();
    let stats = monitor
        .run(
            &mut source(10),
            &mut ScriptedOperator::new(),
            &mut display,
            &AtomicBool::new(true),
        )
        .unwrap();
    assert_eq!(stats.frames, 0);
    assert!(display.overlays.is_empty());
}

#[test]
fn display_quit_ends_the_loop() {
    let mut monitor = Monitor::new(
        calibrated_session(),
        Box::new(ScriptedBackend::repeating(Vec::new())),
        DistanceEngine::default(),
        Box::new(ground_monitor::InMemoryViolationLog::new()),
    );
    let mut display = RecordingDisplay::quit_after(2);
    let stats = monitor
        .run(
            &mut source(10),
            &mut ScriptedOperator::new(),
            &mut display,
            &AtomicBool::new(false),
        )
        .unwrap();
    assert_eq!(stats.frames, 2);
}

fn uncalibrated_monitor() -> Monitor {
    Monitor::new(
        CalibrationSession::new(4).unwrap(),
        Box::new(ScriptedBackend::repeating(close_pair())),
        DistanceEngine::default(),
        Box::new(ground_monitor::InMemoryViolationLog::new()),
    )
}

#[test]
fn typed_quit_at_click_prompt_ends_run_cleanly() {
    let quit = Arc::new(AtomicBool::new(false));
    let mut operator = StdinOperator::new(b"q\n".as_slice(), Vec::new(), Arc::clone(&quit));
    let mut monitor = uncalibrated_monitor();
    let mut display = RecordingDisplay::new();
    let stats = monitor
        .run(&mut source(5), &mut operator, &mut display, &quit)
        .unwrap();
    assert!(stats.frames <= 1, "{stats:?}");
    assert!(display.overlays.is_empty());
    assert!(quit.load(Ordering::SeqCst));
    assert_eq!(monitor.mode(), Mode::Calibrating);
}

#[test]
fn end_of_input_at_coordinate_prompt_ends_run_cleanly() {
    let quit = Arc::new(AtomicBool::new(false));
    let mut operator = StdinOperator::new(b"100 500\n".as_slice(), Vec::new(), Arc::clone(&quit));
    let mut monitor = uncalibrated_monitor();
    let mut display = RecordingDisplay::new();
    let stats = monitor
        .run(&mut source(5), &mut operator, &mut display, &quit)
        .unwrap();
    assert_eq!(stats.frames, 1);
    assert_eq!(stats.calibration_frames, 1);
    assert_eq!(monitor.session().store().count(), 0);
    assert_eq!(monitor.session().pending(), Some(PixelPoint::new(100.0, 500.0)));
}

#[test]
fn queued_quit_is_only_read_at_prompts() {
    let mut operator = square_operator().quit();
    let mut monitor = uncalibrated_monitor();
    let mut display = RecordingDisplay::new();
    let stats = monitor
        .run(
            &mut source(10),
            &mut operator,
            &mut display,
            &AtomicBool::new(false),
        )
        .unwrap();
    assert_eq!(stats.calibration_frames, 4);
    assert_eq!(monitor.mode(), Mode::Measuring);
    assert_eq!(stats.measuring_frames, 6);
}
