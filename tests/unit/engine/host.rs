use std::thread;

use super::*;
use crate::engine::recording::{RECORDING_ENGINE_VERSION, RecordingEngine};
use crate::request::model::Format;

fn host_with(engine: RecordingEngine) -> (Arc<RecordingEngine>, EngineHost) {
    let engine = Arc::new(engine);
    let host = EngineHost::new(engine.clone());
    (engine, host)
}

fn raster() -> FormatOptions {
    FormatOptions {
        format: Format::Raster,
        dpi: None,
        scale: None,
    }
}

#[test]
fn ensure_ready_starts_once() {
    let (engine, host) = host_with(RecordingEngine::new());
    assert_eq!(host.state(), EngineState::NotStarted);
    host.ensure_ready().unwrap();
    host.ensure_ready().unwrap();
    host.start().unwrap();
    assert_eq!(engine.starts(), 1);
    assert_eq!(host.state(), EngineState::Running);
    assert_eq!(host.info().unwrap().version, RECORDING_ENGINE_VERSION);
}

#[test]
fn concurrent_starts_converge_on_one_engine() {
    let (engine, host) = host_with(RecordingEngine::new());
    let host = Arc::new(host);
    let handles = (0..8)
        .map(|_| {
            let host = Arc::clone(&host);
            thread::spawn(move || host.ensure_ready())
        })
        .collect::<Vec<_>>();
    for h in handles {
        h.join().unwrap().unwrap();
    }
    assert_eq!(engine.starts(), 1);
}

#[test]
fn failed_start_stays_unavailable_and_allows_a_fresh_attempt() {
    let (engine, host) = host_with(RecordingEngine::new().failing_start("jar missing"));
    let err = host.ensure_ready().unwrap_err();
    assert!(matches!(err, BrokerError::EngineUnavailable(ref m) if m == "jar missing"));
    assert_eq!(host.state(), EngineState::NotStarted);
    assert!(host.ensure_ready().is_err());
    assert_eq!(engine.starts(), 2);
}

#[test]
fn invoke_requires_a_running_engine() {
    let (engine, host) = host_with(RecordingEngine::new());
    assert!(matches!(
        host.invoke("@startuml\n@enduml", &raster()),
        Err(BrokerError::EngineUnavailable(_))
    ));
    assert_eq!(engine.invocations(), 0);

    host.ensure_ready().unwrap();
    assert!(!host.invoke("@startuml\n@enduml", &raster()).unwrap().is_empty());
    assert_eq!(engine.attaches(), 1);
}

#[test]
fn attach_failures_are_swallowed() {
    let (engine, host) = host_with(RecordingEngine::new().failing_attach());
    host.ensure_ready().unwrap();
    assert!(host.invoke("@startuml\nA -> B\n@enduml", &raster()).is_ok());
    assert_eq!(engine.attaches(), 1);
}

#[test]
fn shutdown_is_final() {
    let (engine, host) = host_with(RecordingEngine::new());
    host.ensure_ready().unwrap();
    host.shutdown().unwrap();
    host.shutdown().unwrap();
    assert_eq!(engine.shutdowns(), 1);
    assert_eq!(host.state(), EngineState::Stopped);
    assert!(matches!(
        host.ensure_ready(),
        Err(BrokerError::EngineUnavailable(_))
    ));
    assert_eq!(engine.starts(), 1);
}

#[test]
fn shutdown_before_start_never_touches_the_engine() {
    let (engine, host) = host_with(RecordingEngine::new());
    host.shutdown().unwrap();
    assert_eq!(engine.shutdowns(), 0);
    assert!(host.ensure_ready().is_err());
    assert_eq!(engine.starts(), 0);
}

#[test]
fn force_terminate_halts_and_blocks_restart() {
    let (engine, host) = host_with(RecordingEngine::new());
    host.ensure_ready().unwrap();
    host.force_terminate();
    assert_eq!(engine.force_terminations(), 1);
    assert_eq!(host.state(), EngineState::Terminated);
    assert!(host.ensure_ready().is_err());
}

#[test]
fn force_terminate_does_not_wait_for_a_stuck_boot() {
    let (engine, host) = host_with(RecordingEngine::new().blocking_start());
    let host = Arc::new(host);
    let booting = {
        let host = Arc::clone(&host);
        thread::spawn(move || host.start())
    };
    assert!(engine.wait_for_starts(1, std::time::Duration::from_secs(5)));
    assert_eq!(host.state(), EngineState::Starting);

    host.force_terminate();
    assert_eq!(host.state(), EngineState::Terminated);

    // The boot finishes successfully but must not revive the host.
    engine.release();
    assert!(matches!(
        booting.join().unwrap(),
        Err(BrokerError::EngineUnavailable(ref m)) if m.contains("force-terminated")
    ));
    assert_eq!(host.state(), EngineState::Terminated);
    assert!(host.info().is_none());
}

#[test]
fn callers_wait_for_a_boot_in_progress() {
    let (engine, host) = host_with(RecordingEngine::new().blocking_start());
    let host = Arc::new(host);
    let handles = (0..4)
        .map(|_| {
            let host = Arc::clone(&host);
            thread::spawn(move || host.ensure_ready())
        })
        .collect::<Vec<_>>();
    assert!(engine.wait_for_starts(1, std::time::Duration::from_secs(5)));
    engine.release();
    for h in handles {
        h.join().unwrap().unwrap();
    }
    assert_eq!(engine.starts(), 1);
    assert_eq!(host.state(), EngineState::Running);
}
