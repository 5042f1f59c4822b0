use super::*;
use crate::engine::{EngineHost, RecordingEngine};
use crate::render::broker::RenderBrokerOpts;

const WAIT: Duration = Duration::from_secs(5);

struct Fixture {
    engine: Arc<RecordingEngine>,
    broker: Arc<RenderBroker>,
    _dir: tempfile::TempDir,
}

fn fixture(engine: RecordingEngine) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(engine);
    let host = Arc::new(EngineHost::new(engine.clone()));
    let broker = RenderBroker::new(
        host,
        RenderBrokerOpts {
            cache_capacity: 8,
            scratch_dir: dir.path().to_path_buf(),
        },
    )
    .unwrap();
    Fixture {
        engine,
        broker: Arc::new(broker),
        _dir: dir,
    }
}

fn opts(debounce_ms: u64) -> PreviewOpts {
    PreviewOpts {
        debounce: Duration::from_millis(debounce_ms),
        ..PreviewOpts::new(Format::Raster)
    }
}

fn expect_rendered(rx: &Receiver<PreviewEvent>) -> RenderResult {
    match rx.recv_timeout(WAIT).unwrap() {
        PreviewEvent::Rendered(res) => res,
        other => panic!("expected a render, got {other:?}"),
    }
}

#[test]
fn rapid_edits_coalesce_into_one_render() {
    let fx = fixture(RecordingEngine::new());
    let (preview, rx) = LivePreview::spawn(fx.broker.clone(), opts(80)).unwrap();
    preview.submit("A -> B");
    preview.submit("A -> C");
    preview.submit("A -> D");

    let res = expect_rendered(&rx);
    assert!(!res.bytes.is_empty());
    assert_eq!(fx.engine.invocations(), 1);
    assert!(fx.engine.sources()[0].contains("A -> D"));
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    preview.close();
}

#[test]
fn blank_and_prose_are_skipped_without_engine_calls() {
    let fx = fixture(RecordingEngine::new());
    let (preview, rx) = LivePreview::spawn(fx.broker.clone(), opts(10)).unwrap();

    preview.submit("   \n");
    assert!(matches!(
        rx.recv_timeout(WAIT).unwrap(),
        PreviewEvent::Skipped(SkipReason::Empty)
    ));
    preview.submit("meeting notes for tuesday");
    assert!(matches!(
        rx.recv_timeout(WAIT).unwrap(),
        PreviewEvent::Skipped(SkipReason::NotDiagram)
    ));
    assert_eq!(fx.engine.invocations(), 0);
}

#[test]
fn trigger_during_render_is_dropped_then_replayed_once() {
    let fx = fixture(RecordingEngine::new().blocking());
    let (preview, rx) = LivePreview::spawn(fx.broker.clone(), opts(10)).unwrap();

    preview.submit("A -> B");
    assert!(fx.engine.wait_for_invocations(1, WAIT));

    preview.submit("A -> C");
    preview.render_now();
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(fx.engine.invocations(), 1, "no second job while one is in flight");

    fx.engine.release();
    expect_rendered(&rx);
    expect_rendered(&rx);

    let sources = fx.engine.sources();
    assert_eq!(sources.len(), 2);
    assert!(sources[0].contains("A -> B"));
    assert!(sources[1].contains("A -> C"));
}

#[test]
fn render_failures_are_reported_verbatim() {
    let fx = fixture(RecordingEngine::new().failing_invoke("Syntax Error? (line 2)"));
    let (preview, rx) = LivePreview::spawn(fx.broker.clone(), opts(10)).unwrap();
    preview.submit("A -> ");
    match rx.recv_timeout(WAIT).unwrap() {
        PreviewEvent::Failed(e) => assert_eq!(e.to_string(), "render error: Syntax Error? (line 2)"),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[test]
fn reconfigure_rerenders_latest_text() {
    let fx = fixture(RecordingEngine::new());
    let (preview, rx) = LivePreview::spawn(fx.broker.clone(), opts(10)).unwrap();
    preview.submit("A -> B");
    let first = expect_rendered(&rx);
    assert_eq!(first.format, Format::Raster);

    preview.reconfigure(Format::Vector, None, Some(2.0));
    let second = expect_rendered(&rx);
    assert_eq!(second.format, Format::Vector);
    assert!(second.vector_text.is_some());
    assert!(fx.engine.sources()[1].contains("scale 2.0"));
}

#[test]
fn close_withdraws_interest_in_running_render() {
    let fx = fixture(RecordingEngine::new().blocking());
    let (preview, rx) = LivePreview::spawn(fx.broker.clone(), opts(10)).unwrap();
    preview.submit("A -> B");
    assert!(fx.engine.wait_for_invocations(1, WAIT));

    preview.close();
    fx.engine.release();
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
}
