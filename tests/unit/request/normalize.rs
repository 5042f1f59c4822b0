use super::*;
use crate::foundation::error::BrokerError;

#[test]
fn raster_with_dpi_and_scale_injects_after_marker() {
    let req = RenderRequest::new("@startuml\nAlice -> Bob: Hello\n@enduml", Format::Raster)
        .with_dpi(150)
        .with_scale(1.0);
    let n = normalize(&req);
    assert_eq!(
        n.source,
        "@startuml\nskinparam dpi 150\nscale 1.0\n\nAlice -> Bob: Hello\n@enduml"
    );
    assert_eq!(n.format, Format::Raster);
    assert_eq!(n.dpi, Some(150));
    assert_eq!(n.scale, Some(1.0));
}

#[test]
fn vector_never_gets_a_dpi_directive() {
    let req = RenderRequest::new("@startuml\nA -> B\n@enduml", Format::Vector)
        .with_dpi(300)
        .with_scale(2.5);
    let n = normalize(&req);
    assert!(!n.source.contains("skinparam dpi"));
    assert!(n.source.contains("scale 2.5"));
    assert_eq!(n.dpi_hint(), None);
}

#[test]
fn only_first_marker_receives_directives() {
    let text = "@startuml\nA -> B\n@enduml\n@startuml\nC -> D\n@enduml";
    let n = normalize(&RenderRequest::new(text, Format::Vector).with_scale(2.0));
    assert_eq!(n.source.matches("scale 2.0").count(), 1);
    assert!(n.source.starts_with("@startuml\nscale 2.0\n"));
}

#[test]
fn marker_present_without_options_is_untouched() {
    let text = "  @startuml\nA -> B\n@enduml";
    let n = normalize(&RenderRequest::new(text, Format::Raster));
    assert_eq!(n.source, text);
}

#[test]
fn missing_markers_are_synthesized() {
    let n = normalize(&RenderRequest::new("Alice -> Bob: Hello", Format::Raster));
    assert_eq!(n.source, "@startuml\nAlice -> Bob: Hello\n@enduml");

    let n = normalize(&RenderRequest::new("Alice -> Bob: Hello", Format::Raster).with_dpi(96));
    assert_eq!(
        n.source,
        "@startuml\nskinparam dpi 96\nAlice -> Bob: Hello\n@enduml"
    );
}

#[test]
fn normalization_is_deterministic() {
    let a = RenderRequest::new("A -> B", Format::Raster).with_dpi(150).with_scale(1.5);
    let b = a.clone();
    assert_eq!(normalize(&a), normalize(&b));
    assert_eq!(normalize(&a).fingerprint(), normalize(&b).fingerprint());
}

#[test]
fn unusable_scales_are_dropped() {
    for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, 0.0, -1.5] {
        let req = RenderRequest::new("A -> B", Format::Vector).with_scale(bad);
        let n = normalize(&req);
        assert_eq!(n.source, "@startuml\nA -> B\n@enduml", "scale {bad}");
        assert_eq!(n.scale, None);
        assert_eq!(
            n.fingerprint(),
            normalize(&RenderRequest::new("A -> B", Format::Vector)).fingerprint()
        );
    }
}

#[test]
fn large_and_tiny_scales_avoid_exponent_notation() {
    let big = normalize(&RenderRequest::new("A -> B", Format::Vector).with_scale(1e20));
    assert!(big.source.contains("scale 100000000000000000000.0\n"));
    let tiny = normalize(&RenderRequest::new("A -> B", Format::Vector).with_scale(1e-7));
    assert!(tiny.source.contains("scale 0.0000001\n"));
    let half = normalize(&RenderRequest::new("A -> B", Format::Vector).with_scale(0.5));
    assert!(half.source.contains("scale 0.5\n"));
}

#[test]
fn parse_rejects_unusable_scale() {
    let err = RenderRequest::parse("A -> B", "png", None, Some(f64::NAN)).unwrap_err();
    assert!(matches!(err, BrokerError::InvalidRequest(_)));
    assert!(RenderRequest::parse("A -> B", "png", None, Some(-2.0)).is_err());
    assert!(RenderRequest::parse("A -> B", "png", None, Some(2.0)).is_ok());
}
