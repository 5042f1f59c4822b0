use super::*;
use crate::request::model::RenderRequest;
use crate::request::normalize::normalize;

fn fp(req: &RenderRequest) -> Fingerprint {
    normalize(req).fingerprint()
}

#[test]
fn identical_requests_share_a_fingerprint() {
    let a = RenderRequest::new("Alice -> Bob", Format::Raster).with_dpi(150);
    assert_eq!(fp(&a), fp(&a.clone()));
}

#[test]
fn any_single_field_change_changes_the_fingerprint() {
    let base = RenderRequest::new("@startuml\nA -> B\n@enduml", Format::Raster)
        .with_dpi(150)
        .with_scale(1.0);
    let variants = [
        RenderRequest {
            format: Format::Vector,
            ..base.clone()
        },
        RenderRequest {
            dpi: Some(300),
            ..base.clone()
        },
        RenderRequest {
            dpi: None,
            ..base.clone()
        },
        RenderRequest {
            scale: Some(2.0),
            ..base.clone()
        },
        RenderRequest {
            scale: None,
            ..base.clone()
        },
        RenderRequest {
            source_text: "@startuml\nA -> C\n@enduml".to_string(),
            ..base.clone()
        },
    ];

    let base_fp = fp(&base);
    let mut seen = vec![base_fp];
    for v in &variants {
        let f = fp(v);
        assert!(!seen.contains(&f), "duplicate fingerprint for {v:?}");
        seen.push(f);
    }
}

#[test]
fn vector_dpi_still_participates_in_the_key() {
    // dpi is not injected for vector output but stays part of the address.
    let a = RenderRequest::new("A -> B", Format::Vector);
    let b = a.clone().with_dpi(150);
    assert_eq!(normalize(&a).source, normalize(&b).source);
    assert_ne!(fp(&a), fp(&b));
}

#[test]
fn hex_and_artifact_name_are_fixed_length() {
    let f = fp(&RenderRequest::new("A -> B", Format::Raster));
    let hex = f.to_hex();
    assert_eq!(hex.len(), FINGERPRINT_LEN * 2);
    assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(f.artifact_name(Format::Raster), format!("diagram_{hex}.png"));
    assert_eq!(f.artifact_name(Format::Vector), format!("diagram_{hex}.svg"));
    assert_eq!(f.to_string(), hex);
}

#[test]
fn format_names_parse_case_insensitively() {
    assert_eq!("PNG".parse::<Format>().unwrap(), Format::Raster);
    assert_eq!(" svg ".parse::<Format>().unwrap(), Format::Vector);
    assert!(matches!(
        "gif".parse::<Format>(),
        Err(crate::BrokerError::UnsupportedFormat(f)) if f == "gif"
    ));
}
