use super::*;

fn fp(n: u8) -> Fingerprint {
    Fingerprint::from_bytes([n; 8])
}

#[test]
fn writes_are_named_by_fingerprint_and_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let scratch = ScratchDir::new(dir.path().join("nested"));

    let p1 = scratch.write(&fp(1), Format::Raster, b"first").unwrap();
    let p2 = scratch.write(&fp(1), Format::Raster, b"second").unwrap();
    assert_eq!(p1, p2);
    assert_eq!(p1.file_name().unwrap(), "diagram_0101010101010101.png");
    assert_eq!(std::fs::read(&p1).unwrap(), b"second");

    let files = std::fs::read_dir(scratch.root()).unwrap().count();
    assert_eq!(files, 1, "temp files must not accumulate");
}

#[test]
fn formats_get_their_own_extension() {
    let dir = tempfile::tempdir().unwrap();
    let scratch = ScratchDir::new(dir.path());
    assert_eq!(
        scratch.path_for(&fp(2), Format::Vector),
        dir.path().join("diagram_0202020202020202.svg")
    );
}

#[test]
fn unwritable_root_is_a_cache_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("file");
    std::fs::write(&blocker, b"x").unwrap();
    let scratch = ScratchDir::new(blocker.join("sub"));
    assert!(matches!(
        scratch.write(&fp(3), Format::Raster, b"data"),
        Err(BrokerError::CacheIo(_))
    ));
}
