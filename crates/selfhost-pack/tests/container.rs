use std::fs;
use std::path::{Path, PathBuf};

use selfhost_pack::{
    check_platform, detect, extract, host_platform, read_header, verify, Assembler, Compression,
    PackError,
};

struct Fixture {
    _temp: tempfile::TempDir,
    root: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().to_path_buf();
        Self { _temp: temp, root }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Host of 1024 zero bytes and a tree with `a.txt` and an empty `storage/`.
    fn scenario(&self) -> (PathBuf, PathBuf) {
        let host = self.path("host");
        fs::write(&host, vec![0u8; 1024]).unwrap();

        let src = self.path("src");
        fs::create_dir_all(src.join("storage")).unwrap();
        fs::write(src.join("a.txt"), b"hello").unwrap();
        (host, src)
    }

    fn assemble(&self, host: &Path, src: &Path, output: &str) -> PathBuf {
        let output = self.path(output);
        Assembler::new(host, src)
            .with_metadata(serde_json::json!({
                "name": "Convex Backend",
                "version": "1.0.0",
                "apps": ["app"],
                "platform": "linux-x64",
                "createdAt": "2024-01-01T00:00:00Z",
            }))
            .with_companion_version("0.1.0")
            .assemble(&output)
            .unwrap();
        output
    }
}

#[test]
fn scenario_assemble_detect_verify_extract() {
    let fx = Fixture::new();
    let (host, src) = fx.scenario();
    let container = fx.assemble(&host, &src, "bundle");

    let detection = detect(&container).unwrap();
    assert!(detection.is_container);
    assert_eq!(detection.offset, 1024);

    let header = read_header(&container).unwrap();
    header.validate().unwrap();
    assert_eq!(header.bundle_size, 5);
    assert_eq!(header.compression, "gzip");
    assert_eq!(header.ops_version, "0.1.0");
    assert_eq!(header.manifest.as_ref().unwrap()["platform"], "linux-x64");

    let result = verify(&container).unwrap();
    assert!(result.valid);
    assert_eq!(result.expected_checksum, header.bundle_checksum);

    let dest = fx.path("extracted");
    let extracted = extract(&container, &dest, false).unwrap();
    assert_eq!(extracted, header);
    assert_eq!(fs::read_to_string(dest.join("a.txt")).unwrap(), "hello");
    assert!(dest.join("storage").is_dir());
}

#[test]
fn scenario_corrupted_midpoint() {
    let fx = Fixture::new();
    let (host, src) = fx.scenario();
    let container = fx.assemble(&host, &src, "bundle");
    let before = verify(&container).unwrap();

    // The JSON header is larger than the gzip payload, so locate the payload
    // explicitly and flip its middle bytes.
    let mut data = fs::read(&container).unwrap();
    let header_len = u32::from_be_bytes(data[1044..1048].try_into().unwrap()) as usize;
    let payload_start = 1048 + header_len;
    let payload_end = data.len() - 18 - 8;
    let mid = payload_start + (payload_end - payload_start) / 2;
    for byte in &mut data[mid - 1..mid + 2] {
        *byte = !*byte;
    }
    fs::write(&container, data).unwrap();

    assert!(detect(&container).unwrap().is_container);
    let after = verify(&container).unwrap();
    assert!(!after.valid);
    assert_ne!(after.actual_checksum, after.expected_checksum);
    assert_eq!(after.expected_checksum, before.expected_checksum);

    let result = extract(&container, fx.path("out"), false);
    assert!(matches!(result, Err(PackError::ChecksumMismatch { .. })));
    assert!(!fx.path("out").exists());
}

#[test]
fn every_payload_bit_flip_is_detected() {
    let fx = Fixture::new();
    let (host, src) = fx.scenario();
    let container = fx.assemble(&host, &src, "bundle");
    let original = fs::read(&container).unwrap();

    let header_len = u32::from_be_bytes(original[1044..1048].try_into().unwrap()) as usize;
    let payload_start = 1048 + header_len;
    let payload_end = original.len() - 18 - 8;

    for (i, pos) in (payload_start..payload_end).step_by(7).enumerate() {
        let mut data = original.clone();
        data[pos] ^= 1 << (i % 8);
        fs::write(&container, &data).unwrap();

        let result = verify(&container).unwrap();
        assert!(!result.valid, "flip at {pos} went unnoticed");
    }
}

#[test]
fn host_region_changes_do_not_affect_detection() {
    let fx = Fixture::new();
    let (host, src) = fx.scenario();
    let container = fx.assemble(&host, &src, "bundle");

    let mut data = fs::read(&container).unwrap();
    data[0..16].copy_from_slice(b"\x7fELF-not-really");
    fs::write(&container, data).unwrap();

    let detection = detect(&container).unwrap();
    assert!(detection.is_container);
    assert_eq!(detection.offset, 1024);
    assert!(verify(&container).unwrap().valid);
}

#[test]
fn assembling_twice_differs_only_in_timestamp() {
    let fx = Fixture::new();
    let (host, src) = fx.scenario();
    let first = fx.assemble(&host, &src, "one");
    let second = fx.assemble(&host, &src, "two");

    let mut a = read_header(&first).unwrap();
    let mut b = read_header(&second).unwrap();
    assert_eq!(a.bundle_checksum, b.bundle_checksum);

    a.created_at.clear();
    b.created_at.clear();
    assert_eq!(a, b);
}

#[cfg(unix)]
#[test]
fn roundtrip_tree_with_modes_and_symlinks() {
    use std::os::unix::fs::PermissionsExt;

    let fx = Fixture::new();
    let host = fx.path("host");
    fs::write(&host, b"host-binary").unwrap();

    let src = fx.path("src");
    fs::create_dir_all(src.join("deep/er/still")).unwrap();
    fs::create_dir_all(src.join("empty")).unwrap();
    fs::write(src.join("deep/er/still/data.bin"), (0..=255u8).collect::<Vec<_>>()).unwrap();
    fs::write(src.join("script.sh"), b"#!/bin/sh\n").unwrap();
    fs::set_permissions(src.join("script.sh"), fs::Permissions::from_mode(0o750)).unwrap();
    fs::write(src.join("secret"), b"s3cret").unwrap();
    fs::set_permissions(src.join("secret"), fs::Permissions::from_mode(0o600)).unwrap();
    std::os::unix::fs::symlink("deep/er", src.join("shortcut")).unwrap();
    std::os::unix::fs::symlink("/nonexistent/target", src.join("dangling")).unwrap();

    let container = fx.assemble(&host, &src, "bundle");
    let dest = fx.path("dest");
    extract(&container, &dest, false).unwrap();

    assert_eq!(
        fs::read(dest.join("deep/er/still/data.bin")).unwrap(),
        (0..=255u8).collect::<Vec<_>>()
    );
    let mode = |p: &str| fs::metadata(dest.join(p)).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode("script.sh"), 0o750);
    assert_eq!(mode("secret"), 0o600);
    assert!(dest.join("empty").is_dir());
    assert_eq!(fs::read_link(dest.join("shortcut")).unwrap(), Path::new("deep/er"));
    assert_eq!(
        fs::read_link(dest.join("dangling")).unwrap(),
        Path::new("/nonexistent/target")
    );
}

#[test]
fn tiny_file_is_not_a_container() {
    let fx = Fixture::new();
    let path = fx.path("tiny");
    fs::write(&path, b"1234").unwrap();

    let detection = detect(&path).unwrap();
    assert!(!detection.is_container);
    assert!(matches!(read_header(&path), Err(PackError::NotAContainer(_))));
}

#[test]
fn zstd_is_accepted_then_rejected() {
    let fx = Fixture::new();
    let (host, src) = fx.scenario();

    let result = Assembler::new(&host, &src)
        .with_metadata(serde_json::json!({}))
        .with_compression("zstd".parse::<Compression>().unwrap())
        .assemble(fx.path("bundle"));
    match result {
        Err(err @ PackError::UnsupportedCompression(_)) => {
            assert_eq!(err.to_string(), "zstd compression is not yet implemented")
        }
        other => panic!("expected unsupported compression, got {other:?}"),
    }
}

#[test]
fn platform_mismatch_reports_both_tokens() {
    match check_platform("nonexistent-platform") {
        Err(PackError::PlatformMismatch { declared, host }) => {
            assert_eq!(declared, "nonexistent-platform");
            assert_eq!(host, host_platform());
        }
        other => panic!("expected platform mismatch, got {other:?}"),
    }
}

fn raw_entry(name: &str, size: u64) -> tar::Header {
    let mut header = tar::Header::new_old();
    header.as_old_mut().name[..name.len()].copy_from_slice(name.as_bytes());
    header.set_entry_type(tar::EntryType::Regular);
    header.set_mode(0o644);
    header.set_size(size);
    header.set_cksum();
    header
}

#[test]
fn extract_rejects_escaping_entries() {
    use selfhost_pack::checksum::checksum;
    use selfhost_pack::format::{self, Header};
    use selfhost_pack::{Footer, MAGIC_END, MAGIC_START};
    use std::io::Write;

    let fx = Fixture::new();

    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    {
        let mut builder = tar::Builder::new(&mut encoder);
        builder.append(&raw_entry("../../outside.txt", 4), &b"evil"[..]).unwrap();
        builder.finish().unwrap();
    }
    let payload = encoder.finish().unwrap();

    let mut header = Header::new(serde_json::json!({"name": "malicious"}));
    header.bundle_size = 4;
    header.bundle_checksum = checksum(&payload);

    let host = b"#!/bin/false\n";
    let mut data = host.to_vec();
    data.extend_from_slice(MAGIC_START);
    format::write_framed(&mut data, &header).unwrap();
    data.write_all(&payload).unwrap();
    data.extend_from_slice(MAGIC_END);
    data.extend_from_slice(&Footer { start_offset: host.len() as u64 }.to_bytes());
    let container = fx.path("evil");
    fs::write(&container, data).unwrap();

    assert!(verify(&container).unwrap().valid);

    let dest = fx.path("a/b");
    let result = extract(&container, &dest, false);
    assert!(matches!(result, Err(PackError::PathTraversal { .. })));
    assert!(!fx.path("outside.txt").exists());
}
