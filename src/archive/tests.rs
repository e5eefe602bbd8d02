use super::*;
use crate::classfile::ClassFile;
use crate::config::{ParseErrorPolicy, StripConfig};
use crate::testutil::{awt_caller, code_of, plain_class, read_jar, string_constants, write_jar};
use std::io::{Cursor, Write};
use tempfile::TempDir;

const MANIFEST: &[u8] = b"Manifest-Version: 1.0\r\nMain-Class: com.example.Main\r\n\r\n";

fn sample_jar(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("in.jar");
    let opener = awt_caller("com/example/Opener");
    let plain = plain_class("com/example/Plain");
    write_jar(
        &path,
        &[
            ("META-INF/", b""),
            ("META-INF/MANIFEST.MF", MANIFEST),
            ("com/example/Opener.class", &opener),
            ("com/example/Plain.class", &plain),
            ("messages.properties", b"greeting=hello\n"),
        ],
    );
    path
}

#[test]
fn test_resources_only_archive_is_copied() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.jar");
    let output = dir.path().join("out.jar");
    let entries: &[(&str, &[u8])] = &[
        ("META-INF/MANIFEST.MF", MANIFEST),
        ("config/", b""),
        ("config/app.yml", b"name: demo\n"),
        ("logo.png", &[0x89, b'P', b'N', b'G', 0, 1, 2, 3]),
    ];
    write_jar(&input, entries);

    let report = ArchiveTransformer::default().transform(&input, &output).unwrap();
    assert_eq!(report.entries, 4);
    assert_eq!(report.classes, 0);
    assert_eq!(read_jar(&output), read_jar(&input));
}

#[test]
fn test_mixed_archive() {
    let dir = TempDir::new().unwrap();
    let input = sample_jar(&dir);
    let output = dir.path().join("out.jar");

    let report = ArchiveTransformer::default().transform(&input, &output).unwrap();
    assert_eq!(report.entries, 5);
    assert_eq!(report.classes, 2);
    assert_eq!(report.rewritten_classes, 1);
    assert_eq!(report.call_sites, 1);
    assert_eq!(report.field_sites, 0);
    assert!(report.passed_through.is_empty());
    assert_eq!(report.sha256.len(), 64);

    let before = read_jar(&input);
    let after = read_jar(&output);
    let names = |entries: &[(String, Vec<u8>)]| entries.iter().map(|(n, _)| n.clone()).collect::<Vec<_>>();
    assert_eq!(names(&after), names(&before));

    for ((name, old), (_, new)) in before.iter().zip(&after) {
        if name == "com/example/Opener.class" {
            assert_ne!(old, new);
            let class = ClassFile::parse(new).unwrap();
            assert!(string_constants(&class)
                .iter()
                .any(|s| s.contains("java.awt.Desktop.getDesktop")));
            assert_eq!(class.methods.len(), 1);
        } else {
            assert_eq!(old, new, "{name} changed");
        }
    }
}

#[test]
fn test_unrelated_class_keeps_instructions() {
    let dir = TempDir::new().unwrap();
    let input = sample_jar(&dir);
    let output = dir.path().join("out.jar");
    ArchiveTransformer::default().transform(&input, &output).unwrap();

    let after = read_jar(&output);
    let (_, plain) = after.iter().find(|(n, _)| n == "com/example/Plain.class").unwrap();
    let class = ClassFile::parse(plain).unwrap();
    let original = ClassFile::parse(&plain_class("com/example/Plain")).unwrap();
    assert_eq!(class.methods.len(), original.methods.len());
    assert_eq!(code_of(&class, "run"), code_of(&original, "run"));
}

#[test]
fn test_malformed_class_aborts_by_default() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.jar");
    let output = dir.path().join("out.jar");
    write_jar(
        &input,
        &[
            ("a.txt", b"first"),
            ("com/example/Broken.class", b"\xCA\xFE\xBA\xBE\x00"),
        ],
    );

    let err = ArchiveTransformer::default().transform(&input, &output).unwrap_err();
    assert!(matches!(err, StripError::Parse { ref entry, .. } if entry == "com/example/Broken.class"));
    assert!(!output.exists());
}

#[test]
fn test_malformed_class_copied_when_configured() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.jar");
    let output = dir.path().join("out.jar");
    let opener = awt_caller("com/example/Opener");
    write_jar(
        &input,
        &[
            ("com/example/Broken.class", b"not a class"),
            ("com/example/Opener.class", &opener),
        ],
    );

    let config = StripConfig::default().on_parse_error(ParseErrorPolicy::Copy);
    let report = ArchiveTransformer::new(config).transform(&input, &output).unwrap();
    assert_eq!(report.classes, 2);
    assert_eq!(report.rewritten_classes, 1);
    assert_eq!(report.passed_through, vec!["com/example/Broken.class".to_string()]);

    let after = read_jar(&output);
    assert_eq!(after[0], ("com/example/Broken.class".to_string(), b"not a class".to_vec()));
}

#[test]
fn test_entry_size_limit() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.jar");
    let output = dir.path().join("out.jar");
    write_jar(&input, &[("small.txt", b"ok"), ("big.bin", &[7u8; 64])]);

    let config = StripConfig::default().max_entry_size(16);
    let err = ArchiveTransformer::new(config).transform(&input, &output).unwrap_err();
    assert!(matches!(
        err,
        StripError::EntryTooLarge { ref entry, size: 64, max: 16 } if entry == "big.bin"
    ));
    assert!(!output.exists());
}

#[test]
fn test_missing_input() {
    let dir = TempDir::new().unwrap();
    let err = ArchiveTransformer::default()
        .transform(&dir.path().join("missing.jar"), &dir.path().join("out.jar"))
        .unwrap_err();
    assert!(matches!(err, StripError::OpenInput { .. }));
    assert!(!dir.path().join("out.jar").exists());
}

#[test]
fn test_not_a_zip() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.jar");
    std::fs::write(&input, b"plain text").unwrap();
    let err = ArchiveTransformer::default()
        .transform(&input, &dir.path().join("out.jar"))
        .unwrap_err();
    assert!(matches!(err, StripError::Input(_)));
}

#[test]
fn test_same_path_rejected() {
    let dir = TempDir::new().unwrap();
    let input = sample_jar(&dir);
    let before = std::fs::read(&input).unwrap();

    let err = ArchiveTransformer::default().transform(&input, &input).unwrap_err();
    assert!(matches!(err, StripError::SamePath(_)));
    assert_eq!(std::fs::read(&input).unwrap(), before);
}

#[test]
fn test_entry_metadata_preserved() {
    let mut buf = Cursor::new(Vec::new());
    let stamp = zip::DateTime::from_date_and_time(2021, 3, 4, 5, 6, 8).unwrap();
    {
        let mut zip = zip::ZipWriter::new(&mut buf);
        let stored = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored)
            .last_modified_time(stamp)
            .unix_permissions(0o640);
        zip.start_file("stored.txt", stored).unwrap();
        zip.write_all(b"stored payload").unwrap();
        let deflated = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        zip.start_file("deflated.txt", deflated).unwrap();
        zip.write_all(b"deflated payload").unwrap();
        zip.finish().unwrap();
    }

    let (bytes, report) = ArchiveTransformer::default()
        .transform_bytes(buf.get_ref())
        .unwrap();
    assert_eq!(report.entries, 2);

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let stored = archive.by_name("stored.txt").unwrap();
    assert_eq!(stored.compression(), zip::CompressionMethod::Stored);
    assert_eq!(stored.last_modified(), Some(stamp));
    assert_eq!(stored.unix_mode().map(|m| m & 0o777), Some(0o640));
    drop(stored);
    let deflated = archive.by_name("deflated.txt").unwrap();
    assert_eq!(deflated.compression(), zip::CompressionMethod::Deflated);
}

#[test]
fn test_report_hash_matches_output() {
    use sha2::{Digest, Sha256};

    let mut buf = Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut buf);
        zip.start_file("com/example/Opener.class", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(&awt_caller("com/example/Opener")).unwrap();
        zip.finish().unwrap();
    }
    let (bytes, report) = ArchiveTransformer::default()
        .transform_bytes(buf.get_ref())
        .unwrap();
    assert_eq!(report.sha256, hex::encode(Sha256::digest(&bytes)));
    assert_eq!(report.rewritten_classes, 1);
}

#[test]
fn test_class_detection() {
    let entry = ArchiveEntry {
        name: "com/example/Main.class".to_string(),
        data: Vec::new(),
        is_dir: false,
        compression: zip::CompressionMethod::Deflated,
        last_modified: None,
        unix_mode: None,
    };
    assert!(entry.is_class());
    let resource = ArchiveEntry {
        name: "com/example/Main.class.txt".to_string(),
        ..entry.clone()
    };
    assert!(!resource.is_class());
    let dir = ArchiveEntry {
        name: "weird.class/".to_string(),
        is_dir: true,
        ..entry
    };
    assert!(!dir.is_class());
}
