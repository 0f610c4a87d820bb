//! Payload and install-directory fixtures.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::constants::{DEFAULT_DESCRIPTOR_NAME, DEFAULT_HELPER_NAME, DEFAULT_UPDATE_FILE_NAME};

/// Build an in-memory zip archive from `(name, contents)` pairs.
///
/// Names ending in `/` become directory entries.
pub fn zip_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().unix_permissions(0o755);

    for (name, contents) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, options).expect("add zip directory");
        } else {
            writer.start_file(*name, options).expect("start zip entry");
            writer.write_all(contents).expect("write zip entry");
        }
    }

    writer.finish().expect("finish zip archive").into_inner()
}

/// A release payload: the new bundle, the swap helper and one resource file.
pub fn release_archive(bundle: &[u8]) -> Vec<u8> {
    zip_archive(&[
        (DEFAULT_UPDATE_FILE_NAME, bundle),
        (DEFAULT_HELPER_NAME, b"#!/bin/sh\nexit 0\n".as_slice()),
        ("locales/en.json", b"{\"title\": \"App\"}".as_slice()),
    ])
}

/// Write a `package.json` declaring `version` into `dir`.
pub fn write_descriptor(dir: &Path, version: &str) -> PathBuf {
    let path = dir.join(DEFAULT_DESCRIPTOR_NAME);
    let json = serde_json::json!({ "name": "demo-app", "version": version });
    std::fs::write(&path, json.to_string()).expect("write package descriptor");
    path
}
