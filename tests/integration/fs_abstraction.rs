use std::path::{Path, PathBuf};

use bookflow::fs::mock::MockFileSystem;
use bookflow::fs::{FileSystem, RealFileSystem};

#[test]
fn test_mock_fs_tracks_directories() {
    let fs = MockFileSystem::new();
    fs.add_file("/books/a/scandata.json", b"{}".to_vec());
    fs.add_file("/books/a/history.log", b"".to_vec());
    fs.add_file("/books/b/metadata.json", b"{}".to_vec());

    assert!(fs.is_dir(Path::new("/books")));
    assert_eq!(
        fs.read_dir(Path::new("/books")).unwrap(),
        vec![PathBuf::from("/books/a"), PathBuf::from("/books/b")]
    );
    assert_eq!(
        fs.read_dir(Path::new("/books/a")).unwrap(),
        vec![
            PathBuf::from("/books/a/history.log"),
            PathBuf::from("/books/a/scandata.json"),
        ]
    );
}

#[test]
fn test_mock_fs_append_and_remove() {
    let fs = MockFileSystem::new();
    let log = Path::new("/books/a/history.log");

    fs.append(log, b"one\n").unwrap();
    fs.append(log, b"two\n").unwrap();
    assert_eq!(fs.read_to_string(log).unwrap(), "one\ntwo\n");

    fs.remove_file(log).unwrap();
    assert!(!fs.exists(log));
    assert!(fs.read_dir(Path::new("/books/a")).unwrap().is_empty());

    fs.add_file("/books/a/nested/0001.jpg", b"jpg".to_vec());
    fs.remove_dir_all(Path::new("/books/a")).unwrap();
    assert!(!fs.exists(Path::new("/books/a/nested/0001.jpg")));
    assert!(fs.read_dir(Path::new("/books")).unwrap().is_empty());
}

#[test]
fn test_mock_fs_rejects_wrong_entry_kinds() {
    let fs = MockFileSystem::new();
    fs.add_file("/books/a/upload_lock", b"42".to_vec());

    assert!(fs.read(Path::new("/books/a")).is_err());
    assert!(fs.remove_file(Path::new("/books/a")).is_err());
    assert!(fs.create_dir_all(Path::new("/books/a/upload_lock")).is_err());
    assert!(fs.read_dir(Path::new("/books/missing")).is_err());
}

#[test]
fn test_real_fs_write_exclusive_replaces_contents() {
    let dir = tempfile::tempdir().unwrap();
    let fs = RealFileSystem;
    let path = dir.path().join("book").join("scandata.json");

    fs.write_exclusive(&path, b"{\"pageData\":{}}").unwrap();
    fs.write_exclusive(&path, b"{}").unwrap();

    assert_eq!(fs.read_to_string(&path).unwrap(), "{}");
    assert!(!dir.path().join("book").join("scandata.json.tmp").exists());
    assert!(dir.path().join("book").join("scandata.json.lock").exists());
}

#[test]
fn test_real_fs_listing_is_sorted() {
    let dir = tempfile::tempdir().unwrap();
    let fs = RealFileSystem;
    for name in ["0003.jpg", "0001.jpg", "0002.jpg"] {
        fs.write(&dir.path().join(name), b"jpg").unwrap();
    }

    let names: Vec<String> = fs
        .read_dir(dir.path())
        .unwrap()
        .iter()
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect();
    assert_eq!(names, vec!["0001.jpg", "0002.jpg", "0003.jpg"]);

    fs.remove_dir_all(dir.path()).unwrap();
    assert!(!fs.exists(dir.path()));
}
