use tempfile::TempDir;
use vaultsync_sync::{backup, restore};

#[tokio::test]
async fn backup_then_restore_is_byte_identical() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(".env");
    let original: &[u8] = b"A=1\nCERT=\"x\ny\"\n# comment \xe2\x9c\x93\n";
    std::fs::write(&path, original).unwrap();

    let handle = backup(&path).await.unwrap();
    let copy = handle.backup_path().unwrap().to_path_buf();
    assert!(copy.exists());
    assert_eq!(std::fs::read(&copy).unwrap(), original);

    std::fs::write(&path, b"clobbered").unwrap();
    restore(&handle).await.unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), original);

    // Backups are kept after restoring.
    assert!(copy.exists());
}

#[tokio::test]
async fn backup_name_is_timestamped_sibling() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.env");
    std::fs::write(&path, "A=1\n").unwrap();

    let handle = backup(&path).await.unwrap();
    let copy = handle.backup_path().unwrap();
    assert_eq!(copy.parent(), path.parent());
    let name = copy.file_name().unwrap().to_string_lossy();
    assert!(name.starts_with("app.env.backup."), "{name}");
}

#[tokio::test]
async fn two_backups_in_a_row_do_not_collide() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(".env");
    std::fs::write(&path, "A=1\n").unwrap();

    let first = backup(&path).await.unwrap();
    let second = backup(&path).await.unwrap();
    assert_ne!(first.backup, second.backup);
}

#[tokio::test]
async fn backup_of_missing_file_is_noop() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(".env");

    let handle = backup(&path).await.unwrap();
    assert!(handle.backup.is_none());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn restore_of_missing_original_removes_new_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(".env");

    let handle = backup(&path).await.unwrap();
    std::fs::write(&path, "CREATED=1\n").unwrap();
    restore(&handle).await.unwrap();
    assert!(!path.exists());
}

#[cfg(unix)]
#[tokio::test]
async fn backup_is_private_and_restore_keeps_original_mode() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let path = dir.path().join(".env");
    std::fs::write(&path, "A=1\n").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).unwrap();

    let handle = backup(&path).await.unwrap();
    let backup_mode = std::fs::metadata(handle.backup_path().unwrap())
        .unwrap()
        .permissions()
        .mode()
        & 0o777;
    assert_eq!(backup_mode, 0o600);

    std::fs::write(&path, "B=2\n").unwrap();
    restore(&handle).await.unwrap();
    let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o640);
}
