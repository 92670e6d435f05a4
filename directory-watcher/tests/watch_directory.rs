//! End-to-end tests against the platform watcher on real temp directories.

use std::fs::FileTimes;
use std::path::Path;
use std::time::{Duration, SystemTime};

use dirwatch::{
    ChangeFilter, DirectoryWatcher, WatchConfig, WatchSet, WatchSetConfig, WatcherError,
    run_watch_loop,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

/// Upper bound for anything that is expected to happen.
const EVENTUALLY: Duration = Duration::from_secs(5);

/// How long to listen before concluding nothing else will arrive.
const QUIET: Duration = Duration::from_millis(400);

fn write_file(dir: &Path, name: &str, contents: &str) {
    std::fs::write(dir.join(name), contents).unwrap();
}

#[tokio::test]
async fn test_open_then_close_registers_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let mut watcher = DirectoryWatcher::open(temp_dir.path()).unwrap();

    assert!(timeout(QUIET, watcher.wait_for_change()).await.is_err());
    watcher.close().unwrap();

    assert!(watcher.is_closed());
}

#[tokio::test]
async fn test_new_file_wakes_waiter() {
    let temp_dir = TempDir::new().unwrap();
    let mut watcher = DirectoryWatcher::open(temp_dir.path()).unwrap();

    write_file(temp_dir.path(), "new.txt", "hello");

    timeout(EVENTUALLY, watcher.wait_for_change())
        .await
        .expect("no change reported")
        .unwrap();
    watcher.close().unwrap();
}

#[tokio::test]
async fn test_repeated_waits_each_see_their_change() {
    let temp_dir = TempDir::new().unwrap();
    let mut watcher = DirectoryWatcher::open(temp_dir.path()).unwrap();

    for i in 0..3 {
        write_file(temp_dir.path(), &format!("file-{i}.txt"), "x");
        timeout(EVENTUALLY, watcher.wait_for_change())
            .await
            .expect("change missed after re-arm")
            .unwrap();
        // Let the rest of this write's raw events arrive and drain them.
        sleep(Duration::from_millis(100)).await;
        while matches!(
            timeout(Duration::from_millis(50), watcher.wait_for_change()).await,
            Ok(Ok(()))
        ) {}
    }
    watcher.close().unwrap();
}

#[tokio::test]
async fn test_nested_directory_changes_are_seen() {
    let temp_dir = TempDir::new().unwrap();
    let nested = temp_dir.path().join("a/b");
    std::fs::create_dir_all(&nested).unwrap();
    let mut watcher = DirectoryWatcher::open(temp_dir.path()).unwrap();

    write_file(&nested, "deep.txt", "x");

    timeout(EVENTUALLY, watcher.wait_for_change())
        .await
        .expect("nested change not reported")
        .unwrap();
}

#[tokio::test]
async fn test_rapid_writes_arrive_as_one_message() {
    let temp_dir = TempDir::new().unwrap();
    let watcher = DirectoryWatcher::open(temp_dir.path()).unwrap();
    let (tx, mut rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(run_watch_loop(
        watcher,
        Duration::from_millis(50),
        tx,
        "project",
        cancel.clone(),
    ));

    for i in 0..5 {
        write_file(temp_dir.path(), &format!("burst-{i}.txt"), "x");
    }

    let first = timeout(EVENTUALLY, rx.recv()).await.expect("no message");
    assert_eq!(first, Some("project"));
    assert!(timeout(QUIET, rx.recv()).await.is_err());

    cancel.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_separated_writes_arrive_as_two_messages() {
    let temp_dir = TempDir::new().unwrap();
    let watcher = DirectoryWatcher::open(temp_dir.path()).unwrap();
    let (tx, mut rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(run_watch_loop(
        watcher,
        Duration::from_millis(50),
        tx,
        "project",
        cancel.clone(),
    ));

    write_file(temp_dir.path(), "first.txt", "1");
    sleep(Duration::from_millis(200)).await;
    write_file(temp_dir.path(), "second.txt", "2");

    for _ in 0..2 {
        let message = timeout(EVENTUALLY, rx.recv()).await.expect("missing message");
        assert_eq!(message, Some("project"));
    }
    assert!(timeout(QUIET, rx.recv()).await.is_err());

    cancel.cancel();
    task.await.unwrap().unwrap();
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_permission_change_is_filtered_without_last_write() {
    use dirwatch::ChangeCategory;
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("script.sh");
    std::fs::write(&file, "#!/bin/sh\n").unwrap();
    let filter = ChangeFilter::default().without(ChangeCategory::LastWrite);
    let config = WatchConfig::new(temp_dir.path()).with_filter(filter);
    let mut watcher = DirectoryWatcher::open_with(&config).unwrap();

    std::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o755)).unwrap();
    assert!(timeout(QUIET, watcher.wait_for_change()).await.is_err());

    write_file(temp_dir.path(), "other.txt", "x");
    timeout(EVENTUALLY, watcher.wait_for_change())
        .await
        .expect("new file not reported")
        .unwrap();
}

#[tokio::test]
async fn test_touch_wakes_default_watcher() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("main.rs");
    std::fs::write(&file, "fn main() {}").unwrap();
    let mut watcher = DirectoryWatcher::open(temp_dir.path()).unwrap();

    // Same syscall as `touch`: set access and modification times together.
    let later = SystemTime::now() + Duration::from_secs(60);
    std::fs::File::options()
        .write(true)
        .open(&file)
        .unwrap()
        .set_times(FileTimes::new().set_accessed(later).set_modified(later))
        .unwrap();

    timeout(EVENTUALLY, watcher.wait_for_change())
        .await
        .expect("touch not reported")
        .unwrap();
    watcher.close().unwrap();
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_permission_change_with_security_filter() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("script.sh");
    std::fs::write(&file, "#!/bin/sh\n").unwrap();
    let config = WatchConfig::new(temp_dir.path()).with_filter(ChangeFilter::all());
    let mut watcher = DirectoryWatcher::open_with(&config).unwrap();

    std::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o700)).unwrap();

    timeout(EVENTUALLY, watcher.wait_for_change())
        .await
        .expect("attribute change not reported")
        .unwrap();
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_removed_directory_ends_the_watch() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("watched");
    std::fs::create_dir(&root).unwrap();
    write_file(&root, "inside.txt", "x");
    let mut watcher = DirectoryWatcher::open(&root).unwrap();

    std::fs::remove_dir_all(&root).unwrap();

    let failure = timeout(EVENTUALLY, async {
        loop {
            if let Err(e) = watcher.wait_for_change().await {
                break e;
            }
        }
    })
    .await
    .expect("removal of the watched directory went unnoticed");

    assert!(matches!(failure, WatcherError::Wait(_)));
    watcher.close().unwrap();
}

#[tokio::test]
async fn test_wait_after_close_fails() {
    let temp_dir = TempDir::new().unwrap();
    let mut watcher = DirectoryWatcher::open(temp_dir.path()).unwrap();
    watcher.close().unwrap();

    let result = timeout(EVENTUALLY, watcher.wait_for_change())
        .await
        .expect("wait after close hung");

    assert!(matches!(result, Err(WatcherError::UseAfterClose)));
}

#[tokio::test]
async fn test_watch_set_shares_one_channel() {
    let temp_dir = TempDir::new().unwrap();
    let src = temp_dir.path().join("src");
    let assets = temp_dir.path().join("assets");
    std::fs::create_dir(&src).unwrap();
    std::fs::create_dir(&assets).unwrap();
    let config = WatchSetConfig::default()
        .with_watch(WatchConfig::new(&src).with_tag("src"))
        .with_watch(WatchConfig::new(&assets).with_tag("assets"));
    let (tx, mut rx) = mpsc::channel(16);
    let set = WatchSet::from_config(&config, &tx, CancellationToken::new()).unwrap();

    write_file(&assets, "logo.svg", "<svg/>");
    let message = timeout(EVENTUALLY, rx.recv()).await.expect("no message");
    assert_eq!(message.as_deref(), Some("assets"));

    sleep(Duration::from_millis(300)).await;
    write_file(&src, "main.rs", "fn main() {}");
    let message = timeout(EVENTUALLY, rx.recv()).await.expect("no message");
    assert_eq!(message.as_deref(), Some("src"));

    set.shutdown().await.unwrap();
}
