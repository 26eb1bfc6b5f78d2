//! End-to-end tests against the native watcher on a real temp directory.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, unbounded};
use dropwatch::watcher::{AlwaysComplete, CompletionStrategy};
use dropwatch::{ChangedEvent, DirectoryWatcher, NotifierError, SubscriberHandle, WatchConfig};
use tempfile::TempDir;

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);
const QUIET_PERIOD: Duration = Duration::from_millis(500);

type WatchThread = JoinHandle<Result<(), NotifierError>>;

/// Subscriber forwarding every payload into a channel.
fn channel_subscriber<T: Clone + Send + Sync + 'static>() -> (SubscriberHandle<T>, Receiver<T>) {
    let (tx, rx) = unbounded();
    let handle: SubscriberHandle<T> =
        Arc::new(move |event: &ChangedEvent<T>| -> anyhow::Result<()> {
            tx.send(event.payload().clone())?;
            Ok(())
        });
    (handle, rx)
}

/// Spawn the loop and wait until the native subscription is registered.
fn start<T, F>(watcher: &Arc<DirectoryWatcher<T>>, dir: &Path, transform: F) -> WatchThread
where
    T: Send + Sync + 'static,
    F: Fn(&Path) -> Option<T> + Send + 'static,
{
    let handle = watcher.spawn(dir.to_path_buf(), transform).unwrap();
    let deadline = Instant::now() + EVENT_TIMEOUT;
    while watcher.source().directory().is_none() {
        assert!(Instant::now() < deadline, "watcher did not start");
        thread::sleep(Duration::from_millis(10));
    }
    handle
}

/// Join the loop thread, failing instead of hanging if it does not stop.
fn join_within(handle: WatchThread, timeout: Duration) -> Result<(), NotifierError> {
    let (tx, rx) = unbounded();
    thread::spawn(move || {
        let _ = tx.send(handle.join().expect("watch thread panicked"));
    });
    rx.recv_timeout(timeout).expect("observe did not return in time")
}

fn canonical(dir: &TempDir) -> PathBuf {
    dir.path().canonicalize().unwrap()
}

#[test]
fn test_written_file_notifies_exactly_once() {
    let dir = TempDir::new().unwrap();
    let watcher: Arc<DirectoryWatcher<PathBuf>> = Arc::new(DirectoryWatcher::new());
    let (subscriber, rx) = channel_subscriber();
    watcher.add_subscriber(subscriber);
    let handle = start(&watcher, dir.path(), dropwatch::watcher::identity);

    let mut file = File::create(dir.path().join("a.txt")).unwrap();
    file.write_all(b"0123456789").unwrap();
    drop(file);

    let path = rx.recv_timeout(EVENT_TIMEOUT).expect("no notification");
    assert_eq!(path, canonical(&dir).join("a.txt"));
    assert!(rx.recv_timeout(QUIET_PERIOD).is_err(), "duplicate notification");

    watcher.close();
    assert!(join_within(handle, EVENT_TIMEOUT).is_ok());
}

#[test]
fn test_locked_file_waits_for_writer() {
    let staging = TempDir::new().unwrap();
    let dir = TempDir::new_in(staging.path()).unwrap();
    let watcher: Arc<DirectoryWatcher<PathBuf>> = Arc::new(DirectoryWatcher::new());
    let (subscriber, rx) = channel_subscriber();
    watcher.add_subscriber(subscriber);
    let handle = start(&watcher, dir.path(), dropwatch::watcher::identity);

    // Lock before the file shows up in the watched directory, as a slow
    // copier would.
    let staged = staging.path().join("b.txt");
    let mut writer = File::create(&staged).unwrap();
    writer.lock().unwrap();
    writer.write_all(b"first half").unwrap();
    fs::rename(&staged, dir.path().join("b.txt")).unwrap();

    let copy_until = Instant::now() + Duration::from_secs(2);
    while Instant::now() < copy_until {
        writer.write_all(b".").unwrap();
        assert!(
            rx.recv_timeout(Duration::from_millis(200)).is_err(),
            "notified while the writer still holds the lock"
        );
    }

    writer.unlock().unwrap();
    drop(writer);

    let path = rx.recv_timeout(EVENT_TIMEOUT).expect("no notification after close");
    assert_eq!(path, canonical(&dir).join("b.txt"));
    assert!(rx.recv_timeout(QUIET_PERIOD).is_err(), "duplicate notification");

    watcher.close();
    assert!(join_within(handle, EVENT_TIMEOUT).is_ok());
}

#[test]
fn test_transform_returning_none_never_notifies() {
    let dir = TempDir::new().unwrap();
    let watcher: Arc<DirectoryWatcher<String>> = Arc::new(DirectoryWatcher::new());
    let (subscriber, rx) = channel_subscriber::<String>();
    watcher.add_subscriber(subscriber);
    let handle = start(&watcher, dir.path(), |_: &Path| -> Option<String> { None });

    for name in ["one.csv", "two.csv", "three.csv"] {
        fs::write(dir.path().join(name), b"data").unwrap();
    }

    assert!(rx.recv_timeout(QUIET_PERIOD * 2).is_err());

    watcher.close();
    assert!(join_within(handle, EVENT_TIMEOUT).is_ok());
}

#[test]
fn test_transform_selects_and_shapes_payload() {
    let dir = TempDir::new().unwrap();
    let watcher: Arc<DirectoryWatcher<String>> = Arc::new(DirectoryWatcher::new());
    let (subscriber, rx) = channel_subscriber::<String>();
    watcher.add_subscriber(subscriber);

    let only_csv = |path: &Path| -> Option<String> {
        match path.extension() {
            Some(ext) if ext == "csv" => {
                path.file_stem().map(|s| s.to_string_lossy().into_owned())
            }
            _ => None,
        }
    };
    let handle = start(&watcher, dir.path(), only_csv);

    fs::write(dir.path().join("ignored.tmp"), b"x").unwrap();
    fs::write(dir.path().join("report.csv"), b"a,b\n").unwrap();

    assert_eq!(rx.recv_timeout(EVENT_TIMEOUT).unwrap(), "report");
    assert!(rx.recv_timeout(QUIET_PERIOD).is_err());

    watcher.close();
    assert!(join_within(handle, EVENT_TIMEOUT).is_ok());
}

#[test]
fn test_subscribers_added_and_removed_mid_loop() {
    let dir = TempDir::new().unwrap();
    let watcher: Arc<DirectoryWatcher<PathBuf>> = Arc::new(DirectoryWatcher::new());
    let (early, early_rx) = channel_subscriber();
    watcher.add_subscriber(early.clone());
    let handle = start(&watcher, dir.path(), dropwatch::watcher::identity);

    fs::write(dir.path().join("first.txt"), b"1").unwrap();
    assert!(early_rx.recv_timeout(EVENT_TIMEOUT).is_ok());

    assert!(watcher.remove_subscriber(&early));
    let (late, late_rx) = channel_subscriber();
    watcher.add_subscriber(late);
    assert_eq!(watcher.subscriber_count(), 1);

    fs::write(dir.path().join("second.txt"), b"2").unwrap();
    let path = late_rx.recv_timeout(EVENT_TIMEOUT).expect("late subscriber missed event");
    assert_eq!(path, canonical(&dir).join("second.txt"));
    assert!(early_rx.recv_timeout(QUIET_PERIOD).is_err(), "removed subscriber notified");

    watcher.close();
    assert!(join_within(handle, EVENT_TIMEOUT).is_ok());
}

#[test]
fn test_failing_subscriber_does_not_stop_loop() {
    let dir = TempDir::new().unwrap();
    let watcher: Arc<DirectoryWatcher<PathBuf>> = Arc::new(DirectoryWatcher::new());
    watcher.add_subscriber(Arc::new(
        |_: &ChangedEvent<PathBuf>| -> anyhow::Result<()> {
            anyhow::bail!("downstream offline")
        },
    ));
    let (subscriber, rx) = channel_subscriber();
    watcher.add_subscriber(subscriber);
    let handle = start(&watcher, dir.path(), dropwatch::watcher::identity);

    fs::write(dir.path().join("x.txt"), b"x").unwrap();
    fs::write(dir.path().join("y.txt"), b"y").unwrap();

    let mut seen = vec![
        rx.recv_timeout(EVENT_TIMEOUT).unwrap(),
        rx.recv_timeout(EVENT_TIMEOUT).unwrap(),
    ];
    seen.sort();
    assert_eq!(
        seen,
        vec![canonical(&dir).join("x.txt"), canonical(&dir).join("y.txt")]
    );

    watcher.close();
    assert!(join_within(handle, EVENT_TIMEOUT).is_ok());
}

#[test]
fn test_close_unblocks_idle_observe() {
    let dir = TempDir::new().unwrap();
    let watcher: Arc<DirectoryWatcher<PathBuf>> = Arc::new(DirectoryWatcher::new());
    let handle = start(&watcher, dir.path(), dropwatch::watcher::identity);

    thread::sleep(Duration::from_millis(100));
    watcher.close();
    watcher.close();

    assert!(join_within(handle, EVENT_TIMEOUT).is_ok());
    assert!(watcher.is_closed());
}

#[test]
fn test_second_observe_is_rejected_while_running() {
    let dir = TempDir::new().unwrap();
    let watcher: Arc<DirectoryWatcher<PathBuf>> = Arc::new(DirectoryWatcher::new());
    let handle = start(&watcher, dir.path(), dropwatch::watcher::identity);

    assert!(matches!(
        watcher.observe(dir.path()),
        Err(NotifierError::AlreadyObserving)
    ));

    watcher.close();
    assert!(join_within(handle, EVENT_TIMEOUT).is_ok());
}

#[test]
fn test_deleting_directory_ends_loop() {
    let root = TempDir::new().unwrap();
    let inbox = root.path().join("inbox");
    fs::create_dir(&inbox).unwrap();

    let watcher: Arc<DirectoryWatcher<PathBuf>> = Arc::new(DirectoryWatcher::new());
    let handle = start(&watcher, &inbox, dropwatch::watcher::identity);

    fs::remove_dir(&inbox).unwrap();

    assert!(join_within(handle, EVENT_TIMEOUT).is_ok());
    assert!(!watcher.is_closed());
}

#[test]
fn test_invalid_directory_fails_before_loop() {
    let root = TempDir::new().unwrap();
    let file = root.path().join("not-a-dir.txt");
    fs::write(&file, b"x").unwrap();

    let watcher: DirectoryWatcher<PathBuf> = DirectoryWatcher::new();
    assert!(matches!(
        watcher.observe(&file),
        Err(NotifierError::NotADirectory { .. })
    ));
    assert!(matches!(
        watcher.observe(root.path().join("missing")),
        Err(NotifierError::InvalidDirectory { .. })
    ));
    assert!(watcher.source().directory().is_none());
}

#[test]
fn test_recheck_catches_file_without_followup_event() {
    let staging = TempDir::new().unwrap();
    let dir = TempDir::new_in(staging.path()).unwrap();
    let config = WatchConfig {
        triggers: vec![dropwatch::ChangeKind::Created],
        recheck_interval_ms: Some(100),
        ..WatchConfig::default()
    };
    let watcher: Arc<DirectoryWatcher<PathBuf>> =
        Arc::new(DirectoryWatcher::builder().config(config).build());
    let (subscriber, rx) = channel_subscriber();
    watcher.add_subscriber(subscriber);
    let handle = start(&watcher, dir.path(), dropwatch::watcher::identity);

    let staged = staging.path().join("slow.bin");
    let mut writer = File::create(&staged).unwrap();
    writer.lock().unwrap();
    writer.write_all(b"chunk").unwrap();
    fs::rename(&staged, dir.path().join("slow.bin")).unwrap();

    thread::sleep(Duration::from_millis(300));
    assert!(rx.try_recv().is_err(), "notified while locked");
    writer.unlock().unwrap();
    // Keep the handle open: only the timed re-check can see completion.

    let path = rx.recv_timeout(EVENT_TIMEOUT).expect("recheck never fired");
    assert_eq!(path, canonical(&dir).join("slow.bin"));
    drop(writer);

    watcher.close();
    assert!(join_within(handle, EVENT_TIMEOUT).is_ok());
}

#[test]
fn test_recheck_fires_under_steady_traffic() {
    let staging = TempDir::new().unwrap();
    let dir = TempDir::new_in(staging.path()).unwrap();
    let config = WatchConfig {
        triggers: vec![dropwatch::ChangeKind::Created],
        recheck_interval_ms: Some(200),
        ..WatchConfig::default()
    };
    let watcher: Arc<DirectoryWatcher<PathBuf>> =
        Arc::new(DirectoryWatcher::builder().config(config).build());
    let (subscriber, rx) = channel_subscriber();
    watcher.add_subscriber(subscriber);
    let handle = start(&watcher, dir.path(), dropwatch::watcher::identity);

    let staged = staging.path().join("slow.bin");
    let mut writer = File::create(&staged).unwrap();
    writer.lock().unwrap();
    writer.write_all(b"chunk").unwrap();
    fs::rename(&staged, dir.path().join("slow.bin")).unwrap();
    thread::sleep(Duration::from_millis(100));
    writer.unlock().unwrap();

    // Unrelated files keep arriving faster than the recheck interval.
    let (stop_tx, stop_rx) = unbounded::<()>();
    let noise_dir = dir.path().to_path_buf();
    let noise = thread::spawn(move || {
        let mut n = 0;
        while let Err(RecvTimeoutError::Timeout) =
            stop_rx.recv_timeout(Duration::from_millis(50))
        {
            fs::write(noise_dir.join(format!("noise{n}")), b"x").unwrap();
            n += 1;
        }
    });

    let slow = canonical(&dir).join("slow.bin");
    let deadline = Instant::now() + Duration::from_secs(3);
    let mut found = false;
    while let Some(left) = deadline.checked_duration_since(Instant::now()) {
        match rx.recv_timeout(left) {
            Ok(path) if path == slow => {
                found = true;
                break;
            }
            Ok(_) => continue,
            Err(_) => break,
        }
    }

    drop(stop_tx);
    noise.join().unwrap();
    drop(writer);
    assert!(found, "recheck starved by steady traffic");

    watcher.close();
    assert!(join_within(handle, EVENT_TIMEOUT).is_ok());
}

#[test]
fn test_always_complete_strategy_and_custom_check() {
    let dir = TempDir::new().unwrap();
    let config = WatchConfig {
        completion: CompletionStrategy::Always,
        ..WatchConfig::default()
    };
    let watcher: Arc<DirectoryWatcher<PathBuf>> = Arc::new(
        DirectoryWatcher::builder()
            .config(config)
            .completion_check(AlwaysComplete)
            .build(),
    );
    let (subscriber, rx) = channel_subscriber();
    watcher.add_subscriber(subscriber);
    let handle = start(&watcher, dir.path(), dropwatch::watcher::identity);

    let mut writer = File::create(dir.path().join("locked.bin")).unwrap();
    writer.lock().unwrap();
    writer.write_all(b"x").unwrap();

    // Lock is ignored entirely.
    assert!(rx.recv_timeout(EVENT_TIMEOUT).is_ok());
    drop(writer);

    watcher.close();
    assert!(join_within(handle, EVENT_TIMEOUT).is_ok());
}
