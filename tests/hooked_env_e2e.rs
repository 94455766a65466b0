//! End-to-end tests for hooked environments.
//!
//! These tests verify that:
//! - Intercepted operations return exactly what the base environment returns
//! - Observers see the expected notification sequence under each policy
//! - Every environment and file handle is released exactly once

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use observed_env::{
    Env, EnvError, EnvEvent, EnvHandle, EnvOptions, EnvResult, HookConfig, HookedWritableFile,
    MemEnv, NotificationSink, NotifyPolicy, ObserverHandle, RecordingObserver, WritableFile,
};
use tempfile::tempdir;

fn opts() -> EnvOptions {
    EnvOptions::default()
}

fn observed_posix(policy: NotifyPolicy) -> (EnvHandle, RecordingObserver) {
    let recorder = RecordingObserver::new();
    let handle = EnvHandle::observed_with_config(
        Arc::new(recorder.clone()),
        HookConfig {
            policy,
            ..HookConfig::default()
        },
    )
    .unwrap();
    (handle, recorder)
}

fn observed_mem(policy: NotifyPolicy) -> (EnvHandle, RecordingObserver) {
    let recorder = RecordingObserver::new();
    let handle = EnvHandle::observed_with_base(
        Arc::new(MemEnv::new()),
        Arc::new(recorder.clone()),
        HookConfig {
            policy,
            ..HookConfig::default()
        },
    )
    .unwrap();
    (handle, recorder)
}

/// Sink that only counts calls.
#[derive(Default)]
struct CountingSink {
    notifications: AtomicUsize,
    env_released: AtomicUsize,
    file_released: AtomicUsize,
    next: AtomicUsize,
}

impl NotificationSink for CountingSink {
    fn env_new_writable_file(&self, _env: ObserverHandle, _path: &Path) -> ObserverHandle {
        self.notifications.fetch_add(1, Ordering::SeqCst);
        ObserverHandle::from_raw(self.next.fetch_add(1, Ordering::SeqCst))
    }
    fn env_delete_file(&self, _env: ObserverHandle, _path: &Path) {
        self.notifications.fetch_add(1, Ordering::SeqCst);
    }
    fn env_delete_dir(&self, _env: ObserverHandle, _path: &Path) {
        self.notifications.fetch_add(1, Ordering::SeqCst);
    }
    fn env_rename_file(&self, _env: ObserverHandle, _src: &Path, _target: &Path) {
        self.notifications.fetch_add(1, Ordering::SeqCst);
    }
    fn env_link_file(&self, _env: ObserverHandle, _src: &Path, _target: &Path) {
        self.notifications.fetch_add(1, Ordering::SeqCst);
    }
    fn env_released(&self, _env: ObserverHandle) {
        self.env_released.fetch_add(1, Ordering::SeqCst);
    }
    fn file_append(&self, _file: ObserverHandle, _data: &[u8]) {
        self.notifications.fetch_add(1, Ordering::SeqCst);
    }
    fn file_close(&self, _file: ObserverHandle) {
        self.notifications.fetch_add(1, Ordering::SeqCst);
    }
    fn file_sync(&self, _file: ObserverHandle) {
        self.notifications.fetch_add(1, Ordering::SeqCst);
    }
    fn file_fsync(&self, _file: ObserverHandle) {
        self.notifications.fetch_add(1, Ordering::SeqCst);
    }
    fn file_range_sync(&self, _file: ObserverHandle, _offset: u64, _nbytes: u64) {
        self.notifications.fetch_add(1, Ordering::SeqCst);
    }
    fn file_released(&self, _file: ObserverHandle) {
        self.file_released.fetch_add(1, Ordering::SeqCst);
    }
}

impl CountingSink {
    fn notifications(&self) -> usize {
        self.notifications.load(Ordering::SeqCst)
    }
}

/// Test that the canonical create/append/fsync/close lifecycle is observed in order.
#[test]
fn test_scenario_append_fsync_close() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("a.log");
    let (handle, recorder) = observed_posix(NotifyPolicy::NotifyAfterSuccess);
    let env = handle.env();

    {
        let mut file = env.new_writable_file(&path, &opts()).unwrap();
        file.append(b"hello").unwrap();
        file.fsync().unwrap();
        file.close().unwrap();
    }

    assert_eq!(
        recorder.events(),
        vec![
            EnvEvent::NewWritableFile { path: path.clone() },
            EnvEvent::Append {
                path: path.clone(),
                len: 5,
                data: None,
            },
            EnvEvent::Fsync { path: path.clone() },
            EnvEvent::Close { path: path.clone() },
            EnvEvent::FileReleased { path: path.clone() },
        ]
    );
    assert_eq!(std::fs::read(&path).unwrap(), b"hello");
}

/// Test that deleting a missing file fails like the base env and is not observed.
#[test]
fn test_scenario_delete_missing_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("missing.log");
    let (handle, recorder) = observed_posix(NotifyPolicy::NotifyAfterSuccess);

    let hooked_err = handle.env().delete_file(&path).unwrap_err();
    let base_err = observed_env::PosixEnv::new().delete_file(&path).unwrap_err();

    assert!(hooked_err.is_not_found());
    assert_eq!(hooked_err.to_string(), base_err.to_string());
    assert!(recorder.is_empty());
}

/// Test that a renamed file is gone under its old name.
#[test]
fn test_scenario_rename_then_delete_source() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a.log");
    let b = dir.path().join("b.log");
    let (handle, recorder) = observed_posix(NotifyPolicy::NotifyAfterSuccess);
    let env = handle.env();

    env.new_writable_file(&a, &opts()).unwrap().close().unwrap();
    env.rename_file(&a, &b).unwrap();

    let err = env.delete_file(&a).unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.to_string(), EnvError::NotFound { path: a.clone() }.to_string());
    assert!(env.file_exists(&b));

    let events = recorder.events();
    assert_eq!(events.last(), Some(&EnvEvent::RenameFile { src: a, target: b }));
}

fn run_env_ops(env: &dyn Env) -> Vec<String> {
    let outcome = |r: EnvResult<()>| match r {
        Ok(()) => "ok".to_string(),
        Err(e) => e.to_string(),
    };

    vec![
        outcome(env.create_dir(Path::new("/db"))),
        outcome(env.new_writable_file(Path::new("/db/a.log"), &opts()).and_then(|mut f| f.close())),
        outcome(env.link_file(Path::new("/db/a.log"), Path::new("/db/b.log"))),
        outcome(env.link_file(Path::new("/db/a.log"), Path::new("/db/b.log"))),
        outcome(env.rename_file(Path::new("/db/a.log"), Path::new("/db/c.log"))),
        outcome(env.rename_file(Path::new("/db/a.log"), Path::new("/db/c.log"))),
        outcome(env.delete_dir(Path::new("/db"))),
        outcome(env.delete_file(Path::new("/db/b.log"))),
        outcome(env.delete_file(Path::new("/db/b.log"))),
        outcome(env.delete_file(Path::new("/db/c.log"))),
        outcome(env.delete_dir(Path::new("/db"))),
        outcome(env.delete_dir(Path::new("/db"))),
    ]
}

/// Test that every intercepted operation returns what the base env returns.
#[test]
fn test_results_match_base_env() {
    let base = MemEnv::new();
    let expected = run_env_ops(&base);

    for policy in [NotifyPolicy::NotifyBefore, NotifyPolicy::NotifyAfterSuccess] {
        let (handle, _recorder) = observed_mem(policy);
        assert_eq!(run_env_ops(handle.env().as_ref()), expected, "policy {policy:?}");
    }

    // Non-idempotent operations surface the base failure on repeat.
    assert!(expected[3].contains("already exists"));
    assert!(expected[8].contains("not found"));
    assert!(expected[11].contains("not found"));
}

/// Test the notification count invariant under both policies.
#[test]
fn test_notification_counts() {
    let successes_and_failures = |env: &dyn Env| {
        env.create_dir(Path::new("/d")).unwrap();
        let mut file = env.new_writable_file(Path::new("/d/f"), &opts()).unwrap();
        file.append(b"abc").unwrap(); // ok
        file.sync().unwrap(); // ok
        file.range_sync(0, 3).unwrap(); // ok
        file.close().unwrap(); // ok
        assert!(file.close().is_err()); // fails
        assert!(file.fsync().is_err()); // fails
        drop(file);
        env.link_file(Path::new("/d/f"), Path::new("/d/g")).unwrap(); // ok
        assert!(env.delete_file(Path::new("/d/missing")).is_err()); // fails
        assert!(env.delete_dir(Path::new("/d")).is_err()); // fails (not empty)
        assert!(env.rename_file(Path::new("/nope"), Path::new("/x")).is_err()); // fails
    };

    for (policy, expected) in [
        // create + 4 file ops + link
        (NotifyPolicy::NotifyAfterSuccess, 6),
        // additionally the 2 failed file ops and 3 failed env ops
        (NotifyPolicy::NotifyBefore, 11),
    ] {
        let sink = Arc::new(CountingSink::default());
        let handle = observed_env::create_hooked_env_with_base(
            Arc::new(MemEnv::new()),
            ObserverHandle::from_raw(0),
            Arc::clone(&sink) as Arc<dyn NotificationSink>,
            &HookConfig {
                policy,
                ..HookConfig::default()
            },
        );
        successes_and_failures(handle.env().as_ref());
        assert_eq!(sink.notifications(), expected, "policy {policy:?}");

        handle.destroy();
        assert_eq!(sink.env_released.load(Ordering::SeqCst), 1);
        assert_eq!(sink.file_released.load(Ordering::SeqCst), 1);
    }
}

/// Test that notify-before reports attempts that then fail.
#[test]
fn test_notify_before_observes_failed_attempts() {
    let (handle, recorder) = observed_mem(NotifyPolicy::NotifyBefore);
    let env = handle.env();

    assert!(env.delete_file(Path::new("missing.log")).is_err());
    assert!(env
        .link_file(Path::new("missing.log"), Path::new("other.log"))
        .is_err());

    assert_eq!(
        recorder.events(),
        vec![
            EnvEvent::DeleteFile {
                path: PathBuf::from("missing.log"),
            },
            EnvEvent::LinkFile {
                src: PathBuf::from("missing.log"),
                target: PathBuf::from("other.log"),
            },
        ]
    );
}

/// Test that a file that is never used still releases its handle once.
#[test]
fn test_unused_file_released_once() {
    let sink = Arc::new(CountingSink::default());
    let file = HookedWritableFile::new(
        ObserverHandle::from_raw(3),
        Arc::clone(&sink) as Arc<dyn NotificationSink>,
        NotifyPolicy::NotifyAfterSuccess,
        MemEnv::new().new_writable_file(Path::new("x"), &opts()).unwrap(),
    );
    drop(file);

    assert_eq!(sink.file_released.load(Ordering::SeqCst), 1);
    assert_eq!(sink.notifications(), 0);
}

struct PanicOnDrop;

impl WritableFile for PanicOnDrop {
    fn append(&mut self, _data: &[u8]) -> EnvResult<()> {
        Ok(())
    }
    fn close(&mut self) -> EnvResult<()> {
        Ok(())
    }
    fn flush(&mut self) -> EnvResult<()> {
        Ok(())
    }
    fn sync(&mut self) -> EnvResult<()> {
        Ok(())
    }
    fn fsync(&mut self) -> EnvResult<()> {
        Ok(())
    }
    fn file_size(&self) -> u64 {
        0
    }
}

impl Drop for PanicOnDrop {
    fn drop(&mut self) {
        panic!("delegate destructor failed");
    }
}

/// Test that the release notification survives a panicking delegate destructor.
#[test]
fn test_release_when_delegate_drop_panics() {
    let sink = Arc::new(CountingSink::default());
    let mut file = HookedWritableFile::new(
        ObserverHandle::from_raw(1),
        Arc::clone(&sink) as Arc<dyn NotificationSink>,
        NotifyPolicy::NotifyAfterSuccess,
        Box::new(PanicOnDrop),
    );
    file.append(b"abc").unwrap();

    let result = panic::catch_unwind(AssertUnwindSafe(move || drop(file)));
    assert!(result.is_err());
    assert_eq!(sink.file_released.load(Ordering::SeqCst), 1);
    assert_eq!(sink.notifications(), 1);
}

/// Test that range_sync reaches the delegate and the observer with its range.
#[test]
fn test_range_sync_is_observed() {
    let base = Arc::new(MemEnv::new());
    let recorder = RecordingObserver::with_payloads();
    let handle = EnvHandle::observed_with_base(
        Arc::clone(&base) as Arc<dyn Env>,
        Arc::new(recorder.clone()),
        HookConfig::default(),
    )
    .unwrap();

    let path = Path::new("/db/000012.sst");
    let mut file = handle.env().new_writable_file(path, &opts()).unwrap();
    file.append(&[7u8; 64]).unwrap();
    file.range_sync(0, 32).unwrap();
    assert_eq!(base.synced_len(path), Some(32));

    // Unsynced tail is lost on a simulated crash.
    base.drop_unsynced_data();
    assert_eq!(base.read_file(path).unwrap(), vec![7u8; 32]);

    assert_eq!(
        recorder.events()[2],
        EnvEvent::RangeSync {
            path: path.to_path_buf(),
            offset: 0,
            nbytes: 32,
        }
    );
    assert_eq!(
        recorder.events()[1],
        EnvEvent::Append {
            path: path.to_path_buf(),
            len: 64,
            data: Some(vec![7u8; 64]),
        }
    );
}

/// Test that a rejected delegate open creates no file interceptor.
#[test]
fn test_failed_open_creates_nothing() {
    let dir = tempdir().unwrap();
    let (handle, recorder) = observed_posix(NotifyPolicy::NotifyAfterSuccess);
    let registry = Arc::clone(handle.registry().unwrap());

    // Parent directory does not exist.
    let path = dir.path().join("no_such_dir").join("a.log");
    let err = handle.env().new_writable_file(&path, &opts()).err().expect("open should fail");
    assert!(err.is_not_found());
    assert!(recorder.is_empty());
    assert_eq!(registry.live_count(), 1);
}
