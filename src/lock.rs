//! 대상 폰트 폴더 잠금
//!
//! 백그라운드 워처와 수동 도구가 같은 폴더를 동시에 건드리지 않도록
//! `<fonts_dir>/.fontswap.lock` 파일을 `create_new`로 만듭니다.
//!
//! 메타데이터를 읽을 수 없는 잠금(기록 중이거나 손상됨)은 잡혀 있는 것으로 봅니다.
//! 기록된 PID의 프로세스가 이미 종료된 경우에만 넘겨받으며, 넘겨받기는
//! `.fontswap.lock.takeover` 가드를 잡은 프로세스 하나만 수행합니다.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FontSwapError, IoContext, Result};
use crate::process_monitor;

pub const LOCK_FILE_NAME: &str = ".fontswap.lock";
pub const TAKEOVER_FILE_NAME: &str = ".fontswap.lock.takeover";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockMeta {
    pub pid: u32,
    pub acquired_at: String,
}

impl LockMeta {
    fn current() -> Self {
        Self {
            pid: std::process::id(),
            acquired_at: chrono::Local::now().to_rfc3339(),
        }
    }

    /// 같은 프로세스가 가진 잠금도 살아 있는 것으로 봄
    fn holder_alive(&self) -> bool {
        self.pid == std::process::id() || process_monitor::is_running(self.pid)
    }
}

#[derive(Debug)]
pub struct TargetLock {
    path: PathBuf,
}

impl TargetLock {
    pub fn acquire(fonts_dir: &Path) -> Result<Self> {
        let path = fonts_dir.join(LOCK_FILE_NAME);
        match try_create(&path) {
            Ok(lock) => Ok(lock),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => take_over_stale(fonts_dir, &path),
            Err(e) => Err(FontSwapError::io("create lock", &path, e)),
        }
    }

    /// 설정에 따라 잠금을 걸거나 건너뜀
    pub fn acquire_if(enabled: bool, fonts_dir: &Path) -> Result<Option<Self>> {
        if enabled {
            Self::acquire(fonts_dir).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TargetLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn held(path: &Path, meta: Option<LockMeta>) -> FontSwapError {
    FontSwapError::Locked {
        path: path.to_path_buf(),
        pid: meta.map(|m| m.pid).unwrap_or(0),
    }
}

fn take_over_stale(fonts_dir: &Path, path: &Path) -> Result<TargetLock> {
    let stale = match read_meta(path) {
        Some(meta) if !meta.holder_alive() => meta,
        other => return Err(held(path, other)),
    };

    let guard_path = fonts_dir.join(TAKEOVER_FILE_NAME);
    let _guard = match try_create(&guard_path) {
        Ok(guard) => guard,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            // 넘겨받는 도중 죽은 프로세스의 가드는 치워 두고, 이번 시도는 실패로 보고
            if let Some(guard_meta) = read_meta(&guard_path) {
                if !guard_meta.holder_alive() {
                    let _ = fs::remove_file(&guard_path);
                }
            }
            return Err(held(path, Some(stale)));
        }
        Err(e) => return Err(FontSwapError::io("create lock takeover guard", &guard_path, e)),
    };

    // 가드를 잡기 전에 다른 프로세스가 이미 넘겨받았을 수 있으므로 다시 확인
    if path.exists() {
        match read_meta(path) {
            Some(current) if current == stale => {
                fs::remove_file(path).with_path("remove stale lock", path)?;
            }
            other => return Err(held(path, other)),
        }
    }

    tracing::warn!(
        "[Lock] Taking over stale lock at {} (holder PID {} is gone)",
        path.display(),
        stale.pid
    );
    try_create(path).map_err(|e| match e.kind() {
        io::ErrorKind::AlreadyExists => held(path, read_meta(path)),
        _ => FontSwapError::io("create lock", path, e),
    })
}

fn try_create(path: &Path) -> io::Result<TargetLock> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    let lock = TargetLock {
        path: path.to_path_buf(),
    };
    let meta = serde_json::to_vec(&LockMeta::current()).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    file.write_all(&meta)?;
    file.flush()?;
    Ok(lock)
}

fn read_meta(path: &Path) -> Option<LockMeta> {
    let bytes = fs::read(path).ok()?;
    serde_json::from_slice(&bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::{Child, Command, Stdio};
    use tempfile::TempDir;

    fn write_meta(path: &Path, pid: u32) {
        let meta = LockMeta {
            pid,
            acquired_at: "2020-01-01T00:00:00+00:00".into(),
        };
        fs::write(path, serde_json::to_vec(&meta).unwrap()).unwrap();
    }

    fn spawn_sleeper() -> Child {
        #[cfg(windows)]
        let mut cmd = {
            let mut c = Command::new("cmd");
            c.args(["/C", "ping -n 30 127.0.0.1 >NUL"]);
            c
        };
        #[cfg(not(windows))]
        let mut cmd = {
            let mut c = Command::new("sleep");
            c.arg("30");
            c
        };
        cmd.stdout(Stdio::null()).stderr(Stdio::null()).spawn().unwrap()
    }

    const DEAD_PID: u32 = u32::MAX - 1;

    #[test]
    fn acquire_writes_meta_and_drop_releases() {
        let tmp = TempDir::new().unwrap();
        let lock_path = {
            let lock = TargetLock::acquire(tmp.path()).unwrap();
            assert_eq!(read_meta(lock.path()).unwrap().pid, std::process::id());
            lock.path().to_path_buf()
        };
        assert!(!lock_path.exists());
    }

    #[test]
    fn second_acquire_in_same_process_is_locked() {
        let tmp = TempDir::new().unwrap();
        let _first = TargetLock::acquire(tmp.path()).unwrap();
        let err = TargetLock::acquire(tmp.path()).unwrap_err();
        assert!(matches!(err, FontSwapError::Locked { pid, .. } if pid == std::process::id()));
    }

    #[test]
    fn half_written_lock_is_treated_as_held() {
        let tmp = TempDir::new().unwrap();
        let lock_path = tmp.path().join(LOCK_FILE_NAME);
        // create_new 직후, 메타데이터를 쓰기 전 상태
        fs::write(&lock_path, b"").unwrap();

        let err = TargetLock::acquire(tmp.path()).unwrap_err();
        assert!(matches!(err, FontSwapError::Locked { pid: 0, .. }));
        assert!(lock_path.exists());
    }

    #[test]
    fn corrupt_lock_is_treated_as_held() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(LOCK_FILE_NAME), b"not json").unwrap();
        assert!(matches!(
            TargetLock::acquire(tmp.path()),
            Err(FontSwapError::Locked { .. })
        ));
    }

    #[test]
    fn live_holder_keeps_the_lock() {
        let tmp = TempDir::new().unwrap();
        let mut child = spawn_sleeper();
        write_meta(&tmp.path().join(LOCK_FILE_NAME), child.id());

        let result = TargetLock::acquire(tmp.path());
        let _ = child.kill();
        let _ = child.wait();

        let err = result.unwrap_err();
        assert!(matches!(err, FontSwapError::Locked { pid, .. } if pid == child.id()));
    }

    #[test]
    fn dead_holder_is_taken_over() {
        let tmp = TempDir::new().unwrap();
        write_meta(&tmp.path().join(LOCK_FILE_NAME), DEAD_PID);

        let lock = TargetLock::acquire(tmp.path()).unwrap();
        assert_eq!(read_meta(lock.path()).unwrap().pid, std::process::id());
        assert!(!tmp.path().join(TAKEOVER_FILE_NAME).exists());
    }

    #[test]
    fn takeover_in_progress_blocks_other_takers() {
        let tmp = TempDir::new().unwrap();
        let lock_path = tmp.path().join(LOCK_FILE_NAME);
        write_meta(&lock_path, DEAD_PID);
        // 이 프로세스가 넘겨받는 중인 것처럼 가드를 잡아 둠
        write_meta(&tmp.path().join(TAKEOVER_FILE_NAME), std::process::id());

        assert!(matches!(
            TargetLock::acquire(tmp.path()),
            Err(FontSwapError::Locked { pid: DEAD_PID, .. })
        ));
        assert_eq!(read_meta(&lock_path).unwrap().pid, DEAD_PID);
    }

    #[test]
    fn abandoned_takeover_guard_is_cleared_for_next_attempt() {
        let tmp = TempDir::new().unwrap();
        write_meta(&tmp.path().join(LOCK_FILE_NAME), DEAD_PID);
        write_meta(&tmp.path().join(TAKEOVER_FILE_NAME), DEAD_PID);

        assert!(TargetLock::acquire(tmp.path()).is_err());
        assert!(!tmp.path().join(TAKEOVER_FILE_NAME).exists());
        assert!(TargetLock::acquire(tmp.path()).is_ok());
    }

    #[test]
    fn disabled_lock_is_noop() {
        let tmp = TempDir::new().unwrap();
        assert!(TargetLock::acquire_if(false, tmp.path()).unwrap().is_none());
        assert!(!tmp.path().join(LOCK_FILE_NAME).exists());
    }
}
