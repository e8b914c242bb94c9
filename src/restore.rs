//! 백업 세션 복원
//!
//! 복원은 세션 폴더의 파일을 대상 폴더로 되돌려 놓을 뿐, 백업 컨테이너는 지우지 않습니다.
//! 컨테이너가 남아 있는 한 워처는 해당 버전을 "처리 완료"로 봅니다.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::AppConfig;
use crate::engine::move_file;
use crate::error::{FontSwapError, IoContext, Result};
use crate::lock::TargetLock;

#[derive(Debug, Clone)]
pub struct Restorer {
    backup_container: String,
    lock_targets: bool,
}

impl Restorer {
    pub fn new(backup_container: impl Into<String>) -> Self {
        Self {
            backup_container: backup_container.into(),
            lock_targets: false,
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(cfg.backup_container.clone()).with_lock(cfg.lock_targets)
    }

    pub fn with_lock(mut self, enabled: bool) -> Self {
        self.lock_targets = enabled;
        self
    }

    pub fn container_dir(&self, target: &Path) -> PathBuf {
        target.join(&self.backup_container)
    }

    pub fn session_dir(&self, target: &Path, session: &str) -> PathBuf {
        self.container_dir(target).join(session)
    }

    /// 컨테이너 폴더 자체를 선택했다면 그 상위(실제 폰트 폴더)로 보정
    pub fn resolve_target(&self, path: &Path) -> PathBuf {
        match (path.file_name(), path.parent()) {
            (Some(name), Some(parent)) if name.to_string_lossy() == self.backup_container => {
                tracing::info!(
                    "[Restore] '{}' folder selected, using parent: {}",
                    self.backup_container,
                    parent.display()
                );
                parent.to_path_buf()
            }
            _ => path.to_path_buf(),
        }
    }

    /// 세션 이름 목록 (최신순). 컨테이너가 없으면 빈 목록
    pub fn list_sessions(&self, target: &Path) -> Result<Vec<String>> {
        let container = self.container_dir(target);
        if !container.is_dir() {
            return Ok(Vec::new());
        }
        let mut sessions: Vec<String> = fs::read_dir(&container)
            .with_path("list backups", &container)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .collect();
        sessions.sort_by(|a, b| b.cmp(a));
        Ok(sessions)
    }

    pub fn latest_session(&self, target: &Path) -> Result<Option<String>> {
        Ok(self.list_sessions(target)?.into_iter().next())
    }

    /// 세션 폴더의 모든 파일을 대상 폴더로 이동 (덮어쓰기). 이동한 개수 반환
    pub fn restore(&self, session_dir: &Path, target: &Path) -> Result<usize> {
        if !session_dir.is_dir() {
            return Err(FontSwapError::BackupMissing(session_dir.to_path_buf()));
        }
        let _lock = TargetLock::acquire_if(self.lock_targets, target)?;

        let files: Vec<PathBuf> = fs::read_dir(session_dir)
            .with_path("list backup", session_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.is_file())
            .collect();

        if files.is_empty() {
            tracing::info!("[Restore] Backup {} is empty, nothing to restore", session_dir.display());
            return Ok(0);
        }

        let mut restored = 0;
        for file in &files {
            let Some(name) = file.file_name() else { continue };
            let dest = target.join(name);
            if dest.exists() {
                fs::remove_file(&dest).with_path("remove replaced font", &dest)?;
            }
            move_file(file, &dest)?;
            restored += 1;
        }

        tracing::info!("[Restore] Restored {} file(s) from {}", restored, session_dir.display());
        Ok(restored)
    }

    /// 빈 세션 폴더 삭제. 내용이 남아 있으면 지우지 않고 에러
    pub fn remove_session(&self, session_dir: &Path) -> Result<()> {
        if !session_dir.is_dir() {
            return Err(FontSwapError::BackupMissing(session_dir.to_path_buf()));
        }
        let has_entries = fs::read_dir(session_dir)
            .with_path("inspect backup", session_dir)?
            .next()
            .is_some();
        if has_entries {
            return Err(FontSwapError::BackupNotEmpty(session_dir.to_path_buf()));
        }
        fs::remove_dir(session_dir).with_path("remove backup", session_dir)?;
        tracing::info!("[Restore] Removed empty backup folder {}", session_dir.display());
        Ok(())
    }

    /// 컨테이너가 비었으면 삭제. 삭제했으면 true (워처가 다시 감지하게 됨)
    pub fn prune_container(&self, target: &Path) -> bool {
        let container = self.container_dir(target);
        match fs::remove_dir(&container) {
            Ok(()) => {
                tracing::info!("[Restore] Removed empty backup container {}", container.display());
                true
            }
            Err(e) => {
                tracing::debug!("[Restore] Keeping backup container {}: {}", container.display(), e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FontReplacer;
    use crate::scanner::VersionScanner;
    use tempfile::TempDir;

    fn restorer() -> Restorer {
        Restorer::new("Fonts.old")
    }

    fn replaced_version(tmp: &TempDir) -> (VersionScanner, PathBuf, PathBuf) {
        let root = tmp.path().join("Versions");
        let scanner = VersionScanner::new(&root, "content/fonts", "Fonts.old");
        let target = scanner.fonts_dir("version-1");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("Arial.ttf"), b"ARIAL").unwrap();
        fs::write(target.join("TwemojiMozilla.ttf"), b"EMOJI").unwrap();
        let source = tmp.path().join("Custom.ttf");
        fs::write(&source, b"CUSTOM").unwrap();

        let report = FontReplacer::new("Fonts.old", vec!["ttf".into()], "twemoji")
            .replace(&target, &source)
            .unwrap();
        (scanner, target, report.backup_dir)
    }

    #[test]
    fn restore_moves_originals_back() {
        let tmp = TempDir::new().unwrap();
        let (_, target, session) = replaced_version(&tmp);

        let n = restorer().restore(&session, &target).unwrap();
        assert_eq!(n, 2);
        assert_eq!(fs::read(target.join("Arial.ttf")).unwrap(), b"ARIAL");
        assert_eq!(fs::read(target.join("TwemojiMozilla.ttf")).unwrap(), b"EMOJI");
        assert_eq!(fs::read_dir(&session).unwrap().count(), 0);
    }

    #[test]
    fn restore_alone_keeps_version_handled() {
        let tmp = TempDir::new().unwrap();
        let (scanner, target, session) = replaced_version(&tmp);
        let r = restorer();

        r.restore(&session, &target).unwrap();
        assert!(!scanner.needs_update("version-1"));

        r.remove_session(&session).unwrap();
        assert!(!scanner.needs_update("version-1"));

        assert!(r.prune_container(&target));
        assert!(scanner.needs_update("version-1"));
    }

    #[test]
    fn missing_session_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let err = restorer().restore(&tmp.path().join("nope"), tmp.path()).unwrap_err();
        assert!(matches!(err, FontSwapError::BackupMissing(_)));
    }

    #[test]
    fn empty_session_restores_nothing() {
        let tmp = TempDir::new().unwrap();
        let session = tmp.path().join("Fonts.old").join("2024-01-01_00-00-00");
        fs::create_dir_all(&session).unwrap();
        assert_eq!(restorer().restore(&session, tmp.path()).unwrap(), 0);
    }

    #[test]
    fn non_empty_session_is_never_deleted() {
        let tmp = TempDir::new().unwrap();
        let (_, _, session) = replaced_version(&tmp);
        let err = restorer().remove_session(&session).unwrap_err();
        assert!(matches!(err, FontSwapError::BackupNotEmpty(_)));
        assert!(session.join("Arial.ttf").exists());
    }

    #[test]
    fn prune_keeps_non_empty_container() {
        let tmp = TempDir::new().unwrap();
        let (_, target, _) = replaced_version(&tmp);
        assert!(!restorer().prune_container(&target));
        assert!(target.join("Fonts.old").is_dir());
    }

    #[test]
    fn sessions_are_listed_newest_first() {
        let tmp = TempDir::new().unwrap();
        let container = tmp.path().join("Fonts.old");
        for name in ["2024-01-01_00-00-00", "2024-03-01_00-00-00", "2024-03-01_00-00-00_2"] {
            fs::create_dir_all(container.join(name)).unwrap();
        }
        fs::write(container.join("stray.txt"), b"").unwrap();

        let r = restorer();
        assert_eq!(
            r.list_sessions(tmp.path()).unwrap(),
            vec!["2024-03-01_00-00-00_2", "2024-03-01_00-00-00", "2024-01-01_00-00-00"]
        );
        assert_eq!(r.latest_session(tmp.path()).unwrap().as_deref(), Some("2024-03-01_00-00-00_2"));
        assert!(r.list_sessions(&tmp.path().join("other")).unwrap().is_empty());
    }

    #[test]
    fn container_selection_is_corrected_to_parent() {
        let r = restorer();
        let fonts = Path::new("game").join("content").join("fonts");
        assert_eq!(r.resolve_target(&fonts.join("Fonts.old")), fonts);
        assert_eq!(r.resolve_target(&fonts), fonts);
    }
}
