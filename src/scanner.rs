//! 클라이언트 버전 폴더 스캐너
//!
//! 버전 폴더 이름은 클라이언트가 정하는 불투명한 문자열입니다. 최신 버전 판정은
//! 문자열 최댓값으로 합니다 (시맨틱 버전 파싱 없음).

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::AppConfig;

pub type VersionId = String;

/// 버전별 폰트 적용 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum VersionState {
    /// 폰트 폴더가 없음 (설치 중이거나 폰트를 쓰지 않는 버전)
    NoFontsDir,
    /// 폰트 폴더는 있고 백업 컨테이너가 없음
    NeedsUpdate,
    /// 백업 컨테이너가 있음
    Patched { sessions: usize },
}

#[derive(Debug, Clone, Serialize)]
pub struct VersionStatus {
    pub version: VersionId,
    #[serde(flatten)]
    pub state: VersionState,
}

#[derive(Debug, Clone)]
pub struct VersionScanner {
    versions_root: PathBuf,
    fonts_subdir: String,
    backup_container: String,
}

impl VersionScanner {
    pub fn new(
        versions_root: impl Into<PathBuf>,
        fonts_subdir: impl Into<String>,
        backup_container: impl Into<String>,
    ) -> Self {
        Self {
            versions_root: versions_root.into(),
            fonts_subdir: fonts_subdir.into(),
            backup_container: backup_container.into(),
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(cfg.versions_root(), cfg.fonts_subdir.clone(), cfg.backup_container.clone())
    }

    pub fn versions_root(&self) -> &Path {
        &self.versions_root
    }

    /// 버전 루트 바로 아래의 폴더 이름들 (루트가 없으면 빈 집합)
    pub fn list_versions(&self) -> BTreeSet<VersionId> {
        let entries = match fs::read_dir(&self.versions_root) {
            Ok(entries) => entries,
            Err(e) => {
                if self.versions_root.exists() {
                    tracing::warn!(
                        "[Scanner] Cannot read versions root {}: {}",
                        self.versions_root.display(),
                        e
                    );
                }
                return BTreeSet::new();
            }
        };

        entries
            .filter_map(Result::ok)
            .filter(|entry| entry.path().is_dir())
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .collect()
    }

    pub fn version_dir(&self, version: &str) -> PathBuf {
        self.versions_root.join(version)
    }

    pub fn fonts_dir(&self, version: &str) -> PathBuf {
        self.fonts_subdir
            .split(['/', '\\'])
            .filter(|s| !s.is_empty())
            .fold(self.version_dir(version), |acc, part| acc.join(part))
    }

    pub fn container_dir(&self, fonts_dir: &Path) -> PathBuf {
        fonts_dir.join(&self.backup_container)
    }

    /// 폰트 폴더가 있고 백업 컨테이너가 없을 때만 true
    pub fn needs_update(&self, version: &str) -> bool {
        let fonts_dir = self.fonts_dir(version);
        fonts_dir.is_dir() && !self.container_dir(&fonts_dir).is_dir()
    }

    /// 업데이트가 필요하고 아직 무시 목록에 없는 버전들 (내림차순)
    pub fn updatable(&self, ignored: &BTreeSet<VersionId>) -> Vec<VersionId> {
        self.list_versions()
            .into_iter()
            .rev()
            .filter(|v| !ignored.contains(v))
            .filter(|v| self.needs_update(v))
            .collect()
    }

    pub fn version_statuses(&self) -> Vec<VersionStatus> {
        self.list_versions()
            .into_iter()
            .rev()
            .map(|version| {
                let fonts_dir = self.fonts_dir(&version);
                let container = self.container_dir(&fonts_dir);
                let state = if !fonts_dir.is_dir() {
                    VersionState::NoFontsDir
                } else if !container.is_dir() {
                    VersionState::NeedsUpdate
                } else {
                    let sessions = fs::read_dir(&container)
                        .map(|it| it.filter_map(Result::ok).filter(|e| e.path().is_dir()).count())
                        .unwrap_or(0);
                    VersionState::Patched { sessions }
                };
                VersionStatus { version, state }
            })
            .collect()
    }
}

/// 문자열 기준 최댓값 (최신 버전 추정)
pub fn latest(versions: &[VersionId]) -> Option<&VersionId> {
    versions.iter().max()
}
