//! 백업 후 교체 엔진
//!
//! 대상 폰트 폴더에 타임스탬프 이름의 백업 세션을 만들고, 폰트 파일을 전부
//! 그 안으로 옮긴 뒤 원래 이름 그대로 소스 폰트를 복사해 넣습니다.
//! 이모지 폰트는 교체하지 않고 원본을 다시 복사해 둡니다.
//!
//! ## 폴더 구조
//! ```text
//! content/fonts/
//! ├── SourceSans.ttf          ← 소스 폰트 사본
//! ├── TwemojiMozilla.ttf      ← 원본 그대로
//! └── Fonts.old/              ← 백업 컨테이너 (존재 = 적용 완료)
//!     └── 2024-05-01_12-30-00/
//!         ├── SourceSans.ttf
//!         └── TwemojiMozilla.ttf
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::AppConfig;
use crate::error::{FontSwapError, IoContext, Result};
use crate::lock::TargetLock;
use crate::source::has_font_extension;

/// 백업 세션 폴더 이름 형식 (초 단위)
pub const SESSION_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// 이모지 폰트 처리 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmojiPolicy {
    /// 다른 폰트와 함께 백업한 뒤 원본을 다시 복사 (워처 기본값)
    CopyBack,
    /// 건드리지 않음. 백업에도 들어가지 않음 (수동 도구 옵션)
    LeaveInPlace,
}

/// 한 번의 교체 결과
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReplaceReport {
    pub backup_dir: PathBuf,
    pub backed_up: usize,
    pub replaced: usize,
    pub emoji_kept: usize,
}

#[derive(Debug, Clone)]
pub struct FontReplacer {
    backup_container: String,
    extensions: Vec<String>,
    emoji_prefix: String,
    emoji_policy: EmojiPolicy,
    lock_targets: bool,
}

impl FontReplacer {
    pub fn new(backup_container: impl Into<String>, extensions: Vec<String>, emoji_prefix: impl Into<String>) -> Self {
        Self {
            backup_container: backup_container.into(),
            extensions,
            emoji_prefix: emoji_prefix.into(),
            emoji_policy: EmojiPolicy::CopyBack,
            lock_targets: false,
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(cfg.backup_container.clone(), cfg.font_extensions.clone(), cfg.emoji_prefix.clone())
            .with_lock(cfg.lock_targets)
    }

    pub fn with_emoji_policy(mut self, policy: EmojiPolicy) -> Self {
        self.emoji_policy = policy;
        self
    }

    pub fn with_lock(mut self, enabled: bool) -> Self {
        self.lock_targets = enabled;
        self
    }

    pub fn container_dir(&self, target: &Path) -> PathBuf {
        target.join(&self.backup_container)
    }

    fn is_emoji(&self, file_name: &str) -> bool {
        !self.emoji_prefix.is_empty()
            && file_name.to_lowercase().starts_with(&self.emoji_prefix.to_lowercase())
    }

    /// 대상 폴더 바로 아래의 폰트 파일 이름들 (이름순)
    pub fn font_files(&self, target: &Path) -> Result<Vec<String>> {
        let mut names: Vec<String> = fs::read_dir(target)
            .with_path("list fonts", target)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.is_file() && has_font_extension(p, &self.extensions))
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
            .collect();
        names.sort();
        Ok(names)
    }

    /// 폰트 교체 수행
    pub fn replace(&self, target: &Path, source_font: &Path) -> Result<ReplaceReport> {
        if !target.is_dir() {
            return Err(FontSwapError::io(
                "open target",
                target,
                io::Error::new(io::ErrorKind::NotFound, "target folder does not exist"),
            ));
        }
        if !source_font.is_file() {
            return Err(FontSwapError::SourceUnavailable {
                dir: source_font.parent().map(Path::to_path_buf).unwrap_or_default(),
                reason: format!("{} is not a file", source_font.display()),
            });
        }

        let _lock = TargetLock::acquire_if(self.lock_targets, target)?;

        let backup_dir = create_session_dir(&self.container_dir(target))?;
        tracing::info!(
            "[Engine] Creating backup: {}",
            backup_dir.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default()
        );

        let mut report = ReplaceReport {
            backup_dir: backup_dir.clone(),
            ..Default::default()
        };

        let mut fonts = self.font_files(target)?;
        if self.emoji_policy == EmojiPolicy::LeaveInPlace {
            let before = fonts.len();
            fonts.retain(|name| !self.is_emoji(name));
            report.emoji_kept = before - fonts.len();
        }

        if fonts.is_empty() {
            tracing::info!("[Engine] No font files found in the target directory to replace.");
            return Ok(report);
        }

        for name in &fonts {
            let from = target.join(name);
            let to = backup_dir.join(name);
            move_file(&from, &to)?;
            report.backed_up += 1;
        }
        tracing::info!("[Engine] Backed up {} original font file(s).", report.backed_up);

        for name in &fonts {
            let dest = target.join(name);
            if self.is_emoji(name) {
                fs::copy(backup_dir.join(name), &dest).with_path("restore emoji font", &dest)?;
                report.emoji_kept += 1;
                tracing::info!("[Engine] Restored original emoji font: {}", name);
            } else {
                fs::copy(source_font, &dest).with_path("copy source font", &dest)?;
                report.replaced += 1;
            }
        }

        tracing::info!("[Engine] Successfully replaced {} file(s).", report.replaced);
        Ok(report)
    }

    /// 성공 여부만 필요한 호출자용 (실패 원인은 로그로 남김)
    pub fn replace_fonts(&self, target: &Path, source_font: &Path) -> bool {
        let label = version_label(target);
        tracing::info!("[Engine] --- Starting replacement for '{}' ---", label);
        match self.replace(target, source_font) {
            Ok(_) => true,
            Err(e) => {
                tracing::error!("[Engine] CRITICAL: Replacement failed. Error: {}", e);
                false
            }
        }
    }
}

/// `<container>/<timestamp>` 생성. 같은 초에 이미 있으면 `_2`, `_3`… 을 붙임
pub fn create_session_dir(container: &Path) -> Result<PathBuf> {
    fs::create_dir_all(container).with_path("create backup container", container)?;
    let stamp = chrono::Local::now().format(SESSION_FORMAT).to_string();

    let mut attempt = 1u32;
    loop {
        let name = if attempt == 1 {
            stamp.clone()
        } else {
            format!("{}_{}", stamp, attempt)
        };
        let dir = container.join(&name);
        match fs::create_dir(&dir) {
            Ok(()) => return Ok(dir),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(FontSwapError::io("create backup session", &dir, e)),
        }
    }
}

/// rename, 다른 볼륨이면 copy + remove로 폴백
pub fn move_file(from: &Path, to: &Path) -> Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            if !from.is_file() {
                return Err(FontSwapError::io("move", from, rename_err));
            }
            fs::copy(from, to).with_path("move (copy)", to)?;
            fs::remove_file(from).with_path("move (remove)", from)?;
            Ok(())
        }
    }
}

/// 로그용: `<version>/content/fonts` 에서 버전 폴더 이름 추출
fn version_label(target: &Path) -> String {
    target
        .parent()
        .and_then(Path::parent)
        .and_then(Path::file_name)
        .or_else(|| target.file_name())
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| target.display().to_string())
}
