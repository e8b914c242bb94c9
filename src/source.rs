//! 스테이징 폴더 — 사용자가 적용할 폰트 파일 하나를 넣어두는 곳
//!
//! 파일이 정확히 하나일 때만 소스로 인정합니다. 0개나 2개 이상이면
//! "준비 안 됨"으로 보고 아무 교체도 하지 않습니다.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{FontSwapError, IoContext, Result};

/// 스테이징 폴더 상태
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceStatus {
    Ready(PathBuf),
    Empty,
    Ambiguous(usize),
}

impl SourceStatus {
    pub fn describe(&self) -> String {
        match self {
            SourceStatus::Ready(p) => format!(
                "ready: {}",
                p.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default()
            ),
            SourceStatus::Empty => "waiting for a font file".to_string(),
            SourceStatus::Ambiguous(n) => format!("{} files found, expected exactly one", n),
        }
    }
}

/// 스테이징 폴더를 검사 (폴더가 없으면 만들어 둠)
pub fn resolve_source(staging_dir: &Path) -> Result<SourceStatus> {
    if !staging_dir.is_dir() {
        fs::create_dir_all(staging_dir).with_path("create staging dir", staging_dir)?;
        tracing::info!("[Source] Source folder created at: {}", staging_dir.display());
    }

    let mut files: Vec<PathBuf> = fs::read_dir(staging_dir)
        .with_path("read staging dir", staging_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_file())
        .collect();

    Ok(match files.len() {
        0 => SourceStatus::Empty,
        1 => SourceStatus::Ready(files.remove(0)),
        n => SourceStatus::Ambiguous(n),
    })
}

/// 소스 폰트가 준비되었으면 경로, 아니면 None
///
/// 폴더에 접근할 수 없는 경우도 로그만 남기고 None으로 처리합니다.
pub fn get_source_font(staging_dir: &Path) -> Option<PathBuf> {
    match resolve_source(staging_dir) {
        Ok(SourceStatus::Ready(p)) => Some(p),
        Ok(_) => None,
        Err(e) => {
            tracing::error!("[Source] Could not access source folder: {}", e);
            None
        }
    }
}

/// 준비된 소스 폰트를 요구 (없으면 SourceUnavailable)
pub fn require_source_font(staging_dir: &Path) -> Result<PathBuf> {
    match resolve_source(staging_dir)? {
        SourceStatus::Ready(p) => Ok(p),
        other => Err(FontSwapError::SourceUnavailable {
            dir: staging_dir.to_path_buf(),
            reason: other.describe(),
        }),
    }
}

/// 스테이징 폴더를 비우고 선택한 폰트를 복사해 활성 폰트로 지정
pub fn set_active_font(staging_dir: &Path, font_path: &Path) -> Result<PathBuf> {
    if !font_path.is_file() {
        return Err(FontSwapError::io(
            "select font",
            font_path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "font file not found"),
        ));
    }
    let file_name = font_path.file_name().ok_or_else(|| {
        FontSwapError::InvalidConfig(format!("not a file path: {}", font_path.display()))
    })?;

    // 스테이징 폴더 안의 파일을 다시 고른 경우를 위해 먼저 읽어 둠
    let bytes = fs::read(font_path).with_path("read font", font_path)?;

    fs::create_dir_all(staging_dir).with_path("create staging dir", staging_dir)?;
    for entry in fs::read_dir(staging_dir).with_path("read staging dir", staging_dir)? {
        let path = entry.with_path("read staging dir", staging_dir)?.path();
        if path.is_dir() {
            fs::remove_dir_all(&path).with_path("clear staging dir", &path)?;
        } else {
            fs::remove_file(&path).with_path("clear staging dir", &path)?;
        }
    }

    let dest = staging_dir.join(file_name);
    fs::write(&dest, bytes).with_path("copy font", &dest)?;
    tracing::info!("[Source] '{}' set as the active custom font", file_name.to_string_lossy());
    Ok(dest)
}

/// 확장자가 폰트 확장자 목록에 있는지 확인 (대소문자 무시)
pub fn has_font_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map(|ext| extensions.iter().any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(&ext)))
        .unwrap_or(false)
}

/// 프리셋 라이브러리의 폰트 목록 (이름순)
pub fn list_presets(library: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    if !library.is_dir() {
        return Ok(Vec::new());
    }
    let mut fonts: Vec<PathBuf> = fs::read_dir(library)
        .with_path("read preset library", library)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && has_font_extension(p, extensions))
        .collect();
    fonts.sort();
    Ok(fonts)
}
