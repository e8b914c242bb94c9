//! 설치 / 제거
//!
//! 설치 폴더에 스테이징 폴더와 프리셋 라이브러리를 만들고, 프리셋 폰트를 가져오고
//! (느슨한 파일과 zip 모두), 로그인 시 워처가 실행되도록 시작 항목을 등록합니다.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::{AppConfig, CONFIG_FILE_NAME};
use crate::engine::move_file;
use crate::error::{FontSwapError, IoContext, Result};
use crate::process_monitor;
use crate::source::has_font_extension;

/// 워처 실행 파일 이름 (확장자 제외). 제거 시 이 이름으로 프로세스를 찾음
pub const WATCHER_BIN_NAME: &str = "fontswap-watcher";

/// 설치 대상 경로 묶음
#[derive(Debug, Clone)]
pub struct InstallLayout {
    pub install_dir: PathBuf,
    pub staging_dir: PathBuf,
    pub preset_dir: PathBuf,
    pub config_file: PathBuf,
    pub startup_dir: Option<PathBuf>,
    pub watcher_exe: PathBuf,
    pub font_extensions: Vec<String>,
}

impl InstallLayout {
    pub fn from_config(cfg: &AppConfig, watcher_exe: impl Into<PathBuf>) -> Self {
        let install_dir = cfg.install_dir();
        Self {
            config_file: install_dir.join("config").join(CONFIG_FILE_NAME),
            staging_dir: cfg.staging_dir(),
            preset_dir: cfg.preset_dir(),
            startup_dir: cfg.startup_dir(),
            watcher_exe: watcher_exe.into(),
            font_extensions: cfg.font_extensions.clone(),
            install_dir,
        }
    }

    /// 시작 항목 파일 경로 (시작 프로그램 폴더를 알 수 없으면 None)
    pub fn startup_entry(&self) -> Option<PathBuf> {
        let dir = self.startup_dir.as_ref()?;
        if cfg!(windows) {
            Some(dir.join("launch_fontswap_watcher.vbs"))
        } else {
            Some(dir.join(format!("{}.desktop", WATCHER_BIN_NAME)))
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InstallReport {
    pub install_dir: PathBuf,
    pub presets_imported: usize,
    pub archives_extracted: usize,
    pub archives_skipped: usize,
    pub config_written: bool,
    pub startup_entry: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UninstallReport {
    pub terminated: usize,
    pub startup_removed: Option<PathBuf>,
}

pub fn install(layout: &InstallLayout, preset_source: Option<&Path>) -> Result<InstallReport> {
    tracing::info!("[Installer] Installing to {}", layout.install_dir.display());

    for dir in [&layout.install_dir, &layout.staging_dir, &layout.preset_dir] {
        fs::create_dir_all(dir).with_path("create install folder", dir)?;
    }

    let mut report = InstallReport {
        install_dir: layout.install_dir.clone(),
        ..Default::default()
    };

    if let Some(source) = preset_source {
        import_presets(source, &layout.preset_dir, &layout.font_extensions, &mut report)?;
    }

    if !layout.config_file.exists() {
        AppConfig {
            install_dir: Some(layout.install_dir.clone()),
            ..Default::default()
        }
        .save_to(&layout.config_file)?;
        report.config_written = true;
    }

    report.startup_entry = write_startup_entry(layout)?;

    tracing::info!(
        "[Installer] Done: {} preset font(s), startup entry {}",
        report.presets_imported,
        report
            .startup_entry
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "not created".into())
    );
    Ok(report)
}

/// `<source>/Fonts/` (파일과 zip) 또는 `<source>/Fonts.zip` 에서 프리셋 가져오기
pub fn import_presets(
    source: &Path,
    library: &Path,
    extensions: &[String],
    report: &mut InstallReport,
) -> Result<()> {
    let fonts_dir = source.join("Fonts");
    let mut archives = Vec::new();

    if fonts_dir.is_dir() {
        for entry in fs::read_dir(&fonts_dir).with_path("list preset source", &fonts_dir)? {
            let path = entry.with_path("list preset source", &fonts_dir)?.path();
            if !path.is_file() {
                continue;
            }
            if is_zip(&path) {
                archives.push(path);
            } else if has_font_extension(&path, extensions) {
                copy_into(&path, library)?;
                report.presets_imported += 1;
            }
        }
    } else {
        let zip = source.join("Fonts.zip");
        if zip.is_file() {
            archives.push(zip);
        } else {
            tracing::warn!("[Installer] No 'Fonts' folder or 'Fonts.zip' found in {}", source.display());
        }
    }

    for archive in archives {
        match extract_fonts(&archive, library, extensions) {
            Ok(n) => {
                report.presets_imported += n;
                report.archives_extracted += 1;
                tracing::info!("[Installer] Extracted {} font(s) from {}", n, archive.display());
            }
            Err(e) => {
                report.archives_skipped += 1;
                tracing::warn!("[Installer] Skipping archive {}: {}", archive.display(), e);
            }
        }
    }
    Ok(())
}

fn is_zip(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().eq_ignore_ascii_case("zip"))
        .unwrap_or(false)
}

/// zip을 임시 폴더에 풀고 안에 있는 폰트를 (하위 폴더 포함) 라이브러리로 복사
pub fn extract_fonts(archive_path: &Path, library: &Path, extensions: &[String]) -> Result<usize> {
    let file = fs::File::open(archive_path).with_path("open archive", archive_path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| {
        FontSwapError::Internal(anyhow::anyhow!("Invalid zip {}: {}", archive_path.display(), e))
    })?;

    let temp = tempfile::tempdir().with_path("create temp folder", std::env::temp_dir())?;
    archive.extract(temp.path()).map_err(|e| {
        FontSwapError::Internal(anyhow::anyhow!("Failed to extract {}: {}", archive_path.display(), e))
    })?;

    collect_fonts(temp.path(), library, extensions)
}

/// 폴더를 재귀적으로 돌며 폰트 파일을 라이브러리로 복사
pub fn collect_fonts(dir: &Path, library: &Path, extensions: &[String]) -> Result<usize> {
    let mut copied = 0;
    for entry in fs::read_dir(dir).with_path("scan fonts", dir)? {
        let path = entry.with_path("scan fonts", dir)?.path();
        if path.is_dir() {
            copied += collect_fonts(&path, library, extensions)?;
        } else if has_font_extension(&path, extensions) {
            copy_into(&path, library)?;
            copied += 1;
        }
    }
    Ok(copied)
}

fn copy_into(file: &Path, dir: &Path) -> Result<()> {
    let Some(name) = file.file_name() else {
        return Ok(());
    };
    let dest = dir.join(name);
    fs::copy(file, &dest).with_path("copy preset font", &dest)?;
    Ok(())
}

fn startup_script(watcher_exe: &Path) -> String {
    if cfg!(windows) {
        format!(
            "Set WshShell = CreateObject(\"WScript.Shell\")\r\nWshShell.Run \"\"\"{}\"\"\", 0, False\r\n",
            watcher_exe.display()
        )
    } else {
        format!(
            "[Desktop Entry]\nType=Application\nName=Font Manager\nExec=\"{}\"\nTerminal=false\nX-GNOME-Autostart-enabled=true\n",
            watcher_exe.display()
        )
    }
}

pub fn write_startup_entry(layout: &InstallLayout) -> Result<Option<PathBuf>> {
    let Some(entry) = layout.startup_entry() else {
        tracing::warn!("[Installer] Startup folder is unknown, skipping startup entry");
        return Ok(None);
    };
    if let Some(parent) = entry.parent() {
        fs::create_dir_all(parent).with_path("create startup folder", parent)?;
    }

    // 덮어쓰기 도중 실패해도 이전 항목이 깨지지 않도록 임시 파일에 쓰고 이동
    let tmp = entry.with_extension("tmp");
    fs::write(&tmp, startup_script(&layout.watcher_exe)).with_path("write startup entry", &tmp)?;
    if entry.exists() {
        fs::remove_file(&entry).with_path("replace startup entry", &entry)?;
    }
    move_file(&tmp, &entry)?;

    tracing::info!("[Installer] Startup entry written: {}", entry.display());
    Ok(Some(entry))
}

pub fn uninstall(layout: &InstallLayout) -> Result<UninstallReport> {
    let mut report = UninstallReport::default();

    let pids: Vec<u32> = process_monitor::find_by_cmd_pattern(WATCHER_BIN_NAME)
        .into_iter()
        .map(|p| p.pid)
        .collect();
    if pids.is_empty() {
        tracing::info!("[Installer] No running watcher found");
    } else {
        report.terminated = process_monitor::terminate_pids(&pids);
    }

    if let Some(entry) = layout.startup_entry() {
        if entry.exists() {
            fs::remove_file(&entry).with_path("remove startup entry", &entry)?;
            tracing::info!("[Installer] Removed startup entry {}", entry.display());
            report.startup_removed = Some(entry);
        }
    }

    Ok(report)
}
