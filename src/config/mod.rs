//! 설정 파일 관리
//!
//! `config/fontswap.toml`에서 설정을 로드합니다. 파일이 없거나 일부 키가 빠져 있으면
//! 기본값을 사용하므로, 설치 직후에도 별도 설정 없이 동작합니다.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{FontSwapError, IoContext, Result};

pub const CONFIG_FILE_NAME: &str = "fontswap.toml";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// 설치 디렉토리 (None이면 실행 파일이 있는 폴더)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_dir: Option<PathBuf>,
    /// 클라이언트 버전 폴더들이 모여 있는 루트 (None이면 OS 기본 위치)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub versions_root: Option<PathBuf>,
    /// 버전 폴더 기준 폰트 폴더 상대 경로
    pub fonts_subdir: String,
    /// 백업 컨테이너 폴더 이름. 존재 자체가 "이미 적용됨" 표시
    pub backup_container: String,
    /// 교체할 폰트 하나를 넣어두는 스테이징 폴더 이름
    pub staging_dir_name: String,
    /// 프리셋 폰트 라이브러리 폴더 이름
    pub preset_dir_name: String,
    /// 감시할 클라이언트 실행 파일 이름
    pub client_exe: String,
    pub check_interval_secs: u64,
    pub error_backoff_secs: u64,
    pub relaunch_grace_secs: u64,
    /// 이 접두사로 시작하는 폰트는 교체하지 않음 (대소문자 무시)
    pub emoji_prefix: String,
    pub font_extensions: Vec<String>,
    pub log_file_name: String,
    pub history_file_name: String,
    /// 대상 폴더에 잠금 파일을 만들어 워처와 수동 도구의 동시 작업을 막음
    pub lock_targets: bool,
    /// 시작 프로그램 폴더 (None이면 OS 기본 위치)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub startup_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            install_dir: None,
            versions_root: None,
            fonts_subdir: "content/fonts".to_string(),
            backup_container: "Fonts.old".to_string(),
            staging_dir_name: "PLACE YOUR CUSTOM FONT HERE".to_string(),
            preset_dir_name: "Fonts".to_string(),
            client_exe: "RobloxPlayerBeta.exe".to_string(),
            check_interval_secs: 15,
            error_backoff_secs: 60,
            relaunch_grace_secs: 3,
            emoji_prefix: "twemoji".to_string(),
            font_extensions: vec!["ttf".to_string(), "otf".to_string()],
            log_file_name: "font_manager.log".to_string(),
            history_file_name: "font_manager_history.txt".to_string(),
            lock_targets: true,
            startup_dir: None,
        }
    }
}

impl AppConfig {
    /// 기본 경로에서 로드 (없으면 기본값)
    pub fn load() -> Result<Self> {
        Self::load_from(&config_file_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).with_path("read config", path)?;
        let cfg: Self = toml::from_str(&content)
            .map_err(|e| FontSwapError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        cfg.validate()?;
        tracing::debug!("[Config] Loaded from {}", path.display());
        Ok(cfg)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_path("create config dir", parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| FontSwapError::InvalidConfig(e.to_string()))?;
        std::fs::write(path, content).with_path("write config", path)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.check_interval_secs == 0 {
            return Err(FontSwapError::InvalidConfig(
                "check_interval_secs must be at least 1".into(),
            ));
        }
        if self.error_backoff_secs == 0 {
            return Err(FontSwapError::InvalidConfig(
                "error_backoff_secs must be at least 1".into(),
            ));
        }
        if self.font_extensions.is_empty() {
            return Err(FontSwapError::InvalidConfig(
                "font_extensions must not be empty".into(),
            ));
        }
        if self.backup_container.is_empty() || self.client_exe.is_empty() {
            return Err(FontSwapError::InvalidConfig(
                "backup_container and client_exe must be set".into(),
            ));
        }
        Ok(())
    }

    pub fn install_dir(&self) -> PathBuf {
        self.install_dir.clone().unwrap_or_else(default_install_dir)
    }

    pub fn versions_root(&self) -> PathBuf {
        self.versions_root.clone().unwrap_or_else(default_versions_root)
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.install_dir().join(&self.staging_dir_name)
    }

    pub fn preset_dir(&self) -> PathBuf {
        self.install_dir().join(&self.preset_dir_name)
    }

    pub fn log_file(&self) -> PathBuf {
        self.install_dir().join(&self.log_file_name)
    }

    pub fn history_file(&self) -> PathBuf {
        self.install_dir().join(&self.history_file_name)
    }

    pub fn startup_dir(&self) -> Option<PathBuf> {
        self.startup_dir.clone().or_else(default_startup_dir)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }

    pub fn relaunch_grace(&self) -> Duration {
        Duration::from_secs(self.relaunch_grace_secs)
    }
}

/// 설정 파일 경로 결정
pub fn config_file_path() -> PathBuf {
    if let Ok(p) = std::env::var("FONTSWAP_CONFIG") {
        return PathBuf::from(p);
    }

    // 1. 실행 파일 옆 config/fontswap.toml
    if let Some(dir) = exe_dir() {
        let cfg = dir.join("config").join(CONFIG_FILE_NAME);
        if cfg.exists() {
            return cfg;
        }
        let cfg = dir.join(CONFIG_FILE_NAME);
        if cfg.exists() {
            return cfg;
        }
    }

    // 2. CWD의 config/fontswap.toml (없으면 생성용 기본 경로)
    PathBuf::from("config").join(CONFIG_FILE_NAME)
}

/// config set <key> <value>
pub fn set_config_value(path: &Path, key: &str, value: &str) -> Result<()> {
    let mut table: toml::value::Table = if path.exists() {
        let content = std::fs::read_to_string(path).with_path("read config", path)?;
        content
            .parse::<toml::Value>()
            .map_err(|e| FontSwapError::InvalidConfig(e.to_string()))?
            .as_table()
            .cloned()
            .unwrap_or_default()
    } else {
        toml::value::Table::new()
    };

    let toml_val = match key {
        "lock_targets" => toml::Value::Boolean(value.parse::<bool>().map_err(|_| {
            FontSwapError::InvalidConfig(format!("Invalid boolean value: '{}' (use true/false)", value))
        })?),
        "check_interval_secs" | "error_backoff_secs" | "relaunch_grace_secs" => {
            let n = value.parse::<u64>().map_err(|_| {
                FontSwapError::InvalidConfig(format!("Invalid integer value: '{}'", value))
            })?;
            toml::Value::Integer(n as i64)
        }
        "font_extensions" => toml::Value::Array(
            value
                .split(',')
                .map(|s| s.trim().trim_start_matches('.').to_lowercase())
                .filter(|s| !s.is_empty())
                .map(toml::Value::String)
                .collect(),
        ),
        "install_dir" | "versions_root" | "fonts_subdir" | "backup_container" | "staging_dir_name"
        | "preset_dir_name" | "client_exe" | "emoji_prefix" | "log_file_name"
        | "history_file_name" | "startup_dir" => toml::Value::String(value.to_string()),
        _ => {
            return Err(FontSwapError::InvalidConfig(format!(
                "Unknown config key: '{}'\nAvailable: install_dir, versions_root, fonts_subdir, \
                backup_container, staging_dir_name, preset_dir_name, client_exe, check_interval_secs, \
                error_backoff_secs, relaunch_grace_secs, emoji_prefix, font_extensions, log_file_name, \
                history_file_name, lock_targets, startup_dir",
                key
            )));
        }
    };

    table.insert(key.to_string(), toml_val);

    // 저장 전에 전체 설정으로 해석되는지 확인
    let merged: AppConfig = toml::Value::Table(table.clone())
        .try_into()
        .map_err(|e: toml::de::Error| FontSwapError::InvalidConfig(e.to_string()))?;
    merged.validate()?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_path("create config dir", parent)?;
    }
    let content = toml::to_string_pretty(&toml::Value::Table(table))
        .map_err(|e| FontSwapError::InvalidConfig(e.to_string()))?;
    std::fs::write(path, content).with_path("write config", path)?;
    Ok(())
}

fn exe_dir() -> Option<PathBuf> {
    std::env::current_exe().ok()?.parent().map(|p| p.to_path_buf())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE")
        .or_else(|| std::env::var_os("HOME"))
        .map(PathBuf::from)
}

fn default_install_dir() -> PathBuf {
    exe_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn default_versions_root() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Some(local) = std::env::var_os("LOCALAPPDATA") {
            return PathBuf::from(local).join("Roblox").join("Versions");
        }
    }
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("AppData")
        .join("Local")
        .join("Roblox")
        .join("Versions")
}

fn default_startup_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|appdata| {
            PathBuf::from(appdata)
                .join("Microsoft")
                .join("Windows")
                .join("Start Menu")
                .join("Programs")
                .join("Startup")
        })
    }
    #[cfg(not(target_os = "windows"))]
    {
        home_dir().map(|h| h.join(".config").join("autostart"))
    }
}
