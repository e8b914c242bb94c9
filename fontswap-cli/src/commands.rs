use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use fontswap::config::{config_file_path, set_config_value, AppConfig};
use fontswap::engine::{EmojiPolicy, FontReplacer};
use fontswap::history::DirectoryHistory;
use fontswap::installer::{self, InstallLayout, WATCHER_BIN_NAME};
use fontswap::process_monitor;
use fontswap::restore::Restorer;
use fontswap::scanner::{VersionScanner, VersionState};
use fontswap::source;

// ═══════════════════════════════════════════════════════
// 인자 처리 헬퍼
// ═══════════════════════════════════════════════════════

/// `--`로 시작하지 않는 인자들 (값을 받는 플래그의 값은 제외)
fn positionals<'a>(args: &[&'a str], valued_flags: &[&str]) -> Vec<&'a str> {
    let mut out = Vec::new();
    let mut skip_next = false;
    for arg in args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if valued_flags.contains(arg) {
            skip_next = true;
        } else if !arg.starts_with("--") {
            out.push(*arg);
        }
    }
    out
}

fn flag_value<'a>(args: &[&'a str], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| *a == flag)
        .and_then(|i| args.get(i + 1).copied())
}

fn confirm(question: &str) -> bool {
    print!("{} [y/N] ", question);
    let _ = io::stdout().flush();
    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(_) => matches!(line.trim().to_lowercase().as_str(), "y" | "yes"),
        Err(_) => false,
    }
}

fn exe_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn watcher_exe_path() -> PathBuf {
    exe_dir().join(format!("{}{}", WATCHER_BIN_NAME, std::env::consts::EXE_SUFFIX))
}

/// 이름(파일명 또는 확장자 뺀 이름, 대소문자 무시) 또는 경로로 폰트 찾기
pub(crate) fn find_font(presets: &[PathBuf], query: &str) -> Option<PathBuf> {
    let direct = Path::new(query);
    if direct.is_file() {
        return Some(direct.to_path_buf());
    }
    presets
        .iter()
        .find(|p| {
            let name = p.file_name().map(|n| n.to_string_lossy().to_lowercase());
            let stem = p.file_stem().map(|n| n.to_string_lossy().to_lowercase());
            let q = query.to_lowercase();
            name.as_deref() == Some(q.as_str()) || stem.as_deref() == Some(q.as_str())
        })
        .cloned()
}

// ═══════════════════════════════════════════════════════
// 명령어 핸들러
// ═══════════════════════════════════════════════════════

pub fn cmd_status() -> anyhow::Result<()> {
    let cfg = AppConfig::load()?;
    let scanner = VersionScanner::from_config(&cfg);
    let statuses = scanner.version_statuses();
    let needs_update = statuses
        .iter()
        .filter(|s| s.state == VersionState::NeedsUpdate)
        .count();
    let watcher_running = !process_monitor::find_by_cmd_pattern(WATCHER_BIN_NAME).is_empty();

    println!("📋 Font Manager Status");
    println!("─────────────────────────────────────────────");
    println!("  Install dir:    {}", cfg.install_dir().display());
    println!("  Source font:    {}", source::resolve_source(&cfg.staging_dir())?.describe());
    println!("  Versions root:  {}", scanner.versions_root().display());
    println!("  Versions:       {} ({} need a font update)", statuses.len(), needs_update);
    println!("  Client running: {}", process_monitor::is_process_running(&cfg.client_exe));
    println!("  Watcher:        {}", if watcher_running { "running" } else { "not running" });
    println!("  Log file:       {}", cfg.log_file().display());
    Ok(())
}

pub fn cmd_versions(args: &[&str]) -> anyhow::Result<()> {
    let cfg = AppConfig::load()?;
    let statuses = VersionScanner::from_config(&cfg).version_statuses();

    if args.contains(&"--json") {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    if statuses.is_empty() {
        println!("  No client versions found in {}", cfg.versions_root().display());
        return Ok(());
    }
    for status in &statuses {
        let state = match &status.state {
            VersionState::NoFontsDir => "no fonts folder".to_string(),
            VersionState::NeedsUpdate => "needs update".to_string(),
            VersionState::Patched { sessions } => format!("patched ({} backup(s))", sessions),
        };
        println!("  {:<40} {}", status.version, state);
    }
    Ok(())
}

pub fn cmd_replace(args: &[&str]) -> anyhow::Result<()> {
    let cfg = AppConfig::load()?;
    let Some(dir) = positionals(args, &[]).first().copied() else {
        anyhow::bail!("Usage: fontswap replace <dir> [--yes] [--skip-emoji]");
    };
    let target = Restorer::from_config(&cfg).resolve_target(Path::new(dir));
    if !target.is_dir() {
        anyhow::bail!("Folder not found: {}", target.display());
    }
    let font = source::require_source_font(&cfg.staging_dir())?;

    let question = format!(
        "Replace fonts in '{}' with '{}'?\nOriginal files will be moved to a '{}' backup folder.",
        target.display(),
        font.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default(),
        cfg.backup_container
    );
    if !args.contains(&"--yes") && !confirm(&question) {
        println!("  Cancelled.");
        return Ok(());
    }

    let policy = if args.contains(&"--skip-emoji") {
        EmojiPolicy::LeaveInPlace
    } else {
        EmojiPolicy::CopyBack
    };
    let report = FontReplacer::from_config(&cfg)
        .with_emoji_policy(policy)
        .replace(&target, &font)?;

    DirectoryHistory::load(cfg.history_file()).record(&target);

    println!("✓ Replaced {} font(s), kept {} emoji font(s).", report.replaced, report.emoji_kept);
    println!("  Backup: {}", report.backup_dir.display());
    Ok(())
}

pub fn cmd_backups(args: &[&str]) -> anyhow::Result<()> {
    let cfg = AppConfig::load()?;
    let Some(dir) = positionals(args, &[]).first().copied() else {
        anyhow::bail!("Usage: fontswap backups <dir> [--json]");
    };
    let restorer = Restorer::from_config(&cfg);
    let target = restorer.resolve_target(Path::new(dir));
    let sessions = restorer.list_sessions(&target)?;

    if args.contains(&"--json") {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }
    if sessions.is_empty() {
        println!("  No backups found in {}", restorer.container_dir(&target).display());
        return Ok(());
    }
    for (i, session) in sessions.iter().enumerate() {
        let files = std::fs::read_dir(restorer.session_dir(&target, session))
            .map(|it| it.count())
            .unwrap_or(0);
        let marker = if i == 0 { " (latest)" } else { "" };
        println!("  • {}  {} file(s){}", session, files, marker);
    }
    Ok(())
}

pub fn cmd_undo(args: &[&str]) -> anyhow::Result<()> {
    let cfg = AppConfig::load()?;
    let pos = positionals(args, &[]);
    let Some(dir) = pos.first().copied() else {
        anyhow::bail!("Usage: fontswap undo <dir> [<session>] [--yes] [--cleanup]");
    };
    let restorer = Restorer::from_config(&cfg);
    let target = restorer.resolve_target(Path::new(dir));

    let session = match pos.get(1) {
        Some(s) => s.to_string(),
        None => match restorer.latest_session(&target)? {
            Some(s) => s,
            None => anyhow::bail!(
                "No backup found. Expected a '{}' folder in {}",
                cfg.backup_container,
                target.display()
            ),
        },
    };
    let session_dir = restorer.session_dir(&target, &session);

    let question = format!(
        "Restore original fonts from backup '{}'?\nThis will overwrite the current fonts in '{}'.",
        session,
        target.display()
    );
    if !args.contains(&"--yes") && !confirm(&question) {
        println!("  Cancelled.");
        return Ok(());
    }

    let restored = restorer.restore(&session_dir, &target)?;
    println!("✓ Restored {} file(s) from {}", restored, session);

    if args.contains(&"--cleanup") {
        restorer.remove_session(&session_dir)?;
        println!("  Removed empty backup folder {}", session);
        if restorer.prune_container(&target) {
            println!("  Removed '{}' — the watcher will offer this folder again.", cfg.backup_container);
        }
    }
    Ok(())
}

pub fn cmd_history() -> anyhow::Result<()> {
    let cfg = AppConfig::load()?;
    let history = DirectoryHistory::load(cfg.history_file());
    if history.entries().is_empty() {
        println!("  No folders recorded yet.");
    }
    for entry in history.entries() {
        println!("  • {}", entry);
    }
    Ok(())
}

pub fn cmd_fonts() -> anyhow::Result<()> {
    let cfg = AppConfig::load()?;
    let presets = source::list_presets(&cfg.preset_dir(), &cfg.font_extensions)?;
    let active = source::get_source_font(&cfg.staging_dir())
        .and_then(|p| p.file_name().map(|n| n.to_os_string()));

    if presets.is_empty() {
        println!("  No preset fonts in {}", cfg.preset_dir().display());
        return Ok(());
    }
    for font in &presets {
        let name = font.file_name().map(|n| n.to_os_string());
        let marker = if name.is_some() && name == active { "  ← active" } else { "" };
        println!("  • {}{}", font.file_name().map(|n| n.to_string_lossy()).unwrap_or_default(), marker);
    }
    Ok(())
}

pub fn cmd_use_font(args: &[&str]) -> anyhow::Result<()> {
    let cfg = AppConfig::load()?;
    let Some(query) = args.first().copied() else {
        anyhow::bail!("Usage: fontswap use-font <name|path>");
    };
    let presets = source::list_presets(&cfg.preset_dir(), &cfg.font_extensions)?;
    let Some(font) = find_font(&presets, query) else {
        anyhow::bail!("Font not found: '{}'. Run 'fontswap fonts' to list presets.", query);
    };
    let dest = source::set_active_font(&cfg.staging_dir(), &font)?;
    println!("✓ Active font: {}", dest.display());
    Ok(())
}

pub fn cmd_install(args: &[&str]) -> anyhow::Result<()> {
    let cfg = AppConfig::load()?;
    let layout = InstallLayout::from_config(&cfg, watcher_exe_path());
    let from = flag_value(args, "--from").map(PathBuf::from).unwrap_or_else(exe_dir);

    println!("⏳ Installing to {}...", layout.install_dir.display());
    let report = installer::install(&layout, Some(&from))?;

    println!("✓ Installation complete.");
    println!("  Preset fonts imported: {}", report.presets_imported);
    if report.archives_skipped > 0 {
        println!("  ⚠ {} archive(s) could not be read", report.archives_skipped);
    }
    match &report.startup_entry {
        Some(entry) => println!("  Startup entry: {}", entry.display()),
        None => println!("  ⚠ Startup folder unknown; start '{}' manually.", layout.watcher_exe.display()),
    }
    println!();
    println!("💡 Put one font into '{}' or run 'fontswap use-font <name>'.", layout.staging_dir.display());
    Ok(())
}

pub fn cmd_uninstall(args: &[&str]) -> anyhow::Result<()> {
    let cfg = AppConfig::load()?;
    let layout = InstallLayout::from_config(&cfg, watcher_exe_path());

    if !args.contains(&"--yes") && !confirm("Stop the font watcher and remove it from startup?") {
        println!("  Cancelled.");
        return Ok(());
    }

    let report = installer::uninstall(&layout)?;
    println!("✓ Stopped {} watcher process(es).", report.terminated);
    if let Some(entry) = report.startup_removed {
        println!("  Removed startup entry {}", entry.display());
    }
    println!("  Files in {} were left in place.", layout.install_dir.display());
    Ok(())
}

pub fn cmd_config(args: &[&str]) -> anyhow::Result<()> {
    let path = config_file_path();
    match args.first().copied() {
        Some("set") if args.len() >= 3 => {
            let key = args[1];
            let value = args[2..].join(" ");
            set_config_value(&path, key, &value)?;
            println!("✓ {} = {}", key, value);
        }
        Some("set") => {
            eprintln!("Usage: fontswap config set <key> <value>");
            eprintln!("Keys: install_dir, versions_root, fonts_subdir, backup_container, staging_dir_name,");
            eprintln!("      preset_dir_name, client_exe, check_interval_secs, error_backoff_secs,");
            eprintln!("      relaunch_grace_secs, emoji_prefix, font_extensions, log_file_name,");
            eprintln!("      history_file_name, lock_targets, startup_dir");
        }
        _ => {
            let cfg = AppConfig::load()?;
            println!("📋 Configuration");
            println!("─────────────────────────────────────────────");
            println!("  install_dir:         {}", cfg.install_dir().display());
            println!("  versions_root:       {}", cfg.versions_root().display());
            println!("  fonts_subdir:        {}", cfg.fonts_subdir);
            println!("  backup_container:    {}", cfg.backup_container);
            println!("  staging_dir_name:    {}", cfg.staging_dir_name);
            println!("  preset_dir_name:     {}", cfg.preset_dir_name);
            println!("  client_exe:          {}", cfg.client_exe);
            println!("  check_interval_secs: {}", cfg.check_interval_secs);
            println!("  error_backoff_secs:  {}", cfg.error_backoff_secs);
            println!("  relaunch_grace_secs: {}", cfg.relaunch_grace_secs);
            println!("  emoji_prefix:        {}", cfg.emoji_prefix);
            println!("  font_extensions:     {}", cfg.font_extensions.join(", "));
            println!("  lock_targets:        {}", cfg.lock_targets);
            println!(
                "  startup_dir:         {}",
                cfg.startup_dir().map(|p| p.display().to_string()).unwrap_or_else(|| "(unknown)".into())
            );
            println!();
            println!("  Config file: {}", path.display());
            println!();
            println!("  Change with: fontswap config set <key> <value>");
        }
    }
    Ok(())
}
