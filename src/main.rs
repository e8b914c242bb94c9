#![cfg_attr(all(windows, not(debug_assertions)), windows_subsystem = "windows")]

use fontswap::config::AppConfig;
use fontswap::process_monitor::SystemClient;
use fontswap::{logging, prompt, source};
use fontswap::watcher::Watcher;

fn main() -> anyhow::Result<()> {
    // load()가 validate()까지 수행
    let cfg = AppConfig::load()?;

    if let Err(e) = logging::init_watcher(&cfg.log_file()) {
        logging::init_cli();
        tracing::warn!("File logging disabled: {}", e);
    }
    tracing::info!("Font manager watcher starting (v{})", env!("CARGO_PKG_VERSION"));

    // 스테이징 폴더가 없으면 미리 만들어 사용자가 폰트를 넣을 수 있게 함
    match source::resolve_source(&cfg.staging_dir()) {
        Ok(status) => tracing::info!("[Source] {}", status.describe()),
        Err(e) => tracing::warn!("[Source] {}", e),
    }

    let client = SystemClient::new(cfg.client_exe.clone(), cfg.relaunch_grace());
    let watcher = Watcher::from_config(&cfg, Box::new(client), prompt::default_prompt());

    // Ctrl-C가 오면 답을 기다리는 대화상자가 떠 있어도 바로 종료
    watcher.run_until_shutdown(cfg.check_interval(), cfg.error_backoff(), || async {
        let _ = tokio::signal::ctrl_c().await;
    })?;

    Ok(())
}
