//! 업데이트 감시 루프
//!
//! 일정 주기로 클라이언트 실행 여부와 버전 폴더를 확인합니다.
//!
//! - 실행 중: 폰트가 아직 교체되지 않은 최신 버전 하나를 골라 사용자에게 묻습니다.
//!   한 세션 안에서 같은 버전을 두 번 묻지 않습니다.
//! - 실행 중 → 종료 전환: "나중에"로 미뤄 둔 버전들을 교체합니다 (재시작 없음).
//!
//! 틱 하나는 블로킹 스레드에서 동기적으로 실행되고, 루프는 틱이 끝날 때까지 기다립니다.
//! 틱에서 새어 나온 에러나 패닉은 로그로 남기고 백오프 후 계속 돕니다.

use std::collections::BTreeSet;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::AppConfig;
use crate::engine::FontReplacer;
use crate::error::{FontSwapError, Result};
use crate::process_monitor::ClientProcess;
use crate::prompt::{UpdateChoice, UpdatePrompt};
use crate::scanner::{latest, VersionId, VersionScanner};
use crate::source::{resolve_source, SourceStatus};

/// 프로세스 수명 동안만 유지되는 세션 상태
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatcherState {
    /// 이번 세션에서 이미 처리(또는 건너뛰기)한 버전
    pub session_ignored: BTreeSet<VersionId>,
    /// 클라이언트 종료 후 교체할 버전
    pub pending: BTreeSet<VersionId>,
    pub was_running: bool,
}

/// 틱 한 번의 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub running: bool,
    pub started: bool,
    pub exited: bool,
    pub prompted: Option<(VersionId, UpdateChoice)>,
    pub replaced: Vec<VersionId>,
    pub failed: Vec<VersionId>,
    pub restarted: bool,
    pub source_unavailable: bool,
}

#[derive(Debug)]
pub enum TickOutcome {
    Completed(TickReport),
    Failed(FontSwapError),
    Panicked(String),
}

pub struct Watcher {
    scanner: VersionScanner,
    replacer: FontReplacer,
    staging_dir: PathBuf,
    client: Box<dyn ClientProcess>,
    prompt: Box<dyn UpdatePrompt>,
    state: WatcherState,
}

impl Watcher {
    pub fn new(
        scanner: VersionScanner,
        replacer: FontReplacer,
        staging_dir: impl Into<PathBuf>,
        client: Box<dyn ClientProcess>,
        prompt: Box<dyn UpdatePrompt>,
    ) -> Self {
        Self {
            scanner,
            replacer,
            staging_dir: staging_dir.into(),
            client,
            prompt,
            state: WatcherState::default(),
        }
    }

    pub fn from_config(cfg: &AppConfig, client: Box<dyn ClientProcess>, prompt: Box<dyn UpdatePrompt>) -> Self {
        Self::new(
            VersionScanner::from_config(cfg),
            FontReplacer::from_config(cfg),
            cfg.staging_dir(),
            client,
            prompt,
        )
    }

    pub fn state(&self) -> &WatcherState {
        &self.state
    }

    pub fn tick(&mut self) -> Result<TickReport> {
        let running = self.client.is_running();
        let mut report = TickReport {
            running,
            ..Default::default()
        };

        let was_running = self.state.was_running;
        self.state.was_running = running;

        if running {
            if !was_running {
                tracing::info!("[Watcher] Client is running. Checking for updates...");
                report.started = true;
            }
            self.check_updates(&mut report)?;
        } else if was_running {
            tracing::info!("[Watcher] Client has been closed.");
            report.exited = true;
            self.drain_pending(&mut report)?;
        }

        Ok(report)
    }

    fn check_updates(&mut self, report: &mut TickReport) -> Result<()> {
        let updatable = self.scanner.updatable(&self.state.session_ignored);
        if updatable.is_empty() {
            return Ok(());
        }

        let source = match resolve_source(&self.staging_dir)? {
            SourceStatus::Ready(path) => path,
            other => {
                tracing::warn!(
                    "[Watcher] Update detected, but no single source font is ready ({}). Ignoring {} version(s) for this session.",
                    other.describe(),
                    updatable.len()
                );
                self.state.session_ignored.extend(updatable);
                report.source_unavailable = true;
                return Ok(());
            }
        };

        let Some(version) = latest(&updatable).cloned() else {
            return Ok(());
        };
        tracing::info!("[Watcher] New update detected: {}", version);

        let choice = self.prompt.ask(&version);
        report.prompted = Some((version.clone(), choice));

        match choice {
            UpdateChoice::Now => {
                tracing::info!("[Watcher] User chose 'Update Now' for {}.", version);
                if self.replacer.replace_fonts(&self.scanner.fonts_dir(&version), &source) {
                    report.replaced.push(version.clone());
                    match self.client.restart(&self.scanner.version_dir(&version)) {
                        Ok(()) => report.restarted = true,
                        Err(e) => tracing::error!("[Watcher] Failed to restart client: {}", e),
                    }
                } else {
                    report.failed.push(version.clone());
                }
            }
            UpdateChoice::Later => {
                tracing::info!("[Watcher] Update for {} deferred until the client closes.", version);
                self.state.pending.insert(version.clone());
            }
            UpdateChoice::Cancel => {
                tracing::info!("[Watcher] User skipped {} for this session.", version);
            }
        }

        self.state.session_ignored.insert(version);
        Ok(())
    }

    fn drain_pending(&mut self, report: &mut TickReport) -> Result<()> {
        if self.state.pending.is_empty() {
            return Ok(());
        }

        let source = match resolve_source(&self.staging_dir)? {
            SourceStatus::Ready(path) => path,
            other => {
                tracing::warn!(
                    "[Watcher] Cannot apply {} pending update(s): {}. Will retry after the next client exit.",
                    self.state.pending.len(),
                    other.describe()
                );
                report.source_unavailable = true;
                return Ok(());
            }
        };

        tracing::info!("[Watcher] Applying {} pending update(s)...", self.state.pending.len());
        for version in std::mem::take(&mut self.state.pending) {
            let fonts_dir = self.scanner.fonts_dir(&version);
            if !fonts_dir.is_dir() {
                tracing::warn!("[Watcher] Pending version {} no longer has a fonts folder, skipping.", version);
                report.failed.push(version);
                continue;
            }
            if self.replacer.replace_fonts(&fonts_dir, &source) {
                report.replaced.push(version);
            } else {
                report.failed.push(version);
            }
        }
        Ok(())
    }

    /// 블로킹 스레드에서 틱 한 번 실행. 에러와 패닉을 결과로 돌려주고 워처를 되돌려 받음
    pub async fn tick_blocking(self) -> std::result::Result<(Self, TickOutcome), tokio::task::JoinError> {
        tokio::task::spawn_blocking(move || {
            let mut watcher = self;
            let outcome = match catch_unwind(AssertUnwindSafe(|| watcher.tick())) {
                Ok(Ok(report)) => TickOutcome::Completed(report),
                Ok(Err(e)) => TickOutcome::Failed(e),
                Err(payload) => TickOutcome::Panicked(panic_message(payload.as_ref())),
            };
            (watcher, outcome)
        })
        .await
    }

    /// 감시 루프. 정상 틱 후 `interval`, 실패 후 `backoff` 만큼 쉼
    pub async fn run(self, interval: Duration, backoff: Duration) {
        tracing::info!(
            "[Watcher] Started. Monitoring {} every {}s",
            self.scanner.versions_root().display(),
            interval.as_secs()
        );

        let mut watcher = self;
        loop {
            let (next, outcome) = match watcher.tick_blocking().await {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::error!("[Watcher] Tick task was aborted: {}", e);
                    return;
                }
            };
            watcher = next;

            let delay = delay_after(outcome, interval, backoff);
            tokio::time::sleep(delay).await;
        }
    }

    /// 자체 런타임에서 `run`을 돌리다가 `shutdown` 퓨처가 끝나면 반환.
    /// 프롬프트나 재시작 대기로 막힌 블로킹 틱은 기다리지 않음
    pub fn run_until_shutdown<F, Fut>(self, interval: Duration, backoff: Duration, shutdown: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()>,
    {
        let runtime = tokio::runtime::Runtime::new().map_err(|e| FontSwapError::Internal(e.into()))?;
        runtime.block_on(async move {
            tokio::select! {
                _ = self.run(interval, backoff) => {}
                _ = shutdown() => {
                    tracing::info!("[Watcher] Shutdown signal received, exiting");
                }
            }
        });
        runtime.shutdown_background();
        Ok(())
    }
}

/// 틱 결과를 로그로 남기고 다음 틱까지 쉴 시간을 돌려줌
fn delay_after(outcome: TickOutcome, interval: Duration, backoff: Duration) -> Duration {
    match outcome {
        TickOutcome::Completed(report) => {
            tracing::debug!("[Watcher] Tick: {:?}", report);
            interval
        }
        TickOutcome::Failed(e) if e.is_recoverable() => {
            tracing::warn!("[Watcher] Tick failed ({}), will retry: {}", e.error_code(), e);
            backoff
        }
        TickOutcome::Failed(e) => {
            tracing::error!(
                "[Watcher] An unexpected error occurred in the main loop ({}): {}",
                e.error_code(),
                e
            );
            backoff
        }
        TickOutcome::Panicked(msg) => {
            tracing::error!("[Watcher] Main loop panicked: {}", msg);
            backoff
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::fs;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[derive(Clone, Default)]
    struct FakeClient {
        running: Arc<Mutex<bool>>,
        restarts: Arc<Mutex<Vec<PathBuf>>>,
        panic_on_check: bool,
    }

    impl FakeClient {
        fn set_running(&self, running: bool) {
            *self.running.lock().unwrap() = running;
        }
    }

    impl ClientProcess for FakeClient {
        fn is_running(&mut self) -> bool {
            if self.panic_on_check {
                panic!("process table unavailable");
            }
            *self.running.lock().unwrap()
        }

        fn restart(&mut self, version_dir: &Path) -> Result<()> {
            self.restarts.lock().unwrap().push(version_dir.to_path_buf());
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct ScriptedPrompt {
        answers: Arc<Mutex<VecDeque<UpdateChoice>>>,
        asked: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedPrompt {
        fn with(answers: &[UpdateChoice]) -> Self {
            let p = Self::default();
            p.answers.lock().unwrap().extend(answers.iter().copied());
            p
        }

        fn asked(&self) -> Vec<String> {
            self.asked.lock().unwrap().clone()
        }
    }

    impl UpdatePrompt for ScriptedPrompt {
        fn ask(&mut self, version: &str) -> UpdateChoice {
            self.asked.lock().unwrap().push(version.to_string());
            self.answers.lock().unwrap().pop_front().unwrap_or(UpdateChoice::Cancel)
        }
    }

    struct Env {
        tmp: TempDir,
        scanner: VersionScanner,
        staging: PathBuf,
    }

    impl Env {
        fn new(versions: &[&str]) -> Self {
            let tmp = TempDir::new().unwrap();
            let scanner = VersionScanner::new(tmp.path().join("Versions"), "content/fonts", "Fonts.old");
            for v in versions {
                let fonts = scanner.fonts_dir(v);
                fs::create_dir_all(&fonts).unwrap();
                fs::write(fonts.join("Arial.ttf"), b"ARIAL").unwrap();
            }
            let staging = tmp.path().join("staging");
            fs::create_dir_all(&staging).unwrap();
            fs::write(staging.join("Custom.ttf"), b"CUSTOM").unwrap();
            Self { tmp, scanner, staging }
        }

        fn watcher(&self, client: &FakeClient, prompt: &ScriptedPrompt) -> Watcher {
            Watcher::new(
                self.scanner.clone(),
                FontReplacer::new("Fonts.old", vec!["ttf".into(), "otf".into()], "twemoji"),
                &self.staging,
                Box::new(client.clone()),
                Box::new(prompt.clone()),
            )
        }

        fn font(&self, version: &str) -> Vec<u8> {
            fs::read(self.scanner.fonts_dir(version).join("Arial.ttf")).unwrap()
        }
    }

    #[test]
    fn idle_client_does_nothing() {
        let env = Env::new(&["version-a"]);
        let client = FakeClient::default();
        let prompt = ScriptedPrompt::default();
        let mut w = env.watcher(&client, &prompt);

        let report = w.tick().unwrap();
        assert!(!report.running);
        assert!(prompt.asked().is_empty());
        assert!(env.scanner.needs_update("version-a"));
    }

    #[test]
    fn update_now_replaces_and_restarts() {
        let env = Env::new(&["version-a"]);
        let client = FakeClient::default();
        client.set_running(true);
        let prompt = ScriptedPrompt::with(&[UpdateChoice::Now]);
        let mut w = env.watcher(&client, &prompt);

        let report = w.tick().unwrap();
        assert!(report.started);
        assert_eq!(report.replaced, vec!["version-a"]);
        assert!(report.restarted);
        assert_eq!(env.font("version-a"), b"CUSTOM");
        assert_eq!(*client.restarts.lock().unwrap(), vec![env.scanner.version_dir("version-a")]);
        assert!(w.state().session_ignored.contains("version-a"));
    }

    #[test]
    fn cancelled_version_is_not_asked_again() {
        let env = Env::new(&["version-a"]);
        let client = FakeClient::default();
        client.set_running(true);
        let prompt = ScriptedPrompt::with(&[UpdateChoice::Cancel]);
        let mut w = env.watcher(&client, &prompt);

        w.tick().unwrap();
        w.tick().unwrap();
        client.set_running(false);
        w.tick().unwrap();
        client.set_running(true);
        w.tick().unwrap();

        assert_eq!(prompt.asked(), vec!["version-a"]);
        assert!(env.scanner.needs_update("version-a"));
    }

    #[test]
    fn later_is_applied_once_after_exit() {
        let env = Env::new(&["version-a"]);
        let client = FakeClient::default();
        client.set_running(true);
        let prompt = ScriptedPrompt::with(&[UpdateChoice::Later]);
        let mut w = env.watcher(&client, &prompt);

        w.tick().unwrap();
        assert!(w.state().pending.contains("version-a"));
        assert_eq!(env.font("version-a"), b"ARIAL");

        // 계속 실행 중이면 아무 일도 없음
        let report = w.tick().unwrap();
        assert!(report.replaced.is_empty());

        client.set_running(false);
        let report = w.tick().unwrap();
        assert!(report.exited);
        assert_eq!(report.replaced, vec!["version-a"]);
        assert!(w.state().pending.is_empty());
        assert_eq!(env.font("version-a"), b"CUSTOM");
        assert!(client.restarts.lock().unwrap().is_empty());

        let report = w.tick().unwrap();
        assert!(report.replaced.is_empty());
        assert_eq!(prompt.asked().len(), 1);
    }

    #[test]
    fn pending_ends_empty_even_when_replacement_fails() {
        let env = Env::new(&["version-a", "version-b"]);
        let client = FakeClient::default();
        client.set_running(true);
        let prompt = ScriptedPrompt::with(&[UpdateChoice::Later, UpdateChoice::Later]);
        let mut w = env.watcher(&client, &prompt);

        w.tick().unwrap();
        w.tick().unwrap();
        assert_eq!(w.state().pending.len(), 2);

        fs::remove_dir_all(env.scanner.fonts_dir("version-b")).unwrap();
        client.set_running(false);
        let report = w.tick().unwrap();
        assert_eq!(report.replaced, vec!["version-a"]);
        assert_eq!(report.failed, vec!["version-b"]);
        assert!(w.state().pending.is_empty());
    }

    #[test]
    fn ambiguous_source_ignores_all_updatable() {
        let env = Env::new(&["version-a", "version-b"]);
        fs::write(env.staging.join("Second.ttf"), b"2").unwrap();
        let client = FakeClient::default();
        client.set_running(true);
        let prompt = ScriptedPrompt::default();
        let mut w = env.watcher(&client, &prompt);

        let report = w.tick().unwrap();
        assert!(report.source_unavailable);
        assert!(prompt.asked().is_empty());
        assert_eq!(w.state().session_ignored.len(), 2);

        // 폰트를 하나로 정리해도 이번 세션에서는 다시 묻지 않음
        fs::remove_file(env.staging.join("Second.ttf")).unwrap();
        w.tick().unwrap();
        assert!(prompt.asked().is_empty());
    }

    #[test]
    fn pending_is_kept_when_source_disappears() {
        let env = Env::new(&["version-a"]);
        let client = FakeClient::default();
        client.set_running(true);
        let prompt = ScriptedPrompt::with(&[UpdateChoice::Later]);
        let mut w = env.watcher(&client, &prompt);
        w.tick().unwrap();

        fs::remove_file(env.staging.join("Custom.ttf")).unwrap();
        client.set_running(false);
        let report = w.tick().unwrap();
        assert!(report.source_unavailable);
        assert!(w.state().pending.contains("version-a"));

        fs::write(env.staging.join("Custom.ttf"), b"CUSTOM").unwrap();
        client.set_running(true);
        w.tick().unwrap();
        client.set_running(false);
        let report = w.tick().unwrap();
        assert_eq!(report.replaced, vec!["version-a"]);
    }

    #[test]
    fn newest_version_first_then_next_tick() {
        let env = Env::new(&["version-A", "version-B"]);
        let client = FakeClient::default();
        client.set_running(true);
        let prompt = ScriptedPrompt::with(&[UpdateChoice::Now, UpdateChoice::Now]);
        let mut w = env.watcher(&client, &prompt);

        let first = w.tick().unwrap();
        assert_eq!(first.prompted.map(|(v, _)| v).as_deref(), Some("version-B"));
        let second = w.tick().unwrap();
        assert_eq!(second.prompted.map(|(v, _)| v).as_deref(), Some("version-A"));
        assert_eq!(prompt.asked(), vec!["version-B", "version-A"]);
        assert!(env.tmp.path().join("Versions").is_dir());
    }

    #[tokio::test]
    async fn panicking_tick_is_caught_and_watcher_survives() {
        let env = Env::new(&["version-a"]);
        let client = FakeClient {
            panic_on_check: true,
            ..Default::default()
        };
        let prompt = ScriptedPrompt::default();
        let w = env.watcher(&client, &prompt);

        let (w, outcome) = w.tick_blocking().await.unwrap();
        match outcome {
            TickOutcome::Panicked(msg) => assert!(msg.contains("process table unavailable")),
            other => panic!("expected panic outcome, got {:?}", other),
        }
        assert_eq!(w.state(), &WatcherState::default());
    }

    #[test]
    fn failures_back_off_and_completed_ticks_use_interval() {
        let interval = Duration::from_secs(15);
        let backoff = Duration::from_secs(60);

        let done = TickOutcome::Completed(TickReport::default());
        assert_eq!(delay_after(done, interval, backoff), interval);

        let recoverable = FontSwapError::SourceUnavailable {
            dir: PathBuf::from("staging"),
            reason: "missing".into(),
        };
        assert!(recoverable.is_recoverable());
        assert_eq!(delay_after(TickOutcome::Failed(recoverable), interval, backoff), backoff);

        let fatal = FontSwapError::InvalidConfig("bad".into());
        assert_eq!(delay_after(TickOutcome::Failed(fatal), interval, backoff), backoff);
        assert_eq!(delay_after(TickOutcome::Panicked("boom".into()), interval, backoff), backoff);
    }

    /// 대화상자에 답하지 않는 사용자
    struct UnansweredPrompt;

    impl UpdatePrompt for UnansweredPrompt {
        fn ask(&mut self, _version: &str) -> UpdateChoice {
            std::thread::sleep(Duration::from_secs(30));
            UpdateChoice::Cancel
        }
    }

    #[test]
    fn shutdown_does_not_wait_for_unanswered_prompt() {
        let env = Env::new(&["version-a"]);
        let client = FakeClient::default();
        client.set_running(true);
        let w = Watcher::new(
            env.scanner.clone(),
            FontReplacer::new("Fonts.old", vec!["ttf".into()], "twemoji"),
            &env.staging,
            Box::new(client),
            Box::new(UnansweredPrompt),
        );

        let started = std::time::Instant::now();
        w.run_until_shutdown(Duration::from_millis(10), Duration::from_millis(10), || {
            tokio::time::sleep(Duration::from_millis(200))
        })
        .unwrap();
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(env.font("version-a"), b"ARIAL");
    }
}
