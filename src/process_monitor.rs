use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use sysinfo::{Pid, Signal, System};

use crate::error::{FontSwapError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunningProcess {
    pub pid: u32,
    pub name: String,
    pub executable_path: Option<String>,
    /// 프로세스 커맨드라인 인수 (예: ["fontswap-watcher.exe", "--config", "..."])
    #[serde(default)]
    pub cmd: Vec<String>,
}

/// 실행 중인 모든 프로세스 목록 (호출 시점 스냅샷)
pub fn get_running_processes() -> Vec<RunningProcess> {
    let mut sys = System::new();
    sys.refresh_processes();

    let processes: Vec<RunningProcess> = sys
        .processes()
        .iter()
        .map(|(pid, process)| RunningProcess {
            pid: pid.as_u32(),
            name: process.name().to_string(),
            executable_path: process.exe().and_then(|p| p.to_str()).map(String::from),
            cmd: process.cmd().to_vec(),
        })
        .collect();

    tracing::trace!("Found {} running processes", processes.len());
    processes
}

/// 실행 파일 이름이 정확히 일치하는 프로세스 (대소문자 무시)
pub fn find_by_name(name: &str) -> Vec<RunningProcess> {
    get_running_processes()
        .into_iter()
        .filter(|p| p.name.eq_ignore_ascii_case(name))
        .collect()
}

/// 커맨드라인 전체 문자열에 패턴이 포함된 프로세스 (현재 프로세스 제외)
///
/// 인스톨러가 백그라운드 워처를 찾아 종료할 때 사용합니다.
pub fn find_by_cmd_pattern(pattern: &str) -> Vec<RunningProcess> {
    let pattern = pattern.to_lowercase();
    let me = std::process::id();
    get_running_processes()
        .into_iter()
        .filter(|p| p.pid != me)
        .filter(|p| {
            let cmdline = p.cmd.join(" ").to_lowercase();
            cmdline.contains(&pattern) || p.name.to_lowercase().contains(&pattern)
        })
        .collect()
}

/// 특정 PID가 실행 중인지 확인
pub fn is_running(pid: u32) -> bool {
    let mut sys = System::new();
    sys.refresh_processes();
    sys.process(Pid::from_u32(pid)).is_some()
}

pub fn is_process_running(name: &str) -> bool {
    !find_by_name(name).is_empty()
}

/// PID 목록을 종료 (가능하면 SIGTERM, 아니면 강제 종료). 종료 신호를 보낸 개수 반환
pub fn terminate_pids(pids: &[u32]) -> usize {
    let mut sys = System::new();
    sys.refresh_processes();

    let mut terminated = 0;
    for pid in pids {
        let Some(process) = sys.process(Pid::from_u32(*pid)) else {
            // 이미 종료됨
            continue;
        };
        let sent = process.kill_with(Signal::Term).unwrap_or_else(|| process.kill());
        if sent {
            tracing::info!("[Process] Closed {} (PID: {})", process.name(), pid);
            terminated += 1;
        } else {
            tracing::warn!("[Process] Failed to terminate {} (PID: {})", process.name(), pid);
        }
    }
    terminated
}

/// 이름이 일치하는 모든 프로세스를 종료
pub fn terminate_by_name(name: &str) -> usize {
    let pids: Vec<u32> = find_by_name(name).into_iter().map(|p| p.pid).collect();
    terminate_pids(&pids)
}

/// 클라이언트 실행 파일을 분리된 프로세스로 실행
pub fn launch(exe_path: &Path) -> Result<u32> {
    if !exe_path.is_file() {
        return Err(FontSwapError::ClientExecutableMissing(exe_path.to_path_buf()));
    }
    let mut cmd = std::process::Command::new(exe_path);
    if let Some(dir) = exe_path.parent() {
        cmd.current_dir(dir);
    }
    let child = cmd.spawn().map_err(|source| FontSwapError::Spawn {
        path: exe_path.to_path_buf(),
        source,
    })?;
    Ok(child.id())
}

/// 실행 중인 클라이언트를 모두 종료하고, 유예 시간 후 새 버전 폴더의 실행 파일로 재실행
pub fn terminate_and_relaunch(exe_name: &str, version_dir: &Path, grace: Duration) -> Result<u32> {
    tracing::info!("[Process] Attempting to restart {}...", exe_name);
    let closed = terminate_by_name(exe_name);
    tracing::debug!("[Process] Sent terminate to {} process(es)", closed);

    std::thread::sleep(grace);

    let exe_path = version_dir.join(exe_name);
    let pid = launch(&exe_path)?;
    tracing::info!("[Process] Relaunched {} from {} (PID: {})", exe_name, version_dir.display(), pid);
    Ok(pid)
}

/// 워처가 클라이언트 프로세스를 다루는 경계
///
/// 테스트에서는 가짜 구현으로 실행 상태와 재시작 호출을 흉내냅니다.
pub trait ClientProcess: Send {
    fn is_running(&mut self) -> bool;
    fn restart(&mut self, version_dir: &Path) -> Result<()>;
}

/// sysinfo 기반 실제 구현
#[derive(Debug, Clone)]
pub struct SystemClient {
    exe_name: String,
    grace: Duration,
}

impl SystemClient {
    pub fn new(exe_name: impl Into<String>, grace: Duration) -> Self {
        Self {
            exe_name: exe_name.into(),
            grace,
        }
    }
}

impl ClientProcess for SystemClient {
    fn is_running(&mut self) -> bool {
        is_process_running(&self.exe_name)
    }

    fn restart(&mut self, version_dir: &Path) -> Result<()> {
        terminate_and_relaunch(&self.exe_name, version_dir, self.grace).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn current_process_is_running() {
        assert!(is_running(std::process::id()));
    }

    #[test]
    fn unknown_name_is_not_running() {
        assert!(!is_process_running("definitely-not-a-real-client-3f9a.exe"));
        assert_eq!(terminate_by_name("definitely-not-a-real-client-3f9a.exe"), 0);
    }

    #[test]
    fn cmd_pattern_excludes_self() {
        let me = std::process::id();
        assert!(find_by_cmd_pattern("").iter().all(|p| p.pid != me));
    }

    #[test]
    fn launch_missing_executable_is_reported() {
        let tmp = TempDir::new().unwrap();
        let err = launch(&tmp.path().join("Client.exe")).unwrap_err();
        assert!(matches!(err, FontSwapError::ClientExecutableMissing(_)));
    }

    #[test]
    fn relaunch_without_executable_fails_softly() {
        let tmp = TempDir::new().unwrap();
        let mut client = SystemClient::new("definitely-not-a-real-client-3f9a.exe", Duration::ZERO);
        let err = client.restart(tmp.path()).unwrap_err();
        assert!(matches!(err, FontSwapError::ClientExecutableMissing(_)));
    }
}
