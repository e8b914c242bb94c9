//! 업데이트 확인 프롬프트
//!
//! 워처는 새 버전을 발견하면 사용자에게 지금 적용 / 나중에 적용 / 이번 버전 건너뛰기를 묻습니다.
//! 호출은 응답이 올 때까지 블로킹되며 타임아웃은 없습니다.

use std::io::{self, BufRead, Write};

/// 대화상자에 표시할 버전 이름 최대 길이
pub const VERSION_DISPLAY_LEN: usize = 25;

pub const DIALOG_TITLE: &str = "Font Manager";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateChoice {
    /// 지금 교체하고 클라이언트 재시작
    Now,
    /// 클라이언트가 종료되면 교체
    Later,
    /// 이번 세션 동안 이 버전은 건너뜀 (창 닫기 포함)
    Cancel,
}

pub trait UpdatePrompt: Send {
    fn ask(&mut self, version: &str) -> UpdateChoice;
}

/// 긴 버전 이름은 앞 25자만 표시하고 `...`을 붙임
pub fn shorten_version(version: &str) -> String {
    if version.chars().count() > VERSION_DISPLAY_LEN {
        let head: String = version.chars().take(VERSION_DISPLAY_LEN).collect();
        format!("{}...", head)
    } else {
        version.to_string()
    }
}

pub fn dialog_text(version: &str) -> String {
    format!("Client update detected for version:\n{}", shorten_version(version))
}

fn parse_choice(input: &str) -> UpdateChoice {
    match input.trim().to_lowercase().as_str() {
        "y" | "yes" | "now" | "1" => UpdateChoice::Now,
        "l" | "later" | "2" => UpdateChoice::Later,
        _ => UpdateChoice::Cancel,
    }
}

/// 표준 입출력 기반 프롬프트. 인식할 수 없는 입력이나 EOF는 Cancel
pub struct ConsolePrompt<R, W> {
    input: R,
    output: W,
}

impl ConsolePrompt<io::BufReader<io::Stdin>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::BufReader::new(io::stdin()), io::stdout())
    }
}

impl<R: BufRead, W: Write> ConsolePrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead + Send, W: Write + Send> UpdatePrompt for ConsolePrompt<R, W> {
    fn ask(&mut self, version: &str) -> UpdateChoice {
        let _ = writeln!(self.output, "{}", dialog_text(version));
        let _ = write!(self.output, "  [Y] Update Now  [L] Update Later  [S] Skip This Version > ");
        let _ = self.output.flush();

        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) | Err(_) => UpdateChoice::Cancel,
            Ok(_) => parse_choice(&line),
        }
    }
}

/// Windows 메시지 박스 (예/아니요/취소, 항상 위)
#[cfg(windows)]
#[derive(Debug, Default, Clone, Copy)]
pub struct MessageBoxPrompt;

#[cfg(windows)]
impl UpdatePrompt for MessageBoxPrompt {
    fn ask(&mut self, version: &str) -> UpdateChoice {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;
        use winapi::um::winuser::{
            MessageBoxW, IDNO, IDYES, MB_ICONQUESTION, MB_SETFOREGROUND, MB_TOPMOST, MB_YESNOCANCEL,
        };

        let text = format!(
            "{}\n\nYes = Update Now\nNo = Update Later\nCancel = Skip This Version",
            dialog_text(version)
        );
        let to_wide = |s: &str| -> Vec<u16> { OsStr::new(s).encode_wide().chain(std::iter::once(0)).collect() };
        let text_w = to_wide(&text);
        let title_w = to_wide(DIALOG_TITLE);

        let result = unsafe {
            MessageBoxW(
                std::ptr::null_mut(),
                text_w.as_ptr(),
                title_w.as_ptr(),
                MB_YESNOCANCEL | MB_ICONQUESTION | MB_TOPMOST | MB_SETFOREGROUND,
            )
        };
        match result {
            IDYES => UpdateChoice::Now,
            IDNO => UpdateChoice::Later,
            _ => UpdateChoice::Cancel,
        }
    }
}

/// 플랫폼 기본 프롬프트
pub fn default_prompt() -> Box<dyn UpdatePrompt> {
    #[cfg(windows)]
    {
        Box::new(MessageBoxPrompt)
    }
    #[cfg(not(windows))]
    {
        Box::new(ConsolePrompt::stdio())
    }
}
