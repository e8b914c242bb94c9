//! 수동 도구에서 사용한 대상 폴더 기록 (최근 것이 위)

use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct DirectoryHistory {
    path: PathBuf,
    entries: Vec<String>,
}

impl DirectoryHistory {
    /// 기록 파일 읽기. 파일이 없거나 읽을 수 없으면 빈 기록
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(content) => content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(String::from)
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                tracing::warn!("[History] Could not load directory history {}: {}", path.display(), e);
                Vec::new()
            }
        };
        Self { path, entries }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 처음 보는 폴더면 맨 앞에 추가하고 저장. 이미 있으면 순서를 바꾸지 않음
    pub fn record(&mut self, dir: &Path) -> bool {
        let dir = dir.display().to_string();
        if self.entries.iter().any(|e| *e == dir) {
            return false;
        }
        self.entries.insert(0, dir);
        self.save();
        true
    }

    pub fn save(&self) {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                let _ = fs::create_dir_all(parent);
            }
        }
        let mut content = self.entries.join("\n");
        content.push('\n');
        if let Err(e) = fs::write(&self.path, content) {
            tracing::warn!("[History] Could not save directory history {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let history = DirectoryHistory::load(tmp.path().join("history.txt"));
        assert!(history.entries().is_empty());
    }

    #[test]
    fn newest_first_without_duplicates() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("history.txt");
        let mut history = DirectoryHistory::load(&file);

        assert!(history.record(Path::new("/games/a")));
        assert!(history.record(Path::new("/games/b")));
        assert!(!history.record(Path::new("/games/a")));
        assert_eq!(history.entries(), ["/games/b", "/games/a"]);

        let reloaded = DirectoryHistory::load(&file);
        assert_eq!(reloaded.entries(), history.entries());
    }

    #[test]
    fn blank_lines_are_ignored() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("history.txt");
        fs::write(&file, "  /x  \n\n/y\n").unwrap();
        assert_eq!(DirectoryHistory::load(&file).entries(), ["/x", "/y"]);
    }
}
