//! fontswap 수동 도구
//!
//! ## 사용법
//! ```
//! fontswap status                               # 설정/소스/버전 요약
//! fontswap versions [--json]                    # 버전별 적용 상태
//! fontswap replace <dir> [--yes] [--skip-emoji] # 폴더의 폰트 교체 (백업 포함)
//! fontswap backups <dir> [--json]               # 백업 세션 목록
//! fontswap undo <dir> [<session>] [--yes] [--cleanup]
//! fontswap history                              # 최근 사용 폴더
//! fontswap fonts                                # 프리셋 폰트 목록
//! fontswap use-font <name|path>                 # 활성 폰트 지정
//! fontswap install [--from <dir>]               # 설치 + 시작 프로그램 등록
//! fontswap uninstall [--yes]                    # 워처 종료 + 시작 프로그램 제거
//! fontswap config                               # 설정 표시
//! fontswap config set <key> <value>             # 설정 변경
//! ```

mod commands;

fn main() {
    fontswap::logging::init_cli();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(e) = run(args) {
        eprintln!("✗ Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Vec<String>) -> anyhow::Result<()> {
    let args_ref: Vec<&str> = args.iter().map(|s| s.as_str()).collect();

    if args_ref.is_empty() || matches!(args_ref[0], "help" | "--help" | "-h") {
        print_help();
        return Ok(());
    }

    if matches!(args_ref[0], "--version" | "-V") {
        println!("fontswap {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let rest = &args_ref[1..];
    match args_ref[0] {
        "status" => commands::cmd_status(),
        "versions" => commands::cmd_versions(rest),
        "replace" => commands::cmd_replace(rest),
        "backups" => commands::cmd_backups(rest),
        "undo" => commands::cmd_undo(rest),
        "history" => commands::cmd_history(),
        "fonts" => commands::cmd_fonts(),
        "use-font" => commands::cmd_use_font(rest),
        "install" => commands::cmd_install(rest),
        "uninstall" => commands::cmd_uninstall(rest),
        "config" => commands::cmd_config(rest),
        other => {
            eprintln!("✗ Unknown command: {}", other);
            eprintln!("  Run 'fontswap help' for usage.");
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!("fontswap — custom font manager for the game client");
    println!();
    println!("USAGE:");
    println!("  fontswap <command> [args...]");
    println!();
    println!("COMMANDS:");
    println!("  status                          Show config, source font and version summary");
    println!("  versions [--json]               List client versions and their font state");
    println!("  replace <dir> [--yes]           Back up and replace every font in <dir>");
    println!("          [--skip-emoji]          Leave emoji fonts out of the backup");
    println!("  backups <dir> [--json]          List backup sessions of <dir>");
    println!("  undo <dir> [<session>]          Restore the newest (or given) backup session");
    println!("       [--yes] [--cleanup]        --cleanup removes the emptied backup folders");
    println!("  history                         Folders used with 'replace'");
    println!("  fonts                           List preset fonts");
    println!("  use-font <name|path>            Make a font the active custom font");
    println!("  install [--from <dir>]          Create folders, import presets, register startup");
    println!("  uninstall [--yes]               Stop the watcher and remove the startup entry");
    println!("  config                          Show configuration");
    println!("  config set <key> <value>        Change a config value");
    println!("  help                            This help message");
    println!();
    println!("EXAMPLES:");
    println!("  fontswap use-font SourceSans.ttf");
    println!("  fontswap replace \"C:\\Games\\Client\\content\\fonts\"");
    println!("  fontswap undo \"C:\\Games\\Client\\content\\fonts\" --cleanup");
    println!("  fontswap config set check_interval_secs 30");
}
