use std::path::Path;

use crate::config::{CONFIG_FILE, DEFAULT_CONFIG_TEMPLATE};

#[derive(Debug, PartialEq, Eq)]
pub enum CliAction {
    PrintVersion,
    InitConfig,
    RunServer,
}

pub fn parse_args() -> CliAction {
    parse_from(std::env::args().skip(1))
}

pub fn parse_from(args: impl IntoIterator<Item = String>) -> CliAction {
    let mut version_flag = false;
    let mut init_config = false;
    for arg in args {
        match arg.as_str() {
            "--version" | "-V" | "-version" => version_flag = true,
            "--init-config" => init_config = true,
            _ => {}
        }
    }
    if version_flag {
        return CliAction::PrintVersion;
    }
    if init_config {
        return CliAction::InitConfig;
    }
    CliAction::RunServer
}

pub fn print_version() {
    println!("Tunecast v{}", env!("CARGO_PKG_VERSION"));
}

/// Writes the commented default config unless one already exists.
pub fn init_config_file(target: &Path) -> bool {
    if target.exists() {
        eprintln!("{} already exists; aborting --init-config", target.display());
        return false;
    }
    match std::fs::write(target, DEFAULT_CONFIG_TEMPLATE) {
        Ok(()) => {
            println!("Created {}", target.display());
            true
        }
        Err(e) => {
            eprintln!("Failed to write {}: {e}", target.display());
            false
        }
    }
}

pub fn default_config_path() -> &'static Path {
    Path::new(CONFIG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn version_wins_over_init() {
        assert_eq!(parse_from(args(&["--init-config", "-V"])), CliAction::PrintVersion);
        assert_eq!(parse_from(args(&["--init-config"])), CliAction::InitConfig);
        assert_eq!(parse_from(args(&["--verbose"])), CliAction::RunServer);
    }

    #[test]
    fn init_config_does_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        assert!(init_config_file(&path));
        std::fs::write(&path, "# edited").unwrap();
        assert!(!init_config_file(&path));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# edited");
    }
}
