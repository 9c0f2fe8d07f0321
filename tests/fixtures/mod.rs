//! Test fixtures for integration testing

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use team_elo::config::{AppConfig, PoolSettings};
use uuid::Uuid;

/// Scratch directory removed on drop
pub struct TestDir {
    path: PathBuf,
}

impl TestDir {
    pub fn new() -> Self {
        let path = std::env::temp_dir().join(format!("team-elo-test-{}", Uuid::new_v4()));
        fs::create_dir_all(&path).expect("Failed to create test directory");
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Write a file into the directory and return its path
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.join(name);
        fs::write(&path, contents).expect("Failed to write test file");
        path
    }

    pub fn read(&self, name: &str) -> String {
        fs::read_to_string(self.join(name)).expect("Failed to read test file")
    }

    /// Files currently in the directory, sorted
    pub fn files(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(&self.path)
            .expect("Failed to list test directory")
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

impl Drop for TestDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

/// Default configuration with the standard pools rooted in `dir`
pub fn config_in(dir: &TestDir) -> AppConfig {
    AppConfig {
        pools: PoolSettings::defaults_in(dir.path()),
        ..AppConfig::default()
    }
}

/// Domestic pool settings rooted in `dir`
pub fn domestic_settings(dir: &TestDir) -> PoolSettings {
    PoolSettings::new("domestic", dir.join("domestic_teams.txt"))
        .with_form(dir.join("domestic_form.txt"))
}

/// A short season opener in match file format
pub const OPENING_WEEKEND: &str = r#"# matchday 1
("Arsenal", "Wolves", "win_a"),
("Aston Villa", "West Ham", "win_a"),
("Brighton", "Everton", "win_a"),
("Newcastle", "Southampton", "win_a"),
("Nott'm Forest", "Bournemouth", "draw"),
("Man United", "Fulham", "win_a"),
("Chelsea", "Man City", "win_b"),
("Ipswich", "Liverpool", "win_b"),
"#;
