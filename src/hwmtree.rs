//! Typed read/write access to the hardware-management directory tree.
//!
//! The tree is a collaborator, not part of the control algorithm: it looks
//! like sysfs (plain files holding newline-terminated text, plus a handful
//! of symlinks) rooted at `HW_MGMT_FOLDER` (default `/var/run/hw-management`).
//! No I/O error here is fatal by itself — callers decide via default values;
//! best-effort by design.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Root-relative accessor over the hw-management tree.
#[derive(Debug, Clone)]
pub struct HwmTree {
    root: PathBuf,
}

impl HwmTree {
    /// Default root used when no `-r` override is given.
    pub const DEFAULT_ROOT: &'static str = "/var/run/hw-management";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    /// Read a file, trimming a single trailing newline. Returns `default` if
    /// the path doesn't exist; any other I/O error is reported but not fatal.
    pub fn read_str(&self, rel: &str, default: &str) -> String {
        match fs::read_to_string(self.path(rel)) {
            Ok(s) => s.trim_end_matches('\n').to_string(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => default.to_string(),
            Err(e) => {
                log::warn!("hwmtree: read {rel} failed: {e}");
                default.to_string()
            }
        }
    }

    /// Read and parse an integer, reporting (but not failing on) parse
    /// errors by returning `default`.
    pub fn read_int(&self, rel: &str, default: i64) -> i64 {
        let raw = self.read_str(rel, "");
        if raw.is_empty() {
            return default;
        }
        match raw.trim().parse::<i64>() {
            Ok(v) => v,
            Err(_) => {
                log::warn!("hwmtree: {rel} has unparseable value {raw:?}, using default {default}");
                default
            }
        }
    }

    /// Best-effort write. I/O errors are swallowed: sysfs targets can be
    /// transiently gone during hotplug and the next tick will retry.
    pub fn write(&self, rel: &str, value: impl std::fmt::Display) {
        if let Err(e) = fs::write(self.path(rel), value.to_string()) {
            log::debug!("hwmtree: write {rel} failed (ignored): {e}");
        }
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.path(rel).exists()
    }

    /// Basename of the symlink target, or `None` if absent or not a symlink.
    pub fn symlink_target_basename(&self, rel: &str) -> Option<String> {
        let target = fs::read_link(self.path(rel)).ok()?;
        target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
    }

    /// Atomic-ish symlink replace: remove then create. The caller is
    /// responsible for the single-writer discipline (only the controller
    /// thread touches `highest_thermal_zone`).
    pub fn symlink_replace(&self, rel: &str, target: &str) {
        let path = self.path(rel);
        let _ = fs::remove_file(&path);
        #[cfg(unix)]
        if let Err(e) = std::os::unix::fs::symlink(target, &path) {
            log::warn!("hwmtree: symlink {rel} -> {target} failed: {e}");
        }
    }

    // --- convenience wrappers rooted at `thermal/` ---

    pub fn thermal_read_str(&self, rel: &str, default: &str) -> String {
        self.read_str(&format!("thermal/{rel}"), default)
    }

    pub fn thermal_read_int(&self, rel: &str, default: i64) -> i64 {
        self.read_int(&format!("thermal/{rel}"), default)
    }

    pub fn thermal_write(&self, rel: &str, value: impl std::fmt::Display) {
        self.write(&format!("thermal/{rel}"), value);
    }

    pub fn thermal_exists(&self, rel: &str) -> bool {
        self.exists(&format!("thermal/{rel}"))
    }

    pub fn thermal_symlink_target_basename(&self, rel: &str) -> Option<String> {
        self.symlink_target_basename(&format!("thermal/{rel}"))
    }

    pub fn thermal_symlink_replace(&self, rel: &str, target: &str) {
        self.symlink_replace(&format!("thermal/{rel}"), target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    struct ScratchDir(PathBuf);

    impl ScratchDir {
        fn new() -> Self {
            let id = COUNTER.fetch_add(1, Ordering::Relaxed);
            let dir = std::env::temp_dir().join(format!("thermal-controld-test-{}-{}", std::process::id(), id));
            fs::create_dir_all(&dir).unwrap();
            fs::create_dir_all(dir.join("thermal")).unwrap();
            fs::create_dir_all(dir.join("config")).unwrap();
            Self(dir)
        }
    }

    impl Drop for ScratchDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    #[test]
    fn read_str_missing_returns_default() {
        let scratch = ScratchDir::new();
        let tree = HwmTree::new(scratch.0.clone());
        assert_eq!(tree.read_str("config/suspend", "0"), "0");
    }

    #[test]
    fn read_str_trims_trailing_newline() {
        let scratch = ScratchDir::new();
        fs::write(scratch.0.join("config/suspend"), "1\n").unwrap();
        let tree = HwmTree::new(scratch.0.clone());
        assert_eq!(tree.read_str("config/suspend", "0"), "1");
    }

    #[test]
    fn read_int_on_garbage_uses_default() {
        let scratch = ScratchDir::new();
        fs::write(scratch.0.join("thermal/pwm1"), "not-a-number").unwrap();
        let tree = HwmTree::new(scratch.0.clone());
        assert_eq!(tree.thermal_read_int("pwm1", 153), 153);
    }

    #[test]
    fn write_then_read_round_trips() {
        let scratch = ScratchDir::new();
        let tree = HwmTree::new(scratch.0.clone());
        tree.thermal_write("cooling_cur_state", 16);
        assert_eq!(tree.thermal_read_int("cooling_cur_state", -1), 16);
    }

    #[test]
    fn write_to_missing_directory_is_swallowed() {
        let scratch = ScratchDir::new();
        let tree = HwmTree::new(scratch.0.clone());
        // no panic expected even though thermal/mlxsw-module7 doesn't exist
        tree.thermal_write("mlxsw-module7/thermal_zone_mode", "disabled");
    }

    #[test]
    fn symlink_replace_and_read_back() {
        let scratch = ScratchDir::new();
        let tree = HwmTree::new(scratch.0.clone());
        tree.symlink_replace("thermal/highest_thermal_zone", "mlxsw-module3");
        assert_eq!(
            tree.symlink_target_basename("thermal/highest_thermal_zone"),
            Some("mlxsw-module3".to_string())
        );
        tree.symlink_replace("thermal/highest_thermal_zone", "mlxsw");
        assert_eq!(
            tree.symlink_target_basename("thermal/highest_thermal_zone"),
            Some("mlxsw".to_string())
        );
    }

    #[test]
    fn exists_reflects_filesystem() {
        let scratch = ScratchDir::new();
        let tree = HwmTree::new(scratch.0.clone());
        assert!(!tree.thermal_exists("pwm1"));
        tree.thermal_write("pwm1", 153);
        assert!(tree.thermal_exists("pwm1"));
    }
}
