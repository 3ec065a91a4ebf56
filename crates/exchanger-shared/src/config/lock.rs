//! Single-instance file lock (spec §6: `/tmp/exchanger-{role}-{env}.lock`).
//!
//! Uses an atomically-created lock file as a POSIX-style advisory lock: a
//! stale lock (holder process no longer alive) is detected by checking
//! `/proc/{pid}` and reclaimed, matching the operator-recoverable behavior
//! expected of the original instance lock.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use crate::error::ConfigError;

#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
}

impl InstanceLock {
    /// Attempts to acquire the lock for `role` in `environment`. Returns
    /// `Err(ConfigError::AlreadyRunning)` if a live process already holds
    /// it.
    pub fn acquire(role: &str, environment: &str) -> Result<Self, ConfigError> {
        let path = PathBuf::from(format!("/tmp/exchanger-{role}-{environment}.lock"));

        if let Ok(existing) = fs::read_to_string(&path) {
            if let Some(pid) = existing.trim().parse::<u32>().ok().filter(|pid| process_is_alive(*pid)) {
                let _ = pid;
                return Err(ConfigError::AlreadyRunning {
                    env: environment.to_string(),
                    path: path.display().to_string(),
                });
            }
            // Stale lock from a dead process: reclaim it.
            fs::remove_file(&path)?;
        }

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    ConfigError::AlreadyRunning {
                        env: environment.to_string(),
                        path: path.display().to_string(),
                    }
                } else {
                    ConfigError::Io(e)
                }
            })?;
        write!(file, "{}", std::process::id())?;

        Ok(Self { path })
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(unix)]
fn process_is_alive(pid: u32) -> bool {
    std::path::Path::new(&format!("/proc/{pid}")).exists()
}

#[cfg(not(unix))]
fn process_is_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn acquiring_twice_for_same_env_fails() {
        let role = "test-role-a";
        let env = "testenv-a";
        let _lock = InstanceLock::acquire(role, env).expect("first acquire succeeds");
        let second = InstanceLock::acquire(role, env);
        assert!(matches!(second, Err(ConfigError::AlreadyRunning { .. })));
    }

    #[test]
    #[serial]
    fn releases_on_drop_and_allows_reacquire() {
        let role = "test-role-b";
        let env = "testenv-b";
        {
            let _lock = InstanceLock::acquire(role, env).expect("first acquire succeeds");
        }
        let second = InstanceLock::acquire(role, env);
        assert!(second.is_ok());
    }

    #[test]
    #[serial]
    fn stale_lock_from_dead_pid_is_reclaimed() {
        let role = "test-role-c";
        let env = "testenv-c";
        let path = format!("/tmp/exchanger-{role}-{env}.lock");
        std::fs::write(&path, "999999999").unwrap();

        let lock = InstanceLock::acquire(role, env);
        assert!(lock.is_ok());
    }
}
