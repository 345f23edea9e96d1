//! edl-engine configuration
//!
//! Merges command-line options with the environment variables the control
//! protocol documents: `JUCE_DEBUG_DIR` (directory for the append-only
//! diagnostic log, name retained for compatibility with existing callers)
//! and `VITE_AUDIO_DEBUG` (verbose stderr diagnostics when `"true"`).

use std::path::PathBuf;

/// Environment variable naming the diagnostic log directory
pub const DEBUG_DIR_ENV: &str = "JUCE_DEBUG_DIR";

/// Environment variable enabling verbose hot-path diagnostics
pub const AUDIO_DEBUG_ENV: &str = "VITE_AUDIO_DEBUG";

/// File name of the append-only diagnostic log
pub const DEBUG_LOG_FILE: &str = "edl_engine.log";

/// Engine configuration resolved at startup
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory receiving the diagnostic log file
    pub debug_dir: PathBuf,
    /// Verbose diagnostics on stderr
    pub verbose: bool,
    /// Requested output device name (None = default device)
    pub device: Option<String>,
}

impl Config {
    /// Resolve configuration from CLI overrides plus the environment.
    ///
    /// CLI values win over environment values; the debug directory falls
    /// back to the OS temp directory.
    pub fn resolve(
        debug_dir: Option<PathBuf>,
        verbose: bool,
        device: Option<String>,
    ) -> Self {
        let env_dir = std::env::var_os(DEBUG_DIR_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        let env_verbose = std::env::var(AUDIO_DEBUG_ENV)
            .map(|v| v == "true")
            .unwrap_or(false);

        Self {
            debug_dir: debug_dir.or(env_dir).unwrap_or_else(std::env::temp_dir),
            verbose: verbose || env_verbose,
            device,
        }
    }

    /// Full path of the diagnostic log file
    pub fn debug_log_path(&self) -> PathBuf {
        self.debug_dir.join(DEBUG_LOG_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_win() {
        let cfg = Config::resolve(Some(PathBuf::from("/var/log/edl")), true, None);
        assert_eq!(cfg.debug_dir, PathBuf::from("/var/log/edl"));
        assert!(cfg.verbose);
        assert_eq!(cfg.debug_log_path(), PathBuf::from("/var/log/edl/edl_engine.log"));
    }

    #[test]
    fn defaults_to_temp_dir() {
        // Environment may legitimately set JUCE_DEBUG_DIR; only assert the
        // fallback when it is absent.
        if std::env::var_os(DEBUG_DIR_ENV).is_none() {
            let cfg = Config::resolve(None, false, None);
            assert_eq!(cfg.debug_dir, std::env::temp_dir());
        }
    }
}
