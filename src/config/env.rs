//! Environment variable configuration

use std::env;
use std::path::PathBuf;

/// Agent configuration, loaded once at startup.
#[derive(Clone, Debug)]
pub struct EnvConfig {
    /// Loopback port the agent listens on
    pub port: u16,
    /// Bayanat application working tree
    pub app_dir: PathBuf,
    /// systemd unit of the application
    pub app_service: String,
    /// systemd unit of the reverse proxy
    pub proxy_service: String,
    /// Unprivileged account that owns the working tree
    pub app_user: String,
    /// Append-only audit log destination
    pub audit_log: PathBuf,
    /// Seconds to wait after a restart before the health check
    pub settle_delay_secs: u64,
}

impl EnvConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let port = env::var("BAYANAT_AGENT_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(9181);

        let app_dir = env::var("BAYANAT_APP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/opt/bayanat"));

        let app_service = env::var("BAYANAT_SERVICE").unwrap_or_else(|_| "bayanat".to_string());
        let proxy_service =
            env::var("BAYANAT_PROXY_SERVICE").unwrap_or_else(|_| "nginx".to_string());
        let app_user = env::var("BAYANAT_USER").unwrap_or_else(|_| "bayanat".to_string());

        let audit_log = env::var("BAYANAT_AUDIT_LOG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/var/log/bayanat-agent/audit.log"));

        let settle_delay_secs = env::var("BAYANAT_SETTLE_DELAY_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3);

        Self {
            port,
            app_dir,
            app_service,
            proxy_service,
            app_user,
            audit_log,
            settle_delay_secs,
        }
    }

    /// The fixed service allow-list: the application and the reverse proxy.
    pub fn managed_services(&self) -> [&str; 2] {
        [self.app_service.as_str(), self.proxy_service.as_str()]
    }

    /// Path to an executable inside the application's virtualenv.
    pub fn venv_bin(&self, name: &str) -> PathBuf {
        self.app_dir.join("env").join("bin").join(name)
    }

    /// Fixed defaults, independent of the process environment.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            port: 0,
            app_dir: PathBuf::from("/opt/bayanat"),
            app_service: "bayanat".to_string(),
            proxy_service: "nginx".to_string(),
            app_user: "bayanat".to_string(),
            audit_log: PathBuf::from("/dev/null"),
            settle_delay_secs: 0,
        }
    }
}

/// Constants
pub mod constants {
    /// Timeout for status and restart commands (seconds)
    pub const STATUS_TIMEOUT_SECS: u64 = 10;

    /// Timeout for package and update-stage commands (seconds)
    pub const LONG_TIMEOUT_SECS: u64 = 120;

    /// Bytes of stdout/stderr kept per execution
    pub const OUTPUT_TAIL_BYTES: usize = 4096;

    /// Agent version
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_managed_services() {
        let config = EnvConfig::for_tests();
        assert_eq!(config.managed_services(), ["bayanat", "nginx"]);
    }

    #[test]
    fn test_venv_bin() {
        let config = EnvConfig::for_tests();
        assert_eq!(
            config.venv_bin("pip"),
            PathBuf::from("/opt/bayanat/env/bin/pip")
        );
    }
}
