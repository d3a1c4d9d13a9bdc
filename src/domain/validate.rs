//! Command validator
//!
//! Maps (operation kind, target identifier) to an approved [`CommandSpec`]
//! or a typed rejection. No free-form command string ever reaches the
//! executor: every approved invocation is one of the fixed templates below
//! with the identifier substituted as a discrete argument.
//!
//! Package identifiers are checked against a block-list first (shell
//! metacharacters, privilege-escalation-related names), then an allow-list
//! of naming conventions for language runtimes, database client libraries
//! and common media tools. The block-list always wins.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;

use crate::config::constants::{LONG_TIMEOUT_SECS, STATUS_TIMEOUT_SECS};
use crate::config::EnvConfig;
use crate::domain::operation::CommandSpec;

/// The class of command being requested, used to pick a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    RestartService,
    ServiceActive,
    ServiceEnabled,
    InstallPackage,
}

/// A rejected identifier, with the reason sent back to the caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid service '{0}'")]
    UnknownService(String),
    #[error("Package '{0}' is blocked")]
    PackageBlocked(String),
    #[error("Package '{0}' is not permitted")]
    PackageNotPermitted(String),
}

/// Validate `ident` for `kind` and return the approved invocation.
pub fn validate(
    kind: CommandKind,
    ident: &str,
    config: &EnvConfig,
) -> Result<CommandSpec, ValidationError> {
    match kind {
        CommandKind::RestartService => {
            let name = validate_service(ident, config)?;
            Ok(CommandSpec::new(
                "systemctl",
                &["restart", name],
                Duration::from_secs(STATUS_TIMEOUT_SECS),
            )
            .elevated())
        }
        CommandKind::ServiceActive => {
            let name = validate_service(ident, config)?;
            Ok(CommandSpec::new(
                "systemctl",
                &["is-active", name],
                Duration::from_secs(STATUS_TIMEOUT_SECS),
            ))
        }
        CommandKind::ServiceEnabled => {
            let name = validate_service(ident, config)?;
            Ok(CommandSpec::new(
                "systemctl",
                &["is-enabled", name],
                Duration::from_secs(STATUS_TIMEOUT_SECS),
            ))
        }
        CommandKind::InstallPackage => {
            let name = validate_package(ident)?;
            Ok(CommandSpec::new(
                "apt-get",
                &["install", "-y", "--no-install-recommends", name],
                Duration::from_secs(LONG_TIMEOUT_SECS),
            )
            .env("DEBIAN_FRONTEND", "noninteractive")
            .elevated())
        }
    }
}

/// Exact membership test against the configured units.
fn validate_service<'a>(name: &'a str, config: &EnvConfig) -> Result<&'a str, ValidationError> {
    if config.managed_services().iter().any(|&s| s == name) {
        Ok(name)
    } else {
        Err(ValidationError::UnknownService(name.to_string()))
    }
}

/// Block-list then allow-list; block-list wins ties.
fn validate_package(name: &str) -> Result<&str, ValidationError> {
    if block_patterns().iter().any(|re| re.is_match(name)) {
        return Err(ValidationError::PackageBlocked(name.to_string()));
    }
    if allow_patterns().iter().any(|re| re.is_match(name)) {
        Ok(name)
    } else {
        Err(ValidationError::PackageNotPermitted(name.to_string()))
    }
}

fn block_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        compile(&[
            // Anything outside the Debian package-name charset, including
            // shell metacharacters and whitespace.
            r"[^a-z0-9.+-]",
            // Leading dash would be parsed as an apt option.
            r"^-",
            // Privilege-escalation adjacent names, anywhere in the identifier.
            r"(^|[.+-])(sudo|su|passwd|polkit|policykit|pkexec|pam)([.+-]|$)",
        ])
    })
}

fn allow_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        compile(&[
            // Language runtimes
            r"^python3?(-[a-z0-9.+-]+)?$",
            r"^(nodejs|npm|yarn)$",
            // Database client libraries
            r"^postgresql-client(-[0-9]+)?$",
            r"^libpq[a-z0-9.+-]*$",
            r"^redis-tools$",
            // Media and document tooling
            r"^(ffmpeg|imagemagick|ghostscript|poppler-utils|exiftool)$",
            r"^tesseract-ocr(-[a-z]+)?$",
            r"^libmagic[a-z0-9.+-]*$",
        ])
    })
}

fn compile(sources: &[&str]) -> Vec<Regex> {
    sources
        .iter()
        .map(|s| Regex::new(s).unwrap_or_else(|e| panic!("invalid builtin pattern {s}: {e}")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> EnvConfig {
        EnvConfig::for_tests()
    }

    #[test]
    fn test_known_services_approved() {
        let config = test_config();
        for name in ["bayanat", "nginx"] {
            let spec = validate(CommandKind::RestartService, name, &config).unwrap();
            assert_eq!(spec.program, "systemctl");
            assert_eq!(spec.args, vec!["restart".to_string(), name.to_string()]);
            assert!(spec.elevate);
        }
    }

    #[test]
    fn test_unknown_service_rejected() {
        let config = test_config();
        for name in ["sshd", "bayanat2", "", "nginx; rm -rf /"] {
            let err = validate(CommandKind::RestartService, name, &config).unwrap_err();
            assert!(matches!(err, ValidationError::UnknownService(_)), "{name}");
        }
    }

    #[test]
    fn test_status_commands_not_elevated() {
        let config = test_config();
        let spec = validate(CommandKind::ServiceActive, "nginx", &config).unwrap();
        assert!(!spec.elevate);
        let spec = validate(CommandKind::ServiceEnabled, "bayanat", &config).unwrap();
        assert_eq!(spec.args[0], "is-enabled");
    }

    #[test]
    fn test_permitted_packages() {
        let config = test_config();
        for name in [
            "python3-lxml",
            "postgresql-client-16",
            "libpq-dev",
            "ffmpeg",
            "tesseract-ocr-ara",
        ] {
            let spec = validate(CommandKind::InstallPackage, name, &config).unwrap();
            assert_eq!(spec.program, "apt-get");
            assert_eq!(spec.args.last().map(String::as_str), Some(name));
        }
    }

    #[test]
    fn test_unlisted_package_rejected() {
        let config = test_config();
        for name in ["netcat", "gcc", "curl"] {
            let err = validate(CommandKind::InstallPackage, name, &config).unwrap_err();
            assert!(matches!(err, ValidationError::PackageNotPermitted(_)), "{name}");
        }
    }

    #[test]
    fn test_metacharacters_blocked() {
        let config = test_config();
        for name in ["ffmpeg;reboot", "python3 $(id)", "libpq`true`", "-y"] {
            let err = validate(CommandKind::InstallPackage, name, &config).unwrap_err();
            assert!(matches!(err, ValidationError::PackageBlocked(_)), "{name}");
        }
    }

    #[test]
    fn test_block_list_overrides_allow_list() {
        let config = test_config();
        // Matches the python3-* allow pattern but carries a blocked name.
        let err = validate(CommandKind::InstallPackage, "python3-sudo", &config).unwrap_err();
        assert!(matches!(err, ValidationError::PackageBlocked(_)));
        let err = validate(CommandKind::InstallPackage, "libpam-dev", &config).unwrap_err();
        assert!(matches!(err, ValidationError::PackageNotPermitted(_)));
    }
}
