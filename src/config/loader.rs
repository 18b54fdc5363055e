use std::path::Path;

use tracing::{debug, info};

use super::types::{HarnessConfig, LimitsConfig};
use crate::domain::HostContentMap;
use crate::error::{MockError, Result};
use crate::ports::is_loopback;

/// Load a harness configuration from a YAML file
///
/// # Errors
///
/// Returns an error if:
/// - The configuration file does not exist
/// - The file cannot be read
/// - The YAML content is invalid or cannot be parsed
/// - The configuration fails validation (no hosts, bad hostname, zero timeout)
pub fn load_config(path: &Path) -> Result<HarnessConfig> {
    if !path.exists() {
        return Err(MockError::ConfigNotFound {
            path: path.display().to_string(),
        });
    }

    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;

    info!(
        config_path = %path.display(),
        hosts = config.hosts.len(),
        "Loaded mock SFTP configuration"
    );

    Ok(config)
}

/// Parse and validate a harness configuration from YAML text
///
/// # Errors
///
/// Returns an error if the YAML cannot be parsed or fails validation.
pub fn parse_config(content: &str) -> Result<HarnessConfig> {
    let config: HarnessConfig = serde_saphyr::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &HarnessConfig) -> Result<()> {
    if config.hosts.is_empty() {
        return Err(MockError::Config("at least one host must be defined".to_string()));
    }

    validate_hosts(&config.hosts)?;
    validate_limits(&config.limits)?;

    debug!(hosts = config.hosts.len(), "Configuration validated");
    Ok(())
}

/// Check every hostname in a host map
///
/// Hostnames must be non-empty, contain no whitespace and must not be a
/// loopback name, since connections to loopback are never redirected.
///
/// # Errors
///
/// Returns `ConfigInvalid` naming the first offending host.
pub fn validate_hosts(hosts: &HostContentMap) -> Result<()> {
    for hostname in hosts.keys() {
        if hostname.is_empty() {
            return Err(MockError::ConfigInvalid {
                field: "hosts".to_string(),
                reason: "Hostname cannot be empty".to_string(),
            });
        }

        if hostname.chars().any(char::is_whitespace) {
            return Err(MockError::ConfigInvalid {
                field: format!("hosts.{hostname}"),
                reason: "Hostname cannot contain whitespace".to_string(),
            });
        }

        if is_loopback(hostname) {
            return Err(MockError::ConfigInvalid {
                field: format!("hosts.{hostname}"),
                reason: "Loopback hosts are never intercepted".to_string(),
            });
        }
    }
    Ok(())
}

/// Check that no timeout is zero
///
/// # Errors
///
/// Returns `ConfigInvalid` naming the first zero field.
pub fn validate_limits(limits: &LimitsConfig) -> Result<()> {
    let fields = [
        ("limits.stop_timeout_ms", limits.stop_timeout_ms),
        (
            "limits.connection_timeout_seconds",
            limits.connection_timeout_seconds,
        ),
        (
            "limits.inactivity_timeout_seconds",
            limits.inactivity_timeout_seconds,
        ),
    ];
    for (field, value) in fields {
        if value == 0 {
            return Err(MockError::ConfigInvalid {
                field: field.to_string(),
                reason: "Must be greater than zero".to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::domain::ContentNode;
    use crate::host_contents;

    // ============== Loading ==============

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config(Path::new("/nonexistent/sftpmock.yaml"));
        assert!(matches!(result, Err(MockError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hosts:\n  sftp.example.com:\n    readme.txt: hello\n")
            .unwrap();
        file.flush().unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(
            config.hosts["sftp.example.com"]["readme.txt"],
            ContentNode::from("hello")
        );
        assert_eq!(config.limits, LimitsConfig::default());
    }

    #[test]
    fn test_parse_config_with_limits() {
        let config = parse_config(
            "hosts:\n  a.example: {}\nlimits:\n  stop_timeout_ms: 750\n  connection_timeout_seconds: 3\n",
        )
        .unwrap();
        assert_eq!(config.limits.stop_timeout_ms, 750);
        assert_eq!(config.limits.connection_timeout_seconds, 3);
        assert_eq!(config.limits.keepalive_interval_seconds, 30);
    }

    #[test]
    fn test_parse_config_invalid_yaml() {
        assert!(parse_config("[unclosed").is_err());
    }

    // ============== Validation ==============

    #[test]
    fn test_no_hosts_rejected() {
        let err = parse_config("hosts: {}\n").unwrap_err();
        assert!(matches!(err, MockError::Config(ref m) if m.contains("at least one host")));
    }

    #[test]
    fn test_loopback_host_rejected() {
        let hosts = host_contents! { "localhost" => {} };
        let err = validate_hosts(&hosts).unwrap_err();
        assert!(format!("{err}").contains("Loopback"));

        let hosts = host_contents! { "127.0.0.1" => {} };
        assert!(validate_hosts(&hosts).is_err());
    }

    #[test]
    fn test_empty_hostname_rejected() {
        let hosts = host_contents! { "" => {} };
        assert!(validate_hosts(&hosts).is_err());
    }

    #[test]
    fn test_whitespace_hostname_rejected() {
        let hosts = host_contents! { "bad host" => {} };
        assert!(validate_hosts(&hosts).is_err());
    }

    #[test]
    fn test_valid_hosts_accepted() {
        let hosts = host_contents! {
            "sftp.example.com" => {},
            "10.0.0.5" => {},
        };
        assert!(validate_hosts(&hosts).is_ok());
    }

    #[test]
    fn test_zero_stop_timeout_rejected() {
        let limits = LimitsConfig {
            stop_timeout_ms: 0,
            ..LimitsConfig::default()
        };
        let err = validate_limits(&limits).unwrap_err();
        assert!(format!("{err}").contains("limits.stop_timeout_ms"));
    }
}
