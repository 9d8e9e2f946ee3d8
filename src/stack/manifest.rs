//! Typed model of the deployment manifest.
//!
//! The relay ships as part of a two-service container stack (Postgres
//! plus the relay itself) described by a compose-style YAML file. These
//! types mirror the subset of the runtime's schema the stack uses, so
//! the file can be rendered, parsed back, and checked without shelling
//! out to the runtime.
//!
//! Port bindings and volume mounts keep the runtime's compact string
//! forms on the wire (`ip:host:container`, `name:/path`) but parse into
//! structured values so checks like "is this bound to loopback" read
//! off a field instead of re-splitting strings.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Root of the deployment manifest.
///
/// `BTreeMap` keeps render order stable, so regenerating the file
/// produces byte-identical output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackManifest {
    pub services: BTreeMap<String, ServiceSpec>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub volumes: BTreeMap<String, Option<VolumeDecl>>,
}

/// A single service definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceSpec {
    pub image: String,

    #[serde(default, skip_serializing_if = "RestartPolicy::is_no")]
    pub restart: RestartPolicy,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortBinding>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<VolumeMount>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

/// Options for a top-level named volume. The standard stack declares
/// its volume with no options, which the runtime renders as `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VolumeDecl {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
}

/// Container restart policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    /// Runtime default: never restart automatically.
    #[default]
    No,
    Always,
    OnFailure,
    /// Restart on failure and on daemon start, unless explicitly
    /// stopped. The standard stack uses this for both services.
    UnlessStopped,
}

impl RestartPolicy {
    fn is_no(&self) -> bool {
        matches!(self, RestartPolicy::No)
    }
}

impl std::fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RestartPolicy::No => "no",
            RestartPolicy::Always => "always",
            RestartPolicy::OnFailure => "on-failure",
            RestartPolicy::UnlessStopped => "unless-stopped",
        };
        f.write_str(s)
    }
}

/// A published port, in the runtime's short syntax.
///
/// Three forms exist: `container`, `host:container`, and
/// `ip:host:container`. The standard stack always uses the three-part
/// form with a loopback IP; the shorter forms publish on all
/// interfaces, which the verifier flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortBinding {
    pub host_ip: Option<IpAddr>,
    pub host_port: Option<u16>,
    pub container_port: u16,
}

impl PortBinding {
    pub fn loopback(port: u16) -> Self {
        Self {
            host_ip: Some(IpAddr::from([127, 0, 0, 1])),
            host_port: Some(port),
            container_port: port,
        }
    }

    /// True only when the binding names a loopback host address.
    /// A missing IP means the runtime publishes on all interfaces.
    pub fn is_loopback(&self) -> bool {
        matches!(self.host_ip, Some(ip) if ip.is_loopback())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortBindingParseError(String);

impl std::fmt::Display for PortBindingParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid port binding: {}", self.0)
    }
}

impl std::error::Error for PortBindingParseError {}

impl FromStr for PortBinding {
    type Err = PortBindingParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || PortBindingParseError(s.to_string());
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [container] => Ok(Self {
                host_ip: None,
                host_port: None,
                container_port: container.parse().map_err(|_| err())?,
            }),
            [host, container] => Ok(Self {
                host_ip: None,
                host_port: Some(host.parse().map_err(|_| err())?),
                container_port: container.parse().map_err(|_| err())?,
            }),
            [ip, host, container] => Ok(Self {
                host_ip: Some(ip.parse().map_err(|_| err())?),
                host_port: Some(host.parse().map_err(|_| err())?),
                container_port: container.parse().map_err(|_| err())?,
            }),
            _ => Err(err()),
        }
    }
}

impl std::fmt::Display for PortBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.host_ip, self.host_port) {
            (Some(ip), Some(host)) => write!(f, "{}:{}:{}", ip, host, self.container_port),
            (None, Some(host)) => write!(f, "{}:{}", host, self.container_port),
            _ => write!(f, "{}", self.container_port),
        }
    }
}

impl Serialize for PortBinding {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PortBinding {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A volume mount in the runtime's short syntax: `source:target` with
/// an optional `:ro` suffix. The source is either a named volume or an
/// absolute host path (bind mount).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    pub source: String,
    pub target: String,
    pub read_only: bool,
}

impl VolumeMount {
    pub fn named(source: &str, target: &str) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
            read_only: false,
        }
    }

    /// Named volumes reference a top-level `volumes:` entry; anything
    /// starting with `/` or `.` is a bind mount onto the host.
    pub fn is_named(&self) -> bool {
        !self.source.starts_with('/') && !self.source.starts_with('.')
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMountParseError(String);

impl std::fmt::Display for VolumeMountParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid volume mount: {}", self.0)
    }
}

impl std::error::Error for VolumeMountParseError {}

impl FromStr for VolumeMount {
    type Err = VolumeMountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || VolumeMountParseError(s.to_string());
        let (source, rest) = s.split_once(':').ok_or_else(err)?;
        if source.is_empty() {
            return Err(err());
        }
        let (target, read_only) = match rest.rsplit_once(':') {
            Some((target, "ro")) => (target, true),
            Some((target, "rw")) => (target, false),
            _ => (rest, false),
        };
        if !target.starts_with('/') {
            return Err(err());
        }
        Ok(Self {
            source: source.to_string(),
            target: target.to_string(),
            read_only,
        })
    }
}

impl std::fmt::Display for VolumeMount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.source, self.target)?;
        if self.read_only {
            f.write_str(":ro")?;
        }
        Ok(())
    }
}

impl Serialize for VolumeMount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VolumeMount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_binding_three_part() {
        let binding: PortBinding = "127.0.0.1:5432:5432".parse().unwrap();
        assert_eq!(binding.host_port, Some(5432));
        assert_eq!(binding.container_port, 5432);
        assert!(binding.is_loopback());
        assert_eq!(binding.to_string(), "127.0.0.1:5432:5432");
    }

    #[test]
    fn port_binding_two_part_is_not_loopback() {
        let binding: PortBinding = "8000:8000".parse().unwrap();
        assert!(!binding.is_loopback());
        assert_eq!(binding.to_string(), "8000:8000");
    }

    #[test]
    fn port_binding_container_only() {
        let binding: PortBinding = "8000".parse().unwrap();
        assert_eq!(binding.host_port, None);
        assert_eq!(binding.container_port, 8000);
        assert!(!binding.is_loopback());
    }

    #[test]
    fn port_binding_rejects_garbage() {
        assert!("".parse::<PortBinding>().is_err());
        assert!("abc:5432".parse::<PortBinding>().is_err());
        assert!("1:2:3:4".parse::<PortBinding>().is_err());
        assert!("127.0.0.1:70000:5432".parse::<PortBinding>().is_err());
    }

    #[test]
    fn volume_mount_named() {
        let mount: VolumeMount = "pg-data:/var/lib/postgresql/data".parse().unwrap();
        assert_eq!(mount.source, "pg-data");
        assert_eq!(mount.target, "/var/lib/postgresql/data");
        assert!(!mount.read_only);
        assert!(mount.is_named());
    }

    #[test]
    fn volume_mount_bind_read_only() {
        let mount: VolumeMount = "/etc/certs:/certs:ro".parse().unwrap();
        assert!(mount.read_only);
        assert!(!mount.is_named());
        assert_eq!(mount.to_string(), "/etc/certs:/certs:ro");
    }

    #[test]
    fn volume_mount_rejects_relative_target() {
        assert!("pg-data:data".parse::<VolumeMount>().is_err());
        assert!(":/data".parse::<VolumeMount>().is_err());
        assert!("pg-data".parse::<VolumeMount>().is_err());
    }

    #[test]
    fn restart_policy_kebab_case() {
        assert_eq!(RestartPolicy::UnlessStopped.to_string(), "unless-stopped");
        let parsed: RestartPolicy = serde_yaml::from_str("unless-stopped").unwrap();
        assert_eq!(parsed, RestartPolicy::UnlessStopped);
        let parsed: RestartPolicy = serde_yaml::from_str("on-failure").unwrap();
        assert_eq!(parsed, RestartPolicy::OnFailure);
    }

    #[test]
    fn unknown_service_field_is_rejected() {
        let yaml = r#"
services:
  db:
    image: postgres:16-alpine
    enviroment:
      POSTGRES_DB: relay
"#;
        let err = serde_yaml::from_str::<StackManifest>(yaml).unwrap_err();
        assert!(err.to_string().contains("enviroment"));
    }

    #[test]
    fn null_volume_declaration_parses() {
        let yaml = r#"
services:
  db:
    image: postgres:16-alpine
volumes:
  pg-data:
"#;
        let manifest: StackManifest = serde_yaml::from_str(yaml).unwrap();
        assert!(manifest.volumes.contains_key("pg-data"));
        assert!(manifest.volumes["pg-data"].is_none());
    }
}
