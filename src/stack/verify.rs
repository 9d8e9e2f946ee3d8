//! Deployment manifest verification.
//!
//! # Responsibilities
//! - Check that every `${VAR}` reference in service environments is
//!   defined at deploy time (process env plus an optional env file)
//! - Enforce the loopback-only publishing contract
//! - Catch wiring mistakes: undeclared or unused volumes, dangling
//!   `depends_on` references, host port collisions, unclosed `${`
//!   references
//!
//! # Design Decisions
//! - Returns all issues, not just the first
//! - Pure over an injected lookup, so tests never touch process env
//! - Issues carry a severity; only `Error` should fail a deploy check

use std::collections::BTreeMap;

use crate::stack::manifest::StackManifest;

/// Severity of a single finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The stack will misbehave or leak if deployed as-is.
    Error,
    /// Worth a look, but deployable.
    Warning,
}

/// A single finding from `verify`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackIssue {
    /// An environment reference names a variable undefined at deploy time.
    MissingEnvVar { service: String, var: String },
    /// A published port is not bound to a loopback address.
    NonLoopbackPort { service: String, binding: String },
    /// A service mounts a named volume the manifest never declares.
    UndeclaredVolume { service: String, volume: String },
    /// A declared volume no service mounts.
    UnusedVolume { volume: String },
    /// Two services publish the same host port.
    DuplicateHostPort { port: u16, services: Vec<String> },
    /// An environment value contains an unclosed `${` reference.
    MalformedReference { service: String, value: String },
    /// A service has no restart policy, so it stays down after a crash.
    NoRestartPolicy { service: String },
    /// A service depends on a service the manifest never defines.
    UnknownDependency { service: String, depends_on: String },
}

impl StackIssue {
    pub fn severity(&self) -> Severity {
        match self {
            StackIssue::MissingEnvVar { .. }
            | StackIssue::NonLoopbackPort { .. }
            | StackIssue::UndeclaredVolume { .. }
            | StackIssue::DuplicateHostPort { .. }
            | StackIssue::MalformedReference { .. }
            | StackIssue::UnknownDependency { .. } => Severity::Error,
            StackIssue::UnusedVolume { .. } | StackIssue::NoRestartPolicy { .. } => {
                Severity::Warning
            }
        }
    }
}

impl std::fmt::Display for StackIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StackIssue::MissingEnvVar { service, var } => {
                write!(f, "service '{}': ${{{}}} is not defined at deploy time", service, var)
            }
            StackIssue::NonLoopbackPort { service, binding } => {
                write!(f, "service '{}': port '{}' is not bound to loopback", service, binding)
            }
            StackIssue::UndeclaredVolume { service, volume } => {
                write!(f, "service '{}': volume '{}' is not declared", service, volume)
            }
            StackIssue::UnusedVolume { volume } => {
                write!(f, "volume '{}' is declared but never mounted", volume)
            }
            StackIssue::DuplicateHostPort { port, services } => {
                write!(f, "host port {} published by multiple services: {}", port, services.join(", "))
            }
            StackIssue::MalformedReference { service, value } => {
                write!(f, "service '{}': malformed reference in '{}'", service, value)
            }
            StackIssue::NoRestartPolicy { service } => {
                write!(f, "service '{}': no restart policy", service)
            }
            StackIssue::UnknownDependency { service, depends_on } => {
                write!(f, "service '{}': depends on undefined service '{}'", service, depends_on)
            }
        }
    }
}

/// An environment reference found in a manifest value.
#[derive(Debug, Clone, PartialEq, Eq)]
struct EnvRef {
    name: String,
    /// References with a fallback (`${VAR:-default}`) are satisfied
    /// even when the variable is undefined.
    required: bool,
}

/// Scan one manifest value for `$VAR` / `${VAR}` references.
/// Returns true if the value contains an unclosed `${`.
fn scan_value(value: &str, refs: &mut Vec<EnvRef>) -> bool {
    let bytes = value.as_bytes();
    let mut i = 0;
    let mut malformed = false;

    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }
        // "$$" escapes a literal dollar
        if bytes.get(i + 1) == Some(&b'$') {
            i += 2;
            continue;
        }
        if bytes.get(i + 1) == Some(&b'{') {
            match value[i + 2..].find('}') {
                Some(end) => {
                    let inner = &value[i + 2..i + 2 + end];
                    // ${VAR}, ${VAR:-default}, ${VAR-default}, ${VAR:?err}
                    let (name, required) = match inner.find(['-', '?', '+']) {
                        Some(op) => {
                            let name = inner[..op].trim_end_matches(':');
                            let has_fallback = inner.as_bytes()[op] != b'?';
                            (name, !has_fallback)
                        }
                        None => (inner, true),
                    };
                    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
                        malformed = true;
                    } else {
                        refs.push(EnvRef {
                            name: name.to_string(),
                            required,
                        });
                    }
                    i += 2 + end + 1;
                }
                None => {
                    malformed = true;
                    i = bytes.len();
                }
            }
        } else {
            // Bare $VAR form
            let start = i + 1;
            let mut end = start;
            while end < bytes.len()
                && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_')
            {
                end += 1;
            }
            if end > start {
                refs.push(EnvRef {
                    name: value[start..end].to_string(),
                    required: true,
                });
            }
            i = end.max(i + 1);
        }
    }

    malformed
}

/// Check a manifest against the deployment environment.
///
/// `lookup` answers "is this variable defined at deploy time"; callers
/// compose it from the process environment and an env file.
pub fn verify<F>(manifest: &StackManifest, lookup: F) -> Vec<StackIssue>
where
    F: Fn(&str) -> bool,
{
    let mut issues = Vec::new();
    let mut host_ports: BTreeMap<u16, Vec<String>> = BTreeMap::new();
    let mut mounted: Vec<&str> = Vec::new();

    for (name, service) in &manifest.services {
        if service.restart == crate::stack::manifest::RestartPolicy::No {
            issues.push(StackIssue::NoRestartPolicy {
                service: name.clone(),
            });
        }

        for dependency in &service.depends_on {
            if !manifest.services.contains_key(dependency) {
                issues.push(StackIssue::UnknownDependency {
                    service: name.clone(),
                    depends_on: dependency.clone(),
                });
            }
        }

        for binding in &service.ports {
            if !binding.is_loopback() {
                issues.push(StackIssue::NonLoopbackPort {
                    service: name.clone(),
                    binding: binding.to_string(),
                });
            }
            if let Some(host) = binding.host_port {
                host_ports.entry(host).or_default().push(name.clone());
            }
        }

        for value in service.environment.values() {
            let mut refs = Vec::new();
            if scan_value(value, &mut refs) {
                issues.push(StackIssue::MalformedReference {
                    service: name.clone(),
                    value: value.clone(),
                });
            }
            for env_ref in refs {
                if env_ref.required && !lookup(&env_ref.name) {
                    issues.push(StackIssue::MissingEnvVar {
                        service: name.clone(),
                        var: env_ref.name,
                    });
                }
            }
        }

        for mount in &service.volumes {
            if mount.is_named() {
                mounted.push(&mount.source);
                if !manifest.volumes.contains_key(&mount.source) {
                    issues.push(StackIssue::UndeclaredVolume {
                        service: name.clone(),
                        volume: mount.source.clone(),
                    });
                }
            }
        }
    }

    for (port, services) in host_ports {
        if services.len() > 1 {
            issues.push(StackIssue::DuplicateHostPort { port, services });
        }
    }

    for volume in manifest.volumes.keys() {
        if !mounted.iter().any(|m| m == volume) {
            issues.push(StackIssue::UnusedVolume {
                volume: volume.clone(),
            });
        }
    }

    issues
}

/// Parse an env file (`KEY=value` lines) into a map.
///
/// Supports comments, blank lines, an optional `export ` prefix, and
/// single or double quotes around values. Later lines win.
pub fn parse_env_file(content: &str) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }

    vars
}
