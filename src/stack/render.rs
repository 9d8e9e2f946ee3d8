//! Rendering of the standard deployment stack.
//!
//! `standard()` produces the canonical two-service manifest the relay
//! deploys with: a Postgres container with one named persistent volume,
//! and the relay container. Both restart `unless-stopped` and publish
//! on loopback only; secrets come from the deploy-time environment via
//! `${VAR}` references, never inline.

use std::collections::BTreeMap;

use crate::stack::manifest::{PortBinding, RestartPolicy, ServiceSpec, StackManifest, VolumeMount};

/// Knobs for the standard stack. The defaults match the production
/// deployment; tests and staging override what they need.
#[derive(Debug, Clone)]
pub struct StackOptions {
    pub postgres_image: String,
    pub relay_image: String,
    pub database_service: String,
    pub relay_service: String,
    pub volume_name: String,
    pub database_port: u16,
    pub relay_port: u16,
}

impl Default for StackOptions {
    fn default() -> Self {
        Self {
            postgres_image: "postgres:16-alpine".to_string(),
            relay_image: "sse-relay:latest".to_string(),
            database_service: "db".to_string(),
            relay_service: "sse".to_string(),
            volume_name: "pg-data".to_string(),
            database_port: 5432,
            relay_port: 8000,
        }
    }
}

/// Build the standard manifest.
pub fn standard(opts: &StackOptions) -> StackManifest {
    let mut services = BTreeMap::new();

    let mut db_env = BTreeMap::new();
    db_env.insert("POSTGRES_DB".to_string(), "${PG_DATABASE}".to_string());
    db_env.insert("POSTGRES_USER".to_string(), "${PG_USER}".to_string());
    db_env.insert("POSTGRES_PASSWORD".to_string(), "${PG_PASSWORD}".to_string());

    services.insert(
        opts.database_service.clone(),
        ServiceSpec {
            image: opts.postgres_image.clone(),
            restart: RestartPolicy::UnlessStopped,
            environment: db_env,
            ports: vec![PortBinding::loopback(opts.database_port)],
            volumes: vec![VolumeMount::named(
                &opts.volume_name,
                "/var/lib/postgresql/data",
            )],
            depends_on: Vec::new(),
        },
    );

    let mut relay_env = BTreeMap::new();
    relay_env.insert("SSE_SECRET".to_string(), "${SSE_SECRET}".to_string());

    services.insert(
        opts.relay_service.clone(),
        ServiceSpec {
            image: opts.relay_image.clone(),
            restart: RestartPolicy::UnlessStopped,
            environment: relay_env,
            ports: vec![PortBinding::loopback(opts.relay_port)],
            volumes: Vec::new(),
            depends_on: vec![opts.database_service.clone()],
        },
    );

    let mut volumes = BTreeMap::new();
    volumes.insert(opts.volume_name.clone(), None);

    StackManifest { services, volumes }
}

/// Serialize a manifest to YAML.
pub fn to_yaml(manifest: &StackManifest) -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(manifest)
}

/// Parse a manifest from YAML. Unknown fields are rejected, so typos
/// surface here instead of being silently ignored at deploy time.
pub fn from_yaml(input: &str) -> Result<StackManifest, serde_yaml::Error> {
    serde_yaml::from_str(input)
}
