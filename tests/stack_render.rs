//! Deployment-contract tests for the rendered stack file.

use std::collections::BTreeMap;

use sse_relay::stack::{self, RestartPolicy, StackIssue};

/// The four variables the standard stack expects at deploy time.
const DEPLOY_VARS: [&str; 4] = ["PG_DATABASE", "PG_USER", "PG_PASSWORD", "SSE_SECRET"];

#[test]
fn rendered_stack_satisfies_the_deployment_contract() {
    let yaml = stack::to_yaml(&stack::standard(&stack::StackOptions::default())).unwrap();
    // Round-trips through the same schema the runtime verifier uses.
    let manifest = stack::from_yaml(&yaml).unwrap();

    let db = &manifest.services["db"];
    assert_eq!(db.image, "postgres:16-alpine");
    assert_eq!(db.restart, RestartPolicy::UnlessStopped);
    assert_eq!(db.ports.len(), 1);
    assert!(db.ports[0].is_loopback());
    assert_eq!(db.ports[0].container_port, 5432);
    assert_eq!(db.volumes.len(), 1);
    assert_eq!(db.volumes[0].source, "pg-data");
    assert_eq!(db.volumes[0].target, "/var/lib/postgresql/data");

    let sse = &manifest.services["sse"];
    assert_eq!(sse.restart, RestartPolicy::UnlessStopped);
    assert!(sse.ports[0].is_loopback());
    assert_eq!(sse.ports[0].container_port, 8000);
    assert_eq!(sse.environment["SSE_SECRET"], "${SSE_SECRET}");
    assert!(sse.depends_on.contains(&"db".to_string()));

    assert!(manifest.volumes.contains_key("pg-data"));

    // No secrets are inlined anywhere in the file.
    assert!(!yaml.contains("password123"));
    for (name, value) in &db.environment {
        assert!(value.starts_with("${"), "{name} must be a reference, got {value}");
    }

    let issues = stack::verify(&manifest, |var| DEPLOY_VARS.contains(&var));
    assert!(issues.is_empty(), "clean stack reported {issues:?}");
}

#[test]
fn missing_deploy_vars_fail_verification() {
    let manifest = stack::standard(&stack::StackOptions::default());

    let issues = stack::verify(&manifest, |var| var == "PG_DATABASE");
    let missing: Vec<&str> = issues
        .iter()
        .filter_map(|issue| match issue {
            StackIssue::MissingEnvVar { var, .. } => Some(var.as_str()),
            _ => None,
        })
        .collect();

    assert!(missing.contains(&"PG_USER"));
    assert!(missing.contains(&"PG_PASSWORD"));
    assert!(missing.contains(&"SSE_SECRET"));
    assert!(!missing.contains(&"PG_DATABASE"));
}

#[test]
fn env_file_satisfies_the_contract() {
    let manifest = stack::standard(&stack::StackOptions::default());

    let env: BTreeMap<String, String> = stack::parse_env_file(
        "# deployment secrets\n\
         PG_DATABASE=relay\n\
         PG_USER=relay\n\
         PG_PASSWORD='s3cret'\n\
         export SSE_SECRET=0123456789abcdef\n",
    );
    let issues = stack::verify(&manifest, |var| env.contains_key(var));
    assert!(issues.is_empty(), "env file left issues: {issues:?}");
}
