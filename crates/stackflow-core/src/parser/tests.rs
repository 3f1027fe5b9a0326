use super::*;
use crate::model::{AttributeRef, Input};
use serde_json::json;
use std::time::Duration;

#[test]
fn test_parse_project_and_resources() {
    let kdl = r#"
        project "weather-alerting"

        resource "network" kind="vpc" {
            state {
                cidr "10.0.0.0/16"
                availability-zones "ap-northeast-1a" "ap-northeast-1c"
            }
        }

        resource "database" kind="docdb-cluster" lag-sensitive=#true {
            depends-on "network"
            state { engine "docdb"; backup-retention-period 30 }
            input "subnet_ids" ref="network.private_subnet_ids"
            input "master_password" secret="env://DB_PASSWORD"
            input "port" 27017
        }
    "#;

    let stack = parse_stack_string(kdl, "default".to_string()).unwrap();
    assert_eq!(stack.name, "weather-alerting");
    assert_eq!(stack.resources.len(), 2);

    let network = stack.resource("network").unwrap();
    assert_eq!(network.kind, "vpc");
    assert!(!network.lag_sensitive);
    assert_eq!(
        network.desired_state,
        json!({
            "cidr": "10.0.0.0/16",
            "availability-zones": ["ap-northeast-1a", "ap-northeast-1c"]
        })
    );

    let database = stack.resource("database").unwrap();
    assert!(database.lag_sensitive);
    assert_eq!(database.depends_on, vec!["network"]);
    assert_eq!(
        database.desired_state,
        json!({"engine": "docdb", "backup-retention-period": 30})
    );
    assert_eq!(
        database.inputs["subnet_ids"],
        Input::Ref(AttributeRef::new("network", "private_subnet_ids"))
    );
    assert_eq!(database.inputs["master_password"], Input::secret("env://DB_PASSWORD"));
    assert_eq!(database.inputs["port"], Input::Value(json!(27017)));
}

#[test]
fn test_parse_template_input() {
    let kdl = r##"
        resource "frontend-config" kind="s3-object" {
            input "body" template=#"{"backendUri": "${backend.service_url}"}"#
        }
    "##;

    let stack = parse_stack_string(kdl, "test".to_string()).unwrap();
    let node = stack.resource("frontend-config").unwrap();
    match &node.inputs["body"] {
        Input::Template(template) => {
            assert_eq!(
                template.references(),
                &[AttributeRef::new("backend", "service_url")]
            );
        }
        other => panic!("expected template, got {:?}", other),
    }
    assert_eq!(
        node.producers().into_iter().collect::<Vec<_>>(),
        vec!["backend".to_string()]
    );
}

#[test]
fn test_parse_nested_state_and_repeated_keys() {
    let kdl = r#"
        resource "backend" kind="apprunner-service" {
            state {
                source {
                    image "public.ecr.aws/weather/backend:latest"
                    port 8080
                }
                env-var name="NODE_ENV" value="production"
                env-var name="LOG_LEVEL" value="info"
                auto-deploy #false
            }
        }
    "#;

    let stack = parse_stack_string(kdl, "test".to_string()).unwrap();
    let backend = stack.resource("backend").unwrap();
    assert_eq!(
        backend.desired_state,
        json!({
            "source": {"image": "public.ecr.aws/weather/backend:latest", "port": 8080},
            "env-var": [
                {"name": "NODE_ENV", "value": "production"},
                {"name": "LOG_LEVEL", "value": "info"}
            ],
            "auto-deploy": false
        })
    );
}

#[test]
fn test_parse_engine() {
    let kdl = r#"
        engine {
            parallelism 8
            max-failures 2
            retry { max-attempts 5; initial-delay-ms 200; max-delay-ms 5000; multiplier 1.5 }
        }
    "#;

    let stack = parse_stack_string(kdl, "test".to_string()).unwrap();
    assert_eq!(stack.engine.parallelism, 8);
    assert_eq!(stack.engine.max_failures, Some(2));
    assert_eq!(stack.engine.retry.max_attempts, 5);
    assert_eq!(stack.engine.retry.initial_delay, Duration::from_millis(200));
    assert_eq!(stack.engine.retry.max_delay, Duration::from_millis(5000));
    assert_eq!(stack.engine.retry.backoff_multiplier, 1.5);
}

#[test]
fn test_max_failures_zero_means_unlimited() {
    let kdl = r#"
        engine {
            max-failures 0
        }
    "#;
    let stack = parse_stack_string(kdl, "test".to_string()).unwrap();
    assert_eq!(stack.engine.max_failures, None);
    assert_eq!(stack.engine.parallelism, 4);
}

#[test]
fn test_invalid_engine_settings() {
    for kdl in [
        "engine { parallelism 0 }",
        "engine { retry { multiplier 0.5 } }",
        "engine { retry { initial-delay-ms 9000; max-delay-ms 100 } }",
        "engine { unknown 1 }",
    ] {
        assert!(
            parse_stack_string(kdl, "test".to_string()).is_err(),
            "should reject: {}",
            kdl
        );
    }
}

#[test]
fn test_resource_requires_name_and_kind() {
    let result = parse_stack_string(r#"resource kind="vpc""#, "test".to_string());
    assert!(result.is_err());

    let result = parse_stack_string(r#"resource "network""#, "test".to_string());
    assert!(result.is_err());
}

#[test]
fn test_invalid_inputs() {
    let bad_ref = r#"
        resource "db" kind="docdb-cluster" {
            input "subnets" ref="network"
        }
    "#;
    assert!(parse_stack_string(bad_ref, "test".to_string()).is_err());

    let no_value = r#"
        resource "db" kind="docdb-cluster" {
            input "subnets"
        }
    "#;
    assert!(parse_stack_string(no_value, "test".to_string()).is_err());
}

#[test]
fn test_project_name_defaults() {
    let stack = parse_stack_string(r#"resource "a" kind="vpc""#, "dir-name".to_string()).unwrap();
    assert_eq!(stack.name, "dir-name");
}

#[test]
fn test_kdl_syntax_error() {
    let result = parse_stack_string(r#"resource "a" {"#, "test".to_string());
    assert!(matches!(result, Err(crate::error::FlowError::KdlParse(_))));
}

#[test]
fn test_stack_tags_merge_into_every_resource() {
    let kdl = r#"
        project "weather-alerting"
        tags PROJECT="WeatherAlertingSystem" {
            owner "platform"
        }

        resource "network" kind="vpc"
        resource "frontend" kind="s3-bucket" {
            state {
                bucket-name "weather-frontend"
                tags { owner "web"; tier "public" }
            }
        }
    "#;

    let stack = parse_stack_string(kdl, "default".to_string()).unwrap();
    assert_eq!(stack.tags.get("PROJECT").unwrap(), "WeatherAlertingSystem");
    assert_eq!(
        stack.resource("network").unwrap().desired_state,
        json!({"tags": {"PROJECT": "WeatherAlertingSystem", "owner": "platform"}})
    );
    // resource tags win over stack tags
    assert_eq!(
        stack.resource("frontend").unwrap().desired_state["tags"],
        json!({"PROJECT": "WeatherAlertingSystem", "owner": "web", "tier": "public"})
    );
}

#[test]
fn test_stack_tags_change_the_fingerprint() {
    let untagged = parse_stack_string(r#"resource "network" kind="vpc""#, "s".to_string()).unwrap();
    let tagged = parse_stack_string(
        r#"
        tags PROJECT="WeatherAlertingSystem"
        resource "network" kind="vpc"
        "#,
        "s".to_string(),
    )
    .unwrap();

    let empty = std::collections::BTreeMap::new();
    let before = crate::fingerprint::fingerprint("vpc", &untagged.resources[0].desired_state, &empty);
    let after = crate::fingerprint::fingerprint("vpc", &tagged.resources[0].desired_state, &empty);
    assert_ne!(before, after);
}

#[test]
fn test_positional_stack_tag_is_rejected() {
    let err = parse_stack_string(r#"tags "PROJECT""#, "s".to_string()).unwrap_err();
    assert!(err.to_string().contains("キー=値"));
}

#[test]
fn test_max_attempts_beyond_u32_is_rejected() {
    let kdl = r#"
        engine {
            retry { max-attempts 4294967297 }
        }
    "#;
    let err = parse_stack_string(kdl, "s".to_string()).unwrap_err();
    assert!(matches!(err, crate::error::FlowError::InvalidConfig(_)), "{:?}", err);
}
