//! Attributes synthesized per resource kind

use serde_json::{Value, json};
use stackflow_cloud::Attributes;

/// Account id used in every synthesized ARN
pub const ACCOUNT_ID: &str = "000000000000";

/// Attributes a resource of `kind` exposes once created
pub fn attributes_for(kind: &str, identity: &str, desired: &Value, region: &str) -> Attributes {
    let mut attributes = Attributes::new();
    let desired_str = |key: &str| desired.get(key).and_then(Value::as_str);

    match kind {
        "vpc" => {
            attributes.insert("vpc_id".into(), json!(identity));
            attributes.insert(
                "private_subnet_ids".into(),
                json!([
                    format!("subnet-{}-private-a", identity),
                    format!("subnet-{}-private-c", identity)
                ]),
            );
            attributes.insert(
                "public_subnet_ids".into(),
                json!([
                    format!("subnet-{}-public-a", identity),
                    format!("subnet-{}-public-c", identity)
                ]),
            );
            attributes.insert(
                "default_security_group_id".into(),
                json!(format!("sg-{}", identity)),
            );
            attributes.insert("arn".into(), json!(generic_arn("ec2", region, identity)));
        }
        "docdb-cluster" => {
            let port = desired.get("port").and_then(Value::as_u64).unwrap_or(27017);
            attributes.insert(
                "endpoint".into(),
                json!(format!("{}.cluster.{}.docdb.amazonaws.com", identity, region)),
            );
            attributes.insert("port".into(), json!(port));
            attributes.insert("arn".into(), json!(generic_arn("rds", region, identity)));
        }
        "apprunner-service" => {
            attributes.insert(
                "service_url".into(),
                json!(format!("{}.{}.awsapprunner.com", identity, region)),
            );
            attributes.insert(
                "arn".into(),
                json!(format!(
                    "arn:aws:apprunner:{}:{}:service/{}",
                    region, ACCOUNT_ID, identity
                )),
            );
        }
        "s3-bucket" => {
            let bucket = desired_str("bucket_name").unwrap_or(identity);
            attributes.insert("bucket".into(), json!(bucket));
            attributes.insert(
                "website_endpoint".into(),
                json!(format!("http://{}.s3-website-{}.amazonaws.com", bucket, region)),
            );
            attributes.insert("arn".into(), json!(format!("arn:aws:s3:::{}", bucket)));
        }
        iam if iam.starts_with("iam-") => {
            let name = desired_str("name").unwrap_or(identity);
            let resource = iam.trim_start_matches("iam-");
            attributes.insert("name".into(), json!(name));
            attributes.insert(
                "arn".into(),
                json!(format!("arn:aws:iam::{}:{}/{}", ACCOUNT_ID, resource, name)),
            );
        }
        other => {
            attributes.insert("arn".into(), json!(generic_arn(other, region, identity)));
        }
    }
    attributes
}

fn generic_arn(service: &str, region: &str, identity: &str) -> String {
    format!("arn:aws:{}:{}:{}:{}", service, region, ACCOUNT_ID, identity)
}

/// Whether any string inside `value` mentions `needle`
pub fn mentions(value: &Value, needle: &str) -> bool {
    match value {
        Value::String(s) => s.contains(needle),
        Value::Array(items) => items.iter().any(|v| mentions(v, needle)),
        Value::Object(map) => map.values().any(|v| mentions(v, needle)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vpc_attributes() {
        let attrs = attributes_for("vpc", "vpc-1", &json!({}), "ap-northeast-1");
        assert_eq!(attrs["vpc_id"], json!("vpc-1"));
        assert_eq!(attrs["private_subnet_ids"].as_array().unwrap().len(), 2);
        assert_eq!(attrs["default_security_group_id"], json!("sg-vpc-1"));
    }

    #[test]
    fn test_bucket_uses_declared_name() {
        let attrs = attributes_for(
            "s3-bucket",
            "s3-bucket-1",
            &json!({"bucket_name": "weather-frontend"}),
            "ap-northeast-1",
        );
        assert_eq!(attrs["bucket"], json!("weather-frontend"));
        assert_eq!(attrs["arn"], json!("arn:aws:s3:::weather-frontend"));
        assert_eq!(
            attrs["website_endpoint"],
            json!("http://weather-frontend.s3-website-ap-northeast-1.amazonaws.com")
        );
    }

    #[test]
    fn test_iam_arns() {
        let role = attributes_for("iam-role", "iam-role-3", &json!({"name": "ecr-access"}), "us-east-1");
        assert_eq!(role["arn"], json!("arn:aws:iam::000000000000:role/ecr-access"));
        assert_eq!(role["name"], json!("ecr-access"));

        let oidc = attributes_for("iam-oidc-provider", "iam-oidc-provider-1", &json!({}), "us-east-1");
        assert_eq!(
            oidc["arn"],
            json!("arn:aws:iam::000000000000:oidc-provider/iam-oidc-provider-1")
        );
    }

    #[test]
    fn test_docdb_port_defaults() {
        let attrs = attributes_for("docdb-cluster", "docdb-cluster-2", &json!({}), "ap-northeast-1");
        assert_eq!(attrs["port"], json!(27017));
        assert_eq!(
            attrs["endpoint"],
            json!("docdb-cluster-2.cluster.ap-northeast-1.docdb.amazonaws.com")
        );
    }

    #[test]
    fn test_mentions_nested_values() {
        let payload = json!({"role": {"arns": ["x", "arn:aws:iam::0:role/r"]}});
        assert!(mentions(&payload, "arn:aws:iam::0:role/r"));
        assert!(!mentions(&payload, "arn:aws:iam::0:role/other"));
    }
}
