#![allow(deprecated)] // TODO: cargo_bin → cargo_bin_cmd! へ移行

use assert_cmd::Command;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub const DB_PASSWORD_ENV: &str = "STACKFLOW_TEST_DB_PASSWORD";

/// network → database → backend → frontend (backend は IAM ロールの伝播待ちあり)
pub const WEATHER_STACK: &str = r##"
project "weather-alerting"

engine {
    parallelism 2
    retry {
        max-attempts 3
        initial-delay-ms 1
        max-delay-ms 5
        multiplier 2.0
    }
}

resource "network" kind="vpc" {
    state {
        cidr "10.0.0.0/16"
    }
}

resource "database" kind="docdb-cluster" {
    input "subnet_ids" ref="network.private_subnet_ids"
    input "master_password" secret="env://STACKFLOW_TEST_DB_PASSWORD"
}

resource "access-role" kind="iam-role" {
    state {
        name "apprunner-ecr-access"
    }
}

resource "backend" kind="apprunner-service" lag-sensitive=#true {
    input "access_role_arn" ref="access-role.arn"
    input "db_endpoint" ref="database.endpoint"
}

resource "frontend" kind="s3-bucket" {
    state {
        bucket_name "BUCKET_NAME"
    }
    input "config" template=#"{"backendUri": "${backend.service_url}"}"#
}
"##;

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    /// 天気アラートのスタックを書き込んだプロジェクト
    pub fn weather(bucket_name: &str) -> Self {
        let project = Self::new();
        project.write_weather_stack(bucket_name);
        project
    }

    pub fn write_stack_kdl(&self, content: &str) {
        let path = self.root.path().join("stack.kdl");
        fs::write(path, content).unwrap();
    }

    pub fn write_weather_stack(&self, bucket_name: &str) {
        self.write_stack_kdl(&WEATHER_STACK.replace("BUCKET_NAME", bucket_name));
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    pub fn state_path(&self) -> PathBuf {
        self.root.path().join(".stackflow").join("state.json")
    }

    pub fn sandbox_path(&self) -> PathBuf {
        self.root.path().join(".stackflow").join("sandbox.json")
    }

    /// プロジェクト内で実行する stackflow コマンド
    ///
    /// HOME を一時ディレクトリに向けて、グローバル設定を拾わないようにする
    pub fn stackflow(&self) -> Command {
        let mut cmd = Command::cargo_bin("stackflow").unwrap();
        cmd.current_dir(self.root.path())
            .env("HOME", self.root.path())
            .env("NO_COLOR", "1")
            .env(DB_PASSWORD_ENV, "hunter2")
            .env_remove("XDG_CONFIG_HOME")
            .env_remove("STACKFLOW_CONFIG_PATH")
            .env_remove("STACKFLOW_PARALLELISM");
        cmd
    }
}
