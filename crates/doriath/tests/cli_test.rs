mod common;

use assert_cmd::Command;
use common::TestProject;
use predicates::prelude::*;

/// CLIヘルプに全サブコマンドが表示されることを確認
#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("doriath").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("dryrun"))
        .stdout(predicate::str::contains("build"))
        .stdout(predicate::str::contains("trybuild"))
        .stdout(predicate::str::contains("push"))
        .stdout(predicate::str::contains("clean"))
        .stdout(predicate::str::contains("findlatest"))
        .stdout(predicate::str::contains("waitimage"));
}

/// バージョン表示が正しく動作することを確認
#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("doriath").unwrap();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("doriath"));
}

/// 不正なサブコマンドはCLI利用方法の誤り（終了コード2）
#[test]
fn test_invalid_command() {
    let mut cmd = Command::cargo_bin("doriath").unwrap();
    cmd.arg("invalid-command").assert().failure().code(2);
}

/// KEY=VALUE 形式でない -x 指定は終了コード2
#[test]
fn test_invalid_variable() {
    let mut cmd = Command::cargo_bin("doriath").unwrap();
    cmd.args(["dryrun", "-x", "not-a-pair"])
        .assert()
        .failure()
        .code(2);
}

/// 設定ファイルがなければ終了コード1
#[test]
fn test_missing_config_file() {
    let project = TestProject::new();
    let mut cmd = Command::cargo_bin("doriath").unwrap();
    cmd.current_dir(project.path())
        .args(["dryrun", "--skip-check"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("ERROR:"));
}

/// dryrun --skip-check はネットワークに触れずツリーを表示する
#[test]
fn test_dryrun_skip_check_prints_tree() {
    let project = TestProject::new();
    project.write_dockerfile("app", "FROM base:1.0\nRUN true\n");
    project.write_config(
        r#"
root_dir: .
build:
  - name: base
    tag: "1.0"
    from: provided
  - name: app
    tag: "2.0"
    from: app
    depend: base
    force_build: true
"#,
    );

    let mut cmd = Command::cargo_bin("doriath").unwrap();
    cmd.current_dir(project.path())
        .args(["dryrun", "--skip-check", "--no-color"])
        .assert()
        .success()
        .stdout(predicate::str::contains("- library/base:1.0"))
        .stdout(predicate::str::contains("  - library/app:2.0 (*)"));
}

/// Dockerfileの親イメージが設定と食い違っていたら失敗する
#[test]
fn test_dryrun_detects_dependency_mismatch() {
    let project = TestProject::new();
    project.write_dockerfile("app", "FROM alpine:3.5\nRUN true\n");
    project.write_config(
        r#"
root_dir: .
build:
  - name: ubuntu
    tag: "16.04"
    from: provided
  - name: app
    tag: "2.0"
    from: app
    depend: ubuntu
"#,
    );

    let mut cmd = Command::cargo_bin("doriath").unwrap();
    cmd.current_dir(project.path())
        .args(["dryrun", "--skip-check"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("ERROR:"));
}

/// -x で渡したテンプレート変数が展開されることを確認
#[test]
fn test_template_variable_from_cli() {
    let project = TestProject::new();
    project.write_config(
        r#"
root_dir: .
build:
  - name: app
    tag: "{{ tag }}"
    from: provided
"#,
    );

    let mut cmd = Command::cargo_bin("doriath").unwrap();
    cmd.current_dir(project.path())
        .args(["dryrun", "--skip-check", "-x", "tag=9.9"])
        .assert()
        .success()
        .stdout(predicate::str::contains("- library/app:9.9"));
}

/// 未定義のテンプレート変数はエラーになる
#[test]
fn test_undefined_template_variable_fails() {
    let project = TestProject::new();
    project.write_config(
        r#"
root_dir: .
build:
  - name: app
    tag: "{{ tag }}"
    from: provided
"#,
    );

    let mut cmd = Command::cargo_bin("doriath").unwrap();
    cmd.current_dir(project.path())
        .args(["dryrun", "--skip-check"])
        .assert()
        .failure()
        .code(1);
}

/// 変数ファイルからの値はCLI指定の変数で上書きできる
#[test]
fn test_variable_file_overridden_by_cli() {
    let project = TestProject::new();
    std::fs::write(project.path().join("vars.env"), "tag=1.0\n").unwrap();
    project.write_config(
        r#"
root_dir: .
build:
  - name: app
    tag: "{{ tag }}"
    from: provided
"#,
    );

    let mut cmd = Command::cargo_bin("doriath").unwrap();
    cmd.current_dir(project.path())
        .args([
            "dryrun",
            "--skip-check",
            "--variable-file",
            "vars.env",
            "-x",
            "tag=2.0",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("- library/app:2.0"));
}

/// findlatest はGCR以外のレジストリを拒否する
#[test]
fn test_findlatest_unsupported_registry() {
    let project = TestProject::new();
    project.write_config(
        r#"
root_dir: .
credentials:
  - name: example.com
    registry: "https://example.com"
    username: "username"
    password: "password"
"#,
    );

    let mut cmd = Command::cargo_bin("doriath").unwrap();
    cmd.current_dir(project.path())
        .args(["findlatest", "example.com/foo/bar"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("ERROR:"));
}

/// 認証情報のないレジストリを参照するとエラーになる
#[test]
fn test_findlatest_missing_credential() {
    let project = TestProject::new();
    project.write_config("root_dir: .\n");

    let mut cmd = Command::cargo_bin("doriath").unwrap();
    cmd.current_dir(project.path())
        .args(["findlatest", "gcr.io/foo/bar"])
        .assert()
        .failure()
        .code(1);
}
