//! 設定ファイルの読み込み
//!
//! 2段階の変数展開を行ってからYAMLとしてデコードします:
//! 1. `$VAR` / `${VAR}` をプロセス環境変数で置換（未定義は空文字列）
//! 2. Teraテンプレートとして変数ファイル＋オーバーライド変数で展開
//!    （未定義キーはエラー）

use crate::error::{Result, TreeError};
use crate::image::format_docker_name;
use crate::tree::{BuildNode, BuildRoot, BuildTree, Credential};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

#[derive(Debug, Deserialize)]
struct BuildConfig {
    #[serde(default)]
    root_dir: String,
    #[serde(default)]
    pull: Vec<String>,
    #[serde(default)]
    build: Vec<BuildNodeConfig>,
    #[serde(default)]
    credentials: Vec<CredentialConfig>,
}

#[derive(Debug, Deserialize)]
struct BuildNodeConfig {
    name: String,
    tag: String,
    from: String,
    #[serde(default)]
    depend: String,
    #[serde(default)]
    pre_build: String,
    #[serde(default)]
    post_build: String,
    #[serde(default)]
    force_build: bool,
    #[serde(default)]
    push_latest: bool,
    #[serde(default)]
    platforms: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CredentialConfig {
    name: String,
    #[serde(default)]
    registry: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    password_file: String,
}

/// 設定ファイルからビルドツリーを読み込む
#[instrument(skip(variables, variable_files))]
pub fn read_build_tree_from_file(
    path: &Path,
    variables: &HashMap<String, String>,
    variable_files: &[PathBuf],
) -> Result<BuildTree> {
    let content = fs::read_to_string(path).map_err(|e| TreeError::ConfigRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    let config_dir = path.parent().unwrap_or_else(|| Path::new(""));
    build_tree_from_config(config_dir, &content, variables, variable_files)
}

/// 設定文字列からビルドツリーを読み込む（パスはカレントディレクトリ基準）
pub fn read_build_tree_from_str(
    content: &str,
    variables: &HashMap<String, String>,
    variable_files: &[PathBuf],
) -> Result<BuildTree> {
    build_tree_from_config(Path::new(""), content, variables, variable_files)
}

fn build_tree_from_config(
    config_dir: &Path,
    content: &str,
    variables: &HashMap<String, String>,
    variable_files: &[PathBuf],
) -> Result<BuildTree> {
    let config = read_build_config(content, variables, variable_files)?;
    let root_dir = if config.root_dir.is_empty() {
        config_dir.to_path_buf()
    } else {
        config_dir.join(&config.root_dir)
    };

    let mut all_nodes = BTreeMap::new();
    for node_config in config.build {
        let node = BuildNode {
            name: format_docker_name(&node_config.name),
            tag: node_config.tag,
            build_root: resolve_build_root(&root_dir, &node_config.from),
            depend: format_docker_name(&node_config.depend),
            pre_build: node_config.pre_build,
            post_build: node_config.post_build,
            force_build: node_config.force_build,
            push_latest: node_config.push_latest,
            platforms: node_config.platforms,
            dirty: false,
            children: Vec::new(),
        };
        all_nodes.insert(node.name.clone(), node);
    }

    let mut credentials = BTreeMap::new();
    for credential_config in config.credentials {
        let credential = resolve_credential(credential_config, &root_dir)?;
        credentials.insert(credential.name.clone(), credential);
    }

    debug!(
        nodes = all_nodes.len(),
        credentials = credentials.len(),
        "build tree loaded"
    );
    Ok(BuildTree {
        root_dir,
        pull: config.pull,
        root_nodes: Vec::new(),
        all_nodes,
        credentials,
    })
}

fn read_build_config(
    content: &str,
    variables: &HashMap<String, String>,
    variable_files: &[PathBuf],
) -> Result<BuildConfig> {
    // 変数ファイル → オーバーライドの順で合成（オーバーライドが勝つ）
    let mut all_variables = read_variable_files(variable_files)?;
    for (key, value) in variables {
        all_variables.insert(key.clone(), value.clone());
    }

    let env_expanded = expand_env(content);
    let rendered = render_template(&env_expanded, &all_variables)?;
    let config: BuildConfig = serde_yaml::from_str(&rendered)?;
    Ok(config)
}

/// dotenv形式（`KEY=VALUE` 行）の変数ファイル群を読み込む
fn read_variable_files(paths: &[PathBuf]) -> Result<HashMap<String, String>> {
    let mut variables = HashMap::new();
    for path in paths {
        let content = fs::read_to_string(path).map_err(|e| TreeError::VariableFile {
            path: path.clone(),
            message: e.to_string(),
        })?;
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                variables.insert(
                    key.trim().to_string(),
                    trim_quotes(value.trim()).to_string(),
                );
            }
        }
    }
    Ok(variables)
}

fn trim_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Teraテンプレートとして展開。未定義キーはエラー
fn render_template(content: &str, variables: &HashMap<String, String>) -> Result<String> {
    let mut context = tera::Context::new();
    for (key, value) in variables {
        context.insert(key.as_str(), value);
    }
    tera::Tera::default()
        .render_str(content, &context)
        .map_err(|e| TreeError::ConfigTemplate(e.to_string()))
}

/// `$VAR` / `${VAR}` をプロセス環境変数で置換する。未定義は空文字列
fn expand_env(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find('$') {
        output.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => {
                    output.push_str(&env_value(&braced[..end]));
                    rest = &braced[end + 1..];
                }
                None => {
                    // 閉じられていない `${` はそのまま残す
                    output.push('$');
                    rest = after;
                }
            }
        } else {
            let end = after
                .find(|c: char| c != '_' && !c.is_ascii_alphanumeric())
                .unwrap_or(after.len());
            let name = &after[..end];
            if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
                // 変数名にならない `$` はそのまま
                output.push('$');
                rest = after;
            } else {
                output.push_str(&env_value(name));
                rest = &after[end..];
            }
        }
    }
    output.push_str(rest);
    output
}

fn env_value(name: &str) -> String {
    std::env::var(name).unwrap_or_default()
}

fn resolve_build_root(root_dir: &Path, from: &str) -> BuildRoot {
    if from == "provided" {
        BuildRoot::Provided
    } else if Path::new(from).is_absolute() {
        BuildRoot::Path(PathBuf::from(from))
    } else {
        BuildRoot::Path(root_dir.join(from))
    }
}

/// password_file が設定されていればroot_dir基準で読み込み、passwordに反映する
fn resolve_credential(config: CredentialConfig, root_dir: &Path) -> Result<Credential> {
    let password = if config.password_file.is_empty() {
        config.password
    } else {
        let path = if Path::new(&config.password_file).is_absolute() {
            PathBuf::from(&config.password_file)
        } else {
            root_dir.join(&config.password_file)
        };
        let content = fs::read_to_string(&path)
            .map_err(|e| TreeError::CredentialFile { path, source: e })?;
        content.trim().to_string()
    };
    Ok(Credential {
        name: config.name,
        registry: config.registry,
        username: config.username,
        password,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env() {
        unsafe {
            std::env::set_var("DORIATH_TEST_EXPAND", "rivendell");
        }
        assert_eq!(expand_env("a $DORIATH_TEST_EXPAND b"), "a rivendell b");
        assert_eq!(expand_env("a ${DORIATH_TEST_EXPAND} b"), "a rivendell b");
        assert_eq!(expand_env("${DORIATH_TEST_EXPAND}x"), "rivendellx");
        // 未定義は空文字列
        assert_eq!(expand_env("a $DORIATH_TEST_UNDEFINED b"), "a  b");
        // 変数名にならない `$` はそのまま
        assert_eq!(expand_env("cost: $5"), "cost: $5");
        assert_eq!(expand_env("trailing $"), "trailing $");
        unsafe {
            std::env::remove_var("DORIATH_TEST_EXPAND");
        }
    }

    #[test]
    fn test_render_template_undefined_key_fails() {
        let variables = HashMap::new();
        let err = render_template("tag: {{ missing }}", &variables).unwrap_err();
        assert!(matches!(err, TreeError::ConfigTemplate(_)));
    }

    #[test]
    fn test_render_template_override_wins() {
        let mut variables = HashMap::new();
        variables.insert("tag".to_string(), "override".to_string());
        let rendered = render_template("tag: {{ tag }}", &variables).unwrap();
        assert_eq!(rendered, "tag: override");
    }

    #[test]
    fn test_read_variable_files() {
        let dir = tempfile::tempdir().unwrap();
        let vars_path = dir.path().join("vars");
        fs::write(
            &vars_path,
            "# コメント行\nubuntuTag=16.04\nquoted=\"hello world\"\n\n",
        )
        .unwrap();
        let variables = read_variable_files(&[vars_path]).unwrap();
        assert_eq!(variables["ubuntuTag"], "16.04");
        assert_eq!(variables["quoted"], "hello world");
    }

    #[test]
    fn test_read_variable_files_missing() {
        let err = read_variable_files(&[PathBuf::from("/nonexistent/vars")]).unwrap_err();
        assert!(matches!(err, TreeError::VariableFile { .. }));
    }

    #[test]
    fn test_read_config_two_stage_expansion() {
        let dir = tempfile::tempdir().unwrap();
        let vars_path = dir.path().join("vars");
        fs::write(&vars_path, "ubuntuTag=16.04\n").unwrap();
        let password_path = dir.path().join("password");
        fs::write(&password_path, "rivendell\n").unwrap();

        unsafe {
            std::env::set_var("DORIATH_TEST_PASSWORD", "testpassword");
        }

        let content = r#"
root_dir: .
pull:
  - busybox:1
build:
  - name: "ubuntu"
    tag: "{{ ubuntuTag }}"
    from: "provided"
  - name: "human/aragorn"
    tag: "{{ aragornTag }}"
    from: "./human/aragorn"
    depend: "ubuntu"
    pre_build: "./init.sh"
    post_build: "./finalize.sh"
    force_build: true
    push_latest: true
    platforms:
      - linux/amd64
      - linux/arm64
credentials:
  - name: gcr.io
    registry: "https://gcr.io"
    username: "username"
    password: "$DORIATH_TEST_PASSWORD"
  - name: dockerhub
    username: "username"
    password_file: password
unknown_top_level_key: ignored
"#;
        let mut variables = HashMap::new();
        variables.insert("aragornTag".to_string(), "3.1.4".to_string());

        let config_path = dir.path().join("doriath.yml");
        fs::write(&config_path, content).unwrap();
        let tree =
            read_build_tree_from_file(&config_path, &variables, &[dir.path().join("vars")])
                .unwrap();

        let ubuntu = tree.node("library/ubuntu").unwrap();
        assert_eq!(ubuntu.tag, "16.04");
        assert_eq!(ubuntu.build_root, BuildRoot::Provided);
        assert_eq!(ubuntu.depend, "");

        let aragorn = tree.node("human/aragorn").unwrap();
        assert_eq!(aragorn.tag, "3.1.4");
        assert_eq!(
            aragorn.build_root,
            BuildRoot::Path(dir.path().join(".").join("./human/aragorn"))
        );
        assert_eq!(aragorn.depend, "library/ubuntu");
        assert_eq!(aragorn.pre_build, "./init.sh");
        assert_eq!(aragorn.post_build, "./finalize.sh");
        assert!(aragorn.force_build);
        assert!(aragorn.push_latest);
        assert_eq!(aragorn.platforms, vec!["linux/amd64", "linux/arm64"]);

        assert_eq!(tree.pull_list(), ["busybox:1"]);

        let gcr = tree.credential_for("gcr.io").unwrap();
        assert_eq!(gcr.registry, "https://gcr.io");
        assert_eq!(gcr.password, "testpassword");
        let dockerhub = tree.credential_for("dockerhub").unwrap();
        assert_eq!(dockerhub.registry, "");
        assert_eq!(dockerhub.password, "rivendell");

        unsafe {
            std::env::remove_var("DORIATH_TEST_PASSWORD");
        }
    }

    #[test]
    fn test_missing_password_file() {
        let content = r#"
root_dir: .
credentials:
  - name: dockerhub
    username: "username"
    password_file: does-not-exist
"#;
        let err =
            read_build_tree_from_str(content, &HashMap::new(), &[]).unwrap_err();
        assert!(matches!(err, TreeError::CredentialFile { .. }));
    }

    #[test]
    fn test_decode_error() {
        let content = "build: {not: [a, list}\n";
        let err = read_build_tree_from_str(content, &HashMap::new(), &[]).unwrap_err();
        assert!(matches!(err, TreeError::ConfigDecode(_)));
    }

    #[test]
    fn test_absolute_build_root_kept_verbatim() {
        let content = r#"
root_dir: sub
build:
  - name: app
    tag: "1.0"
    from: /absolute/path
"#;
        let tree = read_build_tree_from_str(content, &HashMap::new(), &[]).unwrap();
        let node = tree.node("library/app").unwrap();
        assert_eq!(node.build_root, BuildRoot::Path(PathBuf::from("/absolute/path")));
    }
}
