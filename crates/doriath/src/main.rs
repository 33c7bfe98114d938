//! doriath — Dockerビルドグラフを管理するCLI
//!
//! 設定ファイル（デフォルト `doriath.yml`）からビルドツリーを読み込み、
//! dryrun / build / trybuild / push / clean などのサブコマンドを提供します。

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "doriath", version, about = "Dockerビルドグラフを管理するシンプルなツール")]
struct Cli {
    /// 設定ファイルのパス
    #[arg(long, global = true, default_value = "doriath.yml")]
    config: PathBuf,

    /// 設定ファイルに渡すテンプレート変数（KEY=VALUE、繰り返し指定可）
    #[arg(short = 'x', long = "variable", global = true, value_name = "KEY=VALUE")]
    variables: Vec<String>,

    /// dotenv形式の変数ファイル（繰り返し指定可）
    #[arg(long = "variable-file", global = true, value_name = "PATH")]
    variable_files: Vec<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// ビルドステップと起こりうるエラーを事前確認する
    Dryrun {
        /// dirtyチェックをスキップする
        #[arg(long)]
        skip_check: bool,
        /// 色を付けずに出力する
        #[arg(short = 'c', long)]
        no_color: bool,
    },
    /// 新しいイメージをすべてビルドする
    Build,
    /// 一時タグでビルドできることを確認し、イメージを削除する
    Trybuild,
    /// 新しいイメージをレジストリにプッシュする
    Push,
    /// ビルド対象のイメージをローカルから削除する
    Clean,
    /// latest と同じマニフェストを持つタグを探す
    Findlatest {
        /// イメージ名（例: gcr.io/project/app）
        image: String,
    },
    /// イメージがレジストリに現れるまで待機する
    Waitimage {
        /// イメージ名（例: gcr.io/project/app:1.0）
        image: String,
        /// 待機のタイムアウト
        #[arg(short = 't', long, default_value = "5m", value_parser = humantime::parse_duration)]
        timeout: Duration,
        /// リトライの間隔
        #[arg(short = 'i', long, default_value = "1s", value_parser = humantime::parse_duration)]
        interval: Duration,
    },
    /// バージョンを表示する
    Version,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    // -x KEY=VALUE をパース。形式不正はCLI利用方法の誤り
    let variables = match parse_variables(&cli.variables) {
        Ok(variables) => variables,
        Err(invalid) => {
            eprintln!("不正な変数指定です: {invalid}（KEY=VALUE 形式で指定してください）");
            return ExitCode::from(2);
        }
    };

    if let Err(err) = run(&cli, &variables) {
        print_error(&err);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn run(cli: &Cli, variables: &HashMap<String, String>) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Dryrun {
            skip_check,
            no_color,
        } => commands::dryrun::run(
            &cli.config,
            variables,
            &cli.variable_files,
            *skip_check,
            *no_color,
        ),
        Commands::Build => commands::build::run(&cli.config, variables, &cli.variable_files),
        Commands::Trybuild => commands::trybuild::run(&cli.config, variables, &cli.variable_files),
        Commands::Push => commands::push::run(&cli.config, variables, &cli.variable_files),
        Commands::Clean => commands::clean::run(&cli.config, variables, &cli.variable_files),
        Commands::Findlatest { image } => {
            commands::findlatest::run(&cli.config, variables, &cli.variable_files, image)
        }
        Commands::Waitimage {
            image,
            timeout,
            interval,
        } => commands::waitimage::run(
            &cli.config,
            variables,
            &cli.variable_files,
            image,
            *timeout,
            *interval,
        ),
        Commands::Version => {
            println!("doriath {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn parse_variables(raw: &[String]) -> Result<HashMap<String, String>, String> {
    let mut variables = HashMap::new();
    for entry in raw {
        match entry.split_once('=') {
            Some((key, value)) => {
                variables.insert(key.to_string(), value.to_string());
            }
            None => return Err(entry.clone()),
        }
    }
    Ok(variables)
}

/// DEBUG=true|1 のときだけエラーの全文脈を表示する
fn print_error(err: &anyhow::Error) {
    let debug_enabled = matches!(std::env::var("DEBUG").as_deref(), Ok("true") | Ok("1"));
    if debug_enabled {
        eprintln!("{} {:?}", "ERROR:".red().bold(), err);
    } else {
        eprintln!("{} {}", "ERROR:".red().bold(), err.root_cause());
    }
}
