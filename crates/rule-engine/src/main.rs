//! 规则引擎命令行
//!
//! 对 JSON Lines 数据集执行单个规则树或工作流链，结果以 JSON 输出到标准输出。

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use cohort_shared::config::AppConfig;
use cohort_shared::observability;
use rule_engine::{
    ChainExecutor, JsonLinesLoader, ReferenceTable, ReferenceTables, RuleCompiler, RuleExecutor,
    RuleGroup, Workflow, WorkflowChain, WorkflowChainStep, WorkflowStore, from_loader,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "rule-engine", version, about = "Cohort rule engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 对数据集评估一个规则树
    Evaluate {
        /// 规则树 JSON 文件
        #[arg(long)]
        rules: PathBuf,

        #[command(flatten)]
        input: InputArgs,
    },
    /// 按顺序执行多个工作流
    Chain {
        /// 工作流定义 JSON 文件（数组）
        #[arg(long)]
        workflows: PathBuf,

        /// 按执行顺序给出的工作流 id
        #[arg(long = "step", required = true)]
        steps: Vec<String>,

        #[command(flatten)]
        input: InputArgs,
    },
}

#[derive(Args)]
struct InputArgs {
    /// 数据集（JSON Lines，每行一个对象）
    #[arg(long)]
    data: PathBuf,

    /// 引用表，格式为 id=path.jsonl，可重复
    #[arg(long = "reference", value_parser = parse_reference)]
    references: Vec<(String, PathBuf)>,

    /// 在结果中附带评估诊断信息
    #[arg(long)]
    trace: bool,

    /// 美化输出
    #[arg(long)]
    pretty: bool,
}

fn parse_reference(raw: &str) -> std::result::Result<(String, PathBuf), String> {
    match raw.split_once('=') {
        Some((id, path)) if !id.trim().is_empty() && !path.trim().is_empty() => {
            Ok((id.trim().to_string(), PathBuf::from(path.trim())))
        }
        _ => Err(format!("引用表参数格式应为 id=path，实际为 '{}'", raw)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load("rule-engine").unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });

    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config)?;

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_interrupt(cancel.clone()));

    let mut executor = RuleExecutor::with_config(config.engine.clone()).with_cancellation(cancel);

    match cli.command {
        Command::Evaluate { rules, input } => {
            if input.trace {
                executor = executor.with_trace();
            }
            let group: RuleGroup = read_json(&rules)?;
            RuleCompiler::validate(&group)?;

            let tables = load_reference_tables(&input.references)?;
            let source = from_loader(JsonLinesLoader::open(&input.data)?, &config.engine)?;
            info!(rows = source.len(), "开始评估规则");

            let result = executor
                .evaluate_rules(source.as_ref(), &group, &tables)
                .await?;
            print_json(&result, input.pretty)?;
        }
        Command::Chain {
            workflows,
            steps,
            input,
        } => {
            if input.trace {
                executor = executor.with_trace();
            }
            let store = WorkflowStore::new();
            let definitions: Vec<Workflow> = read_json(&workflows)?;
            for workflow in definitions {
                store.load(workflow)?;
            }

            let chain = WorkflowChain::new(
                "cli",
                steps
                    .iter()
                    .enumerate()
                    .map(|(i, id)| WorkflowChainStep::new(id.as_str(), i as u32 + 1))
                    .collect(),
            );

            let tables = load_reference_tables(&input.references)?;
            let source = from_loader(JsonLinesLoader::open(&input.data)?, &config.engine)?;
            info!(rows = source.len(), steps = chain.steps.len(), "开始执行工作流链");

            let result = ChainExecutor::new(store, executor)
                .execute(&chain, source.as_ref(), &tables, |progress| {
                    info!(progress, "链执行进度");
                })
                .await?;
            print_json(&result, input.pretty)?;
        }
    }

    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("读取文件失败: {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("解析 JSON 失败: {}", path.display()))
}

fn load_reference_tables(specs: &[(String, PathBuf)]) -> Result<ReferenceTables> {
    let mut tables = ReferenceTables::new();
    for (id, path) in specs {
        if tables.contains_key(id) {
            bail!("引用表 id 重复: {}", id);
        }
        let rows = JsonLinesLoader::open(path)?.read_all()?;
        info!(table_id = %id, rows = rows.len(), "引用表已加载");
        tables.insert(id.clone(), ReferenceTable::new(id.as_str(), rows));
    }
    Ok(tables)
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let stdout = std::io::stdout().lock();
    if pretty {
        serde_json::to_writer_pretty(stdout, value)?;
    } else {
        serde_json::to_writer(stdout, value)?;
    }
    println!();
    Ok(())
}

/// Ctrl+C 时取消正在进行的评估
async fn cancel_on_interrupt(token: CancellationToken) {
    match signal::ctrl_c().await {
        Ok(()) => {
            warn!("Received Ctrl+C, cancelling evaluation...");
            token.cancel();
        }
        Err(e) => warn!("Failed to install Ctrl+C handler: {}", e),
    }
}
