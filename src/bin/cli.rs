//! pathquery CLI 工具
//!
//! 对工作区文件做校验、查看执行计划、执行查询

use anyhow::{anyhow, Context};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use pathquery::cli::{PrintMode, Printer};
use pathquery::import::WorkspaceImporter;
use pathquery::metrics::global_metrics;
use pathquery::{
    CancelToken, DefinitionStore, EngineConfig, ExecuteOptions, ExecuteRequest, MemoryGraph,
    OrderBy, QueryEngine, QueryId, TraversalCapability, ValuePredicate,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pathquery-cli")]
#[command(about = "pathquery 命令行工具", version)]
struct Cli {
    /// 工作区文件（JSON）
    #[arg(short, long, global = true, default_value = "./workspace.json")]
    workspace: PathBuf,

    /// 引擎配置文件（TOML）
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// 覆盖配置中的子查询深度上限
    #[arg(long, global = true)]
    max_depth: Option<usize>,

    /// 垂直显示结果
    #[arg(long, global = true)]
    vertical: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 导入工作区并逐个编译全部查询
    Check,
    /// 输出查询的执行计划
    Plan(QueryArgs),
    /// 执行查询
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct QueryArgs {
    /// 查询名称或 ID
    query: String,

    /// 临时过滤条件（JSON 格式的谓词，可重复）
    #[arg(short, long)]
    filter: Vec<String>,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    query: QueryArgs,

    #[arg(short, long)]
    limit: Option<usize>,

    #[arg(short, long, default_value = "0")]
    offset: usize,

    /// 排序字段，`-` 前缀表示降序
    #[arg(long)]
    order_by: Option<OrderBy>,

    /// 执行后输出指标
    #[arg(long)]
    stats: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("加载配置 {:?} 失败", path))?,
        None => EngineConfig::default(),
    };
    if let Some(depth) = cli.max_depth {
        config.max_depth = depth;
    }

    let store = Arc::new(DefinitionStore::with_config(&config));
    let (stats, graph) = WorkspaceImporter::new(Arc::clone(&store))
        .import_file(&cli.workspace)
        .with_context(|| format!("导入工作区 {:?} 失败", cli.workspace))?;
    let engine = QueryEngine::new(store, config);

    let mode = if cli.vertical {
        PrintMode::Vertical
    } else {
        PrintMode::Table
    };
    let printer = Printer::new(mode);

    match cli.command {
        Command::Check => check(&engine, &printer, &stats),
        Command::Plan(args) => plan(&engine, &printer, &args),
        Command::Run(args) => run(&engine, &graph, &printer, &args),
    }
}

fn check(
    engine: &QueryEngine,
    printer: &Printer,
    stats: &pathquery::import::ImportStats,
) -> anyhow::Result<()> {
    print!("{}", printer.print_stats(stats));
    let snapshot = engine.store().snapshot();
    print!("{}", printer.print_queries(&snapshot));

    let cancel = CancelToken::new();
    let mut failed = 0;
    for query in snapshot.queries() {
        match engine.compile(query.id, &cancel) {
            Ok(plan) => println!(
                "{} {} ({} 个叶子)",
                "OK".green(),
                query.name,
                plan.expr.leaf_count()
            ),
            Err(e) => {
                failed += 1;
                println!("{} {}: {}", "ERR".red(), query.name, e);
            }
        }
    }
    if failed > 0 {
        return Err(anyhow!("{} 个查询编译失败", failed));
    }
    Ok(())
}

fn plan(engine: &QueryEngine, printer: &Printer, args: &QueryArgs) -> anyhow::Result<()> {
    let request = build_request(engine, args, ExecuteOptions::default())?;
    let plan = engine.plan_for(&request, &CancelToken::new())?;
    print!("{}", printer.print_plan(&plan, plan.plan_hash()?));
    Ok(())
}

fn run(
    engine: &QueryEngine,
    graph: &MemoryGraph,
    printer: &Printer,
    args: &RunArgs,
) -> anyhow::Result<()> {
    let options = ExecuteOptions {
        limit: args.limit,
        offset: args.offset,
        order_by: args.order_by.clone(),
    };
    let request = build_request(engine, &args.query, options)?;

    let start = Instant::now();
    let resp = engine.execute(&request, graph, &CancelToken::new())?;
    let elapsed = start.elapsed().as_millis() as u64;

    let order_values = match &args.order_by {
        Some(order) if !order.is_id() => Some(
            resp.results
                .iter()
                .map(|id| {
                    Ok(graph
                        .order_value(*id, &order.field)?
                        .map(|v| v.to_string())
                        .unwrap_or_default())
                })
                .collect::<pathquery::Result<Vec<String>>>()?,
        ),
        _ => None,
    };
    let order_column = args
        .order_by
        .as_ref()
        .zip(order_values.as_deref())
        .map(|(order, values)| (order.field.as_str(), values));

    print!("{}", printer.print_response(&resp, order_column, args.offset, elapsed));

    if args.stats {
        let snapshot = global_metrics().snapshot();
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    }
    Ok(())
}

/// 查询参数可以是名称或数字 ID
fn resolve_query(engine: &QueryEngine, query: &str) -> anyhow::Result<QueryId> {
    let snapshot = engine.store().snapshot();
    if let Some(node) = snapshot.query_by_name(query) {
        return Ok(node.id);
    }
    let id = query
        .trim_start_matches('q')
        .parse::<u64>()
        .map(QueryId::new)
        .map_err(|_| anyhow!("未找到查询: {}", query))?;
    snapshot
        .query(id)
        .map(|node| node.id)
        .ok_or_else(|| anyhow!("未找到查询: {}", query))
}

fn build_request(
    engine: &QueryEngine,
    args: &QueryArgs,
    options: ExecuteOptions,
) -> anyhow::Result<ExecuteRequest> {
    let mut request = ExecuteRequest::new(resolve_query(engine, &args.query)?).with_options(options);
    for raw in &args.filter {
        let filter: ValuePredicate = serde_json::from_str(raw)
            .with_context(|| format!("无效的过滤条件: {}", raw))?;
        request = request.with_filter(filter);
    }
    Ok(request)
}
