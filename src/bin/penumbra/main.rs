//! Inspection CLI: loads a CSV graph, builds a pattern plan from flags,
//! optimizes it and prints the plan and its rows.
#![forbid(unsafe_code)]

mod load;
mod pattern;
mod ui;

use std::error::Error;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use penumbra::query::builder::PlanBuilder;
use penumbra::query::profile::profile_snapshot;
use penumbra::query::record::ParamTable;
use penumbra::query::{ExecContext, ExecutionPlan};
use penumbra::storage::GraphTxn;
use penumbra::telemetry::init_tracing;
use penumbra::{ExecError, ExecOptions};
use serde_json::json;

use load::{load_graph, GraphSource};
use ui::{Theme, Ui};

/// Failures surfaced by the CLI.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Malformed flag or input file content.
    #[error("{0}")]
    Message(String),
    /// Planning or execution failed.
    #[error(transparent)]
    Exec(#[from] ExecError),
    /// A CSV file could not be read.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    /// A flag grammar failed to compile.
    #[error("invalid pattern syntax: {0}")]
    Regex(#[from] regex::Error),
}

#[derive(Parser, Debug)]
#[command(
    name = "penumbra",
    version,
    about = "Build, optimize and run pattern plans over CSV graphs",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(long, global = true, env = "PENUMBRA_CONFIG", value_name = "FILE", help = "Execution options (TOML)")]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format"
    )]
    format: OutputFormat,

    #[arg(long, global = true, value_enum, default_value_t = Theme::Auto, help = "Color theme")]
    theme: Theme,

    #[arg(long, short, global = true, help = "Print rows only")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the plan and print its rows.
    Run(QueryArgs),
    /// Print the plan without running it.
    Explain(QueryArgs),
}

#[derive(Args, Debug)]
struct QueryArgs {
    #[arg(long, value_name = "FILE", help = "Vertex CSV with id,label,<props> columns")]
    vertices: PathBuf,

    #[arg(long, value_name = "FILE", help = "Edge CSV with src,dst,type,<props> columns")]
    edges: Option<PathBuf>,

    #[arg(long = "index", value_name = "LABEL.FIELD", help = "Secondary index to build")]
    indexes: Vec<String>,

    #[arg(
        long = "match",
        value_name = "PATTERN",
        required = true,
        help = "Path pattern such as (a:Person)-[:KNOWS]->(b)"
    )]
    patterns: Vec<String>,

    #[arg(long = "where", value_name = "PREDICATE", help = "Conjoined predicate such as a.age > 30")]
    predicates: Vec<String>,

    #[arg(long = "return", value_name = "EXPR [AS NAME]", help = "Projected column")]
    projections: Vec<String>,

    #[arg(long, value_name = "KEY[:desc]", help = "Sort key")]
    order_by: Vec<String>,

    #[arg(long)]
    skip: Option<usize>,

    #[arg(long)]
    limit: Option<usize>,

    #[arg(long)]
    distinct: bool,

    #[arg(long = "param", value_name = "NAME=VALUE", help = "Query parameter")]
    params: Vec<String>,

    #[arg(long, help = "Skip the optimizer passes")]
    no_optimize: bool,

    #[arg(long, value_name = "N", help = "Worker threads for parallel traversal")]
    threads: Option<usize>,

    #[arg(long, help = "Print the plan before the rows")]
    explain: bool,

    #[arg(long, help = "Time operator families while running")]
    profile: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() {
    init_tracing("warn");
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let ui = Ui::new(cli.theme, cli.quiet);
    let mut options = match &cli.config {
        Some(path) => ExecOptions::load(path)?,
        None => ExecOptions::load_default()?,
    };
    let (args, execute) = match &cli.command {
        Command::Run(args) => (args, true),
        Command::Explain(args) => (args, false),
    };
    if let Some(threads) = args.threads {
        options.parallel_traversal_threads = threads;
    }
    if args.no_optimize {
        options.enable_optimizer = false;
    }
    options.profile |= args.profile;

    let mut loaded = load_graph(&GraphSource {
        vertices: args.vertices.clone(),
        edges: args.edges.clone(),
        indexes: args.indexes.clone(),
    })?;
    let mut plan = build_plan(args, &options)?;
    let passes = plan.optimize(&loaded.graph.schema_info(), &options)?;
    if args.no_optimize {
        ui.warn("optimizer passes skipped");
    }

    if !execute {
        match cli.format {
            OutputFormat::Json => println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "plan": plan.explain(), "passes": passes }))?
            ),
            OutputFormat::Text => print_plan(&ui, &plan, &passes),
        }
        return Ok(());
    }

    let params = parse_params(&args.params)?;
    let profiling = options.profile;
    let mut ctx = ExecContext::with_options(&mut loaded.graph, options).with_params(params);
    let result = plan.execute(&mut ctx)?;
    match cli.format {
        OutputFormat::Json => {
            let mut body = json!({ "result": result.to_json(), "passes": passes });
            if args.explain {
                body["plan"] = serde_json::to_value(plan.explain())?;
            }
            if let Some(snapshot) = profiling.then(|| profile_snapshot(false)).flatten() {
                body["profile"] = serde_json::to_value(snapshot)?;
            }
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        OutputFormat::Text => {
            if args.explain {
                print_plan(&ui, &plan, &passes);
            }
            ui.section(
                "Graph",
                [("vertices", loaded.vertices), ("edges", loaded.edges), ("rows", result.len())],
            );
            ui.table(&result);
            if result.is_empty() {
                ui.info("no rows");
            }
            if let Some(snapshot) = profiling.then(|| profile_snapshot(false)).flatten() {
                ui.section(
                    "Profile",
                    snapshot
                        .entries()
                        .into_iter()
                        .filter(|(_, timing)| timing.calls > 0)
                        .map(|(family, timing)| (family, format!("{} calls, {} us", timing.calls, timing.nanos / 1_000))),
                );
            }
        }
    }
    Ok(())
}

fn build_plan(args: &QueryArgs, options: &ExecOptions) -> Result<ExecutionPlan, CliError> {
    let mut builder = PlanBuilder::new().path_unique(options.path_unique);
    for text in &args.patterns {
        builder = pattern::apply_path(builder, text)?;
    }
    for text in &args.predicates {
        builder = builder.filter(pattern::parse_predicate(text)?);
    }
    if !args.projections.is_empty() {
        let items = args
            .projections
            .iter()
            .map(|text| pattern::parse_projection(text))
            .collect::<Result<Vec<_>, _>>()?;
        builder = builder.select(items);
    }
    for key in &args.order_by {
        builder = match key.rsplit_once(':') {
            Some((key, dir)) if dir.eq_ignore_ascii_case("desc") => builder.order_by(key, true),
            Some((key, dir)) if dir.eq_ignore_ascii_case("asc") => builder.order_by(key, false),
            _ => builder.order_by(key, false),
        };
    }
    if args.distinct {
        builder = builder.distinct();
    }
    if let Some(skip) = args.skip {
        builder = builder.skip(skip);
    }
    if let Some(limit) = args.limit {
        builder = builder.limit(limit);
    }
    Ok(builder.build()?)
}

fn parse_params(raw: &[String]) -> Result<ParamTable, CliError> {
    let mut params = ParamTable::new();
    for entry in raw {
        let Some((name, value)) = entry.split_once('=') else {
            return Err(CliError::Message(format!("parameter '{entry}' must be NAME=VALUE")));
        };
        params.insert(name.trim().trim_start_matches('$').to_string(), load::parse_value(value));
    }
    Ok(params)
}

fn print_plan(ui: &Ui, plan: &ExecutionPlan, passes: &[&'static str]) {
    ui.plan("Plan", &plan.explain());
    ui.list("Optimizer passes", passes.iter().map(|pass| pass.to_string()));
    let access = plan.access_summary();
    ui.section(
        "Access",
        [
            ("labels", access.labels.iter().cloned().collect::<Vec<_>>().join(", ")),
            ("types", access.relationship_types.iter().cloned().collect::<Vec<_>>().join(", ")),
        ],
    );
}
