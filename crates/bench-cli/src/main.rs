use anyhow::Result;
use bench_compiler::{
    read_optimal_tps, BenchmarkPlan, CompileError, CompileOptions, LookupPolicy, MonitorSettings,
    PlanCompiler, ProcessEnv, ScenarioTree,
};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Number, Value};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "bench",
    version,
    about = "Compile benchmark scenarios into executable plans",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    #[command(flatten)]
    generate: GenerateArgs,
}

#[derive(Args, Clone, Default)]
struct SourceArgs {
    /// Scenario tree to read.
    #[arg(long, default_value = "./scenarios.json")]
    scenarios: PathBuf,
    #[arg(long)]
    json: bool,
}

#[derive(Args, Clone, Default)]
struct CompileArgs {
    /// Scenario id, or the id of a round nested in any scenario.
    #[arg(long)]
    scenario: Option<String>,
    /// Value substituted for the OPTIMAL placeholder.
    #[arg(long = "optimal-tps", alias = "optimalTps", value_parser = parse_optimal)]
    optimal_tps: Option<Number>,
    /// File holding the optimal TPS as a single number.
    #[arg(long)]
    optimal_tps_file: Option<PathBuf>,
    /// Fail instead of taking the first match when a round id is not unique.
    #[arg(long)]
    strict_round_ids: bool,
    /// Leave the metrics push exporter out of the monitor block.
    #[arg(long)]
    no_metrics_push: bool,
    #[command(flatten)]
    source: SourceArgs,
}

#[derive(Args, Clone, Default)]
struct GenerateArgs {
    /// Where to write the plan document.
    #[arg(long)]
    output: Option<PathBuf>,
    #[command(flatten)]
    compile: CompileArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a scenario and write the plan (the default when no subcommand is given).
    Generate(GenerateArgs),
    /// Compile a scenario and print a summary without writing anything.
    Describe(CompileArgs),
    /// List every scenario with its shape and round ids.
    List(SourceArgs),
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Generate(cli.generate));
    let json_mode = command_json_mode(&command);
    let result = run_command(command);
    match result {
        Ok(Some(payload)) => {
            emit_json(&payload);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            if json_mode {
                let code = err
                    .downcast_ref::<CompileError>()
                    .map(|e| e.code())
                    .unwrap_or("command_failed");
                emit_json(&json_error(code, format!("{:#}", err), json!({})));
                std::process::exit(1);
            }
            Err(err)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_command(command: Commands) -> Result<Option<Value>> {
    match command {
        Commands::Generate(args) => {
            let output = args.output.clone().ok_or_else(|| missing_argument("--output"))?;
            let (scenario, plan) = compile_from_args(&args.compile)?;
            let digest = bench_compiler::write_plan(&output, &plan)?;
            tracing::info!(output = %output.display(), %digest, "wrote benchmark plan");
            if args.compile.source.json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "generate",
                    "scenario": scenario,
                    "output": output.display().to_string(),
                    "digest": digest,
                    "summary": plan_to_json(&plan)
                })));
            }
            println!("wrote: {}", output.display());
            println!("scenario: {}", scenario);
            println!("rounds: {}", plan.test.rounds.len());
            println!("digest: {}", digest);
        }
        Commands::Describe(args) => {
            let (scenario, plan) = compile_from_args(&args)?;
            let rendered = bench_compiler::render_yaml(&plan)?;
            let digest = bench_compiler::sha256_digest(rendered.as_bytes());
            if args.source.json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "describe",
                    "scenario": scenario,
                    "digest": digest,
                    "summary": plan_to_json(&plan)
                })));
            }
            println!("scenario: {}", scenario);
            print_summary(&plan);
            println!("digest: {}", digest);
        }
        Commands::List(args) => {
            let tree = ScenarioTree::from_path(&args.scenarios)?;
            if args.json {
                let scenarios: Vec<Value> = tree
                    .iter()
                    .map(|s| {
                        json!({
                            "id": s.id,
                            "shape": s.shape.as_str(),
                            "description": s.description,
                            "rounds": s.rounds().iter().map(|r| r.id.as_str()).collect::<Vec<_>>()
                        })
                    })
                    .collect();
                return Ok(Some(json!({
                    "ok": true,
                    "command": "list",
                    "scenarios": scenarios
                })));
            }
            for s in tree.iter() {
                let rounds: Vec<&str> = s.rounds().iter().map(|r| r.id.as_str()).collect();
                if rounds.is_empty() {
                    println!("{} ({})", s.id, s.shape.as_str());
                } else {
                    println!("{} ({}): {}", s.id, s.shape.as_str(), rounds.join(", "));
                }
            }
        }
    }
    Ok(None)
}

fn compile_from_args(args: &CompileArgs) -> Result<(String, BenchmarkPlan)> {
    let scenario = args
        .scenario
        .clone()
        .ok_or_else(|| missing_argument("--scenario"))?;
    let tree = ScenarioTree::from_path(&args.source.scenarios)?;
    let optimal_tps = match (&args.optimal_tps, &args.optimal_tps_file) {
        (Some(n), _) => Some(n.clone()),
        (None, Some(path)) => Some(read_optimal_tps(path)?),
        (None, None) => None,
    };
    let env = ProcessEnv;
    let mut monitors = MonitorSettings::from_env(&env);
    if args.no_metrics_push {
        monitors = monitors.without_push();
    }
    let options = CompileOptions {
        optimal_tps,
        lookup: if args.strict_round_ids {
            LookupPolicy::Unique
        } else {
            LookupPolicy::FirstMatch
        },
        monitors,
    };
    let plan = PlanCompiler::new(&tree, &env)
        .with_options(options)
        .compile(&scenario)?;
    Ok((scenario, plan))
}

fn missing_argument(flag: &str) -> anyhow::Error {
    anyhow::Error::new(CompileError::MissingRequiredArgument {
        scope: "command line (example: bench --scenario=A1 --output=benchmarks/A1.yaml)".to_string(),
        field: flag.to_string(),
    })
}

fn parse_optimal(raw: &str) -> std::result::Result<Number, String> {
    bench_compiler::parse_number(raw).ok_or_else(|| format!("'{}' is not a number", raw))
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\",\"details\":{{}}}}}}"
        ),
    }
}

fn json_error(code: &str, message: String, details: Value) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message,
            "details": details
        }
    })
}

fn command_json_mode(command: &Commands) -> bool {
    match command {
        Commands::Generate(args) => args.compile.source.json,
        Commands::Describe(args) => args.source.json,
        Commands::List(args) => args.json,
    }
}

fn plan_to_json(plan: &BenchmarkPlan) -> Value {
    json!({
        "name": plan.test.name,
        "description": plan.test.description,
        "workers": plan.test.workers.number,
        "rounds": plan.test.rounds.iter().map(|r| json!({
            "label": r.label,
            "tx_duration": r.tx_duration,
            "rate_control": r.rate_control.kind,
            "tps": r.rate_control.tps(),
            "module": r.workload.module,
        })).collect::<Vec<_>>()
    })
}

fn print_summary(plan: &BenchmarkPlan) {
    println!("name: {}", plan.test.name);
    println!("description: {}", plan.test.description);
    println!("workers: {}", plan.test.workers.number);
    println!("rounds: {}", plan.test.rounds.len());
    for r in &plan.test.rounds {
        let tps = r
            .rate_control
            .tps()
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  - {}: {} tps={} duration={}s module={}",
            r.label, r.rate_control.kind, tps, r.tx_duration, r.workload.module
        );
    }
    if !plan.monitors.transaction.is_empty() {
        println!("metrics_push: enabled");
    }
}
