mod functions;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value as Json};
use tickflow::data::{FieldData, parse_field};
use tickflow::{BlockId, DataMap, EngineConfig, FileStorage, Graph, Storage, Value};

#[derive(Parser)]
#[command(name = "tickflow")]
#[command(about = "Run and inspect tickflow flows")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a flow as a job, settle it and print the result
    Run {
        /// Path to a flow .json file
        file: PathBuf,
        /// Maximum number of drains
        #[arg(long)]
        rounds: Option<usize>,
        /// State directory (load on start, save on exit)
        #[arg(long)]
        state: Option<PathBuf>,
        /// Engine config .toml file
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Check that a flow file parses and summarize it
    Check {
        /// Path to a flow .json file
        file: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::new().filter_level(log::LevelFilter::Warn).parse_default_env().init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { file, rounds, state, config } => run(&file, rounds, state, config).await,
        Commands::Check { file } => check(&file),
    }
}

fn read_flow(file: &Path) -> Result<DataMap> {
    let text = fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let json = serde_json::from_str::<Json>(&text)
        .with_context(|| format!("parsing {}", file.display()))?;
    match json {
        Json::Object(map) => Ok(map),
        _ => bail!("{} must contain a JSON object", file.display()),
    }
}

fn job_name(file: &Path) -> String {
    file.file_stem().and_then(|s| s.to_str()).unwrap_or("main").to_string()
}

async fn run(
    file: &Path,
    rounds: Option<usize>,
    state: Option<PathBuf>,
    config: Option<PathBuf>,
) -> Result<()> {
    let config = match config {
        Some(path) => EngineConfig::load(&path)?,
        None => EngineConfig::default(),
    };
    let rounds = rounds.unwrap_or(config.max_rounds);
    let mut graph = Graph::new(config);
    functions::register(&mut graph);

    let name = job_name(file);
    let storage = state.map(FileStorage::new);
    let stored = match &storage {
        Some(storage) => storage.load_flow(&name).await?,
        None => None,
    };
    let job = match stored {
        Some(data) => {
            eprintln!("Resuming {} from state", name);
            graph.add_job(&name, &data)
        }
        None => {
            eprintln!("Running: {}", file.display());
            graph.add_job(&name, &read_flow(file)?)
        }
    };

    if !graph.run_all(rounds) {
        log::warn!("{} still busy after {} rounds", name, rounds);
    }
    let waiting = graph.pending_task_count();
    if waiting > 0 {
        eprintln!("{} async runs still pending", waiting);
    }

    let mut out = Map::new();
    out.insert("flow".to_string(), Json::Object(graph.save(job)));
    out.insert("values".to_string(), live_values(&graph, job));
    println!("{}", serde_json::to_string_pretty(&Json::Object(out))?);

    if let Some(storage) = &storage {
        graph.save_job(storage, &name).await?;
    }
    Ok(())
}

/// Current values of a block's properties, nested blocks expanded.
fn live_values(graph: &Graph, block: BlockId) -> Json {
    let mut out = Map::new();
    for (name, prop) in graph.properties(block) {
        let json = match graph.value(prop) {
            Value::Block(child) if graph.is_alive(child) && graph.parent(child) == Some(block) => {
                live_values(graph, child)
            }
            value => match value.to_json() {
                Some(json) => json,
                None if value.is_undefined() => continue,
                None => Json::String(value.to_string()),
            },
        };
        out.insert(name, json);
    }
    Json::Object(out)
}

#[derive(Default)]
struct Summary {
    blocks: usize,
    flows: usize,
    helpers: usize,
    bindings: usize,
    functions: Vec<String>,
}

impl Summary {
    fn walk(&mut self, data: &DataMap) {
        for (key, json) in data {
            match parse_field(key, json) {
                (_, FieldData::Binding(Some(_))) => self.bindings += 1,
                (_, FieldData::Block(map)) => {
                    match map.get("#is").and_then(Json::as_str) {
                        Some("flow") => self.flows += 1,
                        Some(id) => {
                            self.blocks += 1;
                            if !self.functions.iter().any(|f| f == id) {
                                self.functions.push(id.to_string());
                            }
                        }
                        None => self.blocks += 1,
                    }
                    self.walk(map);
                }
                (_, FieldData::Helper(map)) => {
                    self.helpers += 1;
                    self.bindings += 1;
                    self.walk(map);
                }
                _ => {}
            }
        }
    }
}

fn check(file: &Path) -> Result<()> {
    let data = read_flow(file)?;
    let mut summary = Summary::default();
    summary.walk(&data);

    let mut graph = Graph::default();
    functions::register(&mut graph);
    let unknown: Vec<&str> =
        summary.functions.iter().map(String::as_str).filter(|id| !graph.has_function(id)).collect();

    println!(
        "{}: {} blocks, {} flows, {} helpers, {} bindings",
        file.display(),
        summary.blocks,
        summary.flows,
        summary.helpers,
        summary.bindings
    );
    if !unknown.is_empty() {
        println!("unregistered functions: {}", unknown.join(", "));
    }
    Ok(())
}
