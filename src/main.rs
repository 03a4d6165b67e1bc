use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use schemars::schema_for;
use tracing::{error, info};

use apiflow::config::EditorConfig;
use apiflow::executor::ReqwestExecutor;
use apiflow::flow::{FlowEditor, FlowFile};
use apiflow::logger::init_tracing;

#[derive(Parser, Debug)]
#[command(name = "apiflow", about = "Visual API flow engine", version)]
struct Cli {
    /// Log level directive (e.g. error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Also write rolling logs into this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Editor config file (JSON); defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute a flow and print the run report
    Run(RunArgs),

    /// Lint a flow file without executing it
    Validate { file: PathBuf },

    /// Emit JSON Schemas for the flow file and config formats
    Schema(SchemaArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Flow file to execute; the built-in demo flow when omitted
    #[arg(long)]
    flow: Option<PathBuf>,

    /// Node to start from; the first node of the flow when omitted
    #[arg(long)]
    start: Option<String>,
}

#[derive(Args, Debug)]
struct SchemaArgs {
    /// Output directory
    #[arg(long, default_value = "schemas")]
    out: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_dir.as_deref())?;
    let config = EditorConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run(args) => run(config, args).await,
        Commands::Validate { file } => validate(&file),
        Commands::Schema(args) => schema(&args.out),
    }
}

async fn run(config: EditorConfig, args: RunArgs) -> anyhow::Result<()> {
    let http = Arc::new(ReqwestExecutor::new(config.request_timeout())?);
    let editor = FlowEditor::new(config, http);

    match &args.flow {
        Some(path) => editor
            .load_file(path)
            .with_context(|| format!("failed to load flow {}", path.display()))?,
        None => editor.seed_demo()?,
    }

    let start = match args.start {
        Some(id) => {
            if !editor.store().contains_node(&id) {
                anyhow::bail!("start node `{id}` is not in the flow");
            }
            id
        }
        None => editor
            .store()
            .nodes()
            .first()
            .map(|n| n.id.clone())
            .context("flow has no nodes")?,
    };

    info!(start = %start, "executing flow");
    let report = editor.run(&start).await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if let Some((node_id, err)) = &report.error {
        error!(node_id = %node_id, error = %err, "flow run failed");
        process::exit(1);
    }
    Ok(())
}

fn validate(file: &PathBuf) -> anyhow::Result<()> {
    let flow = FlowFile::load(file)
        .with_context(|| format!("failed to load flow {}", file.display()))?;
    let issues = flow.lint();
    if issues.is_empty() {
        println!(
            "{}: ok ({} nodes, {} connections)",
            file.display(),
            flow.nodes.len(),
            flow.connections.len()
        );
        return Ok(());
    }
    for issue in &issues {
        println!("{issue}");
    }
    process::exit(1);
}

fn schema(out: &PathBuf) -> anyhow::Result<()> {
    fs::create_dir_all(out)?;
    let targets = [
        ("flow.schema.json", serde_json::to_value(schema_for!(FlowFile))?),
        (
            "config.schema.json",
            serde_json::to_value(schema_for!(EditorConfig))?,
        ),
    ];
    for (name, schema) in targets {
        let path = out.join(name);
        fs::write(&path, serde_json::to_string_pretty(&schema)?)?;
        println!("wrote {}", path.display());
    }
    Ok(())
}
