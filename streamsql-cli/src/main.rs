use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use streamsql_core::config::EngineConfig;
use streamsql_core::event::{RawEvent, Schema};
use streamsql_core::exec::{
    AggregateCall, FlowBuilder, LocalTransport, SourceOptions, SourceRegistry,
};
use streamsql_core::time::now_millis;
use streamsql_core::types::{FlowId, NodeId};
use streamsql_core::window::WindowSpec;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Transport node every input line is sent to.
const INPUT_NODE: &str = "input";

#[derive(Parser, Debug)]
#[command(name = "streamsql")]
#[command(about = "Run streaming flows over delimited text", long_about = None)]
struct Cli {
    /// Engine configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Delimited text file, one record per line; `-` reads stdin.
    #[arg(long, default_value = "-")]
    input: String,
    /// Column declarations, e.g. `host:string, bytes:int?`.
    #[arg(long)]
    columns: String,
    /// Field separator; overrides the configuration file.
    #[arg(long)]
    delimiter: Option<char>,
    /// Column holding event time in milliseconds; ingestion time otherwise.
    #[arg(long)]
    timestamp_column: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Parse every record and print it back, optionally narrowed to some
    /// columns.
    Parse {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, value_delimiter = ',')]
        select: Vec<String>,
    },
    /// Windowed aggregation, e.g. `--func "sum(bytes) as total"
    /// --group-by host --window tumbling:10s`.
    Aggregate {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long = "func", required = true, value_parser = AggregateCall::parse)]
        funcs: Vec<AggregateCall>,
        #[arg(long, value_delimiter = ',')]
        group_by: Vec<String>,
        /// `tumbling:<size>`, `sliding:<size>/<slide>` or `count:<n>`.
        #[arg(long, value_parser = WindowSpec::parse)]
        window: WindowSpec,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Parse { input, select } => {
            run_flow(&config, &input, "parse", |builder, source| {
                if select.is_empty() {
                    return Ok(source);
                }
                let columns: Vec<&str> = select.iter().map(|c| c.trim()).collect();
                Ok(builder.project(source, &columns)?)
            })
        }
        Commands::Aggregate {
            input,
            funcs,
            group_by,
            window,
        } => {
            let calls: Vec<String> = funcs.iter().map(ToString::to_string).collect();
            let description = format!("aggregate {} over {window}", calls.join(", "));
            run_flow(&config, &input, &description, |builder, source| {
                let group_by: Vec<&str> = group_by.iter().map(|c| c.trim()).collect();
                Ok(builder.aggregate(source, &group_by, &funcs, window)?)
            })
        }
    }
}

/// Build `input -> source -> plan -> stdout`, feed it every input line and
/// tear it down once the input is exhausted.
fn run_flow<F>(
    config: &EngineConfig,
    input: &InputArgs,
    description: &str,
    plan: F,
) -> anyhow::Result<()>
where
    F: FnOnce(&mut FlowBuilder, NodeId) -> anyhow::Result<NodeId>,
{
    let schema = Schema::parse_columns(&input.columns)
        .with_context(|| format!("bad column declaration {:?}", input.columns))?;
    let delimiter = input.delimiter.unwrap_or(config.parser.delimiter);
    let mut options = SourceOptions::from_config(config);
    options.delimiter = delimiter;
    if let Some(column) = &input.timestamp_column {
        options = options.with_timestamp_column(column.clone());
    }

    let registry = Arc::new(SourceRegistry::new());
    let transport = Arc::new(LocalTransport::new(Arc::clone(&registry)));
    transport.create_node(INPUT_NODE)?;

    let mut builder =
        FlowBuilder::new(description).with_source_channels(config.channel.capacity);
    let source = builder.source(
        transport.clone(),
        Arc::clone(&registry),
        INPUT_NODE,
        schema,
        options,
    );
    let last = plan(&mut builder, source)?;
    builder.output(last, Box::new(io::stdout()), delimiter);

    let mut flow = builder.build(FlowId::new(1))?;
    flow.open()?;

    let reader = open_input(&input.input)?;
    let mut read = 0u64;
    let mut accepted = 0u64;
    for line in reader.lines() {
        let line = line.context("failed to read input")?;
        if line.is_empty() {
            continue;
        }
        read += 1;
        accepted += transport.send(INPUT_NODE, RawEvent::new(line, now_millis()))? as u64;
    }
    transport.finish(INPUT_NODE)?;
    flow.close()?;

    tracing::info!("{read} record(s) read, {} skipped", read - accepted);
    Ok(())
}

fn open_input(path: &str) -> anyhow::Result<Box<dyn BufRead>> {
    if path == "-" {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(path).with_context(|| format!("failed to open {path}"))?;
    Ok(Box::new(BufReader::new(file)))
}

/// Logs go to stderr; stdout carries the flow's output.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .init();
}
