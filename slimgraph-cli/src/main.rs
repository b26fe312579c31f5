use std::{collections::BTreeSet, path::PathBuf};

use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use humansize::{DECIMAL, format_size};
use itertools::Itertools;
use serde::Serialize;
use slimgraph::{Graph, LoadOptions, LoadedModel, load_onnx};
use tracing::info;
use tracing_subscriber::{EnvFilter, filter::LevelFilter, fmt::format::FmtSpan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Path to the ONNX model to prune.
    #[arg(short = 'm', long, env)]
    onnx: PathBuf,

    /// Outputs to keep, comma separated. Defaults to the outputs declared by the graph.
    #[arg(short, long, value_delimiter = ',')]
    outputs: Vec<String>,

    /// Keep `Dropout` and `Identity` nodes.
    #[arg(long)]
    keep_dropout: bool,

    /// Keep `Reshape` nodes even when their target shape is constant.
    #[arg(long)]
    keep_reshape: bool,

    /// How to print the pruned graph summary.
    #[arg(long, value_enum, default_value = "text")]
    format: Format,

    /// Should the logs be printed in json format or not
    #[arg(long, env)]
    json: bool,
}

#[derive(Serialize)]
struct ParameterSummary<'a> {
    name: &'a str,
    dims: &'a [usize],
    bytes: usize,
}

#[derive(Serialize)]
struct Summary<'a> {
    graph: &'a Graph,
    inputs: &'a BTreeSet<String>,
    parameters: Vec<ParameterSummary<'a>>,
}

fn setup_logging(json: bool) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    if json {
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_level(true)
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_env_filter(filter)
            .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber).expect("Setting up logging failed");
    } else {
        let subscriber = tracing_subscriber::fmt()
            .pretty()
            .compact()
            .with_level(true)
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_env_filter(filter)
            .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber).expect("Setting up logging failed");
    }
}

fn print_text(model: &LoadedModel) {
    println!("inputs: {}", model.inputs.iter().join(", "));
    println!("nodes ({}):", model.graph.len());
    for node in model.graph.nodes() {
        println!("  {node}");
    }
    println!(
        "parameters ({}, {}):",
        model.parameters.len(),
        format_size(model.parameters.byte_len(), DECIMAL)
    );
    for (name, array) in model.parameters.iter() {
        println!(
            "  {name} {:?} {}",
            array.dims(),
            format_size(array.byte_len(), DECIMAL)
        );
    }
}

fn print_json(model: &LoadedModel) -> anyhow::Result<()> {
    let summary = Summary {
        graph: &model.graph,
        inputs: &model.inputs,
        parameters: model
            .parameters
            .iter()
            .map(|(name, array)| ParameterSummary {
                name,
                dims: array.dims(),
                bytes: array.byte_len(),
            })
            .collect(),
    };
    let json = serde_json::to_string_pretty(&summary).context("serializing summary")?;
    println!("{json}");
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    setup_logging(args.json);

    let required: BTreeSet<String> = args.outputs.into_iter().collect();
    let options = LoadOptions {
        elide_dropout: !args.keep_dropout,
        elide_reshape: !args.keep_reshape,
    };
    info!("Loading {}", args.onnx.display());
    let model = load_onnx(&args.onnx, &required, &options)
        .with_context(|| format!("loading {}", args.onnx.display()))?;

    match args.format {
        Format::Text => print_text(&model),
        Format::Json => print_json(&model)?,
    }
    Ok(())
}
