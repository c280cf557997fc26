//! Command line: check graphs, evaluate expressions and test connections
//! against a catalog.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, anyhow, bail};
use clap::{ArgAction, Args, Parser, Subcommand};
use colored::Colorize;
use indexmap::IndexMap;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use typegraph::catalog::Catalog;
use typegraph::eval::{GenericParameters, evaluate};
use typegraph::expr::Expression;
use typegraph::graph::{Edge, GraphSnapshot, NodeId};
use typegraph::path_de::from_str_with_path;
use typegraph::schema::{InputId, OutputId};
use typegraph::type_state::{ConnectionCheck, OutputNarrowing, TypeState};
use typegraph::validity::{Validity, check_node_validity};
use typegraph::wire::parse_expression;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// type-check node graphs against a catalog of type definitions and node schemas
#[derive(Parser, Debug)]
#[command(name = "typegraph", version)]
pub struct CommandLineInterface {
    /// more log output (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// resolve every node of a graph and report its types and validity
    Check(CheckCmd),
    /// evaluate a JSON type expression in the catalog scope
    Eval(EvalCmd),
    /// test whether an edge could be added to a graph
    Connect(ConnectCmd),
}

#[derive(Args, Debug, Clone)]
struct CatalogSettings {
    /// One or more catalog files. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    catalog: Vec<String>,
}

#[derive(clap::Parser, Debug)]
struct CheckCmd {
    #[command(flatten)]
    catalog_settings: CatalogSettings,

    /// graph snapshot (.json)
    #[arg(long, short)]
    graph: PathBuf,

    /// backend-reported output types: {"<node>": {"<output>": <expression>}}
    #[arg(long)]
    narrowing: Option<PathBuf>,

    /// print a JSON report instead of text
    #[arg(long)]
    json: bool,
}

#[derive(clap::Parser, Debug)]
struct EvalCmd {
    /// catalog files; the prelude alone when omitted
    #[arg(long, short, num_args = 1..)]
    catalog: Vec<String>,

    /// the expression, as JSON
    expression: String,
}

#[derive(clap::Parser, Debug)]
struct ConnectCmd {
    #[command(flatten)]
    catalog_settings: CatalogSettings,

    /// graph snapshot (.json)
    #[arg(long, short)]
    graph: PathBuf,

    /// source handle as <node>:<output>
    #[arg(long)]
    from: String,

    /// target handle as <node>:<input>
    #[arg(long)]
    to: String,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl CatalogSettings {
    fn load(&self) -> anyhow::Result<Catalog> {
        load_catalog(&self.catalog)
    }
}

fn load_catalog(patterns: &[String]) -> anyhow::Result<Catalog> {
    let paths = resolve_file_path_patterns(patterns)?;
    Ok(Catalog::load(&paths)?)
}

fn read_graph(path: &Path) -> anyhow::Result<GraphSnapshot> {
    let src = std::fs::read_to_string(path).with_context(|| format!("failed to read graph {}", path.display()))?;
    from_str_with_path(&src).with_context(|| format!("failed to parse graph {}", path.display()))
}

fn read_narrowing(path: &Path, catalog: &Catalog) -> anyhow::Result<OutputNarrowing> {
    let src = std::fs::read_to_string(path).with_context(|| format!("failed to read narrowing {}", path.display()))?;
    let raw: HashMap<NodeId, IndexMap<OutputId, Expression>> =
        from_str_with_path(&src).with_context(|| format!("failed to parse narrowing {}", path.display()))?;
    let empty = GenericParameters::new();
    raw.into_iter()
        .map(|(node, outputs)| {
            let outputs = outputs
                .into_iter()
                .map(|(id, expr)| {
                    let ty = evaluate(&expr, &catalog.scope, &empty)
                        .with_context(|| format!("narrowing for {node}:{id}"))?;
                    Ok((id, ty))
                })
                .collect::<anyhow::Result<IndexMap<_, _>>>()?;
            Ok((node, outputs))
        })
        .collect()
}

fn parse_handle(raw: &str) -> anyhow::Result<(NodeId, u32)> {
    let (node, handle) = raw.rsplit_once(':').ok_or_else(|| anyhow!("expected <node>:<handle>, got `{raw}`"))?;
    let handle = handle.parse().with_context(|| format!("invalid handle id in `{raw}`"))?;
    Ok((NodeId(node.to_string()), handle))
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn init_tracing(&self) {
        let default = match self.verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
        tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
    }

    pub fn run(&self) -> anyhow::Result<ExitCode> {
        match &self.cmd {
            Command::Check(target) => target.run(),
            Command::Eval(target) => target.run(),
            Command::Connect(target) => target.run(),
        }
    }
}

impl CheckCmd {
    fn run(&self) -> anyhow::Result<ExitCode> {
        let catalog = self.catalog_settings.load()?;
        let graph = read_graph(&self.graph)?;
        let narrowing = match &self.narrowing {
            Some(path) => read_narrowing(path, &catalog)?,
            None => OutputNarrowing::new(),
        };
        let state = TypeState::create(
            &graph.nodes,
            &graph.edges,
            &narrowing,
            &catalog.functions,
            Some(&catalog.passthrough),
            None,
        );

        let mut all_valid = true;
        let mut report = Vec::new();
        for node in &graph.nodes {
            let validity = match catalog.function(&node.schema_id) {
                Some(definition) => check_node_validity(node, definition, &state),
                None => Validity::invalid(format!("Unknown node schema {}", node.schema_id)),
            };
            all_valid &= validity.is_valid;
            let instance = state.get(&node.id);
            if self.json {
                let inputs: Option<IndexMap<String, String>> =
                    instance.map(|i| i.inputs.iter().map(|(k, t)| (k.to_string(), t.type_id())).collect());
                let outputs: Option<IndexMap<String, String>> =
                    instance.map(|i| i.outputs.iter().map(|(k, t)| (k.to_string(), t.type_id())).collect());
                report.push(json!({
                    "node": node.id,
                    "schemaId": node.schema_id,
                    "isValid": validity.is_valid,
                    "reason": validity.reason,
                    "inputs": inputs,
                    "outputs": outputs,
                }));
                continue;
            }

            let mark = if validity.is_valid { "✔".green() } else { "✘".red() };
            println!("{mark} {} {}", node.id.to_string().bold(), format!("({})", node.schema_id).dimmed());
            if let Some(reason) = &validity.reason {
                println!("    {}", reason.yellow());
            }
            if let Some(instance) = instance {
                for (id, ty) in &instance.inputs {
                    println!("    in  {id}: {ty}");
                }
                for (id, ty) in &instance.outputs {
                    println!("    out {id}: {ty}");
                }
            }
        }
        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Ok(if all_valid { ExitCode::SUCCESS } else { ExitCode::FAILURE })
    }
}

impl EvalCmd {
    fn run(&self) -> anyhow::Result<ExitCode> {
        let scope = if self.catalog.is_empty() {
            typegraph::builtins::prelude()?
        } else {
            load_catalog(&self.catalog)?.scope
        };
        let expr = parse_expression(&self.expression)?;
        let ty = evaluate(&expr, &scope, &GenericParameters::new())?;
        println!("{ty}");
        Ok(ExitCode::SUCCESS)
    }
}

impl ConnectCmd {
    fn run(&self) -> anyhow::Result<ExitCode> {
        let catalog = self.catalog_settings.load()?;
        let graph = read_graph(&self.graph)?;
        let (source, output) = parse_handle(&self.from)?;
        let (target, input) = parse_handle(&self.to)?;
        let edge = Edge { source, source_handle: OutputId(output), target, target_handle: InputId(input) };
        if graph.edges.iter().any(|e| e.target == edge.target && e.target_handle == edge.target_handle) {
            bail!("input {} is already connected", self.to);
        }

        let state = TypeState::create(
            &graph.nodes,
            &graph.edges,
            &OutputNarrowing::new(),
            &catalog.functions,
            Some(&catalog.passthrough),
            None,
        );
        match state.test_connection(&edge, &catalog.functions) {
            ConnectionCheck::Valid => {
                println!("{} {} → {}", "✔".green(), self.from, self.to);
                Ok(ExitCode::SUCCESS)
            }
            ConnectionCheck::Invalid(reason) => {
                println!("{} {} → {}: {}", "✘".red(), self.from, self.to, reason.yellow());
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn resolve_file_path_patterns<I>(patterns: I) -> anyhow::Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{'))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            let mut matched_any = false;
            for entry in glob::glob(pattern).with_context(|| format!("invalid glob pattern: {pattern}"))? {
                out.push(entry?);
                matched_any = true;
            }
            if !matched_any {
                bail!("glob pattern matched no files: {pattern}");
            }
        } else {
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_split_on_the_last_colon() {
        assert_eq!(parse_handle("image:load:2").unwrap(), (NodeId::from("image:load"), 2));
        assert!(parse_handle("load").is_err());
        assert!(parse_handle("load:x").is_err());
    }

    #[test]
    fn literal_paths_pass_through() {
        let paths = resolve_file_path_patterns(["a.json", "dir/b.json"]).unwrap();
        assert_eq!(paths, vec![PathBuf::from("a.json"), PathBuf::from("dir/b.json")]);
        assert!(resolve_file_path_patterns(["/nonexistent-dir-for-tests/*.json"]).is_err());
    }
}
