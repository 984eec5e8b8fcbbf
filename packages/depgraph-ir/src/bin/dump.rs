//! Pretty-print the intermediate graphs: `dump pta|rwg|dda input.json`,
//! as text by default or as a single clustered digraph with `--dot`.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use depgraph_ir::features::data_flow::application::analysis::DataDependenceAnalysis;
use depgraph_ir::features::points_to::application::analyzer::PointerAnalysis;
use depgraph_ir::features::points_to::application::options::PTAOptions;
use depgraph_ir::shared::dump;
use depgraph_ir::{Module, ModuleIndex};

#[derive(Parser, Debug)]
#[command(
    name = "dump",
    about = "Dump the pointer graph, read/write graph or data dependencies of a module"
)]
struct Args {
    /// Which graph: pta, rwg, dda or sdg
    what: String,

    /// Input module (JSON)
    input: PathBuf,

    /// Emit graphviz instead of text
    #[arg(long)]
    dot: bool,

    /// Dump the graph without materialising def-use edges
    #[arg(long = "graph-only")]
    graph_only: bool,

    /// Entry function of the analysis
    #[arg(long, default_value = "main")]
    entry: String,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let content = match fs::read_to_string(&args.input) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: cannot read {}: {}", args.input.display(), e);
            return ExitCode::from(1);
        }
    };
    let module: Module = match serde_json::from_str(&content) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("error: malformed module: {}", e);
            return ExitCode::from(1);
        }
    };

    let index = ModuleIndex::new(&module);
    let pta_options = PTAOptions {
        entry_function: args.entry.clone(),
        ..Default::default()
    };
    let mut pta = match PointerAnalysis::build(&module, &index, pta_options) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(1);
        }
    };
    pta.run();

    match args.what.as_str() {
        "pta" => {
            let text = if args.dot {
                dump::dump_pointer_graph_dot(pta.built(), &module)
            } else {
                dump::dump_pointer_graph_text(pta.built(), &module)
            };
            print!("{}", text);
        }
        "rwg" | "dda" => {
            let mut dda = DataDependenceAnalysis::build(
                &module,
                &index,
                &pta,
                Default::default(),
                &args.entry,
            );
            if args.what == "dda" && !args.graph_only {
                dda.run();
                let _ = dda.all_definitions();
            }
            let text = if args.dot {
                dump::dump_rw_graph_dot(dda.built(), &module)
            } else {
                dump::dump_rw_graph_text(dda.built(), &module)
            };
            print!("{}", text);
        }
        "sdg" => {
            let options = depgraph_ir::DgOptions::new(args.entry.clone()).normalized();
            let analyses =
                match depgraph_ir::pipeline::build_dependence_graph(&module, &index, &options) {
                    Ok(a) => a,
                    Err(e) => {
                        eprintln!("error: {}", e);
                        return ExitCode::from(1);
                    }
                };
            let text = if args.dot {
                dump::dump_sdg_dot(&analyses.sdg, &module)
            } else {
                dump::dump_sdg_text(&analyses.sdg, &module)
            };
            print!("{}", text);
        }
        other => {
            eprintln!(
                "error: unknown graph '{}', expected pta, rwg, dda or sdg",
                other
            );
            return ExitCode::from(1);
        }
    }

    ExitCode::SUCCESS
}
