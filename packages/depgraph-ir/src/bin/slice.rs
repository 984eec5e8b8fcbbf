//! The slicer command: read a module, slice it against the criteria,
//! write the result.
//!
//! Exit codes: 0 on success, 1 on malformed input or failed post-slice
//! verification, 2 when no criterion matched.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use depgraph_ir::features::control_dep::application::options::CdAlgorithm;
use depgraph_ir::features::data_flow::application::options::DdaFlavor;
use depgraph_ir::features::points_to::application::options::PtaFlavor;
use depgraph_ir::features::read_write::infrastructure::models::FunctionModel;
use depgraph_ir::pipeline::{run_slicer, DgOptions, SliceOutcome, SlicerOptions};
use depgraph_ir::Module;

#[derive(Parser, Debug)]
#[command(
    name = "slice",
    about = "Slice a module against the given criteria and emit the rewritten module"
)]
struct Args {
    /// Slicing criteria: `line:col` or `function:line:col`, several
    /// separated by `;`
    #[arg(short = 'c', long = "criteria", default_value = "")]
    criteria: String,

    /// Legacy criteria in the `function#block#n` format
    #[arg(long = "legacy-criteria", default_value = "")]
    legacy_criteria: String,

    /// Forward slice instead of backward
    #[arg(long)]
    forward: bool,

    /// The criteria denote the instruction after the matched one
    #[arg(long = "criteria-are-next-instr")]
    criteria_are_next_instr: bool,

    /// Slice away the criteria nodes themselves where possible
    #[arg(long = "remove-slicing-criteria")]
    remove_slicing_criteria: bool,

    /// Functions that must survive the slice untouched
    #[arg(long = "preserve", value_delimiter = ',')]
    preserve: Vec<String>,

    /// Entry function of the analysis
    #[arg(long, default_value = "main")]
    entry: String,

    /// Pointer analysis flavor: fi, fs or inv
    #[arg(long = "pta", default_value = "fi")]
    pta: String,

    /// Data-dependence flavor: rd or ssa
    #[arg(long = "dda", default_value = "rd")]
    dda: String,

    /// Control-dependence algorithm: classic, ntscd, ntscd2,
    /// ntscd-ranganath or ntscd-legacy
    #[arg(long = "cd-alg", default_value = "classic")]
    cd_alg: String,

    /// Model the threading primitives and add interference edges
    #[arg(long)]
    threads: bool,

    /// Extra function models, `name kind idx from to` per line
    #[arg(long = "function-models")]
    function_models: Option<PathBuf>,

    /// Input module (JSON)
    input: PathBuf,

    /// Output path; stdout when omitted
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,
}

fn parse_flavors(args: &Args) -> Result<DgOptions, String> {
    let mut options = DgOptions::new(args.entry.clone());

    options.pta.flavor = match args.pta.as_str() {
        "fi" => PtaFlavor::FlowInsensitive,
        "fs" => PtaFlavor::FlowSensitive,
        "inv" => PtaFlavor::FlowSensitiveInv,
        other => return Err(format!("unknown pointer analysis '{}'", other)),
    };
    options.dda.flavor = match args.dda.as_str() {
        "rd" => DdaFlavor::ReachingDefinitions,
        "ssa" => DdaFlavor::MemorySsa,
        other => return Err(format!("unknown data-dependence analysis '{}'", other)),
    };
    options.cd.algorithm = match args.cd_alg.as_str() {
        "classic" => CdAlgorithm::Classic,
        "ntscd" => CdAlgorithm::Ntscd,
        "ntscd2" => CdAlgorithm::Ntscd2,
        "ntscd-ranganath" => CdAlgorithm::NtscdRanganath,
        "ntscd-legacy" => CdAlgorithm::NtscdLegacy,
        other => return Err(format!("unknown control-dependence algorithm '{}'", other)),
    };
    options.threads = args.threads;

    if let Some(path) = &args.function_models {
        let content =
            fs::read_to_string(path).map_err(|e| format!("cannot read function models: {}", e))?;
        let models =
            FunctionModel::parse_file(&content).map_err(|e| format!("function models: {}", e))?;
        options.dda.function_models.extend(models);
    }

    Ok(options)
}

fn emit(module: &Module, output: &Option<PathBuf>) -> Result<(), String> {
    let json = serde_json::to_string_pretty(module)
        .map_err(|e| format!("cannot serialise module: {}", e))?;
    match output {
        Some(path) => fs::write(path, json).map_err(|e| format!("cannot write output: {}", e)),
        None => {
            println!("{}", json);
            Ok(())
        }
    }
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
    let mut module: Module = match serde_json::from_str(&content) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("error: malformed module: {}", e);
            return ExitCode::from(1);
        }
    };

    let dg_options = match parse_flavors(&args) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(1);
        }
    };

    let options = SlicerOptions {
        dg_options,
        preserved_functions: args.preserve.clone(),
        slicing_criteria: args.criteria.clone(),
        legacy_slicing_criteria: args.legacy_criteria.clone(),
        forward_slicing: args.forward,
        remove_slicing_criteria: args.remove_slicing_criteria,
        criteria_are_next_instr: args.criteria_are_next_instr,
        input_file: args.input.display().to_string(),
        output_file: args
            .output
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default(),
    };

    match run_slicer(&mut module, &options) {
        Ok(SliceOutcome::NoCriteria) => {
            if emit(&module, &args.output).is_err() {
                return ExitCode::from(1);
            }
            ExitCode::SUCCESS
        }
        Ok(SliceOutcome::NothingMatched) => {
            eprintln!("error: no slicing criterion matched");
            ExitCode::from(2)
        }
        Ok(SliceOutcome::Sliced {
            stats,
            verification_errors,
        }) => {
            eprintln!(
                "sliced away {} of {} nodes",
                stats.nodes_removed, stats.nodes_total
            );
            if emit(&module, &args.output).is_err() {
                return ExitCode::from(1);
            }
            if verification_errors.is_empty() {
                ExitCode::SUCCESS
            } else {
                for error in &verification_errors {
                    eprintln!("verification: {}", error);
                }
                ExitCode::from(1)
            }
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::from(1)
        }
    }
}
