//! Text and dot dumps of the three graphs. Each dot dump is a single
//! `digraph` with one cluster per subgraph.

use std::fmt::Write as _;

use crate::features::points_to::infrastructure::builder::BuiltPointerGraph;
use crate::features::read_write::infrastructure::builder::BuiltReadWriteGraph;
use crate::features::sdg::domain::{DepKind, Sdg, DEP_KINDS};
use crate::shared::models::Module;

fn function_name(module: &Module, id: crate::shared::models::FunctionId) -> &str {
    module
        .function(id)
        .map(|f| f.name.as_str())
        .unwrap_or("<unknown>")
}

pub fn dump_pointer_graph_text(built: &BuiltPointerGraph, module: &Module) -> String {
    let mut out = String::new();
    for sg in built.graph.subgraphs() {
        let _ = writeln!(out, "subgraph {}:", function_name(module, sg.function));
        for &node_id in &sg.nodes {
            let node = built.graph.node(node_id);
            let _ = write!(out, "  n{} {}", node.id.0, node.ty.as_str());
            if !node.points_to.is_empty() {
                let _ = write!(out, " ->");
                let mut targets: Vec<String> = node
                    .points_to
                    .iter()
                    .map(|p| format!(" n{}+{}", p.target.0, p.offset))
                    .collect();
                targets.sort();
                for t in targets {
                    let _ = write!(out, "{}", t);
                }
            }
            let _ = writeln!(out);
        }
    }
    out
}

pub fn dump_pointer_graph_dot(built: &BuiltPointerGraph, module: &Module) -> String {
    let mut out = String::from("digraph PointerGraph {\n  compound=true;\n");
    for (i, sg) in built.graph.subgraphs().iter().enumerate() {
        let _ = writeln!(out, "  subgraph cluster_{} {{", i);
        let _ = writeln!(
            out,
            "    label=\"{}\";",
            function_name(module, sg.function)
        );
        for &node_id in &sg.nodes {
            let node = built.graph.node(node_id);
            let _ = writeln!(
                out,
                "    n{} [label=\"{} #{}\"];",
                node.id.0,
                node.ty.as_str(),
                node.id.0
            );
        }
        let _ = writeln!(out, "  }}");
    }
    for node in built.graph.nodes() {
        for &succ in &node.successors {
            let _ = writeln!(out, "  n{} -> n{};", node.id.0, succ.0);
        }
        for &op in &node.operands {
            let _ = writeln!(
                out,
                "  n{} -> n{} [style=dashed, color=gray];",
                op.0, node.id.0
            );
        }
    }
    out.push_str("}\n");
    out
}

pub fn dump_rw_graph_text(built: &BuiltReadWriteGraph, _module: &Module) -> String {
    let mut out = String::new();
    for node in built.graph.nodes() {
        let _ = write!(out, "n{} {}", node.id.0, node.ty.as_str());
        for def in &node.defs {
            let _ = write!(
                out,
                " DEF[n{} {}{}]",
                def.target.0,
                def.interval,
                if def.strong { " strong" } else { "" }
            );
        }
        for site in &node.uses {
            let _ = write!(out, " USE[n{} {}]", site.target.0, site.interval);
        }
        let _ = writeln!(out);
    }
    out
}

pub fn dump_rw_graph_dot(built: &BuiltReadWriteGraph, module: &Module) -> String {
    let mut out = String::from("digraph ReadWriteGraph {\n  compound=true;\n");
    for (i, sg) in built.graph.subgraphs().iter().enumerate() {
        let _ = writeln!(out, "  subgraph cluster_{} {{", i);
        let _ = writeln!(
            out,
            "    label=\"{}\";",
            function_name(module, sg.function)
        );
        for &bid in &sg.blocks {
            for &node_id in &built.graph.block(bid).nodes {
                let node = built.graph.node(node_id);
                let _ = writeln!(
                    out,
                    "    n{} [label=\"{} #{}\"];",
                    node.id.0,
                    node.ty.as_str(),
                    node.id.0
                );
            }
        }
        let _ = writeln!(out, "  }}");
    }
    for block in built.graph.blocks() {
        if let (Some(&last), succs) = (block.nodes.last(), &block.successors) {
            for succ in succs {
                if let Some(&first) = built.graph.block(*succ).nodes.first() {
                    let _ = writeln!(out, "  n{} -> n{};", last.0, first.0);
                }
            }
        }
    }
    for node in built.graph.nodes() {
        for &def in &node.defuse {
            let _ = writeln!(
                out,
                "  n{} -> n{} [color=blue];",
                def.0, node.id.0
            );
        }
    }
    out.push_str("}\n");
    out
}

pub fn dump_sdg_text(sdg: &Sdg, module: &Module) -> String {
    let mut out = String::new();
    for (fid, fsdg) in sdg.functions() {
        let _ = writeln!(out, "function {}:", function_name(module, *fid));
        for &bid in &fsdg.blocks {
            let block = sdg.block(bid);
            let _ = writeln!(out, "  block b{}:", bid.0);
            for &nid in &block.nodes {
                let node = sdg.node(nid);
                let _ = write!(out, "    n{} {:?}", nid.0, node.kind);
                for kind in DEP_KINDS {
                    for dep in node.deps.of(kind) {
                        let _ = write!(out, " {}->n{}", kind.as_str(), dep.0);
                    }
                }
                let _ = writeln!(out);
            }
        }
    }
    out
}

pub fn dump_sdg_dot(sdg: &Sdg, module: &Module) -> String {
    let mut out = String::from("digraph SystemDependenceGraph {\n  compound=true;\n");
    for (i, (fid, fsdg)) in sdg.functions().enumerate() {
        let _ = writeln!(out, "  subgraph cluster_{} {{", i);
        let _ = writeln!(out, "    label=\"{}\";", function_name(module, *fid));
        let _ = writeln!(out, "    n{} [label=\"entry\"];", fsdg.entry_node.0);
        for &bid in &fsdg.blocks {
            for &nid in &sdg.block(bid).nodes {
                let _ = writeln!(out, "    n{} [label=\"{:?}\"];", nid.0, sdg.node(nid).kind);
            }
        }
        let _ = writeln!(out, "  }}");
    }
    for node in sdg.nodes() {
        for kind in DEP_KINDS {
            let color = match kind {
                DepKind::Control => "red",
                DepKind::Data => "blue",
                DepKind::Use => "black",
                DepKind::Interference => "orange",
                DepKind::ForkJoin => "green",
            };
            for dep in node.deps.of(kind) {
                let _ = writeln!(
                    out,
                    "  n{} -> n{} [color={}];",
                    node.id.0, dep.0, color
                );
            }
        }
    }
    out.push_str("}\n");
    out
}
