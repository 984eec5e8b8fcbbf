//! The pointer-analysis facade: builds the pointer graph, runs the
//! configured solver, and answers points-to queries in IR terms.

use tracing::debug;

use crate::errors::{DepgraphError, Result};
use crate::shared::models::{Module, ModuleIndex, Value};

use super::super::domain::PointsToSet;
use super::super::infrastructure::builder::{BuiltPointerGraph, PointerGraphBuilder};
use super::super::infrastructure::fi::FlowInsensitiveModel;
use super::super::infrastructure::fs::FlowSensitiveModel;
use super::super::infrastructure::solver::{PointerAnalysisSolver, SolverStats};
use super::super::ports::{PointsToQuery, ResolvedPointer, ResolvedPointsTo};
use super::options::{PTAOptions, PtaFlavor};

pub struct PointerAnalysis<'m> {
    module: &'m Module,
    options: PTAOptions,
    built: BuiltPointerGraph,
    stats: SolverStats,
    has_run: bool,
}

impl<'m> PointerAnalysis<'m> {
    pub fn build(
        module: &'m Module,
        index: &ModuleIndex<'m>,
        options: PTAOptions,
    ) -> Result<Self> {
        if options.is_svf {
            return Err(DepgraphError::config(
                "SVF delegation requested but no external pointer analysis is attached",
            ));
        }
        if module.function_by_name(&options.entry_function).is_none() {
            return Err(DepgraphError::malformed(format!(
                "entry function '{}' not found",
                options.entry_function
            )));
        }

        let built = PointerGraphBuilder::new(module, index, &options).build();
        debug!(
            nodes = built.graph.node_count(),
            subgraphs = built.graph.subgraphs().len(),
            "pointer graph built"
        );

        Ok(PointerAnalysis {
            module,
            options,
            built,
            stats: SolverStats::default(),
            has_run: false,
        })
    }

    pub fn run(&mut self) {
        if self.has_run {
            return;
        }
        self.stats = match self.options.flavor {
            PtaFlavor::FlowInsensitive => {
                let solver = PointerAnalysisSolver::new(
                    self.module,
                    &self.options,
                    FlowInsensitiveModel::new(),
                );
                solver.run(&mut self.built)
            }
            PtaFlavor::FlowSensitive => {
                let solver = PointerAnalysisSolver::new(
                    self.module,
                    &self.options,
                    FlowSensitiveModel::new(false),
                );
                solver.run(&mut self.built)
            }
            PtaFlavor::FlowSensitiveInv => {
                let solver = PointerAnalysisSolver::new(
                    self.module,
                    &self.options,
                    FlowSensitiveModel::new(true),
                );
                solver.run(&mut self.built)
            }
        };
        self.has_run = true;
    }

    pub fn options(&self) -> &PTAOptions {
        &self.options
    }

    pub fn stats(&self) -> &SolverStats {
        &self.stats
    }

    /// The solved graph, for the dot dumper and the read/write builder.
    pub fn built(&self) -> &BuiltPointerGraph {
        &self.built
    }

    fn resolve(&self, pts: &PointsToSet) -> ResolvedPointsTo {
        let mut resolved = ResolvedPointsTo::default();
        for ptr in pts.iter() {
            if ptr.is_null() {
                resolved.has_null = true;
                continue;
            }
            if ptr.is_unknown() {
                resolved.has_unknown = true;
                continue;
            }
            if ptr.is_invalidated() {
                resolved.has_invalidated = true;
                continue;
            }
            let target = self.built.graph.node(ptr.target);
            let value = match (target.value, target.function) {
                (_, Some(fid)) => Value::Function(fid),
                (Some(v), None) => v,
                (None, None) => continue,
            };
            resolved.pointers.push(ResolvedPointer {
                value,
                offset: ptr.offset,
            });
        }
        resolved
    }
}

impl PointsToQuery for PointerAnalysis<'_> {
    fn points_to(&self, value: Value) -> Option<ResolvedPointsTo> {
        let node = self.built.graph.node_of(value)?;
        Some(self.resolve(&self.built.graph.node(node).points_to))
    }
}
