//! The data-dependence facade: builds the read/write graph and answers
//! def-use queries through the configured engine.

use rustc_hash::FxHashSet;
use tracing::warn;

use crate::features::points_to::ports::PointsToQuery;
use crate::features::read_write::domain::{RWNodeId, RWNodeType, RWSubgraphId};
use crate::features::read_write::infrastructure::builder::{
    BuiltReadWriteGraph, ReadWriteGraphBuilder,
};
use crate::shared::models::{FunctionId, Module, ModuleIndex, Value};
use crate::shared::offset::{Offset, OffsetInterval};

use super::super::infrastructure::memory_ssa::MemorySsaEngine;
use super::super::infrastructure::reaching_definitions::ReachingDefinitionsEngine;
use super::super::ports::DefUseQuery;
use super::options::{DDAOptions, DdaFlavor};

enum Engine {
    Rd(ReachingDefinitionsEngine),
    Ssa(MemorySsaEngine),
}

pub struct DataDependenceAnalysis {
    built: BuiltReadWriteGraph,
    options: DDAOptions,
    engine: Engine,
    /// Log-once guards (spec'd: one report per queried pair).
    reported_empty: FxHashSet<(Value, Value)>,
    reported_no_node: FxHashSet<Value>,
}

impl DataDependenceAnalysis {
    pub fn build<P: PointsToQuery>(
        module: &Module,
        index: &ModuleIndex<'_>,
        pta: &P,
        options: DDAOptions,
        entry_function: &str,
    ) -> Self {
        let built =
            ReadWriteGraphBuilder::new(module, index, pta, &options).build(entry_function);
        let engine = match options.flavor {
            DdaFlavor::ReachingDefinitions => Engine::Rd(ReachingDefinitionsEngine::new()),
            DdaFlavor::MemorySsa => Engine::Ssa(MemorySsaEngine::new()),
        };
        DataDependenceAnalysis {
            built,
            options,
            engine,
            reported_empty: FxHashSet::default(),
            reported_no_node: FxHashSet::default(),
        }
    }

    /// Run the underlying engine. The memory-SSA flavor resolves queries
    /// lazily, so this only precomputes for reaching definitions.
    pub fn run(&mut self) {
        if let Engine::Rd(rd) = &mut self.engine {
            rd.run(&self.built.graph);
        }
    }

    pub fn options(&self) -> &DDAOptions {
        &self.options
    }

    pub fn built(&self) -> &BuiltReadWriteGraph {
        &self.built
    }

    fn node_definitions(&mut self, node: RWNodeId) -> Vec<RWNodeId> {
        match &mut self.engine {
            Engine::Rd(rd) => rd.definitions(&self.built.graph, node),
            Engine::Ssa(ssa) => ssa.definitions(&mut self.built.graph, node),
        }
    }

    fn definitions_at_node(
        &mut self,
        at: RWNodeId,
        mem: RWNodeId,
        off: Offset,
        len: Offset,
    ) -> Vec<RWNodeId> {
        match &mut self.engine {
            Engine::Rd(rd) => rd.definitions_at(&self.built.graph, at, mem, off, len),
            Engine::Ssa(ssa) => ssa.definitions_at(&mut self.built.graph, at, mem, off, len),
        }
    }

    fn subgraph_of_node(&self, node: RWNodeId) -> Option<RWSubgraphId> {
        self.built
            .graph
            .node(node)
            .block
            .and_then(|b| self.built.graph.block(b).subgraph)
    }

    /// Stack memory belongs to one function; everything else (globals,
    /// heap seen from elsewhere, unknown memory) may be written by the
    /// callers too.
    fn target_is_local(&self, target: RWNodeId, sg: Option<RWSubgraphId>) -> bool {
        let node = self.built.graph.node(target);
        matches!(node.ty, RWNodeType::Alloc | RWNodeType::DynAlloc)
            && self.subgraph_of_node(target) == sg
    }

    /// Definitions of a use, completed at the callers: a use of memory
    /// the function does not own also sees the definitions reaching each
    /// of its call sites, transitively up the call chain.
    fn node_definitions_interproc(&mut self, node: RWNodeId) -> Vec<RWNodeId> {
        let mut defs = self.node_definitions(node);

        let sites = self.built.graph.node(node).uses.clone();
        let local_sg = self.subgraph_of_node(node);
        let mut visited: FxHashSet<(FunctionId, RWNodeId)> = FxHashSet::default();
        for site in sites {
            if self.target_is_local(site.target, local_sg) {
                continue;
            }
            let Some(function) = local_sg.map(|sg| self.built.graph.subgraph(sg).function)
            else {
                continue;
            };
            self.caller_definitions(function, site.target, site.interval, &mut defs, &mut visited);
        }
        defs
    }

    fn caller_definitions(
        &mut self,
        function: FunctionId,
        target: RWNodeId,
        interval: OffsetInterval,
        defs: &mut Vec<RWNodeId>,
        visited: &mut FxHashSet<(FunctionId, RWNodeId)>,
    ) {
        if !visited.insert((function, target)) {
            return;
        }
        for call_node in self.built.graph.callers_of(function).to_vec() {
            let reaching =
                self.definitions_at_node(call_node, target, interval.start, interval.len);
            for def in reaching {
                if !defs.contains(&def) {
                    defs.push(def);
                }
            }
            let caller_sg = self.subgraph_of_node(call_node);
            if self.target_is_local(target, caller_sg) {
                continue;
            }
            if let Some(sg) = caller_sg {
                let caller_fn = self.built.graph.subgraph(sg).function;
                self.caller_definitions(caller_fn, target, interval, defs, visited);
            }
        }
    }

    /// Map engine results back to IR values. Synthesised phi nodes never
    /// escape the engines; a call-out stands for its call instruction
    /// plus the definitions inside the callee it summarises.
    fn resolve(&self, defs: Vec<RWNodeId>) -> Vec<Value> {
        let mut values = Vec::new();
        let mut push = |v: Value, values: &mut Vec<Value>| {
            if !values.contains(&v) {
                values.push(v);
            }
        };
        let mut seen: FxHashSet<RWNodeId> = FxHashSet::default();
        let mut stack = defs;
        while let Some(def) = stack.pop() {
            if !seen.insert(def) {
                continue;
            }
            let node = self.built.graph.node(def);
            debug_assert_ne!(node.ty, RWNodeType::Phi);
            if let Some(v) = node.value {
                push(v, &mut values);
            }
            if node.ty == RWNodeType::CallOut {
                // nested callouts unfold down to the real definitions
                stack.extend(self.built.graph.callout_origins(def).iter().copied());
            }
        }
        values
    }

    /// Eagerly materialise every use's definitions and record them as
    /// def-use edges on the graph. Only the graph dumpers need this.
    pub fn all_definitions(&mut self) -> Vec<(Value, Vec<Value>)> {
        let use_nodes: Vec<RWNodeId> = self
            .built
            .graph
            .nodes()
            .filter(|n| n.is_use())
            .map(|n| n.id)
            .collect();

        let mut result = Vec::new();
        for node in use_nodes {
            let defs = self.node_definitions_interproc(node);
            self.built.graph.node_mut(node).defuse = defs.clone();
            if let Some(value) = self.built.graph.node(node).value {
                result.push((value, self.resolve(defs)));
            }
        }
        result
    }
}

impl DefUseQuery for DataDependenceAnalysis {
    fn definitions_for(&mut self, use_value: Value) -> Vec<Value> {
        let Some(node) = self.built.graph.node_of(use_value) else {
            if self.reported_no_node.insert(use_value) {
                warn!(?use_value, "no read/write node for queried use");
            }
            return Vec::new();
        };
        let defs = self.node_definitions_interproc(node);
        if defs.is_empty() && self.reported_empty.insert((use_value, use_value)) {
            warn!(?use_value, "no reaching definition for use");
        }
        self.resolve(defs)
    }

    fn definitions_in_range(
        &mut self,
        at: Value,
        mem: Value,
        off: Offset,
        len: Offset,
    ) -> Vec<Value> {
        let (Some(at_node), Some(mem_node)) = (
            self.built.graph.node_of(at),
            self.built.graph.node_of(mem),
        ) else {
            if self.reported_no_node.insert(at) {
                warn!(?at, ?mem, "no read/write node for ranged query");
            }
            return Vec::new();
        };

        let mut defs = self.definitions_at_node(at_node, mem_node, off, len);
        let local_sg = self.subgraph_of_node(at_node);
        if !self.target_is_local(mem_node, local_sg) {
            if let Some(function) = local_sg.map(|sg| self.built.graph.subgraph(sg).function) {
                let mut visited = FxHashSet::default();
                self.caller_definitions(
                    function,
                    mem_node,
                    OffsetInterval::new(off, len),
                    &mut defs,
                    &mut visited,
                );
            }
        }
        if defs.is_empty() && self.reported_empty.insert((at, mem)) {
            warn!(?at, ?mem, "no reaching definition for memory range");
        }
        self.resolve(defs)
    }

    fn is_use(&self, value: Value) -> bool {
        self.built
            .graph
            .node_of(value)
            .map(|n| self.built.graph.node(n).is_use())
            .unwrap_or(false)
    }

    fn is_def(&self, value: Value) -> bool {
        self.built
            .graph
            .node_of(value)
            .map(|n| self.built.graph.node(n).is_def())
            .unwrap_or(false)
    }
}
