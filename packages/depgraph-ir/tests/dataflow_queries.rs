//! Def-use queries straight against the data-dependence engines.

mod common;

use common::ModuleBuilder;
use depgraph_ir::features::data_flow::application::analysis::DataDependenceAnalysis;
use depgraph_ir::features::data_flow::application::options::{DDAOptions, DdaFlavor};
use depgraph_ir::features::data_flow::ports::DefUseQuery;
use depgraph_ir::features::points_to::application::analyzer::PointerAnalysis;
use depgraph_ir::features::points_to::application::options::PTAOptions;
use depgraph_ir::shared::models::{Module, ModuleIndex, Type, Value};

fn analyse(module: &Module, flavor: DdaFlavor) -> DataDependenceAnalysis {
    let index = ModuleIndex::new(module);
    let mut pta =
        PointerAnalysis::build(module, &index, PTAOptions::default()).expect("pta builds");
    pta.run();
    let options = DDAOptions {
        flavor,
        ..Default::default()
    };
    let mut dda = DataDependenceAnalysis::build(module, &index, &pta, options, "main");
    dda.run();
    dda
}

const BOTH: [DdaFlavor; 2] = [DdaFlavor::ReachingDefinitions, DdaFlavor::MemorySsa];

/// A store to the same bytes kills the earlier one (strong update); the
/// load sees only the second store.
#[test]
fn strong_update_kills_prior_definitions() {
    let mut mb = ModuleBuilder::new();
    let mut main = mb.function("main", vec![], Type::Int(32));
    let x = main.alloca(4);
    let first = main.store(Value::ConstInt(1), x, 4);
    let second = main.store(Value::ConstInt(2), x, 4);
    let load = main.load(x, Type::Int(32));
    main.ret(Some(load));
    main.finish();
    let module = mb.build();

    for flavor in BOTH {
        let mut dda = analyse(&module, flavor);
        let defs = dda.definitions_for(load);
        assert!(defs.contains(&second), "{:?}", flavor);
        assert!(
            !defs.contains(&first),
            "{:?}: the overwritten store must be killed",
            flavor
        );
    }
}

/// Writes to different offsets do not kill each other.
#[test]
fn disjoint_offsets_keep_their_definitions() {
    let mut mb = ModuleBuilder::new();
    let mut main = mb.function("main", vec![], Type::Int(32));
    let buf = main.alloca(16);
    let lo = main.gep(buf, Some(0));
    let hi = main.gep(buf, Some(8));
    let store_lo = main.store(Value::ConstInt(1), lo, 8);
    let store_hi = main.store(Value::ConstInt(2), hi, 8);
    let load_lo = main.load(lo, Type::Int(64));
    main.ret(None);
    main.finish();
    let module = mb.build();

    for flavor in BOTH {
        let mut dda = analyse(&module, flavor);
        let defs = dda.definitions_for(load_lo);
        assert!(defs.contains(&store_lo), "{:?}", flavor);
        assert!(
            !defs.contains(&store_hi),
            "{:?}: a write to [8,16) does not reach a read of [0,8)",
            flavor
        );
    }
}

/// Definitions merge over branches.
#[test]
fn branch_definitions_merge_at_the_join() {
    let mut mb = ModuleBuilder::new();
    let mut main = mb.function("main", vec![Type::Int(32)], Type::Int(32));
    let c = main.param(0);
    let x = main.alloca(4);
    let b1 = main.new_block();
    let b2 = main.new_block();
    let join = main.new_block();
    let cond = main.cmp(c, Value::ConstInt(0));
    main.cond_br(cond, b1, b2);
    main.select(b1);
    let store_then = main.store(Value::ConstInt(1), x, 4);
    main.br(join);
    main.select(b2);
    let store_else = main.store(Value::ConstInt(2), x, 4);
    main.br(join);
    main.select(join);
    let load = main.load(x, Type::Int(32));
    main.ret(Some(load));
    main.finish();
    let module = mb.build();

    for flavor in BOTH {
        let mut dda = analyse(&module, flavor);
        let defs = dda.definitions_for(load);
        assert!(defs.contains(&store_then), "{:?}", flavor);
        assert!(defs.contains(&store_else), "{:?}", flavor);
    }
}

/// `memcpy(dst, src, 0)` copies nothing: its sites are empty intervals
/// and no dependence reaches a later read through it.
#[test]
fn zero_length_memcpy_is_a_no_op() {
    let mut mb = ModuleBuilder::new();
    let memcpy = mb.declare("memcpy", vec![Type::Ptr, Type::Ptr, Type::Int(64)], Type::Ptr);

    let mut main = mb.function("main", vec![], Type::Int(32));
    let buf = main.alloca(16);
    let src = main.alloca(16);
    main.store(Value::ConstInt(9), src, 8);
    let copy = main.call(memcpy, vec![buf, src, Value::ConstInt(0)], Type::Ptr);
    let load = main.load(buf, Type::Int(64));
    main.ret(None);
    main.finish();
    let module = mb.build();

    for flavor in BOTH {
        let mut dda = analyse(&module, flavor);
        let defs = dda.definitions_for(load);
        assert!(
            !defs.contains(&copy),
            "{:?}: a zero-length copy defines nothing",
            flavor
        );
    }
}

/// The same call with a real length does reach the read.
#[test]
fn memcpy_with_length_defines_the_destination() {
    let mut mb = ModuleBuilder::new();
    let memcpy = mb.declare("memcpy", vec![Type::Ptr, Type::Ptr, Type::Int(64)], Type::Ptr);

    let mut main = mb.function("main", vec![], Type::Int(32));
    let buf = main.alloca(16);
    let src = main.alloca(16);
    main.store(Value::ConstInt(9), src, 8);
    let copy = main.call(memcpy, vec![buf, src, Value::ConstInt(8)], Type::Ptr);
    let load = main.load(buf, Type::Int(64));
    main.ret(None);
    main.finish();
    let module = mb.build();

    for flavor in BOTH {
        let mut dda = analyse(&module, flavor);
        let defs = dda.definitions_for(load);
        assert!(defs.contains(&copy), "{:?}", flavor);
    }
}

/// A callee's store through its pointer argument is visible to the
/// caller's later read, attributed to the right call site.
#[test]
fn callee_effects_surface_at_the_call_site() {
    let mut mb = ModuleBuilder::new();

    let mut f = mb.function("f", vec![Type::Ptr], Type::Void);
    let fval = f.value();
    let p = f.param(0);
    let store = f.store(Value::ConstInt(42), p, 4);
    f.ret(None);
    f.finish();

    let mut main = mb.function("main", vec![], Type::Int(32));
    let a = main.alloca(4);
    let call = main.call(fval, vec![a], Type::Void);
    let load = main.load(a, Type::Int(32));
    main.ret(Some(load));
    main.finish();
    let module = mb.build();

    for flavor in BOTH {
        let mut dda = analyse(&module, flavor);
        let defs = dda.definitions_for(load);
        assert!(
            defs.contains(&call),
            "{:?}: the call mediates the effect",
            flavor
        );
        assert!(
            defs.contains(&store),
            "{:?}: the originating store is reported too",
            flavor
        );
    }
}

/// A callee reading caller memory sees the definitions reaching its call
/// sites.
#[test]
fn callee_reads_see_caller_definitions() {
    let mut mb = ModuleBuilder::new();
    let g = mb.global("g", 4);

    let mut f = mb.function("f", vec![], Type::Int(32));
    let fval = f.value();
    let load_g = f.load(g, Type::Int(32));
    f.ret(Some(load_g));
    f.finish();

    let mut main = mb.function("main", vec![], Type::Int(32));
    let store_g = main.store(Value::ConstInt(5), g, 4);
    let call = main.call(fval, vec![], Type::Int(32));
    main.ret(Some(call));
    main.finish();
    let module = mb.build();

    for flavor in BOTH {
        let mut dda = analyse(&module, flavor);
        let defs = dda.definitions_for(load_g);
        assert!(
            defs.contains(&store_g),
            "{:?}: the caller's store reaches the callee's load",
            flavor
        );
    }
}
