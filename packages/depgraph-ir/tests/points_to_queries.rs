//! Pointer-analysis behavior over whole modules.

mod common;

use common::ModuleBuilder;
use depgraph_ir::features::points_to::application::analyzer::PointerAnalysis;
use depgraph_ir::features::points_to::application::options::{PTAOptions, PtaFlavor};
use depgraph_ir::features::points_to::ports::PointsToQuery;
use depgraph_ir::shared::models::{Module, ModuleIndex, Type, Value};

fn analyse(module: &Module, flavor: PtaFlavor) -> PointerAnalysis<'_> {
    // the index is only needed while building
    let index = ModuleIndex::new(module);
    let options = PTAOptions {
        flavor,
        ..Default::default()
    };
    let mut pta = PointerAnalysis::build(module, &index, options).expect("analysis builds");
    pta.run();
    pta
}

/// A function pointer assigned on two branches points to both targets.
#[test]
fn branches_union_function_pointer_targets() {
    let mut mb = ModuleBuilder::new();

    let mut h1 = mb.function("h1", vec![Type::Int(32)], Type::Int(32));
    let h1val = h1.value();
    let x1 = h1.param(0);
    h1.ret(Some(x1));
    h1.finish();

    let mut h2 = mb.function("h2", vec![Type::Int(32)], Type::Int(32));
    let h2val = h2.value();
    let x2 = h2.param(0);
    h2.ret(Some(x2));
    h2.finish();

    let mut main = mb.function("main", vec![Type::Int(32)], Type::Int(32));
    let c = main.param(0);
    let p = main.alloca(8);
    let b1 = main.new_block();
    let b2 = main.new_block();
    let join = main.new_block();
    let cond = main.cmp(c, Value::ConstInt(0));
    main.cond_br(cond, b1, b2);
    main.select(b1);
    main.store(h1val, p, 8);
    main.br(join);
    main.select(b2);
    main.store(h2val, p, 8);
    main.br(join);
    main.select(join);
    let fp = main.load(p, Type::Ptr);
    main.ret(Some(fp));
    main.finish();

    let module = mb.build();
    for flavor in [PtaFlavor::FlowInsensitive, PtaFlavor::FlowSensitive] {
        let pta = analyse(&module, flavor);
        let mut funcs = pta.functions_pointed_by(fp);
        funcs.sort();
        assert_eq!(funcs.len(), 2, "{:?}: p must point to h1 and h2", flavor);
    }
}

/// Field-offsets travel through geps and loads keep them apart.
#[test]
fn gep_offsets_are_tracked() {
    let mut mb = ModuleBuilder::new();

    let mut main = mb.function("main", vec![], Type::Int(32));
    let obj = main.alloca(16);
    let inner = main.alloca(4);
    let slot = main.gep(obj, Some(8));
    main.store(inner, slot, 8);
    let read_slot = main.gep(obj, Some(8));
    let loaded = main.load(read_slot, Type::Ptr);
    let other_slot = main.gep(obj, Some(0));
    let other = main.load(other_slot, Type::Ptr);
    main.ret(None);
    main.finish();

    let module = mb.build();
    let pta = analyse(&module, PtaFlavor::FlowInsensitive);

    let loaded_pts = pta.points_to(loaded).expect("has a node");
    assert!(loaded_pts.pointers.iter().any(|p| p.value == inner));

    let other_pts = pta.points_to(other).expect("has a node");
    assert!(
        !other_pts.pointers.iter().any(|p| p.value == inner),
        "a load at offset 0 must not see the pointer stored at offset 8"
    );
}

/// A call through a pointer that only holds unknown memory creates no
/// callees; the result is unknown.
#[test]
fn unknown_function_pointer_stays_unknown() {
    let mut mb = ModuleBuilder::new();
    let mystery = mb.declare("mystery", vec![], Type::Ptr);

    let mut main = mb.function("main", vec![], Type::Int(32));
    let fp = main.call(mystery, vec![], Type::Ptr);
    let result = main.call(fp, vec![], Type::Int(32));
    main.ret(Some(result));
    main.finish();

    let module = mb.build();
    let pta = analyse(&module, PtaFlavor::FlowInsensitive);

    assert!(pta.functions_pointed_by(fp).is_empty());
    let fp_pts = pta.points_to(fp).expect("has a node");
    assert!(fp_pts.has_unknown);
}

/// Globals with pointer initializers hand them out on load.
#[test]
fn global_initializers_are_visible() {
    let mut mb = ModuleBuilder::new();

    let mut target = mb.function("target", vec![], Type::Void);
    let tval = target.value();
    target.ret(None);
    target.finish();

    let table = mb.global_pointing_to("table", 8, vec![tval]);

    let mut main = mb.function("main", vec![], Type::Int(32));
    let fp = main.load(table, Type::Ptr);
    main.ret(None);
    main.finish();

    let module = mb.build();
    let pta = analyse(&module, PtaFlavor::FlowInsensitive);

    let funcs = pta.functions_pointed_by(fp);
    assert_eq!(funcs.len(), 1, "the initializer target flows out of the load");
}

/// The invalidation-aware solver retires freed memory.
#[test]
fn freed_memory_is_invalidated() {
    let mut mb = ModuleBuilder::new();
    let malloc = mb.declare("malloc", vec![Type::Int(64)], Type::Ptr);
    let free = mb.declare("free", vec![Type::Ptr], Type::Void);

    let mut main = mb.function("main", vec![], Type::Int(32));
    let slot = main.alloca(8);
    let heap = main.call(malloc, vec![Value::ConstInt(16)], Type::Ptr);
    main.store(heap, slot, 8);
    main.call(free, vec![heap], Type::Void);
    let dangling = main.load(slot, Type::Ptr);
    main.ret(None);
    main.finish();

    let module = mb.build();
    let pta = analyse(&module, PtaFlavor::FlowSensitiveInv);

    let pts = pta.points_to(dangling).expect("has a node");
    assert!(
        pts.has_invalidated,
        "a load of the stored pointer after free must observe invalidated memory"
    );
}

/// The same module under the plain flow-sensitive solver keeps the
/// pointer valid (no invalidation tracking).
#[test]
fn plain_fs_does_not_invalidate() {
    let mut mb = ModuleBuilder::new();
    let malloc = mb.declare("malloc", vec![Type::Int(64)], Type::Ptr);
    let free = mb.declare("free", vec![Type::Ptr], Type::Void);

    let mut main = mb.function("main", vec![], Type::Int(32));
    let slot = main.alloca(8);
    let heap = main.call(malloc, vec![Value::ConstInt(16)], Type::Ptr);
    main.store(heap, slot, 8);
    main.call(free, vec![heap], Type::Void);
    let loaded = main.load(slot, Type::Ptr);
    main.ret(None);
    main.finish();

    let module = mb.build();
    let pta = analyse(&module, PtaFlavor::FlowSensitive);

    let pts = pta.points_to(loaded).expect("has a node");
    assert!(!pts.has_invalidated);
    assert!(pts.pointers.iter().any(|p| p.value == heap));
}
