//! Idempotence and preservation guarantees of the slicer and the
//! pointer analysis.

mod common;

use common::{has_instruction, ModuleBuilder};
use depgraph_ir::features::points_to::application::analyzer::PointerAnalysis;
use depgraph_ir::features::points_to::application::options::PTAOptions;
use depgraph_ir::features::points_to::ports::PointsToQuery;
use depgraph_ir::pipeline::{run_slicer, DgOptions, SliceOutcome, SlicerOptions};
use depgraph_ir::shared::models::{Module, ModuleIndex, Type, Value};
use pretty_assertions::assert_eq;

fn two_function_module() -> (Module, Value, Value) {
    let mut mb = ModuleBuilder::new();
    let g = mb.global("g", 4);

    let mut f = mb.function("f", vec![Type::Ptr], Type::Void);
    let fval = f.value();
    let p = f.param(0);
    f.store(Value::ConstInt(42), p, 4);
    f.at(1, 3);
    f.ret(None);
    f.finish();

    let mut main = mb.function("main", vec![], Type::Int(32));
    let a = main.alloca(4);
    main.call(fval, vec![a], Type::Void);
    main.store(Value::ConstInt(1), g, 4);
    let lg = main.load(g, Type::Int(32));
    main.ret(Some(lg));
    main.at(5, 1);
    main.finish();

    (mb.build(), g, a)
}

/// Slicing with no criteria at all leaves the module bit-identical.
#[test]
fn empty_criteria_leave_the_module_untouched() {
    let (mut module, _, _) = two_function_module();
    let pristine = module.clone();

    let options = SlicerOptions {
        dg_options: DgOptions::new("main"),
        ..Default::default()
    };
    let outcome = run_slicer(&mut module, &options).expect("no-op slice succeeds");

    assert!(matches!(outcome, SliceOutcome::NoCriteria));
    assert_eq!(module, pristine);
}

/// A criterion that matches nothing reports so and changes nothing.
#[test]
fn unmatched_criteria_return_the_no_match_outcome() {
    let (mut module, _, _) = two_function_module();
    let pristine = module.clone();

    let options = SlicerOptions {
        dg_options: DgOptions::new("main"),
        slicing_criteria: "999:999".to_string(),
        ..Default::default()
    };
    let outcome = run_slicer(&mut module, &options).expect("slicing runs");

    assert!(matches!(outcome, SliceOutcome::NothingMatched));
    assert_eq!(module, pristine);
}

/// Running the pointer analysis twice over one module yields the same
/// points-to sets.
#[test]
fn pointer_analysis_is_deterministic() {
    let (module, g, a) = two_function_module();
    let index = ModuleIndex::new(&module);

    let resolve = |value: Value| {
        let mut pta =
            PointerAnalysis::build(&module, &index, PTAOptions::default()).expect("builds");
        pta.run();
        let mut pts = pta
            .points_to(value)
            .map(|p| p.pointers)
            .unwrap_or_default();
        pts.sort_by_key(|p| (format!("{:?}", p.value), p.offset));
        pts
    };

    assert_eq!(resolve(g), resolve(g));
    assert_eq!(resolve(a), resolve(a));
}

/// Functions marked as preserved come out of the slicer untouched, even
/// when the slice would otherwise gut them.
#[test]
fn preserved_functions_are_identical_after_slicing() {
    let (mut module, _, _) = two_function_module();
    let f_before = module.function_by_name("f").expect("f exists").clone();

    let options = SlicerOptions {
        dg_options: DgOptions::new("main"),
        // criterion: the load of g; f's effects are irrelevant to it
        slicing_criteria: "5:1".to_string(),
        preserved_functions: vec!["f".to_string()],
        ..Default::default()
    };
    let outcome = run_slicer(&mut module, &options).expect("slicing succeeds");
    assert!(matches!(outcome, SliceOutcome::Sliced { .. }));

    let f_after = module.function_by_name("f").expect("f survives");
    assert_eq!(*f_after, f_before);
}

/// Without preservation the same slice does remove f's store.
#[test]
fn unpreserved_functions_are_cut() {
    let (mut module, _, _) = two_function_module();

    let options = SlicerOptions {
        dg_options: DgOptions::new("main"),
        slicing_criteria: "5:1".to_string(),
        ..Default::default()
    };
    run_slicer(&mut module, &options).expect("slicing succeeds");

    let f_after = module.function_by_name("f").expect("f exists");
    let stores: usize = f_after
        .blocks
        .iter()
        .flat_map(|b| &b.instructions)
        .filter(|i| matches!(i.op, depgraph_ir::shared::models::Opcode::Store { .. }))
        .count();
    assert_eq!(stores, 0, "f's store is not in the slice");
}

/// Forward slicing keeps what depends on the criterion instead of what
/// the criterion depends on.
#[test]
fn forward_slice_follows_the_flow_downstream() {
    let mut mb = ModuleBuilder::new();
    let g = mb.global("g", 4);

    let mut main = mb.function("main", vec![], Type::Int(32));
    let x = main.alloca(4);
    let store_x = main.store(Value::ConstInt(1), x, 4);
    main.at(2, 1);
    let load_x = main.load(x, Type::Int(32));
    let store_g = main.store(load_x, g, 4);
    let unrelated = main.alloca(8);
    let load_g = main.load(g, Type::Int(32));
    main.ret(Some(load_g));
    main.finish();

    let mut module = mb.build();
    let options = SlicerOptions {
        dg_options: DgOptions::new("main"),
        slicing_criteria: "2:1".to_string(),
        forward_slicing: true,
        ..Default::default()
    };
    run_slicer(&mut module, &options).expect("slicing succeeds");

    assert!(has_instruction(&module, store_x));
    assert!(has_instruction(&module, load_x));
    assert!(has_instruction(&module, store_g));
    assert!(has_instruction(&module, load_g));
    assert!(!has_instruction(&module, unrelated));
    // x's alloca is upstream of the criterion, not downstream
    assert!(!has_instruction(&module, x));
}
