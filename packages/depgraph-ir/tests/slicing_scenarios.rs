//! End-to-end slicing scenarios over small modules.

mod common;

use common::{has_instruction, opcode_names, ModuleBuilder};
use depgraph_ir::pipeline::{run_slicer, DgOptions, SliceOutcome, SlicerOptions};
use depgraph_ir::shared::models::{Module, Type, Value};
use pretty_assertions::assert_eq;

fn slice(module: &mut Module, criteria: &str) -> SliceOutcome {
    slice_with(module, criteria, |_| {})
}

fn slice_with(
    module: &mut Module,
    criteria: &str,
    configure: impl FnOnce(&mut SlicerOptions),
) -> SliceOutcome {
    let mut options = SlicerOptions {
        dg_options: DgOptions::new("main"),
        slicing_criteria: criteria.to_string(),
        ..Default::default()
    };
    configure(&mut options);
    run_slicer(module, &options).expect("slicing succeeds")
}

fn assert_valid(outcome: &SliceOutcome) {
    match outcome {
        SliceOutcome::Sliced {
            verification_errors,
            ..
        } => assert!(
            verification_errors.is_empty(),
            "verification failed: {:?}",
            verification_errors
        ),
        other => panic!("expected a slice, got {:?}", other),
    }
}

/// int g; int main() { int x = 1; g = x; return g; }
/// An unrelated local must disappear, the def-use chain must stay.
#[test]
fn backward_slice_keeps_the_def_use_chain() {
    let mut mb = ModuleBuilder::new();
    let g = mb.global("g", 4);

    let mut main = mb.function("main", vec![], Type::Int(32));
    let x = main.alloca(4);
    main.at(1, 1);
    let y = main.alloca(4);
    main.at(2, 1);
    let store_x = main.store(Value::ConstInt(1), x, 4);
    main.at(3, 1);
    let store_y = main.store(Value::ConstInt(2), y, 4);
    main.at(4, 1);
    let load_x = main.load(x, Type::Int(32));
    main.at(5, 1);
    let store_g = main.store(load_x, g, 4);
    main.at(5, 2);
    let load_g = main.load(g, Type::Int(32));
    main.at(6, 1);
    main.ret(Some(load_g));
    main.at(7, 1);
    main.finish();

    let mut module = mb.build();
    let outcome = slice(&mut module, "7:0");
    assert_valid(&outcome);

    assert!(has_instruction(&module, x));
    assert!(has_instruction(&module, store_x));
    assert!(has_instruction(&module, load_x));
    assert!(has_instruction(&module, store_g));
    assert!(has_instruction(&module, load_g));

    assert!(!has_instruction(&module, y));
    assert!(!has_instruction(&module, store_y));

    assert_eq!(
        opcode_names(&module, "main"),
        vec!["alloca", "store", "load", "store", "load", "ret"]
    );
}

/// void f(int *p) { *p = 42; }
/// int main() { int a, b; f(&a); f(&b); return a; }
/// Only the call that feeds `a` survives.
#[test]
fn backward_slice_distinguishes_call_sites() {
    let mut mb = ModuleBuilder::new();

    let mut f = mb.function("f", vec![Type::Ptr], Type::Void);
    let fval = f.value();
    let p = f.param(0);
    let store_p = f.store(Value::ConstInt(42), p, 4);
    f.at(1, 3);
    f.ret(None);
    f.finish();

    let mut main = mb.function("main", vec![], Type::Int(32));
    let a = main.alloca(4);
    let b = main.alloca(4);
    let call_a = main.call(fval, vec![a], Type::Void);
    main.at(3, 3);
    let call_b = main.call(fval, vec![b], Type::Void);
    main.at(4, 3);
    let load_a = main.load(a, Type::Int(32));
    main.at(5, 3);
    main.ret(Some(load_a));
    main.at(5, 10);
    main.finish();

    let mut module = mb.build();
    let outcome = slice(&mut module, "5:10");
    assert_valid(&outcome);

    assert!(has_instruction(&module, a));
    assert!(has_instruction(&module, call_a));
    assert!(has_instruction(&module, load_a));
    assert!(has_instruction(&module, store_p), "f's store must survive");

    assert!(!has_instruction(&module, b), "alloca b must be sliced away");
    assert!(!has_instruction(&module, call_b), "f(&b) must be sliced away");
}

/// int h1(int x) { return x; }  int h2(int x) { return -x; }
/// int main(int c) { int (*p)(int) = c ? h1 : h2; return p(7); }
/// Both possible targets of the function pointer stay alive.
#[test]
fn function_pointer_call_preserves_all_targets() {
    let mut mb = ModuleBuilder::new();

    let mut h1 = mb.function("h1", vec![Type::Int(32)], Type::Int(32));
    let h1val = h1.value();
    let h1ret = {
        let x = h1.param(0);
        h1.ret(Some(x))
    };
    h1.finish();

    let mut h2 = mb.function("h2", vec![Type::Int(32)], Type::Int(32));
    let h2val = h2.value();
    let h2ret = {
        let x = h2.param(0);
        let neg = h2.binary(Type::Int(32), Value::ConstInt(0), x);
        h2.ret(Some(neg))
    };
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
    let result = main.call(fp, vec![Value::ConstInt(7)], Type::Int(32));
    main.ret(Some(result));
    main.at(9, 1);
    main.finish();

    let mut module = mb.build();
    let outcome = slice(&mut module, "9:1");
    assert_valid(&outcome);

    assert!(has_instruction(&module, h1ret), "h1's body must survive");
    assert!(has_instruction(&module, h2ret), "h2's body must survive");
    assert!(has_instruction(&module, fp));
    assert!(has_instruction(&module, result));
}

/// int x;
/// void *t(void *a) { x = 1; return 0; }
/// int main() { pthread_t th; pthread_create(&th, 0, t, 0); x = 2;
///              pthread_join(th, 0); return x; }
#[test]
fn threads_interference_keeps_both_stores_and_the_fork_join() {
    let mut mb = ModuleBuilder::new();
    let x = mb.global("x", 4);
    let create = mb.declare(
        "pthread_create",
        vec![Type::Ptr, Type::Ptr, Type::Ptr, Type::Ptr],
        Type::Int(32),
    );
    let join_fn = mb.declare("pthread_join", vec![Type::Int(64), Type::Ptr], Type::Int(32));

    let mut t = mb.function("t", vec![Type::Ptr], Type::Ptr);
    let tval = t.value();
    let store_t = t.store(Value::ConstInt(1), x, 4);
    t.at(3, 3);
    t.ret(Some(Value::Null));
    t.finish();

    let mut main = mb.function("main", vec![], Type::Int(32));
    let th = main.alloca(8);
    let call_create = main.call(create, vec![th, Value::Null, tval, Value::Null], Type::Int(32));
    main.at(5, 3);
    let store_main = main.store(Value::ConstInt(2), x, 4);
    main.at(6, 3);
    let th_val = main.load(th, Type::Int(64));
    let call_join = main.call(join_fn, vec![th_val, Value::Null], Type::Int(32));
    main.at(7, 3);
    let load_x = main.load(x, Type::Int(32));
    main.ret(Some(load_x));
    main.at(8, 3);
    main.finish();

    let mut module = mb.build();
    let outcome = slice_with(&mut module, "8:0", |options| {
        options.dg_options.threads = true;
    });
    assert_valid(&outcome);

    assert!(has_instruction(&module, store_main));
    assert!(has_instruction(&module, store_t), "the thread's store x=1 interferes");
    assert!(has_instruction(&module, call_create));
    assert!(has_instruction(&module, call_join));
    assert!(has_instruction(&module, load_x));
}

/// memcpy's model produces the data edge from the copy to a later use of
/// the destination, with constant and with symbolic length.
#[test]
fn memcpy_model_feeds_later_reads() {
    for symbolic_len in [false, true] {
        let mut mb = ModuleBuilder::new();
        let memcpy = mb.declare("memcpy", vec![Type::Ptr, Type::Ptr, Type::Int(64)], Type::Ptr);

        let mut main = mb.function("main", vec![Type::Int(64)], Type::Int(32));
        let n = main.param(0);
        let buf = main.alloca(16);
        let src = main.alloca(16);
        main.store(Value::ConstInt(7), src, 8);
        let len = if symbolic_len { n } else { Value::ConstInt(8) };
        let copy = main.call(memcpy, vec![buf, src, len], Type::Ptr);
        main.at(4, 3);
        let at4 = main.gep(buf, Some(4));
        let use_buf = main.load(at4, Type::Int(32));
        main.ret(Some(use_buf));
        main.at(6, 3);
        main.finish();

        let mut module = mb.build();
        let outcome = slice(&mut module, "6:0");
        assert_valid(&outcome);

        assert!(
            has_instruction(&module, copy),
            "memcpy (symbolic_len={}) must stay in the slice",
            symbolic_len
        );
        assert!(has_instruction(&module, use_buf));
    }
}

/// Slicing away a conditional branch collapses the surviving predecessor
/// onto its only remaining successor.
#[test]
fn removed_branch_collapses_to_unconditional_jump() {
    let mut mb = ModuleBuilder::new();
    let g = mb.global("g", 4);

    let mut main = mb.function("main", vec![Type::Int(32)], Type::Int(32));
    let c = main.param(0);
    let dead = main.new_block();
    let exit = main.new_block();
    let store_g = main.store(Value::ConstInt(1), g, 4);
    main.at(2, 3);
    let cond = main.cmp(c, Value::ConstInt(0));
    let branch = main.cond_br(cond, dead, exit);
    main.select(dead);
    let dead_jump = main.br(exit);
    main.select(exit);
    let load_g = main.load(g, Type::Int(32));
    main.ret(Some(load_g));
    main.at(6, 3);
    main.finish();

    let mut module = mb.build();
    let outcome = slice(&mut module, "6:0");
    assert_valid(&outcome);

    assert!(has_instruction(&module, store_g));
    assert!(has_instruction(&module, load_g));
    assert!(!has_instruction(&module, branch), "the branch is not needed");
    assert!(!has_instruction(&module, cond));
    assert!(!has_instruction(&module, dead_jump));

    // the entry must now fall through unconditionally
    assert_eq!(
        opcode_names(&module, "main"),
        vec!["store", "br", "load", "ret"]
    );
}

/// A criterion that cuts the whole tail of the function leaves a block
/// with no way on; a safe return is synthesised.
#[test]
fn unreachable_tail_gets_a_safe_return() {
    let mut mb = ModuleBuilder::new();
    let g = mb.global("g", 4);

    let mut main = mb.function("main", vec![Type::Int(32)], Type::Int(32));
    let c = main.param(0);
    let b1 = main.new_block();
    let b2 = main.new_block();
    let exit = main.new_block();
    let store_g = main.store(Value::ConstInt(1), g, 4);
    main.at(2, 3);
    let cond = main.cmp(c, Value::ConstInt(0));
    main.cond_br(cond, b1, b2);
    main.select(b1);
    main.br(exit);
    main.select(b2);
    main.br(exit);
    main.select(exit);
    let load_g = main.load(g, Type::Int(32));
    main.ret(Some(load_g));
    main.finish();

    let mut module = mb.build();
    // slice on the store only: everything after it may go
    let outcome = slice(&mut module, "2:3");
    assert_valid(&outcome);

    assert!(has_instruction(&module, store_g));
    assert!(!has_instruction(&module, load_g));
    assert!(!has_instruction(&module, cond));

    // every surviving block is terminated and main still returns
    let main_fn = module.function_by_name("main").expect("main exists");
    assert!(main_fn
        .blocks
        .iter()
        .all(|b| b.terminator().is_some()));
    assert!(opcode_names(&module, "main").contains(&"ret"));
}
