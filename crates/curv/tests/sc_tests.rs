//! Shape compiler: closures lowered to GLSL-flavoured SSA text.

use curv::context::AtSystem;
use curv::{ScCompiler, ScType, System, Value, eval_str};

fn compile(src: &str, param: ScType, result: ScType) -> String {
    let func = eval_str(src, "[test]", System::new()).expect("eval");
    let mut sc = ScCompiler::new();
    sc.define_function("dist", param, result, &func, &AtSystem)
        .unwrap_or_else(|e| panic!("{src}: {e}"))
}

fn compile_err(src: &str, param: ScType, result: ScType) -> String {
    let func = eval_str(src, "[test]", System::new()).expect("eval");
    let mut sc = ScCompiler::new();
    sc.define_function("dist", param, result, &func, &AtSystem)
        .expect_err("expected a shape compiler error")
        .message()
        .to_string()
}

fn eval_value(src: &str) -> Value {
    eval_str(src, "[test]", System::new()).expect("eval")
}

#[test]
fn scalar_function() {
    let text = compile("x -> x + 1", ScType::num(), ScType::num());
    assert!(text.contains("float dist(float r0)"), "{text}");
    assert!(text.contains("float r1 = 1.0;"), "{text}");
    assert!(text.contains("float r2 = r0 + r1;"), "{text}");
    assert!(text.contains("return r2;"), "{text}");
}

#[test]
fn vector_parameters_are_destructured() {
    let text = compile("[x, y] -> x * y", ScType::vec(2), ScType::num());
    assert!(text.contains("float dist(vec2 r0)"), "{text}");
    assert!(text.contains("float r1 = r0[0];"), "{text}");
    assert!(text.contains("float r2 = r0[1];"), "{text}");
    assert!(text.contains("float r3 = r1 * r2;"), "{text}");
}

#[test]
fn diamond_subexpressions_share_one_register() {
    let text = compile("x -> (x + x) * (x + x)", ScType::num(), ScType::num());
    let adds = text.matches("r0 + r0").count();
    assert_eq!(adds, 1, "common subexpression was not cached:\n{text}");
}

#[test]
fn calls_on_closures_are_inlined() {
    let text = compile(
        "let double = v -> v + v in x -> double(double x)",
        ScType::num(),
        ScType::num(),
    );
    // No function call syntax in the output; the body is fully inlined.
    assert!(!text.contains("double"), "{text}");
    assert!(text.contains("return"), "{text}");
}

#[test]
fn builtins_map_to_glsl_intrinsics() {
    let text = compile("x -> sqrt x", ScType::num(), ScType::num());
    assert!(text.contains("sqrt(r0)"), "{text}");
}

#[test]
fn vectors_construct_and_scalars_promote() {
    let text = compile("x -> [x, x, 1] + 2", ScType::num(), ScType::vec(3));
    assert!(text.contains("vec3"), "{text}");
}

#[test]
fn conditionals_lower_to_ternaries() {
    let text = compile(
        "x -> if (x < 0) 0 - x else x",
        ScType::num(),
        ScType::num(),
    );
    assert!(text.contains('?'), "{text}");
    assert!(text.contains("r0 < "), "{text}");
}

#[test]
fn let_bindings_lower_to_assignments() {
    let text = compile(
        "x -> let y = x * x in y + y",
        ScType::num(),
        ScType::num(),
    );
    assert!(text.contains("r0 * r0"), "{text}");
}

#[test]
fn captured_nonlocals_become_constants() {
    let text = compile("k = 3; x -> x * k", ScType::num(), ScType::num());
    assert!(text.contains("3.0"), "{text}");
}

#[test]
fn matrices_multiply_componentwise() {
    let text = compile(
        "m = [[1,2],[3,4]]; x -> m * m",
        ScType::num(),
        ScType::mat(2),
    );
    assert!(text.contains("matrixCompMult"), "{text}");
    assert!(text.contains("mat2"), "{text}");
}

#[test]
fn unsupported_values_are_shape_compiler_errors() {
    let msg = compile_err("x -> \"abc\"", ScType::num(), ScType::num());
    assert!(msg.starts_with("Shape Compiler:"), "{msg}");
}

#[test]
fn sc_errors_compose_with_the_requesting_context() {
    use curv::context::Rewriting;
    let func = eval_value("x -> \"abc\"");
    let mut sc = ScCompiler::new();
    // Compiling on behalf of a builtin argument: the argument context
    // wraps the shape compiler's own message.
    let cx = Rewriting::new(&AtSystem, |msg: String| {
        format!("argument #1 of render: {msg}")
    });
    let msg = sc
        .define_function("dist", ScType::num(), ScType::num(), &func, &cx)
        .expect_err("expected a shape compiler error")
        .message()
        .to_string();
    assert!(
        msg.starts_with("argument #1 of render: Shape Compiler:"),
        "{msg}"
    );
}

#[test]
fn unsupported_operations_name_the_node() {
    let msg = compile_err("x -> [for i in 1..x do i]", ScType::num(), ScType::num());
    assert!(msg.starts_with("Shape Compiler:"), "{msg}");
    assert!(msg.contains("For_Op") || msg.contains("Range_Gen"), "{msg}");
}

#[test]
fn result_type_mismatch_is_reported() {
    let msg = compile_err("x -> x < 0", ScType::num(), ScType::num());
    assert!(msg.contains("result type mismatch"), "{msg}");
}

#[test]
fn mismatched_vector_counts_do_not_unify() {
    let msg = compile_err("x -> [x, x] + [x, x, x]", ScType::num(), ScType::vec(2));
    assert!(msg.starts_with("Shape Compiler:"), "{msg}");
}

#[test]
fn sc_type_of_classifies_values() {
    use curv::sc_type_of;
    assert!(sc_type_of(&eval_value("1.5")).is_num());
    assert!(sc_type_of(&eval_value("#true")).is_bool());
    assert_eq!(sc_type_of(&eval_value("[1,2,3]")).glsl_name(), Some("vec3"));
    assert_eq!(
        sc_type_of(&eval_value("[[1,2],[3,4]]")).glsl_name(),
        Some("mat2")
    );
    assert!(sc_type_of(&eval_value("\"abc\"")).is_error());
    // A ragged list is not a tensor.
    assert!(sc_type_of(&eval_value("[[1,2],[3]]")).is_error());
}
