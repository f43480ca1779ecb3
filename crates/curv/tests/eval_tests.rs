//! End-to-end evaluation: scan, parse, analyse, evaluate, print.

use curv::{System, Ternary, eval_str, repr};

fn show(text: &str) -> String {
    let value = eval_str(text, "[test]", System::new())
        .unwrap_or_else(|e| panic!("{text}: {e}"));
    repr(&value)
}

fn err(text: &str) -> String {
    eval_str(text, "[test]", System::new())
        .expect_err("expected an error")
        .message()
        .to_string()
}

#[test]
fn numerals_print_back() {
    assert_eq!(show("42.7"), "42.7");
    assert_eq!(show("42"), "42");
    assert_eq!(show("1e3"), "1000");
    assert_eq!(show("0xFF"), "255");
    assert_eq!(show("-0"), "-0");
}

#[test]
fn zero_over_zero_is_a_domain_error() {
    assert_eq!(err("0.0/0.0"), "0/0: domain error");
}

#[test]
fn sqrt_of_four_is_two() {
    assert_eq!(show("sqrt 4"), "2");
}

#[test]
fn sqrt_of_a_symbol_is_a_domain_error() {
    assert_eq!(err("sqrt #foo"), "sqrt #foo: domain error");
}

#[test]
fn broadcasting() {
    assert_eq!(show("[1,2,3] + 10"), "[11,12,13]");
    assert_eq!(show("[1,2] + [10,20]"), "[11,22]");
    assert_eq!(show("[[1,2],[3,4]] * 2"), "[[2,4],[6,8]]");
    assert!(err("[1,2] + [10,20,30]").contains("mismatched list sizes"));
}

#[test]
fn factorial_via_recursion() {
    assert_eq!(
        show("f = x -> if (x <= 1) 1 else x * f(x-1); f 6"),
        "720"
    );
}

#[test]
fn tail_recursion_runs_in_constant_stack() {
    // Enough iterations to overflow the stack if the trampoline recursed.
    assert_eq!(
        show("sum = (n, acc) -> if (n <= 0) acc else sum(n - 1, acc + n); sum(100000, 0)"),
        "5000050000"
    );
}

#[test]
fn record_field_assignment() {
    assert_eq!(show("r = {a:1, b:2}; r.a := 9; r"), "{a:9,b:2}");
}

#[test]
fn tuple_assignment_amends_both_fields() {
    assert_eq!(
        show("r = {a:1, b:2}; (r.a, r.b) := (10, 20); r"),
        "{a:10,b:20}"
    );
}

#[test]
fn local_redefinition_is_an_analysis_error() {
    assert_eq!(err("local a = 1; local a = 2; a"), "a: multiply defined");
}

#[test]
fn data_recursion_is_an_analysis_error() {
    assert_eq!(err("x = x; x"), "illegal recursive reference");
}

#[test]
fn duplicate_module_fields_are_an_analysis_error() {
    assert_eq!(err("a = 1; a = 2; a"), "a: multiply defined");
}

#[test]
fn undefined_names_are_reported() {
    assert_eq!(err("nonesuch"), "nonesuch: not defined");
}

#[test]
fn calling_a_number_fails() {
    assert_eq!(err("f = 2; f 3"), "2: not a function");
}

#[test]
fn let_orders_definitions_by_dependency() {
    assert_eq!(show("let x = 1; y = x + 1 in x + y"), "3");
    // Forward reference: y's initialiser runs after x's regardless of
    // textual order.
    assert_eq!(show("let y = x + 1; x = 1 in y"), "2");
}

#[test]
fn modules_evaluate_to_records_of_their_definitions() {
    assert_eq!(show("{a = 1; b = a + 1}"), "{a:1,b:2}");
    assert_eq!(show("m = {a = 1; b = a + 1}; m.b"), "2");
}

#[test]
fn mutually_recursive_functions_in_a_module() {
    let src = "\
        m = {\
            even n = if (n == 0) #true else odd(n - 1);\
            odd n = if (n == 0) #false else even(n - 1);\
        };\
        m.even 10";
    assert_eq!(show(src), "#true");
}

#[test]
fn recursive_module_is_order_independent() {
    let a = "m = {even n = if (n == 0) #true else odd(n-1); odd n = if (n == 0) #false else even(n-1)}; m.even 7";
    let b = "m = {odd n = if (n == 0) #false else even(n-1); even n = if (n == 0) #true else odd(n-1)}; m.even 7";
    assert_eq!(show(a), show(b));
}

#[test]
fn do_blocks_allow_sequential_assignment() {
    assert_eq!(show("do local a = 1; a := a + 1 in a"), "2");
}

#[test]
fn assignment_inside_an_operand_is_rejected() {
    // `+` has no defined evaluation order, so its operands cannot mutate
    // bindings defined outside themselves.
    let msg = err("do local a = 1; local b = (a := 2) + 1 in b");
    assert!(msg.contains("not"), "unexpected message: {msg}");
}

#[test]
fn while_loops_generate() {
    assert_eq!(
        show("do local i = 0; local out = []; while (i < 4) do (out := out ++ [i]; i := i + 1) in out"),
        "[0,1,2,3]"
    );
}

#[test]
fn ranges_and_for_loops() {
    assert_eq!(show("1..5"), "[1,2,3,4,5]");
    assert_eq!(show("1..<4"), "[1,2,3]");
    assert_eq!(show("1..10 by 2"), "[1,3,5,7,9]");
    assert_eq!(show("5..1 by -2"), "[5,3,1]");
    assert_eq!(show("[for i in 1..3 do i*i]"), "[1,4,9]");
    assert!(err("1..2 by 0").contains("invalid range"));
}

#[test]
fn list_construction_and_spread() {
    assert_eq!(show("[1, 2, 3]"), "[1,2,3]");
    assert_eq!(show("(1, 2, 3)"), "[1,2,3]");
    assert_eq!(show("[...[1,2], 3]"), "[1,2,3]");
    assert_eq!(show("{...{a:1}, b:2}"), "{a:1,b:2}");
}

#[test]
fn strings_and_interpolation() {
    assert_eq!(show("\"hello\""), "\"hello\"");
    assert_eq!(show("\"value: ${1+2}\""), "\"value: 3\"");
    assert_eq!(show("x = \"world\"; \"hello $x\""), "\"hello world\"");
    assert_eq!(show("\"a$[66]c\""), "\"aBc\"");
    // `$.` and `$=` escape the two characters string syntax reserves.
    assert_eq!(show("\"a$.b\""), "\"a$.b\"");
}

#[test]
fn characters_promote_to_strings() {
    assert_eq!(show("char 65"), "char 65");
    assert_eq!(show("[char 72, char 105]"), "\"Hi\"");
    assert_eq!(show("count \"abc\""), "3");
}

#[test]
fn catenation_works_over_both_sequence_kinds() {
    assert_eq!(show("[1,2] ++ [3]"), "[1,2,3]");
    assert_eq!(show("\"ab\" ++ \"cd\""), "\"abcd\"");
    assert_eq!(show("\"ab\" ++ [1]"), "[char 97,char 98,1]");
}

#[test]
fn indexing() {
    assert_eq!(show("[10,20,30]@1"), "20");
    assert_eq!(show("x = [10,20,30]; x[2]"), "30");
    assert_eq!(show("m = [[1,2],[3,4]]; m[1,0]"), "3");
    assert_eq!(show("\"abc\"@0"), "char 97");
    assert_eq!(show("r = {a:1}; r@#a"), "1");
    assert!(err("[1,2]@5").contains("Bad index"));
}

#[test]
fn lens_amendment_through_the_language() {
    assert_eq!(show("r = {a:[1,2,3]}; r.a@1 := 99; r"), "{a:[1,99,3]}");
    assert_eq!(show("x = [1,2,3]; x@0 := 7; x"), "[7,2,3]");
}

#[test]
fn equality_is_structural() {
    assert_eq!(show("[1,2] == [1,2]"), "#true");
    assert_eq!(show("{a:1} == {a:1}"), "#true");
    assert_eq!(show("0 == -0"), "#true");
    assert_eq!(show("\"ab\" == [char 97, char 98]"), "#true");
    assert_eq!(show("1 == #true"), "#false");
    assert_eq!(show("1 != 2"), "#true");
}

#[test]
fn functions_compare_by_identity() {
    assert_eq!(show("f = x -> x; g = x -> x; f == g"), "#false");
    assert_eq!(show("f = x -> x; g = f; f == g"), "#true");
}

#[test]
fn booleans_are_the_true_false_symbols() {
    assert_eq!(show("true"), "#true");
    assert_eq!(show("#false"), "#false");
    assert_eq!(show("1 < 2 && 2 < 3"), "#true");
    assert_eq!(show("1 > 2 || 2 > 3"), "#false");
    assert_eq!(show("!(1 < 2)"), "#false");
}

#[test]
fn piecewise_functions_fall_through_on_pattern_mismatch() {
    assert_eq!(show("f = match [[x] -> x, _ -> 0]; f [5]"), "5");
    assert_eq!(show("f = match [[x] -> x, _ -> 0]; f 7"), "0");
}

#[test]
fn composite_functions_pipe_left_to_right() {
    assert_eq!(show("g = compose [x -> x + 1, x -> x * 2]; g 3"), "8");
}

#[test]
fn pipeline_operators_apply() {
    assert_eq!(show("4 >> sqrt"), "2");
    assert_eq!(show("sqrt << 4"), "2");
}

#[test]
fn callable_records() {
    assert_eq!(show("r = {call: x -> x + 1}; r 41"), "42");
}

#[test]
fn record_patterns_destructure() {
    assert_eq!(show("{a, b} = {a:1, b:2}; a + b"), "3");
    assert_eq!(show("{a: x} = {a:5}; x"), "5");
    assert_eq!(show("[p, q] = [10, 20]; p - q"), "-10");
}

#[test]
fn include_splices_record_fields() {
    assert_eq!(show("{include {a: 1}; b = 2}"), "{a:1,b:2}");
}

#[test]
fn parametric_evaluates_with_defaults() {
    assert_eq!(show("parametric size = 2 in size * 10"), "20");
}

#[test]
fn test_definitions_run_their_assertions() {
    assert_eq!(show("{a = 1; test assert(a == 1)}"), "{a:1}");
    assert!(err("{a = 1; test assert(a == 2)}").contains("assertion failed"));
}

#[test]
fn builtin_folds() {
    assert_eq!(show("max [3, 1, 4]"), "4");
    assert_eq!(show("min [3, 1, 4]"), "1");
    assert_eq!(show("sum [1, 2, 3]"), "6");
    assert_eq!(show("fields {a:1, b:2}"), "[#a,#b]");
}

#[test]
fn print_goes_to_the_console() {
    use std::cell::RefCell;
    use std::rc::Rc;

    struct SharedConsole(Rc<RefCell<String>>);
    impl curv::Console for SharedConsole {
        fn write(&mut self, text: &str) {
            self.0.borrow_mut().push_str(text);
        }
    }

    let buffer = Rc::new(RefCell::new(String::new()));
    let system = System::with_console(Box::new(SharedConsole(Rc::clone(&buffer))));
    let value = eval_str("print \"hi\"; 1", "[test]", system).expect("eval");
    assert_eq!(repr(&value), "1");
    assert_eq!(buffer.borrow().as_str(), "hi\n");
}

#[test]
fn literals_round_trip_through_repr() {
    for src in [
        "42.7",
        "-0",
        "#true",
        "#foo",
        "char 97",
        "[1, #a, \"hi\"]",
        "{a:1, b:[2,3]}",
        "\"a$.b$=c\"",
    ] {
        let system = System::new();
        let v1 = eval_str(src, "[test]", system.clone()).expect("eval 1");
        let v2 = eval_str(&repr(&v1), "[test]", system).expect("eval 2");
        assert_eq!(
            v1.equal(&v2, &curv::context::AtSystem).expect("equal"),
            Ternary::True,
            "{src} did not round trip"
        );
    }
}

#[test]
fn pure_expressions_are_bit_identical_across_evaluations() {
    for src in ["1/3", "-0", "2^0.5", "[1, 2.5e-3]"] {
        let a = eval_str(src, "[test]", System::new()).expect("eval");
        let b = eval_str(src, "[test]", System::new()).expect("eval");
        assert!(a.hash_eq(&b), "{src} was not bit-identical");
    }
}

#[test]
fn file_import() {
    let dir = std::env::temp_dir().join(format!("curv-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("mkdir");
    let path = dir.join("mod.curv");
    std::fs::write(&path, "a = 1; b = a + 1").expect("write");
    let src = format!("m = file \"{}\"; m.b", path.display());
    assert_eq!(show(&src), "2");
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn recursive_file_import_is_detected() {
    let dir = std::env::temp_dir().join(format!("curv-cycle-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("mkdir");
    let path = dir.join("loop.curv");
    std::fs::write(&path, format!("a = file \"{}\"; a", path.display())).expect("write");
    let msg = err(&format!("file \"{}\"", path.display()));
    assert!(msg.contains("recursive"), "unexpected message: {msg}");
    std::fs::remove_dir_all(&dir).ok();
}
