//! The error model: composed context rewrites, stack traces, JSON form.

use curv::{System, eval_str};

fn fail(text: &str) -> curv::Exception {
    eval_str(text, "[test]", System::new()).expect_err("expected an error")
}

#[test]
fn argument_errors_name_the_function() {
    let err = fail("f = [x] -> x; f 3");
    assert_eq!(err.message(), "argument #1 of f: 3: not a list");
}

#[test]
fn field_contexts_compose() {
    let err = fail("{a: [x, y]} = {a: [1]}; x");
    assert_eq!(
        err.message(),
        "at field .a: list pattern: expected 2 items, got 1"
    );
}

#[test]
fn index_contexts_compose() {
    let err = fail("[[x, y], z] = [[1], 2]; x");
    assert_eq!(
        err.message(),
        "at index [0]: list pattern: expected 2 items, got 1"
    );
}

#[test]
fn user_errors_carry_a_stack_trace() {
    let err = fail("f = x -> error \"boom\"; f 1");
    assert_eq!(err.message(), "boom");
    // Innermost first: the error call, then the call of f.
    assert!(err.locations().len() >= 2, "{:?}", err.locations());
    let call_of_f = &err.locations()[err.locations().len() - 1];
    assert_eq!(
        call_of_f.func_name.as_ref().map(ToString::to_string),
        Some("f".to_string())
    );
}

#[test]
fn locations_carry_line_and_column() {
    let err = fail("x = 1;\nnonesuch");
    let loc = &err.locations()[0];
    let info = loc.srcloc.line_info();
    assert_eq!(info.start_line_num, 1);
    assert_eq!(info.start_column_num, 0);
}

#[test]
fn the_human_trace_quotes_the_source() {
    let err = fail("1 + #foo");
    let text = err.to_string();
    assert!(text.starts_with("ERROR: "), "{text}");
    assert!(text.contains("[test]"), "{text}");
    assert!(text.contains('^'), "{text}");
}

#[test]
fn the_json_form_has_message_and_locations() {
    let err = fail("sqrt #foo");
    let json = err.to_json();
    assert_eq!(
        json["error"]["message"],
        serde_json::json!("sqrt #foo: domain error")
    );
    assert!(json["error"]["location"].is_array());
    assert_eq!(json["error"]["location"][0]["file"], "[test]");
}

#[test]
fn deprecated_escapes_explain_their_replacement() {
    let err = fail("\"a$$b\"");
    assert!(err.message().contains("${dol} or $."), "{}", err.message());
}

#[test]
fn unterminated_comments_are_lexical_errors() {
    let err = fail("1 + /* no end");
    assert_eq!(err.message(), "unterminated comment");
}

#[test]
fn missing_record_fields_are_runtime_errors() {
    let err = fail("r = {a: 1}; r.b");
    assert_eq!(err.message(), ".b: not defined");
}

#[test]
fn if_without_else_is_not_an_expression() {
    let err = fail("x = if (1 < 2) 3; x");
    assert!(err.message().contains("if without else"), "{}", err.message());
}

#[test]
fn assigning_a_module_field_is_rejected() {
    let err = fail("m = {a = 1; b = (a := 2; 0)}; m.b");
    assert!(err.message().contains("not assignable"), "{}", err.message());
}
