//! Tree lens laws: fetch and amend over lists, records, paths and slices.

use std::rc::Rc;

use curv::context::AtSystem;
use curv::symbol::Symbol;
use curv::system::SourceState;
use curv::tree::{tree_amend, tree_fetch};
use curv::types::index::{make_tpath, make_tslice};
use curv::value::{Ternary, Value};
use curv::{System, eval_str};
use pretty_assertions::assert_eq;

fn sstate() -> Rc<SourceState> {
    SourceState::new(System::new(), None)
}

fn eval(src: &str) -> Value {
    eval_str(src, "[test]", System::new()).expect("eval")
}

fn assert_value_eq(a: &Value, b: &Value) {
    assert_eq!(
        a.equal(b, &AtSystem).expect("equal"),
        Ternary::True,
        "{a} != {b}"
    );
}

#[test]
fn fetch_after_amend_returns_the_new_subvalue() {
    let sstate = sstate();
    let trees = [
        eval("[1, [2, 3], {a: 4}]"),
        eval("{x: [1, 2], y: {z: 3}}"),
    ];
    let indexes = [
        eval("0"),
        make_tpath(&[eval("1"), eval("0")]),
        make_tpath(&[Value::symbol(Symbol::new("x")), eval("1")]),
    ];
    for tree in &trees {
        for index in &indexes {
            let Ok(original) = tree_fetch(tree, index, &sstate, &AtSystem) else {
                // This index does not address this tree; nothing to check.
                continue;
            };
            let v = eval("99");
            let amended = tree_amend(tree, index, v.clone(), &sstate, &AtSystem)
                .expect("amend");
            let fetched = tree_fetch(&amended, index, &sstate, &AtSystem).expect("fetch");
            assert_value_eq(&fetched, &v);

            // Writing back what was read is the identity.
            let same = tree_amend(tree, index, original, &sstate, &AtSystem)
                .expect("amend");
            assert_value_eq(&same, tree);
        }
    }
}

#[test]
fn number_indexes_are_positional_and_checked() {
    let sstate = sstate();
    let tree = eval("[10, 20, 30]");
    let got = tree_fetch(&tree, &eval("2"), &sstate, &AtSystem).expect("fetch");
    assert_value_eq(&got, &eval("30"));
    let err = tree_fetch(&tree, &eval("3"), &sstate, &AtSystem).expect_err("range");
    assert!(err.message().contains("Bad index"), "{}", err.message());
    assert!(err.message().contains("collection"), "{}", err.message());
}

#[test]
fn symbol_indexes_fetch_fields() {
    let sstate = sstate();
    let tree = eval("{a: 1, b: 2}");
    let got = tree_fetch(&tree, &Value::symbol(Symbol::new("b")), &sstate, &AtSystem)
        .expect("fetch");
    assert_value_eq(&got, &eval("2"));
}

#[test]
fn list_indexes_broadcast() {
    let sstate = sstate();
    let tree = eval("[10, 20, 30]");
    let got = tree_fetch(&tree, &eval("[2, 0]"), &sstate, &AtSystem).expect("fetch");
    assert_value_eq(&got, &eval("[30, 10]"));
}

#[test]
fn list_shaped_amend_requires_equal_sizes() {
    let sstate = sstate();
    let tree = eval("[10, 20, 30]");
    let err = tree_amend(&tree, &eval("[0, 1]"), eval("[5]"), &sstate, &AtSystem)
        .expect_err("size mismatch");
    assert!(err.message().contains("expected 2 items"), "{}", err.message());
}

#[test]
fn slices_map_the_tail_over_each_result() {
    let sstate = sstate();
    let tree = eval("[[1, 2], [3, 4], [5, 6]]");
    // Fetch element 0 of each of rows 0 and 2.
    let slice = make_tslice(&[eval("[0, 2]"), eval("0")]);
    let got = tree_fetch(&tree, &slice, &sstate, &AtSystem).expect("fetch");
    assert_value_eq(&got, &eval("[1, 5]"));
}

#[test]
fn amend_through_a_path_rewrites_the_spine_only() {
    let sstate = sstate();
    let tree = eval("{a: [1, 2], b: [3, 4]}");
    let index = make_tpath(&[Value::symbol(Symbol::new("a")), eval("1")]);
    let amended = tree_amend(&tree, &index, eval("99"), &sstate, &AtSystem).expect("amend");
    assert_value_eq(&amended, &eval("{a: [1, 99], b: [3, 4]}"));
    // The original is untouched: amendment is copy-on-write.
    assert_value_eq(&tree, &eval("{a: [1, 2], b: [3, 4]}"));
}

#[test]
fn amending_a_string_with_a_character_stays_a_string() {
    let sstate = sstate();
    let tree = eval("\"abc\"");
    let amended =
        tree_amend(&tree, &eval("1"), eval("char 66"), &sstate, &AtSystem).expect("amend");
    assert_eq!(curv::repr(&amended), "\"aBc\"");
    // A non-character element demotes the string to a general list.
    let demoted = tree_amend(&tree, &eval("1"), eval("7"), &sstate, &AtSystem).expect("amend");
    assert_eq!(curv::repr(&demoted), "[char 97,7,char 99]");
}

#[test]
fn the_identity_index_is_the_whole_tree() {
    let sstate = sstate();
    let tree = eval("[1, 2]");
    let tid = eval("tid");
    let got = tree_fetch(&tree, &tid, &sstate, &AtSystem).expect("fetch");
    assert_value_eq(&got, &tree);
    let replaced = tree_amend(&tree, &tid, eval("5"), &sstate, &AtSystem).expect("amend");
    assert_value_eq(&replaced, &eval("5"));
}

#[test]
fn index_values_are_first_class() {
    // tpath and tslice are ordinary values, constructible in the language.
    let got = eval("i = tpath [#a, 1]; {a: [10, 20]}@i");
    assert_value_eq(&got, &eval("20"));
}
