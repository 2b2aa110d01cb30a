//! Tests for the filter expression language

use super::*;
use serde_json::json;

fn compiled(src: &str) -> Predicate {
    Predicate::compile(src).unwrap()
}

fn eval(src: &str, msg: &Value) -> bool {
    compiled(src).eval(msg).unwrap()
}

// =============================================================================
// Compile Errors
// =============================================================================

#[test]
fn test_compile_empty_expression() {
    assert!(matches!(
        Predicate::compile(""),
        Err(ExprError::UnexpectedEnd)
    ));
}

#[test]
fn test_compile_unknown_identifier() {
    assert!(matches!(
        Predicate::compile("foo == 1"),
        Err(ExprError::UnknownIdent(name)) if name == "foo"
    ));
}

#[test]
fn test_compile_unterminated_string() {
    assert!(matches!(
        Predicate::compile("msg.a == 'oops"),
        Err(ExprError::UnterminatedString)
    ));
}

#[test]
fn test_compile_unexpected_character() {
    assert!(matches!(
        Predicate::compile("msg @ 1"),
        Err(ExprError::UnexpectedChar('@', _))
    ));
}

#[test]
fn test_compile_dangling_operator() {
    assert!(matches!(
        Predicate::compile("msg.a !="),
        Err(ExprError::UnexpectedEnd)
    ));
}

#[test]
fn test_compile_dangling_dot() {
    assert!(matches!(
        Predicate::compile("msg."),
        Err(ExprError::UnexpectedEnd)
    ));
}

#[test]
fn test_compile_trailing_input() {
    assert!(matches!(
        Predicate::compile("msg.a msg.b"),
        Err(ExprError::TrailingInput(_))
    ));
}

#[test]
fn test_compile_comparisons_do_not_chain() {
    assert!(matches!(
        Predicate::compile("msg.a < msg.b < msg.c"),
        Err(ExprError::TrailingInput(tok)) if tok == "<"
    ));
}

#[test]
fn test_compile_unbalanced_paren() {
    assert!(matches!(
        Predicate::compile("(msg.a == 1"),
        Err(ExprError::UnexpectedEnd)
    ));
}

#[test]
fn test_compile_keeps_source_text() {
    let p = compiled("msg.a == 1");
    assert_eq!(p.source(), "msg.a == 1");
}

// =============================================================================
// Truthiness
// =============================================================================

#[test]
fn test_truthy_message_root() {
    assert!(eval("msg", &json!({"a": 1})));
    assert!(eval("msg", &json!({})));
}

#[test]
fn test_falsy_scalars() {
    let msg = json!({"zero": 0, "empty": "", "f": false, "n": null});
    assert!(!eval("msg.zero", &msg));
    assert!(!eval("msg.empty", &msg));
    assert!(!eval("msg.f", &msg));
    assert!(!eval("msg.n", &msg));
    assert!(!eval("msg.absent", &msg));
}

#[test]
fn test_truthy_scalars() {
    let msg = json!({"one": 1, "neg": -1, "s": "x", "t": true, "arr": [], "obj": {}});
    assert!(eval("msg.one", &msg));
    assert!(eval("msg.neg", &msg));
    assert!(eval("msg.s", &msg));
    assert!(eval("msg.t", &msg));
    assert!(eval("msg.arr", &msg));
    assert!(eval("msg.obj", &msg));
}

#[test]
fn test_not_negates_truthiness() {
    let msg = json!({"flag": false});
    assert!(eval("!msg.flag", &msg));
    assert!(!eval("!!msg.flag", &msg));
}

// =============================================================================
// Paths
// =============================================================================

#[test]
fn test_path_nested_fields() {
    let msg = json!({"a": {"b": {"c": 42}}});
    assert!(eval("msg.a.b.c == 42", &msg));
}

#[test]
fn test_path_bracket_string_key() {
    let msg = json!({"my key": 1});
    assert!(eval("msg[\"my key\"] == 1", &msg));
}

#[test]
fn test_path_array_index() {
    let msg = json!({"list": ["a", "b"]});
    assert!(eval("msg.list[1] == 'b'", &msg));
}

#[test]
fn test_path_index_past_end_is_missing() {
    let msg = json!({"list": ["a"]});
    assert!(!eval("msg.list[5]", &msg));
}

#[test]
fn test_path_keyword_shaped_field() {
    let msg = json!({"null": 7});
    assert!(eval("msg.null == 7", &msg));
}

// =============================================================================
// Equality
// =============================================================================

#[test]
fn test_eq_strings() {
    let msg = json!({"ca_subtype": "ping"});
    assert!(eval("msg.ca_subtype == \"ping\"", &msg));
    assert!(!eval("msg.ca_subtype != \"ping\"", &msg));
}

#[test]
fn test_eq_integer_vs_float_representation() {
    let msg = json!({"n": 1});
    assert!(eval("msg.n == 1.0", &msg));
}

#[test]
fn test_eq_null_literal() {
    let msg = json!({"v": null});
    assert!(eval("msg.v == null", &msg));
}

#[test]
fn test_eq_missing_is_not_null() {
    let msg = json!({});
    assert!(!eval("msg.absent == null", &msg));
    assert!(eval("msg.absent != null", &msg));
}

#[test]
fn test_eq_missing_differs_from_everything_else() {
    let msg = json!({"here": 1});
    assert!(eval("msg.absent != \"ping\"", &msg));
    assert!(eval("msg.absent != 0", &msg));
}

#[test]
fn test_eq_deep_structures() {
    let msg = json!({"a": [1, {"x": 2}], "b": [1, {"x": 2}], "c": [1, {"x": 3}]});
    assert!(eval("msg.a == msg.b", &msg));
    assert!(eval("msg.a != msg.c", &msg));
}

#[test]
fn test_eq_booleans() {
    let msg = json!({"flag": true});
    assert!(eval("msg.flag == true", &msg));
    assert!(!eval("msg.flag == false", &msg));
}

#[test]
fn test_eq_cross_type_is_false() {
    let msg = json!({"n": 1});
    assert!(!eval("msg.n == \"1\"", &msg));
    assert!(!eval("msg.n == true", &msg));
}

// =============================================================================
// Ordering
// =============================================================================

#[test]
fn test_ordering_numbers() {
    let msg = json!({"n": 5});
    assert!(eval("msg.n > 2", &msg));
    assert!(eval("msg.n >= 5", &msg));
    assert!(eval("msg.n < 10", &msg));
    assert!(eval("msg.n <= 5", &msg));
    assert!(!eval("msg.n < 5", &msg));
}

#[test]
fn test_ordering_negative_and_scientific_literals() {
    let msg = json!({"t": -5, "big": 2000});
    assert!(eval("msg.t == -5", &msg));
    assert!(eval("msg.big > 1e3", &msg));
}

#[test]
fn test_ordering_strings() {
    let msg = json!({"s": "apple"});
    assert!(eval("msg.s < \"banana\"", &msg));
    assert!(eval("msg.s >= \"apple\"", &msg));
}

#[test]
fn test_ordering_mixed_types_faults() {
    let msg = json!({"s": "apple"});
    let p = compiled("msg.s < 3");
    assert!(matches!(
        p.eval(&msg),
        Err(EvalFault::Uncomparable { op: "<", .. })
    ));
}

// =============================================================================
// Logic
// =============================================================================

#[test]
fn test_and_or_parens() {
    let msg = json!({"a": 1, "b": 0, "c": 1});
    assert!(eval("(msg.a == 1 || msg.b == 1) && msg.c == 1", &msg));
    assert!(!eval("msg.a == 1 && msg.b == 1", &msg));
}

#[test]
fn test_or_short_circuits_past_faulting_operand() {
    // msg.x.y would fault, but the left side already decides the result
    let msg = json!({"a": 1});
    assert!(eval("msg.a == 1 || msg.x.y", &msg));
}

#[test]
fn test_and_short_circuits_past_faulting_operand() {
    let msg = json!({"a": 1});
    assert!(!eval("msg.a == 2 && msg.x.y", &msg));
}

// =============================================================================
// Evaluation Faults
// =============================================================================

#[test]
fn test_fault_field_of_missing() {
    let msg = json!({"here": 1});
    let p = compiled("msg.x.y");
    assert!(matches!(
        p.eval(&msg),
        Err(EvalFault::FieldAccess { field, of: "missing" }) if field == "y"
    ));
}

#[test]
fn test_fault_field_of_scalar() {
    let msg = json!({"a": 5});
    let p = compiled("msg.a.b");
    assert!(matches!(
        p.eval(&msg),
        Err(EvalFault::FieldAccess { of: "number", .. })
    ));
}

#[test]
fn test_fault_field_of_null() {
    let msg = json!({"a": null});
    let p = compiled("msg.a.b");
    assert!(matches!(
        p.eval(&msg),
        Err(EvalFault::FieldAccess { of: "null", .. })
    ));
}

#[test]
fn test_fault_index_of_non_array() {
    let msg = json!({"a": "text"});
    let p = compiled("msg.a[0]");
    assert!(matches!(
        p.eval(&msg),
        Err(EvalFault::IndexAccess { index: 0, of: "string" })
    ));
}

#[test]
fn test_fault_index_through_missing() {
    let msg = json!({});
    let p = compiled("msg.nope[0]");
    assert!(matches!(
        p.eval(&msg),
        Err(EvalFault::IndexAccess { of: "missing", .. })
    ));
}

#[test]
fn test_shallow_missing_field_does_not_fault() {
    let msg = json!({});
    assert!(!eval("msg.x", &msg));
}

// =============================================================================
// String Literals
// =============================================================================

#[test]
fn test_string_quote_styles_and_escapes() {
    let msg = json!({"s": "it's"});
    assert!(eval("msg.s == 'it\\'s'", &msg));
    assert!(eval("msg.s == \"it's\"", &msg));
}

#[test]
fn test_string_escape_sequences() {
    let msg = json!({"s": "a\nb"});
    assert!(eval("msg.s == 'a\\nb'", &msg));
}

// =============================================================================
// Reuse
// =============================================================================

#[test]
fn test_predicate_is_reusable_across_messages() {
    let p = compiled("msg.ca_subtype != \"ping\"");
    assert!(!p.eval(&json!({"ca_subtype": "ping"})).unwrap());
    assert!(p.eval(&json!({"ca_subtype": "alert"})).unwrap());
    assert!(!p.eval(&json!({"ca_subtype": "ping"})).unwrap());
}
