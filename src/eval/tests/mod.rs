use std::{cell::RefCell, rc::Rc, sync::atomic::Ordering};

use expect_test::{expect, Expect};
use proptest::prelude::*;

use super::*;
use crate::{console::ScriptedConsole, value::Scalar};

type Output = Rc<RefCell<Vec<String>>>;

fn interp_with(settings: Settings, input: &[&str]) -> (Interpreter, Output) {
    let (console, output) = ScriptedConsole::new(input.iter().copied());
    (Interpreter::new(settings, Box::new(console)), output)
}

fn interp() -> (Interpreter, Output) {
    interp_with(Settings::default(), &[])
}

fn define(interp: &mut Interpreter, text: &str) {
    interp.define_function(text).unwrap();
}

/// The displayed result of a line, or the error code it failed with.
fn eval(interp: &mut Interpreter, line: &str) -> String {
    match interp.execute_line(line) {
        Ok(Some(v)) => format_value(&v, interp.settings().print_precision),
        Ok(None) => String::new(),
        Err(e) => e.code().to_string(),
    }
}

fn check(line: &str, expected: Expect) {
    let (mut interp, _) = interp();
    expected.assert_eq(&eval(&mut interp, line));
}

fn code_of(result: Result<Option<Value>, ApplError>) -> ErrorCode {
    result.map(|_| ()).unwrap_err().code()
}

fn apl_int(i: i64) -> String {
    if i < 0 {
        format!("¯{}", i.unsigned_abs())
    } else {
        i.to_string()
    }
}

const PLUS: &str = "∇Z←A PLUS B\nZ←A+B\n∇";
const MINUS: &str = "∇Z←A MINUS B\nZ←A-B\n∇";
const COUNT: &str = "∇Z←COUNT N\nZ←0\nLOOP:Z←Z+1 ◊ →(Z<N)/LOOP\n∇";

#[test]
fn right_to_left() {
    check("2×3+4", expect!["14"]);
    check("10-4-1", expect!["7"]);
    check("+/⍳10", expect!["55"]);
    check("2 3⍴⍳6", expect![[r#"
        1 2 3
        4 5 6"#]]);
    check("(2×3)+4", expect!["10"]);
    check("", expect![""]);
}

#[test]
fn user_functions_have_uniform_precedence() {
    let (mut interp, _) = interp();
    define(&mut interp, PLUS);
    assert_eq!(eval(&mut interp, "2×3 PLUS 4"), "14");
    assert_eq!(eval(&mut interp, "2 PLUS 3×4"), "14");
    assert_eq!(eval(&mut interp, "(2 PLUS 3)×4"), "20");
}

#[test]
fn immediate_printing() {
    let (mut interp, output) = interp();
    interp.execute_line("A←3 ◊ A+1 ◊ ⎕←'hi' ◊ A×2").unwrap();
    assert_eq!(*output.borrow(), vec!["4", "hi", "6"]);
}

#[test]
fn parentheses_print_an_assigned_value() {
    let (mut interp, output) = interp();
    interp.execute_line("(B←5) ◊ C←(D←7) ◊ 1+E←2 ◊ C←D←8").unwrap();
    assert_eq!(*output.borrow(), vec!["5", "3"]);
    assert_eq!(eval(&mut interp, "B C D E"), "5 8 8 2");
}

#[test]
fn index_and_axis() {
    let (mut interp, _) = interp();
    define(&mut interp, PLUS);
    assert_eq!(eval(&mut interp, "A←10 20 30 ◊ A[2]"), "20");
    assert_eq!(eval(&mut interp, "A[3 1]"), "30 10");
    assert_eq!(eval(&mut interp, "A[2]←7 ◊ A"), "10 7 30");
    assert_eq!(eval(&mut interp, "⌽[1] 2 2⍴⍳4"), "3 4\n1 2");
    assert_eq!(eval(&mut interp, "⌽[2] 2 2⍴⍳4"), "2 1\n4 3");
    // a function name followed by brackets is an axis, not an index
    assert_eq!(eval(&mut interp, "1 PLUS[1] 2"), "AXIS ERROR");
    assert_eq!(eval(&mut interp, "A[4]"), "INDEX ERROR");
}

#[test]
fn reverse_vectors() {
    check("⌽1 2 3", expect!["3 2 1"]);
    check("⌽1 2 3 4", expect!["4 3 2 1"]);
    check("⌽,7", expect!["7"]);
    let (mut interp, _) = interp();
    assert_eq!(eval(&mut interp, "⌽⍳0"), "");
    assert!(interp.contexts().is_empty());
    assert_eq!(eval(&mut interp, "1+1"), "2");
}

#[test]
fn brackets_follow_the_binding() {
    const LINE: &str = "X[1] 5";
    let (mut interp, _) = interp();
    interp.execute_line("X←7 8 9").unwrap();
    assert_eq!(eval(&mut interp, LINE), "7 5");

    assert!(interp.erase("X"));
    define(&mut interp, "∇Z←X B\nZ←B\n∇");
    // the same line is now an axis on a user function
    assert_eq!(eval(&mut interp, LINE), "AXIS ERROR");
    assert_eq!(eval(&mut interp, "X 5"), "5");
}

#[test]
fn closed_groups_feed_derived_functions() {
    let (mut interp, _) = interp();
    define(&mut interp, PLUS);
    assert_eq!(eval(&mut interp, "(1 2)+.×3 4"), "11");
    assert_eq!(eval(&mut interp, "1 2+.×3 4"), "11");
    assert_eq!(eval(&mut interp, "(1 2)∘.×3 4"), "3 4\n6 8");
    assert_eq!(eval(&mut interp, "(1 2) PLUS¨3 4"), "4 6");
    assert_eq!(eval(&mut interp, "A←1 2 ◊ A[1 2]+.×3 4"), "11");
    assert_eq!(eval(&mut interp, "(1 2)+3 4"), "4 6");
    // a group left of a function still makes it dyadic
    assert_eq!(eval(&mut interp, "(2)-3"), "¯1");
    assert_eq!(eval(&mut interp, "A[2]-3"), "¯1");
}

#[test]
fn window_overflow_is_a_system_limit() {
    let deep = format!("{}1{}", "(".repeat(20), ")".repeat(20));
    check(&deep, expect!["SYSTEM LIMIT"]);
    check("((((1))))+1", expect!["2"]);
}

#[test]
fn recursion_depth_is_a_system_limit() {
    let settings = Settings {
        max_depth: 5,
        ..Settings::default()
    };
    let (mut interp, _) = interp_with(settings, &[]);
    define(&mut interp, "∇Z←R N\nZ←R N\n∇");
    assert_eq!(code_of(interp.execute_line("R 1")), ErrorCode::SystemLimit);
    assert!(interp.contexts().is_empty());
    // the workspace is still usable afterwards
    assert_eq!(eval(&mut interp, "1+1"), "2");
}

#[test]
fn reduce_with_user_functions() {
    let (mut interp, _) = interp();
    define(&mut interp, PLUS);
    define(&mut interp, MINUS);
    assert_eq!(eval(&mut interp, "PLUS/1 2 3 4"), "10");
    // folds from the right: 1-(2-3)
    assert_eq!(eval(&mut interp, "MINUS/1 2 3"), "2");
    assert_eq!(eval(&mut interp, "PLUS/,5"), "5");
    assert_eq!(eval(&mut interp, "PLUS/⍳0"), "DOMAIN ERROR");
    assert_eq!(eval(&mut interp, "+/⍳0"), "0");
    assert_eq!(interp.continuations().pending_count(), 0);
}

#[test]
fn each_with_user_functions() {
    let (mut interp, _) = interp();
    define(&mut interp, "∇Z←INC B\nZ←B+1\n∇");
    assert_eq!(eval(&mut interp, "INC¨1 2 3"), "2 3 4");
    assert_eq!(eval(&mut interp, "+/INC¨⍳4"), "14");
}

const TIMES: &str = "∇Z←A TIMES B\nZ←A×B\n∇";
const INC: &str = "∇Z←INC B\nZ←B+1\n∇";
const REV: &str = "∇Z←REV B\nZ←⌽B\n∇";
const HALF: &str = "∇Z←HALF B\nZ←⌊B÷2\n∇";
const SAME: &str = "∇Z←A SAME B\nZ←A=B\n∇";

fn operator_workspace() -> Interpreter {
    let (mut interp, _) = interp();
    for f in [PLUS, TIMES, INC, REV, HALF, SAME] {
        define(&mut interp, f);
    }
    interp
}

/// Evaluates both lines and checks they agree; returns the shared display.
fn agree(interp: &mut Interpreter, user: &str, primitive: &str) -> String {
    let expected = eval(interp, primitive);
    assert_eq!(eval(interp, user), expected, "{user} vs {primitive}");
    assert_eq!(interp.continuations().pending_count(), 0);
    assert!(interp.contexts().is_empty());
    expected
}

#[test]
fn outer_product_with_user_functions() {
    let mut interp = operator_workspace();
    expect![[r#"
        4  5
        8 10
       12 15"#]]
    .assert_eq(&agree(&mut interp, "1 2 3∘.TIMES 4 5", "1 2 3∘.×4 5"));
    assert_eq!(agree(&mut interp, "(,2)∘.TIMES 3", "(,2)∘.×3"), "6");
    assert_eq!(agree(&mut interp, "(⍳0)∘.TIMES 4 5", "(⍳0)∘.×4 5"), "");
    assert_eq!(eval(&mut interp, "⍴(⍳0)∘.TIMES 4 5"), "0 2");
}

#[test]
fn inner_product_with_user_functions() {
    let mut interp = operator_workspace();
    assert_eq!(agree(&mut interp, "1 2 3 PLUS.TIMES 4 5 6", "1 2 3+.×4 5 6"), "32");
    assert_eq!(
        agree(&mut interp, "(2 2⍴⍳4) PLUS.TIMES 2 2⍴⍳4", "(2 2⍴⍳4)+.×2 2⍴⍳4"),
        " 7 10\n15 22"
    );
    assert_eq!(agree(&mut interp, "(,2) PLUS.TIMES ,5", "(,2)+.×,5"), "10");
    // a user reduction has no identity for empty rows
    assert_eq!(eval(&mut interp, "(⍳0)+.×⍳0"), "0");
    assert_eq!(eval(&mut interp, "(⍳0) PLUS.TIMES ⍳0"), "DOMAIN ERROR");
    assert_eq!(agree(&mut interp, "(⍳0)+.TIMES ⍳0", "(⍳0)+.×⍳0"), "0");
}

#[test]
fn rank_with_user_functions() {
    let mut interp = operator_workspace();
    interp.execute_line("M←2 3⍴⍳6").unwrap();
    assert_eq!(agree(&mut interp, "REV⍤1 M", "⌽⍤1 M"), "3 2 1\n6 5 4");
    assert_eq!(agree(&mut interp, "REV⍤0 M", "⌽⍤0 M"), "1 2 3\n4 5 6");
    assert_eq!(agree(&mut interp, "(10 20) PLUS⍤0 (1 2)", "(10 20)+⍤0 (1 2)"), "11 22");
    assert_eq!(agree(&mut interp, "REV⍤1 (1 3⍴⍳3)", "⌽⍤1 (1 3⍴⍳3)"), "3 2 1");
    agree(&mut interp, "REV⍤1 (0 3⍴0)", "⌽⍤1 (0 3⍴0)");
}

#[test]
fn power_with_user_functions() {
    let mut interp = operator_workspace();
    assert_eq!(agree(&mut interp, "(INC⍣3) 5", "INC INC INC 5"), "8");
    assert_eq!(agree(&mut interp, "(INC⍣1) 5", "5+1"), "6");
    assert_eq!(agree(&mut interp, "(INC⍣0) 5", "5"), "5");
    assert_eq!(agree(&mut interp, "2 (PLUS⍣3) 1", "2 (+⍣3) 1"), "7");
    // until the test function says two successive values agree
    assert_eq!(agree(&mut interp, "(HALF⍣=) 100", "(HALF⍣SAME) 100"), "0");
    assert_eq!(agree(&mut interp, "(⌊⍣SAME) 2.5", "(⌊⍣=) 2.5"), "2");
    assert_eq!(eval(&mut interp, "(INC⍣¯1) 5"), "DOMAIN ERROR");
}

#[test]
fn branches_and_labels() {
    let (mut interp, _) = interp();
    define(&mut interp, COUNT);
    assert_eq!(eval(&mut interp, "COUNT 5"), "5");
    assert_eq!(eval(&mut interp, "COUNT 1"), "1");
    define(&mut interp, "∇Z←EARLY B\nZ←B\n→0\nZ←0\n∇");
    assert_eq!(eval(&mut interp, "EARLY 9"), "9");
}

#[test]
fn execute_and_input() {
    let (mut interp, _) = interp_with(Settings::default(), &["2+3", "hello"]);
    assert_eq!(eval(&mut interp, "⍎'1+2'"), "3");
    assert_eq!(eval(&mut interp, "X←⎕ ◊ X×2"), "10");
    assert_eq!(eval(&mut interp, "Y←⍞ ◊ ⍴Y"), "5");
    assert_eq!(eval(&mut interp, "⍎'1÷0'"), "DOMAIN ERROR");
    assert!(interp.contexts().is_empty());
}

#[test]
fn index_origin() {
    let (mut interp, _) = interp();
    assert_eq!(eval(&mut interp, "⍳3"), "1 2 3");
    assert_eq!(eval(&mut interp, "⎕IO←0 ◊ ⍳3"), "0 1 2");
    assert_eq!(interp.index_origin(), 0);
    assert_eq!(eval(&mut interp, "⎕IO←2"), "DOMAIN ERROR");
}

#[test]
fn unbound_names() {
    let (mut interp, _) = interp();
    let err = interp.execute_line("1+NOPE").unwrap_err();
    assert_eq!(err.code(), ErrorCode::Value);
    assert_eq!(err.detail.as_deref(), Some("NOPE"));
}

#[test]
fn failed_statement_rolls_back_to_its_start() {
    let (mut interp, _) = interp();
    let err = interp.execute_line("A←1 ◊ B←÷Q ◊ C←3").unwrap_err();
    assert_eq!(err.code(), ErrorCode::Value);
    assert!(interp.variable("A").is_some());
    assert!(interp.variable("B").is_none());
    assert!(interp.variable("C").is_none());
    let Some(RetryPoint::Statement { start, .. }) =
        interp.last_failure().and_then(|f| f.retry.clone())
    else {
        panic!("expected a statement retry point");
    };
    assert_eq!(start, 4);

    // retrying before the cause is fixed fails the same way
    assert_eq!(code_of(interp.retry_last()), ErrorCode::Value);
    assert!(interp.contexts().is_empty());

    interp.execute_line("Q←4 ◊ A←100").unwrap();
    interp.retry_last().unwrap();
    assert_eq!(eval(&mut interp, "B C A"), "0.25 3 100");
    // the same statement again, from the same place
    interp.execute_line("C←0").unwrap();
    interp.retry_last().unwrap();
    assert_eq!(eval(&mut interp, "B C A"), "0.25 3 100");
}

#[test]
fn failed_call_retries_the_function() {
    let (mut interp, output) = interp();
    define(&mut interp, "∇Z←F X\nZ←X+Y\n∇");
    assert_eq!(code_of(interp.execute_line("1+F 1")), ErrorCode::Value);
    expect![[r#"
        VALUE ERROR
        F[1]
        ⋆"#]]
    .assert_eq(&interp.si_report().join("\n"));
    interp.execute_line("Y←10").unwrap();
    let value = interp.retry_last().unwrap().unwrap();
    assert_eq!(value.first(), Scalar::Int(11));
    assert_eq!(output.borrow().last().map(String::as_str), Some("11"));
    // twice gives the same answer
    let again = interp.retry_last().unwrap().unwrap();
    assert!(again.matches(&value));
}

#[test]
fn nothing_to_retry() {
    let (mut interp, _) = interp();
    assert_eq!(code_of(interp.retry_last()), ErrorCode::Value);
    interp.execute_line("÷0").unwrap_err();
    interp.reset();
    assert!(interp.last_failure().is_none());
    assert_eq!(code_of(interp.retry_last()), ErrorCode::Value);
}

#[test]
fn attention_interrupts_once() {
    let (mut interp, _) = interp();
    define(&mut interp, COUNT);
    let attention = interp.attention();
    attention.store(true, Ordering::Relaxed);
    assert_eq!(code_of(interp.execute_line("COUNT 1000")), ErrorCode::Interrupt);
    assert!(!attention.load(Ordering::Relaxed));
    assert!(interp.contexts().is_empty());
    assert_eq!(eval(&mut interp, "COUNT 3"), "3");
}

#[test]
fn locals_are_restored() {
    let (mut interp, _) = interp();
    define(&mut interp, "∇Z←G B;T\nT←B×2\nZ←T+1\n∇");
    interp.execute_line("T←'outer'").unwrap();
    assert_eq!(eval(&mut interp, "G 4"), "9");
    assert_eq!(eval(&mut interp, "T"), "outer");
}

#[test]
fn every_live_value_is_reachable() {
    let (mut interp, _) = interp();
    define(&mut interp, PLUS);
    define(&mut interp, COUNT);
    for line in [
        "A←⍳5",
        "B←A PLUS 10",
        "C←(⊂1 2),⊂'xy'",
        "PLUS/A",
        "COUNT 4",
        "D←÷0",
        "A←'replaced'",
    ] {
        drop(interp.execute_line(line));
    }
    interp.sweep();
    let reachable = interp.reachable_values();
    let live = interp.values().live_serials();
    assert_eq!(live.len(), reachable.len());
    assert!(live.iter().all(|s| reachable.contains(s)));
    assert_eq!(interp.values().stale_count(), 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_user_reduce_matches_primitive(v in prop::collection::vec(-50i64..50, 2..8)) {
        let (mut interp, _) = interp();
        define(&mut interp, PLUS);
        define(&mut interp, MINUS);
        let literal = v.iter().copied().map(apl_int).collect::<Vec<_>>().join(" ");
        prop_assert_eq!(
            eval(&mut interp, &format!("PLUS/{literal}")),
            eval(&mut interp, &format!("+/{literal}"))
        );
        prop_assert_eq!(
            eval(&mut interp, &format!("MINUS/{literal}")),
            eval(&mut interp, &format!("-/{literal}"))
        );
        prop_assert_eq!(interp.continuations().pending_count(), 0);
    }

    #[test]
    fn prop_sum_of_iota(n in 0i64..200) {
        let (mut interp, _) = interp();
        prop_assert_eq!(eval(&mut interp, &format!("+/⍳{n}")), (n * (n + 1) / 2).to_string());
    }
}
