//! End-to-end behaviour of the public API: reader round trips, tail calls,
//! macros, quasiquote, arity, atoms, numbers and the error taxonomy.

use lispxp::ast::{kw, list, sym, val};
use lispxp::number::Number;
use lispxp::{
    EVAL_STACK_SIZE, Error, ParseErrorKind, Value, create_global_env, eval, eval_str, parse, pr_str,
};
use std::thread;

fn run(source: &str) -> Result<Value, Error> {
    eval_str(source, &create_global_env())
}

#[test]
fn printed_literals_read_back_unchanged() {
    let test_cases = vec![
        "0",
        "-17",
        "9223372036854775807",
        "0.5",
        "-2.0",
        "\"\"",
        "\"tab\\there\"",
        ":a-keyword",
        "()",
        "(1 2 3)",
        "(\"a\" (:b) [])",
        "[]",
        "[1 [2 [3]]]",
        "{:a [1 2] :b {:c nil}}",
        "#{:x :y}",
        "(fn [x] (* x x))",
    ];

    for text in test_cases {
        let (count, value) = parse(text).unwrap();
        assert_eq!(count, 1, "{text}");
        assert_eq!(pr_str(&value, true), text);
    }

    // Canonicalization is whitespace-insensitive
    let (_, value) = parse("(  1 ,2\n  [ 3 ] )").unwrap();
    assert_eq!(pr_str(&value, true), "(1 2 [3])");
}

#[test]
fn parse_reports_form_count() {
    assert_eq!(parse("").unwrap(), (0, Value::Nil));
    assert_eq!(parse("1 2 3").unwrap(), (3, val([1, 2, 3])));
}

#[test]
fn tail_recursion_runs_in_constant_stack() {
    let env = create_global_env();
    eval_str("(defn sum-to [n acc] (if (= n 0) acc (sum-to (- n 1) (+ acc n))))", &env).unwrap();
    assert_eq!(
        eval_str("(sum-to 100000 0)", &env).unwrap(),
        val(5_000_050_000_i64)
    );

    // Mutual recursion through the root frame is also trampolined
    eval_str("(defn ping [n] (if (= n 0) :ping (pong (- n 1))))", &env).unwrap();
    eval_str("(defn pong [n] (if (= n 0) :pong (ping (- n 1))))", &env).unwrap();
    assert_eq!(eval_str("(ping 100001)", &env).unwrap(), kw("pong"));

    // Loops through try, let* and the and/or macros
    eval_str(
        "(defn spin [n] (try (let* [m (- n 1)] (or (= m 0) (and true (spin m))))))",
        &env,
    )
    .unwrap();
    assert_eq!(eval_str("(spin 20000)", &env).unwrap(), val(true));
}

fn run_with_large_stack<F, T>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let handle = thread::Builder::new()
        .stack_size(EVAL_STACK_SIZE)
        .spawn(f)
        .expect("failed to spawn test thread with larger stack");
    handle.join().expect("test thread panicked")
}

#[test]
fn non_tail_recursion_hits_depth_limit_not_stack_overflow() {
    let message = run_with_large_stack(|| {
        run("(defn deep [n] (if (= n 0) 0 (+ 1 (deep (- n 1))))) (deep 100000)")
            .unwrap_err()
            .to_string()
    });
    assert!(message.contains("depth limit"), "{message}");
}

#[test]
fn non_tail_recursion_runs_hundreds_of_levels_deep() {
    let (length, depth) = run_with_large_stack(|| {
        let env = create_global_env();
        eval_str("(defn len [xs] (if (empty? xs) 0 (+ 1 (len (rest xs)))))", &env).unwrap();
        eval_str("(defn build [n acc] (if (= n 0) acc (build (- n 1) (cons n acc))))", &env).unwrap();
        let length = eval_str("(len (build 500 '()))", &env).unwrap();

        eval_str("(defn nest [n] (if (= n 0) 0 (+ 1 (nest (- n 1)))))", &env).unwrap();
        let depth = eval_str("(nest 1500)", &env).unwrap();
        (pr_str(&length, true), pr_str(&depth, true))
    });
    assert_eq!(length, "500");
    assert_eq!(depth, "1500");
}

#[test]
fn self_referencing_atom_prints() {
    let env = create_global_env();
    let atom = eval_str("(def a (atom nil)) (reset! a a)", &env).unwrap();
    assert_eq!(pr_str(&atom, true), "(atom (atom ...))");
    assert_eq!(eval_str("(pr-str a)", &env).unwrap(), val("(atom (atom ...))"));
    eval_str("(reset! a nil)", &env).unwrap();
}

#[test]
fn macroexpand_is_idempotent_on_expanded_forms() {
    let env = create_global_env();
    eval_str("(defmacro unless [c t] (list 'if c nil t))", &env).unwrap();

    for source in ["(macroexpand (unless a b))", "(macroexpand (cond a 1 b 2))", "(macroexpand (when x y))"] {
        let expanded = eval_str(source, &env).unwrap();
        let again = eval(&list([sym("macroexpand"), expanded.clone()]), &env).unwrap();
        assert_eq!(again, expanded, "{source}");
    }

    for source in ["(+ 1 2)", "x", "[1 2]", "(if a b c)"] {
        let form = lispxp::read_str(source).unwrap();
        let expanded = eval(&list([sym("macroexpand"), form.clone()]), &env).unwrap();
        assert_eq!(expanded, form, "{source} has no macro to expand");
    }
}

#[test]
fn syntax_quote_builds_lists() {
    assert_eq!(run("`(1 ~(+ 1 1) ~@(list 3 4))").unwrap(), val([1, 2, 3, 4]));
    assert_eq!(
        run("(let [xs '(b c)] `(a ~@xs d))").unwrap(),
        list([sym("a"), sym("b"), sym("c"), sym("d")])
    );
    assert_eq!(
        run("`[:v ~(* 2 3) ~@#{7}]").unwrap(),
        lispxp::ast::vector([kw("v"), val(6), val(7)])
    );
}

#[test]
fn lambda_arity_is_enforced() {
    let env = create_global_env();
    eval_str("(def f (fn [a b] (+ a b)))", &env).unwrap();
    eval_str("(def g (fn [a & rest] (count rest)))", &env).unwrap();

    for call in ["(f 1)", "(f 1 2 3)", "(g)"] {
        assert!(
            matches!(eval_str(call, &env), Err(Error::ArityError { .. })),
            "{call} should be an arity error"
        );
    }
    assert_eq!(eval_str("(f 1 2)", &env).unwrap(), val(3));
    assert_eq!(eval_str("(g 1)", &env).unwrap(), val(0));
    assert_eq!(eval_str("(g 1 2 3 4)", &env).unwrap(), val(3));

    let err = eval_str("(f 1)", &env).unwrap_err();
    assert_eq!(
        format!("{err}"),
        "ArityError: fn f: expected exactly 2 arguments, got 1"
    );
}

#[test]
fn atoms_have_identity_and_mutable_contents() {
    assert_eq!(run("(let [a (atom 1)] (swap! a + 10) (deref a))").unwrap(), val(11));

    let env = create_global_env();
    eval_str("(def a (atom 1)) (def b (atom 1))", &env).unwrap();
    assert_eq!(eval_str("(= a b)", &env).unwrap(), val(false));
    assert_eq!(eval_str("(= (deref a) (deref b))", &env).unwrap(), val(true));
    assert_eq!(eval_str("(= a a)", &env).unwrap(), val(true));

    eval_str("(def alias a) (reset! alias 5)", &env).unwrap();
    assert_eq!(eval_str("@a", &env).unwrap(), val(5));
}

#[test]
fn numbers_unify_integer_and_float() {
    let sum = run("(+ 1 2.0)").unwrap();
    assert!(matches!(sum, Value::Number(Number::Float(f)) if (f - 3.0).abs() < f64::EPSILON));
    assert_eq!(pr_str(&sum, true), "3.0");

    let sum = run("(+ 1 2)").unwrap();
    assert!(matches!(sum, Value::Number(Number::Int(3))));
    assert_eq!(pr_str(&sum, true), "3");

    assert!(matches!(run("(/ 1 0)"), Err(Error::ArithmeticError(_))));
    assert_eq!(run("(/ 7 2)").unwrap(), val(3));
    assert_eq!(run("(/ 7 2.0)").unwrap(), val(3.5));
}

#[test]
fn scenarios() {
    assert_eq!(run("(def x 5) (let [y 10] (+ x y))").unwrap(), val(15));
    assert_eq!(
        run("(defmacro unless [c t] (list 'if c nil t)) (unless false 42)").unwrap(),
        val(42)
    );
    assert_eq!(
        run("(try (throw \"boom\") (catch e (str \"caught:\" e)))").unwrap(),
        val("caught:boom")
    );
}

#[test]
fn error_taxonomy() {
    match run("(let [x 1]\n  (+ x 1.2.3))") {
        Err(Error::SyntaxError(e)) => {
            assert_eq!(e.kind, ParseErrorKind::MalformedNumber);
            assert_eq!((e.line, e.column), (2, 8));
        }
        other => panic!("expected syntax error, got {other:?}"),
    }
    assert!(matches!(
        run("(list 1 2"),
        Err(Error::SyntaxError(e)) if e.kind == ParseErrorKind::Incomplete && e.column == 1
    ));
    assert!(matches!(run("nope"), Err(Error::UnresolvedSymbol(name)) if name == "nope"));
    assert!(matches!(run("(hash-map 1)"), Err(Error::ArityError { got: 1, .. })));
    assert!(matches!(run("(let [a 1 b] a)"), Err(Error::ArityError { .. })));
    assert!(matches!(run("(get 1 2 3 4)"), Err(Error::ArityError { .. })));
    assert!(matches!(run("(+ 1 :a)"), Err(Error::TypeError(_))));
    assert!(matches!(run("(mod 5 0)"), Err(Error::ArithmeticError(_))));
    assert_eq!(run("(throw [1 2])").unwrap_err(), Error::Throw(lispxp::ast::vector([val(1), val(2)])));

    // Only thrown values are caught
    assert!(matches!(run("(try (nope) (catch e 1))"), Err(Error::UnresolvedSymbol(_))));
    assert_eq!(run("(try (throw :k) (catch e e))").unwrap(), kw("k"));
}
