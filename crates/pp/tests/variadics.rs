use pp::{EmptyIncluder, Preprocessor};

fn run_with(src: &str, options: &[&str]) -> String {
    let mut pp = Preprocessor::new();
    let mut inc = EmptyIncluder;
    let res = pp.do_preprocess("/test", src, &mut inc, options);
    assert_eq!(res.error, "", "unexpected errors:\n{}", res.error);
    res.text
}

fn run(src: &str) -> String {
    run_with(src, &[])
}

#[test]
fn stringified_va_args_joins_with_comma() {
    let src = "#define FOO(...) #__VA_ARGS__;\nFOO(a)\nFOO(a,  b)\nFOO(a,  b, \"\\n\")\n";
    let expected = "\n\"a\";\n\"a, b\";\n\"a, b, \\\"\\\\n\\\"\";\n";
    assert_eq!(run(src), expected);
}

#[test]
fn va_opt_drops_when_empty() {
    let src = "#define FOO(sname, ...) sname foo __VA_OPT__({__VA_ARGS__});\nFOO(Foo)\nFOO(Foo, )\nFOO(Foo, a, b, c)\n";
    let expected = "\nFoo foo ;\nFoo foo ;\nFoo foo {a, b, c};\n";
    assert_eq!(run(src), expected);
}

#[test]
fn va_args_pastes_raw() {
    let src = "#define BAR(...) __VA_ARGS__ ## OO\nBAR();\nBAR(,);\nBAR(a, b);\nBAR(a, F);\n";
    let expected = "\nOO;\n, OO;\na, bOO;\na, 123;\n";
    assert_eq!(run_with(src, &["-D", "FOO=123"]), expected);
}

#[test]
fn va_args_splices_expanded() {
    let src = "#define ONE 1\n#define LIST(head, ...) head, __VA_ARGS__\nint v[] = {LIST(0, ONE, 2)};\n";
    let out = run(src);
    assert!(out.contains("{0, 1, 2}"), "got:\n{}", out);
}

#[test]
fn variadic_requires_fixed_arguments() {
    let mut pp = Preprocessor::new();
    let mut inc = EmptyIncluder;
    let src = "#define AT_LEAST(a, b, ...) a b\nAT_LEAST(1);\n";
    let res = pp.do_preprocess("/test", src, &mut inc, &[]);
    assert!(res.error.contains("at least 2"), "got:\n{}", res.error);
}

#[test]
fn va_args_outside_variadic_is_fatal() {
    let mut pp = Preprocessor::new();
    let mut inc = EmptyIncluder;
    let src = "#define PLAIN(a) __VA_ARGS__\nPLAIN(1);\n";
    let res = pp.do_preprocess("/test", src, &mut inc, &[]);
    assert!(
        res.error.contains("outside a variadic macro"),
        "got:\n{}",
        res.error
    );
}

#[test]
fn dots_must_be_last_parameter() {
    let mut pp = Preprocessor::new();
    let mut inc = EmptyIncluder;
    let src = "#define BAD(..., x) x\nBAD(1, 2);\n";
    let res = pp.do_preprocess("/test", src, &mut inc, &[]);
    assert!(
        res.error.contains("'...' must be the last macro parameter"),
        "got:\n{}",
        res.error
    );
}
