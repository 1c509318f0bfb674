use pp::{EmptyIncluder, Preprocessor};

fn run(src: &str) -> String {
    let mut pp = Preprocessor::new();
    let mut inc = EmptyIncluder;
    let res = pp.do_preprocess("/test", src, &mut inc, &[]);
    assert_eq!(res.error, "", "unexpected errors:\n{}", res.error);
    res.text
}

#[test]
fn object_macro_invokes_function_macro() {
    let src = "#define BAR Foo(2d)\n#define Foo(x) foo##x\nint BAR;\n";
    let expected = "\n\nint foo2d;\n";
    assert_eq!(run(src), expected);
}

#[test]
fn rescanning_expands_nested_macros() {
    let src = "#define WRAP(x) [x]\n#define INNER WRAP(7)\n#define OUTER WRAP(INNER)\nint v = OUTER;\n";
    let out = run(src);
    assert!(out.contains("[[7]]"), "got:\n{}", out);
}

#[test]
fn deep_recursion_is_bounded() {
    // each expansion feeds the next; the depth guard must cut it off
    // instead of hanging
    let src = "#define LOOP(x) LOOP(x x)\nint r = LOOP(a);\n";
    let out = run(src);
    assert!(out.contains("LOOP"), "got:\n{}", out);
}

#[test]
fn hidden_name_survives_inside_argument() {
    let src = "#define F(x) x\n#define G F(G)\nint r = G;\n";
    let out = run(src);
    assert!(out.contains("int r = G;"), "got:\n{}", out);
}

#[test]
fn multiline_function_macro_definition() {
    let src = "#define CHECK(expr) do { \\\n        if (!(expr)) { \\\n            abort(); \\\n        } \\\n    }\nCHECK(1);\n";
    let out = run(src);
    let squashed: String = out.chars().filter(|c| !c.is_whitespace()).collect();
    assert!(
        squashed.contains("do{if(!(1)){abort();}};"),
        "got:\n{}",
        out
    );
    assert_eq!(
        out.matches('\n').count(),
        src.matches('\n').count(),
        "line counts differ, got:\n{:?}",
        out
    );
}
