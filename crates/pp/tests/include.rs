use pp::{Header, Includer, Preprocessor};

struct TestIncluder;

impl Includer for TestIncluder {
    fn require_header(&mut self, name: &str, _including_path: &str) -> Option<Header> {
        match name {
            "a.hpp" => Some(Header {
                content: "#pragma once\nint func_a();\n".to_string(),
                path: "/a.hpp".to_string(),
            }),
            "b.hpp" => Some(Header {
                content: "#ifndef B_HPP_\n#define B_HPP_\nint func_b();\n#endif\n".to_string(),
                path: "/b.hpp".to_string(),
            }),
            _ => None,
        }
    }
}

fn run(src: &str, options: &[&str]) -> (String, String, String) {
    let mut pp = Preprocessor::new();
    let mut inc = TestIncluder;
    let res = pp.do_preprocess("/test.cpp", src, &mut inc, options);
    (res.text, res.error, res.warning)
}

#[test]
fn include_with_line_markers() {
    let src = "\
#ifndef FOO
#include \"a.hpp\"
#endif
#include \"a.hpp\"
#include <a.hpp>
#define B <b.hpp>
#include B
#include \"b.hpp\"
int main() {
    return 0;
}
";
    let expected = concat!(
        "\n",
        "\n",
        "\n",
        "#line 1 \"/a.hpp\"\n",
        "\n",
        "int func_a();\n",
        "\n",
        "#line 5 \"/test.cpp\"\n",
        "\n",
        "\n",
        "#line 1 \"/b.hpp\"\n",
        "\n",
        "\n",
        "int func_b();\n",
        "\n",
        "\n",
        "#line 8 \"/test.cpp\"\n",
        "#line 1 \"/b.hpp\"\n",
        "\n",
        "\n",
        "\n",
        "\n",
        "\n",
        "#line 9 \"/test.cpp\"\n",
        "int main() {\n",
        "    return 0;\n",
        "}\n",
    );
    let (out, err, warn) = run(src, &["-DFOO=1"]);
    assert_eq!(err, "", "unexpected errors:\n{}", err);
    assert_eq!(warn, "", "unexpected warnings:\n{}", warn);
    assert_eq!(out, expected);
}

#[test]
fn has_include_probes_without_entering() {
    let src = "\
#if __has_include(\"a.hpp\")
#define FOO 1
#else
#define FOO 0
#endif
#if __has_include(\"c.hpp\")
#define BAR 1
#else
#define BAR 0
#endif
int main() {
    return FOO * BAR;
}
";
    let (out, err, _) = run(src, &[]);
    assert_eq!(err, "", "unexpected errors:\n{}", err);
    assert!(out.contains("return 1 * 0;"), "got:\n{}", out);
    // probing must not leave a trace in the output
    assert!(!out.contains("#line"), "got:\n{}", out);
    assert!(!out.contains("func_a"), "got:\n{}", out);
}

#[test]
fn pragma_once_admits_only_first_visit() {
    let src = "#include \"a.hpp\"\n#include \"a.hpp\"\nint x;\n";
    let (out, err, _) = run(src, &[]);
    assert_eq!(err, "", "unexpected errors:\n{}", err);
    assert_eq!(out.matches("func_a").count(), 1, "got:\n{}", out);
}

#[test]
fn guard_macro_admits_only_first_visit() {
    let src = "#include \"b.hpp\"\n#include \"b.hpp\"\nint x;\n";
    let (out, err, _) = run(src, &[]);
    assert_eq!(err, "", "unexpected errors:\n{}", err);
    assert_eq!(out.matches("func_b").count(), 1, "got:\n{}", out);
}

#[test]
fn missing_header_warns_and_continues() {
    let src = "#include \"nope.hpp\"\nint x;\n";
    let (out, err, warn) = run(src, &[]);
    assert_eq!(err, "", "unexpected errors:\n{}", err);
    assert!(
        warn.contains("warning: ") && warn.contains("nope.hpp"),
        "got:\n{}",
        warn
    );
    assert!(out.contains("int x;"), "got:\n{}", out);
}

#[test]
fn include_cycle_is_detected() {
    struct Cyclic;
    impl Includer for Cyclic {
        fn require_header(&mut self, name: &str, _including: &str) -> Option<Header> {
            match name {
                "x.hpp" => Some(Header {
                    content: "#include \"y.hpp\"\n".to_string(),
                    path: "/x.hpp".to_string(),
                }),
                "y.hpp" => Some(Header {
                    content: "#include \"x.hpp\"\n".to_string(),
                    path: "/y.hpp".to_string(),
                }),
                _ => None,
            }
        }
    }
    let mut pp = Preprocessor::new();
    let mut inc = Cyclic;
    let res = pp.do_preprocess("/test.cpp", "#include \"x.hpp\"\n", &mut inc, &[]);
    assert!(
        res.error.to_lowercase().contains("cycle"),
        "expected include-cycle error, got:\n{}",
        res.error
    );
}

#[test]
fn includer_clear_runs_once_per_pass() {
    struct Counting {
        cleared: usize,
    }
    impl Includer for Counting {
        fn require_header(&mut self, _n: &str, _i: &str) -> Option<Header> {
            None
        }
        fn clear(&mut self) {
            self.cleared += 1;
        }
    }
    let mut pp = Preprocessor::new();
    let mut inc = Counting { cleared: 0 };
    pp.do_preprocess("/test.cpp", "int x;\n", &mut inc, &[]);
    pp.do_preprocess("/test.cpp", "int y;\n", &mut inc, &[]);
    assert_eq!(inc.cleared, 2);
}
