#![cfg(test)]
#![allow(missing_docs)]

use rstest::rstest;
use std::{fs, path::PathBuf};
use tmpl_frontend::Program;

/// Resolve every alias named `name`, in source order.
fn resolve_aliases(program: &Program, name: &str) -> Vec<String> {
    program
        .find_alias(name)
        .into_iter()
        .map(|alias| program.render(&tmpl_resolve::resolve(program, &alias.item.r#type)))
        .collect()
}

fn resolve_code(code: &str) -> String {
    let result = tmpl_frontend::parse("test.cpp", code);
    assert!(result.diagnostics.is_empty(), "{:#?}", result.diagnostics);

    let mut resolved = resolve_aliases(&result.program, "result");
    assert_eq!(resolved.len(), 1, "expected one alias named `result`");
    assert!(result.program.instantiation_stack().is_empty());

    resolved.remove(0)
}

#[rstest]
fn fixtures(#[files("tests/**/*.cpp")] file: PathBuf) {
    let code = fs::read_to_string(&file).expect("failed to read file");

    let expected = code
        .lines()
        .next()
        .and_then(|line| line.strip_prefix("// expect: "))
        .unwrap_or_else(|| panic!("expected test to begin with `// expect: <type>`"));

    let result = tmpl_frontend::parse(&file.to_string_lossy(), &code);
    assert!(result.diagnostics.is_empty(), "{:#?}", result.diagnostics);

    let program = &result.program;
    assert_eq!(resolve_aliases(program, "result"), [expected]);

    assert!(program.instantiation_stack().is_empty());
    assert!(program.deepest_instantiation() > 0);
}

const MINI_STD: &str = r#"
namespace std {
    template <typename T>
    struct allocator {
        using value_type = T;
    };

    template <typename Alloc>
    struct allocator_traits;

    template <typename T, typename Alloc = allocator<T>>
    class vector {
    public:
        using value_type = T;
        using allocator_type = Alloc;
        using reference = value_type&;
        using const_reference = const value_type&;
        using pointer = typename allocator_traits<Alloc>::pointer;

        vector();
        reference operator[](unsigned long index);
    };

    template <typename T, typename Alloc = allocator<T>>
    class list : protected vector<T, Alloc> {
    public:
        using size_type = unsigned long;
    };
}

template <typename T>
struct A {};
"#;

#[rstest]
#[case("typename std::vector<X>::reference", "X&")]
#[case("typename std::vector<X>::const_reference", "const X&")]
#[case("typename std::vector<X>::allocator_type::value_type", "X")]
#[case("typename std::list<A<X>>::reference", "A<X>&")]
#[case("typename std::list<X>::size_type", "unsigned long")]
fn library_containers(#[case] written: &str, #[case] expected: &str) {
    let code = format!(
        "{MINI_STD}\ntemplate <typename X>\nstruct test {{\n    using result = {written};\n}};\n"
    );

    assert_eq!(resolve_code(&code), expected);
}

#[test]
fn opaque_library_types_degrade_gracefully() {
    let resolve = |written: &str| {
        resolve_code(&format!(
            "{MINI_STD}\ntemplate <typename X>\nstruct test {{\n    using result = {written};\n}};\n"
        ))
    };

    // `allocator_traits` is only forward-declared
    insta::assert_snapshot!(
        resolve("typename std::vector<X>::pointer"),
        @"std::allocator_traits<std::allocator<X>>::pointer"
    );

    // `iterator` is never declared
    insta::assert_snapshot!(
        resolve("typename std::vector<A<X>>::iterator::value_type"),
        @"std::vector<A<X>>::iterator::value_type"
    );

    insta::assert_snapshot!(
        resolve("typename X::template rebind<int>::other"),
        @"X::template rebind<int>::other"
    );
}

#[test]
fn expansions_of_unknown_length_stay_dependent() {
    let code = r#"
        template <typename... Ts>
        struct type_list {};

        template <typename T, typename... Ts>
        struct A {
            using type = type_list<T>;
        };

        template <typename... Xs>
        struct test {
            using result = typename A<Xs...>::type;
        };
    "#;

    // `Xs` may be empty, so `T` can't be bound to anything
    insta::assert_snapshot!(resolve_code(code), @"A<Xs...>::type");
}

#[test]
fn cycles_terminate() {
    let code = r#"
        template <typename T>
        struct A;

        template <typename T>
        struct B {
            using type = typename A<T>::type;
        };

        template <typename T>
        struct A {
            using type = typename B<T>::type;
            using self = typename A<T>::self;
        };

        template <typename X>
        struct test {
            using result = typename A<X>::type;
        };

        template <typename X>
        struct other {
            using result = typename A<X>::self;
        };
    "#;

    let result = tmpl_frontend::parse("test.cpp", code);
    assert!(result.diagnostics.is_empty(), "{:#?}", result.diagnostics);

    insta::assert_debug_snapshot!(resolve_aliases(&result.program, "result"), @r###"
    [
        "A<X>::type",
        "A<X>::self",
    ]
    "###);

    assert!(result.program.instantiation_stack().is_empty());
}

const TRANSITIVE: &str = r#"
template <typename... Ts>
struct type_list {};

template <typename T1>
struct A {
    using type = type_list<T1>;
};

template <typename T2>
struct B {
    using type = typename A<T2>::type;
};

template <typename T3>
struct C {
    using type = typename B<T3>::type;
};

template <typename X>
struct test {
    using result = typename C<X>::type;
};
"#;

#[rstest]
#[case(1, "B<X>::type")]
#[case(2, "A<X>::type")]
#[case(3, "type_list<X>")]
#[case(tmpl_frontend::DEFAULT_RECURSION_LIMIT, "type_list<X>")]
fn recursion_limit_bounds_nested_lookups(#[case] limit: u32, #[case] expected: &str) {
    let mut result = tmpl_frontend::parse("test.cpp", TRANSITIVE);
    result.program.set_recursion_limit(limit);

    assert_eq!(resolve_aliases(&result.program, "result"), [expected]);
    assert!(result.program.instantiation_stack().is_empty());
}

#[test]
fn calls_are_independent() {
    let code = r#"
        template <typename... Ts>
        struct type_list {};

        template <typename T>
        struct A {
            using type = type_list<T>;
        };

        template <typename X>
        struct first {
            using result = typename A<X>::type;
        };

        template <typename Y>
        struct second {
            using result = typename A<Y*>::type;
        };
    "#;

    let result = tmpl_frontend::parse("test.cpp", code);
    assert!(result.diagnostics.is_empty(), "{:#?}", result.diagnostics);

    let program = &result.program;
    let aliases = program.find_alias("result");

    let forward = aliases
        .iter()
        .map(|alias| program.render(&tmpl_resolve::resolve(program, &alias.item.r#type)))
        .collect::<Vec<_>>();

    let mut backward = aliases
        .iter()
        .rev()
        .map(|alias| program.render(&tmpl_resolve::resolve(program, &alias.item.r#type)))
        .collect::<Vec<_>>();

    backward.reverse();

    assert_eq!(forward, ["type_list<X>", "type_list<Y*>"]);
    assert_eq!(forward, backward);
    assert!(program.instantiation_stack().is_empty());
}

#[test]
fn programs_resolve_on_separate_threads() {
    let handles = (0..4)
        .map(|_| std::thread::spawn(|| resolve_code(TRANSITIVE)))
        .collect::<Vec<_>>();

    for handle in handles {
        assert_eq!(handle.join().expect("thread panicked"), "type_list<X>");
    }
}
