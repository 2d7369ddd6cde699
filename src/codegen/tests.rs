use indoc::indoc;
use pretty_assertions::assert_eq;

use super::wasm::{DataSegment, Module};
use crate::type_checker::test_utils::check_program;

fn generate(src: &str) -> Module {
    super::generate(&check_program(src)).expect("failed to generate")
}

fn generate_error(src: &str) -> String {
    match super::generate(&check_program(src)) {
        Ok(module) => panic!("expected an error, generated:\n{module}"),
        Err(error) => error.to_string(),
    }
}

/// Renders one function without the module's indentation.
fn function(module: &Module, name: &str) -> String {
    let function = module.function(name).expect("function not generated");
    dedent(&function.to_string())
}

fn dedent(text: &str) -> String {
    text.lines()
        .map(|line| line.strip_prefix("  ").unwrap_or(line))
        .fold(String::new(), |acc, line| acc + line + "\n")
}

#[test]
fn test_hello_world() {
    let module = generate(
        r#"
        int main() {
            log("Hello");
            return 0;
        }
        "#,
    );
    assert_eq!(
        dedent(&module.to_string()),
        indoc! {r#"
            (data (i32.const 1) "Hello\00")
            (func $main (export "main") (result i32)
              i32.const 1
              call $log
              i32.const 0
              return
            )
        "#}
    );
}

#[test]
fn test_string_offsets_account_for_terminator() {
    let module = generate(r#"void f() { log("ab"); log("c"); }"#);
    assert_eq!(
        module.data,
        vec![
            DataSegment {
                offset: 1,
                bytes: b"ab\0".to_vec(),
            },
            DataSegment {
                offset: 4,
                bytes: b"c\0".to_vec(),
            },
        ]
    );
}

#[test]
fn test_loop_condition_string_is_allocated_once() {
    let module = generate(r#"void f(char* s) { while (s == "ab") { s = "c"; } log("c"); }"#);
    assert_eq!(
        module.data,
        vec![
            DataSegment {
                offset: 1,
                bytes: b"ab\0".to_vec(),
            },
            DataSegment {
                offset: 4,
                bytes: b"c\0".to_vec(),
            },
            DataSegment {
                offset: 6,
                bytes: b"c\0".to_vec(),
            },
        ]
    );
    let body = function(&module, "f");
    assert_eq!(body.matches("i32.const 1\n").count(), 2, "{body}");
}

#[test]
fn test_string_escapes_in_data() {
    let module = generate(r#"void f() { log("a\"b\n"); }"#);
    assert_eq!(
        module.data[0].to_string(),
        r#"(data (i32.const 1) "a\22b\0a\00")"#
    );
}

#[test]
fn test_for_lowers_like_while() {
    let module = generate(
        "
        void a() {
            for (int i = 0; i < 10; i++) {
                logInt(i);
            }
        }
        void b() {
            int i = 0;
            while (i < 10) {
                logInt(i);
                i++;
            }
        }
        ",
    );
    let a = module.function("a").unwrap();
    let b = module.function("b").unwrap();
    assert_eq!(a.body, b.body);
    assert_eq!(a.locals, b.locals);
    assert_eq!(
        function(&module, "b"),
        indoc! {r#"
            (func $b (export "b") (local i32)
              i32.const 0
              local.set 0
              local.get 0
              i32.const 10
              i32.lt_s
              if
                loop
                  local.get 0
                  call $logInt
                  local.get 0
                  i32.const 1
                  i32.add
                  local.set 0
                  local.get 0
                  i32.const 10
                  i32.lt_s
                  br_if 0
                end
              end
            )
        "#}
    );
}

#[test]
fn test_array_store_is_address_plus_byte_store() {
    let module = generate("void f() { int a[10]; a[2] = 5; }");
    assert!(module.data.is_empty());
    assert_eq!(
        function(&module, "f"),
        indoc! {r#"
            (func $f (export "f") (local i32)
              i32.const 1
              local.set 0
              local.get 0
              i32.const 2
              i32.add
              i32.const 5
              i32.store8
            )
        "#}
    );
}

#[test]
fn test_array_read_and_deref() {
    let module = generate("int f(char* s) { char buf[4]; return buf[1] + *s; }");
    assert_eq!(
        function(&module, "f"),
        indoc! {r#"
            (func $f (export "f") (param i32) (result i32) (local i32)
              i32.const 1
              local.set 1
              local.get 1
              i32.const 1
              i32.add
              i32.load8_s
              local.get 0
              i32.load8_s
              i32.add
              return
            )
        "#}
    );
}

#[test]
fn test_rows_of_nested_arrays_are_addresses() {
    let module = generate(
        "
        int main() {
            char g[2][3];
            g[1][2] = 7;
            log(g[1]);
            log(*g);
            return g[1][2];
        }
        ",
    );
    assert_eq!(
        function(&module, "main"),
        indoc! {r#"
            (func $main (export "main") (result i32) (local i32)
              i32.const 1
              local.set 0
              local.get 0
              i32.const 1
              i32.const 3
              i32.mul
              i32.add
              i32.const 2
              i32.add
              i32.const 7
              i32.store8
              local.get 0
              i32.const 1
              i32.const 3
              i32.mul
              i32.add
              call $log
              local.get 0
              call $log
              local.get 0
              i32.const 1
              i32.const 3
              i32.mul
              i32.add
              i32.const 2
              i32.add
              i32.load8_s
              return
            )
        "#}
    );
}

#[test]
fn test_missing_return() {
    let error = generate_error("int f() { logInt(1); }");
    assert_eq!(error, "line 1: function `f` must return a value");
}

#[test]
fn test_trailing_unreachable() {
    let module = generate("int f(int x) { if (x) { return 1; } }");
    assert_eq!(
        function(&module, "f"),
        indoc! {r#"
            (func $f (export "f") (param i32) (result i32)
              local.get 0
              if
                i32.const 1
                return
              end
              unreachable
            )
        "#}
    );
}

#[test]
fn test_if_else() {
    let module = generate("int f(int x) { if (x > 0) { return 1; } else { return 2; } return 3; }");
    assert_eq!(
        function(&module, "f"),
        indoc! {r#"
            (func $f (export "f") (param i32) (result i32)
              local.get 0
              i32.const 0
              i32.gt_s
              if
                i32.const 1
                return
              else
                i32.const 2
                return
              end
              i32.const 3
              return
            )
        "#}
    );
}

#[test]
fn test_break_and_continue_in_while() {
    let module = generate(
        "
        void f() {
            int i = 0;
            while (i < 10) {
                i++;
                if (i == 5) { continue; }
                if (i == 8) { break; }
                logInt(i);
            }
        }
        ",
    );
    assert_eq!(
        function(&module, "f"),
        indoc! {r#"
            (func $f (export "f") (local i32)
              i32.const 0
              local.set 0
              local.get 0
              i32.const 10
              i32.lt_s
              if
                loop
                  block
                    local.get 0
                    i32.const 1
                    i32.add
                    local.set 0
                    local.get 0
                    i32.const 5
                    i32.eq
                    if
                      br 1
                    end
                    local.get 0
                    i32.const 8
                    i32.eq
                    if
                      br 3
                    end
                    local.get 0
                    call $logInt
                  end
                  local.get 0
                  i32.const 10
                  i32.lt_s
                  br_if 0
                end
              end
            )
        "#}
    );
}

#[test]
fn test_do_while_with_break_gets_block() {
    let module = generate("void f(int n) { do { if (n) { break; } n--; } while (n > 0); }");
    assert_eq!(
        function(&module, "f"),
        indoc! {r#"
            (func $f (export "f") (param i32)
              block
                loop
                  local.get 0
                  if
                    br 2
                  end
                  local.get 0
                  i32.const 1
                  i32.sub
                  local.set 0
                  local.get 0
                  i32.const 0
                  i32.gt_s
                  br_if 0
                end
              end
            )
        "#}
    );
}

#[test]
fn test_do_while_without_break() {
    let module = generate("void f(int n) { do { n--; } while (n); }");
    assert_eq!(
        function(&module, "f"),
        indoc! {r#"
            (func $f (export "f") (param i32)
              loop
                local.get 0
                i32.const 1
                i32.sub
                local.set 0
                local.get 0
                br_if 0
              end
            )
        "#}
    );
}

#[test]
fn test_for_without_condition_and_with_continue() {
    let module = generate("void f() { for (int i = 0;; i++) { if (i > 3) { break; } continue; } }");
    assert_eq!(
        function(&module, "f"),
        indoc! {r#"
            (func $f (export "f") (local i32)
              i32.const 0
              local.set 0
              i32.const 1
              if
                loop
                  block
                    local.get 0
                    i32.const 3
                    i32.gt_s
                    if
                      br 3
                    end
                    br 0
                  end
                  local.get 0
                  i32.const 1
                  i32.add
                  local.set 0
                  i32.const 1
                  br_if 0
                end
              end
            )
        "#}
    );
}

#[test]
fn test_break_targets_innermost_loop() {
    let module = generate(
        "
        void f() {
            while (1) {
                do { break; } while (1);
                break;
            }
        }
        ",
    );
    assert_eq!(
        function(&module, "f"),
        indoc! {r#"
            (func $f (export "f")
              i32.const 1
              if
                loop
                  block
                    loop
                      br 1
                      i32.const 1
                      br_if 0
                    end
                  end
                  br 1
                  i32.const 1
                  br_if 0
                end
              end
            )
        "#}
    );
}

#[test]
fn test_break_outside_loop() {
    let error = generate_error("void f() { break; }");
    assert_eq!(error, "line 1: `break` outside of a loop");
}

#[test]
fn test_continue_outside_loop() {
    let error = generate_error("void f() {\n  if (1) { continue; }\n}");
    assert_eq!(error, "line 2: `continue` outside of a loop");
}

#[test]
fn test_increment_results() {
    let module = generate("int f(int x) { int y = x++; return ++y; }");
    assert_eq!(
        function(&module, "f"),
        indoc! {r#"
            (func $f (export "f") (param i32) (result i32) (local i32)
              local.get 0
              local.get 0
              i32.const 1
              i32.add
              local.set 0
              local.set 1
              local.get 1
              i32.const 1
              i32.add
              local.tee 1
              return
            )
        "#}
    );
}

#[test]
fn test_unused_values_are_dropped() {
    let module = generate("int g() { return 1; } void f() { g(); 1 + 2; }");
    assert_eq!(
        function(&module, "f"),
        indoc! {r#"
            (func $f (export "f")
              call $g
              drop
              i32.const 1
              i32.const 2
              i32.add
              drop
            )
        "#}
    );
}

#[test]
fn test_float_operations() {
    let module = generate(
        "
        float div(float a, float b) { return a / b; }
        int less(float a) { return a < 1.5; }
        float neg(float a) { return -a; }
        ",
    );
    assert_eq!(
        function(&module, "div"),
        indoc! {r#"
            (func $div (export "div") (param f32) (param f32) (result f32)
              local.get 0
              local.get 1
              f32.div
              return
            )
        "#}
    );
    assert_eq!(
        function(&module, "less"),
        indoc! {r#"
            (func $less (export "less") (param f32) (result i32)
              local.get 0
              f32.const 1.5
              f32.lt
              return
            )
        "#}
    );
    assert_eq!(
        function(&module, "neg"),
        indoc! {r#"
            (func $neg (export "neg") (param f32) (result f32)
              local.get 0
              f32.neg
              return
            )
        "#}
    );
}

#[test]
fn test_integer_unary_operators() {
    let module = generate("int neg(int a) { return -a; } int not(int a) { return !a; }");
    assert_eq!(
        function(&module, "neg"),
        indoc! {r#"
            (func $neg (export "neg") (param i32) (result i32)
              i32.const 0
              local.get 0
              i32.sub
              return
            )
        "#}
    );
    assert_eq!(
        function(&module, "not"),
        indoc! {r#"
            (func $not (export "not") (param i32) (result i32)
              local.get 0
              i32.eqz
              return
            )
        "#}
    );
}

#[test]
fn test_integer_opcodes() {
    let module = generate("int f(int a, int b) { return a % b ^ a / b && a || b; }");
    let body: Vec<String> = module.functions[0]
        .body
        .iter()
        .map(ToString::to_string)
        .filter(|instr| !instr.starts_with("local.get"))
        .collect();
    assert_eq!(
        body,
        ["i32.or", "i32.and", "i32.div_s", "i32.xor", "i32.rem_s", "return"]
    );
}

#[test]
fn test_redeclaration_takes_fresh_slot() {
    let module = generate("void f() { int x = 1; int x = 2; }");
    assert_eq!(
        function(&module, "f"),
        indoc! {r#"
            (func $f (export "f") (local i32) (local i32)
              i32.const 1
              local.set 0
              i32.const 2
              local.set 1
            )
        "#}
    );
}

#[test]
fn test_globals_live_in_memory() {
    let module = generate(
        "
        int counter = 3;
        int main() { counter = counter + 1; return counter; }
        ",
    );
    assert_eq!(
        dedent(&module.to_string()),
        indoc! {r#"
            (data (i32.const 1) "\03\00\00\00")
            (func $main (export "main") (result i32)
              i32.const 1
              i32.const 1
              i32.load
              i32.const 1
              i32.add
              i32.store
              i32.const 1
              i32.load
              return
            )
        "#}
    );
}

#[test]
fn test_global_string_and_negative_initializers() {
    let module = generate(
        r#"
        char* greeting = "hi";
        int offset = -5;
        float scale = 0.5;
        "#,
    );
    let data: Vec<String> = module.data.iter().map(ToString::to_string).collect();
    assert_eq!(
        data,
        [
            r#"(data (i32.const 1) "\05\00\00\00")"#,
            r#"(data (i32.const 5) "hi\00")"#,
            r#"(data (i32.const 8) "\fb\ff\ff\ff")"#,
            r#"(data (i32.const 12) "\00\00\00?")"#,
        ]
    );
}

#[test]
fn test_int_min_literal() {
    let module = generate("int low = -2147483648; int f() { return -2147483648; }");
    assert_eq!(
        module.data[0].to_string(),
        r#"(data (i32.const 1) "\00\00\00\80")"#
    );
    assert_eq!(
        function(&module, "f"),
        indoc! {r#"
            (func $f (export "f") (result i32)
              i32.const 0
              i32.const -2147483648
              i32.sub
              return
            )
        "#}
    );
}

#[test]
fn test_global_increment_uses_scratch_local() {
    let module = generate("int counter; int next() { return ++counter; }");
    assert!(module.data.is_empty());
    assert_eq!(
        function(&module, "next"),
        indoc! {r#"
            (func $next (export "next") (result i32) (local i32)
              i32.const 1
              i32.const 1
              i32.load
              i32.const 1
              i32.add
              local.tee 0
              i32.store
              local.get 0
              return
            )
        "#}
    );
}

#[test]
fn test_global_initializer_must_be_literal() {
    let error = generate_error("int a = 1; int b = a;");
    assert_eq!(error, "line 1: initializer of global `b` must be a literal");
}

#[test]
fn test_float_arrays_are_rejected() {
    let error = generate_error("void f() { float a[4]; }");
    assert_eq!(
        error,
        "line 1: elements of type `float` are not supported, only byte-sized elements are"
    );
}

#[test]
fn test_array_initializer_is_rejected() {
    let error = generate_error("void f(int* p) { char a[2]; char b[2] = a; }");
    assert_eq!(error, "line 1: arrays cannot be initialized");
}

#[test]
fn test_memory_is_limited_to_one_page() {
    let error = generate_error("void f() { char big[70000]; }");
    assert_eq!(
        error,
        "line 1: out of linear memory: 70000 more byte(s) needed at offset 1"
    );
}
