// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Codegen tests — lower parsed programs to verified CLIF and object files.

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::time::{Duration, SystemTime};

    use flast_ast::Program;
    use flast_diagnostics::DiagnosticSink;
    use flast_lexer::Lexer;
    use flast_parser::Parser;
    use flast_resolve::ModuleResolver;
    use tempfile::TempDir;

    use crate::module::{compile_program, BuildMode};
    use crate::CodegenError;

    fn parse(source: &str, file: &Path) -> Program {
        let lex = Lexer::new(source).tokenize();
        assert!(lex.is_ok(), "lex errors: {:?}", lex.errors);
        let mut parser = Parser::new(lex.tokens, file);
        let result = parser.parse();
        assert!(result.is_ok(), "parse errors: {:?}", result.errors);
        result.program
    }

    /// Compile a single-file program, returning the object path and the
    /// collected CLIF text.
    fn compile(tmp: &TempDir, source: &str) -> (PathBuf, String) {
        try_compile(tmp, source).expect("compilation should succeed")
    }

    fn try_compile(tmp: &TempDir, source: &str) -> Result<(PathBuf, String), CodegenError> {
        let root = tmp.path();
        let entry = root.join("main.fls");
        std::fs::write(&entry, source).unwrap();
        let program = parse(source, &entry);

        let cache_dir = root.join(".build").join("cache");
        std::fs::create_dir_all(&cache_dir).unwrap();
        let mut resolver = ModuleResolver::new(root);
        let mut sink = DiagnosticSink::new();
        let unit = compile_program(
            &program,
            &entry,
            &cache_dir,
            &mut resolver,
            BuildMode::Debug,
            true,
            &mut sink,
        )?;
        Ok((unit.object_path, unit.ir_text))
    }

    #[test]
    fn empty_main_emits_object() {
        let tmp = TempDir::new().unwrap();
        let (object, ir) = compile(&tmp, "pub func main() { }");
        assert!(object.exists());
        assert!(std::fs::metadata(&object).unwrap().len() > 0);
        // main lowers with an i32 exit status even when declared void.
        assert!(ir.contains("function"));
    }

    #[test]
    fn hello_world_lowers_println() {
        let tmp = TempDir::new().unwrap();
        let (object, ir) = compile(&tmp, r#"pub func main() { println("hello"); }"#);
        assert!(object.exists());
        // The synthesized format string is a printf call through a pointer.
        assert!(ir.contains("call_indirect"));
    }

    #[test]
    fn arithmetic_and_calls_verify() {
        let tmp = TempDir::new().unwrap();
        let source = r#"
            func add(a: i32, b: i32) -> i32 {
                return a + b;
            }
            func scale(x: i64, factor: i32) -> i64 {
                return x * factor;
            }
            pub func main() -> i32 {
                let s: i32 = add(2, 3);
                let w: i64 = scale(10, s);
                println(s, w);
                return 0;
            }
        "#;
        let (object, _) = compile(&tmp, source);
        assert!(object.exists());
    }

    #[test]
    fn control_flow_lowers() {
        let tmp = TempDir::new().unwrap();
        let source = r#"
            pub func main() -> i32 {
                let total: i32 = 0;
                for let i: i32 in 10 {
                    if i % 2 == 0 {
                        total += i;
                    } else {
                        continue;
                    }
                }
                for let j: i32 = 0; j < 5; j = j + 1 {
                    total = total + j;
                    if total > 100 {
                        break;
                    }
                }
                while total > 0 {
                    total--;
                }
                return total;
            }
        "#;
        let (object, _) = compile(&tmp, source);
        assert!(object.exists());
    }

    #[test]
    fn structs_new_and_member_access() {
        let tmp = TempDir::new().unwrap();
        let source = r#"
            struct Point { x: i32, y: i32 }
            pub func main() -> i32 {
                let p: Point = new Point(1, 2);
                p.x = 4;
                p.y = p.x + 1;
                return p.y;
            }
        "#;
        let (object, _) = compile(&tmp, source);
        assert!(object.exists());
    }

    #[test]
    fn constructors_return_the_self_slot() {
        let tmp = TempDir::new().unwrap();
        let source = r#"
            struct Counter { count: i32 }
            pub func make_counter() -> self {
                return;
            }
            pub func main() { }
        "#;
        let (object, ir) = compile(&tmp, source);
        assert!(object.exists());
        assert!(ir.contains("make_counter") || ir.contains("function"));
    }

    #[test]
    fn string_builtin_methods_lower_to_runtime_calls() {
        let tmp = TempDir::new().unwrap();
        let source = r#"
            pub func main() -> i32 {
                let s: str = "12345";
                let n: i64 = s.len();
                let v: i32 = s.to_i32();
                if s.contains("23") {
                    println(n, v);
                }
                return 0;
            }
        "#;
        let (object, ir) = compile(&tmp, source);
        assert!(object.exists());
        assert!(ir.contains("strlen"));
        assert!(ir.contains("strstr"));
        assert!(ir.contains("atoi"));
    }

    #[test]
    fn literal_narrowing_and_coercion() {
        let tmp = TempDir::new().unwrap();
        let source = r#"
            pub func main() -> i32 {
                let small: i32 = 42;
                let big: i64 = 5000000000;
                let precise: f64 = 1.5e-3;
                let mixed: f64 = small + precise;
                let narrowed: i32 = big as i32;
                println(mixed, narrowed);
                return 0;
            }
        "#;
        let (object, _) = compile(&tmp, source);
        assert!(object.exists());
    }

    #[test]
    fn default_parameters_fill_missing_arguments() {
        let tmp = TempDir::new().unwrap();
        let source = r#"
            func greet(times: i32 = 3) -> i32 {
                return times;
            }
            pub func main() -> i32 {
                return greet();
            }
        "#;
        let (object, _) = compile(&tmp, source);
        assert!(object.exists());
    }

    #[test]
    fn undefined_variable_is_a_lowering_error() {
        let tmp = TempDir::new().unwrap();
        let err = try_compile(&tmp, "pub func main() { let x = missing; }").unwrap_err();
        assert!(err.to_string().contains("undefined variable"));
    }

    #[test]
    fn duplicate_declaration_in_scope_fails() {
        let tmp = TempDir::new().unwrap();
        let err =
            try_compile(&tmp, "pub func main() { let x = 1; let x = 2; }").unwrap_err();
        assert!(err.to_string().contains("duplicate declaration"));
    }

    #[test]
    fn shadowing_in_inner_block_is_allowed() {
        let tmp = TempDir::new().unwrap();
        let source = r#"
            pub func main() -> i32 {
                let x: i32 = 1;
                {
                    let x: i32 = 2;
                    println(x);
                }
                return x;
            }
        "#;
        let (object, _) = compile(&tmp, source);
        assert!(object.exists());
    }

    #[test]
    fn for_in_requires_integer_bound() {
        let tmp = TempDir::new().unwrap();
        let err = try_compile(
            &tmp,
            r#"pub func main() { for let i: i32 in "nope" { } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, CodegenError::Unsupported(_)));
    }

    #[test]
    fn break_outside_loop_fails() {
        let tmp = TempDir::new().unwrap();
        let err = try_compile(&tmp, "pub func main() { break; }").unwrap_err();
        assert!(err.to_string().contains("break"));
    }

    // ── Imports and module objects ──────────────────────────────

    fn compile_with_import(root: &Path) -> (PathBuf, ModuleResolver) {
        let module_src = "pub func helper(x: i32) -> i32 { return x + 1; }";
        std::fs::write(root.join("util.fls"), module_src).unwrap();

        let entry_src = r#"
            import helper from "util";
            pub func main() -> i32 {
                return helper(41);
            }
        "#;
        let entry = root.join("main.fls");
        std::fs::write(&entry, entry_src).unwrap();
        let program = parse(entry_src, &entry);

        let cache_dir = root.join(".build").join("cache");
        std::fs::create_dir_all(&cache_dir).unwrap();
        let mut resolver = ModuleResolver::new(root);
        let mut sink = DiagnosticSink::new();
        let unit = compile_program(
            &program,
            &entry,
            &cache_dir,
            &mut resolver,
            BuildMode::Debug,
            false,
            &mut sink,
        )
        .expect("import compilation should succeed");
        assert!(!sink.has_errors());
        (unit.object_path, resolver)
    }

    #[test]
    fn imports_produce_module_objects() {
        let tmp = TempDir::new().unwrap();
        let (entry_object, resolver) = compile_with_import(tmp.path());
        assert!(entry_object.exists());

        let objects = resolver.module_objects();
        assert_eq!(objects.len(), 1);
        assert!(objects[0].exists());
        assert!(objects[0]
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("util_"));
        // The marker sits next to the object.
        let marker = objects[0].with_extension("cache");
        assert!(marker.exists());
    }

    #[test]
    fn fresh_module_objects_are_not_rewritten() {
        let tmp = TempDir::new().unwrap();
        let (_, resolver) = compile_with_import(tmp.path());
        let object = resolver.module_objects().pop().unwrap();
        let marker = object.with_extension("cache");

        // Push both artifacts well past the source so the entry is fresh.
        let future = SystemTime::now() + Duration::from_secs(30);
        for artifact in [&object, &marker] {
            std::fs::File::options()
                .write(true)
                .open(artifact)
                .unwrap()
                .set_modified(future)
                .unwrap();
        }
        let stamp = std::fs::metadata(&object).unwrap().modified().unwrap();

        // A second run must reuse the object untouched.
        let (_, second) = compile_with_import(tmp.path());
        let object_again = second.module_objects().pop().unwrap();
        assert_eq!(object, object_again);
        assert_eq!(
            std::fs::metadata(&object_again).unwrap().modified().unwrap(),
            stamp
        );

        // Touching the source invalidates and rewrites it.
        let source = tmp.path().join("util.fls").canonicalize().unwrap();
        std::fs::File::options()
            .write(true)
            .open(&source)
            .unwrap()
            .set_modified(future + Duration::from_secs(30))
            .unwrap();
        let (_, third) = compile_with_import(tmp.path());
        let object_third = third.module_objects().pop().unwrap();
        eprintln!(
            "stamp={:?} third_mtime={:?} source_mtime={:?} object_mtime_before_rebuild={:?}",
            stamp,
            std::fs::metadata(&object_third).unwrap().modified().unwrap(),
            std::fs::metadata(&source).unwrap().modified().unwrap(),
            std::time::SystemTime::now(),
        );
        assert!(
            std::fs::metadata(&object_third).unwrap().modified().unwrap() != stamp,
            "stale module object should be rewritten"
        );
    }
}
