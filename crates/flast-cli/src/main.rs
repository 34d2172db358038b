//! flastc — the Flast compiler driver.
//!
//! Pipeline: read source → lex → parse → resolve imports → lower to
//! native objects via Cranelift → link with the system C compiler.
//! Each phase aborts the pipeline when it recorded errors, after printing
//! every diagnostic it collected.

mod help;
mod output;

use std::env;
use std::path::{Path, PathBuf};
use std::process;

use flast_ast::LineMap;
use flast_codegen::{BuildMode, CodegenError};
use flast_diagnostics::formatter::DiagnosticFormatter;
use flast_diagnostics::{DiagKind, Diagnostic, DiagnosticSink};
use flast_lexer::Lexer;
use flast_parser::Parser;
use flast_resolve::ModuleResolver;

struct Options {
    input: PathBuf,
    output_stem: Option<String>,
    mode: BuildMode,
    clean: bool,
    print_ir: bool,
    print_tokens: bool,
    print_ast: bool,
}

fn main() {
    output::init();
    process::exit(run());
}

fn run() -> i32 {
    let args: Vec<String> = env::args().collect();
    let program_name = args
        .first()
        .map(|s| s.as_str())
        .unwrap_or("flastc")
        .to_string();

    if args.iter().any(|a| a == "-h" || a == "--help") {
        help::print_usage(&program_name);
        return 0;
    }
    if args.len() < 2 {
        help::print_usage(&program_name);
        return 1;
    }

    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(message) => {
            eprintln!("{}: {}", output::error_label(), message);
            help::print_usage(&program_name);
            return 1;
        }
    };

    if !options.input.exists() {
        eprintln!(
            "{}: input file does not exist: {}",
            output::error_label(),
            output::file_path(&options.input.to_string_lossy())
        );
        return 1;
    }

    let source = match std::fs::read_to_string(&options.input) {
        Ok(source) => source,
        Err(e) => {
            eprintln!(
                "{}: could not read {}: {}",
                output::error_label(),
                output::file_path(&options.input.to_string_lossy()),
                e
            );
            return 1;
        }
    };

    let file_name = options.input.to_string_lossy().into_owned();
    let mut sink = DiagnosticSink::new();

    // ── Lex ─────────────────────────────────────────────────────
    let lex = Lexer::new(&source).tokenize();

    if options.print_tokens {
        print_tokens(&source, &lex.tokens);
        if !lex.is_ok() {
            sink.report_all(&lex.errors);
            print_diagnostics(&sink, &source, &file_name);
            return 1;
        }
        return 0;
    }

    sink.report_all(&lex.errors);
    if sink.has_errors() {
        print_diagnostics(&sink, &source, &file_name);
        return 1;
    }

    // ── Parse ───────────────────────────────────────────────────
    let mut parser = Parser::new(lex.tokens, &options.input);
    let parsed = parser.parse();
    sink.report_all(&parsed.errors);

    if options.print_ast {
        if sink.has_errors() {
            print_diagnostics(&sink, &source, &file_name);
            return 1;
        }
        print!("{}", parsed.program.render());
        return 0;
    }

    if sink.has_errors() {
        print_diagnostics(&sink, &source, &file_name);
        return 1;
    }

    // ── Resolve imports ─────────────────────────────────────────
    // The project root is the directory of the input file.
    let project_root = options
        .input
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let mut resolver = ModuleResolver::new(&project_root);

    if options.clean {
        if let Err(e) = flast_resolve::cache::clean_main_cache(resolver.cache_root()) {
            eprintln!("{}: could not clean cache: {}", output::error_label(), e);
        }
    }

    let source_dir = project_root.clone();
    flast_resolve::resolve_imports(&mut resolver, &parsed.program, &source_dir, &mut sink);
    for missing in resolver.missing_modules() {
        sink.report(
            Diagnostic::error(
                DiagKind::ModuleNotFound,
                format!("module not found: {}", missing),
            )
            .with_hint("searched the project root and the packages/ directory")
            .with_hint("check that the module file exists and the import path is correct"),
        );
    }
    if sink.has_errors() {
        print_diagnostics(&sink, &source, &file_name);
        return 1;
    }

    // ── Code generation ─────────────────────────────────────────
    let stem = options
        .input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "out".to_string());
    println!(
        "{} {} ({})",
        output::status("Compiling"),
        stem,
        match options.mode {
            BuildMode::Debug => "debug",
            BuildMode::Release => "release",
        }
    );

    let paths = match flast_codegen::prepare_build_dirs(&project_root) {
        Ok(paths) => paths,
        Err(e) => {
            eprintln!("{}: {}", output::error_label(), e);
            return 1;
        }
    };

    let unit = match flast_codegen::compile_program(
        &parsed.program,
        &options.input,
        &paths.cache_dir,
        &mut resolver,
        options.mode,
        options.print_ir,
        &mut sink,
    ) {
        Ok(unit) => unit,
        Err(e) => {
            sink.report(codegen_diagnostic(&e));
            print_diagnostics(&sink, &source, &file_name);
            return 1;
        }
    };

    if sink.has_errors() {
        print_diagnostics(&sink, &source, &file_name);
        return 1;
    }

    if options.print_ir {
        print!("{}", unit.ir_text);
        return 0;
    }

    // ── Link ────────────────────────────────────────────────────
    let bin_stem = options.output_stem.clone().unwrap_or(stem);
    let binary = paths
        .bin_dir
        .join(format!("{}{}", bin_stem, flast_codegen::platform_extension()));
    let module_objects = resolver.module_objects();
    if let Err(e) = flast_codegen::link_executable(
        &unit.object_path,
        &module_objects,
        &binary,
        options.mode,
    ) {
        sink.report(Diagnostic::fatal(DiagKind::LinkingFailed, e.to_string()));
        print_diagnostics(&sink, &source, &file_name);
        return 1;
    }

    println!("{} {}", output::status("Finished"), binary.display());
    0
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut options = Options {
        input: PathBuf::from(&args[1]),
        output_stem: None,
        mode: BuildMode::Debug,
        clean: false,
        print_ir: false,
        print_tokens: false,
        print_ast: false,
    };

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "-o" => {
                i += 1;
                let name = args
                    .get(i)
                    .ok_or_else(|| "-o requires an output name".to_string())?;
                options.output_stem = Some(name.clone());
            }
            "--release" => options.mode = BuildMode::Release,
            "--debug" => options.mode = BuildMode::Debug,
            "--clean" => options.clean = true,
            "--ir" => options.print_ir = true,
            "--tokens" => options.print_tokens = true,
            "--ast" => options.print_ast = true,
            other => return Err(format!("unknown option: {}", other)),
        }
        i += 1;
    }
    Ok(options)
}

fn print_tokens(source: &str, tokens: &[flast_ast::token::Token]) {
    let line_map = LineMap::new(source);
    for token in tokens {
        let (line, col) = line_map.offset_to_line_col(token.span.start);
        println!("{:>4}:{:<4} {:?} {:?}", line, col, token.kind, token.lexeme);
    }
}

fn print_diagnostics(sink: &DiagnosticSink, source: &str, file_name: &str) {
    let formatter = DiagnosticFormatter::new(source, file_name);
    for diagnostic in sink.grouped() {
        eprintln!("{}", formatter.format(diagnostic));
    }
    if sink.has_errors() {
        eprintln!("{}", sink.summary());
    }
}

fn codegen_diagnostic(error: &CodegenError) -> Diagnostic {
    let kind = match error {
        CodegenError::LinkFailure(_) => DiagKind::LinkingFailed,
        CodegenError::Io(_) => DiagKind::FileNotFound,
        _ => DiagKind::CompilationFailed,
    };
    match error {
        CodegenError::Verification { .. } | CodegenError::LinkFailure(_) => {
            Diagnostic::fatal(kind, error.to_string())
        }
        _ => Diagnostic::error(kind, error.to_string()),
    }
}
