// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Cranelift module setup and code generation orchestration.
//!
//! A `CodeGenerator` owns one `ObjectModule` and produces one object file.
//! `compile_program` drives the whole two-pass lowering of a unit: structs
//! first so forward references resolve, then imports (recursing through
//! the resolver to produce per-module objects), then functions in source
//! order.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use cranelift::prelude::*;
use cranelift_codegen::verifier::verify_function;
use cranelift_codegen::Context;
use cranelift_frontend::FunctionBuilderContext;
use cranelift_module::{FuncId, Linkage, Module};
use cranelift_object::{ObjectBuilder, ObjectModule};

use flast_ast::decl::{Decl, DeclKind, FnDecl, StructDecl};
use flast_ast::expr::Expr;
use flast_ast::types::{TypeDesc, TypeTag};
use flast_ast::Program;
use flast_diagnostics::{DiagKind, Diagnostic, DiagnosticSink};
use flast_resolve::{cache, ModuleResolver};

use crate::builder::FnLowerer;
use crate::types::StructLayout;
use crate::{CodegenError, CodegenResult};

/// Controls debug info and optimization at the link step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildMode {
    Debug,
    Release,
}

/// One declared parameter as the call-site sees it: its type and, when
/// present, the default expression that makes it optional.
#[derive(Clone)]
pub struct ParamSig {
    pub ty: TypeDesc,
    pub default: Option<Expr>,
}

/// A function's signature as tracked for call lowering.
#[derive(Clone)]
pub struct FnSig {
    pub params: Vec<ParamSig>,
    /// `Void`-tagged when the function returns nothing.
    pub ret: TypeDesc,
}

pub struct CodeGenerator {
    pub(crate) module: ObjectModule,
    ctx: Context,
    flags: settings::Flags,
    pub(crate) func_ids: HashMap<String, FuncId>,
    pub(crate) func_sigs: HashMap<String, FnSig>,
    pub(crate) struct_layouts: HashMap<String, StructLayout>,
    pub(crate) string_data: HashMap<String, cranelift_module::DataId>,
    pub(crate) string_counter: usize,
    /// Only the entry unit treats `main` as the process entry point.
    entry_unit: bool,
    dump_ir: bool,
    ir_texts: Vec<String>,
}

impl CodeGenerator {
    pub fn new(name: &str, mode: BuildMode, entry_unit: bool, dump_ir: bool) -> CodegenResult<Self> {
        let mut flag_builder = settings::builder();
        let opt = match mode {
            BuildMode::Debug => "none",
            BuildMode::Release => "speed",
        };
        flag_builder
            .set("opt_level", opt)
            .map_err(|e| CodegenError::Cranelift(e.to_string()))?;
        let flags = settings::Flags::new(flag_builder);

        let isa_builder =
            cranelift_native::builder().map_err(|e| CodegenError::Cranelift(e.to_string()))?;
        let isa = isa_builder
            .finish(flags.clone())
            .map_err(|e| CodegenError::Cranelift(e.to_string()))?;

        let builder = ObjectBuilder::new(isa, name, cranelift_module::default_libcall_names())
            .map_err(|e| CodegenError::Cranelift(e.to_string()))?;
        let module = ObjectModule::new(builder);

        Ok(CodeGenerator {
            module,
            ctx: Context::new(),
            flags,
            func_ids: HashMap::new(),
            func_sigs: HashMap::new(),
            struct_layouts: HashMap::new(),
            string_data: HashMap::new(),
            string_counter: 0,
            entry_unit,
            dump_ir,
            ir_texts: Vec::new(),
        })
    }

    /// Register the standard runtime externals with their canonical
    /// signatures. These are the targets of lowered built-in constructs.
    pub fn declare_runtime_functions(&mut self) -> CodegenResult<()> {
        // printf is variadic; it is declared with its fixed leading
        // parameter and called through call_indirect with a per-call-site
        // signature.
        self.declare_external("printf", &[types::I64], Some(types::I32))?;
        self.declare_external("strlen", &[types::I64], Some(types::I64))?;
        self.declare_external("strstr", &[types::I64, types::I64], Some(types::I64))?;
        self.declare_external("atoi", &[types::I64], Some(types::I32))?;
        self.declare_external("atoll", &[types::I64], Some(types::I64))?;
        self.declare_external("atof", &[types::I64], Some(types::F64))?;
        self.declare_external("malloc", &[types::I64], Some(types::I64))?;
        self.declare_external("free", &[types::I64], None)?;
        Ok(())
    }

    fn declare_external(
        &mut self,
        name: &str,
        params: &[Type],
        ret: Option<Type>,
    ) -> CodegenResult<()> {
        let mut sig = self.module.make_signature();
        for &p in params {
            sig.params.push(AbiParam::new(p));
        }
        if let Some(r) = ret {
            sig.returns.push(AbiParam::new(r));
        }
        let id = self
            .module
            .declare_function(name, Linkage::Import, &sig)
            .map_err(|e| CodegenError::Cranelift(e.to_string()))?;
        self.func_ids.insert(name.to_string(), id);
        Ok(())
    }

    /// Pass 1: pre-declare a struct so later references resolve forward.
    pub fn declare_struct(&mut self, decl: &StructDecl) {
        let layout = StructLayout::for_decl(decl);
        self.struct_layouts.insert(decl.name.clone(), layout);
    }

    /// The function's lowered Cranelift signature plus its call-site view.
    fn signature_for(&mut self, f: &FnDecl) -> CodegenResult<(Signature, FnSig)> {
        let mut sig = self.module.make_signature();
        let mut params = Vec::with_capacity(f.params.len());
        for param in &f.params {
            sig.params.push(AbiParam::new(crate::types::clif_type(&param.ty)?));
            params.push(ParamSig { ty: param.ty.clone(), default: param.default.clone() });
        }

        let ret = if self.entry_unit && f.name == "main" {
            // The entry `main` is the C entry point; its exit status must
            // be defined.
            TypeDesc::simple(TypeTag::I32)
        } else if f.is_constructor() {
            TypeDesc::simple(TypeTag::SelfTy)
        } else {
            f.ret_ty.clone().unwrap_or_else(|| TypeDesc::simple(TypeTag::Void))
        };
        if !ret.is_void() {
            sig.returns.push(AbiParam::new(crate::types::clif_type(&ret)?));
        }

        Ok((sig, FnSig { params, ret }))
    }

    /// Declare a function in the object module.
    pub fn declare_function(&mut self, f: &FnDecl, linkage: Linkage) -> CodegenResult<FuncId> {
        let (sig, fn_sig) = self.signature_for(f)?;
        let id = self
            .module
            .declare_function(&f.name, linkage, &sig)
            .map_err(|e| CodegenError::Cranelift(e.to_string()))?;
        self.func_ids.insert(f.name.clone(), id);
        self.func_sigs.insert(f.name.clone(), fn_sig);
        Ok(id)
    }

    /// Lower and define a declared function's body, then run the CLIF
    /// verifier. A verification failure discards the partial function.
    pub fn define_function(&mut self, f: &FnDecl) -> CodegenResult<()> {
        let func_id = *self
            .func_ids
            .get(&f.name)
            .ok_or_else(|| CodegenError::Lowering(format!("function '{}' was not declared", f.name)))?;
        let (sig, fn_sig) = self.signature_for(f)?;

        self.ctx.clear();
        self.ctx.func.signature = sig;

        {
            let Self {
                module,
                ctx,
                func_ids,
                func_sigs,
                struct_layouts,
                string_data,
                string_counter,
                ..
            } = self;
            let mut builder_ctx = FunctionBuilderContext::new();
            let builder = FunctionBuilder::new(&mut ctx.func, &mut builder_ctx);
            let lowerer = FnLowerer::new(
                builder,
                module,
                func_ids,
                func_sigs,
                struct_layouts,
                string_data,
                string_counter,
                fn_sig.ret.clone(),
                f.is_constructor(),
            );
            lowerer.lower(f)?;
        }

        if let Err(errors) = verify_function(&self.ctx.func, &self.flags) {
            let detail = errors.to_string();
            self.ctx.clear();
            return Err(CodegenError::Verification { name: f.name.clone(), detail });
        }

        if self.dump_ir {
            self.ir_texts.push(format!("{}", self.ctx.func.display()));
        }

        self.module
            .define_function(func_id, &mut self.ctx)
            .map_err(|e| CodegenError::Cranelift(e.to_string()))?;
        Ok(())
    }

    /// The textual CLIF of every lowered function, for `--ir`.
    pub fn ir_text(&self) -> String {
        self.ir_texts.join("\n")
    }

    /// Emit the object file. Consumes self because finish() takes
    /// ownership of the module.
    pub fn emit_object(self, path: &Path) -> CodegenResult<()> {
        let product = self.module.finish();
        let bytes = product
            .emit()
            .map_err(|e| CodegenError::Cranelift(e.to_string()))?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

/// The result of compiling a unit: where its object landed and the CLIF
/// text collected for `--ir`.
pub struct CompiledUnit {
    pub object_path: PathBuf,
    pub ir_text: String,
}

/// Compile the entry program to its object in `.build/cache/<stem>.o`,
/// driving per-module object generation through the resolver.
pub fn compile_program(
    program: &Program,
    source_path: &Path,
    cache_dir: &Path,
    resolver: &mut ModuleResolver,
    mode: BuildMode,
    dump_ir: bool,
    sink: &mut DiagnosticSink,
) -> CodegenResult<CompiledUnit> {
    let stem = source_stem(source_path);
    let object_path = cache_dir.join(format!("{}.o", stem));
    let ir_text = lower_unit(
        program,
        source_path,
        resolver,
        mode,
        dump_ir,
        sink,
        &object_path,
        true,
    )?;
    Ok(CompiledUnit { object_path, ir_text })
}

/// Lower one compilation unit (the entry program or one imported module)
/// into its own object file.
#[allow(clippy::too_many_arguments)]
fn lower_unit(
    program: &Program,
    source_path: &Path,
    resolver: &mut ModuleResolver,
    mode: BuildMode,
    dump_ir: bool,
    sink: &mut DiagnosticSink,
    object_out: &Path,
    is_entry: bool,
) -> CodegenResult<String> {
    let stem = source_stem(source_path);
    let mut gen = CodeGenerator::new(&stem, mode, is_entry, dump_ir)?;
    gen.declare_runtime_functions()?;

    let decls = flatten_decls(&program.decls);

    // Pass 1: declare aggregate types so later references resolve forward.
    for decl in &decls {
        if let DeclKind::Struct(s) = &decl.kind {
            gen.declare_struct(s);
        }
    }

    // Pass 2a: process imports, generating each imported module's object
    // and declaring its selected public functions in this unit.
    let source_dir = source_path.parent().unwrap_or(Path::new(".")).to_path_buf();
    for decl in &decls {
        let DeclKind::Import(import) = &decl.kind else {
            continue;
        };
        let Some(abs) = resolver.resolve_path(&import.path, &source_dir) else {
            continue;
        };
        let loaded = match resolver.load(&abs) {
            Ok(loaded) => loaded,
            Err(e) => {
                sink.report(
                    Diagnostic::error(DiagKind::CompilationFailed, e.to_string())
                        .with_span(decl.span),
                );
                continue;
            }
        };

        // Ensure the module's object artifact exists and is current.
        let object = loaded.cache_dir.join(cache::object_file_name(&abs));
        let already_built = resolver.object_for(&abs).is_some();
        let reusable = loaded.fresh && cache::entry_is_fresh(&object, &abs);
        if !already_built && !reusable {
            if !resolver.enter(&abs) {
                sink.report(
                    Diagnostic::error(
                        DiagKind::CircularDependency,
                        format!("circular import of \"{}\"", import.path),
                    )
                    .with_span(decl.span),
                );
                continue;
            }
            std::fs::create_dir_all(&loaded.cache_dir)?;
            let result = lower_unit(
                &loaded.program.clone(),
                &abs,
                resolver,
                mode,
                false,
                sink,
                &object,
                false,
            );
            resolver.leave(&abs);
            result?;
        }
        resolver.record_object(&abs, object);

        // Bring the selected public functions into this compilation unit.
        for f in ModuleResolver::select_imports(import, &loaded.program) {
            gen.declare_function(f, Linkage::Import)?;
        }
    }

    // Pass 2b: declare all functions first for forward references, then
    // lower bodies in source order.
    let functions = collect_functions(&decls);
    for f in &functions {
        let linkage = if f.body.is_some() {
            Linkage::Export
        } else {
            Linkage::Import
        };
        gen.declare_function(f, linkage)?;
    }
    for f in &functions {
        if f.body.is_some() {
            gen.define_function(f)?;
        }
    }

    let ir_text = gen.ir_text();
    gen.emit_object(object_out)?;
    Ok(ir_text)
}

fn source_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "out".to_string())
}

/// Flatten inline `mod` declarations into one declaration list.
fn flatten_decls(decls: &[Decl]) -> Vec<&Decl> {
    let mut out = Vec::new();
    for decl in decls {
        match &decl.kind {
            DeclKind::Module(m) => out.extend(flatten_decls(&m.decls)),
            _ => out.push(decl),
        }
    }
    out
}

/// Every lowerable function of the unit: free functions plus the methods
/// of impl blocks, which lower as free functions under their own names.
fn collect_functions<'a>(decls: &[&'a Decl]) -> Vec<&'a FnDecl> {
    let mut out = Vec::new();
    for decl in decls {
        match &decl.kind {
            DeclKind::Function(f) => out.push(f),
            DeclKind::Impl(i) => out.extend(i.methods.iter()),
            _ => {}
        }
    }
    out
}
