// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Function lowerer — walks a function's AST and builds Cranelift IR.
//!
//! Parameters are bound to frontend variables so every later read goes
//! through the variable, and a synthetic `self` variable is allocated and
//! null-initialized in every function, which keeps methods and
//! constructors uniform at the IR level. Loops lower to the canonical
//! condition / body / update / after block shape.

use std::collections::HashMap;

use cranelift::prelude::*;
use cranelift_codegen::ir::{FuncRef, GlobalValue};
use cranelift_frontend::FunctionBuilder;
use cranelift_module::{DataDescription, DataId, FuncId, Linkage, Module};
use cranelift_object::ObjectModule;

use flast_ast::decl::FnDecl;
use flast_ast::expr::{BinOp, Expr, ExprKind, UnaryOp};
use flast_ast::stmt::{Stmt, StmtKind};
use flast_ast::types::{TypeDesc, TypeTag};

use crate::builtins::{self, BuiltinMethod};
use crate::module::FnSig;
use crate::scope::{ScopeStack, Symbol};
use crate::types::{clif_type, StructLayout};
use crate::{CodegenError, CodegenResult};

/// A lowered expression: its SSA value and the source-level type it
/// carries, which drives coercions, comparisons, and printf formats.
#[derive(Clone)]
struct TypedValue {
    value: Value,
    ty: TypeDesc,
}

impl TypedValue {
    fn new(value: Value, ty: TypeDesc) -> Self {
        Self { value, ty }
    }
}

/// Jump targets for `continue` and `break` inside the innermost loop.
struct LoopTargets {
    continue_block: Block,
    break_block: Block,
}

pub struct FnLowerer<'a, 'b> {
    builder: FunctionBuilder<'b>,
    module: &'a mut ObjectModule,
    func_ids: &'a HashMap<String, FuncId>,
    func_sigs: &'a HashMap<String, FnSig>,
    struct_layouts: &'a HashMap<String, StructLayout>,
    string_data: &'a mut HashMap<String, DataId>,
    string_counter: &'a mut usize,

    scopes: ScopeStack,
    next_var: usize,
    ret_ty: TypeDesc,
    is_constructor: bool,
    self_var: Variable,
    loop_stack: Vec<LoopTargets>,
    func_refs: HashMap<String, FuncRef>,
    data_refs: HashMap<String, GlobalValue>,
    /// Whether the current block already has a terminator.
    terminated: bool,
}

impl<'a, 'b> FnLowerer<'a, 'b> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        builder: FunctionBuilder<'b>,
        module: &'a mut ObjectModule,
        func_ids: &'a HashMap<String, FuncId>,
        func_sigs: &'a HashMap<String, FnSig>,
        struct_layouts: &'a HashMap<String, StructLayout>,
        string_data: &'a mut HashMap<String, DataId>,
        string_counter: &'a mut usize,
        ret_ty: TypeDesc,
        is_constructor: bool,
    ) -> Self {
        Self {
            builder,
            module,
            func_ids,
            func_sigs,
            struct_layouts,
            string_data,
            string_counter,
            scopes: ScopeStack::new(),
            next_var: 0,
            ret_ty,
            is_constructor,
            self_var: Variable::new(0),
            loop_stack: Vec::new(),
            func_refs: HashMap::new(),
            data_refs: HashMap::new(),
            terminated: false,
        }
    }

    fn new_var(&mut self) -> Variable {
        let var = Variable::new(self.next_var);
        self.next_var += 1;
        var
    }

    /// Lower the whole function body and finish the builder.
    pub fn lower(mut self, f: &FnDecl) -> CodegenResult<()> {
        let entry = self.builder.create_block();
        self.builder.append_block_params_for_function_params(entry);
        self.builder.switch_to_block(entry);

        let param_values: Vec<Value> = self.builder.block_params(entry).to_vec();
        for (param, value) in f.params.iter().zip(param_values) {
            let clif = clif_type(&param.ty)?;
            let var = self.new_var();
            self.builder.declare_var(var, clif);
            self.builder.def_var(var, value);
            self.scopes
                .declare(Symbol {
                    name: param.name.clone(),
                    ty: param.ty.clone(),
                    var,
                    mutable: true,
                    initialized: true,
                    span: flast_ast::Span::new(0, 0),
                })
                .map_err(|_| {
                    CodegenError::Lowering(format!("duplicate parameter '{}'", param.name))
                })?;
        }

        // The synthetic self slot, null until a constructor or method
        // stores into it.
        self.self_var = self.new_var();
        self.builder.declare_var(self.self_var, types::I64);
        let null = self.builder.ins().iconst(types::I64, 0);
        self.builder.def_var(self.self_var, null);

        for stmt in f.body.as_deref().unwrap_or(&[]) {
            self.lower_stmt(stmt)?;
        }

        if !self.terminated {
            self.emit_default_return()?;
        }

        self.builder.seal_all_blocks();
        self.builder.finalize();
        Ok(())
    }

    /// Control fell off the end: void functions return nothing,
    /// constructors return the self slot, everything else returns zero.
    fn emit_default_return(&mut self) -> CodegenResult<()> {
        if self.is_constructor {
            let value = self.builder.use_var(self.self_var);
            self.builder.ins().return_(&[value]);
        } else if self.ret_ty.is_void() {
            self.builder.ins().return_(&[]);
        } else {
            let clif = clif_type(&self.ret_ty)?;
            let zero = if clif.is_float() {
                if clif == types::F32 {
                    self.builder.ins().f32const(0.0)
                } else {
                    self.builder.ins().f64const(0.0)
                }
            } else {
                self.builder.ins().iconst(clif, 0)
            };
            self.builder.ins().return_(&[zero]);
        }
        self.terminated = true;
        Ok(())
    }

    // =====================================================================
    // Statements
    // =====================================================================

    fn lower_stmt(&mut self, stmt: &Stmt) -> CodegenResult<()> {
        // Anything after a terminator lands in a fresh (unreachable) block
        // so the builder never appends past a return or branch.
        if self.terminated {
            let dead = self.builder.create_block();
            self.builder.switch_to_block(dead);
            self.terminated = false;
        }

        match &stmt.kind {
            StmtKind::Let { name, ty, init, mutable } => {
                self.lower_let(name, ty.as_ref(), init.as_ref(), *mutable)
            }
            StmtKind::Assign { target, op, value } => {
                self.lower_assign(target, *op, value)?;
                Ok(())
            }
            StmtKind::Expr(expr) => {
                self.lower_expr(expr)?;
                Ok(())
            }
            StmtKind::Return(value) => {
                let lowered = match value {
                    Some(expr) => Some(self.lower_expr(expr)?),
                    None => None,
                };
                self.emit_return(lowered)
            }
            StmtKind::Block(stmts) => {
                self.scopes.push();
                for stmt in stmts {
                    self.lower_stmt(stmt)?;
                }
                self.scopes.pop();
                Ok(())
            }
            StmtKind::If { cond, then_block, else_block } => {
                self.lower_if(cond, then_block, else_block.as_deref())
            }
            StmtKind::While { cond, body } => self.lower_while(cond, body),
            StmtKind::For { init, cond, update, body } => {
                self.lower_for(init.as_deref(), cond.as_ref(), update.as_deref(), body)
            }
            StmtKind::ForIn { var, var_ty, iterable, body } => {
                self.lower_for_in(var, var_ty.as_ref(), iterable, body)
            }
            StmtKind::Break => {
                let target = self
                    .loop_stack
                    .last()
                    .ok_or_else(|| CodegenError::Lowering("'break' outside of a loop".into()))?
                    .break_block;
                self.builder.ins().jump(target, &[]);
                self.terminated = true;
                Ok(())
            }
            StmtKind::Continue => {
                let target = self
                    .loop_stack
                    .last()
                    .ok_or_else(|| CodegenError::Lowering("'continue' outside of a loop".into()))?
                    .continue_block;
                self.builder.ins().jump(target, &[]);
                self.terminated = true;
                Ok(())
            }
            StmtKind::Match { .. } => {
                Err(CodegenError::Unsupported("match lowering".into()))
            }
            StmtKind::Try { .. } => {
                Err(CodegenError::Unsupported("try/catch lowering".into()))
            }
            StmtKind::Throw(_) => Err(CodegenError::Unsupported("throw lowering".into())),
        }
    }

    fn lower_let(
        &mut self,
        name: &str,
        ty: Option<&TypeDesc>,
        init: Option<&Expr>,
        mutable: bool,
    ) -> CodegenResult<()> {
        let init_value = match init {
            Some(expr) => Some(self.lower_expr(expr)?),
            None => None,
        };

        // A declared type wins; `auto` or no annotation infers from the
        // initializer, defaulting to i32.
        let declared = match ty {
            Some(t) if t.tag != TypeTag::Auto => t.clone(),
            _ => init_value
                .as_ref()
                .map(|v| v.ty.clone())
                .unwrap_or_else(|| TypeDesc::simple(TypeTag::I32)),
        };
        let clif = clif_type(&declared)?;

        let var = self.new_var();
        self.builder.declare_var(var, clif);
        let initialized = init_value.is_some();
        let value = match init_value {
            Some(v) => self.coerce(v, &declared)?,
            None => {
                if clif.is_float() {
                    if clif == types::F32 {
                        self.builder.ins().f32const(0.0)
                    } else {
                        self.builder.ins().f64const(0.0)
                    }
                } else {
                    self.builder.ins().iconst(clif, 0)
                }
            }
        };
        self.builder.def_var(var, value);

        self.scopes
            .declare(Symbol {
                name: name.to_string(),
                ty: declared,
                var,
                mutable,
                initialized,
                span: flast_ast::Span::new(0, 0),
            })
            .map_err(|_| {
                CodegenError::Lowering(format!("duplicate declaration of '{}'", name))
            })
    }

    /// Store into an lvalue (variable, member access, or self). A compound
    /// operator folds the current value with the right-hand side first.
    fn lower_assign(
        &mut self,
        target: &Expr,
        op: Option<BinOp>,
        value: &Expr,
    ) -> CodegenResult<TypedValue> {
        match &target.kind {
            ExprKind::Ident(name) => {
                let symbol = self
                    .scopes
                    .lookup(name)
                    .ok_or_else(|| {
                        CodegenError::Lowering(format!("undefined variable '{}'", name))
                    })?
                    .clone();
                if !symbol.mutable && symbol.initialized {
                    return Err(CodegenError::Lowering(format!(
                        "cannot assign to constant '{}'",
                        name
                    )));
                }

                let mut rhs = self.lower_expr(value)?;
                if let Some(op) = op {
                    let current =
                        TypedValue::new(self.builder.use_var(symbol.var), symbol.ty.clone());
                    rhs = self.lower_binary_values(op, current, rhs)?;
                }
                let stored = self.coerce(rhs, &symbol.ty)?;
                self.builder.def_var(symbol.var, stored);
                if let Some(symbol) = self.scopes.lookup_mut(name) {
                    symbol.initialized = true;
                }
                Ok(TypedValue::new(stored, symbol.ty))
            }
            ExprKind::Member { object, field, .. } => {
                let base = self.lower_expr(object)?;
                let layout = self.layout_for(&base.ty)?;
                let field_layout = layout
                    .field(field)
                    .ok_or_else(|| {
                        CodegenError::Lowering(format!(
                            "struct '{}' has no field '{}'",
                            layout.name, field
                        ))
                    })?
                    .clone();

                let mut rhs = self.lower_expr(value)?;
                if let Some(op) = op {
                    let loaded = self.builder.ins().load(
                        clif_type(&field_layout.ty)?,
                        MemFlags::new(),
                        base.value,
                        field_layout.offset as i32,
                    );
                    let current = TypedValue::new(loaded, field_layout.ty.clone());
                    rhs = self.lower_binary_values(op, current, rhs)?;
                }
                let stored = self.coerce(rhs, &field_layout.ty)?;
                self.builder.ins().store(
                    MemFlags::new(),
                    stored,
                    base.value,
                    field_layout.offset as i32,
                );
                Ok(TypedValue::new(stored, field_layout.ty))
            }
            ExprKind::SelfRef => {
                let rhs = self.lower_expr(value)?;
                self.builder.def_var(self.self_var, rhs.value);
                Ok(rhs)
            }
            _ => Err(CodegenError::Lowering(
                "assignment target must be a variable or member access".into(),
            )),
        }
    }

    fn emit_return(&mut self, value: Option<TypedValue>) -> CodegenResult<()> {
        if self.ret_ty.is_void() {
            self.builder.ins().return_(&[]);
        } else {
            let ret_ty = self.ret_ty.clone();
            let lowered = match value {
                Some(v) => self.coerce(v, &ret_ty)?,
                None if self.is_constructor => self.builder.use_var(self.self_var),
                None => {
                    let clif = clif_type(&ret_ty)?;
                    if clif.is_float() {
                        if clif == types::F32 {
                            self.builder.ins().f32const(0.0)
                        } else {
                            self.builder.ins().f64const(0.0)
                        }
                    } else {
                        self.builder.ins().iconst(clif, 0)
                    }
                }
            };
            self.builder.ins().return_(&[lowered]);
        }
        self.terminated = true;
        Ok(())
    }

    fn lower_if(
        &mut self,
        cond: &Expr,
        then_block: &[Stmt],
        else_block: Option<&[Stmt]>,
    ) -> CodegenResult<()> {
        let cond_value = self.lower_expr(cond)?;
        let cond_bool = self.truthy(&cond_value);

        let then_b = self.builder.create_block();
        let merge_b = self.builder.create_block();
        let else_b = if else_block.is_some() {
            self.builder.create_block()
        } else {
            merge_b
        };

        self.builder.ins().brif(cond_bool, then_b, &[], else_b, &[]);

        self.builder.switch_to_block(then_b);
        self.terminated = false;
        self.scopes.push();
        for stmt in then_block {
            self.lower_stmt(stmt)?;
        }
        self.scopes.pop();
        if !self.terminated {
            self.builder.ins().jump(merge_b, &[]);
        }

        if let Some(else_stmts) = else_block {
            self.builder.switch_to_block(else_b);
            self.terminated = false;
            self.scopes.push();
            for stmt in else_stmts {
                self.lower_stmt(stmt)?;
            }
            self.scopes.pop();
            if !self.terminated {
                self.builder.ins().jump(merge_b, &[]);
            }
        }

        self.builder.switch_to_block(merge_b);
        self.terminated = false;
        Ok(())
    }

    fn lower_while(&mut self, cond: &Expr, body: &[Stmt]) -> CodegenResult<()> {
        let cond_b = self.builder.create_block();
        let body_b = self.builder.create_block();
        let after_b = self.builder.create_block();

        self.builder.ins().jump(cond_b, &[]);

        self.builder.switch_to_block(cond_b);
        self.terminated = false;
        let cond_value = self.lower_expr(cond)?;
        let cond_bool = self.truthy(&cond_value);
        self.builder.ins().brif(cond_bool, body_b, &[], after_b, &[]);

        self.builder.switch_to_block(body_b);
        self.terminated = false;
        self.loop_stack.push(LoopTargets { continue_block: cond_b, break_block: after_b });
        self.scopes.push();
        for stmt in body {
            self.lower_stmt(stmt)?;
        }
        self.scopes.pop();
        self.loop_stack.pop();
        if !self.terminated {
            self.builder.ins().jump(cond_b, &[]);
        }

        self.builder.switch_to_block(after_b);
        self.terminated = false;
        Ok(())
    }

    fn lower_for(
        &mut self,
        init: Option<&Stmt>,
        cond: Option<&Expr>,
        update: Option<&Stmt>,
        body: &[Stmt],
    ) -> CodegenResult<()> {
        // The induction variable lives in its own scope around the loop.
        self.scopes.push();
        if let Some(init) = init {
            self.lower_stmt(init)?;
        }

        let cond_b = self.builder.create_block();
        let body_b = self.builder.create_block();
        let update_b = self.builder.create_block();
        let after_b = self.builder.create_block();

        self.builder.ins().jump(cond_b, &[]);

        self.builder.switch_to_block(cond_b);
        self.terminated = false;
        match cond {
            Some(cond) => {
                let cond_value = self.lower_expr(cond)?;
                let cond_bool = self.truthy(&cond_value);
                self.builder.ins().brif(cond_bool, body_b, &[], after_b, &[]);
            }
            None => {
                self.builder.ins().jump(body_b, &[]);
            }
        }

        self.builder.switch_to_block(body_b);
        self.terminated = false;
        self.loop_stack.push(LoopTargets { continue_block: update_b, break_block: after_b });
        self.scopes.push();
        for stmt in body {
            self.lower_stmt(stmt)?;
        }
        self.scopes.pop();
        self.loop_stack.pop();
        if !self.terminated {
            self.builder.ins().jump(update_b, &[]);
        }

        self.builder.switch_to_block(update_b);
        self.terminated = false;
        if let Some(update) = update {
            self.lower_stmt(update)?;
        }
        self.builder.ins().jump(cond_b, &[]);

        self.builder.switch_to_block(after_b);
        self.terminated = false;
        self.scopes.pop();
        Ok(())
    }

    /// `for x in N` iterates an implicit i32 induction variable from 0 to
    /// N. Only integer upper bounds are supported.
    fn lower_for_in(
        &mut self,
        var: &str,
        var_ty: Option<&TypeDesc>,
        iterable: &Expr,
        body: &[Stmt],
    ) -> CodegenResult<()> {
        let bound = self.lower_expr(iterable)?;
        if !bound.ty.is_integer() {
            return Err(CodegenError::Unsupported(
                "for-in over a non-integer iterable".into(),
            ));
        }
        let i32_ty = TypeDesc::simple(TypeTag::I32);
        let bound_value = self.coerce(bound, &i32_ty)?;

        self.scopes.push();
        let induction_ty = var_ty.cloned().unwrap_or_else(|| i32_ty.clone());
        let induction = self.new_var();
        self.builder.declare_var(induction, types::I32);
        let zero = self.builder.ins().iconst(types::I32, 0);
        self.builder.def_var(induction, zero);
        self.scopes
            .declare(Symbol {
                name: var.to_string(),
                ty: induction_ty,
                var: induction,
                mutable: true,
                initialized: true,
                span: flast_ast::Span::new(0, 0),
            })
            .map_err(|_| CodegenError::Lowering(format!("duplicate declaration of '{}'", var)))?;

        let cond_b = self.builder.create_block();
        let body_b = self.builder.create_block();
        let update_b = self.builder.create_block();
        let after_b = self.builder.create_block();

        self.builder.ins().jump(cond_b, &[]);

        self.builder.switch_to_block(cond_b);
        self.terminated = false;
        let current = self.builder.use_var(induction);
        let in_range = self
            .builder
            .ins()
            .icmp(IntCC::SignedLessThan, current, bound_value);
        self.builder.ins().brif(in_range, body_b, &[], after_b, &[]);

        self.builder.switch_to_block(body_b);
        self.terminated = false;
        self.loop_stack.push(LoopTargets { continue_block: update_b, break_block: after_b });
        self.scopes.push();
        for stmt in body {
            self.lower_stmt(stmt)?;
        }
        self.scopes.pop();
        self.loop_stack.pop();
        if !self.terminated {
            self.builder.ins().jump(update_b, &[]);
        }

        self.builder.switch_to_block(update_b);
        self.terminated = false;
        let current = self.builder.use_var(induction);
        let next = self.builder.ins().iadd_imm(current, 1);
        self.builder.def_var(induction, next);
        self.builder.ins().jump(cond_b, &[]);

        self.builder.switch_to_block(after_b);
        self.terminated = false;
        self.scopes.pop();
        Ok(())
    }

    // =====================================================================
    // Expressions
    // =====================================================================

    fn lower_expr(&mut self, expr: &Expr) -> CodegenResult<TypedValue> {
        match &expr.kind {
            // Integer literals take the narrowest of i32/i64/f64 that
            // holds the value; scientific literals are always f64.
            ExprKind::Number { value, .. } => {
                let v = *value;
                if v.fract() == 0.0 && v >= i32::MIN as f64 && v <= i32::MAX as f64 {
                    let value = self.builder.ins().iconst(types::I32, v as i64);
                    Ok(TypedValue::new(value, TypeDesc::simple(TypeTag::I32)))
                } else if v.fract() == 0.0 && v >= i64::MIN as f64 && v <= i64::MAX as f64 {
                    let value = self.builder.ins().iconst(types::I64, v as i64);
                    Ok(TypedValue::new(value, TypeDesc::simple(TypeTag::I64)))
                } else {
                    let value = self.builder.ins().f64const(v);
                    Ok(TypedValue::new(value, TypeDesc::simple(TypeTag::F64)))
                }
            }
            ExprKind::Scientific { value, .. } => {
                let value = self.builder.ins().f64const(*value);
                Ok(TypedValue::new(value, TypeDesc::simple(TypeTag::F64)))
            }
            ExprKind::Str(s) => {
                let value = self.string_addr(s)?;
                Ok(TypedValue::new(value, TypeDesc::simple(TypeTag::Str)))
            }
            ExprKind::Char(c) => {
                let value = self.builder.ins().iconst(types::I32, *c as i64);
                Ok(TypedValue::new(value, TypeDesc::simple(TypeTag::Char)))
            }
            ExprKind::Bool(b) => {
                let value = self.builder.ins().iconst(types::I8, *b as i64);
                Ok(TypedValue::new(value, TypeDesc::simple(TypeTag::Bool)))
            }
            ExprKind::Null => {
                let value = self.builder.ins().iconst(types::I64, 0);
                let mut ty = TypeDesc::simple(TypeTag::Unknown);
                ty.is_pointer = true;
                Ok(TypedValue::new(value, ty))
            }
            ExprKind::Ident(name) => {
                let symbol = self
                    .scopes
                    .lookup(name)
                    .ok_or_else(|| {
                        CodegenError::Lowering(format!("undefined variable '{}'", name))
                    })?
                    .clone();
                let value = self.builder.use_var(symbol.var);
                Ok(TypedValue::new(value, symbol.ty))
            }
            ExprKind::SelfRef => {
                // A declared `self` parameter shadows the synthetic slot.
                if let Some(symbol) = self.scopes.lookup("self").cloned() {
                    let value = self.builder.use_var(symbol.var);
                    return Ok(TypedValue::new(value, symbol.ty));
                }
                let value = self.builder.use_var(self.self_var);
                Ok(TypedValue::new(value, TypeDesc::simple(TypeTag::SelfTy)))
            }
            ExprKind::Member { object, field, .. } => {
                let base = self.lower_expr(object)?;
                let layout = self.layout_for(&base.ty)?;
                let field_layout = layout
                    .field(field)
                    .ok_or_else(|| {
                        CodegenError::Lowering(format!(
                            "struct '{}' has no field '{}'",
                            layout.name, field
                        ))
                    })?
                    .clone();
                let value = self.builder.ins().load(
                    clif_type(&field_layout.ty)?,
                    MemFlags::new(),
                    base.value,
                    field_layout.offset as i32,
                );
                Ok(TypedValue::new(value, field_layout.ty))
            }
            ExprKind::Unary { op, operand, prefix } => {
                self.lower_unary(*op, operand, *prefix)
            }
            ExprKind::Binary { op, left, right } => {
                let lhs = self.lower_expr(left)?;
                let rhs = self.lower_expr(right)?;
                self.lower_binary_values(*op, lhs, rhs)
            }
            ExprKind::Assign { target, op, value } => self.lower_assign(target, *op, value),
            ExprKind::Ternary { cond, then_branch, else_branch } => {
                self.lower_ternary(cond, then_branch.as_deref(), else_branch)
            }
            ExprKind::Builtin { name, args } => self.lower_print(name, args),
            ExprKind::Call { func, args } => {
                let ExprKind::Ident(name) = &func.kind else {
                    return Err(CodegenError::Unsupported(
                        "indirect call through an expression".into(),
                    ));
                };
                self.lower_call(name, args)
            }
            ExprKind::MethodCall { object, method, args } => {
                self.lower_method_call(object, method, args)
            }
            ExprKind::New { class, args } => self.lower_new(class, args),
            ExprKind::Cast { expr, ty } => {
                let value = self.lower_expr(expr)?;
                let coerced = self.coerce(value, ty)?;
                Ok(TypedValue::new(coerced, ty.clone()))
            }
            ExprKind::Index { .. } => {
                Err(CodegenError::Unsupported("index expressions".into()))
            }
            ExprKind::List(_) | ExprKind::MapLit(_) | ExprKind::TupleLit(_) => {
                Err(CodegenError::Unsupported("collection literals".into()))
            }
            ExprKind::Lambda { .. } => Err(CodegenError::Unsupported("lambdas".into())),
        }
    }

    fn lower_unary(
        &mut self,
        op: UnaryOp,
        operand: &Expr,
        prefix: bool,
    ) -> CodegenResult<TypedValue> {
        match op {
            UnaryOp::Inc | UnaryOp::Dec => {
                let ExprKind::Ident(name) = &operand.kind else {
                    return Err(CodegenError::Lowering(
                        "'++'/'--' require a variable operand".into(),
                    ));
                };
                let symbol = self
                    .scopes
                    .lookup(name)
                    .ok_or_else(|| {
                        CodegenError::Lowering(format!("undefined variable '{}'", name))
                    })?
                    .clone();
                if !symbol.ty.is_integer() {
                    return Err(CodegenError::Unsupported(
                        "'++'/'--' on non-integer values".into(),
                    ));
                }
                let current = self.builder.use_var(symbol.var);
                let delta = if op == UnaryOp::Inc { 1 } else { -1 };
                let updated = self.builder.ins().iadd_imm(current, delta);
                self.builder.def_var(symbol.var, updated);
                let result = if prefix { updated } else { current };
                Ok(TypedValue::new(result, symbol.ty))
            }
            UnaryOp::Neg => {
                let operand = self.lower_expr(operand)?;
                let value = if operand.ty.is_float() {
                    self.builder.ins().fneg(operand.value)
                } else {
                    self.builder.ins().ineg(operand.value)
                };
                Ok(TypedValue::new(value, operand.ty))
            }
            UnaryOp::Pos => self.lower_expr(operand),
            UnaryOp::Not => {
                let operand = self.lower_expr(operand)?;
                let truth = self.truthy(&operand);
                let value = self.builder.ins().icmp_imm(IntCC::Equal, truth, 0);
                Ok(TypedValue::new(value, TypeDesc::simple(TypeTag::Bool)))
            }
            UnaryOp::BitNot => {
                let operand = self.lower_expr(operand)?;
                if !operand.ty.is_integer() {
                    return Err(CodegenError::Lowering(
                        "'~' requires an integer operand".into(),
                    ));
                }
                let value = self.builder.ins().bnot(operand.value);
                Ok(TypedValue::new(value, operand.ty))
            }
            UnaryOp::Ref | UnaryOp::Deref => Err(CodegenError::Unsupported(
                "reference and dereference operators".into(),
            )),
        }
    }

    /// Binary lowering: operand widths are normalized (sign-extending the
    /// narrower integer, promoting integer to float when mixed), then the
    /// signed or floating variant of the operation is chosen.
    fn lower_binary_values(
        &mut self,
        op: BinOp,
        lhs: TypedValue,
        rhs: TypedValue,
    ) -> CodegenResult<TypedValue> {
        match op {
            BinOp::And | BinOp::Or => {
                let l = self.truthy(&lhs);
                let r = self.truthy(&rhs);
                let value = if op == BinOp::And {
                    self.builder.ins().band(l, r)
                } else {
                    self.builder.ins().bor(l, r)
                };
                return Ok(TypedValue::new(value, TypeDesc::simple(TypeTag::Bool)));
            }
            BinOp::NullCoalesce => {
                let (l, r, ty) = self.normalize_pair(lhs.clone(), rhs)?;
                let cond = self.truthy(&lhs);
                let value = self.builder.ins().select(cond, l, r);
                return Ok(TypedValue::new(value, ty));
            }
            BinOp::Pow => {
                return Err(CodegenError::Unsupported("'**' lowering".into()));
            }
            _ => {}
        }

        let (l, r, ty) = self.normalize_pair(lhs, rhs)?;
        let is_float = ty.is_float();
        let signed = ty.is_signed() || !ty.is_integer();

        if op.is_comparison() {
            let value = if is_float {
                let cc = match op {
                    BinOp::Eq | BinOp::StrictEq => FloatCC::Equal,
                    BinOp::Ne | BinOp::StrictNe => FloatCC::NotEqual,
                    BinOp::Lt => FloatCC::LessThan,
                    BinOp::Gt => FloatCC::GreaterThan,
                    BinOp::Le => FloatCC::LessThanOrEqual,
                    _ => FloatCC::GreaterThanOrEqual,
                };
                self.builder.ins().fcmp(cc, l, r)
            } else {
                let cc = match (op, signed) {
                    (BinOp::Eq | BinOp::StrictEq, _) => IntCC::Equal,
                    (BinOp::Ne | BinOp::StrictNe, _) => IntCC::NotEqual,
                    (BinOp::Lt, true) => IntCC::SignedLessThan,
                    (BinOp::Lt, false) => IntCC::UnsignedLessThan,
                    (BinOp::Gt, true) => IntCC::SignedGreaterThan,
                    (BinOp::Gt, false) => IntCC::UnsignedGreaterThan,
                    (BinOp::Le, true) => IntCC::SignedLessThanOrEqual,
                    (BinOp::Le, false) => IntCC::UnsignedLessThanOrEqual,
                    (_, true) => IntCC::SignedGreaterThanOrEqual,
                    (_, false) => IntCC::UnsignedGreaterThanOrEqual,
                };
                self.builder.ins().icmp(cc, l, r)
            };
            return Ok(TypedValue::new(value, TypeDesc::simple(TypeTag::Bool)));
        }

        if op == BinOp::Compare {
            // <=> yields -1, 0, or 1 as i32.
            let (gt, lt) = if is_float {
                (
                    self.builder.ins().fcmp(FloatCC::GreaterThan, l, r),
                    self.builder.ins().fcmp(FloatCC::LessThan, l, r),
                )
            } else {
                let (cc_gt, cc_lt) = if signed {
                    (IntCC::SignedGreaterThan, IntCC::SignedLessThan)
                } else {
                    (IntCC::UnsignedGreaterThan, IntCC::UnsignedLessThan)
                };
                (
                    self.builder.ins().icmp(cc_gt, l, r),
                    self.builder.ins().icmp(cc_lt, l, r),
                )
            };
            let gt = self.builder.ins().uextend(types::I32, gt);
            let lt = self.builder.ins().uextend(types::I32, lt);
            let value = self.builder.ins().isub(gt, lt);
            return Ok(TypedValue::new(value, TypeDesc::simple(TypeTag::I32)));
        }

        let value = match op {
            BinOp::Add => {
                if is_float {
                    self.builder.ins().fadd(l, r)
                } else {
                    self.builder.ins().iadd(l, r)
                }
            }
            BinOp::Sub => {
                if is_float {
                    self.builder.ins().fsub(l, r)
                } else {
                    self.builder.ins().isub(l, r)
                }
            }
            BinOp::Mul => {
                if is_float {
                    self.builder.ins().fmul(l, r)
                } else {
                    self.builder.ins().imul(l, r)
                }
            }
            BinOp::Div => {
                if is_float {
                    self.builder.ins().fdiv(l, r)
                } else if signed {
                    self.builder.ins().sdiv(l, r)
                } else {
                    self.builder.ins().udiv(l, r)
                }
            }
            BinOp::Mod => {
                if is_float {
                    return Err(CodegenError::Unsupported("float remainder".into()));
                } else if signed {
                    self.builder.ins().srem(l, r)
                } else {
                    self.builder.ins().urem(l, r)
                }
            }
            BinOp::BitAnd => self.builder.ins().band(l, r),
            BinOp::BitOr => self.builder.ins().bor(l, r),
            BinOp::BitXor => self.builder.ins().bxor(l, r),
            BinOp::Shl => self.builder.ins().ishl(l, r),
            BinOp::Shr => {
                if signed {
                    self.builder.ins().sshr(l, r)
                } else {
                    self.builder.ins().ushr(l, r)
                }
            }
            BinOp::UShr => self.builder.ins().ushr(l, r),
            _ => unreachable!("handled above"),
        };
        Ok(TypedValue::new(value, ty))
    }

    fn lower_ternary(
        &mut self,
        cond: &Expr,
        then_branch: Option<&Expr>,
        else_branch: &Expr,
    ) -> CodegenResult<TypedValue> {
        let cond_value = self.lower_expr(cond)?;
        let cond_bool = self.truthy(&cond_value);

        // Elvis `a ?: b` reuses the evaluated condition as the result.
        if then_branch.is_none() {
            let else_value = self.lower_expr(else_branch)?;
            let (l, r, ty) = self.normalize_pair(cond_value, else_value)?;
            let value = self.builder.ins().select(cond_bool, l, r);
            return Ok(TypedValue::new(value, ty));
        }

        let then_b = self.builder.create_block();
        let else_b = self.builder.create_block();
        let merge_b = self.builder.create_block();
        self.builder.ins().brif(cond_bool, then_b, &[], else_b, &[]);

        self.builder.switch_to_block(then_b);
        let then_value = self.lower_expr(then_branch.unwrap())?;
        let result_ty = then_value.ty.clone();
        let clif = self.builder.func.dfg.value_type(then_value.value);
        self.builder.append_block_param(merge_b, clif);
        self.builder.ins().jump(merge_b, &[then_value.value]);

        self.builder.switch_to_block(else_b);
        let else_value = self.lower_expr(else_branch)?;
        let else_coerced = self.coerce(else_value, &result_ty)?;
        self.builder.ins().jump(merge_b, &[else_coerced]);

        self.builder.switch_to_block(merge_b);
        let value = self.builder.block_params(merge_b)[0];
        Ok(TypedValue::new(value, result_ty))
    }

    /// `print`/`println` synthesize a printf format string from the
    /// argument types and make one variadic call.
    fn lower_print(&mut self, name: &str, args: &[Expr]) -> CodegenResult<TypedValue> {
        let newline = name == "println";

        let mut types_for_format = Vec::with_capacity(args.len());
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            let lowered = self.lower_expr(arg)?;
            types_for_format.push(lowered.ty.clone());
            values.push(self.promote_vararg(lowered));
        }

        let format = builtins::format_string(&types_for_format, newline);
        let format_ptr = self.string_addr(&format)?;

        // printf is variadic: build the call-site signature and go through
        // call_indirect.
        let mut sig = self.module.make_signature();
        sig.params.push(AbiParam::new(types::I64));
        for &v in &values {
            sig.params.push(AbiParam::new(self.builder.func.dfg.value_type(v)));
        }
        sig.returns.push(AbiParam::new(types::I32));
        let sig_ref = self.builder.import_signature(sig);

        let printf = self.func_ref("printf")?;
        let callee = self.builder.ins().func_addr(types::I64, printf);

        let mut call_args = vec![format_ptr];
        call_args.extend(values);
        let call = self.builder.ins().call_indirect(sig_ref, callee, &call_args);
        let result = self.builder.inst_results(call)[0];
        Ok(TypedValue::new(result, TypeDesc::simple(TypeTag::I32)))
    }

    /// C variadic promotion: small integers widen to int, f32 to double.
    fn promote_vararg(&mut self, arg: TypedValue) -> Value {
        let clif = self.builder.func.dfg.value_type(arg.value);
        if clif == types::I8 || clif == types::I16 {
            if arg.ty.is_signed() {
                self.builder.ins().sextend(types::I32, arg.value)
            } else {
                self.builder.ins().uextend(types::I32, arg.value)
            }
        } else if clif == types::I128 {
            self.builder.ins().ireduce(types::I64, arg.value)
        } else if clif == types::F32 {
            self.builder.ins().fpromote(types::F64, arg.value)
        } else {
            arg.value
        }
    }

    /// Call a function by name: local and imported functions first, then
    /// nothing — built-ins are dispatched before this point.
    fn lower_call(&mut self, name: &str, args: &[Expr]) -> CodegenResult<TypedValue> {
        let Some(sig) = self.func_sigs.get(name).cloned() else {
            return Err(CodegenError::Lowering(format!("unknown function '{}'", name)));
        };

        if args.len() > sig.params.len() {
            return Err(CodegenError::Lowering(format!(
                "function '{}' expects {} argument(s), got {}",
                name,
                sig.params.len(),
                args.len()
            )));
        }

        let mut lowered = Vec::with_capacity(sig.params.len());
        for (i, param) in sig.params.iter().enumerate() {
            let value = match args.get(i) {
                Some(arg) => self.lower_expr(arg)?,
                // A defaulted parameter is optional; lower its default
                // expression at the call site.
                None => match &param.default {
                    Some(default) => self.lower_expr(default)?,
                    None => {
                        return Err(CodegenError::Lowering(format!(
                            "function '{}' expects {} argument(s), got {}",
                            name,
                            sig.params.len(),
                            args.len()
                        )))
                    }
                },
            };
            lowered.push(self.coerce(value, &param.ty)?);
        }

        let func = self.func_ref(name)?;
        let call = self.builder.ins().call(func, &lowered);
        let results = self.builder.inst_results(call);
        if sig.ret.is_void() {
            let unit = self.builder.ins().iconst(types::I64, 0);
            Ok(TypedValue::new(unit, TypeDesc::simple(TypeTag::Void)))
        } else {
            Ok(TypedValue::new(results[0], sig.ret))
        }
    }

    /// Method calls try the type-indexed built-in registry first, then
    /// fall through to a free function of the same name.
    fn lower_method_call(
        &mut self,
        object: &Expr,
        method: &str,
        args: &[Expr],
    ) -> CodegenResult<TypedValue> {
        let receiver = self.lower_expr(object)?;

        if let Some(builtin) = builtins::builtin_method(&receiver.ty, method) {
            return self.lower_builtin_method(builtin, receiver, args);
        }

        if self.func_sigs.contains_key(method) {
            return self.lower_call(method, args);
        }
        Err(CodegenError::Lowering(format!("unknown method '{}'", method)))
    }

    fn lower_builtin_method(
        &mut self,
        builtin: BuiltinMethod,
        receiver: TypedValue,
        args: &[Expr],
    ) -> CodegenResult<TypedValue> {
        match builtin {
            BuiltinMethod::StrLen => {
                let strlen = self.func_ref("strlen")?;
                let call = self.builder.ins().call(strlen, &[receiver.value]);
                let len = self.builder.inst_results(call)[0];
                Ok(TypedValue::new(len, TypeDesc::simple(TypeTag::I64)))
            }
            BuiltinMethod::StrContains => {
                let needle = args
                    .first()
                    .ok_or_else(|| {
                        CodegenError::Lowering("'contains' expects one argument".into())
                    })?;
                let needle = self.lower_expr(needle)?;
                let strstr = self.func_ref("strstr")?;
                let call = self
                    .builder
                    .ins()
                    .call(strstr, &[receiver.value, needle.value]);
                let found = self.builder.inst_results(call)[0];
                let value = self.builder.ins().icmp_imm(IntCC::NotEqual, found, 0);
                Ok(TypedValue::new(value, TypeDesc::simple(TypeTag::Bool)))
            }
            BuiltinMethod::StrToI32 => {
                let atoi = self.func_ref("atoi")?;
                let call = self.builder.ins().call(atoi, &[receiver.value]);
                let value = self.builder.inst_results(call)[0];
                Ok(TypedValue::new(value, TypeDesc::simple(TypeTag::I32)))
            }
            BuiltinMethod::StrToI64 => {
                let atoll = self.func_ref("atoll")?;
                let call = self.builder.ins().call(atoll, &[receiver.value]);
                let value = self.builder.inst_results(call)[0];
                Ok(TypedValue::new(value, TypeDesc::simple(TypeTag::I64)))
            }
            BuiltinMethod::StrToF32 => {
                let atof = self.func_ref("atof")?;
                let call = self.builder.ins().call(atof, &[receiver.value]);
                let wide = self.builder.inst_results(call)[0];
                let value = self.builder.ins().fdemote(types::F32, wide);
                Ok(TypedValue::new(value, TypeDesc::simple(TypeTag::F32)))
            }
            BuiltinMethod::StrToF64 => {
                let atof = self.func_ref("atof")?;
                let call = self.builder.ins().call(atof, &[receiver.value]);
                let value = self.builder.inst_results(call)[0];
                Ok(TypedValue::new(value, TypeDesc::simple(TypeTag::F64)))
            }
        }
    }

    /// `new ClassName(args)` allocates the struct's layout size through
    /// malloc. Arguments are evaluated but not threaded into the
    /// allocation.
    fn lower_new(&mut self, class: &str, args: &[Expr]) -> CodegenResult<TypedValue> {
        let size = self
            .struct_layouts
            .get(class)
            .ok_or_else(|| CodegenError::Lowering(format!("unknown class '{}'", class)))?
            .size;

        for arg in args {
            self.lower_expr(arg)?;
        }

        let malloc = self.func_ref("malloc")?;
        let size_value = self.builder.ins().iconst(types::I64, size as i64);
        let call = self.builder.ins().call(malloc, &[size_value]);
        let pointer = self.builder.inst_results(call)[0];

        let mut ty = TypeDesc::named(TypeTag::Struct, class);
        ty.is_pointer = true;
        Ok(TypedValue::new(pointer, ty))
    }

    // =====================================================================
    // Helpers
    // =====================================================================

    fn layout_for(&self, ty: &TypeDesc) -> CodegenResult<StructLayout> {
        let name = ty.name.as_deref().ok_or_else(|| {
            CodegenError::Lowering(format!("'{}' is not a struct type", ty))
        })?;
        self.struct_layouts
            .get(name)
            .cloned()
            .ok_or_else(|| CodegenError::Lowering(format!("unknown struct '{}'", name)))
    }

    fn func_ref(&mut self, name: &str) -> CodegenResult<FuncRef> {
        if let Some(&cached) = self.func_refs.get(name) {
            return Ok(cached);
        }
        let id = self
            .func_ids
            .get(name)
            .ok_or_else(|| CodegenError::Lowering(format!("unknown function '{}'", name)))?;
        let func_ref = self.module.declare_func_in_func(*id, self.builder.func);
        self.func_refs.insert(name.to_string(), func_ref);
        Ok(func_ref)
    }

    /// The address of an interned, null-terminated string constant.
    fn string_addr(&mut self, content: &str) -> CodegenResult<Value> {
        let data_id = match self.string_data.get(content) {
            Some(&id) => id,
            None => {
                let symbol = format!(".str.{}", *self.string_counter);
                *self.string_counter += 1;
                let id = self
                    .module
                    .declare_data(&symbol, Linkage::Local, false, false)
                    .map_err(|e| CodegenError::Cranelift(e.to_string()))?;
                let mut bytes = content.as_bytes().to_vec();
                bytes.push(0);
                let mut desc = DataDescription::new();
                desc.define(bytes.into_boxed_slice());
                self.module
                    .define_data(id, &desc)
                    .map_err(|e| CodegenError::Cranelift(e.to_string()))?;
                self.string_data.insert(content.to_string(), id);
                id
            }
        };

        let gv = match self.data_refs.get(content) {
            Some(&gv) => gv,
            None => {
                let gv = self.module.declare_data_in_func(data_id, self.builder.func);
                self.data_refs.insert(content.to_string(), gv);
                gv
            }
        };
        Ok(self.builder.ins().symbol_value(types::I64, gv))
    }

    /// Reduce a value to an i8 truth value: nonzero integers and floats
    /// are true.
    fn truthy(&mut self, value: &TypedValue) -> Value {
        let clif = self.builder.func.dfg.value_type(value.value);
        if clif.is_float() {
            let zero = if clif == types::F32 {
                self.builder.ins().f32const(0.0)
            } else {
                self.builder.ins().f64const(0.0)
            };
            self.builder.ins().fcmp(FloatCC::NotEqual, value.value, zero)
        } else if clif == types::I8 && value.ty.tag == TypeTag::Bool {
            value.value
        } else {
            self.builder.ins().icmp_imm(IntCC::NotEqual, value.value, 0)
        }
    }

    /// Bring two operands to a common type: the narrower integer is
    /// extended by its own signedness, and an integer mixed with a float
    /// is promoted to the float's type.
    fn normalize_pair(
        &mut self,
        lhs: TypedValue,
        rhs: TypedValue,
    ) -> CodegenResult<(Value, Value, TypeDesc)> {
        let l_clif = self.builder.func.dfg.value_type(lhs.value);
        let r_clif = self.builder.func.dfg.value_type(rhs.value);

        // Both floats: promote the narrower.
        if l_clif.is_float() && r_clif.is_float() {
            if l_clif == r_clif {
                return Ok((lhs.value, rhs.value, lhs.ty));
            }
            if l_clif == types::F32 {
                let l = self.builder.ins().fpromote(types::F64, lhs.value);
                return Ok((l, rhs.value, rhs.ty));
            }
            let r = self.builder.ins().fpromote(types::F64, rhs.value);
            return Ok((lhs.value, r, lhs.ty));
        }

        // Mixed int/float: the integer converts to the float's type.
        if l_clif.is_float() != r_clif.is_float() {
            let (float, int, float_first) = if l_clif.is_float() {
                (lhs.clone(), rhs.clone(), true)
            } else {
                (rhs.clone(), lhs.clone(), false)
            };
            let float_clif = self.builder.func.dfg.value_type(float.value);
            let converted = if int.ty.is_integer() && !int.ty.is_signed() {
                self.builder.ins().fcvt_from_uint(float_clif, int.value)
            } else {
                self.builder.ins().fcvt_from_sint(float_clif, int.value)
            };
            return if float_first {
                Ok((lhs.value, converted, float.ty))
            } else {
                Ok((converted, rhs.value, float.ty))
            };
        }

        // Both integer-shaped.
        if l_clif.is_int() && r_clif.is_int() {
            if l_clif == r_clif {
                return Ok((lhs.value, rhs.value, lhs.ty));
            }
            let (narrow, wide, wide_ty, narrow_first) = if l_clif.bits() < r_clif.bits() {
                (lhs.clone(), rhs.value, rhs.ty.clone(), true)
            } else {
                (rhs.clone(), lhs.value, lhs.ty.clone(), false)
            };
            let wide_clif = self.builder.func.dfg.value_type(wide);
            let extended = if narrow.ty.is_integer() && !narrow.ty.is_signed() {
                self.builder.ins().uextend(wide_clif, narrow.value)
            } else {
                self.builder.ins().sextend(wide_clif, narrow.value)
            };
            return if narrow_first {
                Ok((extended, wide, wide_ty))
            } else {
                Ok((wide, extended, wide_ty))
            };
        }

        Err(CodegenError::Lowering(format!(
            "incompatible operand types '{}' and '{}'",
            lhs.ty, rhs.ty
        )))
    }

    /// Convert a value into a target type's representation: extend or
    /// truncate integers, convert between int and float, promote or
    /// demote floats.
    fn coerce(&mut self, value: TypedValue, target: &TypeDesc) -> CodegenResult<Value> {
        let from = self.builder.func.dfg.value_type(value.value);
        let to = clif_type(target)?;

        if from == to {
            return Ok(value.value);
        }

        if from.is_int() && to.is_int() {
            return Ok(if to.bits() > from.bits() {
                if value.ty.is_integer() && !value.ty.is_signed() {
                    self.builder.ins().uextend(to, value.value)
                } else {
                    self.builder.ins().sextend(to, value.value)
                }
            } else {
                self.builder.ins().ireduce(to, value.value)
            });
        }

        if from.is_int() && to.is_float() {
            return Ok(if value.ty.is_integer() && !value.ty.is_signed() {
                self.builder.ins().fcvt_from_uint(to, value.value)
            } else {
                self.builder.ins().fcvt_from_sint(to, value.value)
            });
        }

        if from.is_float() && to.is_int() {
            return Ok(self.builder.ins().fcvt_to_sint(to, value.value));
        }

        if from.is_float() && to.is_float() {
            return Ok(if to.bits() > from.bits() {
                self.builder.ins().fpromote(to, value.value)
            } else {
                self.builder.ins().fdemote(to, value.value)
            });
        }

        Err(CodegenError::Lowering(format!(
            "invalid conversion from '{}' to '{}'",
            value.ty, target
        )))
    }
}
