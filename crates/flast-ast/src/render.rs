// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Canonical textual rendering of AST nodes.
//!
//! Every node renders back to parseable source. Binary, unary, ternary,
//! and cast expressions are fully parenthesized so the rendered form,
//! re-lexed and re-parsed, reproduces the same tree shape. `--ast` and
//! the parser round-trip tests both go through here.

use crate::decl::{Decl, DeclKind, FnDecl, Modifiers};
use crate::expr::{Expr, ExprKind};
use crate::stmt::{CatchClause, Pattern, Stmt, StmtKind};

const INDENT: &str = "    ";

fn escape_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\0' => out.push_str("\\0"),
            c => out.push(c),
        }
    }
    out
}

fn escape_char(c: char) -> String {
    match c {
        '\n' => "\\n".to_string(),
        '\t' => "\\t".to_string(),
        '\r' => "\\r".to_string(),
        '\\' => "\\\\".to_string(),
        '\'' => "\\'".to_string(),
        '\0' => "\\0".to_string(),
        c => c.to_string(),
    }
}

fn join_exprs(exprs: &[Expr]) -> String {
    exprs.iter().map(Expr::render).collect::<Vec<_>>().join(", ")
}

impl Expr {
    pub fn render(&self) -> String {
        match &self.kind {
            ExprKind::Number { text, .. } => text.clone(),
            ExprKind::Scientific { text, .. } => text.clone(),
            ExprKind::Str(s) => format!("\"{}\"", escape_str(s)),
            ExprKind::Char(c) => format!("'{}'", escape_char(*c)),
            ExprKind::Bool(b) => b.to_string(),
            ExprKind::Null => "null".to_string(),
            ExprKind::Ident(name) => name.clone(),
            ExprKind::SelfRef => "self".to_string(),
            ExprKind::Member { object, field, safe } => {
                let sep = if *safe { "?." } else { "." };
                format!("{}{}{}", object.render(), sep, field)
            }
            ExprKind::Index { object, index } => {
                format!("{}[{}]", object.render(), index.render())
            }
            ExprKind::MethodCall { object, method, args } => {
                format!("{}.{}({})", object.render(), method, join_exprs(args))
            }
            ExprKind::Builtin { name, args } => {
                format!("{}({})", name, join_exprs(args))
            }
            ExprKind::Call { func, args } => {
                format!("{}({})", func.render(), join_exprs(args))
            }
            ExprKind::Cast { expr, ty } => {
                format!("({} as {})", expr.render(), ty)
            }
            ExprKind::New { class, args } => {
                format!("new {}({})", class, join_exprs(args))
            }
            ExprKind::Unary { op, operand, prefix } => {
                if *prefix {
                    format!("({}{})", op.as_str(), operand.render())
                } else {
                    format!("({}{})", operand.render(), op.as_str())
                }
            }
            ExprKind::Binary { op, left, right } => {
                format!("({} {} {})", left.render(), op.as_str(), right.render())
            }
            ExprKind::Assign { target, op, value } => {
                let eq = match op {
                    Some(op) => format!("{}=", op.as_str()),
                    None => "=".to_string(),
                };
                format!("{} {} {}", target.render(), eq, value.render())
            }
            ExprKind::Ternary { cond, then_branch, else_branch } => match then_branch {
                Some(then_branch) => format!(
                    "({} ? {} : {})",
                    cond.render(),
                    then_branch.render(),
                    else_branch.render()
                ),
                None => format!("({} ?: {})", cond.render(), else_branch.render()),
            },
            ExprKind::List(items) => format!("[{}]", join_exprs(items)),
            ExprKind::MapLit(pairs) => {
                let body = pairs
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.render(), v.render()))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{{{}}}", body)
            }
            ExprKind::TupleLit(items) => format!("({})", join_exprs(items)),
            ExprKind::Lambda { params, body } => {
                let params = params
                    .iter()
                    .map(|p| match &p.ty {
                        Some(ty) => format!("{}: {}", p.name, ty),
                        None => p.name.clone(),
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("|{}| {}", params, body.render())
            }
        }
    }

    /// Is this expression a valid assignment target?
    pub fn is_lvalue(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Ident(_) | ExprKind::Member { .. } | ExprKind::Index { .. } | ExprKind::SelfRef
        )
    }
}

fn render_block(stmts: &[Stmt], depth: usize) -> String {
    let mut out = String::from("{\n");
    for stmt in stmts {
        out.push_str(&stmt.render_depth(depth + 1));
        out.push('\n');
    }
    out.push_str(&INDENT.repeat(depth));
    out.push('}');
    out
}

impl Stmt {
    pub fn render(&self) -> String {
        self.render_depth(0)
    }

    fn render_depth(&self, depth: usize) -> String {
        let pad = INDENT.repeat(depth);
        match &self.kind {
            StmtKind::Let { name, ty, init, mutable } => {
                let kw = if *mutable { "let" } else { "const" };
                let mut out = format!("{}{} {}", pad, kw, name);
                if let Some(ty) = ty {
                    out.push_str(&format!(": {}", ty));
                }
                if let Some(init) = init {
                    out.push_str(&format!(" = {}", init.render()));
                }
                out.push(';');
                out
            }
            StmtKind::Assign { target, op, value } => {
                let eq = match op {
                    Some(op) => format!("{}=", op.as_str()),
                    None => "=".to_string(),
                };
                format!("{}{} {} {};", pad, target.render(), eq, value.render())
            }
            StmtKind::Expr(expr) => format!("{}{};", pad, expr.render()),
            StmtKind::Return(value) => match value {
                Some(value) => format!("{}return {};", pad, value.render()),
                None => format!("{}return;", pad),
            },
            StmtKind::Block(stmts) => format!("{}{}", pad, render_block(stmts, depth)),
            StmtKind::If { cond, then_block, else_block } => {
                let mut out = format!("{}if {} {}", pad, cond.render(), render_block(then_block, depth));
                if let Some(else_block) = else_block {
                    // Render `else if` chains flat.
                    if let [only] = else_block.as_slice() {
                        if matches!(only.kind, StmtKind::If { .. }) {
                            out.push_str(" else ");
                            out.push_str(only.render_depth(depth).trim_start());
                            return out;
                        }
                    }
                    out.push_str(&format!(" else {}", render_block(else_block, depth)));
                }
                out
            }
            StmtKind::While { cond, body } => {
                format!("{}while {} {}", pad, cond.render(), render_block(body, depth))
            }
            StmtKind::For { init, cond, update, body } => {
                let init = init
                    .as_ref()
                    .map(|s| s.render_depth(0).trim_end_matches(';').to_string())
                    .unwrap_or_default();
                let cond = cond.as_ref().map(Expr::render).unwrap_or_default();
                let update = update
                    .as_ref()
                    .map(|s| s.render_depth(0).trim_end_matches(';').to_string())
                    .unwrap_or_default();
                format!(
                    "{}for {}; {}; {} {}",
                    pad,
                    init,
                    cond,
                    update,
                    render_block(body, depth)
                )
            }
            StmtKind::ForIn { var, var_ty, iterable, body } => {
                let ty = var_ty
                    .as_ref()
                    .map(|t| format!(": {}", t))
                    .unwrap_or_default();
                format!(
                    "{}for let {}{} in {} {}",
                    pad,
                    var,
                    ty,
                    iterable.render(),
                    render_block(body, depth)
                )
            }
            StmtKind::Match { scrutinee, arms } => {
                let mut out = format!("{}match {} {{\n", pad, scrutinee.render());
                for arm in arms {
                    out.push_str(&format!(
                        "{}{} => {}\n",
                        INDENT.repeat(depth + 1),
                        arm.pattern.render(),
                        render_block(&arm.body, depth + 1)
                    ));
                }
                out.push_str(&pad);
                out.push('}');
                out
            }
            StmtKind::Break => format!("{}break;", pad),
            StmtKind::Continue => format!("{}continue;", pad),
            StmtKind::Try { body, catch, finally } => {
                let mut out = format!("{}try {}", pad, render_block(body, depth));
                if let Some(CatchClause { binding, body }) = catch {
                    match binding {
                        Some(name) => out.push_str(&format!(" catch ({}) ", name)),
                        None => out.push_str(" catch "),
                    }
                    out.push_str(&render_block(body, depth));
                }
                if let Some(finally) = finally {
                    out.push_str(&format!(" finally {}", render_block(finally, depth)));
                }
                out
            }
            StmtKind::Throw(expr) => format!("{}throw {};", pad, expr.render()),
        }
    }
}

impl Pattern {
    pub fn render(&self) -> String {
        match self {
            Pattern::Wildcard => "_".to_string(),
            Pattern::Ident(name) => name.clone(),
            Pattern::Literal(expr) => expr.render(),
            Pattern::Constructor { path, fields } => {
                let head = path.join(".");
                if fields.is_empty() {
                    head
                } else {
                    let fields = fields
                        .iter()
                        .map(Pattern::render)
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!("{}({})", head, fields)
                }
            }
        }
    }
}

fn render_modifiers(m: &Modifiers) -> String {
    let mut out = String::new();
    if m.is_pub {
        out.push_str("pub ");
    }
    if m.is_static {
        out.push_str("static ");
    }
    if m.is_const {
        out.push_str("const ");
    }
    if m.is_unsafe {
        out.push_str("unsafe ");
    }
    if m.is_async {
        out.push_str("async ");
    }
    out
}

fn render_fn(f: &FnDecl, depth: usize) -> String {
    let pad = INDENT.repeat(depth);
    let mut out = format!("{}{}", pad, render_modifiers(&f.modifiers));
    if let Some(abi) = &f.abi {
        out.push_str(&format!("extern \"{}\" ", abi));
    }
    out.push_str(&format!("func {}(", f.name));
    let params = f
        .params
        .iter()
        .map(|p| {
            let mut s = format!("{}: {}", p.name, p.ty);
            if let Some(default) = &p.default {
                s.push_str(&format!(" = {}", default.render()));
            }
            s
        })
        .collect::<Vec<_>>()
        .join(", ");
    out.push_str(&params);
    out.push(')');
    if let Some(ret) = &f.ret_ty {
        out.push_str(&format!(" -> {}", ret));
    }
    match &f.body {
        Some(body) => {
            out.push(' ');
            out.push_str(&render_block(body, depth));
        }
        None => out.push(';'),
    }
    out
}

impl Decl {
    pub fn render(&self) -> String {
        self.render_depth(0)
    }

    fn render_depth(&self, depth: usize) -> String {
        let pad = INDENT.repeat(depth);
        match &self.kind {
            DeclKind::Function(f) => render_fn(f, depth),
            DeclKind::Struct(s) => {
                let mut out = format!("{}{}struct {} {{\n", pad, render_modifiers(&s.modifiers), s.name);
                for field in &s.fields {
                    let vis = if field.is_pub { "pub " } else { "" };
                    out.push_str(&format!(
                        "{}{}{}: {},\n",
                        INDENT.repeat(depth + 1),
                        vis,
                        field.name,
                        field.ty
                    ));
                }
                out.push_str(&pad);
                out.push('}');
                out
            }
            DeclKind::Enum(e) => {
                let mut out = format!("{}{}enum {} {{\n", pad, render_modifiers(&e.modifiers), e.name);
                for variant in &e.variants {
                    let inner = INDENT.repeat(depth + 1);
                    if variant.payload.is_empty() {
                        out.push_str(&format!("{}{},\n", inner, variant.name));
                    } else {
                        let payload = variant
                            .payload
                            .iter()
                            .map(|t| t.to_string())
                            .collect::<Vec<_>>()
                            .join(", ");
                        out.push_str(&format!("{}{}({}),\n", inner, variant.name, payload));
                    }
                }
                out.push_str(&pad);
                out.push('}');
                out
            }
            DeclKind::Trait(t) => {
                let mut out = format!("{}{}trait {} {{\n", pad, render_modifiers(&t.modifiers), t.name);
                for method in &t.methods {
                    out.push_str(&render_fn(method, depth + 1));
                    out.push('\n');
                }
                out.push_str(&pad);
                out.push('}');
                out
            }
            DeclKind::Impl(i) => {
                let head = match &i.trait_name {
                    Some(trait_name) => format!("impl {} for {}", trait_name, i.target),
                    None => format!("impl {}", i.target),
                };
                let mut out = format!("{}{} {{\n", pad, head);
                for method in &i.methods {
                    out.push_str(&render_fn(method, depth + 1));
                    out.push('\n');
                }
                out.push_str(&pad);
                out.push('}');
                out
            }
            DeclKind::Import(i) => {
                let mut out = format!("{}import ", pad);
                if i.wildcard {
                    out.push_str(&format!("* from \"{}\"", i.path));
                } else if i.names.len() == 1 {
                    out.push_str(&format!("{} from \"{}\"", i.names[0], i.path));
                } else if !i.names.is_empty() {
                    out.push_str(&format!("{{ {} }} from \"{}\"", i.names.join(", "), i.path));
                } else {
                    out.push_str(&format!("\"{}\"", i.path));
                }
                if let Some(alias) = &i.alias {
                    out.push_str(&format!(" as {}", alias));
                }
                out.push(';');
                out
            }
            DeclKind::Module(m) => {
                let mut out = format!("{}mod {} {{\n", pad, m.name);
                for decl in &m.decls {
                    out.push_str(&decl.render_depth(depth + 1));
                    out.push('\n');
                }
                out.push_str(&pad);
                out.push('}');
                out
            }
        }
    }
}
