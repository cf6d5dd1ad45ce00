//! Lowering of a single function body into basic blocks.
//!
//! Every `lower_*` method takes the block new instructions go into and
//! returns the block that follows. Statements return `None` once control has
//! left the block (`return`, `break`, `continue`); expressions always return
//! a block together with the operand holding their result.

use std::collections::HashMap;

use tracing::{trace, warn};

use crate::ast::{
    AssignTarget, AstBlock, AstExpr, AstExprKind, AstFunction, AstFunctionBody, AstStmt,
    BinaryOp, Ident, Span, UnaryOp,
};
use crate::error::LowerError;
use crate::ir::block::{BasicBlock, BlockId};
use crate::ir::function::{Function, Receiver, RequiredParam, RestParam, ScopeEntry};
use crate::ir::instr::{
    AccessKind, BinaryOpKind, CallInfo, Instr, NonTerminatorOp, TerminatorOp, UnaryOpKind,
};
use crate::ir::meta::ConstValue;
use crate::ir::operand::{GlobalRef, Operand, VarId, VarKind, VarRange, VarScope, VariableDcl};
use crate::ir::types::{BType, InvokableType, TypeBody, TypeId, TypeTable, TypeTag};
use crate::lower::{const_value, ModuleCtx};

/// Lowers one function against the module tables.
pub(super) fn lower_function(
    module: &ModuleCtx,
    types: &mut TypeTable,
    ast: &AstFunction,
) -> Result<Function, LowerError> {
    let fn_ty = types.intern(BType::new(
        TypeTag::Invokable,
        TypeBody::Invokable(Some(InvokableType {
            params: ast.params.iter().map(|p| p.ty).collect(),
            rest: ast.rest_param.as_ref().map(|p| p.ty),
            ret: ast.return_type,
            symbol: None,
        })),
    ));

    let mut func = Function::new(ast.name.name.clone(), fn_ty);
    func.pos = module.position(ast.name.span);
    func.flags = ast.flags;

    let mut lowerer = Lowerer {
        module,
        types,
        func,
        scopes: Vec::new(),
        loop_stack: Vec::new(),
    };
    lowerer.lower_signature(ast);

    let AstFunctionBody::Block(body) = &ast.body else {
        return Err(lowerer.unsupported("expression-bodied function", ast.name.span));
    };

    let entry = lowerer.func.add_block();
    let end = lowerer.lower_stmts(&body.stmts, entry)?;
    // Implicit return at the end of the body.
    if let Flow::Open(bb) = end {
        lowerer.terminate(bb, TerminatorOp::Return, body.span);
    }
    lowerer.close_scope(end.last_block().unwrap_or(entry));

    Ok(lowerer.func)
}

/// Where control stands after a statement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Flow {
    /// Later statements append to this block.
    Open(BlockId),
    /// This block ends in `return`. An enclosing `if` still routes it to its
    /// merge block, which then carries the return.
    Returned(BlockId),
    /// The block jumped to a loop target.
    Jumped,
}

impl Flow {
    fn last_block(self) -> Option<BlockId> {
        match self {
            Flow::Open(bb) | Flow::Returned(bb) => Some(bb),
            Flow::Jumped => None,
        }
    }
}

/// One lexical block.
struct LexicalScope {
    id: i32,
    names: HashMap<String, VarId>,
    /// LOCAL variables declared directly in this scope.
    locals: Vec<VarId>,
}

/// Targets of `break` and `continue` in the innermost loop.
#[derive(Clone, Copy)]
struct LoopFrame {
    on_break: BlockId,
    on_continue: BlockId,
}

struct Lowerer<'a> {
    module: &'a ModuleCtx,
    types: &'a mut TypeTable,
    func: Function,
    /// Lexical scopes, innermost last.
    scopes: Vec<LexicalScope>,
    loop_stack: Vec<LoopFrame>,
}

impl Lowerer<'_> {
    // ── variables, blocks and scopes ────────────────────────────────────────

    /// Return variable first, then arguments in declaration order.
    fn lower_signature(&mut self, ast: &AstFunction) {
        let ret = self
            .func
            .add_var(VariableDcl::new("%0", VarKind::Return, Some(ast.return_type)));
        self.func.return_var = Some(ret);

        // The function scope also holds the parameters.
        self.open_scope();
        for p in &ast.params {
            self.declare(&p.name, VarKind::Arg, p.ty, None);
            self.func.required_params.push(RequiredParam {
                name: p.name.name.clone(),
                flags: 0,
                annotations: Vec::new(),
            });
        }
        if let Some(rest) = &ast.rest_param {
            self.declare(&rest.name, VarKind::Arg, rest.ty, None);
            self.func.rest_param = Some(RestParam {
                name: rest.name.name.clone(),
                annotations: Vec::new(),
            });
        }
        self.func.args_count = (ast.params.len() + usize::from(ast.rest_param.is_some())) as i32;

        if let Some(ty) = ast.receiver {
            let name = Ident::new("self", ast.name.span);
            self.declare(&name, VarKind::SelfRef, ty, None);
            self.func.receiver = Some(Receiver {
                kind: VarKind::SelfRef,
                ty,
                name: name.name,
            });
        }
    }

    /// Adds a named variable to the innermost scope.
    ///
    /// A name already used in this function gets a `$k` suffix, `k` being the
    /// variable's index; the source name is kept as the meta-variable name.
    fn declare(&mut self, name: &Ident, kind: VarKind, ty: TypeId, at: Option<BlockId>) -> VarId {
        let index = self.func.local_vars().len();
        let unique = if self.func.var_by_name(&name.name).is_some() {
            format!("{}${}", name.name, index)
        } else {
            name.name.clone()
        };
        let mut var = VariableDcl::new(unique, kind, Some(ty));
        if matches!(kind, VarKind::Arg | VarKind::Local) {
            var.meta_var_name = Some(name.name.clone());
        }
        if let Some(bb) = at {
            let ins_offset = self.block(bb).instructions.len() as i32;
            var.range = Some(VarRange {
                start: bb,
                end: bb,
                ins_offset,
            });
        }
        let id = self.func.add_var(var);
        if let Some(scope) = self.scopes.last_mut() {
            scope.names.insert(name.name.clone(), id);
            if kind == VarKind::Local {
                scope.locals.push(id);
            }
        }
        id
    }

    /// A compiler temporary named after its slot (`%1`, `%2`, ...).
    fn temp(&mut self, ty: Option<TypeId>) -> VarId {
        let name = format!("%{}", self.func.local_vars().len());
        self.func.add_var(VariableDcl::new(name, VarKind::Temp, ty))
    }

    fn open_scope(&mut self) {
        let id = self.func.scopes.len() as i32;
        self.func.scopes.push(ScopeEntry {
            id,
            ins_offset: self.func.instruction_count() as i32,
            parent: self.scopes.last().map(|s| s.id),
        });
        self.scopes.push(LexicalScope {
            id,
            names: HashMap::new(),
            locals: Vec::new(),
        });
    }

    /// Pops the innermost scope; its locals live until `end`.
    fn close_scope(&mut self, end: BlockId) {
        let Some(scope) = self.scopes.pop() else {
            return;
        };
        for id in scope.locals {
            if let Some(range) = self.func.local_vars[id.0 as usize].range.as_mut() {
                range.end = end;
            }
        }
    }

    fn lookup(&self, name: &str) -> Option<VarId> {
        self.scopes
            .iter()
            .rev()
            .find_map(|s| s.names.get(name).copied())
    }

    fn block(&mut self, bb: BlockId) -> &mut BasicBlock {
        // Block ids are only handed out by `add_block` on this function.
        &mut self.func.blocks[bb.0 as usize]
    }

    fn emit(&mut self, bb: BlockId, op: NonTerminatorOp, span: Span) {
        let pos = self.module.position(span);
        self.block(bb).instructions.push(Instr::new(pos, op));
    }

    fn terminate(&mut self, bb: BlockId, op: TerminatorOp, span: Span) {
        let pos = self.module.position(span);
        let block = self.block(bb);
        trace!(block = %block.name, kind = op.kind().name(), "sealed block");
        block.terminator = Some(Instr::new(pos, op));
    }

    fn goto(&mut self, bb: BlockId, target: BlockId, span: Span) {
        self.terminate(bb, TerminatorOp::Goto { target }, span);
    }

    fn unsupported(&self, kind: &'static str, span: Span) -> LowerError {
        LowerError::UnsupportedConstruct {
            kind,
            func: self.func.name.clone(),
            line: span.line,
        }
    }

    fn unresolved(&self, name: &str, span: Span) -> LowerError {
        LowerError::UnresolvedReference {
            name: name.to_string(),
            func: self.func.name.clone(),
            line: span.line,
        }
    }

    // ── statements ──────────────────────────────────────────────────────────

    fn lower_stmts(&mut self, stmts: &[AstStmt], bb: BlockId) -> Result<Flow, LowerError> {
        let mut current = Flow::Open(bb);
        for (i, stmt) in stmts.iter().enumerate() {
            let Flow::Open(bb) = current else {
                warn!(
                    function = %self.func.name,
                    line = stmt.span().line,
                    skipped = stmts.len() - i,
                    "unreachable statements after return, break or continue"
                );
                break;
            };
            current = self.lower_stmt(stmt, bb)?;
        }
        Ok(current)
    }

    /// Lowers a `{ ... }` block in its own lexical scope.
    fn lower_block(&mut self, block: &AstBlock, bb: BlockId) -> Result<Flow, LowerError> {
        self.open_scope();
        let end = self.lower_stmts(&block.stmts, bb)?;
        self.close_scope(end.last_block().unwrap_or(bb));
        Ok(end)
    }

    fn lower_stmt(&mut self, stmt: &AstStmt, bb: BlockId) -> Result<Flow, LowerError> {
        match stmt {
            AstStmt::Expr(expr) => {
                // The result operand, if any, is dropped.
                let (_, bb) = self.lower_expr(expr, bb)?;
                Ok(Flow::Open(bb))
            }
            AstStmt::If {
                cond,
                then_block,
                else_branch,
                span,
            } => self.lower_if(cond, then_block, else_branch.as_deref(), *span, bb),
            AstStmt::Block(block) => self.lower_block(block, bb),
            AstStmt::Return { value, span } => {
                let mut bb = bb;
                if let Some(value) = value {
                    let (result, next) = self.lower_expr(value, bb)?;
                    bb = next;
                    if let Some(ret) = self.func.return_var {
                        self.emit(
                            bb,
                            NonTerminatorOp::Move {
                                lhs: Operand::Var(ret),
                                rhs: result,
                            },
                            *span,
                        );
                    }
                }
                self.terminate(bb, TerminatorOp::Return, *span);
                Ok(Flow::Returned(bb))
            }
            AstStmt::VarDef {
                name,
                ty,
                init,
                span,
            } => match init {
                Some(init) => {
                    let (value, bb) = self.lower_expr(init, bb)?;
                    let var = self.declare(name, VarKind::Local, *ty, Some(bb));
                    self.emit(
                        bb,
                        NonTerminatorOp::Move {
                            lhs: Operand::Var(var),
                            rhs: value,
                        },
                        *span,
                    );
                    Ok(Flow::Open(bb))
                }
                None => {
                    self.declare(name, VarKind::Local, *ty, Some(bb));
                    Ok(Flow::Open(bb))
                }
            },
            AstStmt::Assign {
                target,
                value,
                span,
            } => self.lower_assign(target, value, *span, bb),
            AstStmt::CompoundAssign {
                target,
                op,
                value,
                ty,
                span,
            } => {
                let current = AstExpr::var(target.name.clone(), *ty, target.span);
                let (result, bb) = self.lower_binary(*op, &current, value, *ty, *span, bb)?;
                let lhs = self.assignable(target)?;
                self.emit(bb, NonTerminatorOp::Move { lhs, rhs: result }, *span);
                Ok(Flow::Open(bb))
            }
            AstStmt::While { cond, body, span } => self.lower_while(cond, body, *span, bb),
            AstStmt::Break { span } => {
                let frame = self
                    .loop_stack
                    .last()
                    .copied()
                    .ok_or_else(|| self.unsupported("break outside of a loop", *span))?;
                self.goto(bb, frame.on_break, *span);
                Ok(Flow::Jumped)
            }
            AstStmt::Continue { span } => {
                let frame = self
                    .loop_stack
                    .last()
                    .copied()
                    .ok_or_else(|| self.unsupported("continue outside of a loop", *span))?;
                self.goto(bb, frame.on_continue, *span);
                Ok(Flow::Jumped)
            }
            AstStmt::Foreach { span, .. } => Err(self.unsupported(stmt.kind_name(), *span)),
        }
    }

    /// Both arms converge on a single merge block, allocated after them. An arm
    /// ending in `return` jumps there too, with the return variable already set.
    fn lower_if(
        &mut self,
        cond: &AstExpr,
        then_block: &AstBlock,
        else_branch: Option<&AstStmt>,
        span: Span,
        bb: BlockId,
    ) -> Result<Flow, LowerError> {
        let (cond, bb) = self.lower_expr(cond, bb)?;
        let then_bb = self.func.add_block();
        let then_end = self.lower_block(then_block, then_bb)?;

        let (merge, else_end) = match else_branch {
            Some(else_stmt) => {
                let else_bb = self.func.add_block();
                self.terminate(
                    bb,
                    TerminatorOp::Branch {
                        cond,
                        on_true: then_bb,
                        on_false: else_bb,
                    },
                    span,
                );
                let else_end = self.lower_stmt(else_stmt, else_bb)?;
                (self.func.add_block(), Some(else_end))
            }
            None => {
                let merge = self.func.add_block();
                self.terminate(
                    bb,
                    TerminatorOp::Branch {
                        cond,
                        on_true: then_bb,
                        on_false: merge,
                    },
                    span,
                );
                (merge, None)
            }
        };

        for end in else_end.into_iter().chain([then_end]) {
            if let Flow::Open(last) | Flow::Returned(last) = end {
                self.goto(last, merge, span);
            }
        }
        if let (Flow::Returned(_), Some(Flow::Returned(_))) = (then_end, else_end) {
            self.terminate(merge, TerminatorOp::Return, span);
            return Ok(Flow::Returned(merge));
        }
        Ok(Flow::Open(merge))
    }

    fn lower_while(
        &mut self,
        cond: &AstExpr,
        body: &AstBlock,
        span: Span,
        bb: BlockId,
    ) -> Result<Flow, LowerError> {
        let head = self.func.add_block();
        self.goto(bb, head, span);
        let (cond, cond_end) = self.lower_expr(cond, head)?;

        let body_bb = self.func.add_block();
        let end = self.func.add_block();
        self.terminate(
            cond_end,
            TerminatorOp::Branch {
                cond,
                on_true: body_bb,
                on_false: end,
            },
            span,
        );

        self.loop_stack.push(LoopFrame {
            on_break: end,
            on_continue: head,
        });
        let body_end = self.lower_block(body, body_bb);
        self.loop_stack.pop();
        // Falls through back to the condition.
        if let Flow::Open(last) = body_end? {
            self.goto(last, head, span);
        }
        Ok(Flow::Open(end))
    }

    fn lower_assign(
        &mut self,
        target: &AssignTarget,
        value: &AstExpr,
        span: Span,
        bb: BlockId,
    ) -> Result<Flow, LowerError> {
        let (value, bb) = self.lower_expr(value, bb)?;
        match target {
            AssignTarget::Var(name) => {
                let lhs = self.assignable(name)?;
                self.emit(bb, NonTerminatorOp::Move { lhs, rhs: value }, span);
                Ok(Flow::Open(bb))
            }
            AssignTarget::Wildcard => {
                let discard = self.temp(None);
                self.emit(
                    bb,
                    NonTerminatorOp::Move {
                        lhs: Operand::Var(discard),
                        rhs: value,
                    },
                    span,
                );
                Ok(Flow::Open(bb))
            }
            AssignTarget::Index { container, index } => {
                let (container, bb) = self.lower_expr(container, bb)?;
                let (index, bb) = self.lower_expr(index, bb)?;
                self.emit(
                    bb,
                    NonTerminatorOp::FieldAccess {
                        kind: AccessKind::ArrayStore,
                        lhs: container,
                        key: index,
                        rhs: value,
                        is_optional: false,
                        is_filling_read: false,
                    },
                    span,
                );
                Ok(Flow::Open(bb))
            }
        }
    }

    /// Operand a plain assignment to `name` writes: a local, else a global.
    fn assignable(&mut self, name: &Ident) -> Result<Operand, LowerError> {
        if let Some(id) = self.lookup(&name.name) {
            return Ok(Operand::Var(id));
        }
        if let Some(&ty) = self.module.globals.get(&name.name) {
            return Ok(self.global(&name.name, ty));
        }
        if self.module.constants.contains_key(&name.name) {
            return Err(self.unsupported("assignment to a constant", name.span));
        }
        Err(self.unresolved(&name.name, name.span))
    }

    fn global(&mut self, name: &str, ty: TypeId) -> Operand {
        if !self.func.dependent_globals.iter().any(|g| g == name) {
            self.func.dependent_globals.push(name.to_string());
        }
        Operand::Global(GlobalRef {
            kind: VarKind::Global,
            scope: VarScope::Global,
            name: name.to_string(),
            pkg: self.module.pkg.clone(),
            ty: Some(ty),
        })
    }

    // ── expressions ─────────────────────────────────────────────────────────

    fn lower_expr(&mut self, expr: &AstExpr, bb: BlockId) -> Result<(Operand, BlockId), LowerError> {
        let span = expr.span;
        match &expr.kind {
            AstExprKind::Literal(lit) => {
                let ty = self.types.basic(lit.type_tag());
                let result = self.temp(Some(ty));
                self.emit(
                    bb,
                    NonTerminatorOp::ConstLoad {
                        ty,
                        lhs: Operand::Var(result),
                        value: const_value(lit),
                    },
                    span,
                );
                Ok((Operand::Var(result), bb))
            }
            AstExprKind::VarRef(name) => self.lower_var_ref(name, span, bb),
            AstExprKind::Binary { op, lhs, rhs } => self.lower_binary(*op, lhs, rhs, expr.ty, span, bb),
            AstExprKind::Unary { op, operand } => {
                let op = match op {
                    UnaryOp::Not => UnaryOpKind::Not,
                    UnaryOp::Negate => UnaryOpKind::Negate,
                    UnaryOp::Typeof => UnaryOpKind::Typeof,
                    UnaryOp::Complement => return Err(self.unsupported(expr.kind_name(), span)),
                };
                let (operand, bb) = self.lower_expr(operand, bb)?;
                let result = self.temp(Some(expr.ty));
                self.emit(
                    bb,
                    NonTerminatorOp::UnaryOp {
                        op,
                        lhs: Operand::Var(result),
                        rhs: operand,
                    },
                    span,
                );
                Ok((Operand::Var(result), bb))
            }
            AstExprKind::Group(inner) => self.lower_expr(inner, bb),
            AstExprKind::Invocation {
                pkg_alias,
                name,
                args,
            } => {
                let pkg = match pkg_alias {
                    Some(alias) => self
                        .module
                        .aliases
                        .get(alias)
                        .cloned()
                        .ok_or_else(|| self.unresolved(&format!("{}:{}", alias, name), span))?,
                    None => self.module.pkg.clone(),
                };
                let mut bb = bb;
                let mut operands = Vec::with_capacity(args.len());
                for arg in args {
                    let (op, next) = self.lower_expr(arg, bb)?;
                    operands.push(op);
                    bb = next;
                }
                let then = self.func.add_block();
                let result = self.temp(Some(expr.ty));
                self.terminate(
                    bb,
                    TerminatorOp::Call {
                        call: CallInfo {
                            is_virtual: false,
                            pkg,
                            name: name.clone(),
                            args: operands,
                            lhs: Some(Operand::Var(result)),
                        },
                        then,
                    },
                    span,
                );
                Ok((Operand::Var(result), then))
            }
            AstExprKind::List(members) => {
                let mut bb = bb;
                let mut values = Vec::with_capacity(members.len());
                for member in members {
                    let (op, next) = self.lower_expr(member, bb)?;
                    values.push(op);
                    bb = next;
                }
                let int = self.types.basic(TypeTag::Int);
                let size = self.temp(Some(int));
                self.emit(
                    bb,
                    NonTerminatorOp::ConstLoad {
                        ty: int,
                        lhs: Operand::Var(size),
                        value: ConstValue::Int(members.len() as i64),
                    },
                    span,
                );
                let result = self.temp(Some(expr.ty));
                self.emit(
                    bb,
                    NonTerminatorOp::NewArray {
                        ty: expr.ty,
                        lhs: Operand::Var(result),
                        typedesc: None,
                        element_typedesc: None,
                        size: Operand::Var(size),
                        values,
                    },
                    span,
                );
                Ok((Operand::Var(result), bb))
            }
            AstExprKind::Index { container, index } => {
                let result = self.temp(Some(expr.ty));
                let (key, bb) = self.lower_expr(index, bb)?;
                let (container, bb) = self.lower_expr(container, bb)?;
                self.emit(
                    bb,
                    NonTerminatorOp::FieldAccess {
                        kind: AccessKind::ArrayLoad,
                        lhs: Operand::Var(result),
                        key,
                        rhs: container,
                        is_optional: false,
                        is_filling_read: false,
                    },
                    span,
                );
                Ok((Operand::Var(result), bb))
            }
            AstExprKind::TypeConversion(inner) => {
                let (operand, bb) = self.lower_expr(inner, bb)?;
                let result = self.temp(Some(expr.ty));
                self.emit(
                    bb,
                    NonTerminatorOp::TypeCast {
                        lhs: Operand::Var(result),
                        rhs: operand,
                        ty: expr.ty,
                        check_types: true,
                    },
                    span,
                );
                Ok((Operand::Var(result), bb))
            }
            AstExprKind::TypeTest { expr: inner, tested } => {
                let (operand, bb) = self.lower_expr(inner, bb)?;
                let result = self.temp(Some(expr.ty));
                self.emit(
                    bb,
                    NonTerminatorOp::TypeTest {
                        ty: *tested,
                        lhs: Operand::Var(result),
                        rhs: operand,
                    },
                    span,
                );
                Ok((Operand::Var(result), bb))
            }
            AstExprKind::Conditional { .. } | AstExprKind::Check(_) => {
                Err(self.unsupported(expr.kind_name(), span))
            }
        }
    }

    /// The result temporary is allocated before either operand is lowered.
    fn lower_binary(
        &mut self,
        op: BinaryOp,
        lhs: &AstExpr,
        rhs: &AstExpr,
        ty: TypeId,
        span: Span,
        bb: BlockId,
    ) -> Result<(Operand, BlockId), LowerError> {
        let result = self.temp(Some(ty));
        let (lhs, bb) = self.lower_expr(lhs, bb)?;
        let (rhs, bb) = self.lower_expr(rhs, bb)?;
        self.emit(
            bb,
            NonTerminatorOp::BinaryOp {
                op: binary_kind(op),
                lhs: Operand::Var(result),
                rhs1: lhs,
                rhs2: rhs,
            },
            span,
        );
        Ok((Operand::Var(result), bb))
    }

    /// Locals first, then module constants (loaded into a temporary), then globals.
    fn lower_var_ref(&mut self, name: &str, span: Span, bb: BlockId) -> Result<(Operand, BlockId), LowerError> {
        if let Some(id) = self.lookup(name) {
            return Ok((Operand::Var(id), bb));
        }
        let module = self.module;
        if let Some((ty, value)) = module.constants.get(name) {
            let result = self.temp(Some(*ty));
            self.emit(
                bb,
                NonTerminatorOp::ConstLoad {
                    ty: value.ty,
                    lhs: Operand::Var(result),
                    value: value.value.clone(),
                },
                span,
            );
            return Ok((Operand::Var(result), bb));
        }
        if let Some(&ty) = module.globals.get(name) {
            return Ok((self.global(name, ty), bb));
        }
        Err(self.unresolved(name, span))
    }
}

fn binary_kind(op: BinaryOp) -> BinaryOpKind {
    match op {
        BinaryOp::Add => BinaryOpKind::Add,
        BinaryOp::Sub => BinaryOpKind::Sub,
        BinaryOp::Mul => BinaryOpKind::Mul,
        BinaryOp::Div => BinaryOpKind::Div,
        BinaryOp::Mod => BinaryOpKind::Mod,
        BinaryOp::And => BinaryOpKind::And,
        BinaryOp::Or => BinaryOpKind::Or,
        BinaryOp::Eq => BinaryOpKind::Equal,
        BinaryOp::NotEq => BinaryOpKind::NotEqual,
        BinaryOp::Gt => BinaryOpKind::GreaterThan,
        BinaryOp::GtEq => BinaryOpKind::GreaterEqual,
        BinaryOp::Lt => BinaryOpKind::LessThan,
        BinaryOp::LtEq => BinaryOpKind::LessEqual,
        BinaryOp::RefEq => BinaryOpKind::RefEqual,
        BinaryOp::RefNotEq => BinaryOpKind::RefNotEqual,
        BinaryOp::BitAnd => BinaryOpKind::BitwiseAnd,
        BinaryOp::BitOr => BinaryOpKind::BitwiseOr,
        BinaryOp::BitXor => BinaryOpKind::BitwiseXor,
        BinaryOp::Shl => BinaryOpKind::BitwiseLeftShift,
        BinaryOp::Shr => BinaryOpKind::BitwiseRightShift,
        BinaryOp::UnsignedShr => BinaryOpKind::BitwiseUnsignedRightShift,
    }
}
