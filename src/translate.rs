//! Syntax-directed translator
//!
//! Walks a parsed function definition node by node and emits IR
//! instructions into an open [`ModuleBuilder`]. Dispatch is an exhaustive
//! match over the closed statement and expression kinds; any construct
//! without a translation rule is rejected outright. State carried across
//! the walk: the symbol table and a single pending-return slot.
//!
//! Name binding rules:
//! - A name in load position must already be bound, otherwise translation
//!   fails.
//! - A name first seen in store position is forward-declared with an
//!   untyped placeholder before its right-hand side is translated. This
//!   is deliberate, not incidental: it matches the source language's
//!   store-visits-target-first evaluation order.
//! - Reassigning a bound name rebinds the table entry. The original value
//!   is never mutated, so the IR stays in single-static-assignment form
//!   and shadowing is the sanctioned way to express accumulation.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::annot::{resolve_annotation, ResolutionContext};
use crate::ast::{BinOp, Expr, FunctionSpec, SourceModule, Stmt};
use crate::error::{CompileError, CompileResult};
use crate::ir::{ElemOp, Module, ModuleBuilder, ValueId};

/// Mapping from source-level names to IR value handles
///
/// Scoped to one function compilation: created per session, mutated only
/// during the translator's single forward pass, discarded afterwards.
#[derive(Debug, Default)]
pub struct SymbolTable {
    bindings: HashMap<String, ValueId>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind or rebind a name
    pub fn bind(&mut self, name: &str, id: ValueId) {
        self.bindings.insert(name.to_string(), id);
    }

    pub fn lookup(&self, name: &str) -> Option<ValueId> {
        self.bindings.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }
}

/// Translates one function definition into an IR module
pub struct Translator<'ctx> {
    ctx: &'ctx ResolutionContext,
    builder: ModuleBuilder,
    symbols: SymbolTable,
    ret: Option<ValueId>,
}

impl<'ctx> Translator<'ctx> {
    pub fn new(ctx: &'ctx ResolutionContext) -> Self {
        Self {
            ctx,
            builder: ModuleBuilder::new(),
            symbols: SymbolTable::new(),
            ret: None,
        }
    }

    /// Translate a compilation unit into a finished module
    ///
    /// The unit must contain exactly one function definition; one
    /// compilation session builds one module.
    pub fn translate(mut self, module: &SourceModule) -> CompileResult<Module> {
        if module.functions.len() != 1 {
            return Err(CompileError::MultipleModules {
                found: module.functions.len(),
            });
        }
        self.translate_function(&module.functions[0])?;
        self.builder.finish()
    }

    fn translate_function(&mut self, function: &FunctionSpec) -> CompileResult<()> {
        debug!(name = %function.name, params = function.params.len(), "translating function");
        self.builder.open_function(&function.name)?;

        for param in &function.params {
            let ty = resolve_annotation(&param.name, param.annotation.as_ref(), self.ctx)?;
            trace!(param = %param.name, ty = %ty, "resolved parameter");
            let id = self.builder.emit_param(&param.name, ty)?;
            self.symbols.bind(&param.name, id);
        }

        for stmt in &function.body {
            self.translate_stmt(stmt)?;
        }

        let ret = match self.ret {
            Some(id) => id,
            None => self.builder.emit_unit()?,
        };
        self.builder.set_return(ret)
    }

    fn translate_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match stmt {
            Stmt::Pass => Ok(()),

            Stmt::Assign { targets, value } => {
                if targets.len() != 1 {
                    return Err(CompileError::UnsupportedAssignment {
                        targets: targets.len(),
                    });
                }
                let target = &targets[0];

                // Visit the target in store position first: an unbound
                // name is forward-declared with a placeholder that the
                // right-hand side may legally reference.
                self.resolve_store(target)?;

                let id = self.translate_expr(value)?;
                self.symbols.bind(target, id);
                self.builder.set_name_hint(id, target)?;
                trace!(target = %target, value = %id, "bound assignment");
                Ok(())
            }

            Stmt::Return(value) => {
                let id = self.translate_expr(value)?;
                self.ret = Some(id);
                Ok(())
            }

            Stmt::Expr(_) => Err(CompileError::unsupported_syntax("expression statement")),
        }
    }

    /// Resolve a name in store position, forward-declaring if unbound
    fn resolve_store(&mut self, name: &str) -> CompileResult<ValueId> {
        if let Some(id) = self.symbols.lookup(name) {
            return Ok(id);
        }
        let id = self.builder.emit_placeholder(name)?;
        self.symbols.bind(name, id);
        Ok(id)
    }

    fn translate_expr(&mut self, expr: &Expr) -> CompileResult<ValueId> {
        match expr {
            Expr::Name(name) => self
                .symbols
                .lookup(name)
                .ok_or_else(|| CompileError::unbound(name)),

            Expr::Number(value) => self.builder.emit_const(*value),

            Expr::Binary { op, left, right } => {
                // Left before right: instruction emission order matches
                // source left-to-right evaluation order.
                let lhs = self.translate_expr(left)?;
                let rhs = self.translate_expr(right)?;
                let op = match op {
                    BinOp::Add => ElemOp::Add,
                    BinOp::Mul => ElemOp::Mul,
                    BinOp::Sub | BinOp::Div => {
                        return Err(CompileError::UnsupportedOperator {
                            op: op.symbol().to_string(),
                        })
                    }
                };
                self.builder.emit_binary(op, lhs, rhs)
            }

            Expr::Call { name, .. } => Err(CompileError::unsupported_syntax(format!(
                "function call to '{}'",
                name
            ))),
        }
    }
}

/// Parse and translate a source string in one step
pub fn translate_source(
    source: &str,
    ctx: &ResolutionContext,
) -> CompileResult<Module> {
    let module = crate::parser::parse_source(source)?;
    Translator::new(ctx).translate(&module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ValueKind;
    use crate::tensor::{DType, TensorType};
    use pretty_assertions::assert_eq;

    fn ctx() -> ResolutionContext {
        ResolutionContext::new()
    }

    const ADD_SRC: &str = "fn add(a: Tensor((2, 3), float32), b: Tensor((2, 3), float32)) {
        out = a + b;
        return out;
    }";

    #[test]
    fn test_translate_add() {
        let module = translate_source(ADD_SRC, &ctx()).unwrap();

        assert_eq!(module.entry, "add");
        assert_eq!(module.params.len(), 2);
        // Two params, the forward-declared placeholder for 'out', the add.
        assert_eq!(module.len(), 4);

        let ret = module.value(module.ret);
        assert!(matches!(ret.kind, ValueKind::Binary { op: ElemOp::Add, .. }));
        assert_eq!(ret.name_hint.as_deref(), Some("out"));

        let a = module.value(module.params[0]);
        assert_eq!(a.ty, Some(TensorType::new(vec![2, 3], DType::F32)));
    }

    #[test]
    fn test_translate_rebinding_shadows() {
        let module = translate_source(
            "fn f(a: Tensor((2, 3), float32), b: Tensor((2, 3), float32)) {
                out = a + b;
                out = out + a;
                return out;
            }",
            &ctx(),
        )
        .unwrap();

        // Two adds, no mutation: the first 'out' is still in the table.
        let adds: Vec<_> = module
            .iter()
            .filter(|(_, info)| matches!(info.kind, ValueKind::Binary { .. }))
            .collect();
        assert_eq!(adds.len(), 2);

        // The second add consumes the first one's result.
        let (first_id, _) = adds[0];
        if let ValueKind::Binary { lhs, .. } = module.value(module.ret).kind {
            assert_eq!(lhs, first_id);
        } else {
            panic!("expected binary return");
        }
    }

    #[test]
    fn test_translate_constant_operand() {
        let module = translate_source(
            "fn scale(a: Tensor((2, 2), float32)) { return a * 3; }",
            &ctx(),
        )
        .unwrap();

        let has_const = module
            .iter()
            .any(|(_, info)| matches!(info.kind, ValueKind::Const { value } if value == 3.0));
        assert!(has_const);
    }

    #[test]
    fn test_translate_emission_order() {
        let module = translate_source(
            "fn f(a: Tensor((2, 2), float32), b: Tensor((2, 2), float32)) {
                return a * b + a;
            }",
            &ctx(),
        )
        .unwrap();

        // params %0 %1, mul %2, add %3: left subtree emits before right.
        let kinds: Vec<_> = module.iter().map(|(_, info)| info.kind.clone()).collect();
        assert!(matches!(kinds[2], ValueKind::Binary { op: ElemOp::Mul, .. }));
        assert!(matches!(kinds[3], ValueKind::Binary { op: ElemOp::Add, .. }));
    }

    #[test]
    fn test_translate_no_return_emits_unit() {
        let module =
            translate_source("fn noop(a: Tensor((2, 2), float32)) { pass; }", &ctx()).unwrap();
        assert!(matches!(module.value(module.ret).kind, ValueKind::Unit));
    }

    #[test]
    fn test_forward_declared_store_target() {
        // 'out' is unbound when it appears on both sides: the store visit
        // forward-declares a placeholder that the load then resolves to.
        let module = translate_source(
            "fn f(a: Tensor((2, 2), float32)) {
                out = out + a;
                return out;
            }",
            &ctx(),
        )
        .unwrap();

        let placeholders = module
            .iter()
            .filter(|(_, info)| matches!(info.kind, ValueKind::Placeholder))
            .count();
        assert_eq!(placeholders, 1);
    }

    #[test]
    fn test_missing_annotation() {
        let err = translate_source("fn f(a) { return a; }", &ctx()).unwrap_err();
        assert!(matches!(err, CompileError::MissingAnnotation { ref param } if param == "a"));
    }

    #[test]
    fn test_multiple_functions_rejected() {
        let err = translate_source(
            "fn f(a: Tensor((2, 2), float32)) { return a; }
             fn g(a: Tensor((2, 2), float32)) { return a; }",
            &ctx(),
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::MultipleModules { found: 2 }));
    }

    #[test]
    fn test_chained_assignment_rejected() {
        let err = translate_source(
            "fn f(a: Tensor((2, 2), float32)) { x = y = a; return x; }",
            &ctx(),
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedAssignment { targets: 2 }));
    }

    #[test]
    fn test_unsupported_operator() {
        let err = translate_source(
            "fn f(a: Tensor((2, 2), float32), b: Tensor((2, 2), float32)) { return a - b; }",
            &ctx(),
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedOperator { ref op } if op == "-"));
    }

    #[test]
    fn test_unbound_name() {
        let err = translate_source(
            "fn f(a: Tensor((2, 2), float32)) { return missing; }",
            &ctx(),
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::UnboundName { ref name } if name == "missing"));
    }

    #[test]
    fn test_expression_statement_rejected() {
        let err = translate_source(
            "fn f(a: Tensor((2, 2), float32)) { a + a; return a; }",
            &ctx(),
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedSyntax { .. }));
    }

    #[test]
    fn test_call_rejected() {
        let err = translate_source(
            "fn f(a: Tensor((2, 2), float32)) { return helper(a); }",
            &ctx(),
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedSyntax { ref construct }
            if construct.contains("helper")));
    }

    #[test]
    fn test_symbolic_shape_context() {
        let mut ctx = ResolutionContext::new();
        ctx.bind_dim("m", 4);
        ctx.bind_dim("n", 5);

        let module = translate_source(
            "fn f(a: Tensor((m, n), float32)) { return a; }",
            &ctx,
        )
        .unwrap();

        let a = module.value(module.params[0]);
        assert_eq!(a.ty, Some(TensorType::new(vec![4, 5], DType::F32)));
    }
}
