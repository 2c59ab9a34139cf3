//! Intermediate dataflow representation for one compiled function
//!
//! A [`Module`] is the single-entry program the translator builds and the
//! pipeline transforms. Values live in a flat table in emission order;
//! every value is produced exactly once and referenced by later values
//! through its [`ValueId`], so the table is in single-static-assignment
//! form by construction.

use crate::device::LaunchConfig;
use crate::error::{CompileError, CompileResult};
use crate::tensor::TensorType;

/// Opaque handle to one value in a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueId(u32);

impl ValueId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ValueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Elementwise operations the backend supports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElemOp {
    Add,
    Mul,
}

impl ElemOp {
    pub fn name(&self) -> &'static str {
        match self {
            ElemOp::Add => "add",
            ElemOp::Mul => "multiply",
        }
    }
}

/// How a value is produced
#[derive(Debug, Clone, PartialEq)]
pub enum ValueKind {
    /// Function parameter with its declared type
    Param { index: usize, ty: TensorType },
    /// Scalar constant
    Const { value: f64 },
    /// Elementwise binary instruction
    Binary { op: ElemOp, lhs: ValueId, rhs: ValueId },
    /// Empty-shape value returned by functions without a return statement
    Unit,
    /// Untyped forward declaration for a name first seen in store position
    Placeholder,
}

/// Dataflow pattern assigned by the annotate pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpPattern {
    /// Eligible for fusion into a kernel group
    Elementwise,
    /// Not schedulable (parameters, constants, placeholders)
    Opaque,
}

/// One value in the module's table
#[derive(Debug, Clone, PartialEq)]
pub struct ValueInfo {
    pub kind: ValueKind,
    /// Diagnostic name carried over from the source program
    pub name_hint: Option<String>,
    /// Resolved type; populated at emission for parameters and by type
    /// inference for everything else
    pub ty: Option<TensorType>,
    pub pattern: Option<OpPattern>,
}

impl ValueInfo {
    fn new(kind: ValueKind) -> Self {
        Self {
            kind,
            name_hint: None,
            ty: None,
            pattern: None,
        }
    }
}

/// A fused run of instructions compiled and launched as one kernel
#[derive(Debug, Clone, PartialEq)]
pub struct KernelGroup {
    pub values: Vec<ValueId>,
    /// Parallel execution structure, assigned by GPU auto-scheduling
    pub launch: Option<LaunchConfig>,
}

/// The intermediate module for exactly one function
///
/// Built incrementally through [`ModuleBuilder`], transformed in place by
/// the pipeline's passes, then consumed by backend compilation. Owned by
/// one compilation; never shared across sessions.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub entry: String,
    values: Vec<ValueInfo>,
    pub params: Vec<ValueId>,
    pub ret: ValueId,
    /// Set once the convert-to-dataflow pass has verified def-before-use
    pub dataflow: bool,
    /// Kernel groups produced by fusion; empty means one kernel per value
    pub groups: Vec<KernelGroup>,
}

impl Module {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn value(&self, id: ValueId) -> &ValueInfo {
        &self.values[id.index()]
    }

    pub fn value_mut(&mut self, id: ValueId) -> &mut ValueInfo {
        &mut self.values[id.index()]
    }

    /// Iterate values in emission order
    pub fn iter(&self) -> impl Iterator<Item = (ValueId, &ValueInfo)> {
        self.values
            .iter()
            .enumerate()
            .map(|(i, info)| (ValueId(i as u32), info))
    }

    pub fn ids(&self) -> impl Iterator<Item = ValueId> {
        (0..self.values.len() as u32).map(ValueId)
    }
}

impl std::fmt::Display for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "fn {}(", self.entry)?;
        for (i, id) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            let info = self.value(*id);
            write!(f, "{}", id)?;
            if let Some(ty) = &info.ty {
                write!(f, ": {}", ty)?;
            }
            if let Some(hint) = &info.name_hint {
                write!(f, " /* {} */", hint)?;
            }
        }
        writeln!(f, ") {{")?;
        for (id, info) in self.iter() {
            match &info.kind {
                ValueKind::Param { .. } => {}
                ValueKind::Const { value } => {
                    writeln!(f, "  {} = const {}", id, value)?;
                }
                ValueKind::Binary { op, lhs, rhs } => {
                    write!(f, "  {} = {} {}, {}", id, op.name(), lhs, rhs)?;
                    if let Some(hint) = &info.name_hint {
                        write!(f, "  ; {}", hint)?;
                    }
                    writeln!(f)?;
                }
                ValueKind::Unit => {
                    writeln!(f, "  {} = unit", id)?;
                }
                ValueKind::Placeholder => {
                    writeln!(f, "  {} = placeholder", id)?;
                }
            }
        }
        writeln!(f, "  return {}", self.ret)?;
        write!(f, "}}")
    }
}

/// In-progress function frame inside the builder
#[derive(Debug)]
struct FunctionFrame {
    name: String,
    values: Vec<ValueInfo>,
    params: Vec<ValueId>,
    ret: Option<ValueId>,
}

/// Incremental module-building context
///
/// The translator opens one function scope, emits instructions in source
/// order, sets the return value, and finishes the builder into a
/// [`Module`]. A second `open_function` on the same builder is refused:
/// one compilation session builds exactly one module.
#[derive(Debug, Default)]
pub struct ModuleBuilder {
    frame: Option<FunctionFrame>,
    opened: usize,
}

impl ModuleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the function-building scope
    pub fn open_function(&mut self, name: &str) -> CompileResult<()> {
        self.opened += 1;
        if self.opened > 1 {
            return Err(CompileError::MultipleModules { found: self.opened });
        }
        self.frame = Some(FunctionFrame {
            name: name.to_string(),
            values: Vec::new(),
            params: Vec::new(),
            ret: None,
        });
        Ok(())
    }

    fn frame_mut(&mut self) -> CompileResult<&mut FunctionFrame> {
        self.frame
            .as_mut()
            .ok_or_else(|| CompileError::internal("no open function scope"))
    }

    fn push(&mut self, info: ValueInfo) -> CompileResult<ValueId> {
        let frame = self.frame_mut()?;
        let id = ValueId(frame.values.len() as u32);
        frame.values.push(info);
        Ok(id)
    }

    /// Emit a typed parameter declaration
    pub fn emit_param(&mut self, name: &str, ty: TensorType) -> CompileResult<ValueId> {
        let index = self.frame_mut()?.params.len();
        let mut info = ValueInfo::new(ValueKind::Param {
            index,
            ty: ty.clone(),
        });
        info.name_hint = Some(name.to_string());
        info.ty = Some(ty);
        let id = self.push(info)?;
        self.frame_mut()?.params.push(id);
        Ok(id)
    }

    /// Emit a scalar constant instruction
    pub fn emit_const(&mut self, value: f64) -> CompileResult<ValueId> {
        self.push(ValueInfo::new(ValueKind::Const { value }))
    }

    /// Emit an elementwise binary instruction
    pub fn emit_binary(
        &mut self,
        op: ElemOp,
        lhs: ValueId,
        rhs: ValueId,
    ) -> CompileResult<ValueId> {
        self.push(ValueInfo::new(ValueKind::Binary { op, lhs, rhs }))
    }

    /// Emit the degenerate empty-shape value
    pub fn emit_unit(&mut self) -> CompileResult<ValueId> {
        let mut info = ValueInfo::new(ValueKind::Unit);
        info.ty = Some(TensorType::unit());
        self.push(info)
    }

    /// Emit an untyped placeholder for a forward-declared name
    pub fn emit_placeholder(&mut self, name: &str) -> CompileResult<ValueId> {
        let mut info = ValueInfo::new(ValueKind::Placeholder);
        info.name_hint = Some(name.to_string());
        self.push(info)
    }

    /// Attach a diagnostic name to an already-emitted value
    pub fn set_name_hint(&mut self, id: ValueId, name: &str) -> CompileResult<()> {
        let frame = self.frame_mut()?;
        let info = frame
            .values
            .get_mut(id.index())
            .ok_or_else(|| CompileError::internal(format!("no value {}", id)))?;
        info.name_hint = Some(name.to_string());
        Ok(())
    }

    /// Record the function's return value
    pub fn set_return(&mut self, id: ValueId) -> CompileResult<()> {
        self.frame_mut()?.ret = Some(id);
        Ok(())
    }

    /// Close the builder and produce the finished module
    pub fn finish(self) -> CompileResult<Module> {
        let frame = self
            .frame
            .ok_or_else(|| CompileError::internal("finish() without an open function"))?;
        let ret = frame
            .ret
            .ok_or_else(|| CompileError::internal("function has no return value"))?;
        Ok(Module {
            entry: frame.name,
            values: frame.values,
            params: frame.params,
            ret,
            dataflow: false,
            groups: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::DType;
    use pretty_assertions::assert_eq;

    fn f32_ty() -> TensorType {
        TensorType::new(vec![2, 2], DType::F32)
    }

    #[test]
    fn test_build_simple_module() {
        let mut b = ModuleBuilder::new();
        b.open_function("add").unwrap();
        let a = b.emit_param("a", f32_ty()).unwrap();
        let bb = b.emit_param("b", f32_ty()).unwrap();
        let sum = b.emit_binary(ElemOp::Add, a, bb).unwrap();
        b.set_name_hint(sum, "out").unwrap();
        b.set_return(sum).unwrap();

        let module = b.finish().unwrap();
        assert_eq!(module.entry, "add");
        assert_eq!(module.len(), 3);
        assert_eq!(module.params, vec![a, bb]);
        assert_eq!(module.ret, sum);
        assert_eq!(module.value(sum).name_hint.as_deref(), Some("out"));
    }

    #[test]
    fn test_second_function_refused() {
        let mut b = ModuleBuilder::new();
        b.open_function("f").unwrap();
        let err = b.open_function("g").unwrap_err();
        assert!(matches!(err, CompileError::MultipleModules { found: 2 }));
    }

    #[test]
    fn test_emit_without_scope() {
        let mut b = ModuleBuilder::new();
        let err = b.emit_const(1.0).unwrap_err();
        assert!(matches!(err, CompileError::Internal { .. }));
    }

    #[test]
    fn test_finish_requires_return() {
        let mut b = ModuleBuilder::new();
        b.open_function("f").unwrap();
        assert!(b.finish().is_err());
    }

    #[test]
    fn test_display() {
        let mut b = ModuleBuilder::new();
        b.open_function("add").unwrap();
        let a = b.emit_param("a", f32_ty()).unwrap();
        let c = b.emit_const(2.0).unwrap();
        let sum = b.emit_binary(ElemOp::Add, a, c).unwrap();
        b.set_return(sum).unwrap();
        let module = b.finish().unwrap();

        let text = module.to_string();
        assert!(text.contains("fn add(%0: float32[2, 2] /* a */)"));
        assert!(text.contains("%1 = const 2"));
        assert!(text.contains("%2 = add %0, %1"));
        assert!(text.contains("return %2"));
    }
}
