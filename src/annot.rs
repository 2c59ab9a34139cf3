//! Type annotation resolver
//!
//! Evaluates a parameter's annotation expression into a concrete
//! [`TensorType`] against an explicit resolution context, the names
//! visible where the function was defined. The evaluator covers only the
//! closed annotation grammar; it never re-enters a general-purpose
//! expression evaluator.

use std::collections::HashMap;

use crate::ast::{AnnotExpr, DimExpr, DtypeExpr};
use crate::error::{CompileError, CompileResult};
use crate::tensor::{DType, TensorType};

/// A value a free annotation name may resolve to
#[derive(Debug, Clone, PartialEq)]
pub enum ContextValue {
    /// A symbolic dimension, e.g. `m = 4`
    Dim(usize),
    /// A dtype alias, e.g. `dt = float32`
    Dtype(DType),
    /// A full tensor type alias, e.g. `ImageT = float32[224, 224]`
    Type(TensorType),
}

/// Names visible at the function's definition site
///
/// Built by the caller and passed in by reference; resolution never
/// mutates it.
#[derive(Debug, Clone, Default)]
pub struct ResolutionContext {
    bindings: HashMap<String, ContextValue>,
}

impl ResolutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a symbolic dimension name
    pub fn bind_dim(&mut self, name: &str, dim: usize) {
        self.bindings.insert(name.to_string(), ContextValue::Dim(dim));
    }

    /// Bind a dtype alias
    pub fn bind_dtype(&mut self, name: &str, dtype: DType) {
        self.bindings
            .insert(name.to_string(), ContextValue::Dtype(dtype));
    }

    /// Bind a full tensor type alias
    pub fn bind_type(&mut self, name: &str, ty: TensorType) {
        self.bindings.insert(name.to_string(), ContextValue::Type(ty));
    }

    fn get(&self, name: &str) -> Option<&ContextValue> {
        self.bindings.get(name)
    }
}

/// Resolve a parameter's annotation into a concrete tensor type
///
/// Annotations are mandatory: shape and dtype cannot be recovered from the
/// syntax tree alone, so a missing annotation fails before any backend
/// instruction is emitted.
pub fn resolve_annotation(
    param: &str,
    annotation: Option<&AnnotExpr>,
    ctx: &ResolutionContext,
) -> CompileResult<TensorType> {
    let annotation = annotation.ok_or_else(|| CompileError::missing_annotation(param))?;

    match annotation {
        AnnotExpr::Tensor { shape, dtype } => {
            let mut dims = Vec::with_capacity(shape.len());
            for dim in shape {
                dims.push(resolve_dim(dim, ctx)?);
            }
            let dtype = resolve_dtype(dtype, ctx)?;
            Ok(TensorType::new(dims, dtype))
        }
        AnnotExpr::Named(name) => match ctx.get(name) {
            Some(ContextValue::Type(ty)) => Ok(ty.clone()),
            Some(other) => Err(CompileError::bad_annotation(format!(
                "'{}' is not a tensor type (bound to {:?})",
                name, other
            ))),
            None => Err(CompileError::unbound(name)),
        },
    }
}

fn resolve_dim(dim: &DimExpr, ctx: &ResolutionContext) -> CompileResult<usize> {
    let value = match dim {
        DimExpr::Literal(n) => *n,
        DimExpr::Name(name) => match ctx.get(name) {
            Some(ContextValue::Dim(n)) => *n,
            Some(other) => {
                return Err(CompileError::bad_annotation(format!(
                    "'{}' is not a dimension (bound to {:?})",
                    name, other
                )))
            }
            None => return Err(CompileError::unbound(name)),
        },
    };
    if value == 0 {
        return Err(CompileError::bad_annotation(
            "dimensions must be positive integers",
        ));
    }
    Ok(value)
}

fn resolve_dtype(dtype: &DtypeExpr, ctx: &ResolutionContext) -> CompileResult<DType> {
    match dtype {
        DtypeExpr::Literal(s) => DType::from_name(s)
            .ok_or_else(|| CompileError::bad_annotation(format!("unknown dtype \"{}\"", s))),
        DtypeExpr::Name(name) => {
            // Builtin dtype names shadow context bindings.
            if let Some(dtype) = DType::from_name(name) {
                return Ok(dtype);
            }
            match ctx.get(name) {
                Some(ContextValue::Dtype(dtype)) => Ok(*dtype),
                Some(other) => Err(CompileError::bad_annotation(format!(
                    "'{}' is not a dtype (bound to {:?})",
                    name, other
                ))),
                None => Err(CompileError::unbound(name)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tensor_annot(shape: Vec<DimExpr>, dtype: DtypeExpr) -> AnnotExpr {
        AnnotExpr::Tensor { shape, dtype }
    }

    #[test]
    fn test_resolve_literal_annotation() {
        let annot = tensor_annot(
            vec![DimExpr::Literal(2), DimExpr::Literal(3)],
            DtypeExpr::Literal("float32".to_string()),
        );
        let ty = resolve_annotation("a", Some(&annot), &ResolutionContext::new()).unwrap();
        assert_eq!(ty, TensorType::new(vec![2, 3], DType::F32));
    }

    #[test]
    fn test_resolve_symbolic_dims() {
        let mut ctx = ResolutionContext::new();
        ctx.bind_dim("m", 4);
        ctx.bind_dim("n", 8);
        ctx.bind_dtype("dt", DType::F64);

        let annot = tensor_annot(
            vec![
                DimExpr::Name("m".to_string()),
                DimExpr::Name("n".to_string()),
            ],
            DtypeExpr::Name("dt".to_string()),
        );
        let ty = resolve_annotation("a", Some(&annot), &ctx).unwrap();
        assert_eq!(ty, TensorType::new(vec![4, 8], DType::F64));
    }

    #[test]
    fn test_resolve_type_alias() {
        let mut ctx = ResolutionContext::new();
        ctx.bind_type("ImageT", TensorType::new(vec![8, 8], DType::F32));

        let annot = AnnotExpr::Named("ImageT".to_string());
        let ty = resolve_annotation("a", Some(&annot), &ctx).unwrap();
        assert_eq!(ty.shape, vec![8, 8]);
    }

    #[test]
    fn test_missing_annotation() {
        let err = resolve_annotation("a", None, &ResolutionContext::new()).unwrap_err();
        assert!(matches!(err, CompileError::MissingAnnotation { ref param } if param == "a"));
    }

    #[test]
    fn test_unbound_dim_name() {
        let annot = tensor_annot(
            vec![DimExpr::Name("m".to_string())],
            DtypeExpr::Literal("float32".to_string()),
        );
        let err = resolve_annotation("a", Some(&annot), &ResolutionContext::new()).unwrap_err();
        assert!(matches!(err, CompileError::UnboundName { ref name } if name == "m"));
    }

    #[test]
    fn test_wrong_kind_binding() {
        let mut ctx = ResolutionContext::new();
        ctx.bind_dtype("m", DType::F32);

        let annot = tensor_annot(
            vec![DimExpr::Name("m".to_string())],
            DtypeExpr::Literal("float32".to_string()),
        );
        let err = resolve_annotation("a", Some(&annot), &ctx).unwrap_err();
        assert!(matches!(err, CompileError::BadAnnotation { .. }));
    }

    #[test]
    fn test_zero_dim_rejected() {
        let annot = tensor_annot(
            vec![DimExpr::Literal(0)],
            DtypeExpr::Literal("float32".to_string()),
        );
        let err = resolve_annotation("a", Some(&annot), &ResolutionContext::new()).unwrap_err();
        assert!(matches!(err, CompileError::BadAnnotation { .. }));
    }

    #[test]
    fn test_unknown_dtype_literal() {
        let annot = tensor_annot(
            vec![DimExpr::Literal(2)],
            DtypeExpr::Literal("float16".to_string()),
        );
        let err = resolve_annotation("a", Some(&annot), &ResolutionContext::new()).unwrap_err();
        assert!(matches!(err, CompileError::BadAnnotation { .. }));
    }
}
