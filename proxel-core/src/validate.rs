use crate::descriptor::TypeDescriptor;
use crate::schema::{MethodSchema, ParamType, ServiceSchema, SyncReturn};
use std::collections::HashSet;

/// A schema shape the marshaling engine cannot handle. Validation failures
/// are fatal at generation time: nothing is compiled for the schema.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("overloaded methods are not allowed: '{schema}' declares '{method}' more than once")]
    DuplicateMethod { schema: String, method: String },

    #[error("parameter '{param}' of '{method}' has unsupported type {ty}")]
    UnsupportedParamType {
        method: String,
        param: String,
        ty: String,
    },

    #[error("callback parameter of '{method}' must be the final parameter")]
    CallbackNotLast { method: String },

    #[error("method '{method}' declares more than one callback parameter")]
    MultipleCallbacks { method: String },

    #[error("callback result of '{method}' is not representable: {ty}")]
    UnsupportedResultType { method: String, ty: String },

    #[error("method '{method}' must return void or self, not {ty}")]
    IllegalSyncReturn { method: String, ty: String },

    #[error("schema '{schema}' declares more than one close method")]
    MultipleCloseMethods { schema: String },

    #[error("close method '{method}' cannot take parameters")]
    CloseMethodWithParams { method: String },

    #[error("close method '{method}' must complete with void, not {ty}")]
    CloseMethodResult { method: String, ty: String },
}

/// Check a schema against every rule the marshaling engine relies on.
/// Must pass before a stub or dispatcher is compiled from the schema.
pub fn validate(schema: &ServiceSchema) -> Result<(), SchemaError> {
    let mut seen = HashSet::new();
    let mut close_methods = 0;

    for method in &schema.methods {
        if !seen.insert(method.name.as_str()) {
            return Err(SchemaError::DuplicateMethod {
                schema: schema.name.clone(),
                method: method.name.clone(),
            });
        }

        validate_method(method)?;

        if method.is_close {
            close_methods += 1;
            if close_methods > 1 {
                return Err(SchemaError::MultipleCloseMethods {
                    schema: schema.name.clone(),
                });
            }
        }
    }

    Ok(())
}

fn validate_method(method: &MethodSchema) -> Result<(), SchemaError> {
    let mut callbacks = 0;
    let last = method.params.len().saturating_sub(1);

    for (index, param) in method.params.iter().enumerate() {
        match &param.ty {
            ParamType::Value(ty) => {
                if !is_legal_param_type(ty) && !method.is_static_or_ignored {
                    return Err(SchemaError::UnsupportedParamType {
                        method: method.name.clone(),
                        param: param.name.clone(),
                        ty: ty.to_string(),
                    });
                }
            }
            ParamType::Callback(result) => {
                callbacks += 1;
                if callbacks > 1 {
                    return Err(SchemaError::MultipleCallbacks {
                        method: method.name.clone(),
                    });
                }
                if index != last {
                    return Err(SchemaError::CallbackNotLast {
                        method: method.name.clone(),
                    });
                }
                if !is_legal_result_type(result) {
                    return Err(SchemaError::UnsupportedResultType {
                        method: method.name.clone(),
                        ty: result.to_string(),
                    });
                }
            }
            ParamType::Unresolved(native) => {
                // Static and ignored methods are never marshaled.
                if !method.is_static_or_ignored {
                    return Err(SchemaError::UnsupportedParamType {
                        method: method.name.clone(),
                        param: param.name.clone(),
                        ty: native.clone(),
                    });
                }
            }
        }
    }

    if let SyncReturn::Other(native) = &method.sync_return {
        if !method.is_static_or_ignored {
            return Err(SchemaError::IllegalSyncReturn {
                method: method.name.clone(),
                ty: native.clone(),
            });
        }
    }

    if method.is_close {
        if method.value_params().next().is_some() {
            return Err(SchemaError::CloseMethodWithParams {
                method: method.name.clone(),
            });
        }
        if let Some(crate::schema::ParamSchema {
            ty: ParamType::Callback(result),
            ..
        }) = method.params.last()
        {
            if *result != TypeDescriptor::Void {
                return Err(SchemaError::CloseMethodResult {
                    method: method.name.clone(),
                    ty: result.to_string(),
                });
            }
        }
    }

    Ok(())
}

/// Shapes legal as a value parameter. Service references only travel as
/// results, and the void marker only inside callbacks.
fn is_legal_param_type(ty: &TypeDescriptor) -> bool {
    match ty {
        TypeDescriptor::Primitive(_)
        | TypeDescriptor::Boxed(_)
        | TypeDescriptor::Enum(_)
        | TypeDescriptor::Record(_)
        | TypeDescriptor::Document => true,
        TypeDescriptor::List(e) | TypeDescriptor::Set(e) | TypeDescriptor::Map(e) => {
            is_legal_container_element(e)
        }
        TypeDescriptor::Void | TypeDescriptor::ServiceRef(_) => false,
    }
}

/// Every callback result shape, including service references and the void
/// marker for acknowledge-only replies.
fn is_legal_result_type(ty: &TypeDescriptor) -> bool {
    match ty {
        TypeDescriptor::Void
        | TypeDescriptor::Primitive(_)
        | TypeDescriptor::Boxed(_)
        | TypeDescriptor::Enum(_)
        | TypeDescriptor::Record(_)
        | TypeDescriptor::ServiceRef(_)
        | TypeDescriptor::Document => true,
        TypeDescriptor::List(e) | TypeDescriptor::Set(e) | TypeDescriptor::Map(e) => {
            is_legal_container_element(e)
        }
    }
}

/// Containers nest exactly one level: elements must be scalar-like,
/// enums, records or documents.
fn is_legal_container_element(ty: &TypeDescriptor) -> bool {
    matches!(
        ty,
        TypeDescriptor::Primitive(_)
            | TypeDescriptor::Boxed(_)
            | TypeDescriptor::Enum(_)
            | TypeDescriptor::Record(_)
            | TypeDescriptor::Document
    )
}
