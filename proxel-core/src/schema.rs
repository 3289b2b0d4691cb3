use crate::descriptor::TypeDescriptor;
use serde::{Deserialize, Serialize};

/// Shape of a method's synchronous return as declared in the source
/// interface. All actual results travel through the reply side of a
/// callback; a synchronous return other than `void` or `self` fails
/// validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncReturn {
    Void,
    /// The method returns the handle itself for chaining.
    Fluent,
    /// An arbitrary native return type, recorded by name for diagnostics.
    Other(String),
}

/// A parameter as it appears in the declared interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamType {
    /// A marshalable value parameter.
    Value(TypeDescriptor),
    /// The completion callback carrying the method's reply type. At most
    /// one per method, and it must come last.
    Callback(TypeDescriptor),
    /// A native type the engine cannot marshal, recorded by name. Only
    /// legal on static or ignored methods.
    Unresolved(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSchema {
    pub name: String,
    pub ty: ParamType,
}

/// How a method's result travels, derived from its trailing callback
/// parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultKind {
    /// One-way send; nothing comes back.
    FireAndForget,
    /// Exactly one success-or-failure reply carrying this shape.
    Callback(TypeDescriptor),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodSchema {
    pub name: String,
    pub params: Vec<ParamSchema>,
    pub sync_return: SyncReturn,
    pub is_fluent: bool,
    pub is_static_or_ignored: bool,
    pub is_close: bool,
}

impl MethodSchema {
    pub fn new(name: impl Into<String>) -> Self {
        MethodSchema {
            name: name.into(),
            params: Vec::new(),
            sync_return: SyncReturn::Void,
            is_fluent: false,
            is_static_or_ignored: false,
            is_close: false,
        }
    }

    /// Append a marshalable value parameter.
    pub fn param(mut self, name: impl Into<String>, ty: TypeDescriptor) -> Self {
        self.params.push(ParamSchema {
            name: name.into(),
            ty: ParamType::Value(ty),
        });
        self
    }

    /// Append a parameter of any declared shape. Used to model interfaces
    /// that will not survive validation.
    pub fn raw_param(mut self, name: impl Into<String>, ty: ParamType) -> Self {
        self.params.push(ParamSchema {
            name: name.into(),
            ty,
        });
        self
    }

    /// Declare the trailing completion callback with the given reply shape.
    pub fn callback(mut self, result: TypeDescriptor) -> Self {
        self.params.push(ParamSchema {
            name: "resultHandler".to_string(),
            ty: ParamType::Callback(result),
        });
        self
    }

    pub fn fluent(mut self) -> Self {
        self.is_fluent = true;
        self.sync_return = SyncReturn::Fluent;
        self
    }

    pub fn close(mut self) -> Self {
        self.is_close = true;
        self
    }

    pub fn ignored(mut self) -> Self {
        self.is_static_or_ignored = true;
        self
    }

    pub fn returns(mut self, native_type: impl Into<String>) -> Self {
        self.sync_return = SyncReturn::Other(native_type.into());
        self
    }

    /// The derived result kind: a reply is expected exactly when the final
    /// parameter is a callback.
    pub fn result_kind(&self) -> ResultKind {
        match self.params.last() {
            Some(ParamSchema {
                ty: ParamType::Callback(result),
                ..
            }) => ResultKind::Callback(result.clone()),
            _ => ResultKind::FireAndForget,
        }
    }

    /// Marshalable parameters in declared order, excluding the callback.
    pub fn value_params(&self) -> impl Iterator<Item = (&str, &TypeDescriptor)> {
        self.params.iter().filter_map(|p| match &p.ty {
            ParamType::Value(ty) => Some((p.name.as_str(), ty)),
            _ => None,
        })
    }
}

/// A declarative service interface: an ordered list of methods with
/// unique names. Dispatch is keyed by method name, never by signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSchema {
    pub name: String,
    pub methods: Vec<MethodSchema>,
}

impl ServiceSchema {
    pub fn new(name: impl Into<String>) -> Self {
        ServiceSchema {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    pub fn method(mut self, method: MethodSchema) -> Self {
        self.methods.push(method);
        self
    }

    pub fn find_method(&self, name: &str) -> Option<&MethodSchema> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn close_method(&self) -> Option<&MethodSchema> {
        self.methods.iter().find(|m| m.is_close)
    }
}
