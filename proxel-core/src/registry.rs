use crate::codec::ErrorCodecRegistry;
use crate::record::RecordCodecRegistry;
use crate::schema::ServiceSchema;
use crate::validate::{validate, SchemaError};
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Validated schemas keyed by service name. Registration is the
/// validation gate: a schema that fails is never stored, so everything
/// handed out by [`get`](SchemaRegistry::get) is safe to compile stubs
/// and dispatchers from.
#[derive(Default)]
pub struct SchemaRegistry {
    schemas: DashMap<String, Arc<ServiceSchema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, schema: ServiceSchema) -> Result<Arc<ServiceSchema>, SchemaError> {
        if let Err(e) = validate(&schema) {
            warn!(schema = %schema.name, error = %e, "schema rejected");
            return Err(e);
        }
        debug!(schema = %schema.name, methods = schema.methods.len(), "schema registered");
        let schema = Arc::new(schema);
        self.schemas
            .insert(schema.name.clone(), Arc::clone(&schema));
        Ok(schema)
    }

    pub fn get(&self, name: &str) -> Option<Arc<ServiceSchema>> {
        self.schemas.get(name).map(|s| Arc::clone(s.value()))
    }
}

impl fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("schemas", &self.schemas.len())
            .finish()
    }
}

/// Everything both sides of a proxy need to agree on: schemas, record
/// codecs and error codecs. Built once at startup and shared.
#[derive(Debug, Default)]
pub struct ProxyRegistry {
    schemas: SchemaRegistry,
    records: RecordCodecRegistry,
    errors: ErrorCodecRegistry,
}

impl ProxyRegistry {
    pub fn new() -> Self {
        ProxyRegistry {
            schemas: SchemaRegistry::new(),
            records: RecordCodecRegistry::new(),
            errors: ErrorCodecRegistry::new(),
        }
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    pub fn records(&self) -> &RecordCodecRegistry {
        &self.records
    }

    pub fn errors(&self) -> &ErrorCodecRegistry {
        &self.errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{PrimitiveKind, TypeDescriptor};
    use crate::schema::MethodSchema;

    #[test]
    fn test_invalid_schema_never_registered() {
        let registry = SchemaRegistry::new();
        let bad = ServiceSchema::new("Bad")
            .method(MethodSchema::new("m").param("x", TypeDescriptor::Void));
        assert!(registry.register(bad).is_err());
        assert!(registry.get("Bad").is_none());
    }

    #[test]
    fn test_registered_schema_retrievable() {
        let registry = SchemaRegistry::new();
        let schema = ServiceSchema::new("Good").method(
            MethodSchema::new("echo")
                .param("x", TypeDescriptor::Primitive(PrimitiveKind::Str))
                .callback(TypeDescriptor::Primitive(PrimitiveKind::Str)),
        );
        let stored = registry.register(schema).unwrap();
        assert_eq!(registry.get("Good").as_deref(), Some(stored.as_ref()));
    }
}
