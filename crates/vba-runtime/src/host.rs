//! Pluggable interface to the surrounding document's object model.
//!
//! The evaluator never owns host objects; it carries opaque handles the
//! host hands out and routes every property, method, and indexed access
//! back through this trait. Handles must not be used after the host
//! invalidates them.

use crate::error::VbaError;
use crate::value::Value;

/// Opaque reference to a host-owned object plus a type tag used by
/// `TypeName` and `TypeOf ... Is` tests.
#[derive(Debug, Clone, PartialEq)]
pub struct HostObject {
    pub handle: u64,
    pub type_tag: String,
}

impl HostObject {
    pub fn new(handle: u64, type_tag: impl Into<String>) -> Self {
        Self {
            handle,
            type_tag: type_tag.into(),
        }
    }
}

pub trait HostApi {
    /// Resolve a bare name to a host global (e.g. an application object).
    /// `None` lets identifier lookup continue to its default.
    fn get_global_object(&mut self, name: &str) -> Option<Value>;

    fn get_property(&mut self, object: &HostObject, name: &str) -> Result<Value, VbaError>;

    fn set_property(
        &mut self,
        object: &HostObject,
        name: &str,
        value: Value,
    ) -> Result<(), VbaError>;

    fn call_method(
        &mut self,
        object: &HostObject,
        name: &str,
        args: &[Value],
    ) -> Result<Value, VbaError>;

    fn get_indexed(&mut self, object: &HostObject, indexes: &[Value]) -> Result<Value, VbaError> {
        let _ = indexes;
        Err(VbaError::NotImplemented(format!(
            "indexed access on {}",
            object.type_tag
        )))
    }

    fn set_indexed(
        &mut self,
        object: &HostObject,
        indexes: &[Value],
        value: Value,
    ) -> Result<(), VbaError> {
        let _ = (indexes, value);
        Err(VbaError::NotImplemented(format!(
            "indexed assignment on {}",
            object.type_tag
        )))
    }
}

/// Host with no object model at all; useful for evaluating pure
/// expressions and for tests.
#[derive(Debug, Default)]
pub struct NullHost;

impl HostApi for NullHost {
    fn get_global_object(&mut self, _name: &str) -> Option<Value> {
        None
    }

    fn get_property(&mut self, _object: &HostObject, _name: &str) -> Result<Value, VbaError> {
        Err(VbaError::ObjectRequired)
    }

    fn set_property(
        &mut self,
        _object: &HostObject,
        _name: &str,
        _value: Value,
    ) -> Result<(), VbaError> {
        Err(VbaError::ObjectRequired)
    }

    fn call_method(
        &mut self,
        _object: &HostObject,
        _name: &str,
        _args: &[Value],
    ) -> Result<Value, VbaError> {
        Err(VbaError::ObjectRequired)
    }
}
