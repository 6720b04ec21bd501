//! Named parameters and the ordered store that owns them.

use std::sync::{Arc, PoisonError, RwLock};

use super::Buffer;
use crate::error::{Error, Result};

#[derive(Debug)]
struct ParameterInner {
    name: String,
    data: Buffer,
    grad: RwLock<Option<Buffer>>,
}

/// A named parameter with an optional gradient buffer.
///
/// Cheap to clone: every clone refers to the same data and gradient slot.
#[derive(Debug, Clone)]
pub struct Parameter {
    inner: Arc<ParameterInner>,
}

impl Parameter {
    /// Create a parameter without a gradient
    pub fn new(name: impl Into<String>, data: Vec<f32>) -> Self {
        Self {
            inner: Arc::new(ParameterInner {
                name: name.into(),
                data: Buffer::from_vec(data),
                grad: RwLock::new(None),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn data(&self) -> &Buffer {
        &self.inner.data
    }

    pub fn numel(&self) -> usize {
        self.inner.data.numel()
    }

    /// Current gradient buffer, if one has been allocated
    pub fn grad(&self) -> Option<Buffer> {
        self.inner.grad.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Allocate a zeroed gradient if none exists and return it
    pub fn ensure_grad(&self) -> Buffer {
        let mut slot = self.inner.grad.write().unwrap_or_else(PoisonError::into_inner);
        slot.get_or_insert_with(|| Buffer::zeros(self.numel())).clone()
    }

    /// Replace the gradient buffer.
    ///
    /// # Panics
    ///
    /// Panics if the buffer length differs from the parameter length.
    pub fn set_grad(&self, grad: Buffer) {
        assert_eq!(
            grad.numel(),
            self.numel(),
            "gradient for '{}' must have {} elements",
            self.name(),
            self.numel()
        );
        *self.inner.grad.write().unwrap_or_else(PoisonError::into_inner) = Some(grad);
    }

    /// Drop the gradient buffer
    pub fn clear_grad(&self) {
        *self.inner.grad.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Insertion-ordered collection of uniquely named parameters.
#[derive(Debug, Clone, Default)]
pub struct ParameterStore {
    params: Vec<Parameter>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter; names must be unique.
    pub fn push(&mut self, param: Parameter) -> Result<()> {
        if self.get(param.name()).is_some() {
            return Err(Error::DuplicateParameter(param.name().to_string()));
        }
        self.params.push(param);
        Ok(())
    }

    /// Create and append a parameter, returning a handle to it.
    pub fn add(&mut self, name: impl Into<String>, data: Vec<f32>) -> Result<Parameter> {
        let param = Parameter::new(name, data);
        self.push(param.clone())?;
        Ok(param)
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name() == name)
    }

    /// Parameters in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    pub fn as_slice(&self) -> &[Parameter] {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Total element count across all parameters
    pub fn total_numel(&self) -> usize {
        self.params.iter().map(Parameter::numel).sum()
    }

    /// Element size in bytes (storage is f32 throughout)
    pub fn element_size(&self) -> usize {
        self.params.first().map_or(std::mem::size_of::<f32>(), |p| p.data().element_size())
    }

    pub fn total_bytes(&self) -> usize {
        self.total_numel() * self.element_size()
    }
}
