//! Gradient-bearing parameters as seen by the reduction manager.
//!
//! A [`ParameterSet`] is built once, in one of two modes that never change
//! afterwards:
//!
//! - **Flattened**: one contiguous gradient buffer whose ranges alias every
//!   parameter's own gradient, so a single reduction covers them all.
//! - **Per-parameter**: each named gradient is reduced on its own, in
//!   insertion order; parameters without a gradient are skipped.

mod buffer;
mod parameter;

pub use buffer::Buffer;
pub use parameter::{Parameter, ParameterStore};

use tracing::debug;

/// Build one contiguous gradient buffer aliased by every parameter.
///
/// Existing gradient values are copied into their range; parameters without
/// a gradient get a zeroed range. Each parameter's gradient is then rebound
/// to its view, so later writes through the parameter land in the flat
/// buffer without copying.
pub fn flatten_grads(params: &[Parameter]) -> Buffer {
    let total: usize = params.iter().map(Parameter::numel).sum();
    let flat = Buffer::zeros(total);

    let mut offset = 0;
    for param in params {
        let view = flat.view(offset..offset + param.numel());
        if let Some(existing) = param.grad() {
            let values = existing.to_vec();
            view.write(|dst| dst.copy_from_slice(&values));
        }
        param.set_grad(view);
        offset += param.numel();
    }
    debug!(parameters = params.len(), numel = total, "flattened gradients");
    flat
}

/// Gradients participating in reduction, in one fixed mode.
#[derive(Debug, Clone)]
pub enum ParameterSet {
    /// Single aliasing buffer covering every parameter
    Flattened {
        grad: Buffer,
        params: Vec<Parameter>,
    },
    /// One buffer per named parameter, reduced in insertion order
    PerParameter(Vec<Parameter>),
}

impl ParameterSet {
    /// Flatten the store's gradients into one aliasing buffer.
    pub fn flattened(store: &ParameterStore) -> Self {
        let params = store.as_slice().to_vec();
        let grad = flatten_grads(&params);
        Self::Flattened { grad, params }
    }

    /// Reduce each parameter's gradient separately.
    pub fn per_parameter(store: &ParameterStore) -> Self {
        Self::PerParameter(store.as_slice().to_vec())
    }

    pub fn is_flattened(&self) -> bool {
        matches!(self, Self::Flattened { .. })
    }

    /// Parameters in reduction order
    pub fn parameters(&self) -> &[Parameter] {
        match self {
            Self::Flattened { params, .. } | Self::PerParameter(params) => params,
        }
    }

    /// Total element count across all parameters
    pub fn total_numel(&self) -> usize {
        self.parameters().iter().map(Parameter::numel).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ParameterStore {
        let mut store = ParameterStore::new();
        store.add("embed", vec![0.0; 3]).unwrap();
        store.add("bias", vec![0.0; 2]).unwrap();
        store
    }

    #[test]
    fn test_flatten_copies_existing_grads() {
        let store = store();
        store.get("embed").unwrap().ensure_grad().write(|g| g.copy_from_slice(&[1.0, 2.0, 3.0]));

        let flat = flatten_grads(store.as_slice());
        assert_eq!(flat.numel(), 5);
        assert_eq!(flat.to_vec(), vec![1.0, 2.0, 3.0, 0.0, 0.0]);
    }

    #[test]
    fn test_flatten_rebinds_parameter_grads() {
        let store = store();
        let flat = flatten_grads(store.as_slice());

        let bias = store.get("bias").unwrap().grad().unwrap();
        assert!(bias.aliases(&flat));
        assert_eq!(bias.range(), 3..5);

        bias.write(|g| g.copy_from_slice(&[8.0, 9.0]));
        assert_eq!(flat.to_vec(), vec![0.0, 0.0, 0.0, 8.0, 9.0]);

        flat.write(|g| g[0] = 4.0);
        assert_eq!(store.get("embed").unwrap().grad().unwrap().to_vec()[0], 4.0);
    }

    #[test]
    fn test_parameter_set_modes() {
        let store = store();
        let per = ParameterSet::per_parameter(&store);
        assert!(!per.is_flattened());
        assert_eq!(per.total_numel(), 5);

        let flat = ParameterSet::flattened(&store);
        assert!(flat.is_flattened());
        assert_eq!(flat.parameters().len(), 2);
        assert_eq!(flat.parameters()[0].name(), "embed");
    }

    #[test]
    fn test_flatten_empty_store() {
        let flat = flatten_grads(&[]);
        assert!(flat.is_empty());
    }
}
