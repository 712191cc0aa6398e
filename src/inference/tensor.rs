//! Shape-aware tensor values exchanged with the inference backend.
//!
//! Tensors carry their own shape and stride arithmetic (via ndarray) so no
//! caller ever flattens multi-dimensional layouts by hand-computed indices.

use crate::error::{Result, SottoError};
use ndarray::{ArrayD, IxDyn};
use std::collections::HashMap;

/// A tensor value: float or integer data with an explicit shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Tensor {
    F32(ArrayD<f32>),
    I32(ArrayD<i32>),
}

impl Tensor {
    /// Build a float tensor from a flat buffer and shape.
    ///
    /// # Errors
    /// Returns `SottoError::TensorShape` if the buffer length does not match
    /// the product of the shape dimensions.
    pub fn from_f32(shape: &[usize], data: Vec<f32>) -> Result<Self> {
        let array =
            ArrayD::from_shape_vec(IxDyn(shape), data).map_err(|e| SottoError::TensorShape {
                network: "caller".to_string(),
                message: e.to_string(),
            })?;
        Ok(Tensor::F32(array))
    }

    /// Build an integer tensor from a flat buffer and shape.
    pub fn from_i32(shape: &[usize], data: Vec<i32>) -> Result<Self> {
        let array =
            ArrayD::from_shape_vec(IxDyn(shape), data).map_err(|e| SottoError::TensorShape {
                network: "caller".to_string(),
                message: e.to_string(),
            })?;
        Ok(Tensor::I32(array))
    }

    /// A scalar float tensor.
    pub fn scalar_f32(value: f32) -> Self {
        Tensor::F32(ArrayD::from_elem(IxDyn(&[1]), value))
    }

    /// The tensor's shape.
    pub fn shape(&self) -> &[usize] {
        match self {
            Tensor::F32(a) => a.shape(),
            Tensor::I32(a) => a.shape(),
        }
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        match self {
            Tensor::F32(a) => a.len(),
            Tensor::I32(a) => a.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow as a float array, if this is a float tensor.
    pub fn as_f32(&self) -> Option<&ArrayD<f32>> {
        match self {
            Tensor::F32(a) => Some(a),
            Tensor::I32(_) => None,
        }
    }

    /// Borrow as an integer array, if this is an integer tensor.
    pub fn as_i32(&self) -> Option<&ArrayD<i32>> {
        match self {
            Tensor::I32(a) => Some(a),
            Tensor::F32(_) => None,
        }
    }

    /// The first element of an integer tensor, in flat order.
    ///
    /// This is how single-token readouts (argmax results) are consumed.
    pub fn first_i32(&self) -> Option<i32> {
        self.as_i32().and_then(|a| a.iter().next().copied())
    }

    /// The first element of a float tensor, in flat order.
    pub fn first_f32(&self) -> Option<f32> {
        self.as_f32().and_then(|a| a.iter().next().copied())
    }
}

/// Named input set for a network invocation.
#[derive(Debug, Clone, Default)]
pub struct NamedTensors {
    tensors: HashMap<String, Tensor>,
}

impl NamedTensors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: &str, tensor: Tensor) -> Self {
        self.insert(name, tensor);
        self
    }

    pub fn insert(&mut self, name: &str, tensor: Tensor) {
        self.tensors.insert(name.to_string(), tensor);
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(name)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }
}

/// A single unnamed input, under the conventional default name.
pub fn single_input(tensor: Tensor) -> NamedTensors {
    NamedTensors::new().with(crate::inference::DEFAULT_INPUT, tensor)
}
