use std::collections::BTreeMap;

use thiserror::Error;

/// Dense row-major f32 tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TensorError {
    #[error("shape {shape:?} expects {expected} elements but {actual} were given")]
    ElementCount {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },
    #[error("index {index} out of range for leading dimension {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("cannot index into a scalar tensor")]
    Scalar,
}

impl Tensor {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self, TensorError> {
        let expected = element_count(&shape);
        if expected != data.len() {
            return Err(TensorError::ElementCount {
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = element_count(&shape);
        Self {
            shape,
            data: vec![0.0; len],
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Copies out slice `index` along the leading dimension.
    pub fn index_leading(&self, index: usize) -> Result<Tensor, TensorError> {
        let (&leading, rest) = self.shape.split_first().ok_or(TensorError::Scalar)?;
        if index >= leading {
            return Err(TensorError::IndexOutOfRange {
                index,
                len: leading,
            });
        }
        let stride = element_count(rest);
        let start = index * stride;
        Ok(Tensor {
            shape: rest.to_vec(),
            data: self.data[start..start + stride].to_vec(),
        })
    }
}

pub(crate) fn element_count(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Named parameter tensors, ordered by name.
pub type ParamSet = BTreeMap<String, Tensor>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_mismatched_element_count() {
        let err = Tensor::new(vec![2, 3], vec![0.0; 5]).expect_err("must fail");
        assert_eq!(
            err,
            TensorError::ElementCount {
                shape: vec![2, 3],
                expected: 6,
                actual: 5,
            }
        );
    }

    #[test]
    fn index_leading_extracts_contiguous_slice() {
        let tensor = Tensor::new(vec![3, 2], vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).expect("tensor");
        let row = tensor.index_leading(1).expect("row");
        assert_eq!(row.shape(), &[2]);
        assert_eq!(row.data(), &[2.0, 3.0]);
        assert_eq!(
            tensor.index_leading(3),
            Err(TensorError::IndexOutOfRange { index: 3, len: 3 })
        );
    }

    #[test]
    fn scalar_shape_has_one_element() {
        let scalar = Tensor::zeros(Vec::new());
        assert_eq!(scalar.len(), 1);
        assert_eq!(scalar.index_leading(0), Err(TensorError::Scalar));
    }
}
