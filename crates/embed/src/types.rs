use serde::{Deserialize, Serialize};

/// Embedding output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Embedding {
    /// Final embedding values.
    pub vector: Vec<f32>,
    /// Name of the model that produced the vector.
    pub model_name: String,
    /// Whether [`vector`](Self::vector) was L2-normalized.
    pub normalized: bool,
}

impl Embedding {
    /// Wrap a provider vector, scaling it to unit length when `normalize` is set.
    ///
    /// An all-zero vector has no direction and is kept as-is.
    pub fn from_raw(mut vector: Vec<f32>, model_name: impl Into<String>, normalize: bool) -> Self {
        if normalize {
            scale_to_unit(&mut vector);
        }
        Self {
            vector,
            model_name: model_name.into(),
            normalized: normalize,
        }
    }

    pub fn dimension(&self) -> usize {
        self.vector.len()
    }
}

fn scale_to_unit(vector: &mut [f32]) {
    let length = vector.iter().fold(0f32, |acc, x| acc + x * x).sqrt();
    if length == 0.0 {
        return;
    }
    vector.iter_mut().for_each(|x| *x /= length);
}
