//! Dropout variants used by the AWD-LSTM.

use candle_core::{DType, Device, Result, Shape, Tensor};

/// Scaled Bernoulli keep-mask: entries are `0` with probability `p`,
/// otherwise `1 / (1 - p)`.
pub fn dropout_mask<S: Into<Shape>>(shape: S, p: f32, device: &Device) -> Result<Tensor> {
    let noise = Tensor::rand(0f32, 1f32, shape, device)?;
    let keep = noise.ge(p)?.to_dtype(DType::F32)?;
    keep.affine(1.0 / (1.0 - p as f64), 0.0)
}

/// Dropout whose mask is shared across the time dimension of a
/// `[batch, seq_len, features]` tensor.
#[derive(Debug, Clone, Copy)]
pub struct RnnDropout {
    p: f32,
}

impl RnnDropout {
    pub fn new(p: f32) -> Self {
        Self { p }
    }

    pub fn forward(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        if !train || self.p <= 0.0 {
            return Ok(xs.clone());
        }
        let (bs, _, features) = xs.dims3()?;
        let mask = dropout_mask((bs, 1, features), self.p, xs.device())?;
        xs.broadcast_mul(&mask)
    }
}

/// Drop whole rows of an embedding matrix, i.e. every occurrence of a word.
pub fn embedding_dropout(weight: &Tensor, p: f32, train: bool) -> Result<Tensor> {
    if !train || p <= 0.0 {
        return Ok(weight.clone());
    }
    let (rows, _) = weight.dims2()?;
    let mask = dropout_mask((rows, 1), p, weight.device())?;
    weight.broadcast_mul(&mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eval_mode_is_identity() {
        let xs = Tensor::ones((2, 3, 4), DType::F32, &Device::Cpu).unwrap();
        let out = RnnDropout::new(0.5).forward(&xs, false).unwrap();
        let v: Vec<f32> = out.flatten_all().unwrap().to_vec1().unwrap();
        assert!(v.iter().all(|&x| x == 1.0));
    }

    #[test]
    fn mask_is_shared_over_time() {
        let xs = Tensor::ones((2, 5, 8), DType::F32, &Device::Cpu).unwrap();
        let out = RnnDropout::new(0.5).forward(&xs, true).unwrap();
        let v: Vec<Vec<Vec<f32>>> = out.to_vec3().unwrap();
        for batch in &v {
            for step in batch {
                assert_eq!(step, &batch[0]);
            }
        }
        assert!(v.iter().flatten().flatten().all(|&x| x == 0.0 || (x - 2.0).abs() < 1e-6));
    }

    #[test]
    fn embedding_rows_dropped_whole() {
        let w = Tensor::ones((16, 4), DType::F32, &Device::Cpu).unwrap();
        let out = embedding_dropout(&w, 0.5, true).unwrap();
        let rows: Vec<Vec<f32>> = out.to_vec2().unwrap();
        for row in rows {
            assert!(row.iter().all(|&x| x == row[0]));
        }
    }
}
