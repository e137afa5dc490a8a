// ============================================================
// Layer 5 — Gradient Utilities
// ============================================================
// Burn's built-in optimizer clipping works tensor by tensor. The
// trainer needs the GLOBAL norm across every trainable parameter
// (and a way to rescale all gradients at once for loss-scaling),
// so both are done here by walking the module's parameters with a
// ModuleVisitor and rewriting their entries in GradientsParams.
//
//   global norm = sqrt( Σ_params Σ_elements g² )
//   clip:   if norm > max → every g *= max / norm
//
// Reference: Burn Book §5 (Custom Training Loops)
//            Pascanu et al. (2013) On the difficulty of training RNNs

use std::marker::PhantomData;

use burn::{
    module::{AutodiffModule, ModuleVisitor, ParamId},
    optim::GradientsParams,
    prelude::*,
    tensor::backend::AutodiffBackend,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipReport {
    pub norm_before: f64,
    pub norm_after:  f64,
    pub clipped:     bool,
}

/// Factor that brings `norm` down to `max_norm`; 1.0 when already inside.
pub fn clip_coefficient(norm: f64, max_norm: f64) -> f64 {
    if norm > max_norm && norm > 0.0 { max_norm / norm } else { 1.0 }
}

struct GradNormVisitor<'a, B: AutodiffBackend> {
    grads:   &'a GradientsParams,
    sum_sq:  f64,
    _marker: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for GradNormVisitor<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.get::<B::InnerBackend, D>(id) {
            self.sum_sq += grad.powf_scalar(2.0).sum().into_scalar().elem::<f64>();
        }
    }
}

struct GradScaleVisitor<'a, B: AutodiffBackend> {
    grads:   &'a mut GradientsParams,
    factor:  f64,
    _marker: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for GradScaleVisitor<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(id) {
            self.grads.register::<B::InnerBackend, D>(id, grad.mul_scalar(self.factor));
        }
    }
}

/// L2 norm over every gradient registered for `model`'s parameters.
/// Returns NaN / inf when any gradient is non-finite.
pub fn global_grad_norm<B, M>(model: &M, grads: &GradientsParams) -> f64
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let mut visitor = GradNormVisitor::<B> { grads, sum_sq: 0.0, _marker: PhantomData };
    model.visit(&mut visitor);
    visitor.sum_sq.sqrt()
}

/// Multiply every gradient of `model` by `factor`.
pub fn scale_grads<B, M>(model: &M, grads: &mut GradientsParams, factor: f64)
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    if factor == 1.0 {
        return;
    }
    let mut visitor = GradScaleVisitor::<B> { grads, factor, _marker: PhantomData };
    model.visit(&mut visitor);
}

/// Rescale gradients so their global norm is at most `max_norm`.
pub fn clip_grad_norm<B, M>(model: &M, grads: &mut GradientsParams, max_norm: f64) -> ClipReport
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let norm_before = global_grad_norm::<B, M>(model, grads);
    let coef = clip_coefficient(norm_before, max_norm);
    if coef < 1.0 {
        scale_grads::<B, M>(model, grads, coef);
        ClipReport { norm_before, norm_after: max_norm, clipped: true }
    } else {
        ClipReport { norm_before, norm_after: norm_before, clipped: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::{OutputMode, Scorer, SentimentModel, SentimentModelConfig};
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::Distribution;

    type TestBackend = Autodiff<NdArray>;

    fn grads_with_scale(scale: f64) -> (SentimentModel<TestBackend>, GradientsParams) {
        let device = Default::default();
        let model = SentimentModelConfig::new(8, 3, OutputMode::Sigmoid)
            .with_dropout(0.0)
            .init::<TestBackend>(&device)
            .unwrap();
        let x = Tensor::<TestBackend, 2>::random([4, 8], Distribution::Normal(0.0, 1.0), &device);
        let loss = model.score(x).sum().mul_scalar(scale);
        let grads = GradientsParams::from_grads(loss.backward(), &model);
        (model, grads)
    }

    #[test]
    fn test_large_gradient_is_clipped_to_max() {
        let (model, mut grads) = grads_with_scale(1e4);
        let report = clip_grad_norm::<TestBackend, _>(&model, &mut grads, 1.0);
        assert!(report.clipped);
        assert!(report.norm_before > 1.0);
        let after = global_grad_norm::<TestBackend, _>(&model, &grads);
        assert!((after - 1.0).abs() < 1e-4, "post-clip norm {after}");
    }

    #[test]
    fn test_small_gradient_is_untouched() {
        let (model, mut grads) = grads_with_scale(1e-6);
        let before = global_grad_norm::<TestBackend, _>(&model, &grads);
        let report = clip_grad_norm::<TestBackend, _>(&model, &mut grads, 1.0);
        assert!(!report.clipped);
        let after = global_grad_norm::<TestBackend, _>(&model, &grads);
        assert_eq!(before, after);
    }

    #[test]
    fn test_scale_grads_scales_norm_linearly() {
        let (model, mut grads) = grads_with_scale(1.0);
        let before = global_grad_norm::<TestBackend, _>(&model, &grads);
        scale_grads::<TestBackend, _>(&model, &mut grads, 0.5);
        let after = global_grad_norm::<TestBackend, _>(&model, &grads);
        assert!((after - before * 0.5).abs() < 1e-6 * before.max(1.0));
    }

    #[test]
    fn test_clip_coefficient() {
        assert_eq!(clip_coefficient(0.5, 1.0), 1.0);
        assert_eq!(clip_coefficient(1.0, 1.0), 1.0);
        assert_eq!(clip_coefficient(4.0, 1.0), 0.25);
    }
}
