// ============================================================
// Layer 5 — Backend Selection
// ============================================================
// The crate is generic over Burn backends; the concrete choice is
// made once, at the CLI boundary:
//
//   wgpu    — Autodiff<Wgpu>     GPU via WebGPU (default)
//   ndarray — Autodiff<NdArray>  pure CPU, no GPU required
//
// Work that must run on "whichever backend was picked" implements
// BackendTask; `dispatch` monomorphises it for the chosen one.
// Inference uses `B::InnerBackend` of the same choice.

use anyhow::Result;
use burn::{
    backend::{Autodiff, NdArray, Wgpu},
    tensor::backend::{AutodiffBackend, Backend},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Wgpu,
    NdArray,
}

pub type WgpuTraining    = Autodiff<Wgpu>;
pub type NdArrayTraining = Autodiff<NdArray>;

/// A unit of work that is generic over the training backend.
pub trait BackendTask {
    type Output;

    fn run<B: AutodiffBackend>(self, device: B::Device) -> Result<Self::Output>;
}

pub fn dispatch<T: BackendTask>(kind: BackendKind, task: T) -> Result<T::Output> {
    match kind {
        BackendKind::Wgpu => {
            let device = <WgpuTraining as Backend>::Device::default();
            tracing::info!("Using WGPU device: {:?}", device);
            task.run::<WgpuTraining>(device)
        }
        BackendKind::NdArray => {
            let device = <NdArrayTraining as Backend>::Device::default();
            tracing::info!("Using NdArray device: {:?}", device);
            task.run::<NdArrayTraining>(device)
        }
    }
}
