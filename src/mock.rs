//! In-process models used by the unit tests.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
    mpsc,
};

use kornia_image::{Image, allocator::CpuAllocator};

use crate::{
    config::EngineConfig,
    device::ComputeDevice,
    error::ModelLoadError,
    model::{ModelLoader, VqaModel, VqaRequest},
    upload::RgbImage,
};

#[derive(thiserror::Error, Debug)]
#[error("{0}")]
pub(crate) struct MockError(pub String);

pub(crate) fn solid_image(width: usize, height: usize, rgb: [u8; 3]) -> RgbImage {
    let data = (0..width * height).flat_map(|_| rgb).collect();
    Image::new([width, height].into(), data, CpuAllocator).expect("valid test image")
}

/// Names the dominant channel of the first pixel, like a tiny greedy model would.
pub(crate) struct ColorModel {
    pub calls: Arc<AtomicUsize>,
}

impl ColorModel {
    pub fn new() -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                calls: calls.clone(),
            },
            calls,
        )
    }
}

impl VqaModel for ColorModel {
    type Error = MockError;

    fn answer(&mut self, request: VqaRequest<'_>) -> Result<String, Self::Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let pixel = request
            .image
            .as_slice()
            .get(..3)
            .ok_or_else(|| MockError("empty image".to_string()))?;
        let color = match pixel.iter().enumerate().max_by_key(|(_, v)| **v) {
            Some((0, _)) => "red",
            Some((1, _)) => "green",
            _ => "blue",
        };
        Ok(format!("{color}<eos>"))
    }
}

/// Always fails with the given cause.
pub(crate) struct FailingModel(pub String);

impl VqaModel for FailingModel {
    type Error = MockError;

    fn answer(&mut self, _request: VqaRequest<'_>) -> Result<String, Self::Error> {
        Err(MockError(self.0.clone()))
    }
}

/// Returns a fixed raw output.
pub(crate) struct FixedModel(pub String);

impl VqaModel for FixedModel {
    type Error = MockError;

    fn answer(&mut self, _request: VqaRequest<'_>) -> Result<String, Self::Error> {
        Ok(self.0.clone())
    }
}

/// Blocks inside `answer` until released.
pub(crate) struct GateModel {
    pub entered: mpsc::Sender<()>,
    pub release: mpsc::Receiver<()>,
}

impl VqaModel for GateModel {
    type Error = MockError;

    fn answer(&mut self, _request: VqaRequest<'_>) -> Result<String, Self::Error> {
        let _ = self.entered.send(());
        self.release
            .recv()
            .map_err(|_| MockError("gate dropped".to_string()))?;
        Ok("done".to_string())
    }
}

/// Panics on every call.
pub(crate) struct PanickingModel;

impl VqaModel for PanickingModel {
    type Error = MockError;

    fn answer(&mut self, _request: VqaRequest<'_>) -> Result<String, Self::Error> {
        panic!("model crashed");
    }
}

pub(crate) struct ColorLoader {
    pub accelerator: bool,
    pub calls: Arc<AtomicUsize>,
}

impl ModelLoader for ColorLoader {
    type Model = ColorModel;

    fn accelerator_available(&self) -> bool {
        self.accelerator
    }

    fn load(
        &self,
        config: &EngineConfig,
        _device: ComputeDevice,
    ) -> Result<Self::Model, ModelLoadError> {
        if config.model_identifier != "mock/color" {
            return Err(ModelLoadError::UnsupportedModel(
                config.model_identifier.clone(),
            ));
        }
        Ok(ColorModel {
            calls: self.calls.clone(),
        })
    }
}
