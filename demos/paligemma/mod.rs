use kornia_vlm::paligemma::{Paligemma, PaligemmaConfig, PaligemmaError};
use kornia_vqa::{ComputeDevice, EngineConfig, ModelLoadError, ModelLoader, VqaModel, VqaRequest};

/// The checkpoint downloaded by `kornia_vlm::paligemma`.
pub const PALIGEMMA_MODEL: &str = "google/paligemma-3b-mix-224";

// custom model that uses Paligemma to answer questions
pub struct PaligemmaModel(Paligemma);

impl VqaModel for PaligemmaModel {
    type Error = PaligemmaError;

    fn answer(&mut self, request: VqaRequest<'_>) -> Result<String, Self::Error> {
        // the mix checkpoints expect the task prefix
        let prompt = format!("answer en {}", request.question);
        self.0
            .inference(request.image, &prompt, request.max_tokens, false)
    }
}

pub struct PaligemmaLoader;

impl ModelLoader for PaligemmaLoader {
    type Model = PaligemmaModel;

    fn accelerator_available(&self) -> bool {
        cfg!(feature = "cuda")
    }

    fn load(
        &self,
        config: &EngineConfig,
        device: ComputeDevice,
    ) -> Result<Self::Model, ModelLoadError> {
        if config.model_identifier != PALIGEMMA_MODEL {
            return Err(ModelLoadError::UnsupportedModel(
                config.model_identifier.clone(),
            ));
        }

        // kornia-vlm picks the cuda device on its own when built with it
        if cfg!(feature = "cuda") != device.is_accelerator() {
            return Err(ModelLoadError::DeviceUnavailable(device));
        }

        // greedy decoding
        let paligemma_config = PaligemmaConfig {
            temp: None,
            top_p: None,
            ..Default::default()
        };
        let model = Paligemma::new(paligemma_config).map_err(ModelLoadError::backend)?;

        Ok(PaligemmaModel(model))
    }
}
