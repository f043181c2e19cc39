use serde::Serialize;

/// A model that can be selected and dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelDescriptor {
    /// Stable lookup key, e.g. `qwen`.
    pub key: &'static str,
    /// Model name sent upstream in the request body.
    pub name: &'static str,
    pub endpoint: &'static str,
    pub description: &'static str,
}

const BUILTIN_MODELS: &[ModelDescriptor] = &[
    ModelDescriptor {
        key: "qwen",
        name: "Qwen/Qwen1.5-0.5B-Chat",
        endpoint: "https://qwen-1-5b-chat-predictor.model-serving.snowcell.app/v1/chat/completions",
        description: "Qwen 1.5 0.5B Chat Model",
    },
    ModelDescriptor {
        key: "llama",
        name: "Meta-Llama/Llama-2-7b-chat",
        endpoint: "https://llama-2-7b-chat-predictor.model-serving.snowcell.app/v1/chat/completions",
        description: "Llama 2 7B Chat Model",
    },
    ModelDescriptor {
        key: "mistral",
        name: "mistralai/Mistral-7B-Instruct",
        endpoint: "https://mistral-7b-instruct-predictor.model-serving.snowcell.app/v1/chat/completions",
        description: "Mistral 7B Instruct Model",
    },
];

/// Immutable registry of the models SnowCell serves.
#[derive(Debug, Clone, Copy)]
pub struct ModelCatalog {
    entries: &'static [ModelDescriptor],
}

impl ModelCatalog {
    pub fn builtin() -> Self {
        Self {
            entries: BUILTIN_MODELS,
        }
    }

    /// Exact, case-sensitive lookup.
    pub fn get(&self, key: &str) -> Option<&'static ModelDescriptor> {
        self.entries.iter().find(|model| model.key == key)
    }

    pub fn list(&self) -> &'static [ModelDescriptor] {
        self.entries
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> {
        self.entries.iter().map(|model| model.key)
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
