pub mod auth;
pub mod catalog;
pub mod completion;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod provider;
pub mod selection;
pub mod session;
pub mod sse;
pub mod store;
pub mod stream;
pub mod telemetry;

pub use auth::{AcceptAny, Account, Authenticator, UserDirectory};
pub use catalog::{ModelCatalog, ModelDescriptor};
pub use completion::{
    ChatMessage, Choice, CompletionRequest, CompletionResult, GenerationParams, MessageRole,
    ReplyMessage, ResponseChunk, Usage,
};
pub use config::{ConfigError, RemoteSettings, Settings};
pub use dispatch::{Dispatch, Dispatcher};
pub use error::{Result, SncError};
pub use provider::{
    CompletionProvider, FailurePolicy, MockProvider, ProviderClient, ProviderKind, RemoteProvider,
};
pub use selection::{Selection, SelectionStore};
pub use session::{Session, SessionStore};
pub use store::StateStore;
pub use stream::{accumulate, ChunkStream};
