pub mod alternate_source;
pub mod context;
pub mod engine;
pub mod interceptor;
pub mod token_cache;

pub use alternate_source::{AlternateSourceProber, CleanSource};
pub use context::{EngineContext, EngineStats, InMemoryPersistence, LogEntry, PersistencePort};
pub use engine::{ManifestSource, ProcessedManifest, StreamCleaner};
pub use interceptor::Interceptor;
pub use token_cache::{GqlTokenIssuer, PlaybackToken, TokenCache, TokenIssuer, TokenKey, TokenRelay};
