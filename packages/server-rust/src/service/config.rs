use std::sync::Arc;

use crate::auth::{AuthFunc, RejectAll, SkipAuth, SkipList};
use crate::logging::BaseLogger;
use crate::pipeline::EnrichSpan;

/// Construction-time settings of the call pipeline.
///
/// Built once and handed to `CallPipeline::new`; nothing here is read from
/// process-wide state.
#[derive(Clone)]
pub struct PipelineConfig {
    /// Parent of every per-call logger.
    pub base_logger: BaseLogger,
    /// Consulted before any auth function. Defaults to skipping nothing.
    pub skip: Arc<dyn SkipAuth>,
    /// Used for services without an override. Defaults to [`RejectAll`].
    pub default_auth: Arc<dyn AuthFunc>,
    /// Optional extra fields for the per-call logger.
    pub enrich: Option<Arc<dyn EnrichSpan>>,
}

impl PipelineConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_base_logger(mut self, base_logger: BaseLogger) -> Self {
        self.base_logger = base_logger;
        self
    }

    #[must_use]
    pub fn with_skip(mut self, skip: impl SkipAuth) -> Self {
        self.skip = Arc::new(skip);
        self
    }

    #[must_use]
    pub fn with_default_auth(mut self, auth: impl AuthFunc) -> Self {
        self.default_auth = Arc::new(auth);
        self
    }

    #[must_use]
    pub fn with_enrich(mut self, enrich: impl EnrichSpan) -> Self {
        self.enrich = Some(Arc::new(enrich));
        self
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_logger: BaseLogger::default(),
            skip: Arc::new(SkipList::new()),
            default_auth: Arc::new(RejectAll),
            enrich: None,
        }
    }
}

impl std::fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("base_logger", &self.base_logger)
            .field("enrich", &self.enrich.is_some())
            .finish_non_exhaustive()
    }
}
