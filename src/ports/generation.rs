use super::PortError;
use async_trait::async_trait;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationEngine: Send + Sync {
    /// Generate text for `instruction`, grounded in `context`
    async fn generate(&self, context: &str, instruction: &str) -> Result<String, PortError>;
}
