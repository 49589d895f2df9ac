//! Dummy provider: echoes the user input back prefixed with `[echo]`.
//! Used for exercising the full request path without a real API key.

use crate::llm::{CompletionRequest, ProviderError};

#[derive(Debug, Clone)]
pub struct DummyProvider;

impl DummyProvider {
    pub async fn generate(&self, request: &CompletionRequest<'_>) -> Result<String, ProviderError> {
        Ok(format!("[echo] {}", request.user_input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn generate_prefixes_echo() {
        let p = DummyProvider;
        let req = CompletionRequest::new("system", "xin chào");
        assert_eq!(p.generate(&req).await.unwrap(), "[echo] xin chào");
    }

    #[tokio::test]
    async fn generate_empty_input() {
        let p = DummyProvider;
        let req = CompletionRequest::new("", "");
        assert_eq!(p.generate(&req).await.unwrap(), "[echo] ");
    }
}
