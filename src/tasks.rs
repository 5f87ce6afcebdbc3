//! Task entry points consumed by the CLI surface. Every function returns a
//! plain `String` in all cases: either the recovered payload or a terminal,
//! user-facing failure message. No provider error escapes this layer.

use crate::config::ModelChain;
use crate::extract::extract_payload;
use crate::invoke::{GenParams, Invoker, RetryPolicy};
use crate::llm::{ErrorKind, ModelProviderAdapter};
use crate::prompt::{
    build_prompt, AssistOptions, ExplainOptions, GenerateOptions, GenerationRequest, Task,
};
use crate::report;

pub struct TaskRunner<'a> {
    adapter: &'a dyn ModelProviderAdapter,
}

impl<'a> TaskRunner<'a> {
    pub fn new(adapter: &'a dyn ModelProviderAdapter) -> Self {
        Self { adapter }
    }

    fn invoker(&self, policy: RetryPolicy) -> Invoker<'a> {
        Invoker::new(self.adapter, policy)
    }

    /// Explain code or an error message. The only task with the patient
    /// retry policy: rate limits and timeouts are waited out before the
    /// chain degrades.
    pub async fn explain(
        &self,
        code: &str,
        is_error: bool,
        options: ExplainOptions,
        chain: &ModelChain,
        stream: bool,
    ) -> String {
        let prompt = build_prompt(&GenerationRequest {
            subject: code.to_string(),
            task: Task::Explain { is_error, options },
        });
        let params = GenParams::new(0.2, 2048).streaming(stream);
        let invocation = self
            .invoker(RetryPolicy::Patient)
            .run(&prompt, &chain.primary, &chain.fallbacks, &params)
            .await;
        match invocation.outcome {
            Ok(text) => text.trim().to_string(),
            Err(failure) => failure.patient_message(),
        }
    }

    /// Fix and secure code; the extractor defends against fenced output.
    pub async fn fix(&self, code: &str, chain: &ModelChain) -> String {
        let prompt =
            build_prompt(&GenerationRequest { subject: code.to_string(), task: Task::Fix });
        let params = GenParams::new(0.2, 4000);
        let invocation = self
            .invoker(RetryPolicy::Eager)
            .run(&prompt, &chain.primary, &chain.fallbacks, &params)
            .await;
        match invocation.outcome {
            Ok(text) => extract_payload(&text, None),
            Err(failure) => format!("Error during code fixing: {}", failure.last),
        }
    }

    /// Security scan; the model is asked for JSON and the normalizer renders
    /// the report, degrading gracefully on malformed output.
    pub async fn security_scan(&self, code: &str, chain: &ModelChain) -> String {
        let prompt = build_prompt(&GenerationRequest {
            subject: code.to_string(),
            task: Task::SecurityScan,
        });
        let params = GenParams::new(0.2, 4000).json();
        let invocation = self
            .invoker(RetryPolicy::Eager)
            .run(&prompt, &chain.primary, &chain.fallbacks, &params)
            .await;
        match invocation.outcome {
            Ok(text) => report::normalize(&text),
            Err(failure) => format!(
                "\u{274c} ERROR DURING SECURITY SCAN: {}\n\nPlease check your code format and try again.",
                failure.last
            ),
        }
    }

    /// Mermaid flow diagram for the given code.
    pub async fn flow_diagram(&self, code: &str, chain: &ModelChain) -> String {
        let prompt = build_prompt(&GenerationRequest {
            subject: code.to_string(),
            task: Task::FlowDiagram,
        });
        let params = GenParams::new(0.4, 4096);
        let invocation = self
            .invoker(RetryPolicy::Eager)
            .run(&prompt, &chain.primary, &chain.fallbacks, &params)
            .await;
        match invocation.outcome {
            Ok(text) => extract_payload(&text, None),
            Err(failure) => format!("Error generating flow diagram: {}", failure.last),
        }
    }

    /// Convert between languages. The post-pass strips language-name echoes
    /// and header lines the model sneaks in despite the "code only" rule.
    pub async fn convert(
        &self,
        code: &str,
        source_language: &str,
        target_language: &str,
        chain: &ModelChain,
    ) -> String {
        let prompt = build_prompt(&GenerationRequest {
            subject: code.to_string(),
            task: Task::Convert {
                source_language: source_language.to_string(),
                target_language: target_language.to_string(),
            },
        });
        let params = GenParams::new(0.2, 4000);
        let invocation = self
            .invoker(RetryPolicy::Eager)
            .run(&prompt, &chain.primary, &chain.fallbacks, &params)
            .await;
        match invocation.outcome {
            Ok(text) => extract_payload(&text, Some(target_language)),
            Err(failure) => format!("Error during code conversion: {}", failure.last),
        }
    }

    /// Generate code from a natural-language description. An empty
    /// description fails immediately with zero model calls.
    pub async fn generate(
        &self,
        description: &str,
        options: GenerateOptions,
        chain: &ModelChain,
        temperature: f32,
        max_tokens: u32,
        stream: bool,
    ) -> String {
        if description.trim().is_empty() {
            return "\u{274c} Invalid input: Text description must be a non-empty string."
                .to_string();
        }
        let prompt = build_prompt(&GenerationRequest {
            subject: description.to_string(),
            task: Task::Generate { options },
        });
        let params = GenParams::new(temperature, max_tokens).streaming(stream);
        let invocation = self
            .invoker(RetryPolicy::Eager)
            .run(&prompt, &chain.primary, &chain.fallbacks, &params)
            .await;
        match invocation.outcome {
            Ok(text) => extract_payload(&text, None),
            Err(failure) => {
                format!("\u{274c} All model attempts failed. Tried: {}", failure.attempted_list())
            }
        }
    }

    /// Q&A over a snippet.
    pub async fn assist(
        &self,
        code: &str,
        question: &str,
        options: AssistOptions,
        chain: &ModelChain,
    ) -> String {
        let prompt = build_prompt(&GenerationRequest {
            subject: code.to_string(),
            task: Task::Assist { question: question.to_string(), options },
        });
        let params = GenParams::new(0.7, 1024);
        let invocation = self
            .invoker(RetryPolicy::Eager)
            .run(&prompt, &chain.primary, &chain.fallbacks, &params)
            .await;
        match invocation.outcome {
            Ok(text) => text.trim().to_string(),
            Err(failure) => match failure.last.kind {
                ErrorKind::TimedOut => {
                    "The AI assistant timed out. Try simplifying your code or question.".to_string()
                }
                ErrorKind::InputTooLarge => {
                    "Your code is too large. Please provide a smaller snippet.".to_string()
                }
                ErrorKind::ModelUnavailable => {
                    "The selected AI model is unavailable. Try again later.".to_string()
                }
                _ => format!("AI assistant error: {}", failure.last),
            },
        }
    }
}
