//! Prompt construction for every assistant task. All builders are pure and
//! total: unrecognized option values fall back to documented defaults, never
//! to an error.

/// Per-task configuration. A request is built fresh per user action and never
/// mutated afterwards.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub subject: String,
    pub task: Task,
}

#[derive(Debug, Clone)]
pub enum Task {
    /// Explain code, or an error message when `is_error` is set.
    Explain { is_error: bool, options: ExplainOptions },
    /// Fix and secure code, returning code only.
    Fix,
    /// Security vulnerability scan with a fenced-JSON report.
    SecurityScan,
    /// Mermaid flow diagram for the code.
    FlowDiagram,
    /// Convert between languages, code only.
    Convert { source_language: String, target_language: String },
    /// Generate code from a natural-language description.
    Generate { options: GenerateOptions },
    /// Q&A over a snippet.
    Assist { question: String, options: AssistOptions },
}

#[derive(Debug, Clone)]
pub struct ExplainOptions {
    pub programming_language: Option<String>,
    pub detail_level: String,
    pub highlight_important_parts: bool,
    pub include_examples: bool,
    pub include_diagrams: bool,
}

impl Default for ExplainOptions {
    fn default() -> Self {
        Self {
            programming_language: None,
            detail_level: "beginner".into(),
            highlight_important_parts: true,
            include_examples: true,
            include_diagrams: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub language: Option<String>,
    pub include_comments: bool,
    pub optimize_for: String,
    pub context_aware: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            language: None,
            include_comments: false,
            optimize_for: "readability".into(),
            context_aware: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssistOptions {
    pub expertise_level: String,
    pub include_examples: bool,
    pub language: Option<String>,
}

impl Default for AssistOptions {
    fn default() -> Self {
        Self { expertise_level: "beginner".into(), include_examples: true, language: None }
    }
}

pub fn build_prompt(request: &GenerationRequest) -> String {
    match &request.task {
        Task::Explain { is_error, options } => build_explain(&request.subject, *is_error, options),
        Task::Fix => build_fix(&request.subject),
        Task::SecurityScan => build_security_scan(&request.subject),
        Task::FlowDiagram => build_flow_diagram(&request.subject),
        Task::Convert { source_language, target_language } => {
            build_convert(&request.subject, source_language, target_language)
        }
        Task::Generate { options } => build_generate(&request.subject, options),
        Task::Assist { question, options } => build_assist(&request.subject, question, options),
    }
}

/// (style, format, depth) instruction triple per detail level.
fn detail_config(level: &str) -> (&'static str, &'static str, &'static str) {
    match level {
        "intermediate" => (
            "Use straightforward explanations assuming basic programming knowledge.",
            "Organize the explanation by logical components or functions.",
            "Include explanations of common patterns and programming concepts.",
        ),
        "advanced" => (
            "Use technical language assuming substantial programming experience.",
            "Focus on non-obvious aspects and design decisions.",
            "Include performance considerations and alternative approaches.",
        ),
        // Unknown levels behave as "beginner".
        _ => (
            "Use simple language as if explaining to someone with no programming experience. Define all technical terms.",
            "Break down the explanation into small, easy-to-understand sections.",
            "Focus on the basic purpose of each line, avoiding complex concepts unless necessary.",
        ),
    }
}

fn build_explain(code: &str, is_error: bool, options: &ExplainOptions) -> String {
    let language_part = match &options.programming_language {
        Some(lang) => format!("This is {} code.", lang),
        None => "Please identify what programming language this is before explaining it.".to_string(),
    };

    let (style, format, depth) = detail_config(&options.detail_level);

    let highlight_part = if options.highlight_important_parts {
        "\nHighlight important parts of the code by:\n\
         1. **Bolding key variables, functions, and control structures**\n\
         2. Explaining critical lines with \u{1f4a1} emoji at the start\n\
         3. Flagging potential issues with \u{26a0}\u{fe0f} emoji\n\
         4. Using bullet points for step-by-step explanations\n"
    } else {
        ""
    };

    let examples_part = if options.include_examples {
        "\nInclude 1-2 simple, concrete examples showing how the code works with specific inputs and outputs.\n\
         For errors, show a corrected version of the code.\n"
    } else {
        ""
    };

    let diagram_part = if options.include_diagrams {
        "\nInclude a simple ASCII or markdown diagram to visually explain the code flow or data structures\n\
         when it would help understanding.\n"
    } else {
        ""
    };

    if is_error {
        format!(
            "Explain the following error message in a very beginner-friendly way:\n\n\
             ERROR:\n```\n{code}\n```\n\n\
             {language_part}\n\n\
             EXPLANATION GUIDELINES:\n\
             - Start with a simple explanation of what went wrong in plain English\n\
             - Explain exactly which part of the code caused the error\n\
             - Suggest 2-3 specific ways to fix the error\n\
             - {style}\n\
             - {format}\n\
             - {depth}\n\
             {highlight_part}{examples_part}{diagram_part}\n\
             Conclude with a one-sentence summary of what the programmer should remember to avoid this error in the future.\n"
        )
    } else {
        format!(
            "Explain the following code in a very beginner-friendly way:\n\n\
             CODE:\n```\n{code}\n```\n\n\
             {language_part}\n\n\
             EXPLANATION GUIDELINES:\n\
             - Start with a simple overview of what this code does in 1-2 sentences\n\
             - Then walk through the code step-by-step\n\
             - Explain the purpose of each major section\n\
             - {style}\n\
             - {format}\n\
             - {depth}\n\
             {highlight_part}{examples_part}{diagram_part}\n\
             Conclude with a bullet list summary of key concepts demonstrated in this code.\n"
        )
    }
}

fn build_fix(code: &str) -> String {
    format!(
        "You are an expert programmer proficient in multiple programming languages.\n\n\
         I need you to fix and secure the following code:\n\n\
         ```\n{code}\n```\n\n\
         Please provide only the fixed and secure code without any explanations or comments.\n\
         Make sure to preserve the functionality and logic of the original code.\n\
         Use idiomatic patterns and best practices for the language.\n"
    )
}

fn build_security_scan(code: &str) -> String {
    // The report normalizer depends on this exact response schema.
    format!(
        "You are an expert in code security and vulnerability analysis.\n\n\
         Analyze the following code for security vulnerabilities, including but not limited to:\n\
         - Injection vulnerabilities (SQL, command, etc.)\n\
         - Insecure cryptography\n\
         - Authentication issues\n\
         - Authorization flaws\n\
         - Data validation problems\n\
         - Hardcoded credentials\n\
         - Insecure file operations\n\
         - Race conditions\n\
         - Memory management issues\n\
         - Input validation\n\n\
         ```\n{code}\n```\n\n\
         For each vulnerability found:\n\
         1. Provide a clear description of the vulnerability\n\
         2. Explain why it's a security concern\n\
         3. Rate its severity (Critical, High, Medium, Low)\n\
         4. Provide a complete code example that fixes the issue\n\n\
         If no security issues are found, explicitly state \"NO SECURITY ISSUES DETECTED\" and explain why the code appears secure.\n\n\
         Format your response as JSON inside a fenced code block with the following structure:\n\
         ```json\n\
         {{\n\
             \"status\": \"secure\" or \"vulnerable\",\n\
             \"issues\": [\n\
                 {{\n\
                     \"type\": \"vulnerability type\",\n\
                     \"severity\": \"Critical/High/Medium/Low\",\n\
                     \"description\": \"detailed description\",\n\
                     \"explanation\": \"why this is a security concern\",\n\
                     \"fix\": \"complete code fix\"\n\
                 }}\n\
             ]\n\
         }}\n\
         ```\n\n\
         If the code is secure, return an empty issues array.\n"
    )
}

fn build_flow_diagram(code: &str) -> String {
    format!(
        "You are an expert programmer who specializes in creating BEGINNER-FRIENDLY explanations.\n\n\
         Please generate a simple, easy-to-understand flow diagram for this code:\n\n\
         ```\n{code}\n```\n\n\
         Important requirements:\n\
         1. Make the diagram EXTREMELY beginner-friendly with clear labels\n\
         2. Include comments explaining what each step does\n\
         3. Use simple language - avoid technical jargon\n\
         4. Break complex operations into smaller steps\n\
         5. Provide the diagram ONLY in Mermaid syntax\n\
         6. Do not include any explanatory text outside the Mermaid code\n\n\
         Return ONLY the Mermaid diagram code.\n"
    )
}

fn build_convert(code: &str, source_language: &str, target_language: &str) -> String {
    format!(
        "You are an expert programmer proficient in multiple programming languages.\n\n\
         I need you to convert the following {source_language} code to {target_language}.\n\n\
         ```{fence_tag}\n{code}\n```\n\n\
         Please provide only the converted {target_language} code without any explanations or comments.\n\
         Make sure to preserve the functionality and logic of the original code.\n\
         Use idiomatic {target_language} patterns and best practices.\n\n\
         IMPORTANT: Return ONLY the code, no markdown code blocks, no explanations.\n",
        fence_tag = source_language.to_lowercase(),
    )
}

/// Preset block of code-generation priorities. Unknown goals behave as
/// "readability".
fn optimization_preset(goal: &str) -> &'static str {
    match goal {
        "efficiency" => {
            "Optimize for performance with:\n\
             - Efficient algorithms\n\
             - Minimal computational complexity\n\
             - Memory optimization\n\
             - Parallelization where possible"
        }
        "brevity" => {
            "Create concise code with:\n\
             - Minimal boilerplate\n\
             - Language idioms\n\
             - Compact syntax\n\
             - Removed redundancy"
        }
        _ => {
            "Prioritize clean, well-documented code with:\n\
             - Meaningful variable names\n\
             - Proper indentation\n\
             - Section comments\n\
             - Clear structure"
        }
    }
}

fn build_generate(description: &str, options: &GenerateOptions) -> String {
    let mut sections = vec![format!("CODE GENERATION TASK: {}", description)];
    if options.context_aware {
        sections.push("CONTEXT: Generate robust code that handles edge cases and validates inputs".to_string());
    }
    sections.push(format!(
        "TARGET LANGUAGE: {}",
        options.language.as_deref().unwrap_or("Auto-select")
    ));
    sections.push(format!("OPTIMIZATION GOAL: {}", optimization_preset(&options.optimize_for)));
    sections.push("ADDITIONAL REQUIREMENTS:".to_string());
    sections.push(format!(
        "- {} detailed comments",
        if options.include_comments { "Include" } else { "Exclude" }
    ));
    sections.push("- Generate production-ready code".to_string());
    sections.push("- Use modern best practices".to_string());
    sections.push("- Include error handling".to_string());
    sections.push("- Output in markdown code blocks".to_string());
    sections.join("\n")
}

fn expertise_instructions(level: &str) -> &'static str {
    match level {
        "intermediate" => {
            "- Balance explanation and practical solutions.\n\
             - Suggest best practices and patterns."
        }
        "expert" => {
            "- Focus on concise, efficient solutions.\n\
             - Discuss trade-offs and optimizations."
        }
        _ => {
            "- Use simple explanations and define technical terms.\n\
             - Break down solutions step by step.\n\
             - Avoid jargon unless explained.\n\
             - Encourage and be friendly."
        }
    }
}

fn build_assist(code: &str, question: &str, options: &AssistOptions) -> String {
    let language_hint = match &options.language {
        Some(lang) => format!("The code is written in {}.", lang),
        None => "Please identify the programming language.".to_string(),
    };
    let example_instruction =
        if options.include_examples { "Include 1-2 clear examples." } else { "" };
    let instructions = expertise_instructions(&options.expertise_level);

    format!(
        "You are an expert AI code assistant.\n\n\
         CODE:\n{code}\n\n\
         QUESTION:\n{question}\n\n\
         {language_hint}\n\n\
         INSTRUCTIONS:\n\
         - Tailor your help for a {level} programmer.\n\
         - {example_instruction}\n\
         - Identify the issue clearly.\n\
         - Explain solutions simply.\n\
         - Show corrected code if needed.\n\
         {instructions}\n",
        level = options.expertise_level,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn explain_request(options: ExplainOptions) -> GenerationRequest {
        GenerationRequest {
            subject: "print('hi')".into(),
            task: Task::Explain { is_error: false, options },
        }
    }

    #[test]
    fn unknown_detail_level_behaves_as_beginner() {
        let beginner = build_prompt(&explain_request(ExplainOptions {
            detail_level: "beginner".into(),
            ..ExplainOptions::default()
        }));
        let unknown = build_prompt(&explain_request(ExplainOptions {
            detail_level: "wizard".into(),
            ..ExplainOptions::default()
        }));
        assert_eq!(beginner, unknown);
    }

    #[test]
    fn language_hint_vs_auto_detect() {
        let with_lang = build_prompt(&explain_request(ExplainOptions {
            programming_language: Some("Python".into()),
            ..ExplainOptions::default()
        }));
        assert!(with_lang.contains("This is Python code."));

        let auto = build_prompt(&explain_request(ExplainOptions::default()));
        assert!(auto.contains("identify what programming language"));
    }

    #[test]
    fn error_variant_changes_framing_and_closing() {
        let code = build_prompt(&GenerationRequest {
            subject: "x".into(),
            task: Task::Explain { is_error: false, options: ExplainOptions::default() },
        });
        let error = build_prompt(&GenerationRequest {
            subject: "x".into(),
            task: Task::Explain { is_error: true, options: ExplainOptions::default() },
        });
        assert!(code.contains("bullet list summary"));
        assert!(error.contains("what went wrong"));
        assert!(error.contains("one-sentence summary"));
    }

    #[test]
    fn optional_fragments_toggle() {
        let all_off = build_prompt(&explain_request(ExplainOptions {
            highlight_important_parts: false,
            include_examples: false,
            include_diagrams: false,
            ..ExplainOptions::default()
        }));
        assert!(!all_off.contains("Bolding key variables"));
        assert!(!all_off.contains("concrete examples"));
        assert!(!all_off.contains("ASCII or markdown diagram"));

        let diagrams = build_prompt(&explain_request(ExplainOptions {
            include_diagrams: true,
            ..ExplainOptions::default()
        }));
        assert!(diagrams.contains("ASCII or markdown diagram"));
    }

    #[test]
    fn generate_prompt_sections() {
        let prompt = build_prompt(&GenerationRequest {
            subject: "a fizzbuzz function".into(),
            task: Task::Generate {
                options: GenerateOptions {
                    language: Some("Rust".into()),
                    include_comments: true,
                    optimize_for: "brevity".into(),
                    context_aware: true,
                },
            },
        });
        assert!(prompt.starts_with("CODE GENERATION TASK: a fizzbuzz function"));
        // context line sits directly after the task line
        let second_line = prompt.lines().nth(1).unwrap();
        assert!(second_line.starts_with("CONTEXT:"));
        assert!(prompt.contains("TARGET LANGUAGE: Rust"));
        assert!(prompt.contains("Minimal boilerplate"));
        assert!(prompt.contains("- Include detailed comments"));
    }

    #[test]
    fn generate_unknown_goal_defaults_to_readability() {
        let prompt = build_prompt(&GenerationRequest {
            subject: "sort a list".into(),
            task: Task::Generate {
                options: GenerateOptions {
                    optimize_for: "speediness".into(),
                    ..GenerateOptions::default()
                },
            },
        });
        assert!(prompt.contains("Meaningful variable names"));
    }

    #[test]
    fn convert_prompt_names_both_languages() {
        let prompt = build_prompt(&GenerationRequest {
            subject: "print('hi')".into(),
            task: Task::Convert {
                source_language: "Python".into(),
                target_language: "Rust".into(),
            },
        });
        assert!(prompt.contains("convert the following Python code to Rust"));
        assert!(prompt.contains("```python"));
        assert!(prompt.contains("Return ONLY the code"));
    }

    #[test]
    fn security_prompt_pins_the_schema() {
        let prompt = build_prompt(&GenerationRequest {
            subject: "os.system(cmd)".into(),
            task: Task::SecurityScan,
        });
        assert!(prompt.contains("\"status\": \"secure\" or \"vulnerable\""));
        assert!(prompt.contains("NO SECURITY ISSUES DETECTED"));
    }
}
