//! Prompt texts for every model request in a session.
//!
//! Templates live in `io/prompts/*.md` and are compiled into the binary.

use anyhow::Result;
use minijinja::{Environment, context};

const INSTRUCTION_TEMPLATE: &str = include_str!("prompts/instruction.md");
const GENERATE_TEMPLATE: &str = include_str!("prompts/generate.md");
const REGENERATE_TEMPLATE: &str = include_str!("prompts/regenerate.md");
const CRITIQUE_TEMPLATE: &str = include_str!("prompts/critique.md");
const REPAIR_TEMPLATE: &str = include_str!("prompts/repair.md");

/// Renders the request texts. Inputs are embedded verbatim (no escaping).
pub struct PromptBuilder {
    env: Environment<'static>,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptBuilder {
    pub fn new() -> Self {
        let mut env = Environment::new();
        for (name, source) in [
            ("instruction", INSTRUCTION_TEMPLATE),
            ("generate", GENERATE_TEMPLATE),
            ("regenerate", REGENERATE_TEMPLATE),
            ("critique", CRITIQUE_TEMPLATE),
            ("repair", REPAIR_TEMPLATE),
        ] {
            env.add_template(name, source)
                .expect("built-in prompt template should be valid");
        }
        Self { env }
    }

    /// Ask for a formal description of the sketch, embedding the user's hint.
    pub fn instruction(&self, hint: &str) -> Result<String> {
        self.render("instruction", context! { hint => hint })
    }

    /// Ask for complete standalone LaTeX following the approved instruction.
    pub fn generate(&self, instruction: &str) -> Result<String> {
        self.render("generate", context! { instruction => instruction })
    }

    /// Ask for revised LaTeX given the previous code and the approved critique.
    pub fn regenerate(&self, code: &str, instruction: &str, critique: &str) -> Result<String> {
        self.render(
            "regenerate",
            context! { code => code, instruction => instruction, critique => critique },
        )
    }

    /// Ask for bullet-point feedback comparing the sketch with the rendered figure.
    pub fn critique(&self, code: &str, instruction: &str) -> Result<String> {
        self.render(
            "critique",
            context! { code => code, instruction => instruction },
        )
    }

    /// Ask for a corrected code block given a compiler log.
    pub fn repair(&self, code: &str, log: &str) -> Result<String> {
        self.render("repair", context! { code => code, log => log })
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        let template = self.env.get_template(name)?;
        Ok(template.render(ctx)?)
    }
}
