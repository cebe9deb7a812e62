//! System-instruction builder for the English tutor.
//!
//! The instruction has two parts:
//! * a **level guidance** block, chosen by a pure `Level → &str` mapping, and
//! * a fixed **reply format** contract: English response, optional correction
//!   block, mandatory Korean translation block.
//!
//! The format is a request to the model, not something enforced locally; see
//! [`crate::tutor::speech`] for the only place the markers are read back.

use crate::conversation::{Level, Topic};
use crate::tutor::speech::{CORRECTION_MARKER, TRANSLATION_MARKER};

// ---------------------------------------------------------------------------
// Level guidance
// ---------------------------------------------------------------------------

const GUIDANCE_BEGINNER: &str = "\
- Use ONLY simple A1-level vocabulary and very short, clear sentences.
- Explain corrections using very basic terms.
- Focus on survival phrases related to {topic}.";

const GUIDANCE_INTERMEDIATE: &str = "\
- Use B1-B2 level vocabulary. Mix simple and complex sentences.
- Use 1-2 common idioms or phrasal verbs related to {topic}.
- Focus corrections on natural phrasing and nuance.";

const GUIDANCE_ADVANCED: &str = "\
- Use C1-C2 level vocabulary and sophisticated structures.
- Focus on professional or high-level social tone.
- Corrections should focus on advanced style and flow.";

/// Vocabulary/register guidance for `level`.  No other branching on level
/// happens anywhere in the prompt.
pub fn level_guidance(level: Level) -> &'static str {
    match level {
        Level::Beginner => GUIDANCE_BEGINNER,
        Level::Intermediate => GUIDANCE_INTERMEDIATE,
        Level::Advanced => GUIDANCE_ADVANCED,
    }
}

// ---------------------------------------------------------------------------
// PromptBuilder
// ---------------------------------------------------------------------------

/// Builds the tutor's system instruction.
///
/// ```rust
/// use ai_teacher::conversation::{Level, Topic};
/// use ai_teacher::tutor::PromptBuilder;
///
/// let system = PromptBuilder::new().system_instruction(Level::Beginner, Topic::Hotel);
/// assert!(system.contains("A1-level"));
/// assert!(system.contains("Hotel"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn system_instruction(&self, level: Level, topic: Topic) -> String {
        let guidance = level_guidance(level).replace("{topic}", topic.name());

        format!(
            "You are an expert English Teacher.\n\
             Current Student Level: {level}\n\
             Conversation Topic: {topic}\n\
             \n\
             Rules:\n\
             {guidance}\n\
             - ALWAYS provide Korean translation for ALL English sentences you write.\n\
             \n\
             Format (MUST follow this exact format):\n\
             1. Main English Response (your teaching response in English)\n\
             2. {CORRECTION_MARKER} Correction: (Optional - only if student made grammar/vocabulary mistakes)\n\
             3. {TRANSLATION_MARKER} 번역: (REQUIRED - translate ALL your English sentences above into natural Korean. This is MANDATORY for every response.)\n\
             \n\
             Always end your English response with a question to continue the conversation.",
            level = level.label(),
            topic = topic.name(),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
