use crate::enhance::SectionKind;

/// System prompt that enforces JSON-only output.
pub const ENHANCE_SYSTEM: &str = "You are a precise resume editor. \
    You MUST respond with valid JSON only, shaped as {\"text\": \"...\"}. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences.";

/// Rules shared by every section.
const GROUNDING_RULES: &str = "\
    Rewrite only what is given. Do NOT invent employers, titles, dates, metrics or \
    technologies that the original does not mention. Keep the author's first-person \
    or implied-subject voice. Return plain text; line breaks separate bullets.";

fn section_guidance(section: SectionKind) -> &'static str {
    match section {
        SectionKind::Summary => {
            "This is a professional summary. Keep it to 2-4 sentences, lead with the \
             candidate's focus area, and cut filler adjectives."
        }
        SectionKind::Experience => {
            "These are experience bullets. Start each with a strong past-tense verb, \
             keep one achievement per line, and keep any numbers exactly as written."
        }
        SectionKind::Project => {
            "This describes a project. State what was built, the stack, and the outcome, \
             in at most three lines."
        }
        SectionKind::Skills => {
            "This is a skills list. Group related skills, remove duplicates, and keep \
             it comma-separated."
        }
        SectionKind::Other => "Tighten the wording and fix grammar without changing meaning.",
    }
}

pub fn build_enhance_prompt(section: SectionKind, text: &str) -> String {
    format!(
        "{guidance}\n\n{GROUNDING_RULES}\n\nORIGINAL:\n\"\"\"\n{text}\n\"\"\"\n\n\
         Respond with {{\"text\": \"<improved text>\"}}.",
        guidance = section_guidance(section),
    )
}
