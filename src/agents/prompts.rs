//! Prompt text for every agent call.
//!
//! System prompts are constants; user prompts are built by small functions so
//! the cache key changes whenever an interpolated value does.

pub const RESEARCH_SYSTEM: &str = "You are a senior market research analyst. \
Answer with concrete, verifiable observations and name your sources when you have them.";

pub const MARKETING_SYSTEM: &str = "You are a marketing strategist. \
Ground every recommendation in the research you are given.";

pub const CREATIVE_SYSTEM: &str = "You are an advertising creative director. \
Write copy that is specific to the campaign brief and avoids generic slogans.";

pub fn research_questions(company: &str) -> String {
    format!(
        "List the key research questions to answer before marketing {company}.\n\
         Cover market size, competitors, customer needs and growth opportunities.\n\
         Return one question per line as a numbered list."
    )
}

pub fn research_findings(task: &str, search_context: Option<&str>) -> String {
    match search_context {
        Some(ctx) if !ctx.trim().is_empty() => format!(
            "{task}\n\nUse these web search results as evidence:\n\n{ctx}\n\n\
             Summarise the findings relevant to the task."
        ),
        _ => format!("{task}\n\nSummarise what is known that is relevant to the task."),
    }
}

pub fn research_analysis(findings: &str) -> String {
    format!(
        "Analyse these research findings. Identify the main opportunities, \
         risks and recommended strategies.\n\nFindings:\n{findings}"
    )
}

pub fn brand_analysis(research: &str) -> String {
    format!(
        "From the research below, describe the brand: its values, voice and \
         personality, and how it should differentiate itself.\n\nResearch:\n{research}"
    )
}

pub fn audience_mapping(research: &str) -> String {
    format!(
        "From the research below, describe the target audience segments: \
         demographics, motivations, pain points and preferred channels.\n\nResearch:\n{research}"
    )
}

pub fn market_position(research: &str) -> String {
    format!(
        "From the research below, summarise the company's market position: \
         competitors, strengths, gaps and positioning statement.\n\nResearch:\n{research}"
    )
}

pub fn campaign_ideas(
    company_summary: &str,
    audience: &str,
    brand_values: &str,
    num_campaigns: usize,
) -> String {
    format!(
        "Create {num_campaigns} distinct marketing campaign concepts.\n\n\
         Company summary:\n{company_summary}\n\n\
         Target audience:\n{audience}\n\n\
         Brand values:\n{brand_values}\n\n\
         Start each concept with a line `Campaign N: <name>` and then these numbered sections:\n\
         1. Campaign Name: <name>\n\
         2. Core Message: <one or two sentences>\n\
         3. Visual Theme Description\n\
         - Color Palette: <colors>\n\
         - Photography/Illustration Style: <style>\n\
         - Key Visual Elements: <elements>\n\
         - Mood and Atmosphere: <mood>\n\
         4. Key Emotional Appeal\n\
         - Primary Emotion: <emotion>\n\
         - Supporting Psychological Triggers: <triggers>\n\
         5. Social Media Focus\n\
         - Primary Platforms: <platforms>\n\
         - Content Format Recommendations: <formats>"
    )
}

pub fn tagline(core_message: &str, visual_theme: &str, emotional_appeal: &str) -> String {
    format!(
        "Write one tagline for this campaign.\n\
         Core message: {core_message}\n\
         Visual theme: {visual_theme}\n\
         Emotional appeal: {emotional_appeal}\n\
         Reply with the tagline only."
    )
}

pub fn story(core_message: &str, visual_theme: &str, emotional_appeal: &str) -> String {
    format!(
        "Write a short brand narrative (under 200 words) for this campaign.\n\
         Core message: {core_message}\n\
         Visual theme: {visual_theme}\n\
         Emotional appeal: {emotional_appeal}"
    )
}

pub fn image_prompt(campaign_name: &str, product: &str, brand: &str, social: &str) -> String {
    format!(
        "Combine these starting points into one detailed text-to-image prompt for \
         the campaign \"{campaign_name}\".\n\
         Product-focused: {product}\n\
         Brand-focused: {brand}\n\
         Social media: {social}\n\
         Reply with the prompt only."
    )
}
