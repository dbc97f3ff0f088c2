//! Campaign concepts: parsing, validation and image prompt seeds.
//!
//! The campaign-ideas call returns loosely structured text. [`parse_campaigns`]
//! turns it into [`CampaignIdea`] values:
//!
//! ```text
//! Campaign 1: Trail Ready            ← starts a campaign, name after ':'
//! 1. Campaign Name: Trail Ready      ← text section (overrides the name)
//! 2. Core Message: Run further       ← text section "core_message"
//! 3. Visual Theme Description        ← opens field section
//! - Color Palette: Forest green      ←   field "color_palette"
//! - Mood and Atmosphere: Calm        ←   field "mood_and_atmosphere"
//! Tagline Idea: Go on                ← text section "tagline_idea"
//! ```
//!
//! Lines before the first `Campaign` header are ignored.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::research::strip_list_marker;
use super::ParseError;

/// Fields every campaign must carry before it reaches ad generation.
pub const REQUIRED_FIELDS: [&str; 3] = ["campaign_name", "core_message", "visual_theme_description"];

/// A campaign section: either free text or `key: value` fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Section {
    Text(String),
    Fields(BTreeMap<String, String>),
}

impl Section {
    pub fn is_empty(&self) -> bool {
        match self {
            Section::Text(t) => t.trim().is_empty(),
            Section::Fields(f) => f.values().all(|v| v.trim().is_empty()),
        }
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        match self {
            Section::Fields(f) => f.get(key).map(String::as_str).filter(|v| !v.is_empty()),
            Section::Text(_) => None,
        }
    }

    /// Single-line rendering used inside prompts.
    pub fn render(&self) -> String {
        match self {
            Section::Text(t) => t.clone(),
            Section::Fields(f) => f
                .iter()
                .map(|(k, v)| format!("{}: {}", k.replace('_', " "), v))
                .collect::<Vec<_>>()
                .join("; "),
        }
    }
}

/// Image prompt seeds derived from a campaign's sections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptSuggestions {
    pub product_focused: String,
    pub brand_focused: String,
    pub social_media: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignIdea {
    pub campaign_name: String,
    pub sections: BTreeMap<String, Section>,
    #[serde(default)]
    pub prompt_suggestions: Option<PromptSuggestions>,
}

impl CampaignIdea {
    fn new(name: String) -> Self {
        Self {
            campaign_name: name,
            sections: BTreeMap::new(),
            prompt_suggestions: None,
        }
    }

    pub fn section(&self, key: &str) -> Option<&Section> {
        self.sections.get(key)
    }

    pub fn core_message(&self) -> String {
        self.section("core_message")
            .map(Section::render)
            .unwrap_or_default()
    }

    pub fn visual_theme(&self) -> String {
        self.section("visual_theme_description")
            .map(Section::render)
            .unwrap_or_default()
    }

    pub fn emotional_appeal(&self) -> String {
        self.section("key_emotional_appeal")
            .map(Section::render)
            .unwrap_or_default()
    }

    /// Names of required fields that are absent or blank.
    pub fn missing_fields(&self) -> Vec<String> {
        REQUIRED_FIELDS
            .iter()
            .filter(|&&field| match field {
                "campaign_name" => self.campaign_name.trim().is_empty(),
                key => self.section(key).map_or(true, Section::is_empty),
            })
            .map(|f| f.to_string())
            .collect()
    }
}

/// Lowercase, with every run of non-alphanumerics collapsed to `_`.
pub fn snake_key(title: &str) -> String {
    let mut key = String::with_capacity(title.len());
    for c in title.trim().chars() {
        if c.is_alphanumeric() {
            key.extend(c.to_lowercase());
        } else if !key.ends_with('_') {
            key.push('_');
        }
    }
    key.trim_matches('_').to_string()
}

/// Campaign being assembled by the parser.
struct Builder {
    idea: CampaignIdea,
    open: Option<String>,
}

impl Builder {
    fn set_text(&mut self, key: String, value: &str) {
        if key == "campaign_name" {
            self.idea.campaign_name = value.to_string();
        } else {
            self.idea.sections.insert(key, Section::Text(value.to_string()));
        }
    }

    /// Add a field to the open section. A section that already holds text
    /// keeps it under `summary`.
    fn add_field(&mut self, section: &str, key: String, value: String) {
        let entry = self
            .idea
            .sections
            .entry(section.to_string())
            .or_insert_with(|| Section::Fields(BTreeMap::new()));
        if let Section::Text(text) = entry {
            let mut fields = BTreeMap::new();
            if !text.trim().is_empty() {
                fields.insert("summary".to_string(), std::mem::take(text));
            }
            *entry = Section::Fields(fields);
        }
        if let Section::Fields(fields) = entry {
            fields.insert(key, value);
        }
    }
}

fn campaign_header(line: &str) -> Option<String> {
    let rest = line.strip_prefix("Campaign")?;
    let after = rest.trim_start();
    let is_header = after.starts_with(|c: char| c.is_ascii_digit() || c == '#' || c == ':');
    if !is_header {
        return None;
    }
    let name = match line.split_once(':') {
        Some((_, name)) => name.trim(),
        None => line,
    };
    Some(name.trim_matches('"').to_string())
}

fn clean_line(raw: &str) -> String {
    raw.replace("**", "")
        .trim()
        .trim_start_matches('#')
        .trim()
        .to_string()
}

/// Parse up to `limit` campaigns from a model response.
pub fn parse_campaigns(text: &str, limit: usize) -> Result<Vec<CampaignIdea>, ParseError> {
    let mut campaigns = Vec::new();
    let mut current: Option<Builder> = None;

    for raw in text.lines() {
        let line = clean_line(raw);
        if line.is_empty() {
            continue;
        }

        if let Some(name) = campaign_header(&line) {
            if let Some(done) = current.take() {
                campaigns.push(done.idea);
            }
            current = Some(Builder {
                idea: CampaignIdea::new(name),
                open: None,
            });
            continue;
        }

        let Some(builder) = current.as_mut() else {
            continue;
        };

        let is_bullet = line.starts_with(['-', '*', '•']);
        match strip_list_marker(&line) {
            Some(item) if !is_bullet => {
                let (title, value) = match item.split_once(':') {
                    Some((t, v)) => (t, v.trim()),
                    None => (item, ""),
                };
                let key = snake_key(title);
                if key.is_empty() {
                    continue;
                }
                if !value.is_empty() {
                    builder.set_text(key.clone(), value);
                }
                builder.open = (key != "campaign_name").then_some(key);
            }
            Some(item) => {
                let (key, value) = match item.split_once(':') {
                    Some((k, v)) => (snake_key(k), v.trim().to_string()),
                    None => (snake_key(item), item.to_string()),
                };
                if key.is_empty() {
                    continue;
                }
                match builder.open.clone() {
                    Some(section) => builder.add_field(&section, key, value),
                    None => builder.set_text(key, &value),
                }
            }
            None => {
                if let Some((k, v)) = line.split_once(':') {
                    let key = snake_key(k);
                    if !key.is_empty() {
                        builder.set_text(key, v.trim());
                        builder.open = None;
                    }
                }
            }
        }
    }

    if let Some(done) = current {
        campaigns.push(done.idea);
    }
    campaigns.truncate(limit);

    if campaigns.is_empty() {
        return Err(ParseError::NoCampaigns);
    }
    Ok(campaigns)
}

/// Fail on the first campaign missing a required field.
pub fn validate_campaigns(campaigns: &[CampaignIdea]) -> Result<(), ParseError> {
    for idea in campaigns {
        let missing = idea.missing_fields();
        if !missing.is_empty() {
            return Err(ParseError::MissingFields {
                campaign: idea.campaign_name.clone(),
                fields: missing,
            });
        }
    }
    Ok(())
}

fn field_or<'a>(section: Option<&'a Section>, key: &str, default: &'a str) -> &'a str {
    section.and_then(|s| s.field(key)).unwrap_or(default)
}

/// Build the three image prompt seeds for `idea`.
pub fn prompt_suggestions(idea: &CampaignIdea) -> PromptSuggestions {
    let theme = idea.section("visual_theme_description");
    let theme_desc = match theme {
        Some(Section::Text(t)) => t.clone(),
        _ => format!(
            "Color palette: {}. Style: {}. Elements: {}. Mood: {}",
            field_or(theme, "color_palette", "professional"),
            field_or(theme, "photography_illustration_style", "modern"),
            field_or(theme, "key_visual_elements", "clean and minimal"),
            field_or(theme, "mood_and_atmosphere", "professional"),
        ),
    };

    let appeal = idea.section("key_emotional_appeal");
    let emotion_desc = match appeal {
        Some(Section::Text(t)) => t.clone(),
        _ => format!(
            "{} mood with {}",
            field_or(appeal, "primary_emotion", "professional"),
            field_or(appeal, "supporting_psychological_triggers", "trust and reliability"),
        ),
    };

    let social = idea.section("social_media_focus");
    let (platforms, content_format) = match social {
        Some(Section::Text(t)) => (t.clone(), "engaging social media content".to_string()),
        _ => (
            field_or(social, "primary_platforms", "").to_string(),
            field_or(social, "content_format_recommendations", "").to_string(),
        ),
    };

    let core = idea.core_message();
    PromptSuggestions {
        product_focused: format!(
            "{theme_desc}. Focus on {core}. Style: Professional photography, {emotion_desc}, \
             photorealistic quality, advertisement composition, product-centric, commercial lighting"
        ),
        brand_focused: format!(
            "Scene capturing {emotion_desc} through {theme_desc}. Emphasizing: {core}. \
             Style: Cinematic lighting, emotional depth, photorealistic quality, \
             lifestyle photography, brand storytelling"
        ),
        social_media: format!(
            "Social media content for {platforms}. {theme_desc}. Format: {content_format}. \
             Style: {emotion_desc}, high engagement, platform-optimized, scroll-stopping visuals"
        ),
    }
}

/// Parse, validate and attach prompt suggestions.
pub fn campaigns_from_response(text: &str, limit: usize) -> Result<Vec<CampaignIdea>, ParseError> {
    let mut campaigns = parse_campaigns(text, limit)?;
    validate_campaigns(&campaigns)?;
    for idea in &mut campaigns {
        idea.prompt_suggestions = Some(prompt_suggestions(idea));
    }
    Ok(campaigns)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = "\
Here are your campaigns.

**Campaign 1: Trail Ready**
1. Campaign Name: Trail Ready
2. Core Message: Run further with confidence.
3. Visual Theme Description
- Color Palette: Forest green and slate
- Photography/Illustration Style: Documentary
- Mood and Atmosphere: Calm determination
4. Key Emotional Appeal: Quiet pride
5. Social Media Focus
- Primary Platforms: Instagram, Strava
- Content Format Recommendations: Short reels

## Campaign 2: City Miles
2. Core Message: Every street is a track.
3. Visual Theme Description: Neon night runs in the rain.
Tagline Idea: Own the night
";

    #[test]
    fn snake_keys() {
        assert_eq!(snake_key("Visual Theme Description"), "visual_theme_description");
        assert_eq!(
            snake_key("Photography/Illustration Style"),
            "photography_illustration_style"
        );
        assert_eq!(snake_key("  Mood and  Atmosphere "), "mood_and_atmosphere");
    }

    #[test]
    fn parses_sections_and_fields() {
        let campaigns = parse_campaigns(RESPONSE, 10).unwrap();
        assert_eq!(campaigns.len(), 2);

        let first = &campaigns[0];
        assert_eq!(first.campaign_name, "Trail Ready");
        assert_eq!(first.core_message(), "Run further with confidence.");
        let theme = first.section("visual_theme_description").unwrap();
        assert_eq!(theme.field("color_palette"), Some("Forest green and slate"));
        assert_eq!(theme.field("photography_illustration_style"), Some("Documentary"));
        assert_eq!(
            first.section("key_emotional_appeal"),
            Some(&Section::Text("Quiet pride".into()))
        );
        assert_eq!(
            first.section("social_media_focus").unwrap().field("primary_platforms"),
            Some("Instagram, Strava")
        );

        let second = &campaigns[1];
        assert_eq!(second.campaign_name, "City Miles");
        assert_eq!(second.visual_theme(), "Neon night runs in the rain.");
        assert_eq!(
            second.section("tagline_idea"),
            Some(&Section::Text("Own the night".into()))
        );
    }

    #[test]
    fn header_text_is_kept_when_fields_follow() {
        let text = "Campaign 1: A\n3. Visual Theme Description: Bright\n- Color Palette: Yellow";
        let campaigns = parse_campaigns(text, 5).unwrap();
        let theme = campaigns[0].section("visual_theme_description").unwrap();
        assert_eq!(theme.field("summary"), Some("Bright"));
        assert_eq!(theme.field("color_palette"), Some("Yellow"));
    }

    #[test]
    fn truncates_to_limit() {
        let text = (1..=4)
            .map(|i| format!("Campaign {i}: C{i}\n2. Core Message: m\n3. Visual Theme Description: v"))
            .collect::<Vec<_>>()
            .join("\n");
        let campaigns = parse_campaigns(&text, 2).unwrap();
        assert_eq!(campaigns.len(), 2);
        assert_eq!(campaigns[1].campaign_name, "C2");
    }

    #[test]
    fn prose_without_headers_is_an_error() {
        assert_eq!(
            parse_campaigns("I cannot help with that.", 5),
            Err(ParseError::NoCampaigns)
        );
        // "Campaigns" and "Campaign strategy" are not headers.
        assert_eq!(
            parse_campaigns("Campaigns should be bold.\nCampaign strategy: go", 5),
            Err(ParseError::NoCampaigns)
        );
    }

    #[test]
    fn validation_names_every_missing_field() {
        let campaigns = parse_campaigns("Campaign 1: Lonely\n4. Key Emotional Appeal: joy", 5).unwrap();
        assert_eq!(
            validate_campaigns(&campaigns),
            Err(ParseError::MissingFields {
                campaign: "Lonely".into(),
                fields: vec!["core_message".into(), "visual_theme_description".into()],
            })
        );
    }

    #[test]
    fn suggestions_use_fields_and_defaults() {
        let campaigns = campaigns_from_response(RESPONSE, 10).unwrap();

        let first = campaigns[0].prompt_suggestions.as_ref().unwrap();
        assert!(first.product_focused.starts_with(
            "Color palette: Forest green and slate. Style: Documentary. Elements: clean and minimal. Mood: Calm determination. Focus on Run further with confidence."
        ));
        assert!(first.brand_focused.starts_with("Scene capturing Quiet pride through"));
        assert!(first
            .social_media
            .starts_with("Social media content for Instagram, Strava."));
        assert!(first.social_media.contains("Format: Short reels."));

        let second = campaigns[1].prompt_suggestions.as_ref().unwrap();
        assert!(second
            .brand_focused
            .starts_with("Scene capturing professional mood with trust and reliability through Neon night runs in the rain."));
    }
}
