/// Default model when neither config nor `MODEL_NAME` names one
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Lower tier the retry loop falls back to
pub const FLASH_MODEL: &str = "gemini-1.5-flash";

/// Output budget for one report. Larger values reduce truncation.
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 800;

pub const DEFAULT_TEMPERATURE: f32 = 0.15;

/// MIME type requested for the model output
pub const JSON_MIME_TYPE: &str = "application/json";

/// Whether a model identifier belongs to the higher (paid) tier.
pub fn is_pro_tier(model: &str) -> bool {
    model.contains("pro")
}

/// Model to use after a failure on `current`. `None` when already on the
/// lower tier, so there is nothing to downgrade to.
pub fn downgrade(current: &str, fallback: &str) -> Option<String> {
    if is_pro_tier(current) && current != fallback {
        Some(fallback.to_string())
    } else {
        None
    }
}

/// Generation settings sent with every request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub max_output_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

/// One request to the model boundary
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub system: &'a str,
    pub user: &'a str,
    pub model: &'a str,
    pub options: GenerationOptions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pro_tier_detection() {
        assert!(is_pro_tier("gemini-1.5-pro"));
        assert!(is_pro_tier("gemini-2.5-pro-preview"));
        assert!(!is_pro_tier("gemini-1.5-flash"));
    }

    #[test]
    fn test_downgrade_is_one_way() {
        assert_eq!(
            downgrade("gemini-1.5-pro", FLASH_MODEL).as_deref(),
            Some(FLASH_MODEL)
        );
        assert_eq!(downgrade(FLASH_MODEL, FLASH_MODEL), None);
    }

    #[test]
    fn test_default_generation_options() {
        let options = GenerationOptions::default();
        assert_eq!(options.max_output_tokens, 800);
        assert!((options.temperature - 0.15).abs() < f32::EPSILON);
    }
}
