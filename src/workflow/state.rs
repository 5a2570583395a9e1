use serde::Serialize;

use crate::api::types::{CopywritingCandidates, Language, VariantConfig};

pub const MIN_VARIANTS: u32 = 1;
pub const MAX_VARIANTS: u32 = 10;
pub const DEFAULT_VARIANTS: u32 = 2;
pub const DEFAULT_FORMAT: &str = "1:1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    ProductInput,
    CopywritingSelection,
    CreativeConfig,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::ProductInput => "product_input",
            Step::CopywritingSelection => "copywriting_selection",
            Step::CreativeConfig => "creative_config",
        }
    }

    /// 1-based position, as shown in the step indicator.
    pub fn number(&self) -> u8 {
        match self {
            Step::ProductInput => 1,
            Step::CopywritingSelection => 2,
            Step::CreativeConfig => 3,
        }
    }

    pub fn next(&self) -> Option<Step> {
        match self {
            Step::ProductInput => Some(Step::CopywritingSelection),
            Step::CopywritingSelection => Some(Step::CreativeConfig),
            Step::CreativeConfig => None,
        }
    }

    pub fn previous(&self) -> Option<Step> {
        match self {
            Step::ProductInput => None,
            Step::CopywritingSelection => Some(Step::ProductInput),
            Step::CreativeConfig => Some(Step::CopywritingSelection),
        }
    }
}

/// Copywriting candidates for one product plus the user's picks and edits.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationTask {
    pub task_id: String,
    pub product_name: String,
    pub language: Language,
    pub candidates: CopywritingCandidates,
    pub selected_cta_index: usize,
    /// In selection order
    pub selected_sp_indexes: Vec<usize>,
    pub edited_cta: Option<String>,
    pub edited_sps: Vec<String>,
}

impl GenerationTask {
    pub fn new(product_name: String, language: Language, candidates: CopywritingCandidates) -> Self {
        Self {
            task_id: candidates.task_id.clone(),
            product_name,
            language,
            candidates,
            selected_cta_index: 0,
            selected_sp_indexes: vec![0],
            edited_cta: None,
            edited_sps: Vec::new(),
        }
    }

    pub fn selected_cta(&self) -> Option<&str> {
        self.candidates
            .cta_candidates
            .get(self.selected_cta_index)
            .map(String::as_str)
    }

    /// Selected candidates in selection order; out-of-range indexes are skipped.
    pub fn selected_selling_points(&self) -> Vec<String> {
        self.selected_sp_indexes
            .iter()
            .filter_map(|&i| self.candidates.selling_point_candidates.get(i))
            .cloned()
            .collect()
    }
}

/// Image generation settings gathered in the last step.
#[derive(Debug, Clone, PartialEq)]
pub struct CreativeConfig {
    pub product_image_url: Option<String>,
    pub style: Option<String>,
    num_variants: u32,
    pub formats: Vec<String>,
    variant_configs: Vec<VariantConfig>,
}

impl Default for CreativeConfig {
    fn default() -> Self {
        Self {
            product_image_url: None,
            style: None,
            num_variants: DEFAULT_VARIANTS,
            formats: vec![DEFAULT_FORMAT.to_string()],
            variant_configs: vec![VariantConfig::default(); DEFAULT_VARIANTS as usize],
        }
    }
}

impl CreativeConfig {
    pub fn num_variants(&self) -> u32 {
        self.num_variants
    }

    pub fn variant_configs(&self) -> &[VariantConfig] {
        &self.variant_configs
    }

    /// Clamps to 1..=10 and resizes the per-variant list to match.
    pub fn set_num_variants(&mut self, n: u32) {
        self.num_variants = n.clamp(MIN_VARIANTS, MAX_VARIANTS);
        self.variant_configs
            .resize(self.num_variants as usize, VariantConfig::default());
    }

    /// Parses a comma separated list such as `"1:1, 9:16"`.
    pub fn set_formats_csv(&mut self, csv: &str) {
        self.formats = csv
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }

    /// Returns false when `index` is outside the variant list.
    pub fn set_variant(&mut self, index: usize, style: Option<String>, prompt: Option<String>) -> bool {
        match self.variant_configs.get_mut(index) {
            Some(cfg) => {
                *cfg = VariantConfig { style, prompt };
                true
            }
            None => false,
        }
    }

    /// Per-variant overrides as sent to the backend: blank fields become
    /// absent so the global setting applies.
    pub fn variant_overrides(&self) -> Vec<VariantConfig> {
        self.variant_configs
            .iter()
            .map(|cfg| VariantConfig {
                style: non_blank(cfg.style.as_deref()),
                prompt: non_blank(cfg.prompt.as_deref()),
            })
            .collect()
    }

    pub fn image_url(&self) -> Option<String> {
        non_blank(self.product_image_url.as_deref())
    }

    pub fn style_value(&self) -> Option<String> {
        non_blank(self.style.as_deref())
    }
}

fn non_blank(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Splits a textarea into selling points: one per line, trimmed, blanks dropped.
pub fn parse_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
