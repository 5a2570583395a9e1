//! Effective content for experiment variants.
//!
//! A variant may override the CTA and selling points of the creative it
//! points at. Resolution is total: for each field exactly one of override,
//! creative default, or empty is chosen. Blank strings count as absent.

use serde::{Deserialize, Serialize};

use crate::api::types::{AssetData, ExperimentVariantInput};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentSource {
    Override,
    Default,
    Empty,
}

/// One arm of an experiment as edited locally.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExperimentVariant {
    pub creative_id: String,
    pub weight: f64,
    pub cta_override: Option<String>,
    pub selling_points_override: Option<Vec<String>>,
}

impl ExperimentVariant {
    pub fn new(creative_id: impl Into<String>, weight: f64) -> Self {
        Self { creative_id: creative_id.into(), weight, ..Default::default() }
    }
}

/// Content a creative carries on its own.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CreativeDefaults {
    pub cta_text: Option<String>,
    pub selling_points: Vec<String>,
}

impl From<&AssetData> for CreativeDefaults {
    fn from(asset: &AssetData) -> Self {
        Self {
            cta_text: asset.cta_text.clone(),
            selling_points: asset.selling_points.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedContent {
    pub cta_text: String,
    pub cta_source: ContentSource,
    pub selling_points: Vec<String>,
    pub selling_points_source: ContentSource,
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.filter(|v| !v.trim().is_empty())
}

fn cta_with_source(override_cta: Option<&str>, default_cta: Option<&str>) -> (String, ContentSource) {
    if let Some(v) = non_blank(override_cta) {
        return (v.to_string(), ContentSource::Override);
    }
    if let Some(v) = non_blank(default_cta) {
        return (v.to_string(), ContentSource::Default);
    }
    (String::new(), ContentSource::Empty)
}

fn clean_points(points: &[String]) -> Vec<String> {
    points.iter().filter(|p| !p.trim().is_empty()).cloned().collect()
}

fn points_with_source(override_sps: Option<&[String]>, default_sps: &[String]) -> (Vec<String>, ContentSource) {
    if let Some(list) = override_sps {
        let cleaned = clean_points(list);
        if !cleaned.is_empty() {
            return (cleaned, ContentSource::Override);
        }
    }
    let cleaned = clean_points(default_sps);
    if !cleaned.is_empty() {
        return (cleaned, ContentSource::Default);
    }
    (Vec::new(), ContentSource::Empty)
}

/// Override CTA if non-blank, else the creative's CTA if non-blank, else "".
pub fn resolve_cta(override_cta: Option<&str>, default_cta: Option<&str>) -> String {
    cta_with_source(override_cta, default_cta).0
}

/// Override list if it has any non-blank entry, else the creative's list,
/// else empty. Blank entries are dropped from whichever list wins.
pub fn resolve_selling_points(override_sps: Option<&[String]>, default_sps: &[String]) -> Vec<String> {
    points_with_source(override_sps, default_sps).0
}

pub fn resolve_variant(variant: &ExperimentVariant, defaults: &CreativeDefaults) -> ResolvedContent {
    let (cta_text, cta_source) =
        cta_with_source(variant.cta_override.as_deref(), defaults.cta_text.as_deref());
    let (selling_points, selling_points_source) =
        points_with_source(variant.selling_points_override.as_deref(), &defaults.selling_points);
    ResolvedContent { cta_text, cta_source, selling_points, selling_points_source }
}

/// Builds the wire form of a variant. Only fields that actually override the
/// creative are sent; the backend falls back to the creative for the rest.
pub fn to_variant_input(variant: &ExperimentVariant, defaults: &CreativeDefaults) -> ExperimentVariantInput {
    let resolved = resolve_variant(variant, defaults);
    ExperimentVariantInput {
        creative_id: variant.creative_id.trim().to_string(),
        weight: variant.weight,
        bucket_start: None,
        bucket_end: None,
        title: None,
        product_name: None,
        image_url: None,
        cta_text: (resolved.cta_source == ContentSource::Override).then_some(resolved.cta_text),
        selling_points: (resolved.selling_points_source == ContentSource::Override)
            .then_some(resolved.selling_points),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtaChoiceKind {
    UseDefault,
    CreativeDefault,
    CurrentOverride,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CtaChoice {
    pub kind: CtaChoiceKind,
    /// Empty for `UseDefault`
    pub value: String,
}

/// Options offered when editing a variant's CTA: "use default" first, then
/// the creative's CTA, then the current override when it differs from it.
pub fn cta_choices(default_cta: Option<&str>, current_override: Option<&str>) -> Vec<CtaChoice> {
    let mut out = vec![CtaChoice { kind: CtaChoiceKind::UseDefault, value: String::new() }];
    let default = non_blank(default_cta);
    if let Some(d) = default {
        out.push(CtaChoice { kind: CtaChoiceKind::CreativeDefault, value: d.to_string() });
    }
    if let Some(o) = non_blank(current_override) {
        if default != Some(o) {
            out.push(CtaChoice { kind: CtaChoiceKind::CurrentOverride, value: o.to_string() });
        }
    }
    out
}

/// Adds `sp` to the override list, or removes it if present.
pub fn toggle_selling_point(selected: &[String], sp: &str) -> Vec<String> {
    if selected.iter().any(|s| s == sp) {
        selected.iter().filter(|s| *s != sp).cloned().collect()
    } else {
        let mut out = selected.to_vec();
        out.push(sp.to_string());
        out
    }
}
