use serde::Serialize;

use crate::api::types::{CreateExperimentRequest, CreatedExperiment};
use crate::api::{ApiClient, ApiError};
use crate::catalog::{creative_label, Catalog};
use crate::logging::{log, obj, v_num, Domain, Level};
use crate::resolver::{to_variant_input, ExperimentVariant};

pub const DEFAULT_VARIANT_WEIGHT: f64 = 0.5;
pub const NEW_VARIANT_WEIGHT: f64 = 0.1;

const WEIGHT_EPSILON: f64 = 1e-6;

/// An experiment being composed locally before creation.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentDraft {
    pub name: String,
    pub product_name: String,
    pub variants: Vec<ExperimentVariant>,
}

impl Default for ExperimentDraft {
    fn default() -> Self {
        Self {
            name: String::new(),
            product_name: String::new(),
            variants: vec![
                ExperimentVariant::new("", DEFAULT_VARIANT_WEIGHT),
                ExperimentVariant::new("", DEFAULT_VARIANT_WEIGHT),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DraftSummary {
    pub product_name: Option<String>,
    pub variant_count: usize,
    pub creatives: Vec<String>,
}

impl ExperimentDraft {
    pub fn new(name: &str, product_name: &str) -> Self {
        Self { name: name.to_string(), product_name: product_name.to_string(), ..Default::default() }
    }

    pub fn add_variant(&mut self) -> &mut ExperimentVariant {
        self.variants.push(ExperimentVariant::new("", NEW_VARIANT_WEIGHT));
        let last = self.variants.len() - 1;
        &mut self.variants[last]
    }

    pub fn remove_variant(&mut self, index: usize) -> bool {
        if index < self.variants.len() {
            self.variants.remove(index);
            true
        } else {
            false
        }
    }

    pub fn weight_total(&self) -> f64 {
        self.variants.iter().map(|v| v.weight).sum()
    }

    /// The name is required and every variant needs a creative and a
    /// positive weight. Weights need not sum to one.
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.name.trim().is_empty() {
            return Err(ApiError::validation("experiment name is required"));
        }
        if self.variants.is_empty() {
            return Err(ApiError::validation("at least one variant is required"));
        }
        for (i, v) in self.variants.iter().enumerate() {
            if v.creative_id.trim().is_empty() {
                return Err(ApiError::validation(format!("variant {} has no creative", i + 1)));
            }
            if !(v.weight.is_finite() && v.weight > 0.0) {
                return Err(ApiError::validation(format!("variant {} needs a positive weight", i + 1)));
            }
        }
        Ok(())
    }

    /// Non-blocking remarks about the traffic split.
    pub fn weight_warnings(&self) -> Vec<String> {
        let mut out = Vec::new();
        let total = self.weight_total();
        if !self.variants.is_empty() && (total - 1.0).abs() > WEIGHT_EPSILON {
            out.push(format!("weights sum to {:.3}, traffic is split proportionally", total));
        }
        let mut seen: Vec<&str> = Vec::new();
        for v in &self.variants {
            let id = v.creative_id.trim();
            if id.is_empty() {
                continue;
            }
            if seen.contains(&id) {
                out.push(format!("creative {} is used by more than one variant", id));
            } else {
                seen.push(id);
            }
        }
        out
    }

    /// Validated creation payload. Overrides are resolved against each
    /// creative's own content so only real overrides are sent.
    pub fn to_request(&self, catalog: &Catalog) -> Result<CreateExperimentRequest, ApiError> {
        self.validate()?;
        let variants = self
            .variants
            .iter()
            .map(|v| {
                let defaults = catalog.find(&v.creative_id).map(|o| o.defaults()).unwrap_or_default();
                to_variant_input(v, &defaults)
            })
            .collect();
        let product = self.product_name.trim();
        Ok(CreateExperimentRequest {
            name: self.name.trim().to_string(),
            product_name: (!product.is_empty()).then(|| product.to_string()),
            variants,
        })
    }

    pub fn summary(&self, catalog: &Catalog) -> DraftSummary {
        let product = self.product_name.trim();
        DraftSummary {
            product_name: (!product.is_empty()).then(|| product.to_string()),
            variant_count: self.variants.len(),
            creatives: self
                .variants
                .iter()
                .filter(|v| !v.creative_id.trim().is_empty())
                .map(|v| creative_label(&catalog.creatives, &v.creative_id))
                .collect(),
        }
    }

    pub async fn submit(&self, client: &ApiClient, catalog: &Catalog) -> Result<CreatedExperiment, ApiError> {
        let req = self.to_request(catalog)?;
        for warning in self.weight_warnings() {
            log(
                Level::Warn,
                Domain::Experiment,
                "draft_warning",
                obj(&[("msg", warning.into()), ("weight_total", v_num(self.weight_total()))]),
            );
        }
        client.create_experiment(&req).await
    }
}
