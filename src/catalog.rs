//! Creative choices for experiment editing, built from the asset and task
//! listings. Assets without a product name inherit the one of their task.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::api::types::{AssetData, ListAssetsParams, ListTasksParams, TaskListItem};
use crate::api::{ApiClient, ApiError};
use crate::logging::{log, obj, Domain, Level};
use crate::resolver::CreativeDefaults;

const FALLBACK_LABEL: &str = "Creative";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreativeOption {
    pub id: String,
    pub label: String,
    pub thumb: Option<String>,
    pub product_name: Option<String>,
    pub title: Option<String>,
    pub cta_text: Option<String>,
    pub selling_points: Vec<String>,
}

impl CreativeOption {
    pub fn defaults(&self) -> CreativeDefaults {
        CreativeDefaults {
            cta_text: self.cta_text.clone(),
            selling_points: self.selling_points.clone(),
        }
    }
}

fn non_blank(s: &Option<String>) -> Option<&str> {
    s.as_deref().filter(|v| !v.trim().is_empty())
}

/// Distinct product names in first-seen order.
pub fn product_options(tasks: &[TaskListItem]) -> Vec<String> {
    let mut seen = HashSet::new();
    tasks
        .iter()
        .filter_map(|t| non_blank(&t.product_name))
        .filter(|name| seen.insert(name.to_string()))
        .map(str::to_string)
        .collect()
}

pub fn build_creative_options(assets: &[AssetData], tasks: &[TaskListItem]) -> Vec<CreativeOption> {
    let task_products: HashMap<&str, &str> = tasks
        .iter()
        .filter_map(|t| non_blank(&t.product_name).map(|p| (t.id.as_str(), p)))
        .collect();

    assets
        .iter()
        .filter(|a| !a.id.is_empty())
        .map(|asset| {
            let task_key = asset.task_id.to_string();
            let product = non_blank(&asset.product_name)
                .or_else(|| task_products.get(task_key.as_str()).copied())
                .map(str::to_string);
            let head = non_blank(&asset.title)
                .or(product.as_deref())
                .unwrap_or(FALLBACK_LABEL);
            let thumb = non_blank(&asset.image_url)
                .map(str::to_string)
                .or_else(|| (!asset.public_url.is_empty()).then(|| asset.public_url.clone()));
            CreativeOption {
                id: asset.id.clone(),
                label: format!("{} ({})", head, asset.id),
                thumb,
                product_name: product,
                title: asset.title.clone(),
                cta_text: asset.cta_text.clone(),
                selling_points: asset.selling_points.clone().unwrap_or_default(),
            }
        })
        .collect()
}

/// Options whose product matches `product` after trimming; all options when
/// `product` is blank.
pub fn filter_by_product<'a>(options: &'a [CreativeOption], product: &str) -> Vec<&'a CreativeOption> {
    let wanted = product.trim();
    if wanted.is_empty() {
        return options.iter().collect();
    }
    options
        .iter()
        .filter(|o| o.product_name.as_deref().unwrap_or("").trim() == wanted)
        .collect()
}

pub fn find_option<'a>(options: &'a [CreativeOption], id: &str) -> Option<&'a CreativeOption> {
    let id = id.trim();
    options.iter().find(|o| o.id == id)
}

/// Display label for a creative id; the bare id when it is not in the catalog.
pub fn creative_label(options: &[CreativeOption], id: &str) -> String {
    find_option(options, id)
        .map(|o| o.label.clone())
        .unwrap_or_else(|| id.to_string())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Catalog {
    pub products: Vec<String>,
    pub creatives: Vec<CreativeOption>,
}

impl Catalog {
    pub fn from_listings(assets: &[AssetData], tasks: &[TaskListItem]) -> Self {
        Self {
            products: product_options(tasks),
            creatives: build_creative_options(assets, tasks),
        }
    }

    /// Fetches the first page of tasks and assets concurrently.
    pub async fn load(client: &ApiClient, page_size: u32) -> Result<Self, ApiError> {
        let tasks_params = ListTasksParams { page: Some(1), page_size: Some(page_size), status: None };
        let assets_params = ListAssetsParams { page: Some(1), page_size: Some(page_size), ..Default::default() };
        let (tasks, assets) = tokio::join!(
            client.list_tasks(&tasks_params),
            client.list_assets(&assets_params)
        );
        let (tasks, assets) = (tasks?, assets?);
        let catalog = Self::from_listings(&assets.assets, &tasks.tasks);
        log(
            Level::Debug,
            Domain::Experiment,
            "catalog_loaded",
            obj(&[
                ("products", catalog.products.len().into()),
                ("creatives", catalog.creatives.len().into()),
            ]),
        );
        Ok(catalog)
    }

    /// First known product, used as the initial filter.
    pub fn default_product(&self) -> Option<&str> {
        self.products.first().map(String::as_str)
    }

    pub fn for_product(&self, product: &str) -> Vec<&CreativeOption> {
        filter_by_product(&self.creatives, product)
    }

    pub fn find(&self, id: &str) -> Option<&CreativeOption> {
        find_option(&self.creatives, id)
    }
}
