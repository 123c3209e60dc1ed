use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{CheckoutStep, ClassifierKind};

/// One monitored product page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Target {
    #[validate(length(min = 1, message = "target id must not be empty"))]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[validate(url(message = "target url must be a valid URL"))]
    pub url: String,
    pub classifier: ClassifierKind,
    /// Overrides the global checkout script for this target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkout_steps: Option<Vec<CheckoutStep>>,
}

impl Target {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        url: impl Into<String>,
        classifier: ClassifierKind,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            url: url.into(),
            classifier,
            checkout_steps: None,
        }
    }

    /// Builds a target for an id that is not in the configuration.
    ///
    /// Short numeric ids below 500 are drop sets with label-toggle pages; anything else is
    /// treated as a regular product page.
    pub fn from_id(id: &str, storefront: &StorefrontUrls) -> Self {
        let is_set = id.len() == 3 && id.parse::<u32>().map(|n| n < 500).unwrap_or(false);
        let (pattern, classifier) = if is_set {
            (&storefront.set_path, ClassifierKind::LabelToggle)
        } else {
            (&storefront.product_path, ClassifierKind::ClassToggle)
        };
        let url = format!(
            "{}{}",
            storefront.base_url.trim_end_matches('/'),
            pattern.replace("{id}", id)
        );
        Self::new(id, format!("Product {}", id), url, classifier)
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() { &self.id } else { &self.name }
    }
}

/// URL layout used to guess targets from bare ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorefrontUrls {
    pub base_url: String,
    pub product_path: String,
    pub set_path: String,
}

impl Default for StorefrontUrls {
    fn default() -> Self {
        Self {
            base_url: "https://www.popmart.com/ca".to_string(),
            product_path: "/products/{id}/".to_string(),
            set_path: "/pop-now/set/{id}".to_string(),
        }
    }
}
