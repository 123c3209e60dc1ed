use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

use super::{element_text, label_pattern, parse_selector};
use crate::models::{Classification, ClassifierKind};
use crate::plugins::traits::{Classifier, RenderState};
use crate::utils::error::Result;

const PRECEDENCE: &[&str] = &[
    "sold-out marker present -> unavailable",
    "control carries the unavailable class -> unavailable",
    "control carries the available class -> available",
    "control missing or unrecognised class -> unavailable",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassToggleConfig {
    /// Elements that may be the purchase control.
    pub control_selector: String,
    /// Text identifying the purchase control among `control_selector` matches.
    pub control_label: String,
    pub available_class: String,
    pub unavailable_class: String,
    /// Optional page-level sold-out badge.
    pub sold_out_selector: Option<String>,
    pub sold_out_text: String,
}

impl Default for ClassToggleConfig {
    fn default() -> Self {
        Self {
            control_selector: r#"div[class*="index_usBtn__"]"#.to_string(),
            control_label: "ADD TO BAG".to_string(),
            available_class: "index_red__".to_string(),
            unavailable_class: "index_black__".to_string(),
            sold_out_selector: None,
            sold_out_text: "SOLD OUT".to_string(),
        }
    }
}

/// Standard product pages: the add-to-bag control turns from the "black" class to the "red" one.
pub struct ClassToggleClassifier {
    config: ClassToggleConfig,
    control: Selector,
    sold_out: Option<Selector>,
    label: Regex,
    sold_out_text: Regex,
}

impl ClassToggleClassifier {
    pub fn new(config: ClassToggleConfig) -> Result<Self> {
        let control = parse_selector(&config.control_selector)?;
        let sold_out = config
            .sold_out_selector
            .as_deref()
            .map(parse_selector)
            .transpose()?;
        let label = label_pattern(&config.control_label)?;
        let sold_out_text = label_pattern(&config.sold_out_text)?;

        Ok(Self {
            config,
            control,
            sold_out,
            label,
            sold_out_text,
        })
    }
}

impl Classifier for ClassToggleClassifier {
    fn name(&self) -> &str {
        "Class Toggle Classifier"
    }

    fn kind(&self) -> ClassifierKind {
        ClassifierKind::ClassToggle
    }

    fn description(&self) -> &str {
        "Reads stock from the CSS class of the purchase control"
    }

    fn precedence(&self) -> &[&'static str] {
        PRECEDENCE
    }

    fn classify(&self, state: &RenderState) -> Result<Classification> {
        let document = Html::parse_document(&state.html);

        if let Some(selector) = &self.sold_out {
            if let Some(badge) = document.select(selector).next() {
                return Ok(Classification::unavailable(format!(
                    "sold out badge: {}",
                    element_text(&badge)
                )));
            }
        }

        let controls: Vec<_> = document.select(&self.control).collect();

        if let Some(sold_out) = controls
            .iter()
            .map(element_text)
            .find(|text| self.sold_out_text.is_match(text))
        {
            return Ok(Classification::unavailable(format!("sold out: {}", sold_out)));
        }

        let Some(control) = controls
            .iter()
            .find(|el| self.label.is_match(&element_text(el)))
        else {
            return Ok(Classification::unavailable(format!(
                "'{}' control not found",
                self.config.control_label
            )));
        };

        let class = control.value().attr("class").unwrap_or_default();

        if class.contains(&self.config.unavailable_class) {
            Ok(Classification::unavailable(class))
        } else if class.contains(&self.config.available_class) {
            Ok(Classification::available(class))
        } else {
            Ok(Classification::unavailable(format!("unrecognised class: {}", class)))
        }
    }
}
