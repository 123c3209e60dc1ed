use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

use super::{element_text, label_pattern, parse_selector};
use crate::models::{Classification, ClassifierKind};
use crate::plugins::traits::{Classifier, RenderState};
use crate::utils::error::Result;

const PRECEDENCE: &[&str] = &[
    "unavailable label present anywhere -> unavailable",
    "available-label button is disabled -> unavailable",
    "enabled available-label button -> available",
    "neither label present -> unavailable",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelToggleConfig {
    pub button_selector: String,
    pub available_label: String,
    pub unavailable_label: String,
}

impl Default for LabelToggleConfig {
    fn default() -> Self {
        Self {
            button_selector: "button".to_string(),
            available_label: "BUY MULTIPLE BOXES".to_string(),
            unavailable_label: "NOTIFY ME WHEN START".to_string(),
        }
    }
}

/// Drop/set pages: the main button reads "notify me" until the drop opens, then "buy".
pub struct LabelToggleClassifier {
    buttons: Selector,
    available: Regex,
    unavailable: Regex,
}

impl LabelToggleClassifier {
    pub fn new(config: LabelToggleConfig) -> Result<Self> {
        Ok(Self {
            buttons: parse_selector(&config.button_selector)?,
            available: label_pattern(&config.available_label)?,
            unavailable: label_pattern(&config.unavailable_label)?,
        })
    }
}

impl Classifier for LabelToggleClassifier {
    fn name(&self) -> &str {
        "Label Toggle Classifier"
    }

    fn kind(&self) -> ClassifierKind {
        ClassifierKind::LabelToggle
    }

    fn description(&self) -> &str {
        "Reads stock from the wording of the main button"
    }

    fn precedence(&self) -> &[&'static str] {
        PRECEDENCE
    }

    fn classify(&self, state: &RenderState) -> Result<Classification> {
        let document = Html::parse_document(&state.html);
        let mut buy_button = None;

        for button in document.select(&self.buttons) {
            let text = element_text(&button);
            if self.unavailable.is_match(&text) {
                return Ok(Classification::unavailable(text));
            }
            if buy_button.is_none() && self.available.is_match(&text) {
                let disabled = button.value().attr("disabled").is_some();
                buy_button = Some((text, disabled));
            }
        }

        match buy_button {
            Some((text, true)) => Ok(Classification::unavailable(format!("disabled: {}", text))),
            Some((text, false)) => Ok(Classification::available(text)),
            None => Ok(Classification::unavailable("no stock button found")),
        }
    }
}
