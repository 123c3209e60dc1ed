// Classifier presets for the page layouts we know about
pub mod class_toggle;
pub mod label_toggle;

pub use class_toggle::{ClassToggleClassifier, ClassToggleConfig};
pub use label_toggle::{LabelToggleClassifier, LabelToggleConfig};

use regex::Regex;
use scraper::{ElementRef, Selector};

use crate::utils::error::{AppError, Result};

pub(crate) fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| AppError::Validation(format!("Invalid CSS selector '{}': {:?}", selector, e)))
}

/// Case-insensitive literal match.
pub(crate) fn label_pattern(label: &str) -> Result<Regex> {
    Regex::new(&format!("(?i){}", regex::escape(label.trim())))
        .map_err(|e| AppError::Validation(format!("Invalid label '{}': {}", label, e)))
}

/// Whitespace-normalised text content of an element.
pub(crate) fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
