use crate::models::{Classification, ClassifierKind};
use crate::utils::error::Result;

use super::reader::RenderState;

/// Turns a render state into an available/unavailable decision.
///
/// Classification must be deterministic: when markers disagree, the rules listed by
/// [`Classifier::precedence`] are applied in order and the first one that matches decides.
/// A page without any recognised marker is unavailable.
pub trait Classifier: Send + Sync {
    /// Plugin metadata
    fn name(&self) -> &str;
    fn kind(&self) -> ClassifierKind;
    fn description(&self) -> &str;

    /// Human-readable rule order, highest priority first.
    fn precedence(&self) -> &[&'static str];

    fn classify(&self, state: &RenderState) -> Result<Classification>;
}
