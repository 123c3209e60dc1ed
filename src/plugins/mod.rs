pub mod classifiers;
pub mod manager;
pub mod notifiers;
pub mod traits;

pub use manager::PluginManager;
pub use traits::{CheckoutProcedure, Classifier, NotificationSink, RenderStateReader};
