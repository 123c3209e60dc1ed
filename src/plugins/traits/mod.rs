pub mod checkout;
pub mod classifier;
pub mod notifier;
pub mod reader;

pub use checkout::CheckoutProcedure;
pub use classifier::Classifier;
pub use notifier::{Notification, NotificationResult, NotificationSink};
pub use reader::{RenderState, RenderStateReader};
