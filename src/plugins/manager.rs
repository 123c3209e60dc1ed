use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::classifiers::{ClassToggleClassifier, LabelToggleClassifier};
use super::notifiers::{DiscordNotifier, EmailNotifier, LogNotifier};
use super::traits::{Classifier, Notification, NotificationSink};
use crate::config::{ClassifiersConfig, NotificationsConfig};
use crate::models::ClassifierKind;
use crate::utils::error::AppError;

pub type ClassifierRef = Arc<dyn Classifier>;
pub type NotificationSinkBox = Box<dyn NotificationSink>;

#[derive(Clone)]
pub struct PluginManager {
    classifiers: Arc<RwLock<HashMap<ClassifierKind, ClassifierRef>>>,
    sinks: Arc<RwLock<Vec<NotificationSinkBox>>>,
}

impl PluginManager {
    pub fn new() -> Self {
        Self {
            classifiers: Arc::new(RwLock::new(HashMap::new())),
            sinks: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Register a classifier, replacing any existing one of the same kind
    pub async fn register_classifier(&self, classifier: ClassifierRef) -> Result<(), AppError> {
        let kind = classifier.kind();
        tracing::debug!(kind = %kind, name = classifier.name(), "Registering classifier");

        let mut classifiers = self.classifiers.write().await;
        classifiers.insert(kind, classifier);
        Ok(())
    }

    /// Register a notification sink
    pub async fn register_sink(&self, sink: NotificationSinkBox) -> Result<(), AppError> {
        tracing::debug!(sink = sink.sink_type(), "Registering notification sink");

        let mut sinks = self.sinks.write().await;
        sinks.push(sink);
        Ok(())
    }

    /// Look up the classifier for a target's layout
    pub async fn classifier_for(&self, kind: ClassifierKind) -> Result<ClassifierRef, AppError> {
        let classifiers = self.classifiers.read().await;
        classifiers.get(&kind).cloned().ok_or_else(|| AppError::NotFound {
            resource: format!("classifier '{}'", kind),
        })
    }

    pub async fn has_classifier(&self, kind: ClassifierKind) -> bool {
        let classifiers = self.classifiers.read().await;
        classifiers.contains_key(&kind)
    }

    pub async fn has_sink(&self, sink_type: &str) -> bool {
        let sinks = self.sinks.read().await;
        sinks.iter().any(|s| s.sink_type() == sink_type)
    }

    /// List all registered classifier kinds
    pub async fn list_classifier_kinds(&self) -> Vec<ClassifierKind> {
        let classifiers = self.classifiers.read().await;
        classifiers.keys().copied().collect()
    }

    /// List all registered sink types
    pub async fn list_sink_types(&self) -> Vec<String> {
        let sinks = self.sinks.read().await;
        sinks.iter().map(|s| s.sink_type().to_string()).collect()
    }

    /// Register both classifier presets and every configured sink
    pub async fn initialize_default_plugins(
        &self,
        classifiers: &ClassifiersConfig,
        notifications: &NotificationsConfig,
    ) -> Result<(), AppError> {
        self.register_classifier(Arc::new(ClassToggleClassifier::new(
            classifiers.class_toggle.clone(),
        )?))
        .await?;
        self.register_classifier(Arc::new(LabelToggleClassifier::new(
            classifiers.label_toggle.clone(),
        )?))
        .await?;

        self.register_sink(Box::new(LogNotifier::new())).await?;

        if let Some(discord) = &notifications.discord {
            self.register_sink(Box::new(DiscordNotifier::new(discord.clone())?))
                .await?;
        }

        if let Some(smtp) = &notifications.smtp {
            self.register_sink(Box::new(EmailNotifier::new(smtp.clone())?))
                .await?;
        }

        Ok(())
    }

    /// Deliver a notification to every sink. Sink failures are logged and never propagated.
    pub async fn broadcast(&self, notification: &Notification) {
        let sinks = self.sinks.read().await;

        let deliveries = sinks.iter().map(|sink| async move {
            match sink.notify(notification).await {
                Ok(result) if result.success => {}
                Ok(result) => tracing::warn!(
                    sink = sink.sink_type(),
                    target_id = notification.target_id(),
                    "Notification not delivered: {}",
                    result.error.unwrap_or_default()
                ),
                Err(e) => tracing::warn!(
                    sink = sink.sink_type(),
                    target_id = notification.target_id(),
                    "Notification failed: {}",
                    e
                ),
            }
        });

        futures::future::join_all(deliveries).await;
    }

    /// Shutdown all plugins
    pub async fn shutdown(&self) -> Result<(), AppError> {
        let mut sinks = self.sinks.write().await;
        for sink in sinks.drain(..) {
            if let Err(e) = sink.shutdown().await {
                tracing::warn!("Error shutting down notification sink: {}", e);
            }
        }

        self.classifiers.write().await.clear();
        Ok(())
    }
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new()
    }
}
