pub mod evaluation_service;
pub mod notifier;
pub mod settings_service;
pub mod statistics;

pub use evaluation_service::EvaluationService;
pub use notifier::{EventKind, InMemoryNotifier, NotificationEvent, NotificationPublisher, Subscription};
pub use settings_service::SettingsService;
pub use statistics::{aggregate, StatisticsScope, StatisticsSnapshot, ThresholdBuckets, ThresholdScale};
