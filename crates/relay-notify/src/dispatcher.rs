use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use relay_codec::ChatRef;
use relay_telegram::{ChatClient, FailureKind, TelegramError};
use relay_types::store::SubscriberStore;

use crate::job::NotificationJob;
use crate::render::{CaptionStrategy, RenderedNotification, Renderer};

/// Outcome of one fan-out.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub deactivated: usize,
    pub failed: usize,
    /// Shutdown was requested before every subscriber was reached.
    pub interrupted: bool,
}

/// Sends one notification to every active subscriber.
///
/// Delivery is strictly sequential to stay under the platform's rate limits.
/// A failing subscriber never stops the loop: permanent failures deactivate
/// the subscriber, transient ones are logged and left for the next
/// notification.
#[derive(Clone)]
pub struct Dispatcher {
    chat: Arc<dyn ChatClient>,
    subscribers: Arc<dyn SubscriberStore>,
    renderer: Renderer,
    shutdown: CancellationToken,
}

impl Dispatcher {
    pub fn new(
        chat: Arc<dyn ChatClient>,
        subscribers: Arc<dyn SubscriberStore>,
        renderer: Renderer,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            chat,
            subscribers,
            renderer,
            shutdown,
        }
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub async fn dispatch(&self, job: &NotificationJob) -> DispatchReport {
        let mut report = DispatchReport::default();

        // Re-read every time: the registry is the source of truth.
        let subscribers = match self.subscribers.list_active().await {
            Ok(subscribers) => subscribers,
            Err(e) => {
                warn!("Cannot list subscribers for '{}': {}", job.row.title, e);
                return report;
            }
        };

        for subscriber in subscribers {
            if self.shutdown.is_cancelled() {
                report.interrupted = true;
                break;
            }

            let rendered = self.renderer.render(
                &job.row.title,
                job.row.cover.as_deref(),
                &job.payload,
                CaptionStrategy::for_chat(subscriber.chat_type),
            );
            let chat = ChatRef::from_chat_id(&subscriber.chat_id);

            match self.deliver(&chat, &rendered).await {
                Ok(()) => {
                    debug!("Notified {} about {} #{}", chat, job.source_table, job.row.id);
                    report.delivered += 1;
                }
                Err(e) => match e.kind() {
                    FailureKind::Permanent => {
                        warn!("Deactivating subscriber {}: {}", subscriber.chat_id, e);
                        self.subscribers.deactivate(&subscriber.chat_id).await;
                        report.deactivated += 1;
                    }
                    FailureKind::Transient => {
                        warn!("Delivery to {} failed: {}", subscriber.chat_id, e);
                        report.failed += 1;
                    }
                },
            }
        }

        info!(
            "Dispatched {} #{} '{}': {} delivered, {} deactivated, {} failed",
            job.source_table,
            job.row.id,
            job.row.title,
            report.delivered,
            report.deactivated,
            report.failed
        );
        report
    }

    async fn deliver(&self, chat: &ChatRef, rendered: &RenderedNotification) -> Result<(), TelegramError> {
        match &rendered.photo {
            Some(photo) => {
                self.chat
                    .send_photo(chat, photo, &rendered.caption, Some(&rendered.markup))
                    .await?;
            }
            None => {
                self.chat
                    .send_message(chat, &rendered.caption, Some(&rendered.markup))
                    .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeChat, FakeSubscribers, catalog_row, renderer};
    use relay_types::models::{ChatType, Subscriber};

    fn job(id: i64) -> NotificationJob {
        NotificationJob::new("movies", catalog_row(id, 1_000 * id)).unwrap()
    }

    fn dispatcher(chat: &Arc<FakeChat>, subs: &Arc<FakeSubscribers>) -> Dispatcher {
        Dispatcher::new(chat.clone(), subs.clone(), renderer(), CancellationToken::new())
    }

    #[tokio::test]
    async fn blocked_subscriber_is_pruned_and_others_still_receive() {
        let chat = Arc::new(FakeChat::default());
        let subs = Arc::new(FakeSubscribers::with(vec![
            Subscriber::new("1", ChatType::Private),
            Subscriber::new("2", ChatType::Private),
            Subscriber::new("3", ChatType::Private),
        ]));
        chat.fail_with("2", 403, "Forbidden: bot was blocked by the user");
        let dispatcher = dispatcher(&chat, &subs);

        let report = dispatcher.dispatch(&job(1)).await;
        assert_eq!(
            report,
            DispatchReport { delivered: 2, deactivated: 1, failed: 0, interrupted: false }
        );
        assert_eq!(chat.recipients(), vec!["1", "3"]);
        assert_eq!(subs.deactivated(), vec!["2"]);

        chat.clear();
        let report = dispatcher.dispatch(&job(2)).await;
        assert_eq!(report.delivered, 2);
        assert_eq!(chat.recipients(), vec!["1", "3"]);
        assert_eq!(chat.attempts(), 2);
    }

    #[tokio::test]
    async fn transient_failure_keeps_subscriber() {
        let chat = Arc::new(FakeChat::default());
        let subs = Arc::new(FakeSubscribers::with(vec![
            Subscriber::new("1", ChatType::Private),
            Subscriber::new("2", ChatType::Private),
        ]));
        chat.fail_with("1", 429, "Too Many Requests: retry after 3");

        let report = dispatcher(&chat, &subs).dispatch(&job(1)).await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.delivered, 1);
        assert!(subs.deactivated().is_empty());
        assert_eq!(subs.active_ids(), vec!["1", "2"]);
    }

    #[tokio::test]
    async fn migrated_group_is_permanent() {
        let chat = Arc::new(FakeChat::default());
        let subs = Arc::new(FakeSubscribers::with(vec![Subscriber::new("-55", ChatType::Group)]));
        chat.fail_with("-55", 400, "Bad Request: group chat was upgraded to a supergroup chat");

        let report = dispatcher(&chat, &subs).dispatch(&job(1)).await;
        assert_eq!(report.deactivated, 1);
        assert_eq!(subs.deactivated(), vec!["-55"]);
    }

    #[tokio::test]
    async fn caption_depends_on_subscriber_chat_type() {
        let chat = Arc::new(FakeChat::default());
        let subs = Arc::new(FakeSubscribers::with(vec![
            Subscriber::new("10", ChatType::Private),
            Subscriber::new("-1001", ChatType::Supergroup),
        ]));

        dispatcher(&chat, &subs).dispatch(&job(1)).await;
        let sent = chat.sent();
        assert_eq!(sent.len(), 2);
        assert!(!sent[0].caption.contains("/send_"));
        assert!(sent[1].caption.contains("/send_"));
        assert!(sent.iter().all(|s| s.photo.is_some()));
    }

    #[tokio::test]
    async fn shutdown_stops_before_next_subscriber() {
        let chat = Arc::new(FakeChat::default());
        let subs = Arc::new(FakeSubscribers::with(vec![Subscriber::new("1", ChatType::Private)]));
        let dispatcher = dispatcher(&chat, &subs);
        dispatcher.shutdown_token().cancel();

        let report = dispatcher.dispatch(&job(1)).await;
        assert!(report.interrupted);
        assert_eq!(chat.attempts(), 0);
    }

    #[tokio::test]
    async fn registry_outage_sends_nothing() {
        let chat = Arc::new(FakeChat::default());
        let subs = Arc::new(FakeSubscribers::default());
        subs.set_unavailable(true);

        let report = dispatcher(&chat, &subs).dispatch(&job(1)).await;
        assert_eq!(report, DispatchReport::default());
        assert_eq!(chat.attempts(), 0);
    }
}
