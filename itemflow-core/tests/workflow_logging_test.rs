//! Logging behaviour of command listing

mod common;

use common::*;
use itemflow_core::models::field_ids;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// Counts ERROR events
struct ErrorCounter(Arc<AtomicUsize>);

impl<S: tracing::Subscriber> Layer<S> for ErrorCounter {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == tracing::Level::ERROR {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// An unresolvable evaluator is logged once and the command is still listed
#[tokio::test]
async fn test_unresolved_evaluator_logged_once() {
    let errors = Arc::new(AtomicUsize::new(0));
    let _guard = tracing_subscriber::registry()
        .with(ErrorCounter(errors.clone()))
        .set_default();

    let document = editorial_document().with_item(
        command("styled", "draft", "review")
            .with_display_name("Publish")
            .with_field(field_ids::SUPPRESS_COMMENT, "1")
            .with_field(field_ids::APPEARANCE_EVALUATOR_TYPE, "does-not-exist"),
    );
    let (_repository, workflow) = editorial_workflow(document).await;

    let commands = workflow
        .get_commands_for_state("draft", &article(1), &editor())
        .await
        .unwrap();

    assert_eq!(errors.load(Ordering::SeqCst), 1);
    let styled = commands.iter().find(|c| c.command_id == "styled").unwrap();
    assert_eq!(styled.display_name, "Publish");
    assert!(styled.suppress_comment);
    assert!(!styled.has_ui);
}

/// Each listing logs its own failure
#[tokio::test]
async fn test_unresolved_evaluator_logged_per_listing() {
    let errors = Arc::new(AtomicUsize::new(0));
    let _guard = tracing_subscriber::registry()
        .with(ErrorCounter(errors.clone()))
        .set_default();

    let document = editorial_document().with_item(
        command("styled", "draft", "review")
            .with_field(field_ids::APPEARANCE_EVALUATOR_TYPE, "does-not-exist"),
    );
    let (_repository, workflow) = editorial_workflow(document).await;

    for _ in 0..2 {
        workflow
            .get_commands_for_state("draft", &article(1), &editor())
            .await
            .unwrap();
    }
    assert_eq!(errors.load(Ordering::SeqCst), 2);
}
