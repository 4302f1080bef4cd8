//! Service orders demo binary
//!
//! Runs the order list and detail screens against an in-memory store:
//! registers an order, closes it and switches the list filter, logging what
//! each screen would render.

use anyhow::Context;
use helpdesk_core::document::FieldUpdate;
use helpdesk_core::environment::SystemClock;
use helpdesk_orders::{
    Config, ListPresentation, OrderDetailAction, OrderDetailReducer, OrderDetailState,
    OrderListAction, OrderListReducer, OrderListState, OrderStatus, OrdersEnvironment,
};
use helpdesk_runtime::Store;
use helpdesk_testing::InMemoryDocumentStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

async fn wait_until<S>(
    mut states: watch::Receiver<S>,
    what: &str,
    done: impl FnMut(&S) -> bool,
) -> anyhow::Result<()> {
    let _ = tokio::time::timeout(SETTLE_TIMEOUT, states.wait_for(done))
        .await
        .with_context(|| format!("timed out waiting for {what}"))?
        .with_context(|| format!("store dropped while waiting for {what}"))?;
    Ok(())
}

fn render_list(state: &OrderListState) -> anyhow::Result<()> {
    match state.presentation() {
        ListPresentation::Idle => tracing::info!("List idle"),
        ListPresentation::Loading => tracing::info!("Loading orders"),
        ListPresentation::Empty { filter } => {
            tracing::info!("{}", ListPresentation::empty_message(filter));
        },
        ListPresentation::Ready(items) => {
            tracing::info!(
                filter = %state.filter,
                count = items.len(),
                "Orders:\n{}",
                serde_json::to_string_pretty(items)?
            );
        },
        ListPresentation::Failed {
            message,
            stale_items,
        } => tracing::warn!(%message, stale = stale_items.len(), "List unavailable"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    let _ = dotenvy::dotenv();

    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_new(&config.log_filter)
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let documents = InMemoryDocumentStore::with_capacity(SystemClock, config.snapshot_capacity);
    documents.insert_document(
        &config.orders_collection,
        "1",
        FieldUpdate::new()
            .set("patrimony", "123456")
            .set("description", "Computador não liga")
            .set("status", OrderStatus::Open.as_str())
            .set_server_timestamp("created_at"),
    );

    let env = OrdersEnvironment::from_config(Arc::new(documents.clone()), &config)
        .context("invalid configuration")?;

    // List screen, open orders
    let list = Store::new(OrderListState::default(), OrderListReducer::new(), env.clone());
    list.send(OrderListAction::Subscribe {
        filter: OrderStatus::Open,
    })?;
    wait_until(list.watch(), "first snapshot", |s| !s.loading).await?;
    list.state(render_list)?;

    // New order shows up without re-subscribing
    let new_id = env
        .registrar()
        .register("654321", "Impressora sem toner")
        .await?;
    wait_until(list.watch(), "registered order", |s| s.count() == 2).await?;
    list.state(render_list)?;

    // Detail screen: load, close, reload
    let detail = Store::new(
        OrderDetailState::default(),
        OrderDetailReducer::new(),
        env.clone(),
    );
    detail.send(OrderDetailAction::Load {
        order_id: new_id.clone(),
    })?;
    wait_until(detail.watch(), "order detail", |s| s.detail.is_some()).await?;
    detail.state(|s| -> anyhow::Result<()> {
        tracing::info!("Detail:\n{}", serde_json::to_string_pretty(&s.detail)?);
        Ok(())
    })?;

    detail.send(OrderDetailAction::Close {
        solution: "Toner substituído".to_string(),
    })?;
    wait_until(detail.watch(), "closed detail", |s| {
        s.detail.as_ref().is_some_and(|d| !d.can_close()) && !s.loading
    })
    .await?;
    detail.state(|s| -> anyhow::Result<()> {
        if let Some(notice) = s.notice {
            tracing::info!("{notice}");
        }
        tracing::info!("Detail:\n{}", serde_json::to_string_pretty(&s.detail)?);
        Ok(())
    })?;
    detail.send(OrderDetailAction::Dismiss)?;

    // Closed order left the open list
    wait_until(list.watch(), "list update", |s| s.count() == 1).await?;
    list.state(render_list)?;

    // Switch to closed orders
    list.send(OrderListAction::Subscribe {
        filter: OrderStatus::Closed,
    })?;
    wait_until(list.watch(), "closed orders", |s| !s.loading).await?;
    list.state(render_list)?;

    list.send(OrderListAction::Unsubscribe)?;
    list.shutdown(Duration::from_secs(1)).await?;
    detail.shutdown(Duration::from_secs(1)).await?;

    tracing::info!(
        open_listeners = documents.open_listeners(),
        calls = ?documents.calls(),
        "Done"
    );
    Ok(())
}
