//! The relationship-graph batch job and interaction retention.

use chrono::Utc;
use petal_core::{
  embedding::Encoder,
  graph::build_graph,
  store::{BuildStatus, GraphBuildRun},
};
use tracing::{error, info};
use uuid::Uuid;

use crate::{Backend, Engine, Error, Result};

struct BuildOutcome {
  edge_count:     usize,
  total_orders:   u64,
  total_sessions: u64,
}

impl<S: Backend, E: Encoder + 'static> Engine<S, E> {
  /// Recompute the whole relationship graph and swap it into service.
  ///
  /// Runs never overlap: a call made while another build holds the run
  /// lock fails with [`Error::BuildInProgress`]. A failed run leaves the
  /// serving graph untouched. Every run, failed or not, is recorded.
  pub async fn rebuild_graph(&self) -> Result<GraphBuildRun> {
    let Ok(_running) = self.build_lock.try_lock() else {
      return Err(Error::BuildInProgress);
    };

    let build_id = Uuid::new_v4();
    let started_at = Utc::now();
    info!(%build_id, "graph build started");
    let outcome = self.run_build().await;

    let finished_at = Utc::now();
    let run = match &outcome {
      Ok(o) => GraphBuildRun {
        build_id,
        started_at,
        finished_at,
        status: BuildStatus::Succeeded,
        edge_count: o.edge_count,
        total_orders: o.total_orders,
        total_sessions: o.total_sessions,
        error: None,
      },
      Err(e) => GraphBuildRun {
        build_id,
        started_at,
        finished_at,
        status: BuildStatus::Failed,
        edge_count: 0,
        total_orders: 0,
        total_sessions: 0,
        error: Some(e.to_string()),
      },
    };
    self.store.record_build(run.clone()).await.map_err(Error::store)?;

    match outcome {
      Ok(_) => {
        info!(
          %build_id,
          edges = run.edge_count,
          orders = run.total_orders,
          sessions = run.total_sessions,
          "graph build finished"
        );
        Ok(run)
      }
      Err(e) => {
        error!(%build_id, error = %e, "graph build failed, serving graph unchanged");
        Err(e)
      }
    }
  }

  async fn run_build(&self) -> Result<BuildOutcome> {
    let orders = self.store.completed_order_items().await.map_err(Error::store)?;
    let views = self.store.session_views().await.map_err(Error::store)?;
    let thresholds = self.config.graph_thresholds();
    let now = Utc::now();

    let build = tokio::task::spawn_blocking(move || build_graph(orders, views, thresholds, now)).await?;
    let (total_orders, total_sessions) = (build.total_orders, build.total_sessions);
    let edge_count = self.store.replace_graph(build).await.map_err(Error::store)?;

    Ok(BuildOutcome {
      edge_count,
      total_orders,
      total_sessions,
    })
  }

  /// Delete interaction events older than `retention_days`.
  pub async fn prune(&self, retention_days: u32) -> Result<u64> {
    let before = Utc::now() - chrono::Duration::days(i64::from(retention_days));
    let removed = self.store.prune_interactions(before).await.map_err(Error::store)?;
    info!(removed, retention_days, "pruned interaction log");
    Ok(removed)
  }
}
