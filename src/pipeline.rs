use crate::auto_reply::AutoReplyService;
use crate::db::{self, Db};
use crate::error::PipelineResult;
use crate::events::EventHub;
use crate::models::*;
use crate::poller::MailboxPoller;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Per-lane queue depth for reply work. Groups beyond this apply
/// backpressure on the dispatcher rather than piling up in memory.
const LANE_QUEUE_DEPTH: usize = 32;

/// Wires the poller, the classification stack and the reply service into
/// single ingestion-and-reply runs.
///
/// The coordinator owns its own database handle (a second connection to
/// the same file), so a running tick never contends with request handlers
/// for the managed one.
pub struct PipelineCoordinator {
    pub db: Arc<Db>,
    pub hub: Arc<EventHub>,
    pub service: Arc<AutoReplyService>,
    pub poller: MailboxPoller,
    pub worker_pool_size: usize,
    pub default_batch: usize,
    pub default_since_days: u32,
}

impl PipelineCoordinator {
    /// Ingest new mail and label it; no replies are drafted or sent.
    pub async fn run_ingest_only(&self, max: usize, since_days: u32) -> PipelineResult<TickReport> {
        let report = self.poller.tick(&self.db, max, since_days).await?;
        if report.newly_ingested > 0 {
            self.hub.broadcast_refresh("conversations", "ingest");
        }
        Ok(report)
    }

    /// Full cycle: ingest, then run the auto-reply service over every
    /// NEEDS_REPLY message still owed an attempt.
    ///
    /// Messages sharing a thread are processed in received-at order by a
    /// single lane; distinct threads run in parallel across the worker
    /// pool. Lanes drain their queues before the run returns.
    pub async fn run_full_tick(
        &self,
        max: usize,
        since_days: u32,
        force: bool,
    ) -> PipelineResult<FullRunReport> {
        let tick = self.poller.tick(&self.db, max, since_days).await?;

        let candidates = {
            let conn = self.db.conn();
            db::list_reply_candidates(&conn, max, force)
        };

        // Group by thread, preserving received-at order within each group.
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<i64>> = HashMap::new();
        for message in &candidates {
            let entry = groups.entry(message.thread_id.clone()).or_default();
            if entry.is_empty() {
                order.push(message.thread_id.clone());
            }
            entry.push(message.id);
        }

        let pool = self.worker_pool_size.max(1);
        let mut senders: Vec<mpsc::Sender<Vec<i64>>> = Vec::with_capacity(pool);
        let mut workers = Vec::with_capacity(pool);
        for _ in 0..pool {
            let (tx, mut rx) = mpsc::channel::<Vec<i64>>(LANE_QUEUE_DEPTH);
            senders.push(tx);
            let db = self.db.clone();
            let hub = self.hub.clone();
            let service = self.service.clone();
            workers.push(tokio::spawn(async move {
                let mut attempted = 0usize;
                let mut sent = 0usize;
                let mut failed = 0usize;
                while let Some(group) = rx.recv().await {
                    for message_id in group {
                        attempted += 1;
                        let request = AutoReplyRequest {
                            ota: None,
                            locale: None,
                            property_code: None,
                            use_llm: true,
                            force,
                        };
                        match service.suggest_reply(&db, &hub, message_id, &request).await {
                            Ok(Some(s)) if s.sent => sent += 1,
                            Ok(_) => {}
                            Err(e) => {
                                eprintln!("⚠️ reply attempt failed for message {message_id}: {e}");
                                failed += 1;
                            }
                        }
                    }
                }
                (attempted, sent, failed)
            }));
        }

        // Single-writer-per-thread: a thread's group always lands on the
        // same lane.
        for thread_id in order {
            let Some(group) = groups.remove(&thread_id) else {
                continue;
            };
            let lane = lane_for(&thread_id, pool);
            if senders[lane].send(group).await.is_err() {
                eprintln!("⚠️ reply lane {lane} is gone, dropping thread {thread_id}");
            }
        }
        drop(senders);

        let mut report = FullRunReport {
            tick,
            ..FullRunReport::default()
        };
        for worker in workers {
            if let Ok((attempted, sent, failed)) = worker.await {
                report.replies_attempted += attempted;
                report.replies_sent += sent;
                report.replies_failed += failed;
            }
        }

        self.hub.broadcast_refresh("all", "pipeline_tick");
        Ok(report)
    }

    /// Periodic loop around `run_full_tick`. Fatal errors (mailbox down,
    /// database unavailable) are logged and the whole tick retried on the
    /// next interval.
    pub async fn run_forever(self: Arc<Self>, interval_secs: u64) {
        loop {
            match self
                .run_full_tick(self.default_batch, self.default_since_days, false)
                .await
            {
                Ok(report) => {
                    if report.tick.newly_ingested > 0 || report.replies_attempted > 0 {
                        println!(
                            "📬 pipeline tick: fetched={} new={} replies={} sent={} failed={}",
                            report.tick.fetched,
                            report.tick.newly_ingested,
                            report.replies_attempted,
                            report.replies_sent,
                            report.tick.failed + report.replies_failed,
                        );
                    }
                }
                Err(e) => {
                    eprintln!("⚠️ pipeline tick failed: {e}");
                }
            }
            tokio::time::sleep(Duration::from_secs(interval_secs)).await;
        }
    }
}

fn lane_for(thread_id: &str, pool: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    thread_id.hash(&mut hasher);
    (hasher.finish() as usize) % pool
}

/// Spawn the background poll loop. Mirrors the request path but with its
/// own database connection.
pub fn spawn_poll_loop(coordinator: Arc<PipelineCoordinator>, interval_secs: u64) {
    tokio::spawn(async move {
        // Let the server finish booting before the first tick.
        tokio::time::sleep(Duration::from_secs(5)).await;
        coordinator.run_forever(interval_secs).await;
    });
}
