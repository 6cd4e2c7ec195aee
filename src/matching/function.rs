//! Match function: pool query, scoring and grouping for one profile
//!
//! The grouper sorts the whole pool, so every proposal of a run is computed
//! before the first is sent. A bounded channel then delivers them one at a
//! time in grouper order, pacing the feeder to the consumer.

use super::grouper::TicketGrouper;
use super::scorer::{SkillLatencyScorer, TicketScorer};
use crate::error::{PipelineError, Result};
use crate::metrics::MetricsCollector;
use crate::openmatch::{MatchSource, MatchStream, TicketPool};
use crate::types::{EvaluationInput, Match, MatchProfile, MATCH_FUNCTION_NAME};
use crate::utils::{current_timestamp, match_id, match_id_prefix};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

/// Default capacity of the proposal channel
pub const DEFAULT_STREAM_BUFFER: usize = 16;

/// Skill-and-latency match function
#[derive(Clone)]
pub struct MatchFunction {
    pool: Arc<dyn TicketPool>,
    scorer: Arc<dyn TicketScorer>,
    grouper: TicketGrouper,
    stream_buffer: usize,
    metrics: Option<Arc<MetricsCollector>>,
}

impl MatchFunction {
    pub fn new(pool: Arc<dyn TicketPool>, tickets_per_match: usize) -> Self {
        Self {
            pool,
            scorer: Arc::new(SkillLatencyScorer::new()),
            grouper: TicketGrouper::new(tickets_per_match),
            stream_buffer: DEFAULT_STREAM_BUFFER,
            metrics: None,
        }
    }

    /// Replace the default skill-and-latency scorer
    pub fn with_scorer(mut self, scorer: Arc<dyn TicketScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_stream_buffer(mut self, stream_buffer: usize) -> Self {
        self.stream_buffer = stream_buffer.max(1);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn tickets_per_match(&self) -> usize {
        self.grouper.tickets_per_match()
    }

    /// Query the profile's pool and group it into proposals
    ///
    /// A failed pool query fails the whole call. Fewer tickets than a full
    /// match yields an empty list.
    pub async fn propose(&self, profile: &MatchProfile) -> Result<Vec<Match>> {
        let pool = profile
            .primary_pool()
            .ok_or_else(|| PipelineError::ConfigurationError {
                message: format!("profile '{}' has no pools", profile.name),
            })?;

        let timer = self.metrics.as_ref().map(|m| m.start_timer());
        let tickets = self
            .pool
            .query_tickets(pool)
            .await
            .map_err(|e| PipelineError::PoolQueryFailed {
                pool: pool.name.clone(),
                message: format!("{:#}", e),
            })?;
        let queried = tickets.len();

        let scorer = self.scorer.clone();
        let groups = self
            .grouper
            .group(tickets, |t| scorer.score_ticket(t, profile));

        let prefix = match_id_prefix(&profile.name, current_timestamp());
        let proposals: Vec<Match> = groups
            .into_iter()
            .enumerate()
            .map(|(index, group)| Match {
                match_id: match_id(&prefix, index),
                match_profile: profile.name.clone(),
                match_function: MATCH_FUNCTION_NAME.to_string(),
                tickets: group.tickets,
                evaluation_input: EvaluationInput { score: group.score },
            })
            .collect();

        if let (Some(metrics), Some(timer)) = (&self.metrics, timer) {
            metrics.record_proposals(&profile.name, queried, proposals.len(), timer.stop());
        }

        debug!(
            profile = %profile.name,
            tickets = queried,
            proposals = proposals.len(),
            "Grouped pool into proposals"
        );
        Ok(proposals)
    }

    /// Run the match function and stream its proposals
    ///
    /// Pool query failures are returned before any proposal is produced.
    /// The full proposal list is held by the feeder task, which hands it to
    /// the bounded channel in grouper order.
    pub async fn run(&self, profile: &MatchProfile) -> Result<MatchStream> {
        let proposals = self.propose(profile).await?;
        let (tx, rx) = mpsc::channel(self.stream_buffer);
        let profile_name = profile.name.clone();

        tokio::spawn(async move {
            match send_proposals(proposals, &tx).await {
                Ok(sent) => info!(profile = %profile_name, sent, "Streamed proposals"),
                Err(e) => warn!(profile = %profile_name, error = %e, "Proposal stream aborted"),
            }
        });

        Ok(ReceiverStream::new(rx).map(Ok::<Match, anyhow::Error>).boxed())
    }
}

/// Send proposals one at a time, stopping at the first failed send
///
/// Returns the number of proposals delivered, or `StreamAborted` once the
/// receiving side has gone away.
pub async fn send_proposals(proposals: Vec<Match>, tx: &mpsc::Sender<Match>) -> Result<usize> {
    let total = proposals.len();
    let mut sent = 0;

    for proposal in proposals {
        if tx.send(proposal).await.is_err() {
            return Err(PipelineError::StreamAborted { sent, total }.into());
        }
        sent += 1;
    }

    Ok(sent)
}

#[async_trait]
impl MatchSource for MatchFunction {
    async fn fetch_matches(&self, profile: &MatchProfile) -> Result<MatchStream> {
        self.run(profile).await
    }
}
