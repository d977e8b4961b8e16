//! Per-event ingestion pipeline.
//!
//! Each inbound event runs through validation, the eligibility filter, the
//! extraction client, entity resolution and the message store, in that
//! order. Every stage returns a typed result; a failure ends that event's
//! pipeline and never affects any other.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::eligibility::{Eligibility, EligibilityFilter, SkipReason};
use crate::error::PipelineError;
use crate::extraction::SentimentExtractor;
use crate::logging::OperationTimer;
use crate::metrics::{MetricsCollector, OutcomeLabel};
use crate::models::{InboundEvent, NewMessage, StoreResult, StoredMessage};
use crate::oracle::ClassificationOracle;
use crate::repository::SentimentRepository;
use crate::resolver::EntityResolver;
use crate::store::MessageStore;
use crate::utils::preview;
use crate::validation::InputValidator;

/// Terminal state of one event's pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// Filtered out before any remote call
    Skipped(SkipReason),
    /// Enriched and inserted
    Stored(StoredMessage),
    /// The external id was already stored; the existing row is returned
    Duplicate(StoredMessage),
    /// Dropped after a failure
    Failed(PipelineError),
}

impl PipelineOutcome {
    const fn label(&self) -> OutcomeLabel {
        match self {
            Self::Skipped(_) => OutcomeLabel::Skipped,
            Self::Stored(_) => OutcomeLabel::Created,
            Self::Duplicate(_) => OutcomeLabel::Duplicate,
            Self::Failed(_) => OutcomeLabel::Failed,
        }
    }
}

/// Counts of terminal states over one ingestion run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub received: usize,
    pub skipped: usize,
    pub stored: usize,
    pub duplicates: usize,
    pub failed: usize,
}

impl IngestSummary {
    fn record(&mut self, outcome: &PipelineOutcome) {
        match outcome {
            PipelineOutcome::Skipped(_) => self.skipped += 1,
            PipelineOutcome::Stored(_) => self.stored += 1,
            PipelineOutcome::Duplicate(_) => self.duplicates += 1,
            PipelineOutcome::Failed(_) => self.failed += 1,
        }
    }
}

/// Statically composed ingestion pipeline
#[derive(Clone)]
pub struct Orchestrator {
    filter: EligibilityFilter,
    extractor: SentimentExtractor,
    resolver: EntityResolver,
    store: MessageStore,
    metrics: Arc<MetricsCollector>,
}

impl Orchestrator {
    pub fn new(
        filter: EligibilityFilter,
        extractor: SentimentExtractor,
        resolver: EntityResolver,
        store: MessageStore,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            filter,
            extractor,
            resolver,
            store,
            metrics,
        }
    }

    /// Wire the pipeline from configuration and its two remote capabilities
    pub fn from_config(
        config: &AppConfig,
        repo: Arc<dyn SentimentRepository>,
        oracle: Arc<dyn ClassificationOracle>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let extractor = SentimentExtractor::new(
            oracle,
            Duration::from_secs(config.oracle.timeout_secs),
            config.ingestion.max_content_length,
        );
        Self::new(
            EligibilityFilter::from_config(&config.ingestion),
            extractor,
            EntityResolver::new(Arc::clone(&repo)),
            MessageStore::new(repo),
            metrics,
        )
    }

    /// Run one event to a terminal state, reporting it to logs and metrics
    pub async fn process_event(&self, event: InboundEvent) -> PipelineOutcome {
        let outcome = self.run_pipeline(&event).await.unwrap_or_else(PipelineOutcome::Failed);

        match &outcome {
            PipelineOutcome::Skipped(reason) => {
                debug!(external_id = %event.external_message_id, ?reason, "Skipped message");
            }
            PipelineOutcome::Stored(message) => {
                info!(
                    external_id = %message.external_id,
                    protocol = message.enrichment.protocol_name.as_deref().unwrap_or("-"),
                    sentiment = ?message.enrichment.sentiment_score,
                    "Stored enriched message"
                );
                if let Some(score) = message.enrichment.sentiment_score {
                    self.metrics.record_sentiment(score);
                }
            }
            PipelineOutcome::Duplicate(message) => {
                debug!(external_id = %message.external_id, "Message already stored");
            }
            PipelineOutcome::Failed(err) => {
                warn!(
                    external_id = %event.external_message_id,
                    stage = err.stage(),
                    kind = err.kind(),
                    content = %preview(&event.content),
                    "Dropped message: {err}"
                );
            }
        }

        match &outcome {
            PipelineOutcome::Failed(err) => self.metrics.record_failure(err),
            other => self.metrics.record_outcome(other.label()),
        }
        outcome
    }

    async fn run_pipeline(&self, event: &InboundEvent) -> Result<PipelineOutcome, PipelineError> {
        InputValidator::validate_event(event).map_err(|e| PipelineError::InvalidEvent(e.to_string()))?;

        if let Eligibility::Skip(reason) =
            self.filter
                .check(&event.content, event.author_is_automated, &event.external_author_id)
        {
            return Ok(PipelineOutcome::Skipped(reason));
        }

        // Redelivery of a stored id needs no oracle call
        if let Some(existing) = self
            .store
            .find(&event.external_message_id)
            .await
            .map_err(PipelineError::Store)?
        {
            return Ok(PipelineOutcome::Duplicate(existing));
        }

        let timer = OperationTimer::new("oracle_call");
        let extracted = self.extractor.extract(&event.content).await;
        self.metrics.record_oracle_call(timer.finish(), extracted.is_ok());
        let enrichment = extracted?;

        let user = self
            .resolver
            .resolve_user(
                &event.external_author_id,
                &InputValidator::sanitize_text(&event.author_display_name),
            )
            .await
            .map_err(PipelineError::Resolution)?;
        let channel = self
            .resolver
            .resolve_channel(
                &event.external_channel_id,
                &InputValidator::sanitize_text(&event.channel_name),
            )
            .await
            .map_err(PipelineError::Resolution)?;

        let new_message = NewMessage {
            external_id: event.external_message_id.clone(),
            user_id: user.id,
            channel_id: channel.id,
            content: event.content.clone(),
            created_at: event.created_at,
            enrichment,
        };

        let outcome = match self.store.record_message(new_message).await.map_err(PipelineError::Store)? {
            StoreResult::Created(message) => PipelineOutcome::Stored(message),
            StoreResult::AlreadyExists(message) => PipelineOutcome::Duplicate(message),
        };
        Ok(outcome)
    }

    /// Consume events until the sender side closes, running up to
    /// `max_concurrent` pipelines at once. Pipelines already started are
    /// drained before returning.
    pub async fn run(&self, mut events: mpsc::Receiver<InboundEvent>, max_concurrent: usize) -> IngestSummary {
        let permits = Arc::new(Semaphore::new(max_concurrent.max(1)));
        let mut tasks = JoinSet::new();
        let mut summary = IngestSummary::default();

        while let Some(event) = events.recv().await {
            summary.received += 1;

            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                break;
            };
            let orchestrator = self.clone();
            tasks.spawn(async move {
                let outcome = orchestrator.process_event(event).await;
                drop(permit);
                outcome
            });

            while let Some(joined) = tasks.try_join_next() {
                Self::tally(&mut summary, joined);
            }
        }

        debug!(in_flight = tasks.len(), "Event stream closed, draining");
        while let Some(joined) = tasks.join_next().await {
            Self::tally(&mut summary, joined);
        }

        info!(
            received = summary.received,
            stored = summary.stored,
            duplicates = summary.duplicates,
            skipped = summary.skipped,
            failed = summary.failed,
            "Ingestion finished"
        );
        summary
    }

    fn tally(summary: &mut IngestSummary, joined: Result<PipelineOutcome, tokio::task::JoinError>) {
        match joined {
            Ok(outcome) => summary.record(&outcome),
            Err(e) => {
                error!("Pipeline task panicked: {e}");
                summary.failed += 1;
            }
        }
    }
}

/// Feed newline-delimited JSON events from `reader` into `events`.
///
/// Blank lines are ignored and unparseable lines are logged and counted.
/// Returns the number of rejected lines once the reader is exhausted or the
/// receiver goes away.
pub async fn read_events<R>(reader: R, events: mpsc::Sender<InboundEvent>) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut rejected = 0;
    let mut line_no = 0_usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if !forward_line(line_no, &line, &events, &mut rejected).await {
            break;
        }
    }
    Ok(rejected)
}

/// Same as [`read_events`], for lines produced by [`spawn_line_reader`].
pub async fn read_event_lines(
    mut lines: mpsc::Receiver<std::io::Result<String>>,
    events: mpsc::Sender<InboundEvent>,
) -> std::io::Result<usize> {
    let mut rejected = 0;
    let mut line_no = 0_usize;

    while let Some(line) = lines.recv().await {
        line_no += 1;
        if !forward_line(line_no, &line?, &events, &mut rejected).await {
            break;
        }
    }
    Ok(rejected)
}

/// Read lines from a blocking reader on a detached OS thread.
///
/// A read blocked on stdin cannot be cancelled, so it must not live on the
/// runtime's blocking pool where it would hold up shutdown. Dropping the
/// receiver ends the thread after its current read.
pub fn spawn_line_reader<R>(reader: R, capacity: usize) -> mpsc::Receiver<std::io::Result<String>>
where
    R: std::io::BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    std::thread::spawn(move || {
        for line in reader.lines() {
            let failed = line.is_err();
            if tx.blocking_send(line).is_err() || failed {
                break;
            }
        }
    });
    rx
}

/// Parse one input line and forward it. Returns false once the receiver is gone.
async fn forward_line(
    line_no: usize,
    line: &str,
    events: &mpsc::Sender<InboundEvent>,
    rejected: &mut usize,
) -> bool {
    if line.trim().is_empty() {
        return true;
    }
    match serde_json::from_str::<InboundEvent>(line) {
        Ok(event) => {
            if events.send(event).await.is_err() {
                debug!("Event receiver closed, stopping reader");
                return false;
            }
        }
        Err(e) => {
            warn!(line = line_no, "Rejected event line: {e}");
            *rejected += 1;
        }
    }
    true
}
