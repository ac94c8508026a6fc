//! Background resolution agent.
//!
//! The agent owns a tokio task that pulls submissions from a bounded queue,
//! resolves them with a shared [`RuleEngine`] and re-enqueues entities that
//! are still partial, so that a later attempt can profit from whatever the
//! knowledge base learned in the meantime:
//!
//! ```text
//! submit ──> mpsc queue ──> worker ──> resolve_entity
//!                             ^             │
//!                             │   partial   │ resolved / attempts exhausted /
//!                             └── retries <─┤ shutting down
//!                                           v
//!                                     oneshot reply
//! ```
//!
//! Fresh submissions are always taken before retries. A shutdown signal stops
//! re-enqueueing: work that is still partial is answered as it stands.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::api::{Outcome, Resolution, RuleEngine};
use crate::context::EvaluationContext;
use crate::engine::RuleSetFactory;
use crate::error::{Error, Result};
use crate::knowledge::KnowledgeBase;
use crate::masked::{Mask, MaskedEntity};

#[derive(Debug, Clone)]
pub struct AgentOptions {
    /// Resolution attempts per submission, including the first one.
    pub max_attempts: usize,
    /// Submissions buffered before `submit` waits.
    pub queue_capacity: usize,
}

impl Default for AgentOptions {
    fn default() -> Self {
        AgentOptions { max_attempts: 3, queue_capacity: 64 }
    }
}

/// Final answer for one submission.
#[derive(Debug)]
pub struct AgentReport<M: Mask> {
    pub resolution: Resolution<M>,
    pub attempts: usize,
}

struct Submission<M: Mask> {
    context: EvaluationContext,
    reply: oneshot::Sender<Result<AgentReport<M>>>,
}

struct WorkItem<M: Mask> {
    context: EvaluationContext,
    entity: MaskedEntity<M>,
    attempts: usize,
    started: Instant,
    reply: oneshot::Sender<Result<AgentReport<M>>>,
}

impl<M: Mask> WorkItem<M> {
    /// Answer with the entity as it stands.
    fn finish(self) {
        let report = AgentReport {
            attempts: self.attempts,
            resolution: Resolution { entity: self.entity, outcome: Outcome::Partial, elapsed: self.started.elapsed() },
        };
        self.reply.send(Ok(report)).ok();
    }
}

pub struct Agent<M: Mask> {
    sender: mpsc::Sender<Submission<M>>,
    shutdown: watch::Sender<bool>,
    worker: JoinHandle<()>,
}

impl<M: Mask> Agent<M> {
    /// Start the worker task on the current tokio runtime.
    pub fn spawn<F, K>(engine: Arc<RuleEngine<M, F, K>>, options: AgentOptions) -> Self
    where
        F: RuleSetFactory<M> + 'static,
        K: KnowledgeBase<M> + ?Sized + 'static,
    {
        let (sender, receiver) = mpsc::channel(options.queue_capacity.max(1));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let worker = tokio::spawn(run_worker(engine, receiver, shutdown_rx, options));
        Agent { sender, shutdown, worker }
    }

    /// Queue `context` and wait for its final answer.
    pub async fn submit(&self, context: EvaluationContext) -> Result<AgentReport<M>> {
        if *self.shutdown.borrow() {
            return Err(Error::AgentClosed);
        }

        let (reply, response) = oneshot::channel();
        self.sender.send(Submission { context, reply }).await.map_err(|_| Error::AgentClosed)?;
        response.await.map_err(|_| Error::AgentClosed)?
    }

    /// Stop accepting work and stop re-enqueueing. Already queued
    /// submissions are still answered.
    pub fn close(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// [`close`](Self::close) and wait for the worker to drain.
    pub async fn shutdown(self) {
        self.close();
        drop(self.sender);
        if let Err(err) = self.worker.await {
            warn!(error = %err, "agent worker terminated abnormally");
        }
    }
}

async fn run_worker<M, F, K>(
    engine: Arc<RuleEngine<M, F, K>>,
    mut receiver: mpsc::Receiver<Submission<M>>,
    mut shutdown: watch::Receiver<bool>,
    options: AgentOptions,
) where
    M: Mask,
    F: RuleSetFactory<M>,
    K: KnowledgeBase<M> + ?Sized,
{
    let mut retries: VecDeque<WorkItem<M>> = VecDeque::new();
    let mut closed = false;
    debug!("agent started");

    loop {
        if !closed && *shutdown.borrow() {
            receiver.close();
            closed = true;
            debug!(pending_retries = retries.len(), "agent shutting down");
        }

        let submission = match receiver.try_recv() {
            Ok(submission) => Some(submission),
            Err(TryRecvError::Empty) if retries.is_empty() => {
                tokio::select! {
                    biased;
                    received = receiver.recv() => match received {
                        Some(submission) => Some(submission),
                        None => break,
                    },
                    _ = shutdown.changed(), if !closed => continue,
                }
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => None,
        };

        let item = match submission {
            Some(submission) => match start(&engine, submission) {
                Some(item) => item,
                None => continue,
            },
            None => match retries.pop_front() {
                Some(item) => item,
                None => break,
            },
        };

        if let Some(item) = attempt(&engine, item, &options, &shutdown).await {
            retries.push_back(item);
        }
    }

    debug!("agent stopped");
}

/// Turn a submission into a work item, answering it right away when the name
/// cannot be tokenized.
fn start<M, F, K>(engine: &RuleEngine<M, F, K>, submission: Submission<M>) -> Option<WorkItem<M>>
where
    M: Mask,
    F: RuleSetFactory<M>,
    K: KnowledgeBase<M> + ?Sized,
{
    let Submission { context, reply } = submission;
    match engine.entity_for(&context) {
        Ok(entity) => Some(WorkItem { context, entity, attempts: 0, started: Instant::now(), reply }),
        Err(err) => {
            reply.send(Err(err)).ok();
            None
        }
    }
}

/// Run one attempt. Returns the item when it should be retried.
async fn attempt<M, F, K>(
    engine: &RuleEngine<M, F, K>,
    mut item: WorkItem<M>,
    options: &AgentOptions,
    shutdown: &watch::Receiver<bool>,
) -> Option<WorkItem<M>>
where
    M: Mask,
    F: RuleSetFactory<M>,
    K: KnowledgeBase<M> + ?Sized,
{
    if item.reply.is_closed() {
        trace!(name = item.context.name(), "submitter went away, dropping work item");
        return None;
    }

    item.attempts += 1;
    let outcome = match engine.resolve_entity(&item.context, &mut item.entity).await {
        Ok((outcome, _)) => outcome,
        Err(err) => {
            item.reply.send(Err(err)).ok();
            return None;
        }
    };

    if outcome.is_resolved() {
        let report = AgentReport {
            attempts: item.attempts,
            resolution: Resolution { entity: item.entity, outcome, elapsed: item.started.elapsed() },
        };
        item.reply.send(Ok(report)).ok();
        return None;
    }

    if item.attempts >= options.max_attempts || *shutdown.borrow() {
        warn!(
            name = item.context.name(),
            attempts = item.attempts,
            masked = item.entity.masked_count(),
            tokens = item.entity.token_count(),
            "giving up on partially resolved entity"
        );
        item.finish();
        return None;
    }

    debug!(name = item.context.name(), attempts = item.attempts, "re-enqueueing partially resolved entity");
    Some(item)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{FnRule, Matcher, RuleSet, ValueRestriction};
    use crate::knowledge::{MemoryKnowledgeBase, NoKnowledgeBase};
    use crate::masked::{MaskConfiguration, MaskRegistry};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum TestMask {
        Unknown,
        Word,
        Number,
    }

    fn registry() -> Arc<MaskRegistry<TestMask>> {
        Arc::new(
            MaskRegistry::new(TestMask::Unknown, MaskConfiguration::unmergeable("%?"))
                .with(TestMask::Word, MaskConfiguration::new("%w"))
                .with(TestMask::Number, MaskConfiguration::unmergeable("%n")),
        )
    }

    fn number_rule() -> FnRule<TestMask> {
        FnRule::new("number", TestMask::Number, Matcher::Regex(regex!(r"^\d+$")))
            .with_restriction(ValueRestriction::NUMERIC)
    }

    fn word_rule() -> FnRule<TestMask> {
        FnRule::new("word", TestMask::Word, Matcher::Regex(regex!(r"^[A-Za-z]+$")))
            .with_restriction(ValueRestriction::ALPHABETICAL)
    }

    fn ctx(name: &str) -> EvaluationContext {
        EvaluationContext::from_name(name).unwrap()
    }

    #[tokio::test]
    async fn resolved_submission_is_answered_after_one_attempt() {
        let factory = |_: &EvaluationContext| RuleSet::new().with(number_rule()).with(word_rule());
        let engine = Arc::new(RuleEngine::new(registry(), factory, Arc::new(MemoryKnowledgeBase::new())));
        let agent = Agent::spawn(engine, AgentOptions::default());

        let report = agent.submit(ctx("Show 01")).await.unwrap();

        assert_eq!(report.attempts, 1);
        assert_eq!(report.resolution.outcome, Outcome::Rules);
        assert_eq!(report.resolution.rendered(), "%w%n");
        agent.shutdown().await;
    }

    #[tokio::test]
    async fn partial_result_after_max_attempts() {
        let factory = |_: &EvaluationContext| RuleSet::new().with(number_rule());
        let engine = Arc::new(RuleEngine::new(registry(), factory, Arc::new(NoKnowledgeBase)));
        let agent = Agent::spawn(engine, AgentOptions { max_attempts: 2, ..AgentOptions::default() });

        let report = agent.submit(ctx("Show 01")).await.unwrap();

        assert_eq!(report.attempts, 2);
        assert_eq!(report.resolution.outcome, Outcome::Partial);
        assert_eq!(report.resolution.entity.masked_count(), 1);
        agent.shutdown().await;
    }

    #[tokio::test]
    async fn retry_resolves_what_the_first_attempt_missed() {
        // The word rule only shows up from the second rule set on, as if a
        // lookup service came online between attempts.
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let factory = move |_: &EvaluationContext| {
            let set = RuleSet::new().with(number_rule());
            if counter.fetch_add(1, Ordering::SeqCst) == 0 { set } else { set.with(word_rule()) }
        };
        let engine = Arc::new(RuleEngine::new(registry(), factory, Arc::new(NoKnowledgeBase)));
        let agent = Agent::spawn(engine, AgentOptions::default());

        let report = agent.submit(ctx("Show 01")).await.unwrap();

        assert_eq!(report.attempts, 2);
        assert_eq!(report.resolution.outcome, Outcome::Rules);
        assert_eq!(report.resolution.rendered(), "%w%n");
        assert_eq!(built.load(Ordering::SeqCst), 2);
        agent.shutdown().await;
    }

    #[tokio::test]
    async fn concurrent_submissions_are_all_answered() {
        let factory = |_: &EvaluationContext| RuleSet::new().with(number_rule()).with(word_rule());
        let kb = Arc::new(MemoryKnowledgeBase::new());
        let engine = Arc::new(RuleEngine::new(registry(), factory, Arc::clone(&kb)));
        let agent = Agent::spawn(engine, AgentOptions { queue_capacity: 2, ..AgentOptions::default() });

        let (a, b, c, d) = tokio::join!(
            agent.submit(ctx("Show 01")),
            agent.submit(ctx("Other 02")),
            agent.submit(ctx("Third 03")),
            agent.submit(ctx("Fourth 04")),
        );

        for report in [a, b, c, d] {
            let report = report.unwrap();
            assert_eq!(report.attempts, 1);
            assert!(report.resolution.outcome.is_resolved());
        }
        // The first one resolved by rules is recorded; the rest replay it.
        assert_eq!(kb.len().await, 1);
        agent.shutdown().await;
    }

    #[tokio::test]
    async fn invalid_names_are_reported() {
        let factory = |_: &EvaluationContext| RuleSet::new().with(number_rule());
        let engine = Arc::new(RuleEngine::new(registry(), factory, Arc::new(NoKnowledgeBase)));
        let agent = Agent::spawn(engine, AgentOptions::default());

        let long = EvaluationContext::from_name("x".repeat(300)).unwrap();
        assert!(matches!(agent.submit(long).await, Err(Error::InputTooLong { len: 300 })));
        agent.shutdown().await;
    }

    #[tokio::test]
    async fn closed_agent_rejects_submissions() {
        let factory = |_: &EvaluationContext| RuleSet::new().with(number_rule());
        let engine = Arc::new(RuleEngine::new(registry(), factory, Arc::new(NoKnowledgeBase)));
        let agent = Agent::spawn(engine, AgentOptions::default());

        agent.close();

        assert!(agent.is_closed());
        let err = agent.submit(ctx("Show 01")).await.unwrap_err();
        assert!(matches!(err, Error::AgentClosed));
        agent.shutdown().await;
    }
}
