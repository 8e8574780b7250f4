use std::sync::Arc;

use tokio::{task::JoinHandle, time};
use tracing::{debug, info, warn};

use super::{Command, CommandContext, CommandError, CommandQueue, CommandResult, Completion};

/// Runs queued commands one at a time against the device fabric
pub struct Orchestrator {
    queue: Arc<CommandQueue>,
    ctx: CommandContext,
}

impl Orchestrator {
    pub fn new(queue: Arc<CommandQueue>, ctx: CommandContext) -> Self {
        Self { queue, ctx }
    }

    pub fn start(self) -> OrchestratorHandle {
        let queue = self.queue.clone();
        let join = tokio::spawn(self.run());
        OrchestratorHandle { queue, join }
    }

    async fn run(self) {
        info!("orchestrator started");
        while let Some(command) = self.queue.next().await {
            self.execute(command).await;
        }
        for command in self.queue.drain() {
            debug!(command = command.name(), "failing queued command on shutdown");
            command.finish(Err(CommandError::ShuttingDown));
        }
        info!("orchestrator stopped");
    }

    async fn execute(&self, mut command: Box<dyn Command>) {
        let name = command.name();
        let wait = command.wait_duration();
        let target = command.target();
        let (completion, mut rx) = Completion::new();
        self.queue.set_in_flight(target, completion.clone());
        debug!(command = name, node_id = ?target, ?wait, "running");

        let ran = time::timeout(wait, async {
            if let Err(e) = command.run(&self.ctx, completion.clone()).await {
                completion.complete(Err(e));
            }
            (&mut rx).await
        })
        .await;

        let result: CommandResult = match ran {
            Ok(Ok(result)) => result,
            // Every sender clone lives in `completion`, so this cannot happen
            Ok(Err(_)) => Err(CommandError::ShuttingDown),
            Err(_) => {
                if completion.complete(Err(CommandError::Timeout)) {
                    warn!(command = name, node_id = ?target, ?wait, "timed out");
                }
                // A completion that raced the deadline still wins
                rx.try_recv().unwrap_or(Err(CommandError::Timeout))
            }
        };
        completion.abort_tasks();
        self.queue.clear_in_flight();

        match &result {
            Ok(_) => debug!(command = name, "completed"),
            Err(e) => debug!(command = name, error = %e, "failed"),
        }
        command.finish(result);
    }
}

pub struct OrchestratorHandle {
    queue: Arc<CommandQueue>,
    join: JoinHandle<()>,
}

impl OrchestratorHandle {
    pub fn queue(&self) -> &Arc<CommandQueue> {
        &self.queue
    }

    /// Stop the queue, let the running command finish or time out, then fail the rest
    pub async fn shutdown(self) {
        self.queue.stop();
        if let Err(e) = self.join.await {
            warn!(error = %e, "orchestrator task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
        time::Duration,
    };

    use async_trait::async_trait;
    use tokio::time::Instant;

    use super::*;
    use crate::{
        command::{tests::harness, CommandOutput, Dummy},
        protocol::mock::MockProtocol,
    };

    type Log = Arc<Mutex<Vec<(usize, CommandResult)>>>;

    /// Completes after `delay`, recording overlap with other probes
    struct Probe {
        index: usize,
        delay: Duration,
        active: Arc<AtomicUsize>,
        overlap: Arc<AtomicUsize>,
        log: Log,
    }

    #[async_trait]
    impl Command for Probe {
        fn name(&self) -> &'static str {
            "probe"
        }

        fn wait_duration(&self) -> Duration {
            Duration::from_secs(10)
        }

        async fn run(
            &mut self,
            _ctx: &CommandContext,
            completion: Completion,
        ) -> Result<(), CommandError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.overlap.fetch_max(now, Ordering::SeqCst);
            let delay = self.delay;
            let active = self.active.clone();
            completion.spawn_result(async move {
                time::sleep(delay).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(CommandOutput::None)
            });
            Ok(())
        }

        fn finish(self: Box<Self>, result: CommandResult) {
            self.log.lock().unwrap().push((self.index, result));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_flight_in_order() {
        let h = harness(MockProtocol::new());
        let queue = Arc::new(CommandQueue::new());
        let log: Log = Default::default();
        let active = Arc::new(AtomicUsize::new(0));
        let overlap = Arc::new(AtomicUsize::new(0));
        for index in 0..5 {
            queue
                .enqueue(Box::new(Probe {
                    index,
                    delay: Duration::from_millis(100 * (5 - index as u64)),
                    active: active.clone(),
                    overlap: overlap.clone(),
                    log: log.clone(),
                }))
                .unwrap();
        }
        let handle = Orchestrator::new(queue.clone(), h.ctx).start();
        while log.lock().unwrap().len() < 5 {
            time::sleep(Duration::from_millis(50)).await;
        }
        handle.shutdown().await;

        let log = log.lock().unwrap();
        let order: Vec<usize> = log.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
        assert!(log.iter().all(|(_, r)| r == &Ok(CommandOutput::None)));
        assert_eq!(overlap.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fires_at_wait_duration() {
        let h = harness(MockProtocol::new());
        let queue = Arc::new(CommandQueue::new());
        let fired = Arc::new(Mutex::new(None));
        let sink = fired.clone();
        let start = Instant::now();
        queue
            .enqueue(Box::new(Dummy::new(Duration::from_secs(3), move |_, result| {
                *sink.lock().unwrap() = Some((Instant::now(), result));
            })))
            .unwrap();
        let handle = Orchestrator::new(queue, h.ctx).start();

        time::sleep(Duration::from_millis(2_900)).await;
        assert!(fired.lock().unwrap().is_none());
        time::sleep(Duration::from_millis(200)).await;
        let (at, result) = fired.lock().unwrap().take().unwrap();
        assert_eq!(result, Err(CommandError::Timeout));
        let elapsed = at - start;
        assert!(elapsed >= Duration::from_secs(3));
        assert!(elapsed < Duration::from_millis(3_100));
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_completion_is_ignored() {
        let h = harness(MockProtocol::new());
        let queue = Arc::new(CommandQueue::new());
        let log: Log = Default::default();
        let active = Arc::new(AtomicUsize::new(0));
        let overlap = Arc::new(AtomicUsize::new(0));
        let slow = Probe {
            index: 0,
            delay: Duration::from_secs(30),
            active: active.clone(),
            overlap: overlap.clone(),
            log: log.clone(),
        };
        let fast = Probe {
            index: 1,
            delay: Duration::from_millis(10),
            active,
            overlap,
            log: log.clone(),
        };
        queue.enqueue(Box::new(slow)).unwrap();
        queue.enqueue(Box::new(fast)).unwrap();
        let handle = Orchestrator::new(queue, h.ctx).start();

        time::sleep(Duration::from_secs(60)).await;
        handle.shutdown().await;

        let log = log.lock().unwrap();
        assert_eq!(
            *log,
            vec![(0, Err(CommandError::Timeout)), (1, Ok(CommandOutput::None))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_fails_queued_commands() {
        let h = harness(MockProtocol::new());
        let queue = Arc::new(CommandQueue::new());
        let results = Arc::new(Mutex::new(vec![]));
        for secs in [1, 5, 5] {
            let sink = results.clone();
            queue
                .enqueue(Box::new(Dummy::new(Duration::from_secs(secs), move |_, r| {
                    sink.lock().unwrap().push(r)
                })))
                .unwrap();
        }
        let handle = Orchestrator::new(queue.clone(), h.ctx).start();
        time::sleep(Duration::from_millis(10)).await;
        handle.shutdown().await;

        let results = results.lock().unwrap();
        assert_eq!(
            *results,
            vec![
                Err(CommandError::Timeout),
                Err(CommandError::ShuttingDown),
                Err(CommandError::ShuttingDown)
            ]
        );
        assert!(queue
            .enqueue(Box::new(Dummy::new(Duration::from_secs(1), |_, _| {})))
            .is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_target_completes_running_command() {
        let h = harness(MockProtocol::new());
        let queue = Arc::new(CommandQueue::new());
        let fired = Arc::new(Mutex::new(None));
        let sink = fired.clone();
        queue
            .enqueue(Box::new(
                Dummy::new(Duration::from_secs(60), move |_, r| {
                    *sink.lock().unwrap() = Some(r)
                })
                .for_node(9),
            ))
            .unwrap();
        let handle = Orchestrator::new(queue.clone(), h.ctx).start();
        time::sleep(Duration::from_secs(1)).await;
        assert!(queue.fail_target(9));
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(
            fired.lock().unwrap().take(),
            Some(Err(CommandError::TargetGone(9)))
        );
        handle.shutdown().await;
    }
}
