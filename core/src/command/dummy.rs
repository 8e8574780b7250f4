use std::time::Duration;

use async_trait::async_trait;

use crate::NodeId;

use super::{Callback, Command, CommandContext, CommandError, CommandResult, Completion};

/// Starts nothing and never completes, so it always times out
pub struct Dummy {
    wait: Duration,
    target: Option<NodeId>,
    callback: Callback<Duration>,
}

impl Dummy {
    pub fn new<F>(wait: Duration, callback: F) -> Self
    where
        F: FnOnce(&Duration, CommandResult) + Send + 'static,
    {
        Self {
            wait,
            target: None,
            callback: Box::new(callback),
        }
    }

    pub fn for_node(mut self, node_id: NodeId) -> Self {
        self.target = Some(node_id);
        self
    }
}

#[async_trait]
impl Command for Dummy {
    fn name(&self) -> &'static str {
        "dummy"
    }

    fn wait_duration(&self) -> Duration {
        self.wait
    }

    fn target(&self) -> Option<NodeId> {
        self.target
    }

    async fn run(&mut self, _: &CommandContext, _: Completion) -> Result<(), CommandError> {
        Ok(())
    }

    fn finish(self: Box<Self>, result: CommandResult) {
        let this = *self;
        (this.callback)(&this.wait, result)
    }
}
