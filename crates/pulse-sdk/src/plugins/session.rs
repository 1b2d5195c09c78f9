//! Session stage.

use async_trait::async_trait;
use std::sync::Arc;

use crate::session::SessionHandle;
use crate::timeline::{Stage, StageCategory, StageContext, StageError, StageResult};
use crate::utils::Clock;

/// Runs the event sequencer as the first `Before` stage.
pub struct SessionStage {
    session: SessionHandle,
    clock: Arc<dyn Clock>,
}

impl SessionStage {
    pub const NAME: &'static str = "session";

    pub fn new(session: SessionHandle, clock: Arc<dyn Clock>) -> Self {
        Self { session, clock }
    }
}

#[async_trait]
impl Stage for SessionStage {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn category(&self) -> StageCategory {
        StageCategory::Before
    }

    async fn execute(&self, ctx: &mut StageContext) -> StageResult {
        let now = self.clock.now_millis();
        let event = std::mem::take(&mut ctx.event);
        let mut ordered = self.session.process(event, now);

        match ordered.pop() {
            Some(event) => {
                ctx.event = event;
                ctx.preceding.extend(ordered);
                StageResult::Continue
            }
            None => StageResult::Abort(StageError::new(
                "empty_sequence",
                "sequencer returned no events",
            )),
        }
    }
}
