//! Identity enrichment stage.

use async_trait::async_trait;
use uuid::Uuid;

use crate::session::SessionHandle;
use crate::timeline::{Stage, StageCategory, StageContext, StageResult};

/// Library tag stamped on every event.
pub const LIBRARY: &str = concat!("pulse-rust/", env!("CARGO_PKG_VERSION"));

/// Fills in identity fields the caller left empty.
///
/// Reads the session engine but never mutates it.
pub struct IdentityStage {
    session: SessionHandle,
}

impl IdentityStage {
    pub const NAME: &'static str = "identity";

    pub fn new(session: SessionHandle) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Stage for IdentityStage {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn category(&self) -> StageCategory {
        StageCategory::Enrichment
    }

    async fn execute(&self, ctx: &mut StageContext) -> StageResult {
        let event = &mut ctx.event;

        if event.user_id.is_none() {
            event.user_id = self.session.user_id();
        }
        if event.device_id.is_none() {
            event.device_id = self.session.device_id();
        }
        if event.insert_id.is_none() {
            event.insert_id = Some(Uuid::new_v4().to_string());
        }
        event.library = Some(LIBRARY.to_string());

        StageResult::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::{Event, SessionState};

    fn handle() -> SessionHandle {
        let state = SessionState {
            user_id: Some("user-1".into()),
            device_id: Some("device-1".into()),
            ..Default::default()
        };
        SessionHandle::from_state(state)
    }

    #[tokio::test]
    async fn test_stamps_missing_identity() {
        let stage = IdentityStage::new(handle());
        let mut ctx = StageContext::new(Event::new("e"));
        stage.execute(&mut ctx).await;

        assert_eq!(ctx.event.user_id.as_deref(), Some("user-1"));
        assert_eq!(ctx.event.device_id.as_deref(), Some("device-1"));
        assert!(ctx.event.insert_id.is_some());
        assert!(ctx.event.library.as_deref().unwrap().starts_with("pulse-rust/"));
    }

    #[tokio::test]
    async fn test_keeps_caller_identity() {
        let session = handle();
        let before = session.snapshot();
        let stage = IdentityStage::new(session.clone());

        let mut event = Event::new("e").with_user_id("someone-else");
        event.insert_id = Some("fixed".into());
        let mut ctx = StageContext::new(event);
        stage.execute(&mut ctx).await;

        assert_eq!(ctx.event.user_id.as_deref(), Some("someone-else"));
        assert_eq!(ctx.event.insert_id.as_deref(), Some("fixed"));
        assert_eq!(session.snapshot(), before);
    }
}
