use crate::domain::events::StudyEvent;
use std::sync::Arc;

#[cfg_attr(test, mockall::automock)]
pub trait EventPublisher: Send + Sync {
    /// Deliver an event to the current subscribers of `video_id`.
    /// Returns how many subscribers it reached.
    fn publish(&self, video_id: &str, event: StudyEvent) -> usize;
}

impl<T: EventPublisher + ?Sized> EventPublisher for Arc<T> {
    fn publish(&self, video_id: &str, event: StudyEvent) -> usize {
        (**self).publish(video_id, event)
    }
}
