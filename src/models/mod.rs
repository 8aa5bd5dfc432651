pub mod daily;
pub mod event;
pub mod user;

pub use daily::{day_key, DailyAggregate};
pub use event::{BrowserInfo, Event, EventMetadata, EventType, NewEvent, TrackEventRequest};
pub use user::UserAccount;
