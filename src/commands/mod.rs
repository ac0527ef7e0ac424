pub mod add;
pub mod alerts;
pub mod calendars;
pub mod daemon;
pub mod events;
pub mod new;
pub mod sync;
pub mod template;
