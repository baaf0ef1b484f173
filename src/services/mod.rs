pub mod ai;
pub mod calendar;
pub mod conversation;
pub mod extraction;
pub mod rate_limit;
pub mod scheduling;
pub mod sessions;
pub mod timeparse;
