pub mod feed;
pub mod preview;
pub mod quote;
pub mod setup;
pub mod sources;
pub mod ui;
pub mod watch;
