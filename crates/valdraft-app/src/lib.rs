pub mod app;
pub mod session;
pub mod view;
pub mod watcher;
