// Widgets for each zone of the draft screen.

pub mod available;
pub mod help_bar;
pub mod notice;
pub mod status_bar;
