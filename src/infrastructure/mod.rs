pub mod config;
pub mod cookie_jar;
pub mod credential_store;
pub mod error;
pub mod moodle_api;
pub mod moodle_html;
pub mod moodle_transport;
pub mod notifier;
pub mod widget_store;
