pub mod ai;
pub mod auth;
pub mod goals;
pub mod health;
pub mod journal;
pub mod notifications;
pub mod pages;
pub mod stats;
pub mod todos;
pub mod ws;
