pub mod activity;
pub mod goal;
pub mod journal;
pub mod notification;
pub mod todo;
pub mod user;
