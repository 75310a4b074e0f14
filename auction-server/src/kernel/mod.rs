pub mod db;
pub mod entities;
pub mod fanout;
pub mod notifier;
