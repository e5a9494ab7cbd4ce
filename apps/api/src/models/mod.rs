pub mod meeting;
pub mod notification;
pub mod preference;
pub mod subject;
