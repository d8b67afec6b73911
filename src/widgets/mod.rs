mod confirm;
mod dialog;
mod help;
mod table_view;
pub mod theme;

pub use table_view::TableView;
