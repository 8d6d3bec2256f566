mod file_to_table;
mod query_to_stream;
mod query_to_table;
mod query_to_view;
mod stream_to_table;
mod table_to_file;

pub use file_to_table::FileToTable;
pub use query_to_stream::QueryToStream;
pub use query_to_table::QueryToTable;
pub use query_to_view::QueryToView;
#[cfg(test)]
pub(crate) use query_to_view::view_options;
pub use stream_to_table::StreamToTable;
pub use table_to_file::TableToFile;
