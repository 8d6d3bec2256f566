mod query_to_file;
mod query_to_file_to_stream;

pub use query_to_file::{temp_table_name, QueryToFile};
pub use query_to_file_to_stream::QueryToFileToStream;
