pub mod analyzed;
pub mod bulk;
pub mod index_writer;
pub mod reindex;
