pub mod collection_header;
pub mod partition;
pub mod reads_sink;
pub mod reads_source;
