pub mod ingest;
pub mod object_store;
pub mod predict;
pub mod shared_fs;
