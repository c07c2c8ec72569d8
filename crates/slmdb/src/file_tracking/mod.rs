mod file_metadata;

pub(crate) use file_metadata::FileMetadata;
