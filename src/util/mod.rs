mod format;
mod path;

pub use format::{http_date, unix_seconds};
pub use path::{basename, file_stem, join_subdir, split_path};
