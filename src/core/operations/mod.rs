mod encode;
mod file_ops;

pub use encode::{encode_image, OutputFormat};
pub use file_ops::{
    copy_atomic, prepare_output_dir, read_file, with_io_retry, write_atomic, write_manifest,
};
