mod dataset;
mod stats;

pub use dataset::{
    has_accepted_extension, list_class_labels, list_images, load_classes, ClassDirectory,
    DatasetSplit, Sample,
};
pub use stats::{ClassStatistics, GlobalTotals};
