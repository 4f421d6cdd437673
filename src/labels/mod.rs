mod label;
mod label_set;

pub use label::Label;
pub use label_set::LabelSet;
