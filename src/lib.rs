pub mod av1;
pub mod avif;
pub mod bits;
pub mod body;
pub mod boxes;
pub mod error;
pub mod issues;
pub mod parser;
pub mod properties;
pub mod recipes;
pub mod rules;
pub mod util;
pub mod writer;

pub use avif::{AvifFile, Item};
pub use boxes::{BoxHeader, BoxNode, BoxTree, FourCC, FullBoxHeader, NodeId};
pub use error::{Error, Result};
pub use issues::{apply_fixes, Issue, IssueReport, Severity, Subject};
pub use parser::{parse_box_sequence, parse_file, read_box_header, BoxSequence};
pub use properties::{Property, PropertyFilter};
pub use rules::{validate_file, NclxDefaults};
pub use writer::{write_file, write_file_to_path, AvifWriter};
