pub mod error;
pub mod reader;
pub mod svg;
pub mod writer;

pub use error::ImportError;
pub use reader::{read_polygons, ReaderOptions};
pub use svg::write_svg_from_dxf;
pub use writer::write_nested_sheet;
