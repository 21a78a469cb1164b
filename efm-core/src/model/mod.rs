pub mod locus;

pub use locus::Locus;
