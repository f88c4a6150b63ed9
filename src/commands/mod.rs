pub mod extract;
pub mod scan;

// Re-export command functions for convenience
pub use extract::{extract, ExtractParams};
pub use scan::{scan, ScanParams};
