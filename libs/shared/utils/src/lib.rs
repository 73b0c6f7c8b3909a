pub mod extractor;
pub mod format;
pub mod jwt;
pub mod test_utils;
pub mod validation;
