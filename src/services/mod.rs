pub mod batch;
pub mod extract;
pub mod ocr;
pub mod pipeline;
pub mod store;
pub mod validation;
