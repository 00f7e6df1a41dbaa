//! Route modules for the OCR server

pub mod ocr;
