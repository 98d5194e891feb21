pub mod document;
pub mod nested;
pub mod options;
