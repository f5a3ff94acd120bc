pub mod field_type;
pub mod date_format;
pub mod mapping;
pub mod document_mapper;
