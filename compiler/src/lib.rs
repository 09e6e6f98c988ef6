// g2csd — Nord Modular G2 patch to Csound converter
//
// Library root. Stages in pipeline order: parser, bus, template/validate,
// codegen; pipeline ties them together.

pub mod bits;
pub mod bus;
pub mod catalog;
pub mod codegen;
pub mod diag;
pub mod encode;
pub mod error;
pub mod id;
pub mod parser;
pub mod patch;
pub mod pipeline;
pub mod report;
pub mod template;
pub mod validate;
