//! Utilities Module - shared infrastructure
//!
//! - `jsonpath`: Minimal path walker for `result[0].field` style references

pub mod jsonpath;
