//! Cross-crate tests: full probe pipelines from target to wire bytes, and
//! worker pool behaviour, against an in-memory route table.

#[cfg(test)]
mod probing;
