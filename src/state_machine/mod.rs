//! State machines built on `statig`.

pub mod machine_sm;
